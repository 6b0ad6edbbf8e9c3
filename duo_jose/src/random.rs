//! Cryptographically secure alphanumeric strings
//!
//! Used for token nonces (`jti`) and for the `state` value that correlates an
//! authorization request with its callback.
//!
//! Characters are produced by drawing single random bytes and keeping only
//! those that are already ASCII letters or digits. Out-of-range bytes are
//! discarded rather than reduced, so every one of the 62 characters is
//! equally likely.

use std::fmt;

use ring::rand::SecureRandom;

use crate::error;

/// A source of cryptographically secure random bytes
pub trait RandomSource {
    /// Fills `dest` entirely with random bytes
    ///
    /// # Errors
    ///
    /// The underlying generator failed to produce randomness.
    fn fill(&self, dest: &mut [u8]) -> Result<(), error::Unexpected>;
}

impl RandomSource for ring::rand::SystemRandom {
    fn fill(&self, dest: &mut [u8]) -> Result<(), error::Unexpected> {
        SecureRandom::fill(self, dest)
            .map_err(|_| error::unexpected("random number generator failure"))
    }
}

impl<R: RandomSource + ?Sized> RandomSource for &R {
    fn fill(&self, dest: &mut [u8]) -> Result<(), error::Unexpected> {
        R::fill(self, dest)
    }
}

impl<R: RandomSource + ?Sized> RandomSource for std::sync::Arc<R> {
    fn fill(&self, dest: &mut [u8]) -> Result<(), error::Unexpected> {
        R::fill(self, dest)
    }
}

/// The operating system's secure random number generator
#[derive(Clone)]
pub struct SystemRandom(ring::rand::SystemRandom);

impl SystemRandom {
    /// Constructs a handle to the system generator
    #[must_use]
    pub fn new() -> Self {
        Self(ring::rand::SystemRandom::new())
    }
}

impl Default for SystemRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SystemRandom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("SystemRandom")
    }
}

impl RandomSource for SystemRandom {
    fn fill(&self, dest: &mut [u8]) -> Result<(), error::Unexpected> {
        RandomSource::fill(&self.0, dest)
    }
}

const BATCH: usize = 64;

/// Generates an alphanumeric string of exactly `length` characters using the
/// system generator
///
/// # Errors
///
/// Returns an error if `length` is zero or the generator fails.
pub fn generate(length: usize) -> Result<String, error::RandomError> {
    generate_with_rng(length, &SystemRandom::new())
}

/// Generates an alphanumeric string of exactly `length` characters using the
/// provided source of randomness
///
/// # Errors
///
/// Returns an error if `length` is zero or the generator fails.
pub fn generate_with_rng(
    length: usize,
    rng: &dyn RandomSource,
) -> Result<String, error::RandomError> {
    if length == 0 {
        return Err(error::invalid_argument("cannot generate an empty random string").into());
    }

    let mut out = String::with_capacity(length);
    let mut buf = [0u8; BATCH];

    while out.len() < length {
        rng.fill(&mut buf)?;

        for &b in &buf {
            if b.is_ascii_alphanumeric() {
                out.push(char::from(b));
                if out.len() == length {
                    break;
                }
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;
    use crate::test::ScriptedRandom;

    #[test]
    fn produces_requested_length() -> Result<()> {
        for length in [1, 10, 36, 100, 1024] {
            let s = generate(length)?;
            assert_eq!(s.len(), length);
            assert!(s.bytes().all(|b| b.is_ascii_alphanumeric()), "{}", s);
        }

        Ok(())
    }

    #[test]
    fn zero_length_is_rejected() {
        let err = generate(0).unwrap_err();
        assert!(matches!(err, error::RandomError::InvalidArgument(_)));
    }

    #[test]
    fn out_of_range_bytes_are_discarded() -> Result<()> {
        // Punctuation, control, and high bytes must be skipped, not folded in
        let rng = ScriptedRandom::new(b"\x00-a\xff~Z\x7f9 q".to_vec());

        let s = generate_with_rng(4, &rng)?;
        assert_eq!(s, "aZ9q");

        Ok(())
    }

    #[test]
    fn generator_failure_is_reported() {
        let rng = ScriptedRandom::failing();

        let err = generate_with_rng(8, &rng).unwrap_err();
        assert!(matches!(err, error::RandomError::Unexpected(_)));
    }

    #[test]
    fn successive_strings_differ() -> Result<()> {
        assert_ne!(generate(36)?, generate(36)?);
        Ok(())
    }
}
