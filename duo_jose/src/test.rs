#![allow(dead_code)]

use std::sync::Mutex;

use crate::{error, random::RandomSource};

pub const ISSUER: &str = "client id client id ";
pub const AUDIENCE: &str = "https://fake.api.host/oauth/v1/token";
pub const SECRET: &[u8] = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
pub const OTHER_SECRET: &[u8] = b"bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

/// Replays a fixed byte script, padding with zero bytes once it runs dry
///
/// After the script has been handed out in full, further requests fail.
#[derive(Debug)]
pub struct ScriptedRandom {
    script: Vec<u8>,
    position: Mutex<usize>,
    fail: bool,
}

impl ScriptedRandom {
    pub fn new(script: Vec<u8>) -> Self {
        Self {
            script,
            position: Mutex::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            script: Vec::new(),
            position: Mutex::new(0),
            fail: true,
        }
    }
}

impl RandomSource for ScriptedRandom {
    fn fill(&self, dest: &mut [u8]) -> Result<(), error::Unexpected> {
        let mut position = self.position.lock().unwrap();

        if self.fail || *position >= self.script.len() {
            return Err(error::unexpected("random script exhausted"));
        }

        let remaining = &self.script[*position..];
        let n = remaining.len().min(dest.len());
        dest[..n].copy_from_slice(&remaining[..n]);
        dest[n..].fill(0);
        *position += n;

        Ok(())
    }
}
