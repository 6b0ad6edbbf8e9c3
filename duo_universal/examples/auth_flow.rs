use std::io::{self, BufRead, Write};

use clap::Parser;
use duo_universal::{AuthorizationCode, Client, State, Username};
use reqwest::Url;

#[derive(Debug, Parser)]
struct Opts {
    /// The client ID of the Duo Web SDK application
    #[arg(short, long, env = "DUO_CLIENT_ID")]
    client_id: String,

    /// The client secret of the Duo Web SDK application
    #[arg(short = 's', long, env = "DUO_CLIENT_SECRET", hide_env_values = true)]
    client_secret: String,

    /// The API host, such as `api-123456.duosecurity.com`
    #[arg(short = 'a', long, env = "DUO_API_HOST")]
    api_host: String,

    /// The URI Duo redirects the browser back to
    #[arg(short, long, env = "DUO_REDIRECT_URI")]
    redirect_uri: String,

    /// The user to authenticate
    #[arg(short, long)]
    username: Username,

    /// Ask Duo to return the code as `duo_code`
    #[arg(long)]
    duo_code: bool,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    let mut builder = Client::builder(
        opts.client_id,
        opts.client_secret,
        opts.api_host,
        opts.redirect_uri,
    )
    .customize_user_agent_app("auth_flow", env!("CARGO_PKG_VERSION"));

    if opts.duo_code {
        builder = builder.use_duo_code_attribute();
    }

    let client = builder.build()?;

    if !client.health_check().await {
        color_eyre::eyre::bail!("Duo is unavailable");
    }

    let state = client.generate_state()?;
    let uri = client.generate_auth_uri(&opts.username, &state)?;

    println!("Open this URI in a browser:\n\n{}\n", uri);
    print!("Paste the URI Duo redirected to: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let callback = Url::parse(line.trim())?;

    let code_param = if opts.duo_code { "duo_code" } else { "code" };
    let mut code = None;
    let mut returned_state = None;

    for (k, v) in callback.query_pairs() {
        if k == code_param {
            code = Some(AuthorizationCode::new(v.into_owned()));
        } else if k == "state" {
            returned_state = Some(State::new(v.into_owned()));
        }
    }

    if returned_state.as_ref() != Some(&state) {
        color_eyre::eyre::bail!("returned state does not match");
    }

    let code = code.ok_or_else(|| color_eyre::eyre::eyre!("no {} in callback", code_param))?;

    let result = client.exchange_code(&code, &opts.username).await?;

    tracing::info!(
        username = %result.username,
        result = ?result.auth_result.result,
        factor = ?result.auth_context.factor,
        "authentication complete"
    );

    println!("{:#?}", result);

    Ok(())
}
