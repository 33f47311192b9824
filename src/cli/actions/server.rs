use crate::{api, routing::TieBreak};
use anyhow::{Context, Result, anyhow};
use secrecy::SecretString;
use tracing::debug;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub max_connections: u32,
    pub platform_domain: String,
    pub tie_break: TieBreak,
}

/// Copy of the DSN that is safe to log.
fn redacted(dsn: &Url) -> Result<String> {
    let mut shown = dsn.clone();
    if shown.password().is_some() {
        shown
            .set_password(Some("****"))
            .map_err(|()| anyhow!("Error redacting password"))?;
    }
    Ok(shown.to_string())
}

/// Execute the server action.
/// # Errors
/// Returns an error if the DSN is malformed or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let dsn = Url::parse(&args.dsn).context("Invalid database connection string")?;

    debug!(dsn = %redacted(&dsn)?, max_connections = args.max_connections, "database");

    api::new(api::ServerConfig {
        port: args.port,
        dsn: SecretString::from(dsn.to_string()),
        max_connections: args.max_connections,
        platform_domain: args.platform_domain,
        tie_break: args.tie_break,
    })
    .await
}
