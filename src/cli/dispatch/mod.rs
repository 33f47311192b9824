//! Maps validated CLI arguments to the action to run.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::routing;
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let max_connections = matches
        .get_one::<u32>("max-connections")
        .copied()
        .unwrap_or(5);

    let routing_opts = routing::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        dsn,
        max_connections,
        platform_domain: routing_opts.platform_domain,
        tie_break: routing_opts.tie_break,
    }))
}
