use crate::cli::actions::Action;
use anyhow::{Context, Result};

/// Map parsed arguments to the action to run.
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches
            .get_one::<String>("dsn")
            .cloned()
            .context("missing required argument: --dsn")?,
    })
}
