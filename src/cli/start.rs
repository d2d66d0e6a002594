use crate::{
    cli::{actions::Action, commands, dispatch, globals::GlobalArgs, telemetry},
    vault,
};
use anyhow::{Context, Result};
use tracing::debug;

/// Parse arguments, initialize telemetry and bootstrap Vault: optionally
/// unwrap the wrapped secret-id, log in with `AppRole` and fetch database
/// credentials. The returned globals feed the server and the renewal loops.
/// # Errors
/// Returns an error if parsing, telemetry setup or the Vault bootstrap fails
pub async fn start() -> Result<(Action, GlobalArgs)> {
    let matches = commands::new().get_matches();

    let verbosity_level = match matches.get_one::<u8>("verbosity").map_or(0, |&v| v) {
        0 => tracing::Level::ERROR,
        1 => tracing::Level::WARN,
        2 => tracing::Level::INFO,
        3 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    telemetry::init(Some(verbosity_level))?;

    let vault_url = matches
        .get_one::<String>("vault-url")
        .cloned()
        .context("missing required argument: --vault-url")?;
    let vault_role_id = matches
        .get_one::<String>("vault-role-id")
        .cloned()
        .context("missing required argument: --vault-role-id")?;

    let mut globals = GlobalArgs::new(vault_url);

    // A wrapped token hides the secret-id until unwrapped
    let secret_id = if let Some(wrapped) = matches.get_one::<String>("vault-wrapped-token") {
        vault::unwrap(&globals, wrapped).await?
    } else {
        matches
            .get_one::<String>("vault-secret-id")
            .cloned()
            .context("missing required argument: --vault-secret-id")?
    };

    let (token, lease_duration) = vault::approle_login(&globals, &secret_id, &vault_role_id).await?;

    debug!("Vault token lease duration: {lease_duration}");

    globals.set_token(token);

    vault::database::database_creds(&mut globals)
        .await
        .context("Could not get database username and password")?;

    let action = dispatch::handler(&matches)?;

    Ok((action, globals))
}
