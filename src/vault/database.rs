use crate::{cli::globals::GlobalArgs, vault};
use anyhow::{anyhow, Result};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{info_span, instrument, Instrument};

/// Fetch short-lived database credentials from Vault and stash them in the
/// globals, lease included, so the renewal task can keep them alive.
///
/// # Errors
/// Returns an error if the Vault request fails, Vault returns a non-success
/// status, or the response is missing expected fields.
#[instrument(skip(globals))]
pub async fn database_creds(globals: &mut GlobalArgs) -> Result<()> {
    let client = vault::http_client()?;

    let db_creds = vault::endpoint_url(&globals.vault_url, "/v1/database/creds/ensaluto")?;

    let span = info_span!(
        "vault.database_creds",
        http.method = "GET",
        url = %db_creds
    );
    let response = client
        .get(&db_creds)
        .header("X-Vault-Token", globals.vault_token.expose_secret())
        .send()
        .instrument(span)
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let json_response: Value = response.json().await?;

        return Err(anyhow!(
            "{} - {}, {}",
            db_creds,
            status,
            vault::vault_error_message(&json_response)
        ));
    }

    let json_response: Value = response.json().await?;

    let lease_id = json_response
        .get("lease_id")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Error parsing JSON response: no lease_id found"))?;
    globals.vault_db_lease_id = lease_id.to_string();

    let lease_duration = json_response
        .get("lease_duration")
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow!("Error parsing JSON response: no lease_duration found"))?;
    globals.vault_db_lease_duration = lease_duration;

    let username = json_response
        .get("data")
        .and_then(|v| v.get("username"))
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Error parsing JSON response: no username found"))?;
    globals.vault_db_username = username.to_string();

    let password = json_response
        .get("data")
        .and_then(|v| v.get("password"))
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Error parsing JSON response: no password found"))?;
    globals.vault_db_password = SecretString::from(password.to_string());

    Ok(())
}
