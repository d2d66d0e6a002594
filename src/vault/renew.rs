use crate::{cli::globals::GlobalArgs, vault};
use anyhow::{anyhow, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tokio::{sync::mpsc, time::{sleep, Duration}};
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

/// Renew the service's own Vault token, returning the new lease duration.
#[instrument(skip(token))]
async fn renew_token(url: &str, token: &SecretString, increment: Option<u64>) -> Result<u64> {
    let client = vault::http_client()?;

    let renew_url = vault::endpoint_url(url, "/v1/auth/token/renew-self")?;

    let payload = json!({
        "increment": increment.map_or(0, |increment| increment)
    });

    let span = info_span!(
        "vault.renew_token",
        http.method = "POST",
        url = %renew_url
    );
    let response = client
        .post(&renew_url)
        .json(&payload)
        .header("X-Vault-Token", token.expose_secret())
        .send()
        .instrument(span)
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let json_response: Value = response.json().await?;

        return Err(anyhow!(
            "{} - {}, {}",
            renew_url,
            status,
            vault::vault_error_message(&json_response)
        ));
    }

    let json_response: Value = response.json().await?;

    json_response
        .get("auth")
        .and_then(|auth| auth.get("lease_duration"))
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow!("Error parsing JSON response: no lease_duration found"))
}

/// Renew the database credential lease, returning the new lease duration.
#[instrument(skip(token))]
async fn renew_db_lease(
    url: &str,
    token: &SecretString,
    lease_id: &str,
    increment: u64,
) -> Result<u64> {
    let client = vault::http_client()?;

    let renew_url = vault::endpoint_url(url, "/v1/sys/leases/renew")?;

    let payload = json!({
        "increment": increment,
        "lease_id": lease_id
    });

    let span = info_span!(
        "vault.renew_db_lease",
        http.method = "POST",
        url = %renew_url
    );
    let response = client
        .post(&renew_url)
        .json(&payload)
        .header("X-Vault-Token", token.expose_secret())
        .send()
        .instrument(span)
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let json_response: Value = response.json().await?;

        return Err(anyhow!(
            "{} - {}, {}",
            renew_url,
            status,
            vault::vault_error_message(&json_response)
        ));
    }

    let json_response: Value = response.json().await?;

    json_response
        .get("lease_duration")
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow!("Error parsing JSON response: no lease_duration found"))
}

/// Keep the Vault token and the database credential lease alive.
///
/// Spawns one renewal loop per lease. Each loop renews immediately, then
/// sleeps for 70-90% of the returned lease duration so renewals land before
/// expiry without synchronizing across instances. Three consecutive failures
/// send on `tx` so the server shuts down instead of running on credentials
/// about to expire.
///
/// # Errors
/// Returns an error if the renewal tasks cannot be set up.
#[instrument(skip(globals, tx))]
pub async fn try_renew(globals: &GlobalArgs, tx: mpsc::UnboundedSender<()>) -> Result<()> {
    // renew the token
    tokio::spawn({
        let mut rng = StdRng::from_entropy();
        let mut jittered_lease_duration: Duration = Duration::default();

        let url = globals.vault_url.clone();
        let token = globals.vault_token.clone();
        let tx = tx.clone();

        async move {
            loop {
                for attempt in 1..=3 {
                    let backoff_time = 2u64.pow(attempt - 1);

                    if attempt > 1 {
                        warn!("Backing off for {} seconds", backoff_time);
                        sleep(Duration::from_secs(backoff_time)).await;
                    }

                    match renew_token(&url, &token, None).await {
                        Ok(lease_duration) => {
                            let factor = rng.gen_range(70..90);

                            jittered_lease_duration =
                                Duration::from_secs(lease_duration * factor / 100);
                            info!(
                                lease_duration,
                                next_renew_seconds = jittered_lease_duration.as_secs(),
                                "Vault token renewed"
                            );

                            break;
                        }

                        Err(e) => {
                            error!("Failed to renew token: {}", e);

                            if attempt == 3 {
                                error!("Failed to renew token after 3 attempts: {}", e);
                                let _ = tx.send(());
                                return;
                            }
                        }
                    }
                }

                debug!(
                    "Will renew token in {} seconds",
                    jittered_lease_duration.as_secs()
                );

                sleep(jittered_lease_duration).await;
            }
        }
    });

    // renew the DB lease_id
    tokio::spawn({
        let mut rng = StdRng::from_entropy();
        let mut jittered_lease_duration: Duration = Duration::default();

        let url = globals.vault_url.clone();
        let token = globals.vault_token.clone();
        let db_lease_id = globals.vault_db_lease_id.clone();
        let db_lease_duration = globals.vault_db_lease_duration;
        let tx = tx.clone();

        async move {
            loop {
                for attempt in 1..=3 {
                    let backoff_time = 2u64.pow(attempt - 1);

                    if attempt > 1 {
                        warn!("Backing off for {} seconds", backoff_time);
                        sleep(Duration::from_secs(backoff_time)).await;
                    }

                    match renew_db_lease(&url, &token, &db_lease_id, db_lease_duration).await {
                        Ok(lease_duration) => {
                            let factor = rng.gen_range(70..90);

                            jittered_lease_duration =
                                Duration::from_secs(lease_duration * factor / 100);
                            info!(
                                lease_duration,
                                next_renew_seconds = jittered_lease_duration.as_secs(),
                                "Vault DB lease renewed"
                            );

                            break;
                        }

                        Err(e) => {
                            error!("Failed to renew DB lease: {}", e);

                            if attempt == 3 {
                                error!("Failed to renew DB lease after 3 attempts: {}", e);
                                let _ = tx.send(());
                                return;
                            }
                        }
                    }
                }

                debug!(
                    "Will renew DB lease in {} seconds",
                    jittered_lease_duration.as_secs()
                );

                sleep(jittered_lease_duration).await;
            }
        }
    });

    Ok(())
}
