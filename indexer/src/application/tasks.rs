//! Background tasks that run beside the pipeline. Currently only the
//! periodic denomination metadata refresh.

use std::time::Duration;

use serde::Deserialize;
use tokio::task::JoinHandle;

use crate::config::DenomRefreshConfig;
use crate::infrastructure::persistence::repositories::DenomRepository;
use crate::utils::logging;

#[derive(Debug, Deserialize)]
struct DenomMetadata {
    base: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    symbol: String,
}

/// Start the denom refresh task when an API is configured. The task fetches
/// the metadata list on start and then every `period_hours`, upgrading any
/// UNKNOWN placeholder rows along the way. Abort the returned handle to
/// stop it.
pub fn start_denom_refresh(
    config: &DenomRefreshConfig,
    repository: DenomRepository,
) -> Option<JoinHandle<()>> {
    if config.api_url.is_empty() {
        return None;
    }

    let api_url = config.api_url.clone();
    let period = Duration::from_secs(config.period_hours.max(1) * 3600);

    Some(tokio::spawn(async move {
        let client = reqwest::Client::new();
        let mut ticker = tokio::time::interval(period);

        loop {
            ticker.tick().await;
            match fetch_denoms(&client, &api_url).await {
                Ok(denoms) => {
                    let mut upserted = 0usize;
                    for denom in &denoms {
                        match repository
                            .upsert_denom(&denom.base, &denom.name, &denom.symbol)
                            .await
                        {
                            Ok(()) => upserted += 1,
                            Err(e) => logging::log_error(&format!(
                                "Error upserting denom {}: {}",
                                denom.base, e
                            )),
                        }
                    }
                    logging::log_info(&format!(
                        "Denom refresh complete: {} of {} denoms upserted",
                        upserted,
                        denoms.len()
                    ));
                }
                Err(e) => logging::log_error(&format!("Error fetching denom metadata: {}", e)),
            }
        }
    }))
}

async fn fetch_denoms(
    client: &reqwest::Client,
    api_url: &str,
) -> Result<Vec<DenomMetadata>, reqwest::Error> {
    client
        .get(api_url)
        .send()
        .await?
        .error_for_status()?
        .json::<Vec<DenomMetadata>>()
        .await
}
