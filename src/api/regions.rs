use reqwest::Method;
use serde::Deserialize;

use super::client::{ApiClient, Envelope};
use crate::error::ApiError;
use crate::models::Region;

#[derive(Debug, Deserialize)]
struct RegionRecord {
    code: String,
    #[serde(default)]
    name: Option<String>,
}

/// Load all available regions from the API, in the order the API lists them.
pub(crate) async fn list_regions(client: &ApiClient) -> Result<Vec<Region>, ApiError> {
    let params = [("per_page", "1000".to_string())];
    let envelope: Envelope<Vec<RegionRecord>> = client
        .request(Method::GET, "/v1/regions", &params, None)
        .await?;
    if envelope.code != "OKAY" {
        return Err(ApiError::Protocol(format!(
            "region listing failed: {}",
            envelope.reason()
        )));
    }
    let regions = envelope
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|r| Region {
            display_name: r.name.unwrap_or_else(|| r.code.clone()),
            code: r.code,
            enabled: true,
        })
        .collect();
    Ok(regions)
}
