use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::api::{CloudApi, InstanceRecord};
use crate::error::{ApiError, RegionUnavailable};

/// A complete per-region instance snapshot with its as-of timestamp.
#[derive(Debug)]
pub struct Snapshot {
    pub region: String,
    pub as_of: DateTime<Utc>,
    pub records: Vec<InstanceRecord>,
}

/// Query one region for its current instance set. The deadline bounds the
/// whole call including pagination; on timeout or remote error the failure
/// is wrapped as `RegionUnavailable` so the caller can bulkhead it.
pub async fn fetch_instances(
    api: &dyn CloudApi,
    region: &str,
    deadline: Duration,
) -> Result<Snapshot, RegionUnavailable> {
    let result = tokio::time::timeout(deadline, api.describe_instances(region)).await;
    let records = match result {
        Ok(Ok(records)) => records,
        Ok(Err(source)) => {
            warn!(region, %source, "instance fetch failed");
            return Err(RegionUnavailable {
                region: region.to_string(),
                source,
            });
        }
        Err(_) => {
            warn!(region, ?deadline, "instance fetch timed out");
            return Err(RegionUnavailable {
                region: region.to_string(),
                source: ApiError::Timeout(deadline),
            });
        }
    };
    Ok(Snapshot {
        region: region.to_string(),
        as_of: Utc::now(),
        records,
    })
}
