use std::future::Future;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use tracing::debug;

use super::client::{ApiClient, Envelope};
use crate::error::ApiError;
use crate::models::InstanceState;

const DESCRIBE_PAGE_SIZE: u32 = 100;

/// One instance as reported by a describe call. This is the wire shape;
/// the cache keeps its own `Instance` with local-only fields layered on.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRecord {
    pub id: String,
    #[serde(default)]
    pub instance_type: String,
    #[serde(default)]
    pub public_ip: Option<String>,
    #[serde(default)]
    pub private_ip: Option<String>,
    #[serde(default)]
    pub launch_time: Option<DateTime<Utc>>,
    pub state: InstanceState,
    #[serde(default)]
    pub tags: Vec<TagRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagRecord {
    pub key: String,
    pub value: String,
}

impl InstanceRecord {
    pub fn new(id: impl Into<String>, state: InstanceState) -> Self {
        Self {
            id: id.into(),
            instance_type: String::new(),
            public_ip: None,
            private_ip: None,
            launch_time: None,
            state,
            tags: Vec::new(),
        }
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.push(TagRecord {
            key: key.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Display name derived from tag metadata, defaulting to the id.
    pub fn display_name(&self) -> String {
        self.tags
            .iter()
            .find(|t| t.key == "Name")
            .map(|t| t.value.clone())
            .unwrap_or_else(|| self.id.clone())
    }
}

/// Health of the provider's periodic reachability probes for one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckStatus {
    Ok,
    Impaired,
    Initializing,
    InsufficientData,
    NotApplicable,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Ok => "ok",
            CheckStatus::Impaired => "impaired",
            CheckStatus::Initializing => "initializing",
            CheckStatus::InsufficientData => "insufficient-data",
            CheckStatus::NotApplicable => "not-applicable",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// System- and instance-level status checks, as reported on demand by the
/// status endpoint. Not cached; a point-in-time health reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChecks {
    pub system_status: CheckStatus,
    pub instance_status: CheckStatus,
}

/// Describe every instance in one region, draining all pages before
/// returning so callers always see a complete snapshot.
pub(crate) async fn describe_instances(
    client: &ApiClient,
    region: &str,
) -> Result<Vec<InstanceRecord>, ApiError> {
    let records = drain_pages(region, |page| async move {
        let params = [
            ("region", region.to_string()),
            ("page", page.to_string()),
            ("per_page", DESCRIBE_PAGE_SIZE.to_string()),
        ];
        client
            .request(Method::GET, "/v1/instances", &params, None)
            .await
    })
    .await?;
    debug!(region, count = records.len(), "described instances");
    Ok(records)
}

/// Page-draining loop, kept separate from the HTTP call so the loop is
/// testable against an in-memory pager. `total_pages` of zero (or a
/// missing meta block) reads as a single page.
async fn drain_pages<F, Fut>(region: &str, fetch_page: F) -> Result<Vec<InstanceRecord>, ApiError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<Envelope<Vec<InstanceRecord>>, ApiError>>,
{
    let mut page: u32 = 1;
    let mut records = Vec::new();
    loop {
        let envelope = fetch_page(page).await?;
        if envelope.code != "OKAY" {
            return Err(ApiError::Protocol(format!(
                "describe failed for {}: {}",
                region,
                envelope.reason()
            )));
        }
        records.extend(envelope.data.unwrap_or_default());
        let total_pages = envelope.meta.map(|m| m.total_pages).unwrap_or(1).max(1);
        if page >= total_pages {
            break;
        }
        page += 1;
    }
    Ok(records)
}

/// Query the current status checks for one instance.
pub(crate) async fn instance_status(
    client: &ApiClient,
    region: &str,
    id: &str,
) -> Result<StatusChecks, ApiError> {
    let endpoint = format!("/v1/instances/{}/status", id);
    let params = [("region", region.to_string())];
    let envelope: Envelope<StatusChecks> = client
        .request(Method::GET, &endpoint, &params, None)
        .await?;
    if envelope.code != "OKAY" {
        return Err(ApiError::Protocol(format!(
            "status query failed for {}: {}",
            id,
            envelope.reason()
        )));
    }
    envelope
        .data
        .ok_or_else(|| ApiError::Protocol(format!("status response for {} carried no data", id)))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::api::client::PageMeta;
    use crate::models::InstanceState::*;

    fn page_envelope(ids: &[&str], page: u32, total_pages: u32) -> Envelope<Vec<InstanceRecord>> {
        Envelope {
            code: "OKAY".to_string(),
            message: None,
            data: Some(ids.iter().map(|id| InstanceRecord::new(*id, Running)).collect()),
            meta: Some(PageMeta { page, total_pages }),
        }
    }

    #[tokio::test]
    async fn drain_concatenates_all_pages_in_order() {
        let requested = RefCell::new(Vec::new());
        let records = drain_pages("r", |page| {
            requested.borrow_mut().push(page);
            let ids: &[&str] = match page {
                1 => &["i-1", "i-2"],
                2 => &["i-3"],
                3 => &["i-4"],
                _ => panic!("page {} past total_pages", page),
            };
            let envelope = page_envelope(ids, page, 3);
            async move { Ok(envelope) }
        })
        .await
        .unwrap();

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["i-1", "i-2", "i-3", "i-4"]);
        assert_eq!(*requested.borrow(), [1, 2, 3]);
    }

    #[tokio::test]
    async fn zero_total_pages_reads_as_a_single_page() {
        let requested = RefCell::new(0u32);
        let records = drain_pages("r", |page| {
            *requested.borrow_mut() += 1;
            let envelope = page_envelope(&["i-1"], page, 0);
            async move { Ok(envelope) }
        })
        .await
        .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(*requested.borrow(), 1, "a zero page count must not loop");
    }

    #[tokio::test]
    async fn missing_meta_reads_as_a_single_page() {
        let records = drain_pages("r", |_| async {
            Ok(Envelope {
                code: "OKAY".to_string(),
                message: None,
                data: Some(vec![InstanceRecord::new("i-1", Stopped)]),
                meta: None,
            })
        })
        .await
        .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn non_okay_page_aborts_the_drain() {
        let err = drain_pages("r", |_| async {
            Ok(Envelope::<Vec<InstanceRecord>> {
                code: "DENIED".to_string(),
                message: Some("quota exceeded".to_string()),
                data: None,
                meta: None,
            })
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Protocol(_)));
    }
}
