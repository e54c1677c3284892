// Atomic API modules
pub mod actions;
pub mod client;
pub mod instances;
pub mod regions;

use async_trait::async_trait;

pub use instances::{CheckStatus, InstanceRecord, StatusChecks, TagRecord};

use crate::config::Config;
use crate::error::{ActionError, ApiError};
use crate::models::{InstanceAction, Region};

/// The remote compute-management API, as the engine consumes it. A trait
/// seam so the scheduler and dispatcher can run against a test double.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// List available regions, in provider order.
    async fn list_regions(&self) -> Result<Vec<Region>, ApiError>;

    /// Describe every instance in one region (all pages drained).
    async fn describe_instances(&self, region: &str) -> Result<Vec<InstanceRecord>, ApiError>;

    /// Current system/instance status checks for one instance. On-demand;
    /// the cache never stores these.
    async fn instance_status(&self, region: &str, id: &str) -> Result<StatusChecks, ApiError>;

    /// Request a start/stop/reboot; returns once the request is accepted.
    async fn send_instance_action(
        &self,
        region: &str,
        id: &str,
        action: InstanceAction,
    ) -> Result<(), ActionError>;
}

/// Production implementation backed by the HTTP API.
pub struct HttpCloudApi {
    client: client::ApiClient,
}

impl HttpCloudApi {
    pub fn new(cfg: &Config) -> Result<Self, ApiError> {
        Ok(Self {
            client: client::ApiClient::new(cfg)?,
        })
    }
}

#[async_trait]
impl CloudApi for HttpCloudApi {
    async fn list_regions(&self) -> Result<Vec<Region>, ApiError> {
        regions::list_regions(&self.client).await
    }

    async fn describe_instances(&self, region: &str) -> Result<Vec<InstanceRecord>, ApiError> {
        instances::describe_instances(&self.client, region).await
    }

    async fn instance_status(&self, region: &str, id: &str) -> Result<StatusChecks, ApiError> {
        instances::instance_status(&self.client, region, id).await
    }

    async fn send_instance_action(
        &self,
        region: &str,
        id: &str,
        action: InstanceAction,
    ) -> Result<(), ActionError> {
        actions::send_action(&self.client, region, id, action).await
    }
}
