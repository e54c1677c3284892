//! Shared test double for the remote compute API.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use fleetwatch::api::{CheckStatus, CloudApi, InstanceRecord, StatusChecks};
use fleetwatch::error::{ActionError, ApiError};
use fleetwatch::models::{InstanceAction, InstanceState, Region};

/// What a region's describe call should produce.
#[derive(Clone)]
pub enum RegionBehavior {
    Ok(Vec<InstanceRecord>),
    NetworkError,
    AuthError,
}

pub struct MockCloudApi {
    regions: Mutex<Vec<Region>>,
    behaviors: Mutex<HashMap<String, RegionBehavior>>,
    pub describe_counts: Mutex<HashMap<String, usize>>,
    pub region_list_calls: AtomicUsize,
    pub actions: Mutex<Vec<(String, String, InstanceAction)>>,
    pub deny_actions: Mutex<Option<String>>,
    statuses: Mutex<HashMap<(String, String), StatusChecks>>,
    /// When set, each describe call consumes one permit before answering,
    /// letting a test hold a scan in flight deterministically.
    gate: Option<Arc<Semaphore>>,
}

impl MockCloudApi {
    pub fn new(region_codes: &[&str]) -> Self {
        Self {
            regions: Mutex::new(region_codes.iter().map(|c| region(c)).collect()),
            behaviors: Mutex::new(HashMap::new()),
            describe_counts: Mutex::new(HashMap::new()),
            region_list_calls: AtomicUsize::new(0),
            actions: Mutex::new(Vec::new()),
            deny_actions: Mutex::new(None),
            statuses: Mutex::new(HashMap::new()),
            gate: None,
        }
    }

    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn set_instances(&self, region: &str, records: Vec<InstanceRecord>) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(region.to_string(), RegionBehavior::Ok(records));
    }

    pub fn set_behavior(&self, region: &str, behavior: RegionBehavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(region.to_string(), behavior);
    }

    pub fn deny_actions(&self, reason: &str) {
        *self.deny_actions.lock().unwrap() = Some(reason.to_string());
    }

    pub fn describe_count(&self, region: &str) -> usize {
        self.describe_counts
            .lock()
            .unwrap()
            .get(region)
            .copied()
            .unwrap_or(0)
    }

    pub fn action_count(&self) -> usize {
        self.actions.lock().unwrap().len()
    }

    pub fn set_status(&self, region: &str, id: &str, checks: StatusChecks) {
        self.statuses
            .lock()
            .unwrap()
            .insert((region.to_string(), id.to_string()), checks);
    }
}

#[async_trait]
impl CloudApi for MockCloudApi {
    async fn list_regions(&self) -> Result<Vec<Region>, ApiError> {
        self.region_list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.regions.lock().unwrap().clone())
    }

    async fn describe_instances(&self, region: &str) -> Result<Vec<InstanceRecord>, ApiError> {
        *self
            .describe_counts
            .lock()
            .unwrap()
            .entry(region.to_string())
            .or_insert(0) += 1;
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        let behavior = self.behaviors.lock().unwrap().get(region).cloned();
        match behavior {
            Some(RegionBehavior::Ok(records)) => Ok(records),
            Some(RegionBehavior::NetworkError) => {
                Err(ApiError::Network("injected network failure".into()))
            }
            Some(RegionBehavior::AuthError) => Err(ApiError::Auth("injected auth failure".into())),
            None => Ok(Vec::new()),
        }
    }

    async fn instance_status(&self, region: &str, id: &str) -> Result<StatusChecks, ApiError> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(&(region.to_string(), id.to_string()))
            .copied()
            .unwrap_or(StatusChecks {
                system_status: CheckStatus::Ok,
                instance_status: CheckStatus::Ok,
            }))
    }

    async fn send_instance_action(
        &self,
        region: &str,
        id: &str,
        action: InstanceAction,
    ) -> Result<(), ActionError> {
        if let Some(reason) = self.deny_actions.lock().unwrap().clone() {
            return Err(ActionError::Denied(reason));
        }
        self.actions
            .lock()
            .unwrap()
            .push((region.to_string(), id.to_string(), action));
        Ok(())
    }
}

pub fn region(code: &str) -> Region {
    Region {
        code: code.to_string(),
        display_name: code.to_uppercase(),
        enabled: true,
    }
}

pub fn record(id: &str, state: InstanceState) -> InstanceRecord {
    InstanceRecord::new(id, state)
}
