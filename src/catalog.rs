use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::api::CloudApi;
use crate::error::ApiError;
use crate::models::Region;

/// Session-wide region catalog. The remote listing is fetched once and
/// cached until `invalidate`; enable/disable toggles are local-only and
/// survive re-listing.
pub struct RegionCatalog {
    api: Arc<dyn CloudApi>,
    inner: Mutex<CatalogInner>,
}

struct CatalogInner {
    regions: Option<Vec<Region>>,
    disabled: HashSet<String>,
}

impl RegionCatalog {
    pub fn new(api: Arc<dyn CloudApi>) -> Self {
        Self {
            api,
            inner: Mutex::new(CatalogInner {
                regions: None,
                disabled: HashSet::new(),
            }),
        }
    }

    /// Ordered region list. First call hits the remote API; later calls
    /// serve the cached listing. A listing failure is fatal for that call
    /// only and leaves any previously cached listing intact.
    pub async fn list(&self) -> Result<Vec<Region>, ApiError> {
        if let Some(regions) = self.cached() {
            return Ok(regions);
        }
        let listed = self.api.list_regions().await?;
        info!(count = listed.len(), "region catalog populated");
        let mut inner = self.inner.lock().unwrap();
        // A concurrent list() may have stored a listing while we were on
        // the wire; last writer wins, the contents are identical.
        inner.regions = Some(listed);
        Ok(Self::with_flags(&inner))
    }

    /// Force a remote re-listing on the next `list` call.
    pub fn invalidate(&self) {
        debug!("region catalog invalidated");
        self.inner.lock().unwrap().regions = None;
    }

    pub fn set_enabled(&self, code: &str, enabled: bool) {
        let mut inner = self.inner.lock().unwrap();
        if enabled {
            inner.disabled.remove(code);
        } else {
            inner.disabled.insert(code.to_string());
        }
    }

    /// Codes of the regions a scan should cover.
    pub async fn enabled_regions(&self) -> Result<Vec<String>, ApiError> {
        let regions = self.list().await?;
        Ok(regions
            .into_iter()
            .filter(|r| r.enabled)
            .map(|r| r.code)
            .collect())
    }

    fn cached(&self) -> Option<Vec<Region>> {
        let inner = self.inner.lock().unwrap();
        inner.regions.as_ref()?;
        Some(Self::with_flags(&inner))
    }

    fn with_flags(inner: &CatalogInner) -> Vec<Region> {
        inner
            .regions
            .as_ref()
            .map(|regions| {
                regions
                    .iter()
                    .map(|r| Region {
                        enabled: !inner.disabled.contains(&r.code),
                        ..r.clone()
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
