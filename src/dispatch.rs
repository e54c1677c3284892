use std::sync::Arc;

use tracing::{debug, info};

use crate::api::CloudApi;
use crate::cache::StateCache;
use crate::error::ActionError;
use crate::events::CacheEvent;
use crate::models::{InstanceAction, InstanceState, TargetState};

/// Immediate outcome of a control-action request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Accepted,
    /// Refused locally against the cached confirmed state; no remote call
    /// was made and the cache is unchanged.
    Rejected(String),
}

/// Issues start/stop/reboot commands against single instances, applying a
/// short-lived optimistic transition on acceptance. The next reconciler
/// pass is the source of truth that confirms or discards that optimism.
pub struct ActionDispatcher {
    api: Arc<dyn CloudApi>,
    cache: Arc<StateCache>,
    optimistic_expiry_ticks: u64,
    reboot_expiry_ticks: u64,
}

impl ActionDispatcher {
    pub fn new(
        api: Arc<dyn CloudApi>,
        cache: Arc<StateCache>,
        optimistic_expiry_ticks: u64,
        reboot_expiry_ticks: u64,
    ) -> Self {
        Self {
            api,
            cache,
            optimistic_expiry_ticks,
            reboot_expiry_ticks,
        }
    }

    /// Validate against the last confirmed state, then issue the remote
    /// command. Non-blocking beyond acceptance: the call returns once the
    /// API accepts the request, not when the state change completes. No
    /// automatic retry; on any failure the cache is left untouched.
    pub async fn request_action(
        &self,
        region: &str,
        id: &str,
        action: InstanceAction,
    ) -> Result<ActionOutcome, ActionError> {
        let Some(state) = self.cache.confirmed_state(region, id) else {
            debug!(region, id, %action, "action rejected: unknown instance");
            return Ok(ActionOutcome::Rejected(format!(
                "unknown instance {} in {}",
                id, region
            )));
        };
        if let Some(reason) = validate(action, state) {
            debug!(region, id, %action, %state, reason, "action rejected locally");
            return Ok(ActionOutcome::Rejected(reason));
        }

        self.api.send_instance_action(region, id, action).await?;

        let (target, expiry) = match action {
            InstanceAction::Start => (TargetState::Pending, self.optimistic_expiry_ticks),
            InstanceAction::Stop => (TargetState::Stopping, self.optimistic_expiry_ticks),
            InstanceAction::Reboot => (TargetState::Rebooting, self.reboot_expiry_ticks),
        };
        self.cache.apply_optimistic(region, id, target, expiry);
        info!(region, id, %action, "action accepted; optimistic overlay installed");
        self.cache.emit(CacheEvent::ActionAccepted {
            region: region.to_string(),
            id: id.to_string(),
            action,
        });
        Ok(ActionOutcome::Accepted)
    }
}

/// Local legality check against the last confirmed state. Returns the
/// rejection reason, or None when the action may go to the remote API.
fn validate(action: InstanceAction, state: InstanceState) -> Option<String> {
    use InstanceAction::*;
    use InstanceState::*;
    match (action, state) {
        (_, Terminated) => Some("instance is terminated".into()),
        (_, ShuttingDown) => Some("instance is shutting down".into()),
        (Start, Running) => Some("already running".into()),
        (Start, Pending) => Some("already starting".into()),
        (Start, Stopping) => Some("instance is still stopping".into()),
        (Stop, Stopped) => Some("already stopped".into()),
        (Stop, Stopping) => Some("already stopping".into()),
        (Reboot, state) if state != Running => Some(format!("cannot reboot a {} instance", state)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_table() {
        use InstanceAction::*;
        use InstanceState::*;
        assert_eq!(validate(Start, Running), Some("already running".into()));
        assert_eq!(validate(Start, Pending), Some("already starting".into()));
        assert_eq!(validate(Start, Stopped), None);
        assert_eq!(
            validate(Start, Stopping),
            Some("instance is still stopping".into())
        );
        assert_eq!(validate(Stop, Stopped), Some("already stopped".into()));
        assert_eq!(validate(Stop, Running), None);
        assert_eq!(validate(Reboot, Running), None);
        assert_eq!(
            validate(Reboot, Stopped),
            Some("cannot reboot a stopped instance".into())
        );
        assert!(validate(Start, Terminated).is_some());
        assert!(validate(Stop, ShuttingDown).is_some());
    }
}
