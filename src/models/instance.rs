use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Confirmed remote lifecycle state. Mirrors the last confirmed snapshot
/// only; optimistic hints never land here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    Stopping,
    Stopped,
    ShuttingDown,
    Terminated,
}

impl InstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(InstanceState::Pending),
            "running" => Ok(InstanceState::Running),
            "stopping" => Ok(InstanceState::Stopping),
            "stopped" => Ok(InstanceState::Stopped),
            "shutting-down" => Ok(InstanceState::ShuttingDown),
            "terminated" => Ok(InstanceState::Terminated),
            other => Err(format!("unknown instance state: {}", other)),
        }
    }
}

/// The state a just-issued action is expected to drive the instance into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Pending,
    Stopping,
    /// Display-only hint for a reboot in flight; the confirmed state stays
    /// `running` throughout, so this is never adopted as a real state.
    Rebooting,
}

impl TargetState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetState::Pending => "pending",
            TargetState::Stopping => "stopping",
            TargetState::Rebooting => "rebooting",
        }
    }

    /// Whether an observed confirmed state corroborates this target, either
    /// exactly or as a valid successor in the transition it started.
    pub fn is_reached(&self, observed: InstanceState) -> bool {
        match self {
            TargetState::Pending => {
                matches!(observed, InstanceState::Pending | InstanceState::Running)
            }
            TargetState::Stopping => {
                matches!(observed, InstanceState::Stopping | InstanceState::Stopped)
            }
            // A reboot never changes the reported state, so there is nothing
            // to corroborate; the hint only clears by expiry.
            TargetState::Rebooting => false,
        }
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optimistic overlay: a short-lived local hint representing the expected
/// effect of a just-issued action, pending confirmation by a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overlay {
    pub target: TargetState,
    pub issued_at_tick: u64,
    pub expires_after_ticks: u64,
}

impl Overlay {
    pub fn expired(&self, now_tick: u64) -> bool {
        now_tick >= self.issued_at_tick.saturating_add(self.expires_after_ticks)
    }
}

/// A remote compute resource tracked locally by a cache entry.
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: String,
    pub region: String,
    pub name: String,
    pub instance_type: String,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
    pub launch_time: Option<DateTime<Utc>>,
    /// Last confirmed remote state.
    pub state: InstanceState,
    /// Local-only; pinned instances sort before unpinned on every read.
    pub pinned: bool,
    /// Set while the instance is absent from recent successful fetches but
    /// not yet evicted; prior data keeps showing until eviction.
    pub stale: bool,
    /// Updated only by the reconciler, never by the action dispatcher.
    pub last_confirmed: DateTime<Utc>,
    pub optimistic: Option<Overlay>,
}

impl Instance {
    /// State to show a user: the optimistic hint while one is live,
    /// the confirmed state otherwise.
    pub fn display_state(&self) -> &'static str {
        match &self.optimistic {
            Some(overlay) => overlay.target.as_str(),
            None => self.state.as_str(),
        }
    }
}

/// Control commands a user can issue against one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceAction {
    Start,
    Stop,
    Reboot,
}

impl InstanceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceAction::Start => "start",
            InstanceAction::Stop => "stop",
            InstanceAction::Reboot => "reboot",
        }
    }
}

impl fmt::Display for InstanceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
