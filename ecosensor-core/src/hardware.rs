//! Best-effort hardware and activity readings
//!
//! Every sub-reading is optional: the OS probes are external collaborators
//! and any of them may fail or be disabled. The energy model and the event
//! factory degrade to defaults instead of failing a tick.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// CPU utilization plus the probe's own power estimate.
#[derive(Debug, Clone, Serialize)]
pub struct CpuReading {
    pub usage_percent: f64,
    /// Estimated draw in watts, derived from TDP and utilization.
    pub estimated_power_watts: f64,
}

/// One attached display and whatever identity the platform exposes.
#[derive(Debug, Clone, Serialize)]
pub struct DisplayReading {
    pub model: String,
    pub manufacturer: Option<String>,
    /// Rated on-state draw, when the probe knows it (e.g. from EDID).
    pub rated_power_watts: Option<f64>,
    pub active: bool,
}

/// User presence and idle state.
#[derive(Debug, Clone, Serialize)]
pub struct UserActivityReading {
    pub logged_in: bool,
    pub user_name: Option<String>,
    /// Seconds since the last input event, when the platform reports it.
    pub idle_seconds: Option<u64>,
    /// Whether the idle threshold has been crossed.
    pub is_idle: bool,
}

/// Remote access state (RDP, SSH, remote support tools).
#[derive(Debug, Clone, Serialize)]
pub struct RemoteSessionReading {
    pub active: bool,
    pub client_name: Option<String>,
}

/// One sampling cycle's worth of readings. Any field may be `None`.
#[derive(Debug, Clone, Serialize)]
pub struct HardwareSnapshot {
    pub collected_at: DateTime<Utc>,
    pub cpu: Option<CpuReading>,
    pub displays: Option<Vec<DisplayReading>>,
    pub user_activity: Option<UserActivityReading>,
    pub remote_session: Option<RemoteSessionReading>,
}

impl HardwareSnapshot {
    /// An empty snapshot carrying only its collection time.
    pub fn empty(collected_at: DateTime<Utc>) -> Self {
        Self {
            collected_at,
            cpu: None,
            displays: None,
            user_activity: None,
            remote_session: None,
        }
    }
}
