//! Sensor configuration model
//!
//! The agent reads an immutable [`ConfigSnapshot`] at the start of every
//! scheduler tick, so a concurrent reload from the settings UI can never
//! interleave a partial update into a single cycle.

use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default PSU efficiency (85%), typical for a non-certified desktop supply.
pub const DEFAULT_PSU_EFFICIENCY: f64 = 0.85;

/// Kind of hardware an EPREL catalog entry maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EprelHardwareKind {
    Monitor,
    Disk,
    Gpu,
    Other,
}

/// One hardware -> EU energy label (EPREL) mapping.
///
/// Used to refine per-device power estimates: a display whose model name
/// matches an entry uses the rated power-on wattage instead of a fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EprelMapping {
    /// EPREL catalog registration number.
    pub eprel_id: String,
    pub hardware_kind: EprelHardwareKind,
    pub manufacturer: String,
    pub model_name: String,
    /// EU energy label class (A-G).
    pub energy_class: String,
    /// Rated power draw while on, in watts.
    pub power_on_watts: f64,
    /// Rated standby draw, when the label lists one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_standby_watts: Option<f64>,
}

/// Operator settings consumed by the scheduler and the energy model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Backend collector endpoint for telemetry envelopes.
    pub backend_url: String,
    /// Seconds between status events (>= 1).
    pub status_interval_secs: u64,
    /// Seconds between heartbeat events (>= 1).
    pub heartbeat_interval_secs: u64,
    pub monitor_cpu: bool,
    pub monitor_displays: bool,
    pub monitor_user_activity: bool,
    pub monitor_remote_sessions: bool,
    /// Seconds of inactivity before the user counts as idle.
    pub idle_threshold_secs: u64,
    /// PSU efficiency in (0, 1]; out-of-range values are clamped.
    pub psu_efficiency: f64,
    /// Log verbosity directive (tracing env-filter syntax).
    pub log_level: String,
    /// Ordered hardware -> energy-class mappings.
    pub eprel_mappings: Vec<EprelMapping>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8080/event".to_string(),
            status_interval_secs: 60,
            heartbeat_interval_secs: 300,
            monitor_cpu: true,
            monitor_displays: true,
            monitor_user_activity: true,
            monitor_remote_sessions: true,
            idle_threshold_secs: 300,
            psu_efficiency: DEFAULT_PSU_EFFICIENCY,
            log_level: "info".to_string(),
            eprel_mappings: Vec::new(),
        }
    }
}

impl SensorConfig {
    /// Clamp out-of-range values in place, logging a warning for each.
    /// Non-fatal: the agent keeps running on substituted values.
    pub fn sanitize(&mut self) {
        if !(self.psu_efficiency > 0.0 && self.psu_efficiency <= 1.0) {
            let clamped = if self.psu_efficiency > 1.0 {
                1.0
            } else {
                DEFAULT_PSU_EFFICIENCY
            };
            warn!(
                value = self.psu_efficiency,
                clamped, "psu efficiency out of (0,1], substituting"
            );
            self.psu_efficiency = clamped;
        }
        if self.status_interval_secs == 0 {
            warn!("status interval must be >= 1s, substituting 1s");
            self.status_interval_secs = 1;
        }
        if self.heartbeat_interval_secs == 0 {
            warn!("heartbeat interval must be >= 1s, substituting 1s");
            self.heartbeat_interval_secs = 1;
        }
    }

    /// Find the rated power-on wattage for a display model, if mapped.
    ///
    /// Matches the first `Monitor` entry whose model name appears in the
    /// detected model string (entries are ordered by operator preference).
    pub fn display_power_for(&self, model: &str) -> Option<f64> {
        self.eprel_mappings
            .iter()
            .find(|m| {
                m.hardware_kind == EprelHardwareKind::Monitor
                    && !m.model_name.is_empty()
                    && model.contains(&m.model_name)
            })
            .map(|m| m.power_on_watts)
    }
}

/// Immutable, versioned view of the configuration for one scheduler cycle.
///
/// Cheap to clone; the version increases every time the live configuration
/// is replaced, letting the scheduler notice interval changes.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    version: u64,
    inner: Arc<SensorConfig>,
}

impl ConfigSnapshot {
    /// Take a snapshot of a (sanitized copy of a) configuration.
    pub fn new(version: u64, mut config: SensorConfig) -> Self {
        config.sanitize();
        Self {
            version,
            inner: Arc::new(config),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

impl Deref for ConfigSnapshot {
    type Target = SensorConfig;

    fn deref(&self) -> &SensorConfig {
        &self.inner
    }
}
