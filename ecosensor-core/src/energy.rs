//! Energy estimation model
//!
//! Turns one hardware snapshot plus the PSU efficiency into an instantaneous
//! power estimate, and integrates power over elapsed time into session and
//! daily energy counters.
//!
//! Integration uses the left-rectangle rule: each interval is charged at the
//! power level held *before* the current update, so results are deterministic
//! and no estimate buffering is needed. The daily counter resets exactly once
//! when the local calendar date changes, before the new day's first interval
//! is integrated.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{ConfigSnapshot, DEFAULT_PSU_EFFICIENCY};
use crate::hardware::HardwareSnapshot;

/// Idle draw of the base system (mainboard, fans, peripherals) in watts.
pub const BASE_SYSTEM_POWER_WATTS: f64 = 30.0;

/// Per-display fallback when neither an EPREL mapping nor a rated value is
/// known (average desktop monitor).
pub const FALLBACK_DISPLAY_WATTS: f64 = 35.0;

/// Accumulated energy counters. Single live instance per running agent,
/// owned by [`EnergyModel`] and mutated only from the scheduler's status
/// tick context.
#[derive(Debug, Clone, Serialize)]
pub struct EnergyState {
    pub session_start_utc: DateTime<Utc>,
    pub session_energy_wh: f64,
    pub daily_energy_wh: f64,
    pub last_power_watts: f64,
    pub last_sample_utc: Option<DateTime<Utc>>,
    pub psu_efficiency: f64,
}

/// Instantaneous power breakdown produced by one update cycle.
///
/// `total_power_watts` is AC-side (wall socket) draw: the DC component sum
/// divided by the PSU efficiency, so it exceeds the component sum whenever
/// efficiency < 1.
#[derive(Debug, Clone, Serialize)]
pub struct PowerEstimate {
    pub base_power_watts: f64,
    pub cpu_power_watts: Option<f64>,
    pub display_power_watts: Option<f64>,
    pub psu_efficiency: f64,
    pub total_power_watts: f64,
}

/// The energy accumulation state machine.
pub struct EnergyModel {
    state: EnergyState,
}

impl EnergyModel {
    /// Create a model with zeroed counters and `session_start_utc = now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: EnergyState {
                session_start_utc: now,
                session_energy_wh: 0.0,
                daily_energy_wh: 0.0,
                last_power_watts: 0.0,
                last_sample_utc: None,
                psu_efficiency: DEFAULT_PSU_EFFICIENCY,
            },
        }
    }

    pub fn state(&self) -> &EnergyState {
        &self.state
    }

    /// Estimate instantaneous power and integrate the elapsed interval.
    ///
    /// Never fails: a missing snapshot or missing sub-readings produce a
    /// baseline-only estimate. The first sample establishes the baseline
    /// without integrating anything.
    pub fn update(
        &mut self,
        snapshot: Option<&HardwareSnapshot>,
        config: &ConfigSnapshot,
        now: DateTime<Utc>,
    ) -> PowerEstimate {
        let mut efficiency = config.psu_efficiency;
        if !(efficiency > 0.0 && efficiency <= 1.0) {
            let clamped = if efficiency > 1.0 {
                1.0
            } else {
                DEFAULT_PSU_EFFICIENCY
            };
            warn!(value = efficiency, clamped, "psu efficiency out of range");
            efficiency = clamped;
        }

        let cpu_power_watts = if config.monitor_cpu {
            snapshot
                .and_then(|s| s.cpu.as_ref())
                .map(|c| c.estimated_power_watts)
        } else {
            None
        };

        let display_power_watts = if config.monitor_displays {
            snapshot.and_then(|s| s.displays.as_ref()).map(|displays| {
                displays
                    .iter()
                    .filter(|d| d.active)
                    .map(|d| {
                        config
                            .display_power_for(&d.model)
                            .or(d.rated_power_watts)
                            .unwrap_or(FALLBACK_DISPLAY_WATTS)
                    })
                    .sum()
            })
        } else {
            None
        };

        let dc_power = BASE_SYSTEM_POWER_WATTS
            + cpu_power_watts.unwrap_or(0.0)
            + display_power_watts.unwrap_or(0.0);
        let total_power_watts = dc_power / efficiency;

        if let Some(last) = self.state.last_sample_utc {
            // Reset the daily counter before integrating into the new day.
            let last_date = last.with_timezone(&Local).date_naive();
            let now_date = now.with_timezone(&Local).date_naive();
            if now_date != last_date {
                debug!(
                    previous_wh = self.state.daily_energy_wh,
                    "daily rollover, resetting counter"
                );
                self.state.daily_energy_wh = 0.0;
            }

            let delta_hours = (now - last).num_milliseconds() as f64 / 3_600_000.0;
            if delta_hours > 0.0 {
                let energy_wh = self.state.last_power_watts * delta_hours;
                self.state.session_energy_wh += energy_wh;
                self.state.daily_energy_wh += energy_wh;
            }
        }

        self.state.last_power_watts = total_power_watts;
        self.state.last_sample_utc = Some(now);
        self.state.psu_efficiency = efficiency;

        PowerEstimate {
            base_power_watts: BASE_SYSTEM_POWER_WATTS,
            cpu_power_watts,
            display_power_watts,
            psu_efficiency: efficiency,
            total_power_watts,
        }
    }

    /// Begin a new accumulation session. Leaves the daily counter alone.
    pub fn start_new_session(&mut self, now: DateTime<Utc>) {
        self.state.session_start_utc = now;
        self.state.session_energy_wh = 0.0;
    }

    /// Zero all counters. The session start timestamp is kept; use
    /// [`EnergyModel::start_new_session`] to advance it.
    pub fn reset(&mut self) {
        self.state.session_energy_wh = 0.0;
        self.state.daily_energy_wh = 0.0;
        self.state.last_power_watts = 0.0;
    }
}
