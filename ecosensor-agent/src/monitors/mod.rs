//! Best-effort hardware and activity probes
//!
//! Each probe returns whatever the platform exposes cheaply and degrades to
//! `None` where it exposes nothing. The energy model and the event factory
//! substitute defaults; a failing probe never fails a tick.

use chrono::Utc;
use ecosensor_core::config::ConfigSnapshot;
use ecosensor_core::hardware::{
    CpuReading, DisplayReading, HardwareSnapshot, RemoteSessionReading, UserActivityReading,
};
use sysinfo::System;

/// Default CPU thermal design power when the platform reports none.
pub const DEFAULT_CPU_TDP_WATTS: f64 = 65.0;

/// Fraction of TDP a CPU draws while idle.
const CPU_IDLE_TDP_FRACTION: f64 = 0.15;

/// Samples all enabled sources into one snapshot per scheduler tick.
pub struct MonitorSet {
    system: System,
    cpu_tdp_watts: f64,
}

impl MonitorSet {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            cpu_tdp_watts: DEFAULT_CPU_TDP_WATTS,
        }
    }

    /// Gather readings from every source the configuration enables.
    pub fn collect(&mut self, config: &ConfigSnapshot) -> HardwareSnapshot {
        let collected_at = Utc::now();
        let cpu = if config.monitor_cpu {
            Some(self.sample_cpu())
        } else {
            None
        };
        let displays = if config.monitor_displays {
            collect_displays()
        } else {
            None
        };
        let user_activity = if config.monitor_user_activity {
            Some(sample_user_activity(config.idle_threshold_secs))
        } else {
            None
        };
        let remote_session = if config.monitor_remote_sessions {
            Some(detect_remote_session())
        } else {
            None
        };

        HardwareSnapshot {
            collected_at,
            cpu,
            displays,
            user_activity,
            remote_session,
        }
    }

    fn sample_cpu(&mut self) -> CpuReading {
        self.system.refresh_cpu_usage();
        let usage_percent = f64::from(self.system.global_cpu_info().cpu_usage()).clamp(0.0, 100.0);
        CpuReading {
            usage_percent,
            estimated_power_watts: estimate_cpu_power(usage_percent, self.cpu_tdp_watts),
        }
    }
}

impl Default for MonitorSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Linear TDP heuristic: an idle floor plus utilization-proportional draw.
pub fn estimate_cpu_power(usage_percent: f64, tdp_watts: f64) -> f64 {
    let idle_watts = tdp_watts * CPU_IDLE_TDP_FRACTION;
    idle_watts + (usage_percent / 100.0) * (tdp_watts - idle_watts)
}

/// Whether the user counts as idle for reporting purposes. Unknown idle
/// time means the user is assumed active.
pub fn classify_idle(idle_seconds: Option<u64>, threshold_secs: u64) -> bool {
    idle_seconds.is_some_and(|s| s >= threshold_secs)
}

/// Enumerate connected display connectors via the DRM sysfs on Linux.
/// Other platforms report nothing; the model falls back per display config.
fn collect_displays() -> Option<Vec<DisplayReading>> {
    #[cfg(target_os = "linux")]
    {
        let entries = std::fs::read_dir("/sys/class/drm").ok()?;
        let mut displays = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            // Connector entries look like card0-HDMI-A-1; the bare card
            // device has no status file.
            let status_path = entry.path().join("status");
            let Ok(status) = std::fs::read_to_string(&status_path) else {
                continue;
            };
            if status.trim() == "connected" {
                displays.push(DisplayReading {
                    model: name,
                    manufacturer: None,
                    rated_power_watts: None,
                    active: true,
                });
            }
        }
        tracing::debug!(count = displays.len(), "connected displays detected");
        if displays.is_empty() {
            None
        } else {
            Some(displays)
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

fn sample_user_activity(idle_threshold_secs: u64) -> UserActivityReading {
    let user_name = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok();
    // No cheap cross-platform last-input probe; idle time stays unknown
    // and the user is reported active.
    let idle_seconds = None;
    UserActivityReading {
        logged_in: user_name.is_some(),
        user_name,
        idle_seconds,
        is_idle: classify_idle(idle_seconds, idle_threshold_secs),
    }
}

fn detect_remote_session() -> RemoteSessionReading {
    remote_from_env(
        std::env::var("SSH_CONNECTION")
            .or_else(|_| std::env::var("SSH_CLIENT"))
            .ok()
            .as_deref(),
        std::env::var("SESSIONNAME").ok().as_deref(),
    )
}

/// Remote access detection from session environment: SSH variables on
/// Unix-likes, RDP session names on Windows.
fn remote_from_env(ssh_connection: Option<&str>, session_name: Option<&str>) -> RemoteSessionReading {
    if let Some(conn) = ssh_connection {
        let client = conn.split_whitespace().next().map(str::to_string);
        return RemoteSessionReading {
            active: true,
            client_name: client,
        };
    }
    if session_name.is_some_and(|s| s.to_uppercase().starts_with("RDP-")) {
        return RemoteSessionReading {
            active: true,
            client_name: session_name.map(str::to_string),
        };
    }
    RemoteSessionReading {
        active: false,
        client_name: None,
    }
}
