//! CloudEvents 1.0 telemetry envelope construction
//!
//! The factory turns current agent state into wire-ready envelopes. It has
//! no failure path: missing inputs degrade to empty sub-objects and `data`
//! is never null.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::energy::EnergyState;
use crate::hardware::{HardwareSnapshot, UserActivityReading};
use crate::projection::EnergyReport;

/// CloudEvents specification version emitted in every envelope.
pub const SPEC_VERSION: &str = "1.0";

/// Reverse-DNS namespace prefixing every event type.
pub const EVENT_TYPE_BASE: &str = "eu.unlock.ecosensor";

/// Standardized telemetry message wrapper (CloudEvents 1.0 attributes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEnvelope {
    #[serde(rename = "specversion")]
    pub spec_version: String,
    /// Globally unique per construction, even for identical payloads.
    pub id: String,
    pub source: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// ISO-8601 UTC timestamp of construction.
    pub time: String,
    #[serde(rename = "datacontenttype")]
    pub data_content_type: String,
    pub subject: String,
    /// Structured payload; always a JSON object, never null.
    pub data: Value,
}

/// Builds envelopes for one agent identity (stable `source` per process).
pub struct EventFactory {
    hostname: String,
    source: String,
}

impl EventFactory {
    /// Factory keyed on the machine's lowercase hostname.
    pub fn new() -> Self {
        let name = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self::with_hostname(&name)
    }

    pub fn with_hostname(name: &str) -> Self {
        let hostname = name.to_lowercase();
        let source = format!("urn:ecosensor:{hostname}");
        Self { hostname, source }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Full status event: hardware, user activity and energy sections.
    /// Missing inputs become empty objects so consumers always find the key.
    pub fn build_status_event(
        &self,
        hardware: Option<&HardwareSnapshot>,
        activity: Option<&UserActivityReading>,
        energy: Option<&EnergyState>,
    ) -> TelemetryEnvelope {
        let now = Utc::now();
        let data = json!({
            "hostname": self.hostname,
            "timestamp": now.to_rfc3339(),
            "hardware": to_object(hardware),
            "userActivity": to_object(activity),
            "energy": to_object(energy),
        });
        self.envelope("status", now, data)
    }

    /// Lightweight liveness ping.
    pub fn build_heartbeat_event(&self, energy: Option<&EnergyState>) -> TelemetryEnvelope {
        let now = Utc::now();
        let data = json!({
            "hostname": self.hostname,
            "timestamp": now.to_rfc3339(),
            "energy": to_object(energy),
        });
        self.envelope("heartbeat", now, data)
    }

    /// Sent once at agent startup so the collector learns this machine.
    pub fn build_registration_event(&self, os: &str, agent_version: &str) -> TelemetryEnvelope {
        let now = Utc::now();
        let data = json!({
            "hostname": self.hostname,
            "timestamp": now.to_rfc3339(),
            "os": os,
            "agentVersion": agent_version,
        });
        self.envelope("registration", now, data)
    }

    /// Emitted when the status tick observes a day rollover, carrying the
    /// finished day's total and its projections.
    pub fn build_daily_summary_event(
        &self,
        summary_date: chrono::NaiveDate,
        report: &EnergyReport,
    ) -> TelemetryEnvelope {
        let now = Utc::now();
        let data = json!({
            "hostname": self.hostname,
            "timestamp": now.to_rfc3339(),
            "summaryDate": summary_date.format("%Y-%m-%d").to_string(),
            "energy": to_object(Some(report)),
        });
        self.envelope("summary.daily", now, data)
    }

    fn envelope(&self, kind: &str, now: DateTime<Utc>, data: Value) -> TelemetryEnvelope {
        TelemetryEnvelope {
            spec_version: SPEC_VERSION.to_string(),
            id: Uuid::new_v4().to_string(),
            source: self.source.clone(),
            event_type: format!("{EVENT_TYPE_BASE}.{kind}"),
            time: now.to_rfc3339(),
            data_content_type: "application/json".to_string(),
            subject: self.hostname.clone(),
            data,
        }
    }
}

impl Default for EventFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize a section, degrading to an empty object on missing input or
/// serializer refusal. Guarantees the factory never raises.
fn to_object<T: Serialize>(value: Option<&T>) -> Value {
    value
        .and_then(|v| serde_json::to_value(v).ok())
        .unwrap_or_else(|| json!({}))
}
