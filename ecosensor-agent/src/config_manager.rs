//! Configuration persistence and the live configuration handle
//!
//! Handles:
//! - TOML config file under the OS config directory
//! - Dirty tracking (set by mutation, cleared by a successful load)
//! - Export/import for operator backup of settings
//! - [`LiveConfig`]: the shared handle the scheduler snapshots each tick

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use ecosensor_core::config::{ConfigSnapshot, SensorConfig};
use tokio::sync::watch;
use tracing::info;

use crate::state::{new_shared, Shared};

/// Loads, saves and tracks the on-disk sensor configuration.
pub struct ConfigManager {
    config: SensorConfig,
    path: PathBuf,
    dirty: bool,
}

impl ConfigManager {
    pub fn new(path: PathBuf) -> Self {
        Self {
            config: SensorConfig::default(),
            path,
            dirty: false,
        }
    }

    /// OS-specific default config file location.
    pub fn default_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir().context("could not find config directory")?;
        path.push("ecosensor");
        path.push("config.toml");
        Ok(path)
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Replace the configuration, marking it dirty until saved.
    pub fn set_config(&mut self, config: SensorConfig) {
        self.config = config;
        self.dirty = true;
    }

    /// Load from disk; a missing file falls back to built-in defaults.
    /// A successful load clears the dirty flag.
    pub async fn load(&mut self) -> Result<&SensorConfig> {
        if self.path.exists() {
            let content = tokio::fs::read_to_string(&self.path)
                .await
                .with_context(|| format!("reading config file {}", self.path.display()))?;
            self.config = toml::from_str(&content)
                .with_context(|| format!("parsing config file {}", self.path.display()))?;
            info!(path = %self.path.display(), "configuration loaded");
        } else {
            self.config = SensorConfig::default();
            info!("no config file found, using defaults");
        }
        self.dirty = false;
        Ok(&self.config)
    }

    /// Save to the configured path, creating parent directories.
    pub async fn save(&mut self) -> Result<()> {
        write_config(&self.config, &self.path).await?;
        self.dirty = false;
        info!(path = %self.path.display(), "configuration saved");
        Ok(())
    }

    /// Write the current configuration to an arbitrary path.
    pub async fn export_to(&self, path: &Path) -> Result<()> {
        write_config(&self.config, path).await
    }

    /// Replace the current configuration from an arbitrary path.
    /// The imported settings are dirty until saved to the regular location.
    pub async fn import_from(&mut self, path: &Path) -> Result<&SensorConfig> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config file {}", path.display()))?;
        self.config = toml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        self.dirty = true;
        Ok(&self.config)
    }

    pub fn reset_to_defaults(&mut self) {
        self.config = SensorConfig::default();
        self.dirty = true;
    }
}

async fn write_config(config: &SensorConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }
    let content = toml::to_string_pretty(config).context("serializing configuration")?;
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("writing config file {}", path.display()))?;
    Ok(())
}

/// Shared handle to the live configuration.
///
/// The settings UI (an external collaborator) replaces the configuration;
/// the scheduler takes an immutable, versioned snapshot at every tick so a
/// reload can never interleave into a running cycle.
#[derive(Clone)]
pub struct LiveConfig {
    inner: Shared<SensorConfig>,
    version: Arc<AtomicU64>,
    notify: watch::Sender<u64>,
}

impl LiveConfig {
    pub fn new(config: SensorConfig) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            inner: new_shared(config),
            version: Arc::new(AtomicU64::new(0)),
            notify,
        }
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        let config = self.inner.lock().clone();
        ConfigSnapshot::new(self.version.load(Ordering::Acquire), config)
    }

    pub fn replace(&self, config: SensorConfig) {
        *self.inner.lock() = config;
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        let _ = self.notify.send(version);
    }

    /// Subscribe to replacement notifications (the scheduler re-arms its
    /// timers when this fires).
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecosensor_core::config::{EprelHardwareKind, EprelMapping};

    fn sample_config() -> SensorConfig {
        SensorConfig {
            backend_url: "https://collector.example.org/event".to_string(),
            status_interval_secs: 45,
            heartbeat_interval_secs: 600,
            monitor_remote_sessions: false,
            idle_threshold_secs: 120,
            psu_efficiency: 0.9,
            eprel_mappings: vec![
                EprelMapping {
                    eprel_id: "100001".to_string(),
                    hardware_kind: EprelHardwareKind::Monitor,
                    manufacturer: "Dell".to_string(),
                    model_name: "U2720Q".to_string(),
                    energy_class: "F".to_string(),
                    power_on_watts: 28.5,
                    power_standby_watts: Some(0.3),
                },
                EprelMapping {
                    eprel_id: "100002".to_string(),
                    hardware_kind: EprelHardwareKind::Monitor,
                    manufacturer: "LG".to_string(),
                    model_name: "27UK650".to_string(),
                    energy_class: "G".to_string(),
                    power_on_watts: 31.0,
                    power_standby_watts: None,
                },
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn export_import_round_trip_preserves_all_fields() {
        let dir = tempfile::tempdir().unwrap();
        let export_path = dir.path().join("exported.toml");

        let mut manager = ConfigManager::new(dir.path().join("config.toml"));
        manager.set_config(sample_config());
        manager.export_to(&export_path).await.unwrap();

        let mut other = ConfigManager::new(dir.path().join("other.toml"));
        let imported = other.import_from(&export_path).await.unwrap().clone();

        assert_eq!(imported, sample_config());
        assert_eq!(imported.eprel_mappings.len(), 2);
        // Nested list order survives the round trip.
        assert_eq!(imported.eprel_mappings[0].model_name, "U2720Q");
        assert_eq!(imported.eprel_mappings[1].model_name, "27UK650");
    }

    #[tokio::test]
    async fn load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = ConfigManager::new(dir.path().join("absent.toml"));
        let config = manager.load().await.unwrap();
        assert_eq!(*config, SensorConfig::default());
        assert!(!manager.is_dirty());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut manager = ConfigManager::new(path.clone());
        manager.set_config(sample_config());
        manager.save().await.unwrap();
        assert!(!manager.is_dirty());

        let mut reloaded = ConfigManager::new(path);
        reloaded.load().await.unwrap();
        assert_eq!(*reloaded.config(), sample_config());
    }

    #[tokio::test]
    async fn dirty_flag_set_by_mutation_cleared_by_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = ConfigManager::new(dir.path().join("config.toml"));
        assert!(!manager.is_dirty());

        manager.set_config(sample_config());
        assert!(manager.is_dirty());

        // Load succeeds (falls back to defaults) and clears the flag.
        manager.load().await.unwrap();
        assert!(!manager.is_dirty());

        manager.reset_to_defaults();
        assert!(manager.is_dirty());
    }

    #[test]
    fn live_config_snapshots_are_versioned() {
        let live = LiveConfig::new(SensorConfig::default());
        let first = live.snapshot();
        assert_eq!(first.version(), 0);

        let mut updated = SensorConfig::default();
        updated.status_interval_secs = 5;
        live.replace(updated);

        let second = live.snapshot();
        assert_eq!(second.version(), 1);
        assert_eq!(second.status_interval_secs, 5);
        // Earlier snapshot is unaffected by the reload.
        assert_eq!(first.status_interval_secs, 60);
    }
}
