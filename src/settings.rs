use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{Arc, RwLock},
};

/// Detection thresholds mirrored to the vision process.
///
/// Owned by the client and persisted across sessions; the remote process may
/// echo back its own copy, which takes precedence for the talking decision
/// (see [`ConfigHandle`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub h_min: f64,
    pub h_max: f64,
    pub v_min: f64,
    pub v_max: f64,
    pub ear_threshold: f64,
    pub audio_threshold: f64,
    pub include_talking: bool,
    pub include_objects: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            h_min: 0.20,
            h_max: 0.80,
            v_min: 0.39,
            v_max: 0.70,
            ear_threshold: 0.25,
            audio_threshold: 0.5,
            include_talking: true,
            include_objects: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EngineSettings {
    detection: DetectionConfig,
    character: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            character: "shrek".into(),
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<EngineSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            EngineSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn detection(&self) -> DetectionConfig {
        self.data.read().unwrap().detection.clone()
    }

    pub fn update_detection(&self, config: DetectionConfig) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.detection = config;
        self.persist(&guard)
    }

    pub fn character(&self) -> String {
        self.data.read().unwrap().character.clone()
    }

    pub fn set_character(&self, name: &str) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.character = name.to_string();
        self.persist(&guard)
    }

    fn persist(&self, data: &EngineSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

/// Shared view over the local settings plus the remote-authoritative config
/// echo. The remote side may veto talking detection it cannot currently
/// support, so `include_talking` comes from the echo whenever one is present;
/// thresholds always come from the local store.
#[derive(Clone)]
pub struct ConfigHandle {
    store: Arc<SettingsStore>,
    remote: Arc<RwLock<Option<DetectionConfig>>>,
}

impl ConfigHandle {
    pub fn new(store: Arc<SettingsStore>) -> Self {
        Self {
            store,
            remote: Arc::new(RwLock::new(None)),
        }
    }

    pub fn detection(&self) -> DetectionConfig {
        self.store.detection()
    }

    pub fn character(&self) -> String {
        self.store.character()
    }

    pub fn include_talking(&self) -> bool {
        match self.remote.read().unwrap().as_ref() {
            Some(remote) => remote.include_talking,
            None => self.store.detection().include_talking,
        }
    }

    pub fn set_remote(&self, config: DetectionConfig) {
        *self.remote.write().unwrap() = Some(config);
    }

    pub fn clear_remote(&self) {
        *self.remote.write().unwrap() = None;
    }
}
