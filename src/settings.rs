use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::engine::validate_threshold;

pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// User-tunable engine switches, persisted across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    pub confidence_threshold: f32,
    pub announcements_enabled: bool,
    /// Test mode allows quizzes; practice mode only recognizes.
    pub test_mode: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.2,
            announcements_enabled: true,
            test_mode: true,
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<EngineSettings>,
}

impl SettingsStore {
    /// Loads `path`, falling back to defaults when the file is missing,
    /// unreadable as JSON, or holds an out-of-range threshold.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            parse_settings(&contents, &path)
        } else {
            EngineSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> EngineSettings {
        self.read().clone()
    }

    pub fn set_confidence_threshold(&self, value: f32) -> Result<EngineSettings> {
        let value = validate_threshold(value)?;
        self.update(|settings| settings.confidence_threshold = value)
    }

    pub fn set_announcements_enabled(&self, enabled: bool) -> Result<EngineSettings> {
        self.update(|settings| settings.announcements_enabled = enabled)
    }

    pub fn set_test_mode(&self, enabled: bool) -> Result<EngineSettings> {
        self.update(|settings| settings.test_mode = enabled)
    }

    fn update<F>(&self, apply: F) -> Result<EngineSettings>
    where
        F: FnOnce(&mut EngineSettings),
    {
        let mut guard = self.write();
        let mut next = guard.clone();
        apply(&mut next);
        self.persist(&next)?;
        *guard = next.clone();
        Ok(next)
    }

    fn persist(&self, data: &EngineSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, EngineSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, EngineSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn parse_settings(contents: &str, path: &Path) -> EngineSettings {
    match serde_json::from_str::<EngineSettings>(contents) {
        Ok(settings) if validate_threshold(settings.confidence_threshold).is_ok() => settings,
        Ok(settings) => {
            warn!(
                "Ignoring out-of-range threshold {} in {}",
                settings.confidence_threshold,
                path.display()
            );
            EngineSettings {
                confidence_threshold: EngineSettings::default().confidence_threshold,
                ..settings
            }
        }
        Err(err) => {
            warn!("Corrupt settings file {}, using defaults: {err}", path.display());
            EngineSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> SettingsStore {
        SettingsStore::new(dir.path().join(SETTINGS_FILE_NAME)).unwrap()
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(store_in(&dir).current(), EngineSettings::default());
    }

    #[test]
    fn updates_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.set_confidence_threshold(0.35).unwrap();
        store.set_test_mode(false).unwrap();
        drop(store);

        let reloaded = store_in(&dir).current();
        assert_eq!(reloaded.confidence_threshold, 0.35);
        assert!(!reloaded.test_mode);
        assert!(reloaded.announcements_enabled);
    }

    #[test]
    fn rejected_threshold_leaves_settings_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.set_confidence_threshold(0.9).is_err());
        assert_eq!(store.current().confidence_threshold, 0.2);
        assert!(!store.path().exists());
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(SETTINGS_FILE_NAME), "{not json").unwrap();
        assert_eq!(store_in(&dir).current(), EngineSettings::default());
    }

    #[test]
    fn partial_file_fills_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(SETTINGS_FILE_NAME),
            r#"{"announcementsEnabled": false, "confidenceThreshold": 3.0}"#,
        )
        .unwrap();
        let settings = store_in(&dir).current();
        assert!(!settings.announcements_enabled);
        assert_eq!(settings.confidence_threshold, 0.2);
        assert!(settings.test_mode);
    }
}
