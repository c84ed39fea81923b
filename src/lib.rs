pub mod announce;
pub mod catalog;
pub mod db;
pub mod engine;
pub mod export;
pub mod matching;
pub mod models;
pub mod settings;
pub mod tracking;
pub mod utils;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use log::info;

use db::Database;
use engine::{EngineConfig, SignEngine};
use settings::{SettingsStore, SETTINGS_FILE_NAME};

pub const DATABASE_FILE_NAME: &str = "signcoach.sqlite3";
pub const DEFAULT_DATA_DIR: &str = "signcoach-data";

/// Process-wide handles opened once at start-up and flushed on drop.
pub struct AppState {
    pub data_dir: PathBuf,
    pub db: Database,
    pub settings: SettingsStore,
}

impl AppState {
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;

        let db = Database::new(data_dir.join(DATABASE_FILE_NAME))?;
        let settings = SettingsStore::new(data_dir.join(SETTINGS_FILE_NAME))?;
        info!("Data directory: {}", data_dir.display());

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            db,
            settings,
        })
    }

    /// Loads the catalog and ledger and applies the saved settings. Blocks
    /// on the DB thread.
    pub fn open_engine(&self, config: EngineConfig) -> Result<SignEngine> {
        let mut engine = SignEngine::open(config, Arc::new(self.db.clone()))?;
        engine.apply_settings(&self.settings.current(), Instant::now())?;
        Ok(engine)
    }

    /// [`AppState::open`] plus [`AppState::open_engine`] on the blocking
    /// pool, for use from async code.
    pub async fn start(data_dir: PathBuf, config: EngineConfig) -> Result<(Self, SignEngine)> {
        tokio::task::spawn_blocking(move || -> Result<(Self, SignEngine)> {
            let state = Self::open(&data_dir)?;
            let engine = state.open_engine(config)?;
            Ok((state, engine))
        })
        .await
        .context("start-up task panicked")?
    }

    /// Drops the state on the blocking pool. If this holds the last
    /// `Database` handle, that joins the DB thread after queued writes land.
    pub async fn close(self) -> Result<()> {
        tokio::task::spawn_blocking(move || drop(self))
            .await
            .context("shutdown task panicked")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HandFrame, HandSet, LandmarkPoint, HAND_LANDMARK_COUNT};

    #[test]
    fn state_round_trips_through_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let hand = HandFrame::new(vec![LandmarkPoint::new(0.1, 0.2, 0.3); HAND_LANDMARK_COUNT]);

        {
            let state = AppState::open(dir.path()).unwrap();
            state.settings.set_test_mode(false).unwrap();
            let mut engine = state.open_engine(EngineConfig::default()).unwrap();
            assert!(!engine.settings().test_mode);

            let now = Instant::now();
            engine.on_frame(vec![hand.clone()], now);
            engine.begin_recording("wave", now).unwrap();
            engine.poll_timers(now + engine.config().capture_window);
        }

        let state = AppState::open(dir.path()).unwrap();
        let engine = state.open_engine(EngineConfig::default()).unwrap();
        assert_eq!(
            engine.templates().get("wave").map(|t| &t.landmarks),
            Some(&HandSet::single(hand))
        );
        assert_eq!(engine.ledger().get("wave").unwrap().tested, 0);
        assert!(!engine.settings().test_mode);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn async_start_and_close_keep_writes() {
        let dir = tempfile::tempdir().unwrap();
        let hand = HandFrame::new(vec![LandmarkPoint::new(0.4, 0.6, 0.0); HAND_LANDMARK_COUNT]);

        let (state, mut engine) = AppState::start(dir.path().to_path_buf(), EngineConfig::default())
            .await
            .unwrap();
        let now = Instant::now();
        engine.on_frame(vec![hand], now);
        engine.begin_recording("point", now).unwrap();
        engine.poll_timers(now + engine.config().capture_window);
        drop(engine);
        state.close().await.unwrap();

        let (_state, engine) = AppState::start(dir.path().to_path_buf(), EngineConfig::default())
            .await
            .unwrap();
        assert!(engine.templates().contains("point"));
    }
}
