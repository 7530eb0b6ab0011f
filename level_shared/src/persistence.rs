//! High-score persistence.
//!
//! One integer per save slot. The stored value is read once when the level
//! starts and only ever overwritten by a strictly greater session score, so
//! after a session with score `S` over a stored `H` the slot holds
//! `max(S, H)`.

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Durable storage for per-slot high scores.
pub trait ScoreStore: Send {
    fn load(&self, slot: u8) -> anyhow::Result<u32>;
    fn store(&mut self, slot: u8, score: u32) -> anyhow::Result<()>;
}

/// In-memory store, useful for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryScoreStore {
    slots: HashMap<u8, u32>,
    writes: usize,
}

impl MemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slot(slot: u8, score: u32) -> Self {
        let mut store = Self::new();
        store.slots.insert(slot, score);
        store
    }

    /// Number of `store` calls seen.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl ScoreStore for MemoryScoreStore {
    fn load(&self, slot: u8) -> anyhow::Result<u32> {
        Ok(self.slots.get(&slot).copied().unwrap_or(0))
    }

    fn store(&mut self, slot: u8, score: u32) -> anyhow::Result<()> {
        self.slots.insert(slot, score);
        self.writes += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SavedScore {
    score: u32,
    saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SaveFile {
    #[serde(default)]
    slots: BTreeMap<u8, SavedScore>,
}

/// JSON save file on disk. A missing file reads as all zeros.
#[derive(Debug, Clone)]
pub struct JsonScoreStore {
    path: PathBuf,
}

impl JsonScoreStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> anyhow::Result<SaveFile> {
        if !self.path.exists() {
            return Ok(SaveFile::default());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("read save file {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parse save file {}", self.path.display()))
    }
}

impl ScoreStore for JsonScoreStore {
    fn load(&self, slot: u8) -> anyhow::Result<u32> {
        Ok(self.read()?.slots.get(&slot).map_or(0, |s| s.score))
    }

    fn store(&mut self, slot: u8, score: u32) -> anyhow::Result<()> {
        let mut save = self.read()?;
        save.slots.insert(
            slot,
            SavedScore {
                score,
                saved_at: Utc::now(),
            },
        );
        let json = serde_json::to_string_pretty(&save).context("serialize save file")?;
        fs::write(&self.path, json)
            .with_context(|| format!("write save file {}", self.path.display()))?;
        Ok(())
    }
}

/// High score for one slot, as loaded at level start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighScore {
    slot: u8,
    stored: u32,
}

impl HighScore {
    pub fn load(store: &dyn ScoreStore, slot: u8) -> anyhow::Result<Self> {
        let stored = store.load(slot)?;
        debug!(slot, stored, "High score loaded");
        Ok(Self { slot, stored })
    }

    pub fn value(&self) -> u32 {
        self.stored
    }

    /// Persists `score` if it beats the stored value. Returns whether it did.
    pub fn commit(&mut self, store: &mut dyn ScoreStore, score: u32) -> anyhow::Result<bool> {
        if score <= self.stored {
            return Ok(false);
        }
        store.store(self.slot, score)?;
        info!(slot = self.slot, previous = self.stored, score, "New high score");
        self.stored = score;
        Ok(true)
    }
}
