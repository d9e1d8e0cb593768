//! Where discovery checkpoints are kept between runs

use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::error::Result;
use crate::zia::Checkpoint;

pub trait CheckpointStore {
    /// The last saved checkpoint, if any
    fn load(&mut self) -> Result<Option<Checkpoint>>;
    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()>;
}

/// Pretty-printed JSON on disk.  Saves go to a sibling temp file that is renamed over the
/// target, so a crash never leaves a half-written checkpoint.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CheckpointStore for JsonFileStore {
    fn load(&mut self) -> Result<Option<Checkpoint>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        let tmp = self.temp_path();
        let text = serde_json::to_string_pretty(checkpoint)?;
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        debug!("checkpoint saved to {}", self.path.display());
        Ok(())
    }
}

/// Keeps the checkpoint in memory and counts saves
#[derive(Default)]
pub struct MemoryStore {
    pub checkpoint: Option<Checkpoint>,
    pub saves: usize,
}

impl CheckpointStore for MemoryStore {
    fn load(&mut self) -> Result<Option<Checkpoint>> {
        Ok(self.checkpoint.clone())
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        self.checkpoint = Some(checkpoint.clone());
        self.saves += 1;
        Ok(())
    }
}
