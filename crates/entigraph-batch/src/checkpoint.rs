//! Checkpoint persistence
//!
//! The checkpoint is the orchestrator's crash boundary: it is written
//! atomically (temp file in the same directory, then rename) after each
//! sub-batch, so a crash at any instant leaves either the previous or
//! the new checkpoint on disk, never a partial file.

use std::path::{Path, PathBuf};

use entigraph_core::{Checkpoint, EngineError, Result};

/// File-backed checkpoint store
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint if one exists.
    ///
    /// A missing file is a clean start (`Ok(None)`). A file that exists
    /// but does not parse is [`EngineError::CheckpointCorrupt`]: the
    /// caller must not silently restart from scratch, since that would
    /// re-spend external-call quota.
    pub fn load(&self) -> Result<Option<Checkpoint>> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|e| EngineError::CheckpointCorrupt(format!("{}: {e}", self.path.display())))
    }

    /// Persist the checkpoint atomically
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let json = serde_json::to_vec_pretty(checkpoint)?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }

        let mut tmp = tempfile::NamedTempFile::new_in(if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        })?;
        std::io::Write::write_all(&mut tmp, &json)?;
        tmp.persist(&self.path).map_err(|e| EngineError::Io(e.error))?;

        tracing::debug!(
            path = %self.path.display(),
            processed = checkpoint.processed_ids.len(),
            "checkpoint written"
        );
        Ok(())
    }

    /// Archive the checkpoint after a successful full run so the next
    /// run starts clean while the final progress record is retained.
    pub fn archive(&self) -> Result<()> {
        if self.path.exists() {
            let mut archived = self.path.as_os_str().to_owned();
            archived.push(".done");
            std::fs::rename(&self.path, PathBuf::from(archived))?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_missing_checkpoint_is_clean_start() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("cp.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("cp.json"));

        let mut checkpoint = Checkpoint::default();
        checkpoint.processed_ids.insert(Uuid::new_v4());
        checkpoint.processed_ids.insert(Uuid::new_v4());
        checkpoint.last_updated = Some(Utc::now());
        checkpoint.stats.classified = 2;
        store.save(&checkpoint).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.processed_ids, checkpoint.processed_ids);
        assert_eq!(loaded.stats.classified, 2);
    }

    #[test]
    fn test_corrupt_checkpoint_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp.json");
        std::fs::write(&path, b"{ truncated").unwrap();

        let store = CheckpointStore::new(&path);
        let err = store.load().unwrap_err();
        assert!(matches!(err, EngineError::CheckpointCorrupt(_)));
    }

    #[test]
    fn test_save_overwrites_previous() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("cp.json"));

        let mut first = Checkpoint::default();
        first.processed_ids.insert(Uuid::new_v4());
        store.save(&first).unwrap();

        let mut second = first.clone();
        second.processed_ids.insert(Uuid::new_v4());
        store.save(&second).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.processed_ids.len(), 2);
    }

    #[test]
    fn test_archive_moves_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp.json");
        let store = CheckpointStore::new(&path);
        store.save(&Checkpoint::default()).unwrap();

        store.archive().unwrap();
        assert!(!path.exists());
        assert!(dir.path().join("cp.json.done").exists());
        // Archiving twice is harmless
        store.archive().unwrap();
    }
}
