//! Project Descriptor
//!
//! `<repo_root>/.ckb/project.json` records the detected language and
//! indexer for a repository. It is independent of the database: written
//! atomically via temp file + rename, never touched by schema migrations
//! (spec §6).

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::CKB_DIR;
use crate::error::{Error, Result};

/// Filename within `CKB_DIR`.
pub const PROJECT_FILENAME: &str = "project.json";

/// Detected language and indexer for a repository root. Populated by the
/// external indexer (spec §1 "deliberately out of scope"); the store only
/// persists and reads it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDescriptor {
    pub language: String,
    pub indexer: String,
}

/// Reads and writes `project.json` under a repository root's `.ckb/`
/// directory, independently of the `StorageEngine`'s database file.
pub struct ProjectFile {
    path: PathBuf,
}

impl ProjectFile {
    /// Path is `<repo_root>/.ckb/project.json`; the directory is not
    /// created here, since `StorageEngine::open` already creates it.
    pub fn new(repo_root: &Path) -> Self {
        Self {
            path: repo_root.join(CKB_DIR).join(PROJECT_FILENAME),
        }
    }

    /// `Ok(None)` if the file doesn't exist yet.
    pub fn read(&self) -> Result<Option<ProjectDescriptor>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Error::Io(err)),
        };
        let descriptor = serde_json::from_str(&raw)
            .map_err(|e| Error::DataCorruption(format!("project.json: {e}")))?;
        Ok(Some(descriptor))
    }

    /// Writes atomically: serialize to a sibling temp file, flush, then
    /// rename over the target so readers never observe a partial write.
    pub fn write(&self, descriptor: &ProjectDescriptor) -> Result<()> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| Error::Init("project.json path has no parent directory".to_string()))?;
        std::fs::create_dir_all(parent)?;

        let payload = serde_json::to_vec_pretty(descriptor)
            .map_err(|e| Error::DataCorruption(format!("project.json: {e}")))?;

        let tmp_path = parent.join(format!(
            "{}.tmp",
            self.path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(PROJECT_FILENAME)
        ));

        {
            let mut tmp = std::fs::File::create(&tmp_path)?;
            tmp.write_all(&payload)?;
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let file = ProjectFile::new(dir.path());
        assert_eq!(file.read().unwrap(), None);
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let file = ProjectFile::new(dir.path());
        let descriptor = ProjectDescriptor {
            language: "rust".to_string(),
            indexer: "rust-analyzer".to_string(),
        };
        file.write(&descriptor).unwrap();
        assert_eq!(file.read().unwrap(), Some(descriptor));
    }

    #[test]
    fn write_overwrites_an_existing_file_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let file = ProjectFile::new(dir.path());
        file.write(&ProjectDescriptor {
            language: "rust".to_string(),
            indexer: "rust-analyzer".to_string(),
        })
        .unwrap();
        file.write(&ProjectDescriptor {
            language: "typescript".to_string(),
            indexer: "tsserver".to_string(),
        })
        .unwrap();

        let descriptor = file.read().unwrap().unwrap();
        assert_eq!(descriptor.language, "typescript");
        assert_eq!(descriptor.indexer, "tsserver");

        let tmp_path = dir.path().join(CKB_DIR).join(format!("{PROJECT_FILENAME}.tmp"));
        assert!(!tmp_path.exists());
    }
}
