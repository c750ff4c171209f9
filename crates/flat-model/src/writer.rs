// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Atomic persistence of encoded models.
//!
//! Bytes are written to a temporary file in the destination directory,
//! synced, and renamed over the destination. A failure at any point leaves
//! the destination as it was: either absent or holding its previous
//! contents.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::codec;
use crate::model::FlatModel;
use crate::{FormatError, WriteError};

/// Writes EdgeFlat bytes to disk.
pub struct ModelWriter;

impl ModelWriter {
    /// Atomically writes `bytes` to `path` and returns the number of bytes
    /// written. The parent directory must already exist.
    pub fn save(bytes: &[u8], path: &Path) -> Result<u64, WriteError> {
        let parent = parent_dir(path);
        if !parent.is_dir() {
            return Err(WriteError::MissingParent { path: parent });
        }

        let io_err = |action: &'static str| {
            let path = path.to_path_buf();
            move |source: std::io::Error| WriteError::Io {
                action,
                path,
                source,
            }
        };

        let mut tmp =
            NamedTempFile::new_in(&parent).map_err(io_err("create temporary file for"))?;
        debug!("writing {} bytes via {}", bytes.len(), tmp.path().display());
        tmp.write_all(bytes).map_err(io_err("write"))?;
        tmp.flush().map_err(io_err("flush"))?;
        tmp.as_file().sync_all().map_err(io_err("sync"))?;
        tmp.persist(path).map_err(|e| io_err("rename into")(e.error))?;

        // Directory fsync makes the rename durable; not every platform
        // allows opening a directory, so failures are ignored.
        if let Ok(dir) = File::open(&parent) {
            let _ = dir.sync_all();
        }

        info!("wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(bytes.len() as u64)
    }
}

/// Reads and decodes an EdgeFlat file.
pub fn read_file(path: &Path) -> Result<FlatModel, FormatError> {
    let bytes = std::fs::read(path)?;
    codec::decode(&bytes)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_save_writes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.eflt");
        let n = ModelWriter::save(b"hello", &path).unwrap();
        assert_eq!(n, 5);
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        assert_eq!(entries(dir.path()), vec!["model.eflt".to_string()]);
    }

    #[test]
    fn test_save_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.eflt");
        std::fs::write(&path, b"old contents").unwrap();
        ModelWriter::save(b"new", &path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn test_missing_parent_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("model.eflt");
        let err = ModelWriter::save(b"x", &path).unwrap_err();
        assert!(matches!(err, WriteError::MissingParent { .. }));
        assert!(!dir.path().join("missing").exists());
    }

    #[test]
    fn test_failed_rename_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory at the destination makes the rename fail.
        let path = dir.path().join("occupied");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"k").unwrap();
        let err = ModelWriter::save(b"x", &path).unwrap_err();
        assert!(matches!(err, WriteError::Io { .. }));
        assert_eq!(entries(dir.path()), vec!["occupied".to_string()]);
        assert_eq!(std::fs::read(path.join("keep")).unwrap(), b"k");
    }

    #[test]
    fn test_read_file_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.eflt");
        std::fs::write(&path, vec![0u8; 128]).unwrap();
        assert!(matches!(read_file(&path), Err(FormatError::BadMagic(_))));
    }
}
