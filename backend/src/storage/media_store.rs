use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;

const FALLBACK_EXTENSION: &str = "bin";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Upload is empty")]
    Empty,
}

/// Directory of uploaded images. Files are written once and never removed.
#[derive(Clone, Debug)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StorageError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Extension matching the content of `data`, regardless of the client filename.
    pub fn sniff_extension(data: &[u8]) -> &'static str {
        image::guess_format(data)
            .ok()
            .and_then(|format| format.extensions_str().first().copied())
            .unwrap_or(FALLBACK_EXTENSION)
    }

    pub fn generate_file_name(extension: &str) -> String {
        format!(
            "{}-{}.{}",
            Utc::now().timestamp_micros(),
            Uuid::new_v4().simple(),
            extension
        )
    }

    /// Writes `data` verbatim under a fresh name and returns the stored path.
    pub fn store(&self, data: &[u8]) -> Result<PathBuf, StorageError> {
        if data.is_empty() {
            return Err(StorageError::Empty);
        }

        let path = self
            .root
            .join(Self::generate_file_name(Self::sniff_extension(data)));

        // create_new: an existing file is an error, never overwritten
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;
        let written = file.write_all(data).and_then(|_| file.sync_all());
        drop(file);
        discard_on_error(&path, written)?;

        log::info!("Stored upload ({} bytes) at {}", data.len(), path.display());
        Ok(path)
    }
}

/// Removes a partially written file so failed uploads leave nothing behind.
fn discard_on_error<T>(path: &Path, result: std::io::Result<T>) -> Result<T, StorageError> {
    result.map_err(|source| {
        if let Err(e) = fs::remove_file(path) {
            log::warn!("Could not remove partial upload {}: {}", path.display(), e);
        }
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}
