//! Upload storage
//!
//! Uploaded PDFs are stored under generated UUID names; the client's file
//! name is only kept in a JSON metadata sidecar, never used as a path.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadMetadata {
    pub id: Uuid,
    pub original_filename: String,
    pub size_bytes: usize,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct StoredUpload {
    pub path: PathBuf,
    pub metadata: UploadMetadata,
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `data` as `<uuid>.pdf` plus `<uuid>.json` metadata
    pub fn save(&self, original_filename: &str, data: &[u8]) -> io::Result<StoredUpload> {
        let id = Uuid::new_v4();
        let path = self.dir.join(format!("{}.pdf", id));
        fs::write(&path, data)?;

        let metadata = UploadMetadata {
            id,
            original_filename: original_filename.to_string(),
            size_bytes: data.len(),
            uploaded_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&metadata).map_err(io::Error::other)?;
        fs::write(self.dir.join(format!("{}.json", id)), json)?;

        Ok(StoredUpload { path, metadata })
    }
}
