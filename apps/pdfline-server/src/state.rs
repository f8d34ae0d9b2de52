//! Application state for the pdfline server

use std::path::PathBuf;

use anyhow::{Context, Result};
use pdfline_core::ShapefileExporter;

use crate::storage::UploadStore;

/// Default cap on request bodies (uploaded PDFs)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Directory and limit settings resolved from the command line / environment
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub upload_dir: PathBuf,
    pub export_dir: PathBuf,
    /// WKT written as the `.prj` of every exported dataset
    pub projection: Option<String>,
    pub max_upload_bytes: usize,
}

impl ServiceConfig {
    pub fn new(upload_dir: impl Into<PathBuf>, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            export_dir: export_dir.into(),
            projection: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub uploads: UploadStore,
    pub exporter: ShapefileExporter,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Build state from config, creating the upload and export directories
    pub fn new(config: ServiceConfig) -> Result<Self> {
        for dir in [&config.upload_dir, &config.export_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }

        let uploads = UploadStore::new(config.upload_dir);
        let mut exporter = ShapefileExporter::new(config.export_dir);
        if let Some(wkt) = config.projection {
            exporter = exporter.with_projection(wkt);
        }

        tracing::info!("Upload directory: {}", uploads.dir().display());
        tracing::info!("Export directory: {}", exporter.export_dir().display());

        Ok(Self {
            uploads,
            exporter,
            max_upload_bytes: config.max_upload_bytes,
        })
    }
}
