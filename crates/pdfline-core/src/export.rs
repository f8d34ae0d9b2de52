//! Shapefile export of line geometries
//!
//! A dataset is built in memory, written into a private staging directory
//! inside the export directory, then renamed into place. Renames for every
//! export through one [`ShapefileExporter`] (and its clones) hold a shared
//! lock, so the `.shp`, `.shx`, `.dbf` and `.prj` of a name always come from
//! the same export. The last export of a name wins.

use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use geo_types::LineString;
use serde::Serialize;
use shapefile::dbase::{FieldName, FieldValue, Record, TableWriterBuilder};
use shapefile::{Point, Polyline, ShapeWriter};
use tracing::{info, warn};

use crate::error::{Result, ShapeError};
use crate::geometry::GeometryObject;

/// Attribute column holding the 0-based feature index
const FID_FIELD: &str = "FID";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportReport {
    pub name: String,
    pub exported: usize,
    pub skipped: usize,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ShapefileExporter {
    export_dir: PathBuf,
    projection: Option<String>,
    publish: Arc<Mutex<()>>,
}

impl ShapefileExporter {
    pub fn new(export_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
            projection: None,
            publish: Arc::new(Mutex::new(())),
        }
    }

    /// Write this WKT as the `.prj` sidecar of every dataset
    pub fn with_projection(mut self, wkt: impl Into<String>) -> Self {
        self.projection = Some(wkt.into());
        self
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    /// Export every valid `LineString` in `shapes` as dataset `name`.
    ///
    /// Invalid shapes are skipped and counted; the call fails only when the
    /// input is empty, nothing valid remains, or a file cannot be written.
    pub fn export(&self, shapes: &[GeometryObject], name: &str) -> Result<ExportReport> {
        if shapes.is_empty() {
            return Err(ShapeError::NoShapes);
        }
        validate_name(name)?;

        let lines: Vec<LineString<f64>> = shapes.iter().filter_map(GeometryObject::to_line).collect();
        let skipped = shapes.len() - lines.len();
        if lines.is_empty() {
            return Err(ShapeError::NoValidGeometry);
        }

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.export_dir)?;
        let staged = self.write_dataset(staging.path(), name, &lines)?;
        let files = self.publish(name, staged)?;

        info!(
            "Exported shapefile {} to {}: {} geometries, {} skipped",
            name,
            self.export_dir.display(),
            lines.len(),
            skipped
        );

        Ok(ExportReport {
            name: name.to_string(),
            exported: lines.len(),
            skipped,
            files,
        })
    }

    /// Write `<dir>/<name>.shp` and its sidecars, returning every file written
    fn write_dataset(&self, dir: &Path, name: &str, lines: &[LineString<f64>]) -> Result<Vec<PathBuf>> {
        let fid = FieldName::try_from(FID_FIELD)
            .map_err(|_| ShapeError::InvalidName(FID_FIELD.to_string()))?;

        // Writers finalize headers on drop and swallow errors there, so build
        // in memory and let fs::write report I/O failures.
        let mut shp = Cursor::new(Vec::new());
        let mut shx = Cursor::new(Vec::new());
        let mut dbf = Cursor::new(Vec::new());
        {
            let table = TableWriterBuilder::new()
                .add_numeric_field(fid, 10, 0)
                .build_with_dest(&mut dbf);
            let mut writer =
                shapefile::Writer::new(ShapeWriter::with_shx(&mut shp, &mut shx), table);
            for (index, line) in lines.iter().enumerate() {
                let points: Vec<Point> = line.coords().map(|c| Point::new(c.x, c.y)).collect();
                let polyline = Polyline::new(points);

                let mut record = Record::default();
                record.insert(FID_FIELD.to_string(), FieldValue::Numeric(Some(index as f64)));
                writer.write_shape_and_record(&polyline, &record)?;
            }
        }

        let shp_path = dir.join(format!("{}.shp", name));
        let mut files = Vec::with_capacity(4);
        for (path, buffer) in [
            (shp_path.clone(), shp),
            (shp_path.with_extension("shx"), shx),
            (shp_path.with_extension("dbf"), dbf),
        ] {
            fs::write(&path, buffer.into_inner())?;
            files.push(path);
        }
        if let Some(wkt) = &self.projection {
            let prj_path = shp_path.with_extension("prj");
            fs::write(&prj_path, wkt)?;
            files.push(prj_path);
        }
        Ok(files)
    }

    /// Move staged files into the export dir under the publish lock.
    ///
    /// A stale `.prj` is removed when this exporter writes none. If a rename
    /// fails, the files already moved are removed again so no mixed dataset
    /// is left behind.
    fn publish(&self, name: &str, staged: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
        let _guard = self.publish.lock().unwrap_or_else(PoisonError::into_inner);

        if self.projection.is_none() {
            match fs::remove_file(self.export_dir.join(format!("{}.prj", name))) {
                Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err.into()),
                _ => {}
            }
        }

        let mut published = Vec::with_capacity(staged.len());
        for path in staged {
            let Some(file_name) = path.file_name() else {
                continue;
            };
            let target = self.export_dir.join(file_name);
            if let Err(err) = fs::rename(&path, &target) {
                warn!("Failed to publish {}: {}", target.display(), err);
                for done in &published {
                    let _ = fs::remove_file(done);
                }
                return Err(err.into());
            }
            published.push(target);
        }
        Ok(published)
    }
}

/// Dataset names become file names, so they must not escape the export dir.
fn validate_name(name: &str) -> Result<()> {
    let invalid = name.trim().is_empty()
        || name.contains(|c: char| matches!(c, '/' | '\\' | '\0'))
        || name.contains("..");
    if invalid {
        return Err(ShapeError::InvalidName(name.to_string()));
    }
    Ok(())
}
