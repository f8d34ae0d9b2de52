//! API handlers for the pdfline server
//!
//! Provides endpoints for:
//! - Line extraction from an uploaded PDF
//! - Shapefile export of line geometries

use axum::{
    extract::{
        multipart::{Multipart, MultipartRejection},
        rejection::JsonRejection,
        State,
    },
    response::Html,
    Json,
};
use pdfline_core::{AssemblyReport, GeometryObject};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ServerError;
use crate::state::AppState;

/// Multipart field carrying the uploaded PDF
pub const PDF_FIELD: &str = "pdf_file";

/// Response headers reporting how many extracted segments were kept or dropped
pub const ACCEPTED_HEADER: &str = "x-shapes-accepted";
pub const REJECTED_HEADER: &str = "x-shapes-rejected";

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Handler: GET /
pub async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "pdfline-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Handler: POST /extract_shapes
///
/// Returns the extracted lines as a JSON array. Segments that were dropped
/// (non-finite or zero-length) are only reported through the count headers.
pub async fn handle_extract_shapes(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<([(&'static str, String); 2], Json<Vec<GeometryObject>>), ServerError> {
    let mut multipart = multipart.map_err(|rejection| {
        debug!("Not a multipart request: {}", rejection);
        ServerError::MissingFilePart
    })?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::InvalidRequest(e.body_text()))?
    {
        if field.name() != Some(PDF_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ServerError::InvalidRequest(e.body_text()))?;
        upload = Some((file_name, data));
        break;
    }

    let (file_name, data) = upload.ok_or(ServerError::MissingFilePart)?;
    if file_name.is_empty() {
        return Err(ServerError::NoSelectedFile);
    }

    info!("Extract request: file={:?}, size={} bytes", file_name, data.len());

    let uploads = state.uploads.clone();
    let report = tokio::task::spawn_blocking(move || -> Result<AssemblyReport, ServerError> {
        let stored = uploads.save(&file_name, &data)?;
        debug!(
            "Upload {} stored ({} bytes)",
            stored.metadata.id, stored.metadata.size_bytes
        );
        Ok(pdfline_core::extract_shapes(&stored.path)?)
    })
    .await??;

    info!(
        "Extracted {} lines ({} rejected)",
        report.accepted(),
        report.rejected
    );

    let headers = [
        (ACCEPTED_HEADER, report.accepted().to_string()),
        (REJECTED_HEADER, report.rejected.to_string()),
    ];
    Ok((headers, Json(report.to_geometry_objects())))
}

/// Export request body
#[derive(Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub shapes: Vec<GeometryObject>,

    /// Dataset name; files are written as `<shp_name>.shp` and sidecars
    #[serde(default = "default_shp_name")]
    pub shp_name: String,
}

fn default_shp_name() -> String {
    "exported_shapes".to_string()
}

/// Export response
#[derive(Serialize)]
pub struct ExportResponse {
    pub message: String,
    pub exported: usize,
    pub skipped: usize,
}

/// Handler: POST /export_shapefile
pub async fn handle_export_shapefile(
    State(state): State<AppState>,
    payload: Result<Json<ExportRequest>, JsonRejection>,
) -> Result<Json<ExportResponse>, ServerError> {
    let Json(req) = payload.map_err(|rejection| ServerError::InvalidRequest(rejection.body_text()))?;

    info!(
        "Export request: name={}, shapes={}",
        req.shp_name,
        req.shapes.len()
    );

    let exporter = state.exporter.clone();
    let report =
        tokio::task::spawn_blocking(move || exporter.export(&req.shapes, &req.shp_name)).await??;

    Ok(Json(ExportResponse {
        message: format!(
            "Shapefile {} saved successfully in the exports folder.",
            report.name
        ),
        exported: report.exported,
        skipped: report.skipped,
    }))
}
