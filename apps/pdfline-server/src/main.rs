//! pdfline server
//!
//! A small HTTP service around `pdfline-core`:
//!
//! - `POST /extract_shapes`: upload a PDF, get its straight lines back as
//!   normalized LineString objects
//! - `POST /export_shapefile`: send LineString objects, get a shapefile
//!   written to the export directory
//!
//! PDF parsing and shapefile writing are blocking and run on the blocking
//! thread pool.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod error;
mod state;
mod storage;

use api::{handle_export_shapefile, handle_extract_shapes, handle_health, handle_index};
use state::{AppState, ServiceConfig};

/// Command-line arguments for the pdfline server
#[derive(Parser, Debug)]
#[command(name = "pdfline-server")]
#[command(about = "Extract lines from PDFs and export them as shapefiles")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PDFLINE_PORT", default_value = "5000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, env = "PDFLINE_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Directory for uploaded PDFs
    #[arg(long, env = "PDFLINE_UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Directory for exported shapefiles
    #[arg(long, env = "PDFLINE_EXPORT_DIR", default_value = "exports")]
    export_dir: PathBuf,

    /// WKT file copied to the .prj of every exported dataset
    #[arg(long, env = "PDFLINE_PROJECTION_FILE")]
    projection_file: Option<PathBuf>,

    /// Maximum request body size in MiB
    #[arg(long, env = "PDFLINE_MAX_UPLOAD_MB", default_value = "50")]
    max_upload_mb: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = ServiceConfig::new(args.upload_dir, args.export_dir);
    config.max_upload_bytes = args.max_upload_mb * 1024 * 1024;
    if let Some(path) = &args.projection_file {
        let wkt = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read projection file {}", path.display()))?;
        config.projection = Some(wkt.trim().to_string());
    }

    let state = AppState::new(config)?;
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("Max upload size: {} MiB", args.max_upload_mb);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router with all routes and middleware
fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/extract_shapes", post(handle_extract_shapes))
        .route("/export_shapefile", post(handle_export_shapefile))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
