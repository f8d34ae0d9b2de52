use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShapeError {
    #[error("Failed to parse PDF: {0}")]
    Parse(String),

    #[error("Page {page} has unusable dimensions {width}x{height}")]
    DegeneratePage { page: u32, width: f64, height: f64 },

    #[error("No shapes provided")]
    NoShapes,

    #[error("No valid geometries to export")]
    NoValidGeometry,

    #[error("Invalid shapefile name: {0}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Shapefile write failed: {0}")]
    Shapefile(#[from] shapefile::Error),
}

impl From<lopdf::Error> for ShapeError {
    fn from(err: lopdf::Error) -> Self {
        ShapeError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ShapeError>;
