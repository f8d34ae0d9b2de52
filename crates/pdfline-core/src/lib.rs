//! Straight-line extraction from PDFs and shapefile export
//!
//! The pipeline has four stages:
//! - [`extract`]: read each page's size and the straight lines drawn on it (lopdf)
//! - [`normalize`]: map page coordinates into the unit square
//! - [`geometry`]: validate lines and convert them to GeoJSON-shaped objects
//! - [`export`]: write line geometries as an ESRI shapefile dataset

pub mod error;
pub mod export;
pub mod extract;
pub mod geometry;
pub mod normalize;

#[cfg(test)]
mod fixtures;

use std::path::Path;

pub use error::{Result, ShapeError};
pub use export::{ExportReport, ShapefileExporter};
pub use extract::{LineSegment, PageLines, PdfLines};
pub use geometry::{assemble, AssemblyReport, GeometryObject, Position};
pub use normalize::{is_finite_coordinate, normalize_coordinates};

/// Extract every valid normalized line from the PDF at `path`
pub fn extract_shapes<P: AsRef<Path>>(path: P) -> Result<AssemblyReport> {
    assemble(PdfLines::open(path)?)
}

/// Extract every valid normalized line from in-memory PDF bytes
pub fn extract_shapes_from_bytes(bytes: &[u8]) -> Result<AssemblyReport> {
    assemble(PdfLines::from_bytes(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{op, single_page_pdf, PdfBuilder};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_single_line_page() {
        let bytes = single_page_pdf(
            [0, 0, 100, 200],
            vec![op("m", &[10, 20]), op("l", &[30, 40]), op("S", &[])],
        );

        let report = extract_shapes_from_bytes(&bytes).unwrap();

        assert_eq!(
            report.to_geometry_objects(),
            vec![GeometryObject::line_string(vec![
                Position::new(0.1, 0.1),
                Position::new(0.3, 0.2)
            ])]
        );
    }

    #[test]
    fn test_rotated_page_normalizes_against_displayed_size() {
        let bytes = PdfBuilder::new()
            .page(
                Some([0, 0, 200, 100]),
                vec![op("m", &[0, 0]), op("l", &[200, 0]), op("S", &[])],
            )
            .rotate(90)
            .build();

        let report = extract_shapes_from_bytes(&bytes).unwrap();

        assert_eq!(
            report.to_geometry_objects(),
            vec![GeometryObject::line_string(vec![
                Position::new(0.0, 1.0),
                Position::new(0.0, 0.0)
            ])]
        );
    }

    #[test]
    fn test_extract_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drawing.pdf");
        std::fs::write(
            &path,
            single_page_pdf(
                [0, 0, 612, 792],
                vec![op("m", &[0, 0]), op("l", &[612, 792]), op("S", &[])],
            ),
        )
        .unwrap();

        let report = extract_shapes(&path).unwrap();
        assert_eq!(report.accepted(), 1);
        assert_eq!(report.lines[0].0[1].x, 1.0);
    }

    #[test]
    fn test_degenerate_page_fails_extraction() {
        let bytes = PdfBuilder::new()
            .page(Some([0, 0, 100, 100]), vec![])
            .page(Some([0, 0, 100, 0]), vec![])
            .build();
        let result = extract_shapes_from_bytes(&bytes);
        assert!(matches!(
            result,
            Err(ShapeError::DegeneratePage { page: 2, .. })
        ));
    }

    #[test]
    fn test_extracted_shapes_round_trip_through_export() {
        let bytes = PdfBuilder::new()
            .page(
                Some([0, 0, 612, 792]),
                vec![
                    op("m", &[72, 72]),
                    op("l", &[540, 72]),
                    op("m", &[72, 72]),
                    op("l", &[72, 720]),
                    op("S", &[]),
                ],
            )
            .page(
                Some([0, 0, 842, 595]),
                vec![op("m", &[0, 0]), op("l", &[842, 595]), op("S", &[])],
            )
            .build();
        let shapes = extract_shapes_from_bytes(&bytes).unwrap().to_geometry_objects();

        // Clients receive JSON, so round-trip through it as they would.
        let json = serde_json::to_string(&shapes).unwrap();
        let returned: Vec<GeometryObject> = serde_json::from_str(&json).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let report = ShapefileExporter::new(dir.path())
            .export(&returned, "roundtrip")
            .unwrap();
        assert_eq!(report.exported, 3);
        assert_eq!(report.skipped, 0);
    }
}
