//! Line geometries and their interchange representation
//!
//! Extraction output and export input share one GeoJSON-shaped type,
//! [`GeometryObject`], so a client can send back exactly what it received.

use geo_types::{Coord, LineString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::extract::PageLines;
use crate::normalize::{is_finite_coordinate, normalize_coordinates};

/// Type tag of the only geometry kind this service produces and accepts
pub const LINE_STRING: &str = "LineString";

/// Structural geometry representation: type tag plus coordinate sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryObject {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub coordinates: Vec<Position>,
}

impl GeometryObject {
    pub fn line_string(coordinates: Vec<Position>) -> Self {
        Self {
            kind: LINE_STRING.to_string(),
            coordinates,
        }
    }

    /// Rebuild a line from the finite positions of a `LineString` object.
    ///
    /// Returns `None` for other types, when fewer than two finite positions
    /// remain, or when the resulting line fails [`is_valid_line`].
    pub fn to_line(&self) -> Option<LineString<f64>> {
        if self.kind != LINE_STRING {
            warn!("Skipping unsupported geometry type {:?}", self.kind);
            return None;
        }

        let coords: Vec<Coord<f64>> = self
            .coordinates
            .iter()
            .filter(|p| p.is_finite())
            .map(|p| Coord { x: p.x, y: p.y })
            .collect();
        if coords.len() < 2 {
            warn!(
                "Invalid or insufficient LineString found: {:?}",
                self.coordinates
            );
            return None;
        }

        let line = LineString::new(coords);
        if !is_valid_line(&line) {
            debug!("Dropping degenerate LineString: {:?}", self.coordinates);
            return None;
        }
        Some(line)
    }
}

impl From<&LineString<f64>> for GeometryObject {
    fn from(line: &LineString<f64>) -> Self {
        GeometryObject::line_string(
            line.coords()
                .map(|c| Position { x: c.x, y: c.y })
                .collect(),
        )
    }
}

/// One `[x, y]` position.
///
/// Deserialization is lenient: `null`, non-numeric or missing components
/// become NaN so that the finiteness filter can drop the position instead of
/// rejecting the whole request. Components past the second are ignored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        is_finite_coordinate(&[self.x, self.y])
    }
}

impl Serialize for Position {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        [self.x, self.y].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let component = |i: usize| {
            value
                .as_array()
                .and_then(|items| items.get(i))
                .and_then(Value::as_f64)
                .unwrap_or(f64::NAN)
        };
        Ok(Position::new(component(0), component(1)))
    }
}

/// A line is valid when every coordinate is finite and it has at least two
/// distinct coordinates; zero-length lines are rejected.
pub fn is_valid_line(line: &LineString<f64>) -> bool {
    let coords = &line.0;
    coords.iter().all(|c| is_finite_coordinate(&[c.x, c.y]))
        && coords.iter().any(|c| *c != coords[0])
}

/// Accepted lines across all pages plus the number of dropped segments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssemblyReport {
    pub lines: Vec<LineString<f64>>,
    pub rejected: usize,
}

impl AssemblyReport {
    pub fn accepted(&self) -> usize {
        self.lines.len()
    }

    pub fn to_geometry_objects(&self) -> Vec<GeometryObject> {
        self.lines.iter().map(GeometryObject::from).collect()
    }
}

/// Normalize and validate every segment of one page into `report`.
pub fn assemble_page(page: &PageLines, report: &mut AssemblyReport) {
    for segment in &page.segments {
        let (x0, y0) = normalize_coordinates(segment.start.0, segment.start.1, page.width, page.height);
        let (x1, y1) = normalize_coordinates(segment.end.0, segment.end.1, page.width, page.height);

        if !is_finite_coordinate(&[x0, y0, x1, y1]) {
            warn!(
                "Invalid coordinates found on page {}: {}, {}, {}, {}",
                page.page_number, x0, y0, x1, y1
            );
            report.rejected += 1;
            continue;
        }

        let line = LineString::from(vec![(x0, y0), (x1, y1)]);
        if is_valid_line(&line) {
            report.lines.push(line);
        } else {
            debug!(
                "Dropping zero-length line on page {} at ({}, {})",
                page.page_number, x0, y0
            );
            report.rejected += 1;
        }
    }
}

/// Fold a page sequence into one flat report, stopping at the first page error.
pub fn assemble<I>(pages: I) -> Result<AssemblyReport>
where
    I: IntoIterator<Item = Result<PageLines>>,
{
    let mut report = AssemblyReport::default();
    for page in pages {
        assemble_page(&page?, &mut report);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShapeError;
    use crate::extract::LineSegment;
    use pretty_assertions::assert_eq;

    fn page(width: f64, height: f64, segments: &[(Point2, Point2)]) -> PageLines {
        PageLines {
            page_number: 1,
            width,
            height,
            segments: segments
                .iter()
                .map(|&(start, end)| LineSegment { start, end })
                .collect(),
        }
    }

    type Point2 = (f64, f64);

    #[test]
    fn test_assemble_normalizes_to_unit_square() {
        let report = assemble(vec![Ok(page(100.0, 200.0, &[((10.0, 20.0), (30.0, 40.0))]))]).unwrap();

        assert_eq!(report.accepted(), 1);
        assert_eq!(report.rejected, 0);
        assert_eq!(
            serde_json::to_value(report.to_geometry_objects()).unwrap(),
            serde_json::json!([{"type": "LineString", "coordinates": [[0.1, 0.1], [0.3, 0.2]]}])
        );
    }

    #[test]
    fn test_zero_length_segments_are_rejected() {
        let report = assemble(vec![Ok(page(100.0, 100.0, &[((5.0, 5.0), (5.0, 5.0))]))]).unwrap();
        assert_eq!(report.accepted(), 0);
        assert_eq!(report.rejected, 1);
    }

    #[test]
    fn test_non_finite_segments_are_rejected() {
        let report = assemble(vec![Ok(page(
            100.0,
            100.0,
            &[((f64::NAN, 5.0), (10.0, 5.0)), ((0.0, 0.0), (10.0, 10.0))],
        ))])
        .unwrap();
        assert_eq!(report.accepted(), 1);
        assert_eq!(report.rejected, 1);
    }

    #[test]
    fn test_pages_are_flattened_in_order() {
        let report = assemble(vec![
            Ok(page(10.0, 10.0, &[((0.0, 0.0), (10.0, 0.0))])),
            Ok(page(20.0, 20.0, &[((0.0, 0.0), (0.0, 20.0))])),
        ])
        .unwrap();
        let objects = report.to_geometry_objects();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].coordinates[1], Position::new(1.0, 0.0));
        assert_eq!(objects[1].coordinates[1], Position::new(0.0, 1.0));
    }

    #[test]
    fn test_page_error_stops_assembly() {
        let result = assemble(vec![
            Ok(page(10.0, 10.0, &[((0.0, 0.0), (10.0, 0.0))])),
            Err(ShapeError::Parse("broken page".to_string())),
        ]);
        assert!(matches!(result, Err(ShapeError::Parse(_))));
    }

    #[test]
    fn test_position_deserializes_leniently() {
        let shape: GeometryObject = serde_json::from_str(
            r#"{"type":"LineString","coordinates":[[0,0],[1,null],["a",2],[3],[4,5,6]]}"#,
        )
        .unwrap();

        let finite: Vec<bool> = shape.coordinates.iter().map(Position::is_finite).collect();
        assert_eq!(finite, vec![true, false, false, false, true]);
        assert_eq!(shape.coordinates[4], Position::new(4.0, 5.0));
    }

    #[test]
    fn test_to_line_filters_non_finite_positions() {
        let shape: GeometryObject =
            serde_json::from_str(r#"{"type":"LineString","coordinates":[[0,0],[null,1],[1,1]]}"#)
                .unwrap();
        let line = shape.to_line().unwrap();
        assert_eq!(line.0.len(), 2);
    }

    #[test]
    fn test_to_line_rejects_single_point_and_other_types() {
        let single = GeometryObject::line_string(vec![Position::new(0.0, 0.0)]);
        assert!(single.to_line().is_none());

        let point: GeometryObject =
            serde_json::from_str(r#"{"type":"Point","coordinates":[[0,0],[1,1]]}"#).unwrap();
        assert!(point.to_line().is_none());

        let untyped: GeometryObject = serde_json::from_str(r#"{"coordinates":[[0,0],[1,1]]}"#).unwrap();
        assert!(untyped.to_line().is_none());
    }

    #[test]
    fn test_is_valid_line() {
        assert!(is_valid_line(&LineString::from(vec![(0.0, 0.0), (1.0, 0.0)])));
        assert!(is_valid_line(&LineString::from(vec![(0.0, 0.0), (0.0, 0.0), (1.0, 1.0)])));
        assert!(!is_valid_line(&LineString::from(vec![(0.0, 0.0), (0.0, 0.0)])));
        assert!(!is_valid_line(&LineString::from(vec![(0.0, 0.0)])));
        assert!(!is_valid_line(&LineString::from(vec![(0.0, f64::INFINITY), (1.0, 0.0)])));
        assert!(!is_valid_line(&LineString::<f64>::new(vec![])));
    }
}
