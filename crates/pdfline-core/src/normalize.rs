//! Page-space to unit-square coordinate mapping

/// Map a page-space point into the unit square by dividing by the page size.
///
/// No rounding or clamping is applied; points outside the page land outside
/// [0, 1]. Callers must pass a positive width and height.
pub fn normalize_coordinates(x: f64, y: f64, page_width: f64, page_height: f64) -> (f64, f64) {
    (x / page_width, y / page_height)
}

/// True when every component is a finite real number (no NaN, no infinity).
pub fn is_finite_coordinate(coord: &[f64]) -> bool {
    coord.iter().all(|c| c.is_finite())
}
