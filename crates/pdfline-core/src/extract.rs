//! Straight-line extraction from PDF content streams using lopdf
//!
//! Pages are read lazily: [`PdfLines`] is an iterator that interprets one
//! page's content stream per call to `next`. Only path painting is tracked;
//! text, images and colour state are ignored.
//!
//! Each page's base transform moves the MediaBox origin to (0, 0) and
//! applies its `/Rotate`, so coordinates and page size are as displayed.
//!
//! A painted subpath counts as a line when it is exactly a moveto followed by
//! one lineto, optionally closed (`m l` or `m l h`). Rectangles, curves and
//! polylines with more than one segment are not lines.

use std::borrow::Cow;
use std::collections::btree_map;
use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use crate::error::{Result, ShapeError};

/// Form XObjects may nest; deeper invocations are ignored.
const MAX_FORM_DEPTH: usize = 8;

/// Bound on `/Parent` hops when looking up inheritable page attributes.
const MAX_INHERIT_DEPTH: usize = 32;

/// Fallback MediaBox (corners) when neither the page nor its ancestors carry one.
const US_LETTER: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

pub type Point = (f64, f64);

/// A straight drawn segment in displayed page space (MediaBox origin at 0,0,
/// rotation applied). Endpoints keep drawing order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    pub start: Point,
    pub end: Point,
}

/// The lines drawn on one page together with the page size.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLines {
    /// 1-indexed page number
    pub page_number: u32,
    pub width: f64,
    pub height: f64,
    pub segments: Vec<LineSegment>,
}

/// Lazy per-page line reader over a loaded PDF document.
pub struct PdfLines {
    doc: Document,
    pages: btree_map::IntoIter<u32, ObjectId>,
}

impl PdfLines {
    /// Load a PDF from disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let doc = Document::load(path)?;
        Ok(Self::from_document(doc))
    }

    /// Load a PDF from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let doc = Document::load_mem(bytes)?;
        Ok(Self::from_document(doc))
    }

    pub fn from_document(doc: Document) -> Self {
        let pages = doc.get_pages().into_iter();
        Self { doc, pages }
    }

    /// Number of pages not yet read
    pub fn remaining_pages(&self) -> usize {
        self.pages.len()
    }

    fn read_page(&self, page_number: u32, page_id: ObjectId) -> Result<PageLines> {
        let page = self.doc.get_dictionary(page_id)?;

        let [x0, y0, x1, y1] = self.media_box(page)?;
        let (width, height) = (x1 - x0, y1 - y0);
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(ShapeError::DegeneratePage {
                page: page_number,
                width,
                height,
            });
        }

        // The base transform moves the MediaBox origin to (0, 0) and applies
        // the page's clockwise display rotation; 90 and 270 swap the axes.
        let (base, width, height) = match self.rotation(page) {
            90 => (Matrix([0.0, -1.0, 1.0, 0.0, -y0, x1]), height, width),
            180 => (Matrix([-1.0, 0.0, 0.0, -1.0, x1, y1]), width, height),
            270 => (Matrix([0.0, 1.0, -1.0, 0.0, y1, -x0]), height, width),
            _ => (Matrix::translate(-x0, -y0), width, height),
        };

        let content = decode_content(&self.page_content(page_id))?;
        let resources = inherited(&self.doc, page, b"Resources")
            .and_then(|obj| resolve(&self.doc, obj).ok())
            .and_then(|obj| obj.as_dict().ok());

        let mut interpreter = PathInterpreter::new(&self.doc, base);
        interpreter.run(&content.operations, resources, 0)?;

        debug!(
            "Page {}: {}x{} with {} line segments",
            page_number,
            width,
            height,
            interpreter.segments.len()
        );

        Ok(PageLines {
            page_number,
            width,
            height,
            segments: interpreter.segments,
        })
    }

    /// All content streams of a page, newline-separated so the last token of
    /// one stream never runs into the first token of the next
    fn page_content(&self, page_id: ObjectId) -> Vec<u8> {
        let mut content = Vec::new();
        for id in self.doc.get_page_contents(page_id) {
            let Ok(stream) = self.doc.get_object(id).and_then(Object::as_stream) else {
                debug!("Content {:?} is not a stream, skipping", id);
                continue;
            };
            match stream.decompressed_content() {
                Ok(data) => content.extend_from_slice(&data),
                Err(_) => content.extend_from_slice(&stream.content),
            }
            content.push(b'\n');
        }
        content
    }

    /// MediaBox as normalized corners [x0, y0, x1, y1], inherited through `/Parent`
    fn media_box(&self, page: &Dictionary) -> Result<[f64; 4]> {
        let Some(obj) = inherited(&self.doc, page, b"MediaBox") else {
            return Ok(US_LETTER);
        };

        let arr = resolve(&self.doc, obj)?
            .as_array()
            .map_err(|_| ShapeError::Parse("MediaBox is not an array".to_string()))?;
        if arr.len() != 4 {
            return Err(ShapeError::Parse(format!(
                "MediaBox has {} elements, expected 4",
                arr.len()
            )));
        }

        let mut values = [0.0f64; 4];
        for (i, obj) in arr.iter().enumerate() {
            values[i] = resolve(&self.doc, obj)
                .ok()
                .and_then(number)
                .ok_or_else(|| ShapeError::Parse("Expected number in MediaBox".to_string()))?;
        }

        Ok([
            values[0].min(values[2]),
            values[1].min(values[3]),
            values[0].max(values[2]),
            values[1].max(values[3]),
        ])
    }

    /// Clockwise display rotation in degrees (0, 90, 180 or 270)
    fn rotation(&self, page: &Dictionary) -> i64 {
        let degrees = inherited(&self.doc, page, b"Rotate")
            .and_then(|obj| resolve(&self.doc, obj).ok())
            .and_then(|obj| obj.as_i64().ok())
            .unwrap_or(0)
            .rem_euclid(360);
        if degrees % 90 != 0 {
            debug!("Ignoring /Rotate {}, not a multiple of 90", degrees);
            return 0;
        }
        degrees
    }
}

impl Iterator for PdfLines {
    type Item = Result<PageLines>;

    fn next(&mut self) -> Option<Self::Item> {
        let (page_number, page_id) = self.pages.next()?;
        Some(self.read_page(page_number, page_id))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.pages.size_hint()
    }
}

/// Affine transform `[a b c d e f]` in PDF row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f64; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translate(tx: f64, ty: f64) -> Self {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self × other`: apply `self` first, then `other`.
    fn then(&self, other: &Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [na, nb, nc, nd, ne, nf] = other.0;
        Matrix([
            a * na + b * nc,
            a * nb + b * nd,
            c * na + d * nc,
            c * nb + d * nd,
            e * na + f * nc + ne,
            e * nb + f * nd + nf,
        ])
    }

    fn apply(&self, (x, y): Point) -> Point {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    fn from_operands(values: &[f64]) -> Option<Self> {
        let values: [f64; 6] = values.try_into().ok()?;
        Some(Matrix(values))
    }
}

/// One subpath under construction. `shape` records the construction
/// operators (`m`, `l`, `c`, `h`) so painted subpaths can be classified.
#[derive(Debug, Default)]
struct Subpath {
    shape: String,
    points: Vec<Point>,
}

impl Subpath {
    fn as_line(&self) -> Option<LineSegment> {
        match self.shape.as_str() {
            "ml" | "mlh" => Some(LineSegment {
                start: self.points[0],
                end: self.points[1],
            }),
            _ => None,
        }
    }
}

struct PathInterpreter<'a> {
    doc: &'a Document,
    ctm: Matrix,
    saved: Vec<Matrix>,
    subpaths: Vec<Subpath>,
    segments: Vec<LineSegment>,
}

impl<'a> PathInterpreter<'a> {
    fn new(doc: &'a Document, ctm: Matrix) -> Self {
        Self {
            doc,
            ctm,
            saved: Vec::new(),
            subpaths: Vec::new(),
            segments: Vec::new(),
        }
    }

    fn run(
        &mut self,
        operations: &[Operation],
        resources: Option<&'a Dictionary>,
        depth: usize,
    ) -> Result<()> {
        for op in operations {
            match op.operator.as_str() {
                "q" => self.saved.push(self.ctm),
                "Q" => {
                    if let Some(ctm) = self.saved.pop() {
                        self.ctm = ctm;
                    }
                }
                "cm" => match operands(op, 6).and_then(|v| Matrix::from_operands(&v)) {
                    Some(m) => self.ctm = m.then(&self.ctm),
                    None => debug!("Skipping malformed cm operands: {:?}", op.operands),
                },
                "m" => {
                    if let Some(v) = operands(op, 2) {
                        self.subpaths.push(Subpath {
                            shape: "m".to_string(),
                            points: vec![self.ctm.apply((v[0], v[1]))],
                        });
                    }
                }
                "l" => {
                    if let Some(v) = operands(op, 2) {
                        self.extend('l', (v[0], v[1]));
                    }
                }
                "c" => {
                    if let Some(v) = operands(op, 6) {
                        self.extend('c', (v[4], v[5]));
                    }
                }
                "v" | "y" => {
                    if let Some(v) = operands(op, 4) {
                        self.extend('c', (v[2], v[3]));
                    }
                }
                "re" => {
                    if let Some(v) = operands(op, 4) {
                        let (x, y, w, h) = (v[0], v[1], v[2], v[3]);
                        let points = [(x, y), (x + w, y), (x + w, y + h), (x, y + h)]
                            .into_iter()
                            .map(|p| self.ctm.apply(p))
                            .collect();
                        self.subpaths.push(Subpath {
                            shape: "re".to_string(),
                            points,
                        });
                    }
                }
                "h" => {
                    if let Some(current) = self.subpaths.last_mut() {
                        current.shape.push('h');
                    }
                }
                "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" => self.paint(),
                "n" => self.subpaths.clear(),
                "Do" => self.invoke_form(op, resources, depth)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn extend(&mut self, op: char, point: Point) {
        let point = self.ctm.apply(point);
        match self.subpaths.last_mut() {
            Some(current) => {
                current.shape.push(op);
                current.points.push(point);
            }
            None => debug!("Path segment without a current point, ignoring"),
        }
    }

    fn paint(&mut self) {
        self.segments
            .extend(self.subpaths.drain(..).filter_map(|s| s.as_line()));
    }

    fn invoke_form(
        &mut self,
        op: &Operation,
        resources: Option<&'a Dictionary>,
        depth: usize,
    ) -> Result<()> {
        if depth >= MAX_FORM_DEPTH {
            debug!("Form XObject nesting deeper than {}, skipping", MAX_FORM_DEPTH);
            return Ok(());
        }
        let Some(Object::Name(name)) = op.operands.first() else {
            return Ok(());
        };
        let Some(form) = resources.and_then(|res| self.lookup_form(res, name)) else {
            return Ok(());
        };

        let matrix = form
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|obj| resolve(self.doc, obj).ok())
            .and_then(|obj| obj.as_array().ok())
            .and_then(|arr| arr.iter().map(number).collect::<Option<Vec<_>>>())
            .and_then(|values| Matrix::from_operands(&values))
            .unwrap_or(Matrix::IDENTITY);
        let form_resources = form
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|obj| resolve(self.doc, obj).ok())
            .and_then(|obj| obj.as_dict().ok())
            .or(resources);

        let bytes = form
            .decompressed_content()
            .unwrap_or_else(|_| form.content.clone());
        let content = decode_content(&bytes)?;

        let saved_ctm = self.ctm;
        let saved_depth = self.saved.len();
        self.ctm = matrix.then(&self.ctm);
        self.run(&content.operations, form_resources, depth + 1)?;
        self.saved.truncate(saved_depth);
        self.ctm = saved_ctm;
        Ok(())
    }

    fn lookup_form(&self, resources: &'a Dictionary, name: &[u8]) -> Option<&'a Stream> {
        let xobjects = resolve(self.doc, resources.get(b"XObject").ok()?)
            .ok()?
            .as_dict()
            .ok()?;
        let stream = resolve(self.doc, xobjects.get(name).ok()?)
            .ok()?
            .as_stream()
            .ok()?;
        match stream.dict.get(b"Subtype").and_then(Object::as_name) {
            Ok(subtype) if subtype == b"Form" => Some(stream),
            _ => None,
        }
    }
}

fn decode_content(bytes: &[u8]) -> Result<Content> {
    Ok(Content::decode(&strip_inline_images(bytes))?)
}

/// Cut every inline image (`BI <dict> ID <binary> EI`) out of a content
/// stream. lopdf stops decoding at the binary payload, which would lose
/// every path drawn after the image.
fn strip_inline_images(bytes: &[u8]) -> Cow<'_, [u8]> {
    let mut spans = Vec::new();
    let mut pos = 0;
    while let Some((start, end)) = next_token(bytes, pos) {
        pos = end;
        if &bytes[start..end] != b"BI" {
            continue;
        }
        match inline_image_end(bytes, end) {
            Some(image_end) => {
                spans.push((start, image_end));
                pos = image_end;
            }
            None => {
                debug!("Unterminated inline image at byte {}", start);
                spans.push((start, bytes.len()));
                break;
            }
        }
    }
    if spans.is_empty() {
        return Cow::Borrowed(bytes);
    }

    let mut stripped = Vec::with_capacity(bytes.len());
    let mut last = 0;
    for (start, end) in spans {
        stripped.extend_from_slice(&bytes[last..start]);
        stripped.push(b'\n');
        last = end;
    }
    stripped.extend_from_slice(&bytes[last..]);
    Cow::Owned(stripped)
}

/// End offset of an inline image whose `BI` token ends at `pos`
fn inline_image_end(bytes: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let (start, end) = next_token(bytes, pos)?;
        pos = end;
        if &bytes[start..end] == b"ID" {
            break;
        }
    }

    // One whitespace byte separates ID from the image data.
    let mut pos = pos + 1;
    while pos + 1 < bytes.len() {
        if &bytes[pos..pos + 2] == b"EI"
            && is_whitespace(bytes[pos - 1])
            && bytes.get(pos + 2).map_or(true, |&b| is_whitespace(b))
        {
            return Some(pos + 2);
        }
        pos += 1;
    }
    None
}

/// Byte span of the next lexical token at or after `pos`
fn next_token(bytes: &[u8], mut pos: usize) -> Option<(usize, usize)> {
    loop {
        while pos < bytes.len() && is_whitespace(bytes[pos]) {
            pos += 1;
        }
        if bytes.get(pos) != Some(&b'%') {
            break;
        }
        while pos < bytes.len() && !matches!(bytes[pos], b'\n' | b'\r') {
            pos += 1;
        }
    }

    let start = pos;
    let first = *bytes.get(start)?;
    let end = match first {
        b'(' => literal_string_end(bytes, start),
        b'<' | b'>' if bytes.get(start + 1) == Some(&first) => start + 2,
        b'<' => bytes[start..]
            .iter()
            .position(|&b| b == b'>')
            .map_or(bytes.len(), |i| start + i + 1),
        b'/' => regular_run_end(bytes, start + 1),
        b if is_delimiter(b) => start + 1,
        _ => regular_run_end(bytes, start),
    };
    Some((start, end))
}

fn literal_string_end(bytes: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    let mut pos = start;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 1,
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return pos + 1;
                }
            }
            _ => {}
        }
        pos += 1;
    }
    bytes.len()
}

fn regular_run_end(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && !is_whitespace(bytes[pos]) && !is_delimiter(bytes[pos]) {
        pos += 1;
    }
    pos
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'\x0c' | b'\0')
}

fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

/// Numeric operands of `op` when it carries exactly `count` of them.
fn operands(op: &Operation, count: usize) -> Option<Vec<f64>> {
    if op.operands.len() != count {
        debug!(
            "Operator {} expects {} operands, got {}",
            op.operator,
            count,
            op.operands.len()
        );
        return None;
    }
    op.operands.iter().map(number).collect()
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Result<&'a Object> {
    match obj {
        Object::Reference(id) => Ok(doc.get_object(*id)?),
        other => Ok(other),
    }
}

/// Look up an inheritable page attribute, walking `/Parent` links.
fn inherited<'a>(doc: &'a Document, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut node = page;
    for _ in 0..MAX_INHERIT_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        let parent = node.get(b"Parent").ok()?;
        node = resolve(doc, parent).ok()?.as_dict().ok()?;
    }
    None
}
