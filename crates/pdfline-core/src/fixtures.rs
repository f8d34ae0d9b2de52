//! In-memory PDF builders for tests

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};

pub(crate) fn op(operator: &str, operands: &[i64]) -> Operation {
    Operation::new(
        operator,
        operands.iter().map(|v| Object::Integer(*v)).collect(),
    )
}

fn int_array(values: &[i64]) -> Object {
    Object::Array(values.iter().map(|v| Object::Integer(*v)).collect())
}

pub(crate) fn single_page_pdf(media_box: [i64; 4], operations: Vec<Operation>) -> Vec<u8> {
    PdfBuilder::new().page(Some(media_box), operations).build()
}

struct PageSpec {
    media_box: Option<[i64; 4]>,
    rotate: Option<i64>,
    contents: Vec<Vec<u8>>,
}

#[derive(Default)]
pub(crate) struct PdfBuilder {
    inherited_media_box: Option<[i64; 4]>,
    forms: Vec<(String, [i64; 6], Vec<Operation>)>,
    pages: Vec<PageSpec>,
}

impl PdfBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// MediaBox set on the page tree root rather than on each page
    pub(crate) fn inherited_media_box(mut self, media_box: [i64; 4]) -> Self {
        self.inherited_media_box = Some(media_box);
        self
    }

    /// Register a Form XObject available to every page under `name`
    pub(crate) fn form(mut self, name: &str, matrix: [i64; 6], operations: Vec<Operation>) -> Self {
        self.forms.push((name.to_string(), matrix, operations));
        self
    }

    pub(crate) fn page(self, media_box: Option<[i64; 4]>, operations: Vec<Operation>) -> Self {
        let content = Content { operations }.encode().unwrap();
        self.raw_page(media_box, vec![content])
    }

    /// Page whose `/Contents` are the given streams, verbatim
    pub(crate) fn raw_page(mut self, media_box: Option<[i64; 4]>, contents: Vec<Vec<u8>>) -> Self {
        self.pages.push(PageSpec {
            media_box,
            rotate: None,
            contents,
        });
        self
    }

    /// Set `/Rotate` on the most recently added page
    pub(crate) fn rotate(mut self, degrees: i64) -> Self {
        if let Some(page) = self.pages.last_mut() {
            page.rotate = Some(degrees);
        }
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let mut xobjects = Dictionary::new();
        for (name, matrix, operations) in self.forms {
            let content = Content { operations };
            let dict = Dictionary::from_iter(vec![
                ("Type", Object::Name(b"XObject".to_vec())),
                ("Subtype", Object::Name(b"Form".to_vec())),
                ("BBox", int_array(&[0, 0, 1000, 1000])),
                ("Matrix", int_array(&matrix)),
            ]);
            let form_id = doc.add_object(Stream::new(dict, content.encode().unwrap()));
            xobjects.set(name.into_bytes(), Object::Reference(form_id));
        }
        let resources = Dictionary::from_iter(vec![("XObject", Object::Dictionary(xobjects))]);

        let mut page_ids = Vec::new();
        for spec in self.pages {
            let mut content_ids: Vec<Object> = spec
                .contents
                .into_iter()
                .map(|bytes| Object::Reference(doc.add_object(Stream::new(Dictionary::new(), bytes))))
                .collect();
            let contents = if content_ids.len() == 1 {
                content_ids.remove(0)
            } else {
                Object::Array(content_ids)
            };

            let mut page = Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                ("Contents", contents),
                ("Resources", Object::Dictionary(resources.clone())),
            ]);
            if let Some(media_box) = spec.media_box {
                page.set("MediaBox", int_array(&media_box));
            }
            if let Some(degrees) = spec.rotate {
                page.set("Rotate", Object::Integer(degrees));
            }
            page_ids.push(doc.add_object(page));
        }

        let mut pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(page_ids.len() as i64)),
            (
                "Kids",
                Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
            ),
        ]);
        if let Some(media_box) = self.inherited_media_box {
            pages.set("MediaBox", int_array(&media_box));
        }
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]);
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }
}
