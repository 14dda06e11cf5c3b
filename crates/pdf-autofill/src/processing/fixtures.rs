//! In-memory template builders for tests.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

/// Builds a one-page PDF with an AcroForm containing the requested fields.
pub(crate) struct FormFixture {
    doc: Document,
    pages_id: ObjectId,
    page_id: ObjectId,
    fields: Vec<Object>,
    annots: Vec<Object>,
    next_y: i64,
}

impl FormFixture {
    pub(crate) fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            page_id,
            fields: Vec::new(),
            annots: Vec::new(),
            next_y: 760,
        }
    }

    fn rect(&mut self) -> Object {
        let y = self.next_y;
        self.next_y -= 24;
        vec![40.into(), Object::Integer(y), 240.into(), Object::Integer(y + 18)].into()
    }

    fn appearance(&mut self, on_state: &str) -> Dictionary {
        let stream_id = self
            .doc
            .add_object(Stream::new(Dictionary::new(), b"q Q".to_vec()));
        let mut normal = Dictionary::new();
        normal.set(on_state.to_string(), stream_id);
        normal.set("Off", stream_id);
        dictionary! { "N" => normal }
    }

    fn widget(&mut self, mut dict: Dictionary) -> ObjectId {
        let rect = self.rect();
        dict.set("Type", "Annot");
        dict.set("Subtype", "Widget");
        dict.set("Rect", rect);
        dict.set("P", self.page_id);
        let id = self.doc.add_object(dict);
        self.annots.push(id.into());
        id
    }

    pub(crate) fn text(mut self, name: &str) -> Self {
        let id = self.widget(dictionary! {
            "FT" => "Tx",
            "T" => Object::string_literal(name),
        });
        self.fields.push(id.into());
        self
    }

    /// Parent field `parent` with a single text kid `child` (`parent.child`).
    pub(crate) fn nested_text(mut self, parent: &str, child: &str) -> Self {
        let parent_id = self.doc.new_object_id();
        let kid = self.widget(dictionary! {
            "T" => Object::string_literal(child),
            "Parent" => parent_id,
        });
        self.doc.objects.insert(
            parent_id,
            Object::Dictionary(dictionary! {
                "FT" => "Tx",
                "T" => Object::string_literal(parent),
                "Kids" => vec![Object::from(kid)],
            }),
        );
        self.fields.push(parent_id.into());
        self
    }

    pub(crate) fn checkbox(mut self, name: &str) -> Self {
        let ap = self.appearance("Yes");
        let id = self.widget(dictionary! {
            "FT" => "Btn",
            "T" => Object::string_literal(name),
            "V" => "Off",
            "AS" => "Off",
            "AP" => ap,
        });
        self.fields.push(id.into());
        self
    }

    pub(crate) fn radio(mut self, name: &str, states: &[&str]) -> Self {
        let parent_id = self.doc.new_object_id();
        let mut kids = Vec::new();
        for state in states {
            let ap = self.appearance(state);
            let kid = self.widget(dictionary! {
                "Parent" => parent_id,
                "AS" => "Off",
                "AP" => ap,
            });
            kids.push(Object::from(kid));
        }
        self.doc.objects.insert(
            parent_id,
            Object::Dictionary(dictionary! {
                "FT" => "Btn",
                "Ff" => 1i64 << 15,
                "T" => Object::string_literal(name),
                "V" => "Off",
                "Kids" => kids,
            }),
        );
        self.fields.push(parent_id.into());
        self
    }

    pub(crate) fn dropdown(mut self, name: &str, options: &[&str]) -> Self {
        let opts: Vec<Object> = options.iter().map(|o| Object::string_literal(*o)).collect();
        let id = self.widget(dictionary! {
            "FT" => "Ch",
            "Ff" => 1i64 << 17,
            "T" => Object::string_literal(name),
            "Opt" => opts,
        });
        self.fields.push(id.into());
        self
    }

    pub(crate) fn build(mut self) -> Vec<u8> {
        let font_id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        self.doc.objects.insert(
            self.page_id,
            Object::Dictionary(dictionary! {
                "Type" => "Page",
                "Parent" => self.pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Annots" => self.annots.clone(),
            }),
        );
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::from(self.page_id)],
                "Count" => 1i64,
            }),
        );
        let acroform_id = self.doc.add_object(dictionary! {
            "Fields" => self.fields.clone(),
            "DA" => Object::string_literal("/Helv 0 Tf 0 g"),
            "DR" => dictionary! { "Font" => dictionary! { "Helv" => font_id } },
        });
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
            "AcroForm" => acroform_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        self.doc.save_to(&mut buf).expect("failed to save test PDF");
        buf
    }
}

/// A valid one-page PDF without any AcroForm.
pub(crate) fn blank_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::from(page_id)],
            "Count" => 1i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("failed to save test PDF");
    buf
}
