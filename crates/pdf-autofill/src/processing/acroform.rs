//! LoPDF-backed interactive form model.
//! Resolves the AcroForm field tree once, classifies every terminal field by
//! widget kind, and exposes typed setters that refuse to write a value into
//! the wrong kind of field.

use anyhow::{anyhow, bail, Context, Result};
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use std::collections::HashSet;

use crate::types::WidgetType;

/// `/Ff` bit 16: radio button group.
const FF_RADIO: i64 = 1 << 15;
/// `/Ff` bit 17: pushbutton, carries no value.
const FF_PUSHBUTTON: i64 = 1 << 16;
const MAX_FIELD_DEPTH: usize = 32;
const OFF_STATE: &[u8] = b"Off";

/// A terminal form field and the widget annotations that draw it.
#[derive(Debug, Clone)]
pub struct FieldEntry {
    pub name: String,
    pub id: ObjectId,
    pub widget_type: WidgetType,
    pub widgets: Vec<ObjectId>,
}

/// An owned PDF together with its resolved form fields.
pub struct AcroForm {
    doc: Document,
    fields: Vec<FieldEntry>,
}

impl AcroForm {
    /// Load a template. Encrypted documents get an empty-password attempt;
    /// a document without an AcroForm loads with zero fields.
    pub fn load(bytes: &[u8]) -> Result<Self> {
        let mut doc = Document::load_mem(bytes).context("lopdf: failed to load PDF from memory")?;
        if doc.is_encrypted() {
            if let Err(e) = doc.decrypt("") {
                tracing::warn!("Encrypted PDF could not be decrypted with an empty password: {}", e);
            }
        }
        Ok(Self::from_document(doc))
    }

    pub fn from_document(doc: Document) -> Self {
        let fields = collect_form_fields(&doc).unwrap_or_else(|e| {
            tracing::debug!("No usable AcroForm: {}", e);
            Vec::new()
        });
        Self { doc, fields }
    }

    pub fn fields(&self) -> &[FieldEntry] {
        &self.fields
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn into_document(self) -> Document {
        self.doc
    }

    /// Exact name first, then ASCII case-insensitive.
    pub fn find(&self, name: &str) -> Option<&FieldEntry> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name)))
    }

    pub fn widget_type(&self, name: &str) -> Option<WidgetType> {
        self.find(name).map(|f| f.widget_type)
    }

    fn expect_kind(&self, name: &str, kind: WidgetType) -> Result<FieldEntry> {
        let entry = self
            .find(name)
            .ok_or_else(|| anyhow!("No form field named {:?}", name))?;
        if entry.widget_type != kind {
            bail!("{:?} is a {:?} field, not {:?}", entry.name, entry.widget_type, kind);
        }
        Ok(entry.clone())
    }

    // ── Text ──────────────────────────────────────────────────────────

    pub fn set_text(&mut self, name: &str, value: &str) -> Result<()> {
        let entry = self.expect_kind(name, WidgetType::Text)?;
        self.field_dict_mut(entry.id)?.set("V", pdf_text_string(value));
        self.drop_appearances(&entry)
    }

    // ── Radio groups ──────────────────────────────────────────────────

    /// Option labels in widget order, `/Opt` export values when present.
    pub fn radio_options(&self, name: &str) -> Result<Vec<String>> {
        let entry = self.expect_kind(name, WidgetType::Radio)?;
        let mut labels: Vec<String> = Vec::new();
        for (label, _) in self.radio_states(&entry) {
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
        if labels.is_empty() {
            bail!("Radio group {:?} has no selectable options", entry.name);
        }
        Ok(labels)
    }

    pub fn select_radio(&mut self, name: &str, label: &str) -> Result<()> {
        let entry = self.expect_kind(name, WidgetType::Radio)?;
        let state = self
            .radio_states(&entry)
            .into_iter()
            .find(|(l, _)| l == label)
            .map(|(_, state)| state)
            .ok_or_else(|| anyhow!("Radio group {:?} has no option {:?}", entry.name, label))?;
        self.field_dict_mut(entry.id)?.set("V", Object::Name(state));
        Ok(())
    }

    /// (label, on-state) per widget kid.
    fn radio_states(&self, entry: &FieldEntry) -> Vec<(String, Vec<u8>)> {
        let opt_labels: Vec<String> = self
            .field_dict(entry.id)
            .and_then(|d| d.get(b"Opt").ok())
            .and_then(|o| resolve(&self.doc, o).as_array().ok())
            .map(|arr| arr.iter().filter_map(|o| object_text(&self.doc, o)).collect())
            .unwrap_or_default();

        entry
            .widgets
            .iter()
            .enumerate()
            .filter_map(|(i, wid)| {
                let state = self.on_state(*wid)?;
                let label = opt_labels
                    .get(i)
                    .filter(|_| opt_labels.len() == entry.widgets.len())
                    .cloned()
                    .unwrap_or_else(|| decode_pdf_string(&state));
                Some((label, state))
            })
            .collect()
    }

    // ── Checkboxes ────────────────────────────────────────────────────

    pub fn set_checkbox(&mut self, name: &str, checked: bool) -> Result<()> {
        let entry = self.expect_kind(name, WidgetType::Checkbox)?;
        let value = if checked {
            entry
                .widgets
                .iter()
                .find_map(|w| self.on_state(*w))
                .unwrap_or_else(|| b"Yes".to_vec())
        } else {
            OFF_STATE.to_vec()
        };
        self.field_dict_mut(entry.id)?.set("V", Object::Name(value));
        Ok(())
    }

    // ── Dropdowns / list boxes ────────────────────────────────────────

    /// Display labels from `/Opt`.
    pub fn dropdown_options(&self, name: &str) -> Result<Vec<String>> {
        let entry = self.expect_kind(name, WidgetType::Dropdown)?;
        let options: Vec<String> = self
            .choice_pairs(&entry)
            .into_iter()
            .map(|(_, display)| display)
            .collect();
        if options.is_empty() {
            bail!("Dropdown {:?} has no options", entry.name);
        }
        Ok(options)
    }

    pub fn select_dropdown(&mut self, name: &str, label: &str) -> Result<()> {
        let entry = self.expect_kind(name, WidgetType::Dropdown)?;
        let export = self
            .choice_pairs(&entry)
            .into_iter()
            .find(|(_, display)| display == label)
            .map(|(export, _)| export)
            .ok_or_else(|| anyhow!("Dropdown {:?} has no option {:?}", entry.name, label))?;
        let dict = self.field_dict_mut(entry.id)?;
        dict.set("V", pdf_text_string(&export));
        dict.remove(b"I");
        self.drop_appearances(&entry)
    }

    /// (export value, display label) pairs.
    fn choice_pairs(&self, entry: &FieldEntry) -> Vec<(String, String)> {
        let Some(arr) = self
            .field_dict(entry.id)
            .and_then(|d| d.get(b"Opt").ok())
            .and_then(|o| resolve(&self.doc, o).as_array().ok())
        else {
            return Vec::new();
        };

        arr.iter()
            .filter_map(|item| match resolve(&self.doc, item) {
                Object::Array(pair) if pair.len() >= 2 => {
                    let export = object_text(&self.doc, &pair[0])?;
                    let display = object_text(&self.doc, &pair[1]).unwrap_or_else(|| export.clone());
                    Some((export, display))
                }
                other => object_text(&self.doc, other).map(|t| (t.clone(), t)),
            })
            .collect()
    }

    // ── Appearance ────────────────────────────────────────────────────

    /// Bring widget appearance in line with the field value: buttons get
    /// their `/AS` state synced to `/V`, text-like fields drop stale
    /// appearance streams so the viewer regenerates them.
    pub fn refresh_appearance(&mut self, name: &str) -> Result<()> {
        let entry = self
            .find(name)
            .cloned()
            .ok_or_else(|| anyhow!("No form field named {:?}", name))?;

        match entry.widget_type {
            WidgetType::Radio | WidgetType::Checkbox => {
                let value = self
                    .field_dict(entry.id)
                    .and_then(|d| d.get(b"V").ok())
                    .and_then(|v| v.as_name().ok())
                    .map(<[u8]>::to_vec)
                    .unwrap_or_else(|| OFF_STATE.to_vec());

                for wid in &entry.widgets {
                    let on = self.on_state(*wid);
                    let state = match on {
                        Some(on) if on == value => on,
                        _ => OFF_STATE.to_vec(),
                    };
                    self.field_dict_mut(*wid)?.set("AS", Object::Name(state));
                }
                Ok(())
            }
            _ => self.drop_appearances(&entry),
        }
    }

    /// Removes stale appearance streams and asks the viewer to regenerate
    /// them, whichever save path the document later takes.
    fn drop_appearances(&mut self, entry: &FieldEntry) -> Result<()> {
        for wid in &entry.widgets {
            self.field_dict_mut(*wid)?.remove(b"AP");
        }
        set_need_appearances(&mut self.doc, true)
    }

    /// First non-`Off` key of the widget's normal appearance dictionary.
    fn on_state(&self, widget: ObjectId) -> Option<Vec<u8>> {
        let dict = self.field_dict(widget)?;
        let ap = resolve(&self.doc, dict.get(b"AP").ok()?).as_dict().ok()?;
        let normal = resolve(&self.doc, ap.get(b"N").ok()?).as_dict().ok()?;
        normal
            .iter()
            .map(|(k, _)| k)
            .find(|k| k.as_slice() != OFF_STATE)
            .cloned()
    }

    fn field_dict(&self, id: ObjectId) -> Option<&Dictionary> {
        self.doc.get_object(id).ok()?.as_dict().ok()
    }

    fn field_dict_mut(&mut self, id: ObjectId) -> Result<&mut Dictionary> {
        self.doc
            .get_object_mut(id)
            .with_context(|| format!("Missing form object {:?}", id))?
            .as_dict_mut()
            .map_err(|_| anyhow!("Form object {:?} is not a dictionary", id))
    }
}

/// Set `/NeedAppearances` on the document's AcroForm dictionary.
pub fn set_need_appearances(doc: &mut Document, value: bool) -> Result<()> {
    let root_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|e| anyhow!("Trailer has no Root reference: {:?}", e))?;

    let acroform_ref = match doc.get_object(root_id)?.as_dict()?.get(b"AcroForm") {
        Ok(Object::Reference(id)) => Some(*id),
        Ok(Object::Dictionary(_)) => None,
        _ => bail!("Catalog has no AcroForm"),
    };

    let dict = match acroform_ref {
        Some(id) => doc.get_object_mut(id)?.as_dict_mut()?,
        None => doc
            .get_object_mut(root_id)?
            .as_dict_mut()?
            .get_mut(b"AcroForm")?
            .as_dict_mut()?,
    };
    dict.set("NeedAppearances", Object::Boolean(value));
    Ok(())
}

// ── Field tree ───────────────────────────────────────────────────────

/// Inherited attributes while walking `/Kids`.
#[derive(Clone, Default)]
struct Inherited {
    name: Option<String>,
    field_type: Option<Vec<u8>>,
    flags: i64,
}

fn collect_form_fields(doc: &Document) -> Result<Vec<FieldEntry>> {
    let catalog = doc.catalog().map_err(|e| anyhow!("Catalog: {:?}", e))?;
    let acroform = resolve(doc, catalog.get(b"AcroForm")?)
        .as_dict()
        .map_err(|_| anyhow!("AcroForm is not a dictionary"))?;
    let fields = resolve(doc, acroform.get(b"Fields")?)
        .as_array()
        .map_err(|_| anyhow!("AcroForm /Fields is not an array"))?;

    let mut out = Vec::new();
    let mut visited = HashSet::new();
    for field in fields {
        if let Object::Reference(id) = field {
            walk_field(doc, *id, &Inherited::default(), 0, &mut visited, &mut out);
        }
    }
    Ok(out)
}

/// Recursively collect terminal fields, traversing Kids arrays.
fn walk_field(
    doc: &Document,
    id: ObjectId,
    parent: &Inherited,
    depth: usize,
    visited: &mut HashSet<ObjectId>,
    out: &mut Vec<FieldEntry>,
) {
    if depth > MAX_FIELD_DEPTH || !visited.insert(id) {
        return;
    }
    let Some(dict) = doc.get_object(id).ok().and_then(|o| o.as_dict().ok()) else {
        return;
    };

    let partial = get_dict_string(dict, b"T");
    let name = match (&parent.name, partial) {
        (Some(p), Some(t)) => Some(format!("{}.{}", p, t)),
        (None, Some(t)) => Some(t),
        (p, None) => p.clone(),
    };
    let here = Inherited {
        name,
        field_type: dict
            .get(b"FT")
            .ok()
            .and_then(|o| o.as_name().ok())
            .map(<[u8]>::to_vec)
            .or_else(|| parent.field_type.clone()),
        flags: dict
            .get(b"Ff")
            .ok()
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(parent.flags),
    };

    let kids: Vec<ObjectId> = dict
        .get(b"Kids")
        .ok()
        .and_then(|k| resolve(doc, k).as_array().ok())
        .map(|arr| arr.iter().filter_map(|k| k.as_reference().ok()).collect())
        .unwrap_or_default();

    let (child_fields, widgets): (Vec<ObjectId>, Vec<ObjectId>) =
        kids.into_iter().partition(|kid| {
            doc.get_object(*kid)
                .ok()
                .and_then(|o| o.as_dict().ok())
                .map(|d| d.has(b"T"))
                .unwrap_or(false)
        });

    if !child_fields.is_empty() {
        for kid in child_fields {
            walk_field(doc, kid, &here, depth + 1, visited, out);
        }
        return;
    }

    let Some(name) = here.name.clone().filter(|n| !n.is_empty()) else {
        return;
    };
    out.push(FieldEntry {
        name,
        id,
        widget_type: classify(here.field_type.as_deref(), here.flags),
        widgets: if widgets.is_empty() { vec![id] } else { widgets },
    });
}

fn classify(field_type: Option<&[u8]>, flags: i64) -> WidgetType {
    match field_type {
        Some(b"Tx") => WidgetType::Text,
        Some(b"Btn") if flags & FF_PUSHBUTTON != 0 => WidgetType::Unknown,
        Some(b"Btn") if flags & FF_RADIO != 0 => WidgetType::Radio,
        Some(b"Btn") => WidgetType::Checkbox,
        Some(b"Ch") => WidgetType::Dropdown,
        _ => WidgetType::Unknown,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

fn object_text(doc: &Document, obj: &Object) -> Option<String> {
    match resolve(doc, obj) {
        Object::String(bytes, _) | Object::Name(bytes) => Some(decode_pdf_string(bytes)),
        _ => None,
    }
}

fn get_dict_string(dict: &Dictionary, key: &[u8]) -> Option<String> {
    dict.get(key).ok().and_then(|obj| match obj {
        Object::String(bytes, _) | Object::Name(bytes) => {
            let s = decode_pdf_string(bytes);
            if s.is_empty() {
                None
            } else {
                Some(s)
            }
        }
        _ => None,
    })
}

/// PDF text string: literal for ASCII, UTF-16BE with BOM otherwise.
pub fn pdf_text_string(value: &str) -> Object {
    if value.is_ascii() {
        return Object::String(value.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in value.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

// ── PDF string decoding ──────────────────────────────────────────────

/// PDF string decoder: handles UTF-16BE/LE with BOM, UTF-8, and falls back
/// to a lossy read.
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        return decode_utf16(&bytes[2..], u16::from_be_bytes);
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return decode_utf16(&bytes[2..], u16::from_le_bytes);
    }
    String::from_utf8(bytes.to_vec())
        .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned())
}

fn decode_utf16(bytes: &[u8], read: fn([u8; 2]) -> u16) -> String {
    let values: Vec<u16> = bytes
        .chunks(2)
        .filter(|c| c.len() == 2)
        .map(|c| read([c[0], c[1]]))
        .collect();
    String::from_utf16_lossy(&values)
        .chars()
        .filter(|&c| c != '\0')
        .collect()
}
