//! AcroForm field discovery and value binding
//!
//! A [`FormDocument`] wraps a loaded lopdf [`Document`] together with the
//! terminal fields of its interactive form. Fields are addressed by their
//! fully qualified name (partial names joined with `.`).

use crate::error::{classify_load_error, Error, Result};
use crate::pdf::qpdf::QpdfWrapper;
use bitflags::bitflags;
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Maximum depth of the field hierarchy that is followed
const MAX_FIELD_DEPTH: usize = 32;

/// Appearance state name meaning "not selected"
const OFF_STATE: &str = "Off";

/// On-state used when a checkbox widget carries no appearance dictionary
const DEFAULT_ON_STATE: &str = "Yes";

bitflags! {
    /// Field flags (`/Ff`) relevant to classification and validation
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FieldFlags: u32 {
        const READ_ONLY = 1 << 0;
        const REQUIRED = 1 << 1;
        const RADIO = 1 << 15;
        const PUSHBUTTON = 1 << 16;
        const COMBO = 1 << 17;
        const EDIT = 1 << 18;
    }
}

/// A value supplied by a caller for one field.
///
/// JSON booleans, numbers and strings are all accepted; non-checkbox fields
/// receive the value's text form. Any other JSON value deserializes into
/// [`FieldValue::Other`] and fails only for its own field when applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    Other(serde_json::Value),
}

impl FieldValue {
    /// Text form written into text, radio and dropdown fields
    pub fn as_text(&self) -> String {
        match self {
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Other(v) => v.to_string(),
        }
    }

    /// Whether this value checks a checkbox.
    ///
    /// Only boolean `true` and the exact strings `"true"`, `"yes"` and `"1"`
    /// count; everything else unchecks.
    pub fn is_truthy(&self) -> bool {
        match self {
            FieldValue::Bool(b) => *b,
            FieldValue::Text(s) => matches!(s.as_str(), "true" | "yes" | "1"),
            FieldValue::Number(_) | FieldValue::Other(_) => false,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// Field name to value mapping
pub type FieldValueMap = BTreeMap<String, FieldValue>;

/// Field kind as reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Checkbox,
    Radio,
    Dropdown,
    Unknown,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Text => "text",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Radio => "radio",
            FieldKind::Dropdown => "dropdown",
            FieldKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A classified terminal field, carrying what writing a value needs
#[derive(Debug, Clone, PartialEq)]
pub enum FormField {
    Text,
    Checkbox { on_state: String },
    Radio { options: Vec<String> },
    Dropdown { options: Vec<String>, editable: bool },
    Unknown,
}

impl FormField {
    pub fn kind(&self) -> FieldKind {
        match self {
            FormField::Text => FieldKind::Text,
            FormField::Checkbox { .. } => FieldKind::Checkbox,
            FormField::Radio { .. } => FieldKind::Radio,
            FormField::Dropdown { .. } => FieldKind::Dropdown,
            FormField::Unknown => FieldKind::Unknown,
        }
    }

    fn options(&self) -> Vec<String> {
        match self {
            FormField::Radio { options } | FormField::Dropdown { options, .. } => options.clone(),
            _ => Vec::new(),
        }
    }
}

/// Current value of a field: checkbox state or text
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CurrentValue {
    Checked(bool),
    Text(String),
}

/// Read-only description of one field
#[derive(Debug, Clone, Serialize)]
pub struct FormFieldInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    pub options: Vec<String>,
    #[serde(rename = "currentValue")]
    pub current_value: CurrentValue,
    /// Whether the field carries the Required flag
    #[serde(skip)]
    pub required: bool,
}

impl FormFieldInfo {
    /// Whether the field counts as unfilled.
    ///
    /// Checkboxes are never empty; fields of unknown kind always are.
    pub fn is_empty(&self) -> bool {
        match (&self.kind, &self.current_value) {
            (FieldKind::Checkbox, _) => false,
            (FieldKind::Unknown, _) => true,
            (_, CurrentValue::Text(s)) => s.trim().is_empty(),
            (_, CurrentValue::Checked(_)) => false,
        }
    }

    /// Value as written to a CSV export: checkboxes become `yes`/`no`
    pub fn export_value(&self) -> String {
        match &self.current_value {
            CurrentValue::Checked(true) => "yes".to_string(),
            CurrentValue::Checked(false) => "no".to_string(),
            CurrentValue::Text(s) => s.clone(),
        }
    }
}

/// A value that could not be applied during a fill
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub name: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Outcome of applying a value map
#[derive(Debug, Clone, Default)]
pub struct FillReport {
    /// Names written successfully, in application order
    pub filled: Vec<String>,
    pub errors: Vec<FieldError>,
}

/// Filled/empty summary of a form
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub total: usize,
    pub filled: usize,
    pub empty_fields: Vec<String>,
    /// Empty fields that look required, by name or by flag
    pub required_empty: Vec<String>,
}

impl ValidationReport {
    pub fn from_fields(fields: &[FormFieldInfo]) -> Self {
        let mut report = ValidationReport {
            total: fields.len(),
            ..Default::default()
        };

        for field in fields {
            if field.is_empty() {
                report.empty_fields.push(field.name.clone());
                if field.required || looks_required(&field.name) {
                    report.required_empty.push(field.name.clone());
                }
            } else {
                report.filled += 1;
            }
        }

        report
    }

    pub fn empty(&self) -> usize {
        self.empty_fields.len()
    }
}

/// Name heuristic for required fields
pub fn looks_required(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("required") || lower.contains("must") || name.contains('*')
}

/// A terminal field node and the widget annotations that display it
#[derive(Debug, Clone)]
struct FieldNode {
    id: ObjectId,
    name: String,
    widgets: Vec<ObjectId>,
}

/// A loaded document with its interactive form
pub struct FormDocument {
    document: Document,
    fields: Vec<FieldNode>,
    modified: bool,
}

impl FormDocument {
    /// Load a document, decrypting it first when a password is given.
    ///
    /// Without a password an encrypted document yields
    /// [`Error::PasswordRequired`].
    pub fn load(data: &[u8], password: Option<&str>) -> Result<Self> {
        let document = match password {
            Some(pwd) => {
                let decrypted = QpdfWrapper::decrypt(data, pwd)?;
                Document::load_mem(&decrypted).map_err(|e| classify_load_error(&e.to_string()))?
            }
            None => match Document::load_mem(data) {
                Ok(doc) => doc,
                Err(_) if looks_encrypted(data) => return Err(Error::PasswordRequired),
                Err(e) => return Err(classify_load_error(&e.to_string())),
            },
        };

        if document.trailer.has(b"Encrypt") {
            return Err(Error::PasswordRequired);
        }

        Ok(Self::from_document(document))
    }

    /// Wrap an already loaded, unencrypted document
    pub fn from_document(document: Document) -> Self {
        let fields = collect_fields(&document);
        tracing::debug!(fields = fields.len(), "form fields discovered");
        Self {
            document,
            fields,
            modified: false,
        }
    }

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Text of all pages, concatenated in page order
    pub fn extract_text(&self) -> Result<String> {
        let pages: Vec<u32> = self.document.get_pages().keys().copied().collect();
        if pages.is_empty() {
            return Ok(String::new());
        }
        Ok(self.document.extract_text(&pages)?)
    }

    /// Descriptions of every terminal field, in document order
    pub fn fields(&self) -> Vec<FormFieldInfo> {
        self.fields.iter().map(|node| self.describe(node)).collect()
    }

    /// Classify a field by name
    pub fn field(&self, name: &str) -> Result<FormField> {
        let node = self.node(name)?;
        Ok(self.classify(node))
    }

    /// Apply every entry of `values`, collecting per-field failures.
    pub fn fill(&mut self, values: &FieldValueMap) -> FillReport {
        let mut report = FillReport::default();

        for (name, value) in values {
            match self.apply_value(name, value) {
                Ok(()) => report.filled.push(name.clone()),
                Err(e) => {
                    let message = if e.is_field_error() {
                        e.to_string()
                    } else {
                        format!("Field '{}': {}", name, e)
                    };
                    report.errors.push(FieldError {
                        name: name.clone(),
                        message,
                    });
                }
            }
        }

        report
    }

    /// Write one value into the named field.
    pub fn apply_value(&mut self, name: &str, value: &FieldValue) -> Result<()> {
        let node = self.node(name)?.clone();
        if let FieldValue::Other(other) = value {
            return Err(Error::FieldWrite {
                name: name.to_string(),
                reason: format!("unsupported value {}", other),
            });
        }

        match self.classify(&node) {
            FormField::Text => {
                self.set_entry(node.id, "V", encode_text(&value.as_text()))?;
            }
            FormField::Checkbox { on_state } => {
                let state = if value.is_truthy() {
                    on_state
                } else {
                    OFF_STATE.to_string()
                };
                self.set_entry(node.id, "V", Object::Name(state.clone().into_bytes()))?;
                for widget in &node.widgets {
                    let own_states = self.widget_states(*widget);
                    let widget_state = if own_states.is_empty() || own_states.contains(&state) {
                        state.as_str()
                    } else {
                        OFF_STATE
                    };
                    let widget_state = Object::Name(widget_state.as_bytes().to_vec());
                    self.set_entry(*widget, "AS", widget_state)?;
                }
            }
            FormField::Radio { options } => {
                let choice = value.as_text();
                if !options.contains(&choice) {
                    return Err(invalid_option(name, &choice, &options));
                }
                self.set_entry(node.id, "V", Object::Name(choice.clone().into_bytes()))?;
                for widget in &node.widgets {
                    let state = if self.widget_states(*widget).contains(&choice) {
                        choice.as_str()
                    } else {
                        OFF_STATE
                    };
                    self.set_entry(*widget, "AS", Object::Name(state.as_bytes().to_vec()))?;
                }
            }
            FormField::Dropdown { options, editable } => {
                let choice = value.as_text();
                if !editable && !options.contains(&choice) {
                    return Err(invalid_option(name, &choice, &options));
                }
                self.set_entry(node.id, "V", encode_text(&choice))?;
                if let Ok(dict) = self
                    .document
                    .get_object_mut(node.id)
                    .and_then(Object::as_dict_mut)
                {
                    dict.remove(b"I");
                }
            }
            FormField::Unknown => {
                tracing::debug!(field = name, "skipping field of unknown kind");
                return Ok(());
            }
        }

        self.modified = true;
        Ok(())
    }

    /// Serialize the document, flagging appearances for regeneration if
    /// any field was written.
    pub fn save(&mut self) -> Result<Vec<u8>> {
        if self.modified {
            self.mark_need_appearances()?;
        }
        let mut buffer = Vec::new();
        self.document.save_to(&mut buffer)?;
        Ok(buffer)
    }

    fn node(&self, name: &str) -> Result<&FieldNode> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| Error::FieldNotFound {
                name: name.to_string(),
            })
    }

    fn set_entry(&mut self, id: ObjectId, key: &str, value: Object) -> Result<()> {
        let dict = self.document.get_object_mut(id)?.as_dict_mut()?;
        dict.set(key, value);
        Ok(())
    }

    fn mark_need_appearances(&mut self) -> Result<()> {
        let root = self.document.trailer.get(b"Root")?.as_reference()?;
        let acroform_ref = self
            .document
            .get_object(root)?
            .as_dict()?
            .get(b"AcroForm")
            .ok()
            .and_then(|o| o.as_reference().ok());

        let acroform = match acroform_ref {
            Some(id) => self.document.get_object_mut(id)?.as_dict_mut()?,
            None => self
                .document
                .get_object_mut(root)?
                .as_dict_mut()?
                .get_mut(b"AcroForm")?
                .as_dict_mut()?,
        };
        acroform.set("NeedAppearances", true);
        Ok(())
    }

    fn classify(&self, node: &FieldNode) -> FormField {
        let doc = &self.document;
        let field_type = inherited(doc, node.id, b"FT").and_then(|o| o.as_name().ok());
        let flags = self.flags(node);

        match field_type {
            Some(b"Tx") => FormField::Text,
            Some(b"Btn") if flags.contains(FieldFlags::RADIO) => FormField::Radio {
                options: self.appearance_states(node),
            },
            Some(b"Btn") if flags.contains(FieldFlags::PUSHBUTTON) => FormField::Unknown,
            Some(b"Btn") => FormField::Checkbox {
                on_state: self
                    .appearance_states(node)
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| DEFAULT_ON_STATE.to_string()),
            },
            Some(b"Ch") => FormField::Dropdown {
                options: self.choice_options(node),
                editable: flags.contains(FieldFlags::COMBO | FieldFlags::EDIT),
            },
            _ => FormField::Unknown,
        }
    }

    fn flags(&self, node: &FieldNode) -> FieldFlags {
        inherited(&self.document, node.id, b"Ff")
            .and_then(|o| o.as_i64().ok())
            .map(|bits| FieldFlags::from_bits_truncate(bits as u32))
            .unwrap_or(FieldFlags::empty())
    }

    fn describe(&self, node: &FieldNode) -> FormFieldInfo {
        let field = self.classify(node);
        let value = inherited(&self.document, node.id, b"V");

        let current_value = match &field {
            FormField::Checkbox { .. } => {
                let checked = match value.and_then(|v| v.as_name().ok()) {
                    Some(state) => state != OFF_STATE.as_bytes(),
                    None => node.widgets.iter().any(|w| {
                        self.dict(*w)
                            .and_then(|d| d.get(b"AS").ok())
                            .and_then(|s| s.as_name().ok())
                            .is_some_and(|s| s != OFF_STATE.as_bytes())
                    }),
                };
                CurrentValue::Checked(checked)
            }
            FormField::Radio { .. } => {
                let selected = value
                    .and_then(|v| v.as_name().ok())
                    .filter(|s| *s != OFF_STATE.as_bytes())
                    .map(|s| String::from_utf8_lossy(s).into_owned())
                    .unwrap_or_default();
                CurrentValue::Text(selected)
            }
            FormField::Dropdown { .. } => {
                let selected = match value {
                    Some(Object::Array(items)) => items
                        .first()
                        .and_then(|o| decode_text(resolve(&self.document, o))),
                    Some(other) => decode_text(other),
                    None => None,
                };
                CurrentValue::Text(selected.unwrap_or_default())
            }
            FormField::Text => CurrentValue::Text(value.and_then(decode_text).unwrap_or_default()),
            FormField::Unknown => CurrentValue::Text(String::new()),
        };

        FormFieldInfo {
            name: node.name.clone(),
            kind: field.kind(),
            options: field.options(),
            current_value,
            required: self.flags(node).contains(FieldFlags::REQUIRED),
        }
    }

    fn dict(&self, id: ObjectId) -> Option<&Dictionary> {
        self.document.get_object(id).ok()?.as_dict().ok()
    }

    /// On-state names across all widgets of a button field
    fn appearance_states(&self, node: &FieldNode) -> Vec<String> {
        let mut states: Vec<String> = Vec::new();
        for widget in &node.widgets {
            for state in self.widget_states(*widget) {
                if !states.contains(&state) {
                    states.push(state);
                }
            }
        }
        states
    }

    /// On-state names of one widget's normal appearance dictionary
    fn widget_states(&self, widget: ObjectId) -> Vec<String> {
        let doc = &self.document;
        let normal = self
            .dict(widget)
            .and_then(|d| d.get(b"AP").ok())
            .and_then(|ap| resolve(doc, ap).as_dict().ok())
            .and_then(|ap| ap.get(b"N").ok())
            .and_then(|n| resolve(doc, n).as_dict().ok());

        match normal {
            Some(states) => states
                .iter()
                .map(|(key, _)| String::from_utf8_lossy(key).into_owned())
                .filter(|key| key != OFF_STATE)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Export values of a choice field's `/Opt` array
    fn choice_options(&self, node: &FieldNode) -> Vec<String> {
        let doc = &self.document;
        let Some(Object::Array(items)) = inherited(doc, node.id, b"Opt") else {
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| match resolve(doc, item) {
                Object::Array(pair) => pair.first().and_then(|o| decode_text(resolve(doc, o))),
                other => decode_text(other),
            })
            .collect()
    }
}

fn invalid_option(name: &str, value: &str, options: &[String]) -> Error {
    Error::InvalidOption {
        name: name.to_string(),
        value: value.to_string(),
        options: options.join(", "),
    }
}

fn looks_encrypted(data: &[u8]) -> bool {
    data.windows(b"/Encrypt".len()).any(|w| w == b"/Encrypt")
}

/// Follow an indirect reference, leaving direct objects as they are
fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

/// Look up an inheritable field attribute, walking `/Parent` links
fn inherited<'a>(doc: &'a Document, id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = id;
    for _ in 0..MAX_FIELD_DEPTH {
        let dict = doc.get_object(current).ok()?.as_dict().ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(resolve(doc, value));
        }
        current = dict.get(b"Parent").ok()?.as_reference().ok()?;
    }
    None
}

fn acroform(doc: &Document) -> Option<&Dictionary> {
    let root = doc.trailer.get(b"Root").ok()?.as_reference().ok()?;
    let catalog = doc.get_object(root).ok()?.as_dict().ok()?;
    resolve(doc, catalog.get(b"AcroForm").ok()?).as_dict().ok()
}

fn collect_fields(doc: &Document) -> Vec<FieldNode> {
    let mut fields = Vec::new();
    let roots = acroform(doc)
        .and_then(|form| form.get(b"Fields").ok())
        .and_then(|f| resolve(doc, f).as_array().ok());

    if let Some(roots) = roots {
        walk_fields(doc, roots, None, 0, &mut fields);
    }
    fields
}

fn has_partial_name(doc: &Document, obj: &Object) -> bool {
    resolve(doc, obj)
        .as_dict()
        .map(|d| d.has(b"T"))
        .unwrap_or(false)
}

fn walk_fields(
    doc: &Document,
    kids: &[Object],
    parent: Option<&str>,
    depth: usize,
    out: &mut Vec<FieldNode>,
) {
    if depth >= MAX_FIELD_DEPTH {
        tracing::warn!(depth, "field hierarchy too deep, truncating");
        return;
    }

    for kid in kids {
        let Object::Reference(id) = kid else {
            continue;
        };
        let Ok(dict) = doc.get_object(*id).and_then(|o| o.as_dict()) else {
            continue;
        };
        let Some(partial) = dict.get(b"T").ok().and_then(|t| decode_text(resolve(doc, t))) else {
            continue;
        };

        let name = match parent {
            Some(p) => format!("{}.{}", p, partial),
            None => partial,
        };

        let children: Vec<Object> = dict
            .get(b"Kids")
            .ok()
            .and_then(|k| resolve(doc, k).as_array().ok())
            .cloned()
            .unwrap_or_default();

        let (field_kids, widget_kids): (Vec<Object>, Vec<Object>) = children
            .into_iter()
            .partition(|c| has_partial_name(doc, c));

        if !field_kids.is_empty() {
            walk_fields(doc, &field_kids, Some(&name), depth + 1, out);
            continue;
        }

        let widgets = if widget_kids.is_empty() {
            vec![*id]
        } else {
            widget_kids
                .iter()
                .filter_map(|w| w.as_reference().ok())
                .collect()
        };

        out.push(FieldNode {
            id: *id,
            name,
            widgets,
        });
    }
}

/// Decode a PDF text string: UTF-16BE with BOM, then UTF-8, then Latin-1
fn decode_text(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        _ => None,
    }
}

fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Encode text for a `/V` entry; non-ASCII text is written as UTF-16BE
fn encode_text(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Stream};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    /// Small AcroForm generator for tests
    pub(crate) struct FormBuilder {
        doc: Document,
        pages_id: ObjectId,
        page_id: ObjectId,
        appearance: ObjectId,
        fields: Vec<Object>,
        annots: Vec<Object>,
        text: Option<String>,
    }

    impl FormBuilder {
        pub(crate) fn new() -> Self {
            let mut doc = Document::with_version("1.5");
            let pages_id = doc.new_object_id();
            let page_id = doc.new_object_id();
            let appearance = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
            Self {
                doc,
                pages_id,
                page_id,
                appearance,
                fields: Vec::new(),
                annots: Vec::new(),
                text: None,
            }
        }

        fn widget(&self) -> Dictionary {
            dictionary! {
                "Type" => "Annot",
                "Subtype" => "Widget",
                "P" => self.page_id,
                "Rect" => vec![0.into(), 0.into(), 100.into(), 20.into()],
            }
        }

        fn states(&self, on: &str) -> Dictionary {
            let mut normal = Dictionary::new();
            normal.set(on, self.appearance);
            normal.set(OFF_STATE, self.appearance);
            dictionary! { "N" => normal }
        }

        fn push(&mut self, dict: Dictionary) -> ObjectId {
            let id = self.doc.add_object(dict);
            self.fields.push(id.into());
            self.annots.push(id.into());
            id
        }

        pub(crate) fn text(mut self, name: &str, value: Option<&str>) -> Self {
            let mut dict = self.widget();
            dict.set("FT", "Tx");
            dict.set("T", Object::string_literal(name));
            if let Some(v) = value {
                dict.set("V", Object::string_literal(v));
            }
            self.push(dict);
            self
        }

        pub(crate) fn required_text(mut self, name: &str) -> Self {
            let mut dict = self.widget();
            dict.set("FT", "Tx");
            dict.set("T", Object::string_literal(name));
            dict.set("Ff", FieldFlags::REQUIRED.bits() as i64);
            self.push(dict);
            self
        }

        pub(crate) fn checkbox(mut self, name: &str, checked: bool) -> Self {
            let state = if checked { "Yes" } else { OFF_STATE };
            let mut dict = self.widget();
            dict.set("FT", "Btn");
            dict.set("T", Object::string_literal(name));
            dict.set("V", Object::Name(state.as_bytes().to_vec()));
            dict.set("AS", Object::Name(state.as_bytes().to_vec()));
            dict.set("AP", self.states("Yes"));
            self.push(dict);
            self
        }

        pub(crate) fn radio(self, name: &str, options: &[&str]) -> Self {
            self.button_group(name, FieldFlags::RADIO, options)
        }

        /// A checkbox whose widgets each carry their own on-state
        pub(crate) fn checkbox_group(self, name: &str, on_states: &[&str]) -> Self {
            self.button_group(name, FieldFlags::empty(), on_states)
        }

        /// A field whose type is neither text, button nor choice
        pub(crate) fn signature(mut self, name: &str) -> Self {
            let mut dict = self.widget();
            dict.set("FT", "Sig");
            dict.set("T", Object::string_literal(name));
            self.push(dict);
            self
        }

        fn button_group(mut self, name: &str, flags: FieldFlags, options: &[&str]) -> Self {
            let parent_id = self.doc.new_object_id();
            let mut kids = Vec::new();
            for option in options {
                let mut widget = self.widget();
                widget.set("Parent", parent_id);
                widget.set("AS", OFF_STATE);
                widget.set("AP", self.states(option));
                let id = self.doc.add_object(widget);
                self.annots.push(id.into());
                kids.push(Object::from(id));
            }
            let parent = dictionary! {
                "FT" => "Btn",
                "Ff" => flags.bits() as i64,
                "T" => Object::string_literal(name),
                "Kids" => kids,
            };
            self.doc.objects.insert(parent_id, Object::Dictionary(parent));
            self.fields.push(parent_id.into());
            self
        }

        pub(crate) fn dropdown(mut self, name: &str, options: &[&str]) -> Self {
            let mut dict = self.widget();
            dict.set("FT", "Ch");
            dict.set("Ff", FieldFlags::COMBO.bits() as i64);
            dict.set("T", Object::string_literal(name));
            dict.set(
                "Opt",
                options
                    .iter()
                    .map(|o| Object::string_literal(*o))
                    .collect::<Vec<_>>(),
            );
            self.push(dict);
            self
        }

        /// A non-terminal field `parent` holding one text child `child`
        pub(crate) fn nested_text(mut self, parent: &str, child: &str) -> Self {
            let parent_id = self.doc.new_object_id();
            let mut kid = self.widget();
            kid.set("T", Object::string_literal(child));
            kid.set("Parent", parent_id);
            let kid_id = self.doc.add_object(kid);
            self.annots.push(kid_id.into());
            let dict = dictionary! {
                "FT" => "Tx",
                "T" => Object::string_literal(parent),
                "Kids" => vec![Object::from(kid_id)],
            };
            self.doc.objects.insert(parent_id, Object::Dictionary(dict));
            self.fields.push(parent_id.into());
            self
        }

        pub(crate) fn page_text(mut self, text: &str) -> Self {
            self.text = Some(text.to_string());
            self
        }

        pub(crate) fn build(mut self) -> Vec<u8> {
            let font_id = self.doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Courier",
            });
            let operations = match &self.text {
                Some(text) => vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![100.into(), 600.into()]),
                    Operation::new("Tj", vec![Object::string_literal(text.as_str())]),
                    Operation::new("ET", vec![]),
                ],
                None => Vec::new(),
            };
            let content = Content { operations };
            let content_id = self.doc.add_object(Stream::new(
                dictionary! {},
                content.encode().unwrap_or_default(),
            ));

            let page = dictionary! {
                "Type" => "Page",
                "Parent" => self.pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
                "Contents" => content_id,
                "Annots" => self.annots.clone(),
            };
            self.doc
                .objects
                .insert(self.page_id, Object::Dictionary(page));

            let pages = dictionary! {
                "Type" => "Pages",
                "Kids" => vec![self.page_id.into()],
                "Count" => 1,
            };
            self.doc
                .objects
                .insert(self.pages_id, Object::Dictionary(pages));

            let acroform_id = self.doc.add_object(dictionary! {
                "Fields" => self.fields.clone(),
            });
            let catalog_id = self.doc.add_object(dictionary! {
                "Type" => "Catalog",
                "Pages" => self.pages_id,
                "AcroForm" => acroform_id,
            });
            self.doc.trailer.set("Root", catalog_id);

            let mut buffer = Vec::new();
            self.doc.save_to(&mut buffer).unwrap();
            buffer
        }
    }

    fn sample_form() -> Vec<u8> {
        FormBuilder::new()
            .text("Name", None)
            .text("Email", Some("ada@example.com"))
            .checkbox("Subscribe", false)
            .radio("Size", &["Small", "Large"])
            .dropdown("Country", &["US", "CA"])
            .build()
    }

    fn info<'a>(fields: &'a [FormFieldInfo], name: &str) -> &'a FormFieldInfo {
        fields.iter().find(|f| f.name == name).unwrap()
    }

    #[test]
    fn test_discovers_fields_and_kinds() {
        let doc = FormDocument::load(&sample_form(), None).unwrap();
        let fields = doc.fields();
        let kinds: Vec<(String, FieldKind)> =
            fields.iter().map(|f| (f.name.clone(), f.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("Name".to_string(), FieldKind::Text),
                ("Email".to_string(), FieldKind::Text),
                ("Subscribe".to_string(), FieldKind::Checkbox),
                ("Size".to_string(), FieldKind::Radio),
                ("Country".to_string(), FieldKind::Dropdown),
            ]
        );
        assert_eq!(info(&fields, "Size").options, vec!["Small", "Large"]);
        assert_eq!(info(&fields, "Country").options, vec!["US", "CA"]);
        assert!(matches!(
            doc.field("Country").unwrap(),
            FormField::Dropdown {
                editable: false,
                ..
            }
        ));
        assert!(matches!(doc.field("Missing"), Err(Error::FieldNotFound { .. })));
        assert_eq!(
            info(&fields, "Email").current_value,
            CurrentValue::Text("ada@example.com".to_string())
        );
        assert_eq!(
            info(&fields, "Subscribe").current_value,
            CurrentValue::Checked(false)
        );
    }

    #[test]
    fn test_nested_names_are_qualified() {
        let data = FormBuilder::new().nested_text("applicant", "name").build();
        let doc = FormDocument::load(&data, None).unwrap();
        let fields = doc.fields();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "applicant.name");
        assert_eq!(fields[0].kind, FieldKind::Text);
    }

    fn widget_state(doc: &FormDocument, name: &str) -> Vec<String> {
        let node = doc.node(name).unwrap();
        node.widgets
            .iter()
            .map(|w| {
                let state = doc.dict(*w).unwrap().get(b"AS").unwrap().as_name().unwrap();
                String::from_utf8_lossy(state).into_owned()
            })
            .collect()
    }

    fn needs_appearances(data: &[u8]) -> bool {
        let doc = Document::load_mem(data).unwrap();
        acroform(&doc)
            .and_then(|form| form.get(b"NeedAppearances").ok())
            .and_then(|flag| flag.as_bool().ok())
            .unwrap_or(false)
    }

    #[test]
    fn test_checkbox_group_checks_only_matching_widgets() {
        let data = FormBuilder::new().checkbox_group("Agree", &["1", "2"]).build();
        let mut doc = FormDocument::load(&data, None).unwrap();
        assert_eq!(
            doc.field("Agree").unwrap(),
            FormField::Checkbox {
                on_state: "1".to_string()
            }
        );

        doc.apply_value("Agree", &"yes".into()).unwrap();
        assert_eq!(widget_state(&doc, "Agree"), vec!["1", "Off"]);

        doc.apply_value("Agree", &false.into()).unwrap();
        assert_eq!(widget_state(&doc, "Agree"), vec!["Off", "Off"]);
    }

    #[test]
    fn test_unsupported_value_fails_only_its_field() {
        let values: FieldValueMap =
            serde_json::from_value(serde_json::json!({"Name": "Ada", "Email": null}))
                .unwrap();
        assert_eq!(values["Email"], FieldValue::Other(serde_json::Value::Null));

        let mut doc = FormDocument::load(&sample_form(), None).unwrap();
        let report = doc.fill(&values);
        assert_eq!(report.filled, vec!["Name"]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].name, "Email");
        assert_eq!(report.errors[0].message, "Field 'Email': unsupported value null");
    }

    #[test]
    fn test_unknown_kind_leaves_document_unmodified() {
        let data = FormBuilder::new().signature("Signature").build();
        let mut doc = FormDocument::load(&data, None).unwrap();
        assert_eq!(doc.field("Signature").unwrap(), FormField::Unknown);

        doc.apply_value("Signature", &"Ada".into()).unwrap();
        assert!(!needs_appearances(&doc.save().unwrap()));

        let mut doc = FormDocument::load(&sample_form(), None).unwrap();
        doc.apply_value("Name", &"Ada".into()).unwrap();
        assert!(needs_appearances(&doc.save().unwrap()));
    }

    #[test]
    fn test_fill_and_reload() {
        let mut doc = FormDocument::load(&sample_form(), None).unwrap();
        let mut values = FieldValueMap::new();
        values.insert("Name".into(), "Ada Lovelace".into());
        values.insert("Subscribe".into(), true.into());
        values.insert("Size".into(), "Large".into());
        values.insert("Country".into(), "CA".into());

        let report = doc.fill(&values);
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert_eq!(report.filled.len(), 4);

        let saved = doc.save().unwrap();
        let reloaded = FormDocument::load(&saved, None).unwrap();
        let fields = reloaded.fields();
        assert_eq!(
            info(&fields, "Name").current_value,
            CurrentValue::Text("Ada Lovelace".to_string())
        );
        assert_eq!(
            info(&fields, "Subscribe").current_value,
            CurrentValue::Checked(true)
        );
        assert_eq!(
            info(&fields, "Size").current_value,
            CurrentValue::Text("Large".to_string())
        );
        assert_eq!(
            info(&fields, "Country").current_value,
            CurrentValue::Text("CA".to_string())
        );
    }

    #[test]
    fn test_fill_collects_unknown_field() {
        let mut doc = FormDocument::load(&sample_form(), None).unwrap();
        let mut values = FieldValueMap::new();
        values.insert("Name".into(), "Ada".into());
        values.insert("Nickname".into(), "A".into());

        let report = doc.fill(&values);
        assert_eq!(report.filled, vec!["Name".to_string()]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].name, "Nickname");
        assert!(report.errors[0].message.contains("not found"));
    }

    #[test]
    fn test_invalid_option_rejected() {
        let mut doc = FormDocument::load(&sample_form(), None).unwrap();
        let err = doc
            .apply_value("Country", &FieldValue::from("MX"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOption { .. }));
        let err = doc.apply_value("Size", &FieldValue::from("Medium")).unwrap_err();
        assert!(matches!(err, Error::InvalidOption { .. }));
    }

    #[test]
    fn test_number_written_as_text() {
        let mut doc = FormDocument::load(&sample_form(), None).unwrap();
        let value: FieldValue = serde_json::from_str("42").unwrap();
        doc.apply_value("Name", &value).unwrap();
        let fields = doc.fields();
        assert_eq!(
            info(&fields, "Name").current_value,
            CurrentValue::Text("42".to_string())
        );
    }

    #[test]
    fn test_unicode_text_round_trip() {
        let mut doc = FormDocument::load(&sample_form(), None).unwrap();
        doc.apply_value("Name", &FieldValue::from("Zoë Ünal"))
            .unwrap();
        let saved = doc.save().unwrap();
        let fields = FormDocument::load(&saved, None).unwrap().fields();
        assert_eq!(
            info(&fields, "Name").current_value,
            CurrentValue::Text("Zoë Ünal".to_string())
        );
    }

    #[rstest]
    #[case(FieldValue::Bool(true), true)]
    #[case(FieldValue::from("true"), true)]
    #[case(FieldValue::from("yes"), true)]
    #[case(FieldValue::from("1"), true)]
    #[case(FieldValue::Bool(false), false)]
    #[case(FieldValue::from("no"), false)]
    #[case(FieldValue::from("TRUE"), false)]
    #[case(FieldValue::from("on"), false)]
    fn test_checkbox_truthiness(#[case] value: FieldValue, #[case] checked: bool) {
        let mut doc = FormDocument::load(&sample_form(), None).unwrap();
        doc.apply_value("Subscribe", &value).unwrap();
        let fields = doc.fields();
        assert_eq!(
            info(&fields, "Subscribe").current_value,
            CurrentValue::Checked(checked)
        );
    }

    #[test]
    fn test_validation_report() {
        let data = FormBuilder::new()
            .text("Name", Some("Ada"))
            .text("Signature_Required", None)
            .text("Notes", Some("   "))
            .required_text("Employer")
            .checkbox("Agree", false)
            .build();
        let doc = FormDocument::load(&data, None).unwrap();
        let report = ValidationReport::from_fields(&doc.fields());
        assert_eq!(report.total, 5);
        assert_eq!(report.filled, 2);
        assert_eq!(report.empty(), 3);
        assert_eq!(
            report.required_empty,
            vec!["Signature_Required".to_string(), "Employer".to_string()]
        );
    }

    #[test]
    fn test_looks_required() {
        assert!(looks_required("Signature_REQUIRED"));
        assert!(looks_required("Name*"));
        assert!(looks_required("MustSign"));
        assert!(!looks_required("Name"));
    }

    #[test]
    fn test_extract_text() {
        let data = FormBuilder::new().page_text("Hello World").build();
        let doc = FormDocument::load(&data, None).unwrap();
        assert_eq!(doc.page_count(), 1);
        assert!(doc.extract_text().unwrap().contains("Hello World"));
    }

    #[test]
    fn test_load_garbage_fails() {
        let result = FormDocument::load(b"%PDF-1.4\nnot really a pdf", None);
        assert!(matches!(result, Err(Error::LoadFailure { .. })));
    }

    #[test]
    fn test_decode_pdf_string_encodings() {
        assert_eq!(decode_pdf_string(&[0xFE, 0xFF, 0x00, 0x41, 0x00, 0xE9]), "Aé");
        assert_eq!(decode_pdf_string("café".as_bytes()), "café");
        assert_eq!(decode_pdf_string(&[0x63, 0x61, 0x66, 0xE9]), "café");
    }
}
