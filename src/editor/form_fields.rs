//! AcroForm field operations over the byte-level editor.
//!
//! Fields are located through the catalog's `/AcroForm` dictionary and its
//! `/Fields` array, falling back to a whole-document scan when that walk
//! finds nothing. Every edit is a dictionary splice enqueued on the patch
//! queue; no appearance streams are generated. `/NeedAppearances true` is
//! set on the AcroForm instead so viewers regenerate them.

use crate::editor::DocumentEditor;
use crate::error::Result;
use crate::object::{parse_obj_header, parse_ref_array, ObjRef};
use crate::scan;
use bytes::Bytes;
use regex::Regex;
use std::collections::HashSet;

/// Field type per `/FT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// `/Tx` text field
    Text,
    /// `/Btn` checkbox or pushbutton
    Button,
    /// `/Btn` with the radio flag set
    Radio,
    /// `/Ch` combo or list box
    Choice,
    /// `/Sig` signature field
    Signature,
}

/// Radio-button flag within `/Ff` (ISO 32000-1 table 226).
const FF_RADIO: i64 = 1 << 15;
/// Combo-box flag within `/Ff` (table 230).
const FF_COMBO: i64 = 1 << 17;

impl FieldKind {
    /// Classify a field body. An absent `/FT` is treated as a text field;
    /// that is a heuristic carried over from how most producers emit
    /// partial field dictionaries, not something the format guarantees.
    fn from_body(body: &[u8]) -> Self {
        match scan::value_token_after(body, "FT") {
            Some(b"/Tx") | None => FieldKind::Text,
            Some(b"/Btn") => {
                let flags = scan::int_value_after(body, "Ff").unwrap_or(0);
                if flags & FF_RADIO != 0 {
                    FieldKind::Radio
                } else {
                    FieldKind::Button
                }
            },
            Some(b"/Ch") => FieldKind::Choice,
            Some(b"/Sig") => FieldKind::Signature,
            Some(_) => FieldKind::Text,
        }
    }
}

/// A value to write into a field's `/V`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Text string (text and choice fields)
    Text(String),
    /// Name value (radio export states)
    Name(String),
    /// Checkbox state: `/Yes` or `/Off`
    Toggle(bool),
}

impl FieldValue {
    /// Encode as the byte token written after `/V`.
    pub fn to_token(&self) -> Vec<u8> {
        match self {
            FieldValue::Text(s) => scan::encode_pdf_string(s),
            FieldValue::Name(n) => {
                let mut out = Vec::with_capacity(n.len() + 1);
                out.push(b'/');
                out.extend_from_slice(n.as_bytes());
                out
            },
            FieldValue::Toggle(true) => b"/Yes".to_vec(),
            FieldValue::Toggle(false) => b"/Off".to_vec(),
        }
    }
}

/// One discovered form field.
#[derive(Debug, Clone)]
pub struct FormField {
    /// The field object, or [`ObjRef::DETACHED`] for scan-discovered
    /// fields without a resolvable header
    pub target: ObjRef,
    /// Fully qualified name (`parent.child` for hierarchical fields)
    pub name: String,
    /// Field type
    pub kind: FieldKind,
    /// Decoded `/V`, when present
    pub value: Option<String>,
    /// `/Ff` flags
    pub flags: i64,
}

/// Description of a field to add.
///
/// ```no_run
/// use formpatch::{DocumentEditor, NewField};
///
/// # fn main() -> formpatch::Result<()> {
/// let mut editor = DocumentEditor::open_file("form.pdf")?;
/// let added = editor.add_field(0, NewField::text("email", [100.0, 700.0, 300.0, 720.0]))?;
/// assert!(added.is_some());
/// editor.save_incremental("out.pdf")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct NewField {
    name: String,
    kind: NewFieldKind,
    value: Option<FieldValue>,
    flags: i64,
    tooltip: Option<String>,
}

#[derive(Debug, Clone)]
enum NewFieldKind {
    Text { rect: [f64; 4] },
    Checkbox { rect: [f64; 4], on_state: String },
    Radio { options: Vec<(String, [f64; 4])> },
    Choice { rect: [f64; 4], options: Vec<String>, combo: bool },
    Signature { rect: [f64; 4] },
}

impl NewField {
    /// A text field.
    pub fn text(name: impl Into<String>, rect: [f64; 4]) -> Self {
        Self::with_kind(name, NewFieldKind::Text { rect })
    }

    /// A checkbox toggling between `/Yes` and `/Off`.
    pub fn checkbox(name: impl Into<String>, rect: [f64; 4]) -> Self {
        Self::with_kind(name, NewFieldKind::Checkbox { rect, on_state: "Yes".to_string() })
    }

    /// A radio group with one widget per `(export value, rect)` option.
    pub fn radio(name: impl Into<String>, options: Vec<(String, [f64; 4])>) -> Self {
        Self::with_kind(name, NewFieldKind::Radio { options })
    }

    /// A choice field; `combo` selects a drop-down over a list box.
    pub fn choice(
        name: impl Into<String>,
        rect: [f64; 4],
        options: Vec<String>,
        combo: bool,
    ) -> Self {
        Self::with_kind(name, NewFieldKind::Choice { rect, options, combo })
    }

    /// An empty signature field.
    pub fn signature(name: impl Into<String>, rect: [f64; 4]) -> Self {
        Self::with_kind(name, NewFieldKind::Signature { rect })
    }

    fn with_kind(name: impl Into<String>, kind: NewFieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            value: None,
            flags: 0,
            tooltip: None,
        }
    }

    /// Initial value.
    pub fn with_value(mut self, value: FieldValue) -> Self {
        self.value = Some(value);
        self
    }

    /// `/Ff` flags, or-ed with any flags the kind implies.
    pub fn with_flags(mut self, flags: i64) -> Self {
        self.flags = flags;
        self
    }

    /// `/TU` tooltip.
    pub fn with_tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = Some(tooltip.into());
        self
    }
}

/// Where the `/AcroForm` dictionary lives: its own object, or inline in
/// the catalog.
struct AcroformSite {
    host: ObjRef,
    body: Bytes,
    indirect: bool,
}

impl DocumentEditor {
    /// Enumerate all form fields.
    ///
    /// Walks the AcroForm `/Fields` array, recursing through `/Kids` and
    /// building dotted qualified names. When the walk yields nothing, the
    /// whole document is scanned for field-shaped dictionaries instead;
    /// fields found that way without a locatable object header come back
    /// with [`ObjRef::DETACHED`].
    pub fn list_fields(&mut self) -> Result<Vec<FormField>> {
        let mut out = Vec::new();
        if let Some(site) = self.acroform_site()? {
            for root in self.fields_array(&site) {
                let mut visited = HashSet::new();
                self.walk_field(root, "", &mut visited, &mut out);
            }
        }
        if out.is_empty() {
            out = self.scan_fields();
        }
        Ok(out)
    }

    /// Decoded `/V` of the named field.
    pub fn field_value(&mut self, name: &str) -> Result<Option<String>> {
        Ok(self.find_field(name)?.and_then(|f| f.value))
    }

    /// Write a field's `/V` (and keep a toggle widget's `/AS` in sync).
    ///
    /// Returns `false` without touching the document when the field does
    /// not exist, is detached, or the splice would corrupt its
    /// dictionary. Patching also marks the AcroForm with
    /// `/NeedAppearances true` and strips `/XFA`, so XFA form data, where
    /// present, is dropped.
    pub fn set_field_value(&mut self, name: &str, value: &FieldValue) -> Result<bool> {
        let Some(field) = self.find_field(name)? else {
            return Ok(false);
        };
        if field.target.is_detached() {
            return Ok(false);
        }
        let Some(body) = self.read(field.target) else {
            return Ok(false);
        };

        let token = value.to_token();
        let mut new_body = scan::replace_key_value(&body, "V", &token);
        if scan::value_token_after(&new_body, "V") != Some(&token[..]) {
            return Ok(false);
        }
        if matches!(value, FieldValue::Toggle(_) | FieldValue::Name(_))
            && scan::value_token_after(&new_body, "AS").is_some()
        {
            new_body = scan::replace_key_value(&new_body, "AS", &token);
        }
        if new_body[..] != body[..] {
            self.enqueue(field.target, new_body);
        }
        self.patch_acroform()?;
        Ok(true)
    }

    /// Replace a field's partial name (`/T`). Returns `false` when the
    /// field cannot be found or patched.
    pub fn rename_field(&mut self, old: &str, new: &str) -> Result<bool> {
        let Some(field) = self.find_field(old)? else {
            return Ok(false);
        };
        if field.target.is_detached() {
            return Ok(false);
        }
        let Some(body) = self.read(field.target) else {
            return Ok(false);
        };

        let token = scan::encode_pdf_string(new);
        let new_body = scan::replace_key_value(&body, "T", &token);
        if scan::value_token_after(&new_body, "T") != Some(&token[..]) {
            return Ok(false);
        }
        self.enqueue(field.target, new_body);
        Ok(true)
    }

    /// Add a field to the page at `page_index`.
    ///
    /// Allocates fresh object numbers, links the field into the AcroForm
    /// `/Fields` array (creating a minimal AcroForm when the catalog has
    /// none) and into the page's `/Annots`. Returns `None` when the page
    /// index is out of range.
    pub fn add_field(&mut self, page_index: usize, field: NewField) -> Result<Option<ObjRef>> {
        let pages = self.pages()?;
        let Some(&page) = pages.get(page_index) else {
            log::warn!("page index {} out of range ({} pages)", page_index, pages.len());
            return Ok(None);
        };

        let field_ref = ObjRef::new(self.allocate_object_num(), 0);
        let name_token = scan::encode_pdf_string(&field.name);
        let mut widgets = Vec::new();

        let body = match &field.kind {
            NewFieldKind::Radio { options } => {
                let kid_refs: Vec<ObjRef> = options
                    .iter()
                    .map(|_| ObjRef::new(self.allocate_object_num(), 0))
                    .collect();
                for (kid, (_, rect)) in kid_refs.iter().zip(options) {
                    let kid_body = format!(
                        "<< /Type /Annot /Subtype /Widget /Rect {} /Parent {} /F 4 /P {} /AS /Off >>",
                        rect_token(rect),
                        field_ref,
                        page
                    );
                    self.enqueue(*kid, kid_body.into_bytes());
                    widgets.push(*kid);
                }
                let mut body = format!(
                    "<< /FT /Btn /T {} /Ff {} /V ",
                    String::from_utf8_lossy(&name_token),
                    field.flags | FF_RADIO
                );
                match &field.value {
                    Some(FieldValue::Name(n)) => body.push_str(&format!("/{}", n)),
                    _ => body.push_str("/Off"),
                }
                body.push_str(" /Opt [");
                for (i, (export, _)) in options.iter().enumerate() {
                    if i > 0 {
                        body.push(' ');
                    }
                    body.push_str(&String::from_utf8_lossy(&scan::encode_pdf_string(export)));
                }
                body.push_str("] /Kids [");
                for (i, kid) in kid_refs.iter().enumerate() {
                    if i > 0 {
                        body.push(' ');
                    }
                    body.push_str(&kid.to_string());
                }
                body.push_str("] >>");
                body
            },
            kind => {
                widgets.push(field_ref);
                merged_widget_body(kind, &field, &name_token, page)
            },
        };

        let body = match &field.tooltip {
            Some(tip) => {
                scan::upsert_key_value(body.as_bytes(), "TU", &scan::encode_pdf_string(tip))
            },
            None => body.into_bytes(),
        };
        self.enqueue(field_ref, body);

        for widget in widgets {
            self.add_annot(page, widget)?;
        }
        self.link_into_acroform(field_ref)?;
        self.patch_acroform()?;
        Ok(Some(field_ref))
    }

    /// Remove a field incrementally.
    ///
    /// The field's subtree is detached from page `/Annots`, its parent's
    /// `/Kids`, and the AcroForm `/Fields`; the bodies themselves are
    /// emptied to `null`. Original bytes are never touched; removal is
    /// expressed purely through the referring arrays.
    pub fn remove_field(&mut self, name: &str) -> Result<bool> {
        let Some(field) = self.find_field(name)? else {
            return Ok(false);
        };
        if field.target.is_detached() {
            return Ok(false);
        }
        let Some(body) = self.read(field.target) else {
            return Ok(false);
        };

        let mut subtree = Vec::new();
        let mut visited = HashSet::new();
        self.collect_subtree(field.target, &mut visited, &mut subtree);
        let drop: HashSet<i64> = subtree.iter().map(|r| r.num).collect();

        for page in self.pages()? {
            self.remove_annots(page, &drop)?;
        }

        if let Some(parent) = scan::ref_value_after(&body, "Parent") {
            if let Some(parent_body) = self.read(parent) {
                if let Some(kids) = scan::value_token_after(&parent_body, "Kids") {
                    if kids.starts_with(b"[") {
                        let rebuilt = scan::remove_ref_from_array(kids, field.target);
                        let new_parent = scan::replace_key_value(&parent_body, "Kids", &rebuilt);
                        if new_parent[..] != parent_body[..] {
                            self.enqueue(parent, new_parent);
                        }
                    }
                }
            }
        }

        self.remove_from_fields_array(&drop)?;

        for r in subtree {
            self.enqueue(r, b"null".to_vec());
        }
        self.patch_acroform()?;
        Ok(true)
    }

    /// Remove every field whose qualified name matches `pattern`, then
    /// rewrite the document from scratch.
    ///
    /// Dropped fields disappear entirely: their objects are omitted, the
    /// AcroForm `/Fields` array is filtered, and page `/Annots` lose both
    /// the dropped widgets and any orphaned widget whose `/Parent` no
    /// longer resolves to a retained field. Returns the number of fields
    /// removed.
    pub fn clear_fields(&mut self, pattern: &Regex) -> Result<usize> {
        let fields = self.list_fields()?;
        let matched: Vec<FormField> = fields
            .into_iter()
            .filter(|f| pattern.is_match(&f.name) && !f.target.is_detached())
            .collect();

        let mut drop: HashSet<i64> = HashSet::new();
        let mut visited = HashSet::new();
        for field in &matched {
            let mut subtree = Vec::new();
            self.collect_subtree(field.target, &mut visited, &mut subtree);
            drop.extend(subtree.iter().map(|r| r.num));
        }

        // widgets orphaned by a dropped parent field
        for (r, body) in self.objects() {
            if !drop.contains(&r.num) && scan::is_widget(&body) {
                if let Some(parent) = scan::ref_value_after(&body, "Parent") {
                    if drop.contains(&parent.num) {
                        drop.insert(r.num);
                    }
                }
            }
        }

        for page in self.pages()? {
            self.remove_annots(page, &drop)?;
        }
        self.remove_from_fields_array(&drop)?;
        self.write_full_excluding(&drop)?;
        Ok(matched.len())
    }

    /// Page references in document order, walked from the catalog's
    /// `/Pages` tree.
    pub fn pages(&mut self) -> Result<Vec<ObjRef>> {
        let root = self.root_ref()?;
        let Some(root_body) = self.read(root) else {
            return Ok(Vec::new());
        };
        let Some(pages_ref) = scan::ref_value_after(&root_body, "Pages") else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        self.collect_pages(pages_ref, &mut visited, &mut out, 0);
        Ok(out)
    }

    // === internals ===

    fn find_field(&mut self, name: &str) -> Result<Option<FormField>> {
        Ok(self.list_fields()?.into_iter().find(|f| f.name == name))
    }

    fn acroform_site(&mut self) -> Result<Option<AcroformSite>> {
        let root = self.root_ref()?;
        let Some(root_body) = self.read(root) else {
            return Ok(None);
        };
        if let Some(r) = scan::ref_value_after(&root_body, "AcroForm") {
            let Some(body) = self.read(r) else {
                return Ok(None);
            };
            return Ok(Some(AcroformSite { host: r, body, indirect: true }));
        }
        if scan::value_token_after(&root_body, "AcroForm") == Some(b"<<") {
            return Ok(Some(AcroformSite { host: root, body: root_body, indirect: false }));
        }
        Ok(None)
    }

    /// Top-level field refs from a site's `/Fields` array (inline or
    /// indirect).
    fn fields_array(&mut self, site: &AcroformSite) -> Vec<ObjRef> {
        match scan::value_token_after(&site.body, "Fields") {
            Some(token) if token.starts_with(b"[") => parse_ref_array(token),
            Some(_) => match scan::ref_value_after(&site.body, "Fields") {
                Some(array_ref) => self
                    .read(array_ref)
                    .map(|body| parse_ref_array(&body))
                    .unwrap_or_default(),
                None => Vec::new(),
            },
            None => Vec::new(),
        }
    }

    fn walk_field(
        &mut self,
        r: ObjRef,
        prefix: &str,
        visited: &mut HashSet<i64>,
        out: &mut Vec<FormField>,
    ) {
        if r.is_detached() || !visited.insert(r.num) {
            return;
        }
        let Some(body) = self.read(r) else {
            log::warn!("field {} is unreadable, skipping", r);
            return;
        };

        let part = scan::value_token_after(&body, "T").map(scan::decode_pdf_string);
        let name = match &part {
            Some(part) if prefix.is_empty() => part.clone(),
            Some(part) => format!("{}.{}", prefix, part),
            None => prefix.to_string(),
        };

        // kids carrying their own /T are child fields; bare kids are
        // widget instances of this field
        let kid_refs = scan::value_token_after(&body, "Kids")
            .filter(|t| t.starts_with(b"["))
            .map(|t| parse_ref_array(t))
            .unwrap_or_default();
        let named_kids: Vec<ObjRef> = kid_refs
            .iter()
            .copied()
            .filter(|kid| {
                self.read(*kid)
                    .map(|kb| scan::value_token_after(&kb, "T").is_some())
                    .unwrap_or(false)
            })
            .collect();

        if !named_kids.is_empty() {
            for kid in named_kids {
                self.walk_field(kid, &name, visited, out);
            }
            return;
        }

        out.push(FormField {
            target: r,
            name,
            kind: FieldKind::from_body(&body),
            value: read_value(&body),
            flags: scan::int_value_after(&body, "Ff").unwrap_or(0),
        });
    }

    /// Whole-document fallback: strip stream bodies, then collect every
    /// dictionary that looks like a field (a `/T` plus either `/FT` or a
    /// widget subtype).
    fn scan_fields(&mut self) -> Vec<FormField> {
        let stripped = scan::strip_stream_bodies(self.bytes());
        let mut out: Vec<FormField> = Vec::new();
        let mut seen = HashSet::new();
        for (pos, dict) in scan::dictionaries(&stripped) {
            if scan::value_token_after(dict, "T").is_none() {
                continue;
            }
            if scan::value_token_after(dict, "FT").is_none() && !scan::is_widget(dict) {
                continue;
            }
            let name = scan::value_token_after(dict, "T")
                .map(scan::decode_pdf_string)
                .unwrap_or_default();
            if !seen.insert(name.clone()) {
                continue;
            }
            out.push(FormField {
                target: header_before(&stripped, pos).unwrap_or(ObjRef::DETACHED),
                name,
                kind: FieldKind::from_body(dict),
                value: read_value(dict),
                flags: scan::int_value_after(dict, "Ff").unwrap_or(0),
            });
        }
        out
    }

    fn collect_pages(
        &mut self,
        node: ObjRef,
        visited: &mut HashSet<i64>,
        out: &mut Vec<ObjRef>,
        depth: usize,
    ) {
        if depth > 64 || !visited.insert(node.num) {
            return;
        }
        let Some(body) = self.read(node) else {
            return;
        };
        match scan::value_token_after(&body, "Type") {
            Some(b"/Page") => out.push(node),
            _ => match scan::value_token_after(&body, "Kids") {
                Some(kids) if kids.starts_with(b"[") => {
                    for kid in parse_ref_array(kids) {
                        self.collect_pages(kid, visited, out, depth + 1);
                    }
                },
                _ => out.push(node),
            },
        }
    }

    /// The field plus every object reachable through `/Kids`.
    fn collect_subtree(&mut self, r: ObjRef, visited: &mut HashSet<i64>, out: &mut Vec<ObjRef>) {
        if r.is_detached() || !visited.insert(r.num) {
            return;
        }
        out.push(r);
        let Some(body) = self.read(r) else {
            return;
        };
        if let Some(kids) = scan::value_token_after(&body, "Kids") {
            if kids.starts_with(b"[") {
                for kid in parse_ref_array(kids) {
                    self.collect_subtree(kid, visited, out);
                }
            }
        }
    }

    /// Filter widgets out of a page's `/Annots` (inline or indirect).
    fn remove_annots(&mut self, page: ObjRef, drop: &HashSet<i64>) -> Result<()> {
        let Some(body) = self.read(page) else {
            return Ok(());
        };
        let Some(token) = scan::value_token_after(&body, "Annots") else {
            return Ok(());
        };
        if token.starts_with(b"[") {
            let kept: Vec<ObjRef> = parse_ref_array(token)
                .into_iter()
                .filter(|r| !drop.contains(&r.num))
                .collect();
            let rebuilt = build_ref_array(&kept);
            if rebuilt != token {
                let new_body = scan::replace_key_value(&body, "Annots", &rebuilt);
                self.enqueue(page, new_body);
            }
        } else if let Some(array_ref) = scan::ref_value_after(&body, "Annots") {
            let Some(array_body) = self.read(array_ref) else {
                return Ok(());
            };
            let kept: Vec<ObjRef> = parse_ref_array(&array_body)
                .into_iter()
                .filter(|r| !drop.contains(&r.num))
                .collect();
            let rebuilt = build_ref_array(&kept);
            if rebuilt[..] != array_body[..] {
                self.enqueue(array_ref, rebuilt);
            }
        }
        Ok(())
    }

    /// Append a widget reference to a page's `/Annots`, creating the
    /// array when absent.
    fn add_annot(&mut self, page: ObjRef, widget: ObjRef) -> Result<()> {
        let Some(body) = self.read(page) else {
            return Ok(());
        };
        match scan::value_token_after(&body, "Annots") {
            None => {
                let array = build_ref_array(&[widget]);
                let new_body = scan::upsert_key_value(&body, "Annots", &array);
                self.enqueue(page, new_body);
            },
            Some(token) if token.starts_with(b"[") => {
                let rebuilt = scan::add_ref_to_array(token, widget);
                let new_body = scan::replace_key_value(&body, "Annots", &rebuilt);
                self.enqueue(page, new_body);
            },
            Some(_) => {
                if let Some(array_ref) = scan::ref_value_after(&body, "Annots") {
                    let array_body = self.read(array_ref).unwrap_or_else(|| Bytes::from_static(b"[]"));
                    let trimmed = trim_ws(&array_body);
                    self.enqueue(array_ref, scan::add_ref_to_array(trimmed, widget));
                }
            },
        }
        Ok(())
    }

    /// Filter dropped refs out of the AcroForm `/Fields` array.
    fn remove_from_fields_array(&mut self, drop: &HashSet<i64>) -> Result<()> {
        let Some(site) = self.acroform_site()? else {
            return Ok(());
        };
        match scan::value_token_after(&site.body, "Fields") {
            Some(token) if token.starts_with(b"[") => {
                let kept: Vec<ObjRef> = parse_ref_array(token)
                    .into_iter()
                    .filter(|r| !drop.contains(&r.num))
                    .collect();
                let rebuilt = build_ref_array(&kept);
                if rebuilt != token {
                    let new_body = scan::replace_key_value(&site.body, "Fields", &rebuilt);
                    self.enqueue(site.host, new_body);
                }
            },
            Some(_) => {
                if let Some(array_ref) = scan::ref_value_after(&site.body, "Fields") {
                    if let Some(array_body) = self.read(array_ref) {
                        let kept: Vec<ObjRef> = parse_ref_array(&array_body)
                            .into_iter()
                            .filter(|r| !drop.contains(&r.num))
                            .collect();
                        self.enqueue(array_ref, build_ref_array(&kept));
                    }
                }
            },
            None => {},
        }
        Ok(())
    }

    /// Append a new field to `/Fields`, creating the AcroForm when the
    /// catalog lacks one.
    fn link_into_acroform(&mut self, field_ref: ObjRef) -> Result<()> {
        match self.acroform_site()? {
            Some(site) => match scan::value_token_after(&site.body, "Fields") {
                Some(token) if token.starts_with(b"[") => {
                    let rebuilt = scan::add_ref_to_array(token, field_ref);
                    let new_body = scan::replace_key_value(&site.body, "Fields", &rebuilt);
                    self.enqueue(site.host, new_body);
                },
                Some(_) => {
                    if let Some(array_ref) = scan::ref_value_after(&site.body, "Fields") {
                        let array_body =
                            self.read(array_ref).unwrap_or_else(|| Bytes::from_static(b"[]"));
                        let trimmed = trim_ws(&array_body);
                        self.enqueue(array_ref, scan::add_ref_to_array(trimmed, field_ref));
                    }
                },
                None if site.indirect => {
                    let array = build_ref_array(&[field_ref]);
                    let new_body = scan::upsert_key_value(&site.body, "Fields", &array);
                    self.enqueue(site.host, new_body);
                },
                None => {
                    log::warn!("inline AcroForm without /Fields, cannot link new field");
                },
            },
            None => {
                let af_ref = ObjRef::new(self.allocate_object_num(), 0);
                let af_body = format!(
                    "<< /Fields {} /NeedAppearances true >>",
                    String::from_utf8_lossy(&build_ref_array(&[field_ref]))
                );
                self.enqueue(af_ref, af_body.into_bytes());

                let root = self.root_ref()?;
                if let Some(root_body) = self.read(root) {
                    let new_root =
                        scan::upsert_key_value(&root_body, "AcroForm", &af_ref.to_token());
                    self.enqueue(root, new_root);
                }
            },
        }
        Ok(())
    }

    /// Mark the AcroForm dirty for viewers: `/NeedAppearances true`, and
    /// strip `/XFA` so the byte-level edits cannot disagree with an XFA
    /// overlay. XFA data, where present, is dropped by this.
    fn patch_acroform(&mut self) -> Result<()> {
        let Some(site) = self.acroform_site()? else {
            return Ok(());
        };
        if !site.indirect {
            log::debug!("inline AcroForm, leaving appearance flags untouched");
            return Ok(());
        }
        let patched = scan::upsert_key_value(&site.body, "NeedAppearances", b"true");
        let patched = scan::remove_key_value(&patched, "XFA");
        if patched[..] != site.body[..] {
            self.enqueue(site.host, patched);
        }
        Ok(())
    }
}

/// Merged field-plus-widget body for single-widget kinds.
fn merged_widget_body(
    kind: &NewFieldKind,
    field: &NewField,
    name_token: &[u8],
    page: ObjRef,
) -> String {
    let name = String::from_utf8_lossy(name_token);
    match kind {
        NewFieldKind::Text { rect } => {
            let value = match &field.value {
                Some(FieldValue::Text(s)) => {
                    String::from_utf8_lossy(&scan::encode_pdf_string(s)).into_owned()
                },
                _ => "()".to_string(),
            };
            let mut body = format!(
                "<< /Type /Annot /Subtype /Widget /FT /Tx /T {} /V {} /Rect {} /F 4 /P {}",
                name,
                value,
                rect_token(rect),
                page
            );
            if field.flags != 0 {
                body.push_str(&format!(" /Ff {}", field.flags));
            }
            body.push_str(" >>");
            body
        },
        NewFieldKind::Checkbox { rect, on_state } => {
            let state = match &field.value {
                Some(FieldValue::Toggle(true)) => format!("/{}", on_state),
                _ => "/Off".to_string(),
            };
            format!(
                "<< /Type /Annot /Subtype /Widget /FT /Btn /T {} /V {} /AS {} /Rect {} /F 4 /P {} >>",
                name,
                state,
                state,
                rect_token(rect),
                page
            )
        },
        NewFieldKind::Choice { rect, options, combo } => {
            let flags = field.flags | if *combo { FF_COMBO } else { 0 };
            let mut opt = String::from("[");
            for (i, option) in options.iter().enumerate() {
                if i > 0 {
                    opt.push(' ');
                }
                opt.push_str(&String::from_utf8_lossy(&scan::encode_pdf_string(option)));
            }
            opt.push(']');
            let value = match &field.value {
                Some(FieldValue::Text(s)) => {
                    String::from_utf8_lossy(&scan::encode_pdf_string(s)).into_owned()
                },
                _ => "()".to_string(),
            };
            format!(
                "<< /Type /Annot /Subtype /Widget /FT /Ch /T {} /Ff {} /Opt {} /V {} /Rect {} /F 4 /P {} >>",
                name,
                flags,
                opt,
                value,
                rect_token(rect),
                page
            )
        },
        NewFieldKind::Signature { rect } => format!(
            "<< /Type /Annot /Subtype /Widget /FT /Sig /T {} /Rect {} /F 4 /P {} >>",
            name,
            rect_token(rect),
            page
        ),
        NewFieldKind::Radio { .. } => unreachable!("radio groups build kid widgets"),
    }
}

/// Decoded `/V`: strings decode, names lose their slash, anything else is
/// rendered as-is.
fn read_value(body: &[u8]) -> Option<String> {
    let token = scan::value_token_after(body, "V")?;
    match token.first() {
        Some(b'(') | Some(b'<') => Some(scan::decode_pdf_string(token)),
        Some(b'/') => Some(String::from_utf8_lossy(&token[1..]).into_owned()),
        _ => Some(String::from_utf8_lossy(token).into_owned()),
    }
}

fn build_ref_array(refs: &[ObjRef]) -> Vec<u8> {
    let mut out = Vec::with_capacity(refs.len() * 8 + 2);
    out.push(b'[');
    for (i, r) in refs.iter().enumerate() {
        if i > 0 {
            out.push(b' ');
        }
        out.extend_from_slice(&r.to_token());
    }
    out.push(b']');
    out
}

fn rect_token(rect: &[f64; 4]) -> String {
    format!("[{} {} {} {}]", rect[0], rect[1], rect[2], rect[3])
}

fn trim_ws(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !crate::object::is_whitespace(*b))
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !crate::object::is_whitespace(*b))
        .map(|p| p + 1)
        .unwrap_or(start);
    &bytes[start..end]
}

/// Locate the `num gen obj` header governing the dictionary at `pos`:
/// the nearest preceding header with no `endobj` in between.
fn header_before(bytes: &[u8], pos: usize) -> Option<ObjRef> {
    let window = &bytes[..pos];
    let mut search_end = window.len();
    while let Some(kw) = scan::rfind_bytes(&window[..search_end], b"obj") {
        search_end = kw;
        // the tail of `endobj` is not a header
        if kw >= 3 && &window[kw - 3..kw] == b"end" {
            continue;
        }
        if scan::find_bytes(window, b"endobj", kw).is_some() {
            return None;
        }
        // parse `num gen` backwards from the keyword
        if let Some(header_start) = backscan_header_start(window, kw) {
            if let Some((r, _)) = parse_obj_header(bytes, header_start) {
                return Some(r);
            }
        }
        return None;
    }
    None
}

/// From an `obj` keyword, walk back across `gen`, whitespace, and `num`
/// to the start of the header.
fn backscan_header_start(bytes: &[u8], kw: usize) -> Option<usize> {
    let mut i = kw;
    // whitespace before `obj`
    while i > 0 && crate::object::is_whitespace(bytes[i - 1]) {
        i -= 1;
    }
    // generation digits
    let gen_end = i;
    while i > 0 && bytes[i - 1].is_ascii_digit() {
        i -= 1;
    }
    if i == gen_end {
        return None;
    }
    // whitespace between num and gen
    let ws_end = i;
    while i > 0 && crate::object::is_whitespace(bytes[i - 1]) {
        i -= 1;
    }
    if i == ws_end {
        return None;
    }
    // object number digits
    let num_end = i;
    while i > 0 && bytes[i - 1].is_ascii_digit() {
        i -= 1;
    }
    if i == num_end {
        return None;
    }
    Some(i)
}
