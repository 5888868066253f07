//! Document editing: the facade over resolver, scanner, and writers, plus
//! the AcroForm field layer built on top of it.

pub mod document_editor;
pub mod form_fields;

pub use document_editor::DocumentEditor;
pub use form_fields::{FieldKind, FieldValue, FormField, NewField};
