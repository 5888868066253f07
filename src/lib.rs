//! # formpatch
//!
//! Surgical AcroForm editing for PDF documents: list, fill, rename, add,
//! remove, and clear interactive form fields while leaving every other
//! byte of the document exactly where it was.
//!
//! There is no full PDF object model here. The engine resolves indirect
//! objects across classic xref tables, cross-reference streams, and
//! object streams; edits dictionary values by exact byte splices; and
//! writes either an appended incremental update (the original bytes
//! survive byte-for-byte as a prefix) or a fresh single-generation file
//! for flattening.
//!
//! ## Quick start
//!
//! ```no_run
//! use formpatch::{DocumentEditor, FieldValue};
//!
//! # fn main() -> formpatch::Result<()> {
//! let mut editor = DocumentEditor::open_file("form.pdf")?;
//!
//! for field in editor.list_fields()? {
//!     println!("{} = {:?}", field.name, field.value);
//! }
//!
//! editor.set_field_value("FirstName", &FieldValue::Text("Ada".into()))?;
//! editor.save_incremental("filled.pdf")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Scope
//!
//! Rendering, font shaping, content-stream interpretation, signature
//! validation, and JavaScript are out of scope. Encrypted documents are
//! rejected at open. Only the xref and object-stream containers are ever
//! decompressed; user streams pass through verbatim.

pub mod decoders;
pub mod editor;
pub mod error;
pub mod object;
pub mod objstm;
pub mod patch;
pub mod resolver;
pub mod scan;
pub mod writer;
pub mod xref;

pub use editor::{DocumentEditor, FieldKind, FieldValue, FormField, NewField};
pub use error::{Error, Result};
pub use object::ObjRef;
pub use patch::{Patch, PatchQueue};
pub use resolver::Resolver;
pub use xref::XrefEntry;
