//! Serialization back to bytes: incremental updates and full rewrites.

pub mod full;
pub mod incremental;

use crate::error::{Error, Result};
use crate::object::ObjRef;
use crate::scan::find_bytes;

/// What the writers need to know about the document being extended.
#[derive(Debug, Clone)]
pub(crate) struct WriteContext {
    /// `startxref` of the document being appended to (becomes `/Prev`)
    pub prev_startxref: usize,
    /// Catalog reference, copied verbatim into the new trailer
    pub root: ObjRef,
    /// `/Info` reference, preserved when present
    pub info: Option<ObjRef>,
    /// Highest object number in the existing index
    pub max_obj: i64,
}

/// Corrupted output must never be produced: every write path checks for
/// the structural markers before returning its buffer.
pub(crate) fn validate_markers(out: &[u8]) -> Result<()> {
    let has_index =
        find_bytes(out, b"\nxref", 0).is_some() || find_bytes(out, b"/Type /XRef", 0).is_some();
    if !has_index
        || find_bytes(out, b"trailer", 0).is_none()
        || find_bytes(out, b"startxref", 0).is_none()
        || find_bytes(out, b"%%EOF", 0).is_none()
    {
        return Err(Error::MalformedXref(
            "rendered output is missing structural markers".to_string(),
        ));
    }
    Ok(())
}

/// The 20-byte classic xref record: `%010d %05d n/f`, trailing space and
/// newline included.
pub(crate) fn classic_record(offset: usize, gen: u16, in_use: bool) -> Vec<u8> {
    format!("{:010} {:05} {} \n", offset, gen, if in_use { 'n' } else { 'f' }).into_bytes()
}
