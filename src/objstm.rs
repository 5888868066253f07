//! Object-stream (`/Type /ObjStm`) codec.
//!
//! An object stream packs multiple small objects into one compressed
//! payload. The decoded payload starts with `/First` bytes of
//! whitespace-separated `obj_num offset` pairs; the body of the i-th
//! packed object runs from `first + offset_i` to the start of the next
//! body (or end of payload).
//!
//! ```text
//! N 0 obj
//! << /Type /ObjStm /N 3 /First 14 /Filter /FlateDecode /Length .. >>
//! stream
//! 10 0 11 15 12 28 <body 10><body 11><body 12>
//! endstream
//! endobj
//! ```

use crate::decoders::flate;
use crate::error::{Error, Result};
use crate::object::{read_uint, skip_whitespace, ObjRef};
use crate::patch::Patch;
use crate::scan::find_bytes;
use bytes::Bytes;

/// Decode a decompressed object-stream payload into its packed objects.
///
/// `raw` is the full decoded payload, `n` the `/N` count, `first` the
/// `/First` offset. Entries come back in header order. `n == 0` yields an
/// empty list.
pub fn parse(raw: &Bytes, n: usize, first: usize) -> Result<Vec<(ObjRef, Bytes)>> {
    if n == 0 {
        return Ok(Vec::new());
    }
    if first > raw.len() {
        return Err(Error::CorruptStream(format!(
            "object stream /First {} exceeds payload length {}",
            first,
            raw.len()
        )));
    }

    // header: 2N whitespace-separated integers
    let header = &raw[..first];
    let mut pairs = Vec::with_capacity(n);
    let mut pos = 0;
    for i in 0..n {
        pos = skip_whitespace(header, pos);
        let Some((num, next)) = read_uint(header, pos) else {
            return Err(Error::CorruptStream(format!(
                "object stream header truncated at pair {}",
                i
            )));
        };
        pos = skip_whitespace(header, next);
        let Some((offset, next)) = read_uint(header, pos) else {
            return Err(Error::CorruptStream(format!(
                "object stream header missing offset for object {}",
                num
            )));
        };
        pos = next;
        pairs.push((num as i64, offset as usize));
    }

    let mut entries = Vec::with_capacity(n);
    for (i, &(num, offset)) in pairs.iter().enumerate() {
        let start = first + offset;
        if start > raw.len() {
            log::warn!(
                "packed object {} offset {} is beyond payload length {}",
                num,
                offset,
                raw.len()
            );
            continue;
        }
        let end = match pairs.get(i + 1) {
            Some(&(_, next_offset)) => (first + next_offset).min(raw.len()),
            None => raw.len(),
        };
        entries.push((ObjRef::new(num, 0), raw.slice(start..end)));
    }

    Ok(entries)
}

/// An encoded object-stream container ready for the incremental writer.
pub struct Encoded {
    /// Dictionary fragment without the wrapping `<< >>`
    pub dict_fragment: String,
    /// Deflated header + bodies payload
    pub payload: Vec<u8>,
    /// Number of packed objects, in header order
    pub count: usize,
}

/// Encode a patch batch into an object-stream container.
///
/// Returns `None` when the batch cannot be packed: any body carrying a
/// `stream` keyword, declaring itself a container (`/Type /ObjStm` or
/// `/Type /XRef`), or belonging to a nonzero generation routes the whole
/// batch to the direct-object fallback. Packed objects always live at
/// generation zero, and a packed `stream` keyword would corrupt the
/// container on the way back out.
pub fn encode(patches: &[Patch]) -> Result<Option<Encoded>> {
    if patches.is_empty() || patches.iter().any(|p| !packable(p)) {
        return Ok(None);
    }

    let mut header = Vec::new();
    let mut bodies = Vec::new();
    for patch in patches {
        if !header.is_empty() {
            header.push(b' ');
        }
        header.extend_from_slice(format!("{} {}", patch.target.num, bodies.len()).as_bytes());
        bodies.extend_from_slice(&patch.body);
    }
    header.push(b' ');

    let first = header.len();
    let mut payload = header;
    payload.extend_from_slice(&bodies);
    let deflated = flate::deflate(&payload)?;

    let dict_fragment = format!(
        "/Type /ObjStm /N {} /First {} /Filter /FlateDecode /Length {}",
        patches.len(),
        first,
        deflated.len()
    );

    Ok(Some(Encoded {
        dict_fragment,
        payload: deflated,
        count: patches.len(),
    }))
}

fn packable(patch: &Patch) -> bool {
    if patch.target.gen != 0 {
        return false;
    }
    let body = &patch.body;
    if find_bytes(body, b"stream", 0).is_some() {
        return false;
    }
    match crate::scan::value_token_after(body, "Type") {
        Some(b"/ObjStm") | Some(b"/XRef") => false,
        _ => true,
    }
}
