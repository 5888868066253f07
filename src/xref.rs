//! Cross-reference parsing.
//!
//! The cross-reference index maps object numbers to locations, as either a
//! classic `xref` table (PDF 1.0-1.4) or a compressed cross-reference
//! stream (PDF 1.5+). This module parses one section of either kind; the
//! resolver walks the `/Prev` chain and merges sections into the effective
//! index.

use crate::decoders::{decode_predictor, flate};
use crate::error::{Error, Result};
use crate::object::{parse_obj_header, read_uint, skip_whitespace, ObjRef};
use crate::scan;

/// Where an object lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    /// `num gen obj … endobj` at a byte offset in the source
    InFile {
        /// Byte offset of the object header
        offset: usize,
        /// Generation number
        gen: u16,
    },
    /// Packed inside an object-stream container
    InObjStm {
        /// Object number of the `(container, 0)` object stream
        container: i64,
        /// Zero-based position within the container
        index: usize,
    },
    /// Free entry; ignored at lookup time
    Free,
}

/// One parsed classic xref section.
#[derive(Debug)]
pub(crate) struct ClassicSection {
    /// `(object number, entry)` pairs in table order
    pub entries: Vec<(i64, XrefEntry)>,
    /// Absolute range of the `trailer` dictionary
    pub trailer: std::ops::Range<usize>,
    /// `/Prev` offset, when chained
    pub prev: Option<usize>,
    /// `/XRefStm` offset for hybrid-reference files
    pub xref_stm: Option<usize>,
}

/// One parsed cross-reference stream section.
#[derive(Debug)]
pub(crate) struct StreamSection {
    /// `(object number, entry)` pairs in `/Index` order
    pub entries: Vec<(i64, XrefEntry)>,
    /// The xref stream object's own reference
    pub self_ref: ObjRef,
    /// Byte offset of the xref stream object header
    pub self_offset: usize,
    /// Absolute range of the stream dictionary
    pub dict: std::ops::Range<usize>,
    /// `/Prev` offset, when chained
    pub prev: Option<usize>,
}

/// Locate the active `startxref` offset.
///
/// Matches `startxref <digits>` followed by `%%EOF` near the end of the
/// file; when the EOF marker is missing, the last `startxref` in the file
/// still wins.
pub(crate) fn find_startxref(bytes: &[u8]) -> Result<usize> {
    let pos = scan::rfind_bytes(bytes, b"startxref")
        .ok_or_else(|| Error::MalformedXref("startxref not found".to_string()))?;
    let digits = skip_whitespace(bytes, pos + 9);
    let (offset, end) = read_uint(bytes, digits)
        .ok_or_else(|| Error::MalformedXref("startxref offset missing".to_string()))?;
    let after = skip_whitespace(bytes, end);
    if !bytes[after..].starts_with(b"%%EOF") {
        log::debug!("startxref at {} not followed by %%EOF, using it anyway", pos);
    }
    Ok(offset as usize)
}

/// True when the bytes at `offset` start a classic `xref` table.
pub(crate) fn is_classic_table(bytes: &[u8], offset: usize) -> bool {
    let pos = skip_whitespace(bytes, offset.min(bytes.len()));
    bytes[pos..].starts_with(b"xref")
}

/// Parse a classic cross-reference table at `offset`.
///
/// ```text
/// xref
/// 0 3
/// 0000000000 65535 f
/// 0000000017 00000 n
/// 0000000081 00000 n
/// trailer
/// << /Size 3 /Root 1 0 R >>
/// ```
pub(crate) fn parse_classic(bytes: &[u8], offset: usize) -> Result<ClassicSection> {
    let mut pos = skip_whitespace(bytes, offset);
    if !bytes[pos..].starts_with(b"xref") {
        return Err(Error::MalformedXref(format!("no xref keyword at offset {}", offset)));
    }
    pos += 4;

    let mut entries = Vec::new();
    loop {
        pos = skip_whitespace(bytes, pos);
        if bytes[pos..].starts_with(b"trailer") {
            pos += 7;
            break;
        }
        // subsection header: first count
        let (first, next) = read_uint(bytes, pos).ok_or_else(|| {
            Error::MalformedXref(format!("expected subsection header at offset {}", pos))
        })?;
        pos = skip_whitespace(bytes, next);
        let (count, next) = read_uint(bytes, pos).ok_or_else(|| {
            Error::MalformedXref(format!("subsection at {} missing count", first))
        })?;
        pos = next;
        if count > 1_000_000 {
            return Err(Error::MalformedXref(format!(
                "subsection count {} exceeds limit",
                count
            )));
        }

        for i in 0..count {
            pos = skip_whitespace(bytes, pos);
            let (entry_offset, next) = read_uint(bytes, pos).ok_or_else(|| {
                Error::MalformedXref(format!("truncated record {} in subsection {}", i, first))
            })?;
            pos = skip_whitespace(bytes, next);
            let (gen, next) = read_uint(bytes, pos).ok_or_else(|| {
                Error::MalformedXref(format!("record {} missing generation", first + i))
            })?;
            pos = skip_whitespace(bytes, next);
            let flag = *bytes.get(pos).ok_or_else(|| {
                Error::MalformedXref("xref table truncated at type flag".to_string())
            })?;
            pos += 1;
            let num = (first + i) as i64;
            match flag {
                b'n' => entries.push((
                    num,
                    XrefEntry::InFile { offset: entry_offset as usize, gen: gen as u16 },
                )),
                b'f' => entries.push((num, XrefEntry::Free)),
                other => {
                    log::warn!("invalid type flag {:?} for object {}, treating as free", other as char, num);
                    entries.push((num, XrefEntry::Free));
                },
            }
        }
    }

    let dict_start = skip_whitespace(bytes, pos);
    let trailer = scan::balanced_dict_at(bytes, dict_start)
        .ok_or_else(|| Error::MalformedXref("unterminated trailer dictionary".to_string()))?;
    let dict = &bytes[trailer.clone()];
    let prev = scan::int_value_after(dict, "Prev").map(|v| v as usize);
    let xref_stm = scan::int_value_after(dict, "XRefStm").map(|v| v as usize);

    Ok(ClassicSection { entries, trailer, prev, xref_stm })
}

/// Parse a cross-reference stream at `offset`.
///
/// The stream dictionary doubles as the trailer. Entries are packed
/// big-endian integers of widths `/W [w0 w1 w2]`; a zero width reads as
/// the constant 0 and consumes no bytes. Entry types: 0 free, 1 in-file
/// at offset, 2 packed in an object stream.
pub(crate) fn parse_stream(bytes: &[u8], offset: usize) -> Result<StreamSection> {
    let (self_ref, after) = parse_obj_header(bytes, offset)
        .ok_or_else(|| Error::MalformedXref(format!("no object header at offset {}", offset)))?;
    let dict_start = skip_whitespace(bytes, after);
    let dict_range = scan::balanced_dict_at(bytes, dict_start)
        .ok_or_else(|| Error::MalformedXref("unterminated xref stream dictionary".to_string()))?;
    let dict = &bytes[dict_range.clone()];

    let payload = scan::stream_payload_range(bytes, dict_range.clone())
        .ok_or_else(|| Error::MalformedXref("xref stream has no stream body".to_string()))?;
    let data = decode_container_payload(dict, &bytes[payload])?;

    let widths = scan::parse_int_array(
        scan::value_token_after(dict, "W")
            .ok_or_else(|| Error::MalformedXref("xref stream missing /W".to_string()))?,
    );
    if widths.len() != 3 {
        return Err(Error::MalformedXref(format!("invalid /W length {}", widths.len())));
    }
    let (w0, w1, w2) = (widths[0] as usize, widths[1] as usize, widths[2] as usize);
    let entry_size = w0 + w1 + w2;
    if entry_size == 0 {
        return Err(Error::MalformedXref("all /W widths are zero".to_string()));
    }

    let size = scan::int_value_after(dict, "Size")
        .ok_or_else(|| Error::MalformedXref("xref stream missing /Size".to_string()))?;
    let ranges: Vec<(i64, i64)> = match scan::value_token_after(dict, "Index") {
        Some(token) => {
            let ints = scan::parse_int_array(token);
            ints.chunks_exact(2).map(|c| (c[0], c[1])).collect()
        },
        None => vec![(0, size)],
    };

    let mut entries = Vec::new();
    let mut pos = 0;
    for (start, count) in ranges {
        for i in 0..count {
            if pos + entry_size > data.len() {
                return Err(Error::MalformedXref("truncated xref stream data".to_string()));
            }
            let entry = &data[pos..pos + entry_size];
            pos += entry_size;
            let kind = read_field(&entry[..w0]);
            let f1 = read_field(&entry[w0..w0 + w1]);
            let f2 = read_field(&entry[w0 + w1..]);
            let num = start + i;
            match kind {
                0 => entries.push((num, XrefEntry::Free)),
                1 => entries.push((num, XrefEntry::InFile { offset: f1 as usize, gen: f2 as u16 })),
                2 => entries.push((
                    num,
                    XrefEntry::InObjStm { container: f1 as i64, index: f2 as usize },
                )),
                other => log::warn!("invalid xref entry type {} for object {}", other, num),
            }
        }
    }

    let prev = scan::int_value_after(dict, "Prev").map(|v| v as usize);

    Ok(StreamSection {
        entries,
        self_ref,
        self_offset: offset,
        dict: dict_range,
        prev,
    })
}

/// Inflate a container payload per its `/Filter`, then reverse any PNG
/// predictor named by `/DecodeParms`.
///
/// Used for both xref streams and object-stream containers; filters other
/// than Flate are unsupported on these.
pub(crate) fn decode_container_payload(dict: &[u8], payload: &[u8]) -> Result<Vec<u8>> {
    let inflated = match scan::value_token_after(dict, "Filter") {
        None => payload.to_vec(),
        Some(b"/FlateDecode") => flate::inflate(payload)?,
        Some(token) if token.starts_with(b"[") => {
            let names: Vec<&[u8]> = token
                .split(|&b| crate::object::is_whitespace(b) || b == b'[' || b == b']')
                .filter(|s| !s.is_empty())
                .collect();
            if names == [b"/FlateDecode".as_slice()] {
                flate::inflate(payload)?
            } else {
                return Err(Error::UnsupportedFilter(
                    String::from_utf8_lossy(token).into_owned(),
                ));
            }
        },
        Some(other) => {
            return Err(Error::UnsupportedFilter(String::from_utf8_lossy(other).into_owned()))
        },
    };

    match scan::dict_value_after(dict, "DecodeParms") {
        Some(parms) => {
            let predictor = scan::int_value_after(parms, "Predictor").unwrap_or(1);
            let columns = scan::int_value_after(parms, "Columns").unwrap_or(1) as usize;
            decode_predictor(&inflated, predictor, columns)
        },
        None => Ok(inflated),
    }
}

/// Read a packed big-endian unsigned field. An empty slice (width 0)
/// reads as the constant 0.
fn read_field(bytes: &[u8]) -> u64 {
    let mut value: u64 = 0;
    for &b in bytes {
        value = (value << 8) | b as u64;
    }
    value
}
