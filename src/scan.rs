//! Byte-level dictionary and token scanner.
//!
//! This module parses and surgically edits PDF syntax without building an
//! object tree. Every operation takes byte slices and returns byte slices
//! (or owned buffers spliced at exact offsets), so whitespace and unknown
//! keys in the source survive every edit untouched.
//!
//! The scanner leans on two properties of PDF syntax: every value type is
//! identified by its first character, and every composite value is
//! delimiter-balanced. Stream bodies are the one exception: they contain
//! arbitrary binary, which is why whole-document scans go through
//! [`strip_stream_bodies`] first.

use crate::object::{is_delimiter, is_whitespace, parse_ref_at, skip_whitespace, ObjRef};
use std::ops::Range;

/// Replacement body used by [`strip_stream_bodies`].
const STREAM_SENTINEL: &[u8] = b" ";

/// Find `needle` in `haystack` at or after `from`.
pub(crate) fn find_bytes(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() || haystack.len() - from < needle.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Find the last occurrence of `needle` in `haystack`.
pub(crate) fn rfind_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).rev().find(|&i| haystack[i..].starts_with(needle))
}

/// Replace every `stream … endstream` body with a fixed sentinel,
/// preserving the `stream`/`endstream` markers themselves.
///
/// Stream bodies contain arbitrary binary that would otherwise be mistaken
/// for dictionary syntax during whole-document scanning.
pub fn strip_stream_bodies(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut pos = 0;
    loop {
        let Some(kw) = find_stream_keyword(bytes, pos) else {
            out.extend_from_slice(&bytes[pos..]);
            return out;
        };
        let body_start = skip_stream_eol(bytes, kw + 6);
        let Some(end) = find_bytes(bytes, b"endstream", body_start) else {
            out.extend_from_slice(&bytes[pos..]);
            return out;
        };
        out.extend_from_slice(&bytes[pos..body_start]);
        out.extend_from_slice(STREAM_SENTINEL);
        out.extend_from_slice(b"endstream");
        pos = end + 9;
    }
}

/// Locate a standalone `stream` keyword (not the tail of `endstream`).
pub(crate) fn find_stream_keyword(bytes: &[u8], from: usize) -> Option<usize> {
    let mut pos = from;
    while let Some(p) = find_bytes(bytes, b"stream", pos) {
        let before_ok = p == 0 || is_whitespace(bytes[p - 1]) || is_delimiter(bytes[p - 1]);
        let after = p + 6;
        let after_ok = after >= bytes.len() || matches!(bytes[after], b'\r' | b'\n');
        if before_ok && after_ok {
            return Some(p);
        }
        pos = p + 1;
    }
    None
}

/// Skip the single EOL that follows the `stream` keyword.
pub(crate) fn skip_stream_eol(bytes: &[u8], pos: usize) -> usize {
    if bytes[pos..].starts_with(b"\r\n") {
        pos + 2
    } else if pos < bytes.len() && (bytes[pos] == b'\n' || bytes[pos] == b'\r') {
        pos + 1
    } else {
        pos
    }
}

/// Iterator over every top-level `<< … >>` slice in a buffer.
///
/// Yields `(start_offset, slice)` pairs. Nesting is tracked by counting
/// `<<` and `>>`; a dictionary is emitted when depth returns to zero, and
/// scanning resumes immediately after its closing `>>`. Literal and hex
/// strings inside a dictionary are skipped, so a `>>` inside `(…)` cannot
/// close it.
pub fn dictionaries(bytes: &[u8]) -> Dictionaries<'_> {
    Dictionaries { bytes, pos: 0 }
}

/// See [`dictionaries`].
pub struct Dictionaries<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Dictionaries<'a> {
    type Item = (usize, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let start = find_bytes(self.bytes, b"<<", self.pos)?;
        match balanced_dict_at(self.bytes, start) {
            Some(range) => {
                self.pos = range.end;
                Some((range.start, &self.bytes[range]))
            },
            None => {
                self.pos = self.bytes.len();
                None
            },
        }
    }
}

/// Scan a balanced `<< … >>` starting exactly at `start` (which must point
/// at `<<`). Returns the inclusive range of the whole dictionary.
pub(crate) fn balanced_dict_at(bytes: &[u8], start: usize) -> Option<Range<usize>> {
    if !bytes[start..].starts_with(b"<<") {
        return None;
    }
    let mut depth = 0usize;
    let mut pos = start;
    while pos < bytes.len() {
        match bytes[pos] {
            b'<' if bytes[pos..].starts_with(b"<<") => {
                depth += 1;
                pos += 2;
            },
            b'<' => {
                // hex string
                pos = find_bytes(bytes, b">", pos + 1).map(|p| p + 1)?;
            },
            b'>' if bytes[pos..].starts_with(b">>") => {
                depth -= 1;
                pos += 2;
                if depth == 0 {
                    return Some(start..pos);
                }
            },
            b'(' => {
                pos = skip_literal_string(bytes, pos)?;
            },
            b'%' => {
                while pos < bytes.len() && bytes[pos] != b'\r' && bytes[pos] != b'\n' {
                    pos += 1;
                }
            },
            _ => pos += 1,
        }
    }
    None
}

/// Skip a paren-balanced literal string starting at `(`. `\x` is a
/// two-byte escape. Returns the position just past the closing paren.
fn skip_literal_string(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut pos = start;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 2,
            b'(' => {
                depth += 1;
                pos += 1;
            },
            b')' => {
                depth -= 1;
                pos += 1;
                if depth == 0 {
                    return Some(pos);
                }
            },
            _ => pos += 1,
        }
    }
    None
}

/// Locate a delimited occurrence of `/key` in `dict`.
///
/// The byte before the slash must be whitespace or a delimiter, and the
/// byte after the key must be whitespace or open a value (`(`, `<`, `[`,
/// `/`); this is what keeps `/V` from matching inside `/Version`.
fn find_key(dict: &[u8], key: &str) -> Option<usize> {
    let mut needle = Vec::with_capacity(key.len() + 1);
    needle.push(b'/');
    needle.extend_from_slice(key.as_bytes());
    let mut from = 0;
    while let Some(p) = find_bytes(dict, &needle, from) {
        let end = p + needle.len();
        let before_ok = p == 0 || is_whitespace(dict[p - 1]) || is_delimiter(dict[p - 1]);
        let after_ok = end < dict.len()
            && (is_whitespace(dict[end]) || matches!(dict[end], b'(' | b'<' | b'[' | b'/'));
        if before_ok && after_ok {
            return Some(p);
        }
        from = p + 1;
    }
    None
}

/// Read one complete value token starting exactly at `pos`.
///
/// Token grammar by first character: `(` literal string (paren-balanced),
/// `<` hex string (or the fixed two-byte `<<` marker when a nested
/// dictionary follows), `[` bracket-balanced array, `/` name, anything
/// else an atom running to the next whitespace, delimiter, or `%`.
pub(crate) fn read_token(data: &[u8], pos: usize) -> Option<Range<usize>> {
    if pos >= data.len() {
        return None;
    }
    match data[pos] {
        b'(' => skip_literal_string(data, pos).map(|end| pos..end),
        b'<' if data[pos..].starts_with(b"<<") => Some(pos..pos + 2),
        b'<' => find_bytes(data, b">", pos + 1).map(|p| pos..p + 1),
        b'[' => {
            let mut depth = 0usize;
            let mut i = pos;
            while i < data.len() {
                match data[i] {
                    b'[' => {
                        depth += 1;
                        i += 1;
                    },
                    b']' => {
                        depth -= 1;
                        i += 1;
                        if depth == 0 {
                            return Some(pos..i);
                        }
                    },
                    b'(' => i = skip_literal_string(data, i)?,
                    _ => i += 1,
                }
            }
            None
        },
        b'/' => {
            let mut i = pos + 1;
            while i < data.len() && !is_whitespace(data[i]) && !is_delimiter(data[i]) {
                i += 1;
            }
            Some(pos..i)
        },
        _ => {
            let mut i = pos;
            while i < data.len() && !is_whitespace(data[i]) && !is_delimiter(data[i]) && data[i] != b'%' {
                i += 1;
            }
            if i == pos {
                None
            } else {
                Some(pos..i)
            }
        },
    }
}

/// Locate `/key` and its value token; returns `(key_range, value_range)`.
fn key_value_ranges(dict: &[u8], key: &str) -> Option<(Range<usize>, Range<usize>)> {
    let kstart = find_key(dict, key)?;
    let kend = kstart + 1 + key.len();
    let vstart = skip_whitespace(dict, kend);
    let vrange = read_token(dict, vstart)?;
    Some((kstart..kend, vrange))
}

/// Locate `key` and return its raw value token, undecoded.
///
/// A nested dictionary yields the fixed marker `<<`; use
/// [`dict_value_after`] when the full nested slice is needed.
pub fn value_token_after<'a>(dict: &'a [u8], key: &str) -> Option<&'a [u8]> {
    let (_, vrange) = key_value_ranges(dict, key)?;
    Some(&dict[vrange])
}

/// Locate `key` and return the full balanced slice of its dictionary
/// value. An array value is searched for its first nested dictionary, the
/// shape `/DecodeParms [<< … >>]` takes.
pub fn dict_value_after<'a>(dict: &'a [u8], key: &str) -> Option<&'a [u8]> {
    let (_, vrange) = key_value_ranges(dict, key)?;
    match dict[vrange.start] {
        b'<' => balanced_dict_at(dict, vrange.start).map(|r| &dict[r]),
        b'[' => {
            let inner = find_bytes(dict, b"<<", vrange.start)?;
            if inner >= vrange.end {
                return None;
            }
            balanced_dict_at(dict, inner).map(|r| &dict[r])
        },
        _ => None,
    }
}

/// Locate `key` and parse its value as a `num gen R` reference.
pub fn ref_value_after(dict: &[u8], key: &str) -> Option<ObjRef> {
    let kstart = find_key(dict, key)?;
    let vstart = skip_whitespace(dict, kstart + 1 + key.len());
    parse_ref_at(dict, vstart).map(|(r, _)| r)
}

/// Locate `key` and parse its value as an integer atom.
pub fn int_value_after(dict: &[u8], key: &str) -> Option<i64> {
    let token = value_token_after(dict, key)?;
    std::str::from_utf8(token).ok()?.parse().ok()
}

/// Decode a literal-string or hex-string token into text.
///
/// Decoded bytes beginning with the UTF-16BE BOM `FE FF` are decoded as
/// UTF-16BE; anything else is rendered as UTF-8 best-effort.
pub fn decode_pdf_string(token: &[u8]) -> String {
    let raw = match token.first() {
        Some(b'(') => decode_literal(token),
        Some(b'<') => decode_hex(token),
        _ => token.to_vec(),
    };
    if raw.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = raw[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(&raw).into_owned()
    }
}

fn decode_literal(token: &[u8]) -> Vec<u8> {
    let inner = &token[1..token.len().saturating_sub(1)];
    let mut out = Vec::with_capacity(inner.len());
    let mut i = 0;
    while i < inner.len() {
        if inner[i] != b'\\' {
            out.push(inner[i]);
            i += 1;
            continue;
        }
        i += 1;
        if i >= inner.len() {
            break;
        }
        match inner[i] {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'\\' | b'(' | b')' => out.push(inner[i]),
            b'0'..=b'7' => {
                let mut value: u16 = 0;
                let mut digits = 0;
                while digits < 3 && i < inner.len() && (b'0'..=b'7').contains(&inner[i]) {
                    value = value * 8 + (inner[i] - b'0') as u16;
                    digits += 1;
                    i += 1;
                }
                out.push(value as u8);
                continue;
            },
            other => out.push(other),
        }
        i += 1;
    }
    out
}

fn decode_hex(token: &[u8]) -> Vec<u8> {
    let inner = &token[1..token.len().saturating_sub(1)];
    let mut digits: Vec<u8> = inner
        .iter()
        .copied()
        .filter(|b| b.is_ascii_hexdigit())
        .collect();
    if digits.len() % 2 == 1 {
        digits.push(b'0');
    }
    digits
        .chunks_exact(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16).unwrap_or(0) as u8;
            let lo = (pair[1] as char).to_digit(16).unwrap_or(0) as u8;
            (hi << 4) | lo
        })
        .collect()
}

/// Encode text as a string token.
///
/// ASCII input becomes a literal string with `\`, `(`, `)` and line
/// endings escaped; anything else becomes a hex string carrying the
/// UTF-16BE BOM, which is what viewers expect for non-Latin field values.
pub fn encode_pdf_string(value: &str) -> Vec<u8> {
    if value.is_ascii() {
        let mut out = Vec::with_capacity(value.len() + 2);
        out.push(b'(');
        for &b in value.as_bytes() {
            match b {
                b'\\' => out.extend_from_slice(b"\\\\"),
                b'(' => out.extend_from_slice(b"\\("),
                b')' => out.extend_from_slice(b"\\)"),
                b'\n' => out.extend_from_slice(b"\\n"),
                b'\r' => out.extend_from_slice(b"\\r"),
                _ => out.push(b),
            }
        }
        out.push(b')');
        out
    } else {
        let mut out = Vec::with_capacity(value.len() * 4 + 6);
        out.extend_from_slice(b"<FEFF");
        for unit in value.encode_utf16() {
            out.extend_from_slice(format!("{:04X}", unit).as_bytes());
        }
        out.push(b'>');
        out
    }
}

/// Replace the value of `key` with `token`, splicing by exact byte
/// positions. Falls back to insertion when the key is absent. If the
/// splice no longer looks like a dictionary, the original is returned
/// untouched.
pub fn replace_key_value(dict: &[u8], key: &str, token: &[u8]) -> Vec<u8> {
    let Some((_, vrange)) = key_value_ranges(dict, key) else {
        return upsert_key_value(dict, key, token);
    };
    let mut out = Vec::with_capacity(dict.len() + token.len());
    out.extend_from_slice(&dict[..vrange.start]);
    out.extend_from_slice(token);
    out.extend_from_slice(&dict[vrange.end..]);
    sanity_checked(out, dict)
}

/// Insert `key token` immediately after the opening `<<` (or replace the
/// existing value when the key is already present).
pub fn upsert_key_value(dict: &[u8], key: &str, token: &[u8]) -> Vec<u8> {
    if find_key(dict, key).is_some() {
        return replace_key_value(dict, key, token);
    }
    let Some(open) = find_bytes(dict, b"<<", 0) else {
        return dict.to_vec();
    };
    let at = open + 2;
    let mut out = Vec::with_capacity(dict.len() + key.len() + token.len() + 4);
    out.extend_from_slice(&dict[..at]);
    out.extend_from_slice(b" /");
    out.extend_from_slice(key.as_bytes());
    out.push(b' ');
    out.extend_from_slice(token);
    out.push(b' ');
    out.extend_from_slice(&dict[at..]);
    sanity_checked(out, dict)
}

/// Remove `key` and its value token. Absent keys are a no-op.
pub fn remove_key_value(dict: &[u8], key: &str) -> Vec<u8> {
    let Some((krange, vrange)) = key_value_ranges(dict, key) else {
        return dict.to_vec();
    };
    // a nested dictionary value removes the whole balanced slice
    let vend = if dict[vrange.start..].starts_with(b"<<") {
        balanced_dict_at(dict, vrange.start).map(|r| r.end).unwrap_or(vrange.end)
    } else {
        vrange.end
    };
    let mut out = Vec::with_capacity(dict.len());
    out.extend_from_slice(&dict[..krange.start]);
    out.extend_from_slice(&dict[vend..]);
    sanity_checked(out, dict)
}

fn sanity_checked(candidate: Vec<u8>, original: &[u8]) -> Vec<u8> {
    if find_bytes(&candidate, b"<<", 0).is_some() && find_bytes(&candidate, b">>", 0).is_some() {
        candidate
    } else {
        original.to_vec()
    }
}

/// Delete one occurrence of `num gen R` from an array token and
/// canonicalize whitespace.
pub fn remove_ref_from_array(array: &[u8], r: ObjRef) -> Vec<u8> {
    let mut refs = crate::object::parse_ref_array(array);
    if let Some(idx) = refs.iter().position(|x| *x == r) {
        refs.remove(idx);
    }
    rebuild_ref_array(&refs)
}

/// Append a reference before the closing `]`; an empty array becomes
/// `[num gen R]`.
pub fn add_ref_to_array(array: &[u8], r: ObjRef) -> Vec<u8> {
    let mut refs = crate::object::parse_ref_array(array);
    refs.push(r);
    rebuild_ref_array(&refs)
}

fn rebuild_ref_array(refs: &[ObjRef]) -> Vec<u8> {
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

/// True iff the body is a widget annotation (`/Subtype /Widget`).
pub fn is_widget(body: &[u8]) -> bool {
    value_token_after(body, "Subtype") == Some(b"/Widget")
}

/// Parse every integer inside an array token (brackets included).
pub(crate) fn parse_int_array(token: &[u8]) -> Vec<i64> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < token.len() {
        if token[pos].is_ascii_digit() {
            if let Some((v, end)) = crate::object::read_uint(token, pos) {
                out.push(v as i64);
                pos = end;
                continue;
            }
        }
        pos += 1;
    }
    out
}

/// Locate the payload of the stream whose dictionary occupies
/// `dict_range`. Prefers a direct `/Length` verified against a following
/// `endstream`; falls back to searching for `endstream` when `/Length` is
/// absent, indirect, or wrong.
pub(crate) fn stream_payload_range(bytes: &[u8], dict_range: Range<usize>) -> Option<Range<usize>> {
    let dict = &bytes[dict_range.clone()];
    let kw = find_stream_keyword(bytes, dict_range.end)?;
    let start = skip_stream_eol(bytes, kw + 6);

    if let Some(len) = int_value_after(dict, "Length") {
        let end = start.checked_add(len as usize)?;
        if end <= bytes.len() {
            let after = skip_stream_eol(bytes, end);
            if bytes[after..].starts_with(b"endstream") {
                return Some(start..end);
            }
        }
        log::warn!("stream /Length {} does not land on endstream, searching", len);
    }

    let end = find_bytes(bytes, b"endstream", start)?;
    let end = if end >= 2 && &bytes[end - 2..end] == b"\r\n" {
        end - 2
    } else if end >= 1 && (bytes[end - 1] == b'\n' || bytes[end - 1] == b'\r') {
        end - 1
    } else {
        end
    };
    Some(start..end)
}
