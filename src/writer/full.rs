//! Full-rewrite writer.
//!
//! Emits a fresh single-generation file from the materialized object set:
//! header, objects in ascending number order, one classic xref subsection,
//! trailer, `startxref`, `%%EOF`. All update history is discarded: index
//! infrastructure from the source (object-stream containers and xref
//! streams) is dropped because its content is already materialized as
//! individual objects, and a carried-over xref stream would smuggle a
//! `/Prev` chain into the flattened file.

use crate::error::Result;
use crate::object::ObjRef;
use crate::scan;
use crate::writer::{classic_record, validate_markers, WriteContext};
use std::collections::BTreeMap;

/// Render a fresh document from `objects`. Gaps in the number sequence
/// become free records, so sparse sources need no renumbering (references
/// inside bodies are never rewritten).
pub(crate) fn render(objects: Vec<(ObjRef, Vec<u8>)>, ctx: &WriteContext) -> Result<Vec<u8>> {
    let mut live: BTreeMap<i64, (u16, Vec<u8>)> = BTreeMap::new();
    for (r, body) in objects {
        if is_index_infrastructure(&body) {
            log::debug!("dropping index infrastructure object {}", r);
            continue;
        }
        live.insert(r.num, (r.gen, body));
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.7\n");
    out.extend_from_slice(b"%\x80\x81\x82\x83\n");

    let mut offsets: BTreeMap<i64, (usize, u16)> = BTreeMap::new();
    for (&num, (gen, body)) in &live {
        offsets.insert(num, (out.len(), *gen));
        out.extend_from_slice(format!("{} {} obj\n", num, gen).as_bytes());
        // trailing whitespace is trimmed so rewriting a rewrite is
        // byte-identical instead of growing a newline per pass
        let end = body
            .iter()
            .rposition(|b| !crate::object::is_whitespace(*b))
            .map(|p| p + 1)
            .unwrap_or(0);
        out.extend_from_slice(&body[..end]);
        out.extend_from_slice(b"\nendobj\n");
    }

    let max_num = live.keys().copied().max().unwrap_or(0);
    let size = max_num + 1;

    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", size).as_bytes());
    out.extend_from_slice(&classic_record(0, 65535, false));
    for num in 1..=max_num {
        match offsets.get(&num) {
            Some(&(offset, gen)) => out.extend_from_slice(&classic_record(offset, gen, true)),
            None => out.extend_from_slice(&classic_record(0, 65535, false)),
        }
    }

    let root = ctx.root.to_token();
    out.extend_from_slice(b"trailer\n<< /Size ");
    out.extend_from_slice(size.to_string().as_bytes());
    out.extend_from_slice(b" /Root ");
    out.extend_from_slice(&root);
    if let Some(info) = ctx.info {
        out.extend_from_slice(b" /Info ");
        out.extend_from_slice(&info.to_token());
    }
    out.extend_from_slice(b" >>\n");
    out.extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_offset).as_bytes());

    validate_markers(&out)?;
    Ok(out)
}

fn is_index_infrastructure(body: &[u8]) -> bool {
    matches!(
        scan::value_token_after(body, "Type"),
        Some(b"/ObjStm") | Some(b"/XRef")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::find_bytes;

    fn ctx() -> WriteContext {
        WriteContext {
            prev_startxref: 0,
            root: ObjRef::new(1, 0),
            info: None,
            max_obj: 0,
        }
    }

    fn obj(num: i64, body: &[u8]) -> (ObjRef, Vec<u8>) {
        (ObjRef::new(num, 0), body.to_vec())
    }

    #[test]
    fn test_layout() {
        let objects = vec![obj(1, b"<< /Type /Catalog >>"), obj(2, b"<< /Type /Pages >>")];
        let out = render(objects, &ctx()).unwrap();
        assert!(out.starts_with(b"%PDF-1.7\n"));
        assert!(find_bytes(&out, b"1 0 obj", 0).is_some());
        assert!(find_bytes(&out, b"2 0 obj", 0).is_some());
        assert!(find_bytes(&out, b"xref\n0 3\n", 0).is_some());
        assert!(find_bytes(&out, b"/Size 3", 0).is_some());
        assert!(find_bytes(&out, b"/Prev", 0).is_none());
        assert!(out.ends_with(b"%%EOF\n"));
    }

    #[test]
    fn test_offsets_point_at_headers() {
        let objects = vec![obj(1, b"<< /A 1 >>"), obj(2, b"<< /B 2 >>"), obj(3, b"<< /C 3 >>")];
        let out = render(objects, &ctx()).unwrap();
        let section = crate::xref::parse_classic(
            &out,
            crate::xref::find_startxref(&out).unwrap(),
        )
        .unwrap();
        for (num, entry) in &section.entries {
            if let crate::xref::XrefEntry::InFile { offset, .. } = entry {
                let expected = format!("{} 0 obj", num);
                assert!(out[*offset..].starts_with(expected.as_bytes()));
            }
        }
    }

    #[test]
    fn test_sparse_numbers_pad_with_free() {
        let objects = vec![obj(1, b"<< >>"), obj(4, b"<< >>")];
        let out = render(objects, &ctx()).unwrap();
        assert!(find_bytes(&out, b"xref\n0 5\n", 0).is_some());
        // objects 2 and 3 appear as free records
        let free_count = out
            .windows(20)
            .filter(|w| *w == b"0000000000 65535 f \n")
            .count();
        assert_eq!(free_count, 3); // head plus the two gaps
    }

    #[test]
    fn test_infrastructure_dropped() {
        let objects = vec![
            obj(1, b"<< /Type /Catalog >>"),
            obj(2, b"<< /Type /ObjStm /N 0 /First 0 >>"),
            obj(3, b"<< /Type /XRef /Prev 99 >>"),
        ];
        let out = render(objects, &ctx()).unwrap();
        assert!(find_bytes(&out, b"/Type /ObjStm", 0).is_none());
        assert!(find_bytes(&out, b"/Prev", 0).is_none());
        assert!(find_bytes(&out, b"xref\n0 2\n", 0).is_some());
    }

    #[test]
    fn test_info_preserved() {
        let mut c = ctx();
        c.info = Some(ObjRef::new(9, 0));
        let out = render(vec![obj(1, b"<< >>")], &c).unwrap();
        assert!(find_bytes(&out, b"/Info 9 0 R", 0).is_some());
    }
}
