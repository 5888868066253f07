//! Incremental-update writer.
//!
//! Appends one update section to the original bytes: the patched objects
//! packed into an object stream, a cross-reference stream indexing them,
//! and a classic trailer chaining back to the previous `startxref`. Every
//! byte of the original input survives as a prefix of the output.
//!
//! When the batch cannot be packed (a patch carries a stream body, is
//! itself a container, or lives at a nonzero generation), every patch is
//! written as a direct object and indexed by a classic table instead.

use crate::decoders::flate;
use crate::error::{Error, Result};
use crate::objstm;
use crate::patch::Patch;
use crate::writer::{classic_record, validate_markers, WriteContext};

/// Field widths of the appended xref stream: type, offset, index.
const W: [usize; 3] = [1, 4, 2];

/// Render an incremental update. `patches` must already be deduplicated.
pub(crate) fn render(
    original: &[u8],
    patches: &[Patch],
    ctx: &WriteContext,
) -> Result<Vec<u8>> {
    if patches.is_empty() {
        return Err(Error::EmptyXref);
    }

    let mut out = original.to_vec();
    if out.last() != Some(&b'\n') {
        out.push(b'\n');
    }

    let highest_patched = patches.iter().map(|p| p.target.num).max().unwrap_or(0);

    match objstm::encode(patches)? {
        Some(encoded) => {
            render_packed(&mut out, patches, encoded, highest_patched, ctx)?;
        },
        None => {
            log::debug!("patch batch not packable, writing direct objects");
            render_direct(&mut out, patches, highest_patched, ctx);
        },
    }

    validate_markers(&out)?;
    Ok(out)
}

/// Packed path: one ObjStm container, one xref stream, classic trailer.
fn render_packed(
    out: &mut Vec<u8>,
    patches: &[Patch],
    encoded: objstm::Encoded,
    highest_patched: i64,
    ctx: &WriteContext,
) -> Result<()> {
    let container_num = ctx.max_obj.max(highest_patched) + 1;
    let xref_num = container_num + 1;
    let size = ctx.max_obj.max(container_num).max(highest_patched) + 1;

    // object stream container
    let container_offset = out.len();
    out.extend_from_slice(
        format!("{} 0 obj\n<< {} >>\nstream\n", container_num, encoded.dict_fragment).as_bytes(),
    );
    out.extend_from_slice(&encoded.payload);
    out.extend_from_slice(b"\nendstream\nendobj\n");

    // xref entries: type 2 per packed patch, type 1 for the container,
    // type 0 for gaps in the covered number range
    let mut located: Vec<(i64, u8, u64, u64)> = patches
        .iter()
        .enumerate()
        .map(|(i, p)| (p.target.num, 2u8, container_num as u64, i as u64))
        .collect();
    located.push((container_num, 1, container_offset as u64, 0));
    located.sort_by_key(|&(num, ..)| num);

    let first = located[0].0;
    let count = located[located.len() - 1].0 - first + 1;
    let mut packed = Vec::with_capacity(count as usize * (W[0] + W[1] + W[2]));
    let mut cursor = 0usize;
    for num in first..first + count {
        let row = if cursor < located.len() && located[cursor].0 == num {
            let (_, kind, f1, f2) = located[cursor];
            cursor += 1;
            (kind, f1, f2)
        } else {
            (0, 0, 0)
        };
        packed.push(row.0);
        packed.extend_from_slice(&(row.1 as u32).to_be_bytes());
        packed.extend_from_slice(&(row.2 as u16).to_be_bytes());
    }
    let deflated = flate::deflate(&packed)?;

    let root = ctx.root.to_token();
    let root = String::from_utf8_lossy(&root);

    let xref_offset = out.len();
    out.extend_from_slice(
        format!(
            "{} 0 obj\n<< /Type /XRef /W [1 4 2] /Size {} /Index [{} {}] /Prev {} /Root {} /Filter /FlateDecode /Length {} >>\nstream\n",
            xref_num, size, first, count, ctx.prev_startxref, root, deflated.len()
        )
        .as_bytes(),
    );
    out.extend_from_slice(&deflated);
    out.extend_from_slice(b"\nendstream\nendobj\n");

    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Prev {} /Root {} /XRefStm {} >>\nstartxref\n{}\n%%EOF\n",
            size, ctx.prev_startxref, root, xref_offset, xref_offset
        )
        .as_bytes(),
    );
    Ok(())
}

/// Fallback path: direct objects indexed by a classic table, one
/// subsection per contiguous run of object numbers.
fn render_direct(out: &mut Vec<u8>, patches: &[Patch], highest_patched: i64, ctx: &WriteContext) {
    let mut located: Vec<(i64, u16, usize)> = Vec::with_capacity(patches.len());
    for patch in patches {
        let offset = out.len();
        out.extend_from_slice(
            format!("{} {} obj\n", patch.target.num, patch.target.gen).as_bytes(),
        );
        out.extend_from_slice(&patch.body);
        out.extend_from_slice(b"\nendobj\n");
        located.push((patch.target.num, patch.target.gen, offset));
    }
    located.sort_by_key(|&(num, ..)| num);

    let xref_offset = out.len();
    out.extend_from_slice(b"xref\n");
    let mut i = 0;
    while i < located.len() {
        let run_start = i;
        while i + 1 < located.len() && located[i + 1].0 == located[i].0 + 1 {
            i += 1;
        }
        i += 1;
        let run = &located[run_start..i];
        out.extend_from_slice(format!("{} {}\n", run[0].0, run.len()).as_bytes());
        for &(_, gen, offset) in run {
            out.extend_from_slice(&classic_record(offset, gen, true));
        }
    }

    let size = ctx.max_obj.max(highest_patched) + 1;
    let root = ctx.root.to_token();
    out.extend_from_slice(b"trailer\n<< /Size ");
    out.extend_from_slice(size.to_string().as_bytes());
    out.extend_from_slice(b" /Prev ");
    out.extend_from_slice(ctx.prev_startxref.to_string().as_bytes());
    out.extend_from_slice(b" /Root ");
    out.extend_from_slice(&root);
    out.extend_from_slice(b" >>\n");
    out.extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_offset).as_bytes());
}
