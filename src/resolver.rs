//! Object resolution: from a raw byte buffer to `ref → body` lookups.
//!
//! The resolver walks the cross-reference chain eagerly at construction:
//! newest section first, following `/Prev` backward, merging entries with
//! first-writer-wins so the most recent definition stays authoritative.
//! Object bodies and object-stream containers are loaded lazily; decoded
//! containers are memoized because they are expensive to inflate but few
//! in number.

use crate::error::{Error, Result};
use crate::object::{parse_obj_header, skip_whitespace, ObjRef};
use crate::objstm;
use crate::scan;
use crate::xref::{self, XrefEntry};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};

/// Resolves indirect references against one document's bytes.
///
/// A resolver is a single-owner value: it holds read-only access to the
/// source buffer plus mutable caches, and is not meant to be shared
/// across threads.
pub struct Resolver {
    bytes: Bytes,
    entries: HashMap<i64, XrefEntry>,
    trailer: Bytes,
    startxref: usize,
    objstm_cache: HashMap<i64, Vec<(ObjRef, Bytes)>>,
}

impl Resolver {
    /// Build the effective index for `bytes`.
    ///
    /// Fails with [`Error::MalformedXref`] when no usable `startxref` or
    /// xref section exists, and with [`Error::Encrypted`] when the
    /// effective trailer carries `/Encrypt`.
    pub fn new(bytes: Bytes) -> Result<Self> {
        let startxref = xref::find_startxref(&bytes)?;

        let mut entries: HashMap<i64, XrefEntry> = HashMap::new();
        let mut classic_trailer = None;
        let mut stream_trailer = None;
        let mut visited: HashSet<usize> = HashSet::new();
        let mut current = Some(startxref);

        while let Some(offset) = current {
            if !visited.insert(offset) {
                log::warn!("circular /Prev chain at offset {}", offset);
                break;
            }
            if offset >= bytes.len() {
                return Err(Error::MalformedXref(format!(
                    "xref offset {} beyond end of file",
                    offset
                )));
            }

            if xref::is_classic_table(&bytes, offset) {
                log::debug!("classic xref table at offset {}", offset);
                let section = xref::parse_classic(&bytes, offset)?;
                merge(&mut entries, section.entries);
                if classic_trailer.is_none() {
                    classic_trailer = Some(section.trailer.clone());
                }
                if let Some(stm_offset) = section.xref_stm {
                    // hybrid-reference file: merge-only, existing entries win
                    if visited.insert(stm_offset) {
                        match xref::parse_stream(&bytes, stm_offset) {
                            Ok(stm) => {
                                merge(&mut entries, stm.entries);
                                register_self(&mut entries, stm.self_ref, stm.self_offset);
                            },
                            Err(e) => log::warn!("ignoring bad /XRefStm at {}: {}", stm_offset, e),
                        }
                    }
                }
                current = section.prev;
            } else {
                log::debug!("xref stream at offset {}", offset);
                let section = xref::parse_stream(&bytes, offset)?;
                merge(&mut entries, section.entries);
                register_self(&mut entries, section.self_ref, section.self_offset);
                if stream_trailer.is_none() {
                    stream_trailer = Some(section.dict.clone());
                }
                current = section.prev;
            }
        }

        let trailer_range = classic_trailer
            .or(stream_trailer)
            .ok_or_else(|| Error::MalformedXref("no trailer found".to_string()))?;
        let trailer = bytes.slice(trailer_range);

        if scan::value_token_after(&trailer, "Encrypt").is_some() {
            return Err(Error::Encrypted);
        }

        Ok(Self {
            bytes,
            entries,
            trailer,
            startxref,
            objstm_cache: HashMap::new(),
        })
    }

    /// The source buffer.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// The effective trailer dictionary bytes.
    pub fn trailer(&self) -> Bytes {
        self.trailer.clone()
    }

    /// The `startxref` offset this index was walked from.
    pub fn startxref_offset(&self) -> usize {
        self.startxref
    }

    /// The catalog reference from the effective trailer.
    pub fn root_ref(&self) -> Result<ObjRef> {
        scan::ref_value_after(&self.trailer, "Root")
            .ok_or_else(|| Error::MalformedXref("trailer has no /Root".to_string()))
    }

    /// The `/Info` reference from the effective trailer, when present.
    pub fn info_ref(&self) -> Option<ObjRef> {
        scan::ref_value_after(&self.trailer, "Info")
    }

    /// Highest object number known to the index.
    pub fn max_object_number(&self) -> i64 {
        self.entries.keys().copied().max().unwrap_or(0)
    }

    /// Look up the index entry for an object number.
    pub fn entry(&self, num: i64) -> Option<&XrefEntry> {
        self.entries.get(&num)
    }

    /// Whether the index holds a live (non-free) entry for `num`.
    pub fn contains(&self, num: i64) -> bool {
        !matches!(self.entries.get(&num), None | Some(XrefEntry::Free))
    }

    /// Load the body for a reference.
    pub fn body(&mut self, r: ObjRef) -> Result<Bytes> {
        if r.is_detached() {
            return Err(Error::MissingObject(r.num, r.gen));
        }
        match self.entries.get(&r.num).copied() {
            None | Some(XrefEntry::Free) => Err(Error::MissingObject(r.num, r.gen)),
            Some(XrefEntry::InFile { offset, .. }) => self.body_at(offset, r),
            Some(XrefEntry::InObjStm { container, index }) => {
                self.load_container(container)?;
                let packed = &self.objstm_cache[&container];
                if let Some((found, body)) = packed.get(index) {
                    if found.num == r.num {
                        return Ok(body.clone());
                    }
                    log::warn!(
                        "container {} index {} holds object {}, expected {}",
                        container,
                        index,
                        found.num,
                        r.num
                    );
                }
                // index was wrong; fall back to a number search
                packed
                    .iter()
                    .find(|(found, _)| found.num == r.num)
                    .map(|(_, body)| body.clone())
                    .ok_or(Error::MissingObject(r.num, r.gen))
            },
        }
    }

    /// Enumerate every live object as `(ref, body)`, ascending by number.
    ///
    /// Entries whose bodies cannot be loaded are skipped with a warning
    /// rather than failing the whole enumeration.
    pub fn each_object(&mut self) -> Vec<(ObjRef, Bytes)> {
        let mut refs: Vec<ObjRef> = self
            .entries
            .iter()
            .filter_map(|(&num, entry)| match entry {
                XrefEntry::Free => None,
                XrefEntry::InFile { gen, .. } => Some(ObjRef::new(num, *gen)),
                XrefEntry::InObjStm { .. } => Some(ObjRef::new(num, 0)),
            })
            .collect();
        refs.sort();

        let mut out = Vec::with_capacity(refs.len());
        for r in refs {
            match self.body(r) {
                Ok(body) => out.push((r, body)),
                Err(e) => log::warn!("skipping unreadable object {}: {}", r, e),
            }
        }
        out
    }

    /// Extract the body at a recorded in-file offset: past `num gen obj`
    /// and its trailing whitespace, up to `endobj`.
    fn body_at(&self, offset: usize, r: ObjRef) -> Result<Bytes> {
        let (found, after) = parse_obj_header(&self.bytes, offset)
            .ok_or(Error::MissingObject(r.num, r.gen))?;
        if found.num != r.num {
            log::warn!("offset {} holds object {}, expected {}", offset, found, r);
        }
        let start = skip_whitespace(&self.bytes, after);
        let end = scan::find_bytes(&self.bytes, b"endobj", start)
            .ok_or(Error::MissingObject(r.num, r.gen))?;
        Ok(self.bytes.slice(start..end))
    }

    /// Decode and memoize an object-stream container. Containers are
    /// always direct objects; a container recorded inside another
    /// container is rejected rather than chased.
    fn load_container(&mut self, container: i64) -> Result<()> {
        if self.objstm_cache.contains_key(&container) {
            return Ok(());
        }
        let body = match self.entries.get(&container).copied() {
            Some(XrefEntry::InFile { offset, .. }) => {
                self.body_at(offset, ObjRef::new(container, 0))?
            },
            _ => {
                return Err(Error::CorruptStream(format!(
                    "container {} is not a direct object",
                    container
                )))
            },
        };
        let dict_start = scan::find_bytes(&body, b"<<", 0).ok_or_else(|| {
            Error::CorruptStream(format!("container {} has no dictionary", container))
        })?;
        let dict_range = scan::balanced_dict_at(&body, dict_start).ok_or_else(|| {
            Error::CorruptStream(format!("container {} dictionary unterminated", container))
        })?;
        let payload_range = scan::stream_payload_range(&body, dict_range.clone())
            .ok_or_else(|| Error::CorruptStream(format!("container {} has no stream", container)))?;

        let dict = &body[dict_range];
        let n = scan::int_value_after(dict, "N").ok_or_else(|| {
            Error::CorruptStream(format!("container {} missing /N", container))
        })? as usize;
        let first = scan::int_value_after(dict, "First").ok_or_else(|| {
            Error::CorruptStream(format!("container {} missing /First", container))
        })? as usize;

        let decoded = xref::decode_container_payload(dict, &body[payload_range])?;
        let packed = objstm::parse(&Bytes::from(decoded), n, first)?;
        self.objstm_cache.insert(container, packed);
        Ok(())
    }
}

/// First-writer-wins merge: the walk visits newest sections first, so the
/// entry already present is the authoritative one. Free entries are an
/// absence, not a tombstone; they never enter the index, which keeps a
/// gap entry in a newer section from shadowing a live object in an older
/// one.
fn merge(entries: &mut HashMap<i64, XrefEntry>, section: Vec<(i64, XrefEntry)>) {
    for (num, entry) in section {
        if matches!(entry, XrefEntry::Free) {
            continue;
        }
        entries.entry(num).or_insert(entry);
    }
}

/// The xref stream object itself gets an in-file entry at its header
/// offset when no section registered it.
fn register_self(entries: &mut HashMap<i64, XrefEntry>, self_ref: ObjRef, offset: usize) {
    entries
        .entry(self_ref.num)
        .or_insert(XrefEntry::InFile { offset, gen: self_ref.gen });
}
