//! Main document editing interface.
//!
//! A [`DocumentEditor`] owns one document's bytes, the resolver index
//! built from them, and the queue of pending patches. All mutating
//! operations take it by exclusive reference; writes are atomic: either
//! a complete new buffer replaces the old one or an error leaves the
//! document untouched.

use crate::error::Result;
use crate::object::ObjRef;
use crate::patch::{Patch, PatchQueue};
use crate::resolver::Resolver;
use crate::scan;
use crate::writer::{full, incremental, WriteContext};
use bytes::Bytes;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Byte-level PDF editor.
pub struct DocumentEditor {
    bytes: Bytes,
    resolver: Resolver,
    queue: PatchQueue,
    next_object_num: i64,
}

impl DocumentEditor {
    /// Open a document from an in-memory buffer.
    pub fn open(bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();
        let resolver = Resolver::new(bytes.clone())?;
        let next_object_num = resolver.max_object_number() + 1;
        Ok(Self {
            bytes,
            resolver,
            queue: PatchQueue::new(),
            next_object_num,
        })
    }

    /// Open a document from a file.
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(std::fs::read(path)?)
    }

    /// The document bytes as last opened or written.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Every live object as `(ref, body)`, ascending by number. This is
    /// the resolver's view; pending patches are visible through [`read`]
    /// only.
    ///
    /// [`read`]: DocumentEditor::read
    pub fn objects(&mut self) -> Vec<(ObjRef, Bytes)> {
        self.resolver.each_object()
    }

    /// Read one object body, consulting pending patches first.
    pub fn read(&mut self, r: ObjRef) -> Option<Bytes> {
        if let Some(patch) = self.queue.latest(r) {
            return Some(Bytes::from(patch.body.clone()));
        }
        self.resolver.body(r).ok()
    }

    /// Enqueue a replacement body for a reference. Multiple patches for
    /// one reference collapse to the last at write time.
    pub fn enqueue(&mut self, r: ObjRef, body: Vec<u8>) {
        let original = self.resolver.body(r).ok();
        self.queue.push(Patch::new(r, body, original));
    }

    /// Number of pending patches.
    pub fn pending_patches(&self) -> usize {
        self.queue.len()
    }

    /// The catalog reference.
    pub fn root_ref(&self) -> Result<ObjRef> {
        self.resolver.root_ref()
    }

    /// The effective trailer dictionary bytes.
    pub fn trailer_dict(&self) -> Bytes {
        self.resolver.trailer()
    }

    /// The catalog's `/AcroForm` reference, when it is an indirect
    /// object. Inline AcroForm dictionaries yield `None`.
    pub fn acroform_ref(&mut self) -> Result<Option<ObjRef>> {
        let root = self.root_ref()?;
        let body = match self.read(root) {
            Some(body) => body,
            None => return Ok(None),
        };
        Ok(scan::ref_value_after(&body, "AcroForm"))
    }

    /// Allocate a fresh object number past everything the index knows.
    pub(crate) fn allocate_object_num(&mut self) -> i64 {
        let num = self.next_object_num.max(self.resolver.max_object_number() + 1);
        self.next_object_num = num + 1;
        num
    }

    fn write_context(&self) -> Result<WriteContext> {
        Ok(WriteContext {
            prev_startxref: self.resolver.startxref_offset(),
            root: self.resolver.root_ref()?,
            info: self.resolver.info_ref(),
            max_obj: self.resolver.max_object_number(),
        })
    }

    /// Append the pending patches as an incremental update.
    ///
    /// The original bytes survive byte-for-byte as a prefix of the
    /// result. On success the editor owns the new buffer, the resolver is
    /// rebuilt from it, and the patch queue is cleared. With no pending
    /// patches this is a no-op returning the current bytes.
    pub fn write_incremental(&mut self) -> Result<Bytes> {
        if self.queue.is_empty() {
            return Ok(self.bytes.clone());
        }
        let patches = self.queue.dedup();
        let ctx = self.write_context()?;
        let rendered = incremental::render(&self.bytes, &patches, &ctx)?;
        self.adopt(rendered)
    }

    /// Rewrite the document as a fresh single-generation file, applying
    /// pending patches and discarding all update history.
    pub fn write_full(&mut self) -> Result<Bytes> {
        self.write_full_excluding(&HashSet::new())
    }

    /// Alias for [`write_full`]: a flattened document has every object at
    /// its latest revision and no `/Prev` chain.
    ///
    /// [`write_full`]: DocumentEditor::write_full
    pub fn flatten(&mut self) -> Result<Bytes> {
        self.write_full()
    }

    /// Full rewrite with an explicit drop set of object numbers, used by
    /// the clear operation.
    pub(crate) fn write_full_excluding(&mut self, drop: &HashSet<i64>) -> Result<Bytes> {
        let mut live: BTreeMap<i64, (ObjRef, Vec<u8>)> = BTreeMap::new();
        for (r, body) in self.resolver.each_object() {
            if !drop.contains(&r.num) {
                live.insert(r.num, (r, body.to_vec()));
            }
        }
        for patch in self.queue.dedup() {
            if !drop.contains(&patch.target.num) && !patch.target.is_detached() {
                live.insert(patch.target.num, (patch.target, patch.body));
            }
        }

        let ctx = self.write_context()?;
        let rendered = full::render(live.into_values().collect(), &ctx)?;
        self.adopt(rendered)
    }

    /// Install freshly rendered bytes: rebuild the resolver, clear the
    /// queue. Failures leave the editor on its previous state.
    fn adopt(&mut self, rendered: Vec<u8>) -> Result<Bytes> {
        let new_bytes = Bytes::from(rendered);
        let resolver = Resolver::new(new_bytes.clone())?;
        self.bytes = new_bytes.clone();
        self.resolver = resolver;
        self.queue.clear();
        self.next_object_num = self.resolver.max_object_number() + 1;
        Ok(new_bytes)
    }

    /// Write the current bytes to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }

    /// Render an incremental update and write it to a file.
    pub fn save_incremental(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.write_incremental()?;
        std::fs::write(path, &bytes)?;
        Ok(())
    }
}

impl std::fmt::Debug for DocumentEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentEditor")
            .field("len", &self.bytes.len())
            .field("pending_patches", &self.queue.len())
            .finish()
    }
}
