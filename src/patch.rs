//! Pending object replacements, collected between writes.

use crate::object::ObjRef;
use bytes::Bytes;

/// One pending object replacement.
#[derive(Debug, Clone)]
pub struct Patch {
    /// Reference being replaced
    pub target: ObjRef,
    /// Replacement body
    pub body: Vec<u8>,
    /// Body the replacement was derived from, when known
    pub original: Option<Bytes>,
}

impl Patch {
    /// Create a new patch.
    pub fn new(target: ObjRef, body: Vec<u8>, original: Option<Bytes>) -> Self {
        Self { target, body, original }
    }
}

/// Ordered buffer of patches.
///
/// Appends are cheap; rendering deduplicates so that the latest body per
/// reference wins while distinct references keep their first-insertion
/// order. The owning editor clears the queue after every successful write.
#[derive(Debug, Default)]
pub struct PatchQueue {
    patches: Vec<Patch>,
}

impl PatchQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a patch.
    pub fn push(&mut self, patch: Patch) {
        self.patches.push(patch);
    }

    /// Number of enqueued patches, duplicates included.
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Check whether the queue holds no patches.
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Drop all pending patches.
    pub fn clear(&mut self) {
        self.patches.clear();
    }

    /// The latest enqueued body for a reference, if any.
    pub fn latest(&self, target: ObjRef) -> Option<&Patch> {
        self.patches.iter().rev().find(|p| p.target == target)
    }

    /// Collapse duplicates: the latest body per reference, in
    /// first-insertion order of distinct references.
    pub fn dedup(&self) -> Vec<Patch> {
        let mut out: Vec<Patch> = Vec::new();
        for patch in &self.patches {
            match out.iter_mut().find(|p| p.target == patch.target) {
                Some(slot) => *slot = patch.clone(),
                None => out.push(patch.clone()),
            }
        }
        out
    }
}
