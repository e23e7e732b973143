// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Operation-scoped write-back cache.
//!
//! A single insert or delete may touch several elements (the target leaf,
//! a freshly split sibling, old and new parents, leaf-chain neighbors, and
//! any re-parented children). Context makes sure each element is read from
//! the heap file at most once and written at most once per operation,
//! regardless of how many times the algorithm revisits it.

use crate::btree::element::{BTreeElement, ElemHeader};
use crate::codec::{DataCodec, KeyCodec};
use crate::error::{BTreeError, BTreeResult};
use crate::heap::{HeapFile, Link};
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;

/// Write-back cache for one tree operation. Construct with borrows scoped to
/// the call; drop (or call [`Context::done`]) to flush.
pub struct Context<'a, K, D> {
    heap: &'a mut dyn HeapFile,
    key_codec: &'a dyn KeyCodec<K>,
    data_codec: &'a dyn DataCodec<D>,
    link_size: usize,
    record_capacity: usize,
    pub keys_per_node: usize,
    cache: HashMap<Link, BTreeElement<K, D>>,
    dirty: HashSet<Link>,
}

impl<'a, K, D> Context<'a, K, D>
where
    K: Ord + Clone + Debug,
    D: Clone,
{
    pub fn new(
        heap: &'a mut dyn HeapFile,
        key_codec: &'a dyn KeyCodec<K>,
        data_codec: &'a dyn DataCodec<D>,
        link_size: usize,
        record_capacity: usize,
        keys_per_node: usize,
    ) -> Self {
        Self {
            heap,
            key_codec,
            data_codec,
            link_size,
            record_capacity,
            keys_per_node,
            cache: HashMap::new(),
            dirty: HashSet::new(),
        }
    }

    /// Load the element at `pos`, from cache if already touched this
    /// operation, otherwise from the heap file.
    pub fn read_elem(&mut self, pos: Link) -> BTreeResult<BTreeElement<K, D>> {
        if let Some(elem) = self.cache.get(&pos) {
            return Ok(elem.clone());
        }
        let bytes = self.heap.read(pos)?;
        let elem = BTreeElement::from_bytes(&bytes, pos, self.key_codec, self.data_codec, self.link_size)?;
        self.cache.insert(pos, elem.clone());
        Ok(elem)
    }

    /// Cache `elem` and mark it dirty for the next [`Context::done`].
    pub fn write_elem(&mut self, elem: BTreeElement<K, D>) {
        let pos = elem.elem.pos;
        self.cache.insert(pos, elem);
        self.dirty.insert(pos);
    }

    /// Read only the linked-list header view of a cached/loaded element.
    pub fn read_dll_elem(&mut self, pos: Link) -> BTreeResult<ElemHeader> {
        Ok(self.read_elem(pos)?.elem)
    }

    /// Update only the linked-list header of an element already touched
    /// this operation (via `read_elem` or `write_elem`).
    pub fn write_dll_elem(&mut self, header: ElemHeader) -> BTreeResult<()> {
        let pos = header.pos;
        match self.cache.get_mut(&pos) {
            Some(elem) => {
                elem.elem = header;
                self.dirty.insert(pos);
                Ok(())
            }
            None => Err(BTreeError::IntegrityViolation {
                reason: format!("write_dll_elem on element 0x{:X} not yet loaded", pos),
            }),
        }
    }

    /// Allocate a fresh, empty element through the heap file.
    pub fn create_empty_list(&mut self) -> BTreeResult<BTreeElement<K, D>> {
        let pos = self.heap.alloc(self.record_capacity)?;
        let elem = BTreeElement::new_empty(pos);
        self.write_elem(elem.clone());
        Ok(elem)
    }

    /// Release an element's heap record. Drops it from the cache so a
    /// later accidental re-read surfaces as a heap-level error rather than
    /// silently resurrecting stale data.
    pub fn free_elem(&mut self, pos: Link, merge: bool) -> BTreeResult<()> {
        self.cache.remove(&pos);
        self.dirty.remove(&pos);
        self.heap.free(pos, merge)
    }

    fn flush_dirty(&mut self) -> BTreeResult<()> {
        let positions: Vec<Link> = self.dirty.iter().copied().collect();
        for pos in positions {
            let elem = self
                .cache
                .get(&pos)
                .expect("dirty position must be cached");
            let bytes = elem.to_bytes(self.key_codec, self.data_codec, self.link_size)?;
            self.heap.write(pos, &bytes)?;
        }
        self.dirty.clear();
        Ok(())
    }

    /// Write every dirty element back to the heap file and clear the cache.
    pub fn done(&mut self) -> BTreeResult<()> {
        self.flush_dirty()?;
        self.cache.clear();
        Ok(())
    }
}

impl<'a, K, D> Drop for Context<'a, K, D>
where
    K: Ord + Clone + Debug,
    D: Clone,
{
    fn drop(&mut self) {
        if !self.dirty.is_empty() {
            // best-effort: an operation that errored partway through may
            // still leave a partially-updated tree on disk. See §5.
            let _ = self.flush_dirty();
        }
    }
}
