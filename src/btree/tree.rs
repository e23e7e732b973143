// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! `BPlusTree`: the public handle combining a heap file, a pair of codecs,
//! and the tree's three-pointer descriptor.

use crate::btree::context::Context;
use crate::btree::element::BTreeElement;
use crate::btree::iter::{ForwardIter, ReverseIter};
use crate::btree::node::{link_from_bytes, link_to_bytes, record_capacity, Node};
use crate::btree::ops::{
    delete_from_leaf, insert_to_leaf, search_insert_leaf, search_node, TreeState,
};
use crate::codec::{DataCodec, KeyCodec};
use crate::error::{BTreeError, BTreeResult};
use crate::heap::{HeapFile, Link};
use std::fmt::Debug;

/// A persistent B+Tree index over a heap-allocated file.
///
/// Owns its heap file and codecs outright (both boxed, so `BPlusTree<K, D>`
/// is generic only over key and value type, never over the storage backend
/// or encoding). All mutation goes through a [`Context`] that batches reads
/// and writes for one operation; `insert`/`remove` build and discard their
/// own, while `insert_to_leaf`/`delete_from_leaf` accept a caller-supplied
/// one so several mutations can share a single write-back.
pub struct BPlusTree<K, D> {
    heap: Box<dyn HeapFile>,
    key_codec: Box<dyn KeyCodec<K>>,
    data_codec: Box<dyn DataCodec<D>>,
    state: TreeState,
    link_size: usize,
    record_capacity: usize,
    keys_per_node: usize,
}

/// Width in bytes of the on-disk root descriptor for the given link size.
pub fn descriptor_width(link_size: usize) -> usize {
    3 * link_size
}

impl<K, D> BPlusTree<K, D>
where
    K: Ord + Clone + Debug,
    D: Clone,
{
    /// Initialize a new, empty tree: allocates the root (and only) leaf
    /// element, with `first == last == root`.
    pub fn create(
        mut heap: Box<dyn HeapFile>,
        key_codec: Box<dyn KeyCodec<K>>,
        data_codec: Box<dyn DataCodec<D>>,
        keys_per_node: usize,
    ) -> BTreeResult<Self> {
        let link_size = heap.link_size();
        let capacity = record_capacity(
            key_codec.as_ref(),
            data_codec.as_ref(),
            link_size,
            keys_per_node,
        );
        let root_pos = heap.alloc(capacity)?;
        let root = BTreeElement::<K, D>::new_empty(root_pos);
        let bytes = root.to_bytes(key_codec.as_ref(), data_codec.as_ref(), link_size)?;
        heap.write(root_pos, &bytes)?;
        heap.flush()?;

        Ok(Self {
            heap,
            key_codec,
            data_codec,
            state: TreeState {
                root_pos,
                first_pos: root_pos,
                last_pos: root_pos,
            },
            link_size,
            record_capacity: capacity,
            keys_per_node,
        })
    }

    /// Reconstruct a tree handle from a previously-persisted root descriptor
    /// (see [`BPlusTree::to_bytes`]) and the heap file it points into.
    pub fn from_bytes(
        bytes: &[u8],
        heap: Box<dyn HeapFile>,
        key_codec: Box<dyn KeyCodec<K>>,
        data_codec: Box<dyn DataCodec<D>>,
        keys_per_node: usize,
    ) -> BTreeResult<Self> {
        let link_size = heap.link_size();
        if bytes.len() < descriptor_width(link_size) {
            return Err(BTreeError::IntegrityViolation {
                reason: "root descriptor truncated".to_string(),
            });
        }
        let root_pos = link_from_bytes(&bytes[0..link_size]);
        let first_pos = link_from_bytes(&bytes[link_size..2 * link_size]);
        let last_pos = link_from_bytes(&bytes[2 * link_size..3 * link_size]);

        if root_pos == 0 || first_pos == 0 || last_pos == 0 {
            return Err(BTreeError::NotInitialized);
        }

        let capacity = record_capacity(
            key_codec.as_ref(),
            data_codec.as_ref(),
            link_size,
            keys_per_node,
        );

        Ok(Self {
            heap,
            key_codec,
            data_codec,
            state: TreeState {
                root_pos,
                first_pos,
                last_pos,
            },
            link_size,
            record_capacity: capacity,
            keys_per_node,
        })
    }

    /// Serialize the tree's three-pointer descriptor. The caller decides
    /// where to persist these bytes (a fixed record in the heap file, a
    /// side-channel config entry, etc).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(descriptor_width(self.link_size));
        buf.extend_from_slice(&link_to_bytes(self.state.root_pos, self.link_size));
        buf.extend_from_slice(&link_to_bytes(self.state.first_pos, self.link_size));
        buf.extend_from_slice(&link_to_bytes(self.state.last_pos, self.link_size));
        buf
    }

    fn open_ctx(&mut self) -> Context<'_, K, D> {
        Context::new(
            self.heap.as_mut(),
            self.key_codec.as_ref(),
            self.data_codec.as_ref(),
            self.link_size,
            self.record_capacity,
            self.keys_per_node,
        )
    }

    /// Look up `key`. Returns `(node, containing_element_pos, found)`.
    pub fn search(&mut self, key: &K) -> BTreeResult<(Option<Node<K, D>>, Link, bool)> {
        let state = self.state;
        let mut ctx = self.open_ctx();
        search_node(&state, &mut ctx, key, None)
    }

    /// Iterate all entries in ascending key order.
    pub fn iter_forward(&mut self) -> ForwardIter<'_, K, D> {
        ForwardIter::new(self)
    }

    /// Iterate all entries in descending key order.
    pub fn iter_reverse(&mut self) -> ReverseIter<'_, K, D> {
        ReverseIter::new(self)
    }

    pub(crate) fn first_pos(&self) -> Link {
        self.state.first_pos
    }

    pub(crate) fn last_pos(&self) -> Link {
        self.state.last_pos
    }

    pub(crate) fn read_leaf_entries(
        &mut self,
        pos: Link,
    ) -> BTreeResult<(Vec<Node<K, D>>, Link, Link)> {
        let mut ctx = self.open_ctx();
        let elem = ctx.read_elem(pos)?;
        Ok((elem.nodelist.entries, elem.elem.prev, elem.elem.succ))
    }

    /// Insert `key`/`data`, constructing and flushing its own [`Context`].
    pub fn insert(&mut self, key: K, data: D) -> BTreeResult<()> {
        let mut state = self.state;
        let root_pos = state.root_pos;
        let mut ctx = self.open_ctx();
        let leaf_pos = search_insert_leaf(&mut ctx, root_pos, &key, None)?;
        let node = Node::leaf(key, data);
        insert_to_leaf(&mut state, &mut ctx, node, leaf_pos)?;
        ctx.done()?;
        drop(ctx);
        self.state = state;
        self.heap.flush()
    }

    /// Remove `key`, constructing and flushing its own [`Context`].
    pub fn remove(&mut self, key: &K) -> BTreeResult<()> {
        let mut state = self.state;
        let mut ctx = self.open_ctx();
        let (_, leaf_pos, found) = search_node(&state, &mut ctx, key, None)?;
        if !found {
            return Err(BTreeError::KeyNotFound {
                key: format!("{:?}", key),
            });
        }
        delete_from_leaf(&mut state, &mut ctx, key, leaf_pos)?;
        ctx.done()?;
        drop(ctx);
        self.state = state;
        self.heap.flush()
    }

    /// Insert using a caller-supplied [`Context`], for chaining several
    /// mutations into one write-back unit. The caller is responsible for
    /// calling `ctx.done()` (or letting it drop) and flushing the heap.
    pub fn insert_to_leaf(
        &mut self,
        node: Node<K, D>,
        leaf_pos: Link,
        ctx: &mut Context<'_, K, D>,
    ) -> BTreeResult<(Node<K, D>, Link)> {
        let mut state = self.state;
        let result = insert_to_leaf(&mut state, ctx, node, leaf_pos)?;
        self.state = state;
        Ok(result)
    }

    /// Delete using a caller-supplied [`Context`]; see [`BPlusTree::insert_to_leaf`].
    pub fn delete_from_leaf(
        &mut self,
        key: &K,
        leaf_pos: Link,
        ctx: &mut Context<'_, K, D>,
    ) -> BTreeResult<()> {
        let mut state = self.state;
        delete_from_leaf(&mut state, ctx, key, leaf_pos)?;
        self.state = state;
        Ok(())
    }

    /// Open a fresh [`Context`] for a caller-driven sequence of mutations.
    pub fn context(&mut self) -> Context<'_, K, D> {
        self.open_ctx()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{IntegerCodec, StringCodec};
    use crate::heap::FileHeap;
    use tempfile::NamedTempFile;

    fn new_tree(keys_per_node: usize) -> (NamedTempFile, BPlusTree<String, i64>) {
        let file = NamedTempFile::new().unwrap();
        let heap = FileHeap::create(file.path()).unwrap();
        let tree = BPlusTree::create(
            Box::new(heap),
            Box::new(StringCodec::new(16)),
            Box::new(IntegerCodec),
            keys_per_node,
        )
        .unwrap();
        (file, tree)
    }

    #[test]
    fn insert_and_search_without_split() {
        let (_f, mut tree) = new_tree(8);
        tree.insert("b".to_string(), 2).unwrap();
        tree.insert("a".to_string(), 1).unwrap();
        tree.insert("c".to_string(), 3).unwrap();

        let (node, _pos, found) = tree.search(&"b".to_string()).unwrap();
        assert!(found);
        assert_eq!(node.unwrap().data, Some(2));
    }

    #[test]
    fn insert_causing_leaf_split_builds_new_root() {
        let (_f, mut tree) = new_tree(3);
        for i in 0..10 {
            tree.insert(format!("k{:03}", i), i as i64).unwrap();
        }
        for i in 0..10 {
            let (node, _pos, found) = tree.search(&format!("k{:03}", i)).unwrap();
            assert!(found, "missing k{:03}", i);
            assert_eq!(node.unwrap().data, Some(i as i64));
        }
    }

    #[test]
    fn reverse_order_inserts_stay_searchable() {
        let (_f, mut tree) = new_tree(3);
        for i in (0..20).rev() {
            tree.insert(format!("k{:03}", i), i as i64).unwrap();
        }
        for i in 0..20 {
            let (_, _, found) = tree.search(&format!("k{:03}", i)).unwrap();
            assert!(found);
        }
    }

    #[test]
    fn insert_then_remove_round_trip() {
        let (_f, mut tree) = new_tree(4);
        for i in 0..12 {
            tree.insert(format!("k{:03}", i), i as i64).unwrap();
        }
        for i in (0..12).step_by(2) {
            tree.remove(&format!("k{:03}", i)).unwrap();
        }
        for i in 0..12 {
            let (_, _, found) = tree.search(&format!("k{:03}", i)).unwrap();
            assert_eq!(found, i % 2 != 0, "key k{:03}", i);
        }
    }

    #[test]
    fn deleting_every_inserted_key_empties_the_tree() {
        let (_f, mut tree) = new_tree(4);
        for i in 0..12 {
            tree.insert(format!("k{:03}", i), i as i64).unwrap();
        }
        for i in 0..12 {
            tree.remove(&format!("k{:03}", i)).unwrap();
        }
        for i in 0..12 {
            let (_, _, found) = tree.search(&format!("k{:03}", i)).unwrap();
            assert!(!found, "k{:03} should be gone", i);
        }
        assert_eq!(tree.iter_forward().next(), None);
    }

    #[test]
    fn remove_missing_key_errors() {
        let (_f, mut tree) = new_tree(4);
        tree.insert("a".to_string(), 1).unwrap();
        assert!(tree.remove(&"z".to_string()).is_err());
    }

    #[test]
    fn insert_duplicate_key_errors() {
        let (_f, mut tree) = new_tree(4);
        tree.insert("a".to_string(), 1).unwrap();
        assert!(tree.insert("a".to_string(), 2).is_err());
    }

    #[test]
    fn descriptor_round_trips_across_reopen() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();
        let descriptor;
        {
            let heap = FileHeap::create(&path).unwrap();
            let mut tree = BPlusTree::create(
                Box::new(heap),
                Box::new(StringCodec::new(16)),
                Box::new(IntegerCodec),
                4,
            )
            .unwrap();
            for i in 0..10 {
                tree.insert(format!("k{:03}", i), i as i64).unwrap();
            }
            descriptor = tree.to_bytes();
        }

        let heap = FileHeap::open(&path).unwrap();
        let mut tree: BPlusTree<String, i64> = BPlusTree::from_bytes(
            &descriptor,
            Box::new(heap),
            Box::new(StringCodec::new(16)),
            Box::new(IntegerCodec),
            4,
        )
        .unwrap();
        for i in 0..10 {
            let (_, _, found) = tree.search(&format!("k{:03}", i)).unwrap();
            assert!(found, "missing k{:03} after reopen", i);
        }
    }

    #[test]
    fn forward_and_reverse_iteration_are_ordered() {
        let (_f, mut tree) = new_tree(3);
        let mut keys: Vec<i64> = (0..15).collect();
        for &i in &keys {
            tree.insert(format!("k{:03}", i), i).unwrap();
        }
        let forward: Vec<i64> = tree.iter_forward().map(|(_, d)| d).collect();
        assert_eq!(forward, keys);

        keys.reverse();
        let reverse: Vec<i64> = tree.iter_reverse().map(|(_, d)| d).collect();
        assert_eq!(reverse, keys);
    }
}
