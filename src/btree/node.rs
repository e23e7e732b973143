// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Node and NodeList: the in-memory representation of one heap record's
//! routing/leaf entries.
//!
//! A NodeList is always homogeneous (all leaf or all interior) and sorted
//! ascending by key. Interior entries route via `left` (keys ≤ `key`); only
//! the last interior entry in a list additionally carries `right` (keys >
//! `key`).

use crate::codec::{DataCodec, KeyCodec};
use crate::error::{BTreeError, BTreeResult};
use crate::heap::Link;

/// One routing or leaf entry inside a NodeList.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node<K, D> {
    pub key: K,
    pub leaf: bool,
    pub data: Option<D>,
    pub left: Link,
    pub right: Link,
}

impl<K, D> Node<K, D> {
    /// Construct a leaf entry.
    pub fn leaf(key: K, data: D) -> Self {
        Self {
            key,
            leaf: true,
            data: Some(data),
            left: 0,
            right: 0,
        }
    }

    /// Construct an interior (routing) entry.
    pub fn interior(key: K, left: Link, right: Link) -> Self {
        Self {
            key,
            leaf: false,
            data: None,
            left,
            right,
        }
    }

    pub fn set_right(&mut self, right: Link) {
        self.right = right;
    }
}

/// Ordered sequence of entries sharing one parent pointer.
#[derive(Debug, Clone, Default)]
pub struct NodeList<K, D> {
    pub parent: Link,
    pub entries: Vec<Node<K, D>>,
}

impl<K: Ord + Clone + std::fmt::Debug, D: Clone> NodeList<K, D> {
    pub fn new(parent: Link) -> Self {
        Self {
            parent,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if every entry is a leaf entry (vacuously true for an empty list).
    pub fn is_leaf_list(&self) -> bool {
        self.entries.iter().all(|n| n.leaf)
    }

    /// Insert `node` at its ordered position. Rejects a duplicate key.
    pub fn insert(&mut self, node: Node<K, D>) -> BTreeResult<()> {
        let pos = self.entries.partition_point(|n| n.key < node.key);
        if pos < self.entries.len() && self.entries[pos].key == node.key {
            return Err(BTreeError::DuplicateKey {
                key: Self::debug_key(&node.key),
            });
        }
        self.entries.insert(pos, node);
        Ok(())
    }

    fn debug_key(k: &K) -> String {
        format!("{:?}", k)
    }

    /// Index of the entry whose key equals `key`, if any.
    pub fn find_key(&self, key: &K) -> Option<usize> {
        let pos = self.entries.partition_point(|n| &n.key < key);
        if pos < self.entries.len() && &self.entries[pos].key == key {
            Some(pos)
        } else {
            None
        }
    }

    /// Remove and return the entry whose key equals `key`.
    pub fn remove_key(&mut self, key: &K) -> BTreeResult<Node<K, D>> {
        match self.find_key(key) {
            Some(idx) => Ok(self.entries.remove(idx)),
            None => Err(BTreeError::KeyNotFound {
                key: Self::debug_key(key),
            }),
        }
    }

    /// Split into two lists at `at`: `self` keeps `[0, at)`, the returned
    /// list holds `[at, len)`. Both share `self.parent` until the caller
    /// reassigns it.
    pub fn split_at(&mut self, at: usize) -> NodeList<K, D> {
        let right_entries = self.entries.split_off(at);
        NodeList {
            parent: self.parent,
            entries: right_entries,
        }
    }

    pub fn last(&self) -> Option<&Node<K, D>> {
        self.entries.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut Node<K, D>> {
        self.entries.last_mut()
    }

    /// Encode to the fixed-width on-disk layout: `count:u16, parent:link`,
    /// then `count` entries of `flags:u8, key, data, left:link, right:link`.
    pub fn to_bytes(
        &self,
        key_codec: &dyn KeyCodec<K>,
        data_codec: &dyn DataCodec<D>,
        link_size: usize,
    ) -> BTreeResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(entry_width(key_codec, data_codec, link_size) * self.entries.len() + 2 + link_size);
        buf.extend_from_slice(&(self.entries.len() as u16).to_be_bytes());
        buf.extend_from_slice(&link_to_bytes(self.parent, link_size));

        for n in &self.entries {
            buf.push(n.leaf as u8);
            buf.extend_from_slice(&key_codec.encode(&n.key)?);
            match &n.data {
                Some(d) => buf.extend_from_slice(&data_codec.encode(d)?),
                None => buf.extend(std::iter::repeat(0u8).take(data_codec.width())),
            }
            buf.extend_from_slice(&link_to_bytes(n.left, link_size));
            buf.extend_from_slice(&link_to_bytes(n.right, link_size));
        }
        Ok(buf)
    }

    /// Decode from the layout produced by [`to_bytes`].
    pub fn from_bytes(
        bytes: &[u8],
        parent_out: &mut Link,
        key_codec: &dyn KeyCodec<K>,
        data_codec: &dyn DataCodec<D>,
        link_size: usize,
    ) -> BTreeResult<Self> {
        if bytes.len() < 2 + link_size {
            return Err(BTreeError::IntegrityViolation {
                reason: "nodelist header truncated".to_string(),
            });
        }
        let count = u16::from_be_bytes(bytes[0..2].try_into().unwrap()) as usize;
        let parent = link_from_bytes(&bytes[2..2 + link_size]);
        *parent_out = parent;

        let width = entry_width(key_codec, data_codec, link_size);
        let mut offset = 2 + link_size;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            if offset + width > bytes.len() {
                return Err(BTreeError::IntegrityViolation {
                    reason: "nodelist entry truncated".to_string(),
                });
            }
            let flags = bytes[offset];
            let leaf = flags & 0x01 != 0;
            let mut cur = offset + 1;

            let key = key_codec.decode(&bytes[cur..cur + key_codec.width()])?;
            cur += key_codec.width();

            let data_bytes = &bytes[cur..cur + data_codec.width()];
            let data = if leaf {
                Some(data_codec.decode(data_bytes)?)
            } else {
                None
            };
            cur += data_codec.width();

            let left = link_from_bytes(&bytes[cur..cur + link_size]);
            cur += link_size;
            let right = link_from_bytes(&bytes[cur..cur + link_size]);

            entries.push(Node {
                key,
                leaf,
                data,
                left,
                right,
            });
            offset += width;
        }

        Ok(Self { parent, entries })
    }
}

impl<K, D> std::ops::Index<usize> for NodeList<K, D> {
    type Output = Node<K, D>;
    fn index(&self, idx: usize) -> &Node<K, D> {
        &self.entries[idx]
    }
}

pub fn entry_width<K, D>(
    key_codec: &dyn KeyCodec<K>,
    data_codec: &dyn DataCodec<D>,
    link_size: usize,
) -> usize {
    1 + key_codec.width() + data_codec.width() + 2 * link_size
}

pub fn link_to_bytes(link: Link, link_size: usize) -> Vec<u8> {
    let full = link.to_be_bytes();
    full[8 - link_size..].to_vec()
}

pub fn link_from_bytes(bytes: &[u8]) -> Link {
    let mut buf = [0u8; 8];
    buf[8 - bytes.len()..].copy_from_slice(bytes);
    Link::from_be_bytes(buf)
}

/// Total on-disk size of one BTreeElement record for a tree with the given
/// parameters: `elem header (2*link) + nodelist header (2+link) + keys_per_node * entry`.
pub fn record_capacity<K, D>(
    key_codec: &dyn KeyCodec<K>,
    data_codec: &dyn DataCodec<D>,
    link_size: usize,
    keys_per_node: usize,
) -> usize {
    2 * link_size + 2 + link_size + keys_per_node * entry_width(key_codec, data_codec, link_size)
}
