// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Ordered iteration over the leaf chain.
//!
//! Both iterators walk one leaf element at a time via `succ`/`prev`,
//! buffering that leaf's entries before advancing. Neither holds a
//! [`Context`](crate::btree::context::Context) open across the whole scan —
//! each leaf is its own small read.

use crate::btree::node::Node;
use crate::btree::tree::BPlusTree;
use crate::heap::Link;
use std::collections::VecDeque;
use std::fmt::Debug;

/// Ascending `(key, data)` iteration from the tree's leftmost leaf.
pub struct ForwardIter<'a, K, D> {
    tree: &'a mut BPlusTree<K, D>,
    next_leaf: Link,
    buffer: VecDeque<Node<K, D>>,
}

impl<'a, K, D> ForwardIter<'a, K, D>
where
    K: Ord + Clone + Debug,
    D: Clone,
{
    pub(crate) fn new(tree: &'a mut BPlusTree<K, D>) -> Self {
        let next_leaf = tree.first_pos();
        Self {
            tree,
            next_leaf,
            buffer: VecDeque::new(),
        }
    }
}

impl<'a, K, D> Iterator for ForwardIter<'a, K, D>
where
    K: Ord + Clone + Debug,
    D: Clone,
{
    type Item = (K, D);

    fn next(&mut self) -> Option<Self::Item> {
        while self.buffer.is_empty() {
            if self.next_leaf == 0 {
                return None;
            }
            let (entries, _prev, succ) = self.tree.read_leaf_entries(self.next_leaf).ok()?;
            self.buffer.extend(entries);
            self.next_leaf = succ;
        }
        let n = self.buffer.pop_front()?;
        Some((n.key, n.data.expect("leaf entry without data")))
    }
}

/// Descending `(key, data)` iteration from the tree's rightmost leaf.
pub struct ReverseIter<'a, K, D> {
    tree: &'a mut BPlusTree<K, D>,
    next_leaf: Link,
    buffer: VecDeque<Node<K, D>>,
}

impl<'a, K, D> ReverseIter<'a, K, D>
where
    K: Ord + Clone + Debug,
    D: Clone,
{
    pub(crate) fn new(tree: &'a mut BPlusTree<K, D>) -> Self {
        let next_leaf = tree.last_pos();
        Self {
            tree,
            next_leaf,
            buffer: VecDeque::new(),
        }
    }
}

impl<'a, K, D> Iterator for ReverseIter<'a, K, D>
where
    K: Ord + Clone + Debug,
    D: Clone,
{
    type Item = (K, D);

    fn next(&mut self) -> Option<Self::Item> {
        while self.buffer.is_empty() {
            if self.next_leaf == 0 {
                return None;
            }
            let (entries, prev, _succ) = self.tree.read_leaf_entries(self.next_leaf).ok()?;
            self.buffer.extend(entries.into_iter().rev());
            self.next_leaf = prev;
        }
        let n = self.buffer.pop_front()?;
        Some((n.key, n.data.expect("leaf entry without data")))
    }
}
