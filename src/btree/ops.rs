// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Core recursive B+Tree algorithms.
//!
//! These are free functions rather than `BPlusTree` methods: each takes the
//! tree's mutable root/first/last pointers (`TreeState`) and an operation's
//! [`Context`] as separate borrows. Keeping them free functions means the
//! borrow checker sees two independent `&mut` parameters instead of nested
//! `&mut self` calls through a [`Context`] that already holds a disjoint
//! borrow of the tree's heap file.

use crate::btree::context::Context;
use crate::btree::element::BTreeElement;
use crate::btree::node::Node;
use crate::error::{BTreeError, BTreeResult};
use crate::heap::Link;
use std::fmt::Debug;

/// The tree's three persistent pointers. Everything else is derived from the
/// heap file on demand.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeState {
    pub root_pos: Link,
    pub first_pos: Link,
    pub last_pos: Link,
}

/// Descend from `npos` (or the root) looking for `key`.
///
/// Returns `(node_if_found, containing_element_pos, found)`. The containing
/// element is always a leaf list (or the empty root).
pub fn search_node<K, D>(
    state: &TreeState,
    ctx: &mut Context<K, D>,
    key: &K,
    npos: Option<Link>,
) -> BTreeResult<(Option<Node<K, D>>, Link, bool)>
where
    K: Ord + Clone + Debug,
    D: Clone,
{
    if state.root_pos == 0 {
        return Err(BTreeError::NotInitialized);
    }
    let npos = npos.unwrap_or(state.root_pos);
    let elem = ctx.read_elem(npos)?;

    if elem.nodelist.is_empty() {
        if npos != state.root_pos {
            return Err(BTreeError::IntegrityViolation {
                reason: format!("empty non-root element at 0x{:X}", npos),
            });
        }
        return Ok((None, npos, false));
    }

    if elem.nodelist.entries[0].leaf {
        for n in &elem.nodelist.entries {
            if &n.key == key {
                return Ok((Some(n.clone()), npos, true));
            }
        }
        return Ok((None, npos, false));
    }

    for n in &elem.nodelist.entries {
        if key <= &n.key {
            return search_node(state, ctx, key, Some(n.left));
        }
    }

    let rpos = elem.nodelist.last().unwrap().right;
    if rpos == 0 {
        return Ok((None, npos, false));
    }
    search_node(state, ctx, key, Some(rpos))
}

/// Descend from `npos` (or the root) to the leaf list that `key` belongs in,
/// without checking whether `key` is already present.
pub fn search_insert_leaf<K, D>(
    ctx: &mut Context<K, D>,
    root_pos: Link,
    key: &K,
    npos: Option<Link>,
) -> BTreeResult<Link>
where
    K: Ord + Clone + Debug,
    D: Clone,
{
    if root_pos == 0 {
        return Err(BTreeError::NotInitialized);
    }
    let npos = npos.unwrap_or(root_pos);
    let elem = ctx.read_elem(npos)?;

    if elem.nodelist.is_empty() || elem.nodelist.entries[0].leaf {
        return Ok(npos);
    }

    for n in &elem.nodelist.entries {
        if key <= &n.key {
            return search_insert_leaf(ctx, root_pos, key, Some(n.left));
        }
    }

    let rpos = elem.nodelist.last().unwrap().right;
    search_insert_leaf(ctx, root_pos, key, Some(rpos))
}

/// Re-parent every child referenced by `nl`'s own entries (via `left`, and
/// via the trailing entry's `right`) to point at `nl`.
///
/// Must run on every newly built or newly split container before the split
/// propagates further up, since a cascading split determines membership of
/// a child in the new left or new right half purely by which one's entries
/// still reference it — this scan *is* that membership check.
pub fn update_childs<K, D>(ctx: &mut Context<K, D>, nl: &BTreeElement<K, D>) -> BTreeResult<()>
where
    K: Ord + Clone + Debug,
    D: Clone,
{
    for n in &nl.nodelist.entries {
        if n.left == 0 {
            continue;
        }
        let mut child = ctx.read_elem(n.left)?;
        child.nodelist.parent = nl.elem.pos;
        ctx.write_elem(child);
    }
    if let Some(last) = nl.nodelist.last() {
        if last.right != 0 {
            let mut child = ctx.read_elem(last.right)?;
            child.nodelist.parent = nl.elem.pos;
            ctx.write_elem(child);
        }
    }
    Ok(())
}

/// Insert `node` into the leaf list at `leaf_pos`, splitting (and cascading
/// into the parent chain) as needed. Returns the inserted node and the
/// position of whichever leaf half now holds it.
pub fn insert_to_leaf<K, D>(
    state: &mut TreeState,
    ctx: &mut Context<K, D>,
    node: Node<K, D>,
    leaf_pos: Link,
) -> BTreeResult<(Node<K, D>, Link)>
where
    K: Ord + Clone + Debug,
    D: Clone,
{
    let mut right = ctx.read_elem(leaf_pos)?;

    if !right.nodelist.is_empty() && !right.nodelist.entries[0].leaf {
        return Err(BTreeError::IntegrityViolation {
            reason: format!("insert_to_leaf target at 0x{:X} holds interior entries", leaf_pos),
        });
    }

    right.nodelist.insert(node.clone())?;

    if right.nodelist.len() <= ctx.keys_per_node {
        ctx.write_elem(right);
        return Ok((node, leaf_pos));
    }

    let mut left = ctx.create_empty_list()?;
    let split_pos = ctx.keys_per_node / 2;
    let right_half = right.nodelist.split_at(split_pos);
    left.nodelist = std::mem::replace(&mut right.nodelist, right_half);

    left.elem.insert_before(&mut right.elem);

    ctx.write_elem(left.clone());
    ctx.write_elem(right.clone());

    if left.elem.prev != 0 {
        let mut prev = ctx.read_dll_elem(left.elem.prev)?;
        prev.succ = left.elem.pos;
        ctx.write_dll_elem(prev)?;
    }
    if right.elem.succ != 0 {
        let mut succ = ctx.read_dll_elem(right.elem.succ)?;
        succ.prev = right.elem.pos;
        ctx.write_dll_elem(succ)?;
    }
    if left.elem.prev == 0 {
        state.first_pos = left.elem.pos;
    }
    if right.elem.succ == 0 {
        state.last_pos = right.elem.pos;
    }

    insert_to_inner(state, ctx, &left, &right)?;

    let target = if left.nodelist.find_key(&node.key).is_some() {
        left.elem.pos
    } else {
        right.elem.pos
    };
    Ok((node, target))
}

/// Propagate a split upward: promote the separator between `left` and
/// `right` into their shared parent, splitting that parent (and recursing)
/// if it overflows.
///
/// `left` and `right` are read-only here: all persistence happens through
/// `ctx`, and `update_childs` is the sole mechanism that fixes up a child's
/// `parent` pointer — including `left`'s and `right`'s own, once they
/// become entries of a (possibly freshly split) parent. Callers that need
/// `left`/`right`'s authoritative state afterward re-read it via `ctx`
/// rather than trust a value threaded back through a return.
pub fn insert_to_inner<K, D>(
    state: &mut TreeState,
    ctx: &mut Context<K, D>,
    left: &BTreeElement<K, D>,
    right: &BTreeElement<K, D>,
) -> BTreeResult<()>
where
    K: Ord + Clone + Debug,
    D: Clone,
{
    let parent_pos = left.nodelist.parent;
    if parent_pos != right.nodelist.parent {
        return Err(BTreeError::IntegrityViolation {
            reason: "split siblings have different parents".to_string(),
        });
    }

    let sep_key = left
        .nodelist
        .last()
        .ok_or_else(|| BTreeError::IntegrityViolation {
            reason: "left half of a split is empty".to_string(),
        })?
        .key
        .clone();

    if parent_pos == 0 {
        let mut root = ctx.create_empty_list()?;
        let sep = Node::interior(sep_key, left.elem.pos, right.elem.pos);
        root.nodelist.insert(sep)?;
        ctx.write_elem(root.clone());
        state.root_pos = root.elem.pos;
        update_childs(ctx, &root)?;
        return Ok(());
    }

    let mut parent = ctx.read_elem(parent_pos)?;
    let mut sep = Node::interior(sep_key, left.elem.pos, 0);

    let becomes_new_last = {
        let last = parent
            .nodelist
            .last()
            .ok_or_else(|| BTreeError::IntegrityViolation {
                reason: format!("parent 0x{:X} has no entries", parent_pos),
            })?;
        sep.key > last.key
    };
    if becomes_new_last {
        let last = parent.nodelist.last_mut().unwrap();
        sep.right = last.right;
        last.right = 0;
    }

    parent.nodelist.insert(sep)?;

    if becomes_new_last && parent.nodelist.last().unwrap().left != left.elem.pos {
        return Err(BTreeError::IntegrityViolation {
            reason: "inserted separator is not the new last entry".to_string(),
        });
    }

    if parent.nodelist.len() <= ctx.keys_per_node {
        ctx.write_elem(parent.clone());
        update_childs(ctx, &parent)?;
        return Ok(());
    }

    let mut new_left = ctx.create_empty_list()?;
    let split_pos = ctx.keys_per_node / 2;
    let right_half = parent.nodelist.split_at(split_pos);
    new_left.nodelist = std::mem::replace(&mut parent.nodelist, right_half);
    let new_right = parent;

    ctx.write_elem(new_left.clone());
    ctx.write_elem(new_right.clone());

    update_childs(ctx, &new_left)?;
    update_childs(ctx, &new_right)?;

    insert_to_inner(state, ctx, &new_left, &new_right)
}

/// Remove `key` from the leaf list at `leaf_pos`. If the leaf becomes empty
/// it is unlinked from the leaf chain and freed, and the dangling separator
/// is removed from its parent (recursively, up to the root).
pub fn delete_from_leaf<K, D>(
    state: &mut TreeState,
    ctx: &mut Context<K, D>,
    key: &K,
    leaf_pos: Link,
) -> BTreeResult<()>
where
    K: Ord + Clone + Debug,
    D: Clone,
{
    let mut leaf = ctx.read_elem(leaf_pos)?;
    leaf.nodelist.remove_key(key)?;

    if !leaf.nodelist.is_empty() {
        ctx.write_elem(leaf);
        return Ok(());
    }

    if leaf.nodelist.parent == 0 {
        // the root leaf is allowed to be empty
        ctx.write_elem(leaf);
        return Ok(());
    }

    let prev_pos = leaf.elem.prev;
    let succ_pos = leaf.elem.succ;

    if prev_pos != 0 {
        let mut prev = ctx.read_dll_elem(prev_pos)?;
        prev.succ = succ_pos;
        ctx.write_dll_elem(prev)?;
    } else {
        state.first_pos = succ_pos;
    }

    if succ_pos != 0 {
        let mut succ = ctx.read_dll_elem(succ_pos)?;
        succ.prev = prev_pos;
        ctx.write_dll_elem(succ)?;
    } else {
        state.last_pos = prev_pos;
    }

    let parent_pos = leaf.nodelist.parent;
    let this_pos = leaf.elem.pos;
    ctx.free_elem(this_pos, true)?;
    delete_from_inner(state, ctx, this_pos, parent_pos)
}

/// Remove the routing entry in the interior list at `pos` that references
/// `child_pos`, freeing and recursing upward if that leaves `pos` empty.
///
/// If the removed entry was the sole remaining one and itself carried a
/// trailing `right`, that subtree cannot simply be dropped: it is re-homed
/// into `pos`'s own slot in the grandparent (or promoted to the tree root,
/// if `pos` had no parent) before `pos` is freed.
pub fn delete_from_inner<K, D>(
    state: &mut TreeState,
    ctx: &mut Context<K, D>,
    child_pos: Link,
    pos: Link,
) -> BTreeResult<()>
where
    K: Ord + Clone + Debug,
    D: Clone,
{
    let mut inner = ctx.read_elem(pos)?;

    let left_idx = inner.nodelist.entries.iter().position(|n| n.left == child_pos);

    let orphaned_right = if let Some(idx) = left_idx {
        let is_last = idx == inner.nodelist.entries.len() - 1;
        let inherited_right = if is_last {
            inner.nodelist.entries[idx].right
        } else {
            0
        };
        inner.nodelist.entries.remove(idx);
        if inherited_right == 0 {
            None
        } else {
            match inner.nodelist.entries.last_mut() {
                Some(new_last) => {
                    new_last.right = inherited_right;
                    None
                }
                None => Some(inherited_right),
            }
        }
    } else {
        let trailing_match = inner
            .nodelist
            .last()
            .map(|n| n.right == child_pos)
            .unwrap_or(false);
        if !trailing_match {
            return Err(BTreeError::IntegrityViolation {
                reason: format!(
                    "child 0x{:X} not referenced by parent 0x{:X}",
                    child_pos, pos
                ),
            });
        }
        inner.nodelist.last_mut().unwrap().right = 0;
        None
    };

    if !inner.nodelist.is_empty() {
        ctx.write_elem(inner);
        return Ok(());
    }

    if let Some(orphan) = orphaned_right {
        let this_pos = inner.elem.pos;

        if inner.nodelist.parent == 0 {
            let mut orphan_elem = ctx.read_elem(orphan)?;
            orphan_elem.nodelist.parent = 0;
            ctx.write_elem(orphan_elem);
            state.root_pos = orphan;
            ctx.free_elem(this_pos, true)?;
            return Ok(());
        }

        let grandparent_pos = inner.nodelist.parent;
        let mut grandparent = ctx.read_elem(grandparent_pos)?;
        let mut retargeted = false;
        for n in grandparent.nodelist.entries.iter_mut() {
            if n.left == this_pos {
                n.left = orphan;
                retargeted = true;
                break;
            }
        }
        if !retargeted {
            if let Some(last) = grandparent.nodelist.last_mut() {
                if last.right == this_pos {
                    last.right = orphan;
                    retargeted = true;
                }
            }
        }
        if !retargeted {
            return Err(BTreeError::IntegrityViolation {
                reason: format!(
                    "emptied child 0x{:X} not referenced by its parent 0x{:X}",
                    this_pos, grandparent_pos
                ),
            });
        }
        ctx.write_elem(grandparent);

        let mut orphan_elem = ctx.read_elem(orphan)?;
        orphan_elem.nodelist.parent = grandparent_pos;
        ctx.write_elem(orphan_elem);

        ctx.free_elem(this_pos, true)?;
        return Ok(());
    }

    if inner.nodelist.parent == 0 {
        ctx.write_elem(inner);
        return Ok(());
    }

    let parent_pos = inner.nodelist.parent;
    let this_pos = inner.elem.pos;
    ctx.free_elem(this_pos, true)?;
    delete_from_inner(state, ctx, this_pos, parent_pos)
}
