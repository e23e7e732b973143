// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! The doubly-linked-list element header and the BTreeElement it is embedded
//! in: one heap record = one `ElemHeader` plus one `NodeList`.

use crate::btree::node::{link_from_bytes, link_to_bytes, NodeList};
use crate::codec::{DataCodec, KeyCodec};
use crate::error::BTreeResult;
use crate::heap::Link;

/// Doubly-linked-list participation of one element. `pos` is the element's
/// own heap handle and is not persisted — it equals the record's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElemHeader {
    pub pos: Link,
    pub prev: Link,
    pub succ: Link,
}

impl ElemHeader {
    pub fn new(pos: Link) -> Self {
        Self {
            pos,
            prev: 0,
            succ: 0,
        }
    }

    /// Splice `self` into the list immediately before `other`: `self.prev`
    /// takes over `other`'s old predecessor slot, `self.succ` points at
    /// `other`, and `other.prev` points back at `self`.
    ///
    /// Does not touch the old predecessor's `succ` or the list's head/tail
    /// bookkeeping — callers update those afterward with the positions
    /// returned here.
    pub fn insert_before(&mut self, other: &mut ElemHeader) {
        self.prev = other.prev;
        self.succ = other.pos;
        other.prev = self.pos;
    }
}

/// One heap record: a linked-list element header plus its NodeList payload.
#[derive(Debug, Clone)]
pub struct BTreeElement<K, D> {
    pub elem: ElemHeader,
    pub nodelist: NodeList<K, D>,
}

impl<K: Ord + Clone + std::fmt::Debug, D: Clone> BTreeElement<K, D> {
    pub fn new_empty(pos: Link) -> Self {
        Self {
            elem: ElemHeader::new(pos),
            nodelist: NodeList::new(0),
        }
    }

    /// Encode to the on-disk record payload: `prev:link, succ:link`, then the
    /// NodeList's own encoding. `pos` is not written — it is the handle the
    /// heap file already indexes this record by.
    pub fn to_bytes(
        &self,
        key_codec: &dyn KeyCodec<K>,
        data_codec: &dyn DataCodec<D>,
        link_size: usize,
    ) -> BTreeResult<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&link_to_bytes(self.elem.prev, link_size));
        buf.extend_from_slice(&link_to_bytes(self.elem.succ, link_size));
        buf.extend_from_slice(&self.nodelist.to_bytes(key_codec, data_codec, link_size)?);
        Ok(buf)
    }

    /// Decode a record payload previously produced by [`to_bytes`]. `pos` is
    /// supplied by the caller (the heap handle the bytes were read from).
    pub fn from_bytes(
        bytes: &[u8],
        pos: Link,
        key_codec: &dyn KeyCodec<K>,
        data_codec: &dyn DataCodec<D>,
        link_size: usize,
    ) -> BTreeResult<Self> {
        let prev = link_from_bytes(&bytes[0..link_size]);
        let succ = link_from_bytes(&bytes[link_size..2 * link_size]);
        let mut parent = 0;
        let nodelist = NodeList::from_bytes(
            &bytes[2 * link_size..],
            &mut parent,
            key_codec,
            data_codec,
            link_size,
        )?;
        Ok(Self {
            elem: ElemHeader { pos, prev, succ },
            nodelist,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::node::Node;
    use crate::codec::{IntegerCodec, StringCodec};

    #[test]
    fn insert_before_links_correctly() {
        let mut right = ElemHeader::new(200);
        right.prev = 100;
        let mut left = ElemHeader::new(150);
        left.insert_before(&mut right);
        assert_eq!(left.prev, 100);
        assert_eq!(left.succ, 200);
        assert_eq!(right.prev, 150);
    }

    #[test]
    fn element_round_trips_through_bytes() {
        let key_codec = StringCodec::new(8);
        let data_codec = IntegerCodec;
        let mut elem: BTreeElement<String, i64> = BTreeElement::new_empty(64);
        elem.elem.prev = 10;
        elem.elem.succ = 20;
        elem.nodelist.parent = 5;
        elem.nodelist
            .insert(Node::leaf("k".to_string(), 9))
            .unwrap();

        let bytes = elem.to_bytes(&key_codec, &data_codec, 8).unwrap();
        let decoded: BTreeElement<String, i64> =
            BTreeElement::from_bytes(&bytes, 64, &key_codec, &data_codec, 8).unwrap();

        assert_eq!(decoded.elem.pos, 64);
        assert_eq!(decoded.elem.prev, 10);
        assert_eq!(decoded.elem.succ, 20);
        assert_eq!(decoded.nodelist.parent, 5);
        assert_eq!(decoded.nodelist.entries[0].key, "k");
    }
}
