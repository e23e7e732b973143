// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! heapbtree: a persistent B+Tree index over a heap-allocated file.
//!
//! Leaf and interior nodes are stored as fixed-capacity records in a
//! [`HeapFile`](heap::HeapFile); leaves are additionally threaded into a
//! doubly-linked chain for ordered iteration. The tree itself holds only
//! three file offsets (`root`, `first`, `last`); everything else is read
//! through the heap file on demand.

pub mod btree;
pub mod codec;
pub mod error;
pub mod heap;

pub use btree::{BPlusTree, BTreeElement, ElemHeader, ForwardIter, Node, NodeList, ReverseIter};
pub use codec::{BytesCodec, DataCodec, IntegerCodec, KeyCodec, StringCodec};
pub use error::{BTreeError, BTreeResult};
pub use heap::{FileHeap, HeapFile, Link};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
