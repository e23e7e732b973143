// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! The B+Tree itself: node/element representation, the operation-scoped
//! write-back context, the core recursive algorithms, the public tree
//! handle, and ordered iteration.

pub mod context;
pub mod element;
pub mod iter;
pub mod node;
pub mod ops;
pub mod tree;

pub use element::{BTreeElement, ElemHeader};
pub use iter::{ForwardIter, ReverseIter};
pub use node::{Node, NodeList};
pub use ops::TreeState;
pub use tree::BPlusTree;
