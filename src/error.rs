// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Error types for heap-backed B+Tree operations.
//!
//! Provides structured error handling with detailed context for debugging.

use std::fmt;

/// Standard Result type for all tree and heap operations.
pub type BTreeResult<T> = Result<T, BTreeError>;

/// Error types for B+Tree and heap file operations.
#[derive(Debug, Clone)]
pub enum BTreeError {
    /// Operation attempted before the tree's root/first/last pointers were set.
    NotInitialized,

    /// Insertion target already contains an entry with the given key.
    DuplicateKey { key: String },

    /// Deletion target does not contain an entry with the given key.
    KeyNotFound { key: String },

    /// Key or value could not be encoded/decoded by its codec.
    CodecError { reason: String },

    /// An element, parent pointer, or NodeList violates a tree invariant.
    ///
    /// Indicates either corrupt on-disk state or a library bug. Fatal; callers
    /// should treat the tree as unusable until restored from backup.
    IntegrityViolation { reason: String },

    /// I/O error during heap file operations.
    IoError { operation: String, reason: String },

    /// Heap record failed its CRC32 check on read.
    ChecksumMismatch { pos: u64 },

    /// Heap record header had an unexpected magic value.
    BadMagic { pos: u64 },

    /// Requested allocation or read falls outside the heap file's bounds.
    OutOfBounds { pos: u64, len: usize },

    /// Free-list or slot bookkeeping is inconsistent.
    CorruptedHeap { reason: String },
}

impl fmt::Display for BTreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => {
                write!(f, "tree is not initialized")
            }
            Self::DuplicateKey { key } => {
                write!(f, "duplicate key '{}'", key)
            }
            Self::KeyNotFound { key } => {
                write!(f, "key '{}' not found", key)
            }
            Self::CodecError { reason } => {
                write!(f, "codec error: {}", reason)
            }
            Self::IntegrityViolation { reason } => {
                write!(f, "integrity violation: {}", reason)
            }
            Self::IoError { operation, reason } => {
                write!(f, "I/O error during '{}': {}", operation, reason)
            }
            Self::ChecksumMismatch { pos } => {
                write!(f, "checksum mismatch at offset 0x{:X}", pos)
            }
            Self::BadMagic { pos } => {
                write!(f, "bad magic at offset 0x{:X}", pos)
            }
            Self::OutOfBounds { pos, len } => {
                write!(f, "access at offset 0x{:X} length {} out of bounds", pos, len)
            }
            Self::CorruptedHeap { reason } => {
                write!(f, "heap file corrupted: {}", reason)
            }
        }
    }
}

impl std::error::Error for BTreeError {}

impl From<std::io::Error> for BTreeError {
    fn from(err: std::io::Error) -> Self {
        BTreeError::IoError {
            operation: "unknown".to_string(),
            reason: err.to_string(),
        }
    }
}
