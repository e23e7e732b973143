// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Heap-file allocator: the external collaborator the B+Tree stores its
//! elements through.
//!
//! `HeapFile` is the narrow trait the tree consumes (`alloc`/`read`/`write`/
//! `free`/`flush`/`link_size`). `FileHeap` is this crate's concrete,
//! memory-mapped implementation: a single growable file of variable-capacity
//! slots, each with a small header carrying a magic value, its capacity, the
//! length actually in use, and a CRC32 checksum over that used region.
//!
//! ## Slot layout
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ RecordHeader (24 bytes)                       │
//! ├──────────────────────────────────────────────┤
//! │ data (capacity bytes)                         │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Freed slots are threaded onto a singly linked free list whose head is
//! stored in the file header; the freed slot's own data region carries the
//! `next` pointer while it is unused.

use crate::error::{BTreeError, BTreeResult};
use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// A file offset identifying one heap record. Zero is reserved and never a
/// valid allocation.
pub type Link = u64;

const FILE_MAGIC: u32 = 0x4845_4150; // "HEAP"
const RECORD_MAGIC: u32 = 0xB7EE_0001;
const FILE_HEADER_SIZE: usize = 32;
const RECORD_HEADER_SIZE: usize = 24;
const INITIAL_FILE_SIZE: u64 = 64 * 1024;

/// External collaborator interface the B+Tree stores elements through.
///
/// Implementations own the physical storage; the tree never assumes more
/// than this trait exposes.
pub trait HeapFile {
    /// Allocate a new record capable of holding up to `size` bytes. Returns
    /// its stable handle.
    fn alloc(&mut self, size: usize) -> BTreeResult<Link>;

    /// Read the bytes last written to `pos`.
    fn read(&self, pos: Link) -> BTreeResult<Vec<u8>>;

    /// Overwrite the record at `pos`. `bytes.len()` must not exceed the
    /// capacity requested at `alloc` time.
    fn write(&mut self, pos: Link, bytes: &[u8]) -> BTreeResult<()>;

    /// Release the record at `pos`. When `merge` is true and the record is
    /// the last one physically in the file, its space is reclaimed into the
    /// unallocated tail instead of being free-listed.
    fn free(&mut self, pos: Link, merge: bool) -> BTreeResult<()>;

    /// Flush any buffered writes to the backing medium.
    fn flush(&mut self) -> BTreeResult<()>;

    /// Width in bytes of a `Link` as persisted on disk.
    fn link_size(&self) -> usize;
}

#[repr(C)]
struct FileHeader {
    magic: u32,
    free_head: Link,
    end: Link,
}

impl FileHeader {
    fn to_bytes(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_be_bytes());
        buf[4..12].copy_from_slice(&self.free_head.to_be_bytes());
        buf[12..20].copy_from_slice(&self.end.to_be_bytes());
        buf
    }

    fn from_bytes(bytes: &[u8]) -> BTreeResult<Self> {
        if bytes.len() < FILE_HEADER_SIZE {
            return Err(BTreeError::CorruptedHeap {
                reason: "file header truncated".to_string(),
            });
        }
        let magic = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        if magic != FILE_MAGIC {
            return Err(BTreeError::BadMagic { pos: 0 });
        }
        let free_head = Link::from_be_bytes(bytes[4..12].try_into().unwrap());
        let end = Link::from_be_bytes(bytes[12..20].try_into().unwrap());
        Ok(Self {
            magic,
            free_head,
            end,
        })
    }
}

struct RecordHeader {
    magic: u32,
    capacity: u32,
    used_len: u32,
    checksum: u32,
    free: bool,
}

impl RecordHeader {
    fn to_bytes(&self) -> [u8; RECORD_HEADER_SIZE] {
        let mut buf = [0u8; RECORD_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_be_bytes());
        buf[4..8].copy_from_slice(&self.capacity.to_be_bytes());
        buf[8..12].copy_from_slice(&self.used_len.to_be_bytes());
        buf[12..16].copy_from_slice(&self.checksum.to_be_bytes());
        buf[16] = self.free as u8;
        buf
    }

    fn from_bytes(bytes: &[u8], pos: Link) -> BTreeResult<Self> {
        if bytes.len() < RECORD_HEADER_SIZE {
            return Err(BTreeError::OutOfBounds {
                pos,
                len: bytes.len(),
            });
        }
        let magic = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
        if magic != RECORD_MAGIC {
            return Err(BTreeError::BadMagic { pos });
        }
        let capacity = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
        let used_len = u32::from_be_bytes(bytes[8..12].try_into().unwrap());
        let checksum = u32::from_be_bytes(bytes[12..16].try_into().unwrap());
        let free = bytes[16] != 0;
        Ok(Self {
            magic,
            capacity,
            used_len,
            checksum,
            free,
        })
    }
}

/// Memory-mapped, growable heap file. The reference `HeapFile` backend.
pub struct FileHeap {
    file: File,
    mmap: MmapMut,
    free_head: Link,
    end: Link,
}

impl FileHeap {
    /// Create a fresh heap file at `path`, truncating any existing content.
    pub fn create<P: AsRef<Path>>(path: P) -> BTreeResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(INITIAL_FILE_SIZE)?;
        let mut mmap = unsafe { MmapMut::map_mut(&file)? };

        let header = FileHeader {
            magic: FILE_MAGIC,
            free_head: 0,
            end: FILE_HEADER_SIZE as Link,
        };
        mmap[0..FILE_HEADER_SIZE].copy_from_slice(&header.to_bytes());
        mmap.flush()?;

        Ok(Self {
            file,
            mmap,
            free_head: header.free_head,
            end: header.end,
        })
    }

    /// Open an existing heap file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> BTreeResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        let header = FileHeader::from_bytes(&mmap[0..FILE_HEADER_SIZE])?;

        Ok(Self {
            file,
            mmap,
            free_head: header.free_head,
            end: header.end,
        })
    }

    fn persist_file_header(&mut self) -> BTreeResult<()> {
        let header = FileHeader {
            magic: FILE_MAGIC,
            free_head: self.free_head,
            end: self.end,
        };
        self.mmap[0..FILE_HEADER_SIZE].copy_from_slice(&header.to_bytes());
        Ok(())
    }

    fn ensure_capacity(&mut self, required_end: u64) -> BTreeResult<()> {
        if required_end <= self.mmap.len() as u64 {
            return Ok(());
        }
        let mut new_len = (self.mmap.len() as u64).max(INITIAL_FILE_SIZE);
        while new_len < required_end {
            new_len *= 2;
        }
        self.file.set_len(new_len)?;
        self.mmap = unsafe { MmapMut::map_mut(&self.file)? };
        Ok(())
    }

    fn read_record_header(&self, pos: Link) -> BTreeResult<RecordHeader> {
        let start = pos as usize;
        if start + RECORD_HEADER_SIZE > self.mmap.len() {
            return Err(BTreeError::OutOfBounds {
                pos,
                len: RECORD_HEADER_SIZE,
            });
        }
        RecordHeader::from_bytes(&self.mmap[start..start + RECORD_HEADER_SIZE], pos)
    }

    fn write_record_header(&mut self, pos: Link, header: &RecordHeader) {
        let start = pos as usize;
        self.mmap[start..start + RECORD_HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }

    fn data_range(pos: Link, capacity: u32) -> (usize, usize) {
        let start = pos as usize + RECORD_HEADER_SIZE;
        (start, start + capacity as usize)
    }
}

impl HeapFile for FileHeap {
    fn alloc(&mut self, size: usize) -> BTreeResult<Link> {
        // best-fit linear scan of the free list
        let mut prev: Option<Link> = None;
        let mut cursor = self.free_head;
        while cursor != 0 {
            let header = self.read_record_header(cursor)?;
            if !header.free {
                return Err(BTreeError::CorruptedHeap {
                    reason: format!("free list entry at 0x{:X} is not marked free", cursor),
                });
            }
            if header.capacity as usize >= size {
                let (data_start, _) = Self::data_range(cursor, header.capacity);
                let mut next_buf = [0u8; 8];
                next_buf.copy_from_slice(&self.mmap[data_start..data_start + 8]);
                let next = Link::from_be_bytes(next_buf);

                match prev {
                    Some(p) => {
                        let p_header = self.read_record_header(p)?;
                        let (p_data_start, _) = Self::data_range(p, p_header.capacity);
                        self.mmap[p_data_start..p_data_start + 8]
                            .copy_from_slice(&next.to_be_bytes());
                    }
                    None => {
                        self.free_head = next;
                    }
                }

                let new_header = RecordHeader {
                    magic: RECORD_MAGIC,
                    capacity: header.capacity,
                    used_len: 0,
                    checksum: crc32fast::hash(&[]),
                    free: false,
                };
                self.write_record_header(cursor, &new_header);
                self.persist_file_header()?;
                return Ok(cursor);
            }
            prev = Some(cursor);
            cursor = {
                let (data_start, _) = Self::data_range(cursor, header.capacity);
                let mut next_buf = [0u8; 8];
                next_buf.copy_from_slice(&self.mmap[data_start..data_start + 8]);
                Link::from_be_bytes(next_buf)
            };
        }

        // no free slot large enough: grow the file
        let pos = self.end;
        let required_end = pos + RECORD_HEADER_SIZE as u64 + size as u64;
        self.ensure_capacity(required_end)?;

        let header = RecordHeader {
            magic: RECORD_MAGIC,
            capacity: size as u32,
            used_len: 0,
            checksum: crc32fast::hash(&[]),
            free: false,
        };
        self.write_record_header(pos, &header);
        self.end = required_end;
        self.persist_file_header()?;
        Ok(pos)
    }

    fn read(&self, pos: Link) -> BTreeResult<Vec<u8>> {
        let header = self.read_record_header(pos)?;
        if header.free {
            return Err(BTreeError::CorruptedHeap {
                reason: format!("read of freed record at 0x{:X}", pos),
            });
        }
        let (data_start, _) = Self::data_range(pos, header.capacity);
        let used = header.used_len as usize;
        if data_start + used > self.mmap.len() {
            return Err(BTreeError::OutOfBounds {
                pos,
                len: used,
            });
        }
        let data = &self.mmap[data_start..data_start + used];
        let checksum = crc32fast::hash(data);
        if checksum != header.checksum {
            return Err(BTreeError::ChecksumMismatch { pos });
        }
        Ok(data.to_vec())
    }

    fn write(&mut self, pos: Link, bytes: &[u8]) -> BTreeResult<()> {
        let header = self.read_record_header(pos)?;
        if bytes.len() > header.capacity as usize {
            return Err(BTreeError::OutOfBounds {
                pos,
                len: bytes.len(),
            });
        }
        let (data_start, data_end) = Self::data_range(pos, header.capacity);
        self.mmap[data_start..data_start + bytes.len()].copy_from_slice(bytes);
        if bytes.len() < header.capacity as usize {
            self.mmap[data_start + bytes.len()..data_end].fill(0);
        }

        let new_header = RecordHeader {
            magic: RECORD_MAGIC,
            capacity: header.capacity,
            used_len: bytes.len() as u32,
            checksum: crc32fast::hash(bytes),
            free: false,
        };
        self.write_record_header(pos, &new_header);
        Ok(())
    }

    fn free(&mut self, pos: Link, merge: bool) -> BTreeResult<()> {
        let header = self.read_record_header(pos)?;
        if header.free {
            return Err(BTreeError::CorruptedHeap {
                reason: format!("double free at 0x{:X}", pos),
            });
        }

        let tail_end = pos + RECORD_HEADER_SIZE as u64 + header.capacity as u64;
        if merge && tail_end == self.end {
            self.end = pos;
            self.persist_file_header()?;
            return Ok(());
        }

        let (data_start, _) = Self::data_range(pos, header.capacity);
        self.mmap[data_start..data_start + 8].copy_from_slice(&self.free_head.to_be_bytes());

        let new_header = RecordHeader {
            magic: RECORD_MAGIC,
            capacity: header.capacity,
            used_len: 0,
            checksum: crc32fast::hash(&[]),
            free: true,
        };
        self.write_record_header(pos, &new_header);
        self.free_head = pos;
        self.persist_file_header()?;
        Ok(())
    }

    fn flush(&mut self) -> BTreeResult<()> {
        self.mmap.flush().map_err(|e| BTreeError::IoError {
            operation: "flush".to_string(),
            reason: e.to_string(),
        })
    }

    fn link_size(&self) -> usize {
        8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn temp_heap() -> (NamedTempFile, FileHeap) {
        let file = NamedTempFile::new().unwrap();
        let heap = FileHeap::create(file.path()).unwrap();
        (file, heap)
    }

    #[test]
    fn alloc_read_write_round_trip() {
        let (_f, mut heap) = temp_heap();
        let pos = heap.alloc(64).unwrap();
        heap.write(pos, b"hello world").unwrap();
        assert_eq!(heap.read(pos).unwrap(), b"hello world");
    }

    #[test]
    fn free_then_alloc_reuses_slot() {
        let (_f, mut heap) = temp_heap();
        let a = heap.alloc(32).unwrap();
        heap.write(a, b"first").unwrap();
        heap.free(a, false).unwrap();
        let b = heap.alloc(32).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn free_with_merge_reclaims_tail() {
        let (_f, mut heap) = temp_heap();
        let end_before = heap.end;
        let a = heap.alloc(32).unwrap();
        heap.free(a, true).unwrap();
        assert_eq!(heap.end, end_before);
        assert_eq!(heap.free_head, 0);
    }

    #[test]
    fn checksum_mismatch_detected() {
        let (_f, mut heap) = temp_heap();
        let pos = heap.alloc(32).unwrap();
        heap.write(pos, b"data").unwrap();
        let (data_start, _) = FileHeap::data_range(pos, 32);
        heap.mmap[data_start] ^= 0xFF;
        assert!(matches!(
            heap.read(pos),
            Err(BTreeError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn grow_by_remap_across_initial_size() {
        let (_f, mut heap) = temp_heap();
        let big = (INITIAL_FILE_SIZE as usize) + 4096;
        let pos = heap.alloc(big).unwrap();
        heap.write(pos, &vec![7u8; big]).unwrap();
        assert_eq!(heap.read(pos).unwrap(), vec![7u8; big]);
    }

    #[test]
    fn reopen_preserves_data() {
        let file = NamedTempFile::new().unwrap();
        let pos;
        {
            let mut heap = FileHeap::create(file.path()).unwrap();
            pos = heap.alloc(16).unwrap();
            heap.write(pos, b"persisted").unwrap();
            heap.flush().unwrap();
        }
        let heap = FileHeap::open(file.path()).unwrap();
        assert_eq!(heap.read(pos).unwrap(), b"persisted");
    }
}
