//! Test utilities for integration tests.
//!
//! This module provides store wrappers that observe or sabotage I/O, and a
//! byte-level builder for TIFF files laid out the way other writers lay them
//! out (image data first, values scattered), which the engine itself never
//! produces.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use tiff_ifd_writer::error::IoError;
use tiff_ifd_writer::io::{MemoryStore, RandomAccessStore};
use tiff_ifd_writer::{ByteOrder, TiffWriter};

// =============================================================================
// Store with Request Tracking
// =============================================================================

/// A memory store that records every read and write.
///
/// Clones share the counters, so a test can keep one handle while the writer
/// owns the other.
pub struct TrackingStore {
    inner: MemoryStore,
    read_count: Arc<AtomicUsize>,
    writes: Arc<RwLock<Vec<(u64, usize)>>>,
}

impl TrackingStore {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            inner: MemoryStore::from_bytes(data),
            read_count: Arc::new(AtomicUsize::new(0)),
            writes: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// A second handle on the same counters, without the data.
    pub fn observer(&self) -> StoreObserver {
        StoreObserver {
            read_count: Arc::clone(&self.read_count),
            writes: Arc::clone(&self.writes),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        self.inner.as_slice()
    }
}

/// Read-only view of a `TrackingStore`'s counters.
#[derive(Clone)]
pub struct StoreObserver {
    read_count: Arc<AtomicUsize>,
    writes: Arc<RwLock<Vec<(u64, usize)>>>,
}

impl StoreObserver {
    pub fn read_count(&self) -> usize {
        self.read_count.load(Ordering::SeqCst)
    }

    pub async fn writes(&self) -> Vec<(u64, usize)> {
        self.writes.read().await.clone()
    }

    pub async fn reset(&self) {
        self.read_count.store(0, Ordering::SeqCst);
        self.writes.write().await.clear();
    }
}

#[async_trait]
impl RandomAccessStore for TrackingStore {
    async fn read_exact_at(&mut self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.read_count.fetch_add(1, Ordering::SeqCst);
        self.inner.read_exact_at(offset, len).await
    }

    async fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), IoError> {
        self.writes.write().await.push((offset, data.len()));
        self.inner.write_at(offset, data).await
    }

    async fn truncate(&mut self, len: u64) -> Result<(), IoError> {
        self.inner.truncate(len).await
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        "tracking"
    }
}

// =============================================================================
// Store with Injected Failures
// =============================================================================

/// A memory store whose writes start failing after a budget is used up.
pub struct FailingStore {
    inner: MemoryStore,
    writes_left: Option<usize>,
}

impl FailingStore {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            inner: MemoryStore::from_bytes(data),
            writes_left: None,
        }
    }

    /// Allow `n` writes, then fail every write.
    pub fn fail_after(mut self, n: usize) -> Self {
        self.writes_left = Some(n);
        self
    }

    pub fn as_slice(&self) -> &[u8] {
        self.inner.as_slice()
    }

    pub fn into_memory(self) -> MemoryStore {
        MemoryStore::from_bytes(self.inner.as_slice().to_vec())
    }
}

#[async_trait]
impl RandomAccessStore for FailingStore {
    async fn read_exact_at(&mut self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.inner.read_exact_at(offset, len).await
    }

    async fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), IoError> {
        match self.writes_left {
            Some(0) => Err(IoError::Io("injected write failure".to_string())),
            Some(ref mut n) => {
                *n -= 1;
                self.inner.write_at(offset, data).await
            }
            None => self.inner.write_at(offset, data).await,
        }
    }

    async fn truncate(&mut self, len: u64) -> Result<(), IoError> {
        self.inner.truncate(len).await
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        "failing"
    }
}

// =============================================================================
// Writer Helpers
// =============================================================================

/// A writer on an empty little-endian classic file in memory.
pub async fn new_classic_writer() -> TiffWriter<MemoryStore> {
    TiffWriter::create(MemoryStore::new(), ByteOrder::LittleEndian, false)
        .await
        .unwrap()
}

/// A writer on an empty file in memory with the given layout.
pub async fn new_writer(byte_order: ByteOrder, is_bigtiff: bool) -> TiffWriter<MemoryStore> {
    TiffWriter::create(MemoryStore::new(), byte_order, is_bigtiff)
        .await
        .unwrap()
}

/// Close and reopen, dropping everything the writer remembered.
pub async fn reopen(writer: TiffWriter<MemoryStore>) -> TiffWriter<MemoryStore> {
    TiffWriter::open(writer.into_store()).await.unwrap()
}

// =============================================================================
// Raw TIFF Builder
// =============================================================================

/// One entry for `TiffBuilder::append_ifd`, slot written verbatim.
#[derive(Clone, Copy)]
pub struct RawEntry {
    pub tag: u16,
    pub field_type: u16,
    pub count: u64,
    pub slot: u64,
}

impl RawEntry {
    pub fn new(tag: u16, field_type: u16, count: u64, slot: u64) -> Self {
        Self {
            tag,
            field_type,
            count,
            slot,
        }
    }
}

/// Builder for TIFF files at the byte level.
///
/// Directories are linked in the order they are appended. Entries are
/// written in the order given, so unsorted files can be produced too.
pub struct TiffBuilder {
    byte_order: ByteOrder,
    is_bigtiff: bool,
    data: Vec<u8>,
    tail_slot: usize,
}

impl TiffBuilder {
    pub fn new(byte_order: ByteOrder, is_bigtiff: bool) -> Self {
        let mut builder = Self {
            byte_order,
            is_bigtiff,
            data: byte_order.magic().to_vec(),
            tail_slot: 0,
        };

        if is_bigtiff {
            builder.write_value(43, 2);
            builder.write_value(8, 2);
            builder.write_value(0, 2);
            builder.tail_slot = 8;
            builder.write_value(0, 8);
        } else {
            builder.write_value(42, 2);
            builder.tail_slot = 4;
            builder.write_value(0, 4);
        }
        builder
    }

    /// Append raw bytes at the next even offset, returning that offset.
    pub fn append_bytes(&mut self, bytes: &[u8]) -> u64 {
        self.align();
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(bytes);
        offset
    }

    /// Append a directory at the next even offset and link it into the chain.
    pub fn append_ifd(&mut self, entries: &[RawEntry]) -> u64 {
        self.align();
        let offset = self.data.len() as u64;
        self.patch_offset(self.tail_slot, offset);

        let (count_size, slot_size) = if self.is_bigtiff { (8, 8) } else { (2, 4) };
        self.write_value(entries.len() as u64, count_size);
        for entry in entries {
            self.write_value(entry.tag as u64, 2);
            self.write_value(entry.field_type as u64, 2);
            self.write_value(entry.count, slot_size);
            self.write_slot(entry.slot);
        }

        self.tail_slot = self.data.len();
        self.write_value(0, slot_size);
        offset
    }

    /// Append a directory without linking it anywhere.
    pub fn append_detached_ifd(&mut self, entries: &[RawEntry]) -> u64 {
        let tail = self.tail_slot;
        let offset = self.append_ifd(entries);
        // Undo the link and keep the old tail
        self.patch_offset(tail, 0);
        self.tail_slot = tail;
        offset
    }

    /// Overwrite an offset-sized field.
    pub fn patch_offset(&mut self, position: usize, value: u64) {
        let size = if self.is_bigtiff { 8 } else { 4 };
        let mut encoded = Vec::new();
        push_value(&mut encoded, self.byte_order, value, size);
        self.data[position..position + size].copy_from_slice(&encoded);
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }

    /// Inline slot holding a small value, left justified.
    fn write_slot(&mut self, value: u64) {
        let size = if self.is_bigtiff { 8 } else { 4 };
        self.write_value(value, size);
    }

    fn write_value(&mut self, value: u64, size: usize) {
        push_value(&mut self.data, self.byte_order, value, size);
    }

    fn align(&mut self) {
        if self.data.len() % 2 == 1 {
            self.data.push(0);
        }
    }
}

/// Encode an inline SHORT value as a slot word.
///
/// The value sits in the first two bytes of the slot whatever the byte order.
pub fn short_slot(byte_order: ByteOrder, value: u16, is_bigtiff: bool) -> u64 {
    let size = if is_bigtiff { 8 } else { 4 };
    let mut slot = Vec::new();
    push_value(&mut slot, byte_order, value as u64, 2);
    slot.resize(size, 0);
    read_value(&slot, byte_order, size)
}

fn push_value(data: &mut Vec<u8>, byte_order: ByteOrder, value: u64, size: usize) {
    match byte_order {
        ByteOrder::LittleEndian => match size {
            1 => data.push(value as u8),
            2 => data.extend(&(value as u16).to_le_bytes()),
            4 => data.extend(&(value as u32).to_le_bytes()),
            8 => data.extend(&value.to_le_bytes()),
            _ => {}
        },
        ByteOrder::BigEndian => match size {
            1 => data.push(value as u8),
            2 => data.extend(&(value as u16).to_be_bytes()),
            4 => data.extend(&(value as u32).to_be_bytes()),
            8 => data.extend(&value.to_be_bytes()),
            _ => {}
        },
    }
}

fn read_value(data: &[u8], byte_order: ByteOrder, size: usize) -> u64 {
    match size {
        2 => byte_order.read_u16(data) as u64,
        4 => byte_order.read_u32(data) as u64,
        8 => byte_order.read_u64(data),
        _ => data[0] as u64,
    }
}
