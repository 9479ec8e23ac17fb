//! Bounds-checked views of guest linear memory.
//!
//! Guest-supplied offsets and lengths are never trusted: every access is
//! resolved against the actual memory size first and fails with a
//! [`MemoryFault`] instead of touching anything out of range.

use std::ops::Range;
use thiserror::Error;

/// Size of a length or status cell.
pub const CELL_SIZE: u32 = 4;

/// A guest memory access that fell outside linear memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("guest memory access out of bounds: offset {offset}, length {len}, memory size {memory_len}")]
pub struct MemoryFault {
    /// Requested offset.
    pub offset: u32,
    /// Requested length.
    pub len: u32,
    /// Size of linear memory at the time of the access.
    pub memory_len: usize,
}

/// An `(offset, length)` pair naming a span of guest memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestRegion {
    /// Start offset.
    pub offset: u32,
    /// Length in bytes.
    pub len: u32,
}

impl GuestRegion {
    /// Build a region from raw import parameters.
    ///
    /// Guest pointers are unsigned; the `i32` bit pattern is reinterpreted.
    #[must_use]
    pub fn from_raw(ptr: i32, len: i32) -> Self {
        Self {
            offset: ptr.cast_unsigned(),
            len: len.cast_unsigned(),
        }
    }

    /// A four-byte cell at `ptr`.
    #[must_use]
    pub fn cell(ptr: i32) -> Self {
        Self {
            offset: ptr.cast_unsigned(),
            len: CELL_SIZE,
        }
    }

    /// Resolve to a byte range inside a memory of `memory_len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryFault`] if any byte of the region is out of range.
    pub fn resolve(self, memory_len: usize) -> Result<Range<usize>, MemoryFault> {
        let fault = MemoryFault {
            offset: self.offset,
            len: self.len,
            memory_len,
        };
        let start = usize::try_from(self.offset).map_err(|_| fault)?;
        let len = usize::try_from(self.len).map_err(|_| fault)?;
        let end = start.checked_add(len).ok_or(fault)?;
        if end > memory_len {
            return Err(fault);
        }
        Ok(start..end)
    }
}

/// An output buffer: a data region of fixed capacity plus the cell that
/// receives the data's untruncated length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestBuffer {
    /// Data region; its length is the capacity.
    pub data: GuestRegion,
    /// Length cell.
    pub len_cell: GuestRegion,
}

impl GuestBuffer {
    /// Build from raw `(ptr, capacity, len_ptr)` import parameters.
    #[must_use]
    pub fn from_raw(ptr: i32, capacity: i32, len_ptr: i32) -> Self {
        Self {
            data: GuestRegion::from_raw(ptr, capacity),
            len_cell: GuestRegion::cell(len_ptr),
        }
    }

    /// Capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        usize::try_from(self.data.len).unwrap_or(usize::MAX)
    }

    /// Check that both the data region and the length cell are in range.
    ///
    /// # Errors
    ///
    /// Returns the first out-of-range region as a [`MemoryFault`].
    pub fn validate(&self, memory_len: usize) -> Result<(), MemoryFault> {
        self.data.resolve(memory_len)?;
        self.len_cell.resolve(memory_len)?;
        Ok(())
    }
}

/// Borrow the bytes of `region`.
///
/// # Errors
///
/// Returns [`MemoryFault`] if the region is out of range.
pub fn read_bytes(memory: &[u8], region: GuestRegion) -> Result<&[u8], MemoryFault> {
    let range = region.resolve(memory.len())?;
    memory.get(range).ok_or(MemoryFault {
        offset: region.offset,
        len: region.len,
        memory_len: memory.len(),
    })
}

/// Read `region` as text, replacing invalid UTF-8.
///
/// # Errors
///
/// Returns [`MemoryFault`] if the region is out of range.
pub fn read_string(memory: &[u8], region: GuestRegion) -> Result<String, MemoryFault> {
    read_bytes(memory, region).map(|b| String::from_utf8_lossy(b).into_owned())
}

/// Write a little-endian `u32` into `cell`.
///
/// # Errors
///
/// Returns [`MemoryFault`] if the cell is out of range.
pub fn write_u32(memory: &mut [u8], cell: GuestRegion, value: u32) -> Result<(), MemoryFault> {
    let fault = MemoryFault {
        offset: cell.offset,
        len: CELL_SIZE,
        memory_len: memory.len(),
    };
    let range = GuestRegion {
        offset: cell.offset,
        len: CELL_SIZE,
    }
    .resolve(memory.len())?;
    memory
        .get_mut(range)
        .ok_or(fault)?
        .copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Copy as much of `data` as fits into `buffer` and record the full length.
///
/// The length cell always receives `data.len()`, so a caller can detect
/// truncation by comparing it with the capacity. Returns the number of bytes
/// copied.
///
/// # Errors
///
/// Returns [`MemoryFault`] if the buffer or its length cell is out of range.
pub fn write_truncated(
    memory: &mut [u8],
    buffer: GuestBuffer,
    data: &[u8],
) -> Result<usize, MemoryFault> {
    buffer.validate(memory.len())?;
    let copied = data.len().min(buffer.capacity());
    let range = buffer.data.resolve(memory.len())?;
    let start = range.start;
    let end = start.checked_add(copied).ok_or(MemoryFault {
        offset: buffer.data.offset,
        len: buffer.data.len,
        memory_len: memory.len(),
    })?;
    if let (Some(dst), Some(src)) = (memory.get_mut(start..end), data.get(..copied)) {
        dst.copy_from_slice(src);
    }
    let full_len = u32::try_from(data.len()).unwrap_or(u32::MAX);
    write_u32(memory, buffer.len_cell, full_len)?;
    Ok(copied)
}
