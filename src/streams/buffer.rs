//! Transferable byte storage and typed windows over it.
//!
//! An [`ArrayBuffer`] is a handle to a shared backing store. Cloning the
//! handle aliases the same bytes. [`ArrayBuffer::transfer`] moves the bytes
//! into a fresh store and detaches every handle to the old one, which is how
//! byte streams take exclusive ownership of caller memory.

use super::error::StreamError;
use crate::platform::SharedPtr;
use parking_lot::Mutex;
use std::fmt;

type StreamResult<T> = Result<T, StreamError>;

fn detached_error() -> StreamError {
    StreamError::type_error("buffer is detached")
}

fn check_range(offset: usize, len: usize, available: usize) -> StreamResult<()> {
    match offset.checked_add(len) {
        Some(end) if end <= available => Ok(()),
        _ => Err(StreamError::range_error(format!(
            "range {offset}..{offset}+{len} is outside a buffer of {available} bytes"
        ))),
    }
}

#[derive(Clone)]
pub struct ArrayBuffer {
    data: SharedPtr<Mutex<Option<Vec<u8>>>>,
}

impl ArrayBuffer {
    /// Allocates a zero-filled buffer.
    pub fn new(byte_length: usize) -> Self {
        Self::from_vec(vec![0; byte_length])
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            data: SharedPtr::new(Mutex::new(Some(bytes))),
        }
    }

    /// Length of the backing store, or 0 once detached.
    pub fn byte_length(&self) -> usize {
        self.data.lock().as_ref().map_or(0, Vec::len)
    }

    pub fn is_detached(&self) -> bool {
        self.data.lock().is_none()
    }

    /// Releases the backing store. Every handle and view over it becomes unusable.
    pub fn detach(&self) {
        self.data.lock().take();
    }

    /// Moves the bytes into a new buffer, detaching this one and all its aliases.
    pub fn transfer(&self) -> StreamResult<ArrayBuffer> {
        let bytes = self.data.lock().take().ok_or_else(detached_error)?;
        Ok(Self::from_vec(bytes))
    }

    /// Copies `byte_length` bytes starting at `byte_offset` into a new buffer.
    pub fn clone_range(&self, byte_offset: usize, byte_length: usize) -> StreamResult<ArrayBuffer> {
        let guard = self.data.lock();
        let bytes = guard.as_ref().ok_or_else(detached_error)?;
        check_range(byte_offset, byte_length, bytes.len())?;
        Ok(Self::from_vec(bytes[byte_offset..byte_offset + byte_length].to_vec()))
    }

    /// Snapshot of the contents; empty when detached.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.lock().clone().unwrap_or_default()
    }

    /// Whether both handles refer to the same backing store.
    pub fn ptr_eq(&self, other: &ArrayBuffer) -> bool {
        SharedPtr::ptr_eq(&self.data, &other.data)
    }

    pub(crate) fn copy_bytes(
        dest: &ArrayBuffer,
        dest_start: usize,
        src: &ArrayBuffer,
        src_start: usize,
        len: usize,
    ) -> StreamResult<()> {
        if dest.ptr_eq(src) {
            let mut guard = dest.data.lock();
            let bytes = guard.as_mut().ok_or_else(detached_error)?;
            check_range(src_start, len, bytes.len())?;
            check_range(dest_start, len, bytes.len())?;
            bytes.copy_within(src_start..src_start + len, dest_start);
            return Ok(());
        }

        let src_guard = src.data.lock();
        let src_bytes = src_guard.as_ref().ok_or_else(detached_error)?;
        check_range(src_start, len, src_bytes.len())?;
        let mut dest_guard = dest.data.lock();
        let dest_bytes = dest_guard.as_mut().ok_or_else(detached_error)?;
        check_range(dest_start, len, dest_bytes.len())?;
        dest_bytes[dest_start..dest_start + len].copy_from_slice(&src_bytes[src_start..src_start + len]);
        Ok(())
    }
}

impl From<Vec<u8>> for ArrayBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_vec(bytes)
    }
}

impl fmt::Debug for ArrayBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.data.lock().as_ref() {
            Some(bytes) => f
                .debug_struct("ArrayBuffer")
                .field("byte_length", &bytes.len())
                .finish(),
            None => f.write_str("ArrayBuffer(detached)"),
        }
    }
}

/// A window over an [`ArrayBuffer`] made of elements of `element_size` bytes.
///
/// Byte streams deliver chunks as views. A BYOB read hands in a view as the
/// destination and receives a view over the same (transferred) memory back.
#[derive(Clone)]
pub struct ByteView {
    buffer: ArrayBuffer,
    byte_offset: usize,
    byte_length: usize,
    element_size: usize,
}

impl ByteView {
    /// A zero-filled byte view over a fresh buffer.
    pub fn new(byte_length: usize) -> Self {
        Self::from_vec(vec![0; byte_length])
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let byte_length = bytes.len();
        Self {
            buffer: ArrayBuffer::from_vec(bytes),
            byte_offset: 0,
            byte_length,
            element_size: 1,
        }
    }

    /// A byte-granular view of `byte_length` bytes at `byte_offset`.
    pub fn with_buffer(buffer: ArrayBuffer, byte_offset: usize, byte_length: usize) -> StreamResult<Self> {
        Self::with_element_size(buffer, byte_offset, byte_length, 1)
    }

    /// A view of `length` elements of `element_size` bytes each.
    ///
    /// `byte_offset` must be aligned to the element size. Element sizes other
    /// than 1, 2, 4 or 8 bytes are a runtime error.
    pub fn with_element_size(
        buffer: ArrayBuffer,
        byte_offset: usize,
        length: usize,
        element_size: usize,
    ) -> StreamResult<Self> {
        if !matches!(element_size, 1 | 2 | 4 | 8) {
            return Err(StreamError::runtime_error(format!(
                "unsupported element size {element_size}"
            )));
        }
        if byte_offset % element_size != 0 {
            return Err(StreamError::range_error(format!(
                "start offset {byte_offset} is not a multiple of the element size {element_size}"
            )));
        }
        let byte_length = length
            .checked_mul(element_size)
            .ok_or_else(|| StreamError::range_error("view length overflows"))?;
        if buffer.is_detached() {
            return Err(detached_error());
        }
        check_range(byte_offset, byte_length, buffer.byte_length())?;
        Ok(Self {
            buffer,
            byte_offset,
            byte_length,
            element_size,
        })
    }

    pub fn buffer(&self) -> &ArrayBuffer {
        &self.buffer
    }

    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    /// Length in bytes, or 0 once the underlying buffer is detached.
    pub fn byte_length(&self) -> usize {
        if self.buffer.is_detached() { 0 } else { self.byte_length }
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Length in elements.
    pub fn len(&self) -> usize {
        self.byte_length() / self.element_size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_detached(&self) -> bool {
        self.buffer.is_detached()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.with_bytes(<[u8]>::to_vec).unwrap_or_default()
    }

    /// Copies `bytes` into the view starting at `offset` bytes into it.
    pub fn write(&self, offset: usize, bytes: &[u8]) -> StreamResult<()> {
        check_range(offset, bytes.len(), self.byte_length)?;
        self.with_bytes_mut(|view| view[offset..offset + bytes.len()].copy_from_slice(bytes))
    }

    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> StreamResult<R> {
        let guard = self.buffer.data.lock();
        let bytes = guard.as_ref().ok_or_else(detached_error)?;
        check_range(self.byte_offset, self.byte_length, bytes.len())?;
        Ok(f(&bytes[self.byte_offset..self.byte_offset + self.byte_length]))
    }

    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> StreamResult<R> {
        let mut guard = self.buffer.data.lock();
        let bytes = guard.as_mut().ok_or_else(detached_error)?;
        check_range(self.byte_offset, self.byte_length, bytes.len())?;
        Ok(f(&mut bytes[self.byte_offset..self.byte_offset + self.byte_length]))
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_vec(bytes)
    }
}

impl From<&[u8]> for ByteView {
    fn from(bytes: &[u8]) -> Self {
        Self::from_vec(bytes.to_vec())
    }
}

impl From<&str> for ByteView {
    fn from(text: &str) -> Self {
        Self::from_vec(text.as_bytes().to_vec())
    }
}

impl fmt::Debug for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteView")
            .field("byte_offset", &self.byte_offset)
            .field("byte_length", &self.byte_length())
            .field("element_size", &self.element_size)
            .field("detached", &self.is_detached())
            .finish()
    }
}
