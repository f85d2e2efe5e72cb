//! Fixed-length owned byte buffer

use std::fmt;

use crate::byte_codec::{self, Endian};
use crate::error::TransportError;

/// An ordered byte sequence whose length is fixed at construction
#[derive(Clone, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Box<[u8]>,
}

impl ByteBuffer {
    /// Create a zero-filled buffer of `len` bytes
    pub fn zeroed(len: usize) -> Self {
        Self {
            data: vec![0u8; len].into_boxed_slice(),
        }
    }

    /// Take ownership of existing bytes
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data: data.into_boxed_slice(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Bounds-checked single byte read
    pub fn get(&self, index: usize) -> Result<u8, TransportError> {
        self.data.get(index).copied().ok_or(TransportError::Range {
            start: index,
            length: 1,
            size: self.data.len(),
        })
    }

    /// Bounds-checked single byte write
    pub fn set(&mut self, index: usize, value: u8) -> Result<(), TransportError> {
        let size = self.data.len();
        let slot = self.data.get_mut(index).ok_or(TransportError::Range {
            start: index,
            length: 1,
            size,
        })?;
        *slot = value;
        Ok(())
    }

    /// Bounds-checked view of `start..start+length`
    pub fn slice(&self, start: usize, length: usize) -> Result<&[u8], TransportError> {
        byte_codec::check_range(start, length, self.data.len())?;
        Ok(&self.data[start..start + length])
    }

    /// Bounds-checked mutable view of `start..start+length`
    pub fn slice_mut(&mut self, start: usize, length: usize) -> Result<&mut [u8], TransportError> {
        byte_codec::check_range(start, length, self.data.len())?;
        Ok(&mut self.data[start..start + length])
    }

    /// Copy `src` into the buffer at `start`
    pub fn write_at(&mut self, start: usize, src: &[u8]) -> Result<(), TransportError> {
        self.slice_mut(start, src.len())?.copy_from_slice(src);
        Ok(())
    }

    pub fn to_int(&self, start: usize, length: usize, endian: Endian) -> Result<u64, TransportError> {
        byte_codec::to_int(&self.data, start, length, endian)
    }

    pub fn to_hex_string(
        &self,
        start: usize,
        length: usize,
        prefix: &str,
        delimiter: &str,
    ) -> Result<String, TransportError> {
        byte_codec::to_hex_string(&self.data, start, length, prefix, delimiter)
    }

    /// Zero every byte, keeping the length
    pub fn fill_zero(&mut self) {
        self.data.fill(0);
    }

    /// True when every byte is zero
    pub fn is_zeroed(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteBuffer[{}]({})", self.len(), byte_codec::hex_dump(&self.data))
    }
}
