use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// Sequential little-endian reader, used for envelope headers
pub struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.read_bytes(n).map(|_| ())
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let slice = ByteView::new(self.data).bytes_at(self.pos, n)?;
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.read_bytes(2)?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.read_bytes(4)?))
    }
}

/// Random-access view over a payload.
///
/// Every read is fixed-width little-endian at an absolute byte offset. A read
/// that would run past the end yields [`Error::OutOfBounds`] instead of
/// panicking, so heuristics can be run against packets of any size.
#[derive(Debug, Clone, Copy)]
pub struct ByteView<'a> {
    data: &'a [u8],
}

impl<'a> ByteView<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes_at(&self, offset: usize, width: usize) -> Result<&'a [u8]> {
        let end = offset.checked_add(width).filter(|&end| end <= self.data.len());
        match end {
            Some(end) => Ok(&self.data[offset..end]),
            None => Err(Error::OutOfBounds {
                offset,
                width,
                len: self.data.len(),
            }),
        }
    }

    /// Bytes in `offset..offset + len`, clamped to what is available.
    pub fn window(&self, offset: usize, len: usize) -> &'a [u8] {
        let start = offset.min(self.data.len());
        let end = offset.saturating_add(len).min(self.data.len());
        &self.data[start..end]
    }

    pub fn u8_at(&self, offset: usize) -> Result<u8> {
        Ok(self.bytes_at(offset, 1)?[0])
    }

    pub fn u16_at(&self, offset: usize) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.bytes_at(offset, 2)?))
    }

    pub fn i16_at(&self, offset: usize) -> Result<i16> {
        Ok(LittleEndian::read_i16(self.bytes_at(offset, 2)?))
    }

    pub fn u32_at(&self, offset: usize) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.bytes_at(offset, 4)?))
    }

    pub fn u64_at(&self, offset: usize) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.bytes_at(offset, 8)?))
    }

    pub fn f32_at(&self, offset: usize) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.bytes_at(offset, 4)?))
    }

    /// Last four bytes as a u32 (trailing padding checks)
    pub fn trailing_u32(&self) -> Result<u32> {
        let offset = self.data.len().checked_sub(4).ok_or(Error::OutOfBounds {
            offset: 0,
            width: 4,
            len: self.data.len(),
        })?;
        self.u32_at(offset)
    }
}
