//! Read cursor over a PDU body
//!
//! The cursor tracks the byte order and the current offset and owns the
//! alignment discipline: every read first pads to the requested boundary,
//! then consumes exactly the requested number of bytes. A failed read leaves
//! the offset where it was.

use crate::drep::ByteOrder;
use crate::error::{DecodeError, Result};
use bytes::Buf;

/// Calculate padding needed to align `position` to the given boundary
#[inline]
pub fn align_padding(position: usize, alignment: usize) -> usize {
    if alignment == 0 || alignment == 1 {
        return 0;
    }
    let remainder = position % alignment;
    if remainder == 0 {
        0
    } else {
        alignment - remainder
    }
}

macro_rules! read_fixed {
    ($name:ident, $ty:ty, $size:expr, $get_le:ident, $get_be:ident) => {
        #[doc = concat!("Read a `", stringify!($ty), "` aligned to `align` bytes")]
        pub fn $name(&mut self, align: usize) -> Result<$ty> {
            let mut src = self.take(align, $size)?;
            Ok(match self.byte_order {
                ByteOrder::LittleEndian => src.$get_le(),
                ByteOrder::BigEndian => src.$get_be(),
            })
        }
    };
}

/// Offset into an immutable buffer plus the decoding knobs that affect reads
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    buffer: &'a [u8],
    offset: usize,
    byte_order: ByteOrder,
    suppress_alignment: bool,
}

impl<'a> Cursor<'a> {
    pub fn new(buffer: &'a [u8], byte_order: ByteOrder) -> Self {
        Self {
            buffer,
            offset: 0,
            byte_order,
            suppress_alignment: false,
        }
    }

    /// Start at `offset` instead of the beginning of the buffer
    pub fn at(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Disable all alignment padding (some transports pack stub data)
    pub fn with_suppressed_alignment(mut self, suppress: bool) -> Self {
        self.suppress_alignment = suppress;
        self
    }

    pub fn buffer(&self) -> &'a [u8] {
        self.buffer
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn alignment_suppressed(&self) -> bool {
        self.suppress_alignment
    }

    /// Bytes left after the current offset
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    /// Padding the next read aligned to `alignment` would skip
    pub fn padding_for(&self, alignment: usize) -> usize {
        if self.suppress_alignment {
            0
        } else {
            align_padding(self.offset, alignment)
        }
    }

    /// Move to the next multiple of `alignment`
    pub fn align(&mut self, alignment: usize) -> Result<usize> {
        let padding = self.padding_for(alignment);
        self.take_padded(padding, 0)?;
        Ok(self.offset)
    }

    /// Consume `size` bytes after aligning to `align`
    pub fn take(&mut self, align: usize, size: usize) -> Result<&'a [u8]> {
        let padding = self.padding_for(align);
        self.take_padded(padding, size)
    }

    /// Consume `padding` bytes of filler and then `size` bytes of data
    ///
    /// Either everything is consumed or the offset is left untouched.
    pub fn take_padded(&mut self, padding: usize, size: usize) -> Result<&'a [u8]> {
        let have = self.remaining();
        let in_buffer = self.offset <= self.buffer.len();
        match padding.checked_add(size) {
            Some(needed) if in_buffer && needed <= have => {}
            _ => {
                return Err(DecodeError::OutOfBounds {
                    offset: self.offset,
                    needed: padding.saturating_add(size),
                    have,
                })
            }
        }
        let start = self.offset + padding;
        let end = start + size;
        self.offset = end;
        Ok(&self.buffer[start..end])
    }

    /// Read one byte (no alignment)
    pub fn read_u8(&mut self) -> Result<u8> {
        let mut src = self.take(1, 1)?;
        Ok(src.get_u8())
    }

    read_fixed!(read_u16, u16, 2, get_u16_le, get_u16);
    read_fixed!(read_u32, u32, 4, get_u32_le, get_u32);
    read_fixed!(read_u64, u64, 8, get_u64_le, get_u64);
    read_fixed!(read_f32, f32, 4, get_f32_le, get_f32);
    read_fixed!(read_f64, f64, 8, get_f64_le, get_f64);
}
