//! NDR stub writer
//!
//! Produces aligned stub data in either byte order and either transfer
//! syntax. Padding is always computed from the start of the writer, so a
//! buffer built here decodes correctly with a start offset of zero.

use crate::context_handle::ContextHandle;
use crate::cursor::align_padding;
use crate::drep::ByteOrder;
use crate::scalar::Uuid;
use bytes::{BufMut, Bytes, BytesMut};

macro_rules! put_fixed {
    ($name:ident, $ty:ty, $align:expr, $put_le:ident, $put_be:ident) => {
        #[doc = concat!("Write a `", stringify!($ty), "` aligned to ", stringify!($align))]
        pub fn $name(&mut self, value: $ty) -> &mut Self {
            self.align($align);
            match self.byte_order {
                ByteOrder::LittleEndian => self.buf.$put_le(value),
                ByteOrder::BigEndian => self.buf.$put_be(value),
            }
            self
        }
    };
}

#[derive(Debug, Clone)]
pub struct NdrWriter {
    buf: BytesMut,
    byte_order: ByteOrder,
    ndr64: bool,
}

impl NdrWriter {
    pub fn new(byte_order: ByteOrder) -> Self {
        Self {
            buf: BytesMut::new(),
            byte_order,
            ndr64: false,
        }
    }

    /// Write dual-width values at their NDR64 size
    pub fn ndr64(mut self, ndr64: bool) -> Self {
        self.ndr64 = ndr64;
        self
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    /// Zero-fill up to the next multiple of `alignment`
    pub fn align(&mut self, alignment: usize) -> &mut Self {
        let padding = align_padding(self.buf.len(), alignment);
        self.buf.put_bytes(0, padding);
        self
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    put_fixed!(put_u16, u16, 2, put_u16_le, put_u16);
    put_fixed!(put_u32, u32, 4, put_u32_le, put_u32);
    put_fixed!(put_u64, u64, 8, put_u64_le, put_u64);
    put_fixed!(put_f32, f32, 4, put_f32_le, put_f32);
    put_fixed!(put_f64, f64, 8, put_f64_le, put_f64);

    pub fn put_time32(&mut self, seconds: u32) -> &mut Self {
        self.put_u32(seconds)
    }

    /// A 64-bit value aligned to 4
    pub fn put_duint32(&mut self, value: u64) -> &mut Self {
        self.align(4);
        match self.byte_order {
            ByteOrder::LittleEndian => self.buf.put_u64_le(value),
            ByteOrder::BigEndian => self.buf.put_u64(value),
        }
        self
    }

    /// `u16` in NDR, `u32` in NDR64
    pub fn put_u1632(&mut self, value: u32) -> &mut Self {
        if self.ndr64 {
            self.put_u32(value)
        } else {
            self.put_u16(value as u16)
        }
    }

    /// `u32` in NDR, `u64` in NDR64
    pub fn put_u3264(&mut self, value: u64) -> &mut Self {
        if self.ndr64 {
            self.put_u64(value)
        } else {
            self.put_u32(value as u32)
        }
    }

    pub fn put_uuid(&mut self, uuid: &Uuid) -> &mut Self {
        self.put_u32(uuid.data1);
        self.put_u16(uuid.data2);
        self.put_u16(uuid.data3);
        self.buf.put_slice(&uuid.data4);
        self
    }

    pub fn put_context_handle(&mut self, handle: &ContextHandle) -> &mut Self {
        self.put_u32(handle.attributes);
        self.buf.put_slice(&handle.uuid);
        self
    }

    /// Raw bytes, no alignment
    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.put_slice(bytes);
        self
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn into_inner(self) -> BytesMut {
        self.buf
    }
}
