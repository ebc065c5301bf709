//! NDR scalar decoders
//!
//! One free function per primitive kind. Each takes the shared context, the
//! field descriptor and an optional output slot, and returns the offset
//! after the value.
//!
//! | Kind      | Rust Type | Size | Alignment |
//! |-----------|-----------|------|-----------|
//! | small     | u8        | 1    | 1         |
//! | short     | u16       | 2    | 2         |
//! | long      | u32       | 4    | 4         |
//! | hyper     | u64       | 8    | 8         |
//! | float     | f32       | 4    | 4         |
//! | double    | f64       | 8    | 8         |
//! | time_t    | u32       | 4    | 4         |
//! | uuid_t    | Uuid      | 16   | 4         |
//! | duint32   | u64       | 8    | 4         |
//! | uint1632  | u32       | 2/4  | 2/4       |
//! | uint3264  | u64       | 4/8  | 4/8       |
//!
//! While the context is in the conformant-run pre-pass every decoder here is
//! a no-op: nothing is aligned or consumed, the sink is not called, and the
//! output slot receives the zero value.

use crate::context::DecodeContext;
use crate::cursor::Cursor;
use crate::drep::ByteOrder;
use crate::error::Result;
use crate::sink::{Field, FieldValue};
use std::fmt;
use std::ops::Range;
use tracing::debug;

/// DCE UUID as laid out by NDR
///
/// The first three groups follow the stub byte order; `data4` is raw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Uuid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Uuid {
    pub const NIL: Self = Self {
        data1: 0,
        data2: 0,
        data3: 0,
        data4: [0; 8],
    };

    /// Parse from "xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx"
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.len() != 36 {
            return None;
        }
        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() != 5 || parts[3].len() != 4 || parts[4].len() != 12 {
            return None;
        }

        let data1 = u32::from_str_radix(parts[0], 16).ok()?;
        let data2 = u16::from_str_radix(parts[1], 16).ok()?;
        let data3 = u16::from_str_radix(parts[2], 16).ok()?;
        let clock = u16::from_str_radix(parts[3], 16).ok()?;

        let mut data4 = [0u8; 8];
        data4[..2].copy_from_slice(&clock.to_be_bytes());
        for i in 0..6 {
            let pair = parts[4].get(i * 2..i * 2 + 2)?;
            data4[2 + i] = u8::from_str_radix(pair, 16).ok()?;
        }

        Some(Self {
            data1,
            data2,
            data3,
            data4,
        })
    }

    pub fn is_nil(&self) -> bool {
        *self == Self::NIL
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7],
        )
    }
}

/// Shared body of every scalar decoder
fn decode_scalar<'a, T: Copy + Default>(
    ctx: &mut DecodeContext<'a>,
    field: &Field,
    out: Option<&mut T>,
    read: impl FnOnce(&mut Cursor<'a>) -> Result<(T, Range<usize>)>,
    wrap: impl FnOnce(T) -> FieldValue,
) -> Result<usize> {
    if ctx.is_prepass() {
        if let Some(out) = out {
            *out = T::default();
        }
        return Ok(ctx.offset());
    }

    let (value, range) = read(&mut ctx.cursor).map_err(|e| {
        debug!("{}: {}", field.name, e);
        e
    })?;
    ctx.emit(field, wrap(value), range);
    if let Some(out) = out {
        *out = value;
    }
    Ok(ctx.offset())
}

/// Read `size` bytes at `align` and return them with their range
fn take<'a>(cursor: &mut Cursor<'a>, align: usize, size: usize) -> Result<(&'a [u8], Range<usize>)> {
    let bytes = cursor.take(align, size)?;
    let end = cursor.offset();
    Ok((bytes, end - size..end))
}

macro_rules! scalar_decoder {
    ($(#[$doc:meta])* $name:ident, $ty:ty, $size:expr, $align:expr, $read:ident, $variant:ident) => {
        $(#[$doc])*
        pub fn $name(ctx: &mut DecodeContext<'_>, field: &Field, out: Option<&mut $ty>) -> Result<usize> {
            decode_scalar(
                ctx,
                field,
                out,
                |cursor| {
                    let value = cursor.$read($align)?;
                    let end = cursor.offset();
                    Ok((value, end - $size..end))
                },
                FieldValue::$variant,
            )
        }
    };
}

/// Decode an unsigned 8-bit integer (`small`, `byte`, `boolean`)
pub fn decode_u8(ctx: &mut DecodeContext<'_>, field: &Field, out: Option<&mut u8>) -> Result<usize> {
    decode_scalar(
        ctx,
        field,
        out,
        |cursor| {
            let value = cursor.read_u8()?;
            let end = cursor.offset();
            Ok((value, end - 1..end))
        },
        FieldValue::U8,
    )
}

scalar_decoder!(
    /// Decode an unsigned 16-bit integer
    decode_u16, u16, 2, 2, read_u16, U16
);
scalar_decoder!(
    /// Decode an unsigned 32-bit integer
    decode_u32, u32, 4, 4, read_u32, U32
);
scalar_decoder!(
    /// Decode an unsigned 64-bit integer aligned to 8
    decode_u64, u64, 8, 8, read_u64, U64
);
scalar_decoder!(
    /// Decode an IEEE single
    decode_f32, f32, 4, 4, read_f32, F32
);
scalar_decoder!(
    /// Decode an IEEE double
    decode_f64, f64, 8, 8, read_f64, F64
);
scalar_decoder!(
    /// Decode a 32-bit `time_t` (seconds since the unix epoch)
    decode_time32, u32, 4, 4, read_u32, Time
);
scalar_decoder!(
    /// Decode a 64-bit value sent as two 32-bit words
    ///
    /// Same 8 bytes as `decode_u64` but aligned to 4, not 8.
    decode_duint32, u64, 8, 4, read_u64, U64
);

/// Decode a UUID (aligned to 4 like its leading `u32`)
pub fn decode_uuid(ctx: &mut DecodeContext<'_>, field: &Field, out: Option<&mut Uuid>) -> Result<usize> {
    decode_scalar(
        ctx,
        field,
        out,
        |cursor| {
            let byte_order = cursor.byte_order();
            let (bytes, range) = take(cursor, 4, 16)?;
            Ok((uuid_from_bytes(bytes, byte_order), range))
        },
        FieldValue::Uuid,
    )
}

fn uuid_from_bytes(bytes: &[u8], byte_order: ByteOrder) -> Uuid {
    let mut data4 = [0u8; 8];
    data4.copy_from_slice(&bytes[8..16]);
    let (data1, data2, data3) = match byte_order {
        ByteOrder::LittleEndian => (
            u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            u16::from_le_bytes([bytes[4], bytes[5]]),
            u16::from_le_bytes([bytes[6], bytes[7]]),
        ),
        ByteOrder::BigEndian => (
            u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            u16::from_be_bytes([bytes[4], bytes[5]]),
            u16::from_be_bytes([bytes[6], bytes[7]]),
        ),
    };
    Uuid {
        data1,
        data2,
        data3,
        data4,
    }
}

/// Decode a referent id or array header: `u32` in NDR, `u64` in NDR64
pub fn decode_u3264(ctx: &mut DecodeContext<'_>, field: &Field, out: Option<&mut u64>) -> Result<usize> {
    let ndr64 = ctx.is_ndr64();
    decode_scalar(ctx, field, out, |cursor| read_u3264(cursor, ndr64), FieldValue::U64)
}

/// Decode an enum or union discriminant: `u16` in NDR, `u32` in NDR64
pub fn decode_u1632(ctx: &mut DecodeContext<'_>, field: &Field, out: Option<&mut u32>) -> Result<usize> {
    let ndr64 = ctx.is_ndr64();
    decode_scalar(
        ctx,
        field,
        out,
        |cursor| {
            if ndr64 {
                let value = cursor.read_u32(4)?;
                let end = cursor.offset();
                Ok((value, end - 4..end))
            } else {
                let value = cursor.read_u16(2)?;
                let end = cursor.offset();
                Ok((u32::from(value), end - 2..end))
            }
        },
        FieldValue::U32,
    )
}

/// Dual-width read shared with pointer and array headers
///
/// Alignment follows the width actually read.
pub(crate) fn read_u3264(cursor: &mut Cursor<'_>, ndr64: bool) -> Result<(u64, Range<usize>)> {
    if ndr64 {
        let value = cursor.read_u64(8)?;
        let end = cursor.offset();
        Ok((value, end - 8..end))
    } else {
        let value = cursor.read_u32(4)?;
        let end = cursor.offset();
        Ok((u64::from(value), end - 4..end))
    }
}
