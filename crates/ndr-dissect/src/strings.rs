//! NDR string decoding
//!
//! NDR strings are conformant varying arrays of characters with a null
//! terminator counted in `actual_count`.
//!
//! Wire format:
//! ```text
//! max_count: u3264    # capacity in characters, including null
//! offset: u3264       # first transmitted character
//! actual_count: u3264 # transmitted characters, including null
//! chars[actual_count]
//! ```
//!
//! The header goes through the conformant-run machinery like any other
//! array, so a string embedded in a structure has its header hoisted with
//! the structure's other arrays.

use crate::conformance::{ArrayHeader, ArrayShape};
use crate::context::DecodeContext;
use crate::drep::ByteOrder;
use crate::error::{DecodeError, Result};
use crate::sink::{Field, FieldValue};
use tracing::debug;

/// Width of one transmitted character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharWidth {
    /// 8-bit `char`
    Narrow,
    /// 16-bit `wchar_t`, UTF-16 code units in the stub byte order
    Wide,
}

impl CharWidth {
    pub fn unit_size(self) -> usize {
        match self {
            CharWidth::Narrow => 1,
            CharWidth::Wide => 2,
        }
    }

    fn decode(self, bytes: &[u8], byte_order: ByteOrder) -> String {
        match self {
            CharWidth::Narrow => {
                let bytes = bytes.strip_suffix(&[0]).unwrap_or(bytes);
                String::from_utf8_lossy(bytes).into_owned()
            }
            CharWidth::Wide => {
                let mut units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| match byte_order {
                        ByteOrder::LittleEndian => u16::from_le_bytes([pair[0], pair[1]]),
                        ByteOrder::BigEndian => u16::from_be_bytes([pair[0], pair[1]]),
                    })
                    .collect();
                if units.last() == Some(&0) {
                    units.pop();
                }
                char::decode_utf16(units)
                    .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                    .collect()
            }
        }
    }
}

/// Decode a conformant varying string
///
/// The trailing null is dropped and malformed text is replaced rather than
/// rejected. During the conformant-run pre-pass only the header is read and
/// `out` is cleared.
pub fn decode_string<'a>(
    ctx: &mut DecodeContext<'a>,
    field: &Field,
    width: CharWidth,
    out: Option<&mut String>,
) -> Result<usize> {
    let unit = width.unit_size();
    let mut decoded = None;
    let mut body = |ctx: &mut DecodeContext<'a>, header: &ArrayHeader| -> Result<()> {
        let count = header.element_count(ArrayShape::ConformantVarying);
        let size = usize::try_from(count)
            .ok()
            .and_then(|count| count.checked_mul(unit))
            .ok_or(DecodeError::OutOfBounds {
                offset: ctx.offset(),
                needed: usize::MAX,
                have: ctx.remaining(),
            })?;
        let bytes = ctx.cursor.take(unit, size).map_err(|e| {
            debug!("{}: {}", field.name, e);
            e
        })?;
        let end = ctx.offset();
        let text = width.decode(bytes, ctx.byte_order());
        ctx.emit(field, FieldValue::Text(text.clone()), end - size..end);
        decoded = Some(text);
        Ok(())
    };
    ctx.sized_array_block(ArrayShape::ConformantVarying, unit, &mut body)?;

    if let Some(out) = out {
        *out = decoded.unwrap_or_default();
    }
    Ok(ctx.offset())
}
