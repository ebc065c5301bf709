//! RPC context handles
//!
//! A context handle is 20 opaque bytes on the wire: a 4-byte attribute word
//! in the stub byte order followed by a 16-byte UUID copied as-is.

use crate::context::DecodeContext;
use crate::cursor::align_padding;
use crate::drep::ByteOrder;
use crate::error::Result;
use crate::sink::{Field, FieldValue};
use tracing::debug;

/// Server-side handle returned by an open call and echoed back by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContextHandle {
    pub attributes: u32,
    pub uuid: [u8; 16],
}

impl ContextHandle {
    pub const WIRE_SIZE: usize = 20;

    /// A closed handle carries an all-zero UUID
    pub fn is_nil(&self) -> bool {
        self.uuid == [0u8; 16]
    }
}

/// How the filler before a context handle is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextHandlePadding {
    /// Pad only at odd offsets, by `4 - offset % 4`
    ///
    /// Matches existing captures; an offset of 2 mod 4 is left unaligned.
    #[default]
    Historical,
    /// Plain 4-byte alignment
    Aligned,
}

impl ContextHandlePadding {
    pub fn padding(self, offset: usize) -> usize {
        match self {
            ContextHandlePadding::Historical => {
                if offset % 2 != 0 {
                    4 - offset % 4
                } else {
                    0
                }
            }
            ContextHandlePadding::Aligned => align_padding(offset, 4),
        }
    }
}

/// Decode a 20-byte context handle
///
/// The sink receives the whole handle as one blob. A no-op during the
/// conformant-run pre-pass.
pub fn decode_context_handle(
    ctx: &mut DecodeContext<'_>,
    field: &Field,
    out: Option<&mut ContextHandle>,
) -> Result<usize> {
    if ctx.is_prepass() {
        if let Some(out) = out {
            *out = ContextHandle::default();
        }
        return Ok(ctx.offset());
    }

    let padding = if ctx.cursor.alignment_suppressed() {
        0
    } else {
        ctx.context_handle_padding().padding(ctx.offset())
    };
    let byte_order = ctx.byte_order();
    let bytes = ctx
        .cursor
        .take_padded(padding, ContextHandle::WIRE_SIZE)
        .map_err(|e| {
            debug!("{}: {}", field.name, e);
            e
        })?;
    let end = ctx.offset();

    let word = [bytes[0], bytes[1], bytes[2], bytes[3]];
    let mut handle = ContextHandle {
        attributes: match byte_order {
            ByteOrder::LittleEndian => u32::from_le_bytes(word),
            ByteOrder::BigEndian => u32::from_be_bytes(word),
        },
        uuid: [0u8; 16],
    };
    handle.uuid.copy_from_slice(&bytes[4..20]);

    ctx.emit(
        field,
        FieldValue::Bytes(bytes.to_vec()),
        end - ContextHandle::WIRE_SIZE..end,
    );
    if let Some(out) = out {
        *out = handle;
    }
    Ok(end)
}
