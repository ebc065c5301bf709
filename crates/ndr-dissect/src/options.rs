//! Per-PDU decoding options

use crate::context_handle::ContextHandlePadding;
use crate::drep::{ByteOrder, DataRepresentation};
use tracing::debug;

/// Default bound on structural nesting (struct-in-struct, pointer chains)
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Everything the caller knows about a PDU body before decoding it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Byte order from the PDU's DREP label
    pub byte_order: ByteOrder,
    /// NDR64 transfer syntax was negotiated
    pub ndr64: bool,
    /// Transport packs stub data without alignment padding
    pub suppress_alignment: bool,
    /// Offset of the first stub byte within the buffer
    pub start_offset: usize,
    pub max_depth: usize,
    pub context_handle_padding: ContextHandlePadding,
}

impl DecodeOptions {
    /// Classic NDR, little-endian, aligned
    pub fn new() -> Self {
        Self {
            byte_order: ByteOrder::LittleEndian,
            ndr64: false,
            suppress_alignment: false,
            start_offset: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            context_handle_padding: ContextHandlePadding::default(),
        }
    }

    /// Options for a PDU carrying the given 4-byte DREP label
    pub fn from_drep(drep: [u8; 4]) -> Self {
        let drep = DataRepresentation::decode(drep);
        if !drep.is_native() {
            debug!(
                "{:?} characters and {:?} floats will be decoded as ASCII and IEEE",
                drep.char_rep, drep.float_rep
            );
        }
        Self::new().with_byte_order(drep.byte_order)
    }

    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    pub fn with_ndr64(mut self, ndr64: bool) -> Self {
        self.ndr64 = ndr64;
        self
    }

    pub fn with_suppressed_alignment(mut self, suppress: bool) -> Self {
        self.suppress_alignment = suppress;
        self
    }

    pub fn with_start_offset(mut self, offset: usize) -> Self {
        self.start_offset = offset;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_context_handle_padding(mut self, padding: ContextHandlePadding) -> Self {
        self.context_handle_padding = padding;
        self
    }
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::new()
    }
}
