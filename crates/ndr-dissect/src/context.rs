//! Per-PDU decode context
//!
//! A `DecodeContext` is created at the start of a PDU body and threaded by
//! mutable reference through every decode call. It owns the read cursor,
//! the conformant-run pass state, the pointer deferral stack and the
//! recursion counter, and borrows the caller's sink. Nothing in it is shared
//! between PDUs, so independent PDUs can be decoded on separate threads.

use crate::conformance::{ConformanceTable, PassMode};
use crate::context_handle::ContextHandlePadding;
use crate::cursor::Cursor;
use crate::drep::ByteOrder;
use crate::error::{DecodeError, Result};
use crate::options::DecodeOptions;
use crate::pointers::PointerDeferralStack;
use crate::sink::{DecodeSink, Field, FieldValue};
use std::fmt;
use std::ops::Range;
use tracing::{debug, trace};

pub struct DecodeContext<'a> {
    pub(crate) cursor: Cursor<'a>,
    pub(crate) pass: PassMode,
    pub(crate) conformance: Option<ConformanceTable>,
    pub(crate) pointers: PointerDeferralStack<'a>,
    ndr64: bool,
    depth: usize,
    max_depth: usize,
    context_handle_padding: ContextHandlePadding,
    sink: &'a mut dyn DecodeSink,
}

impl<'a> DecodeContext<'a> {
    pub fn new(buffer: &'a [u8], sink: &'a mut dyn DecodeSink, options: DecodeOptions) -> Self {
        if options.start_offset > buffer.len() {
            debug!(
                "start offset {} is past the end of a {} byte buffer",
                options.start_offset,
                buffer.len()
            );
        }
        let cursor = Cursor::new(buffer, options.byte_order)
            .at(options.start_offset)
            .with_suppressed_alignment(options.suppress_alignment);
        Self {
            cursor,
            pass: PassMode::Real,
            conformance: None,
            pointers: PointerDeferralStack::new(),
            ndr64: options.ndr64,
            depth: 0,
            max_depth: options.max_depth,
            context_handle_padding: options.context_handle_padding,
            sink,
        }
    }

    pub fn cursor(&self) -> &Cursor<'a> {
        &self.cursor
    }

    pub fn offset(&self) -> usize {
        self.cursor.offset()
    }

    pub fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.cursor.byte_order()
    }

    pub fn is_ndr64(&self) -> bool {
        self.ndr64
    }

    pub fn pass(&self) -> PassMode {
        self.pass
    }

    /// True while walking a structure only to harvest array headers
    pub fn is_prepass(&self) -> bool {
        self.pass == PassMode::Prepass
    }

    /// Current structural nesting depth
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn context_handle_padding(&self) -> ContextHandlePadding {
        self.context_handle_padding
    }

    /// Run `body` one nesting level deeper
    ///
    /// Fails with `RecursionLimitExceeded` instead of descending past the
    /// configured maximum depth.
    pub fn nested<R>(&mut self, body: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        if self.depth >= self.max_depth {
            debug!(
                "recursion limit {} reached at offset {}",
                self.max_depth,
                self.offset()
            );
            return Err(DecodeError::RecursionLimitExceeded {
                offset: self.offset(),
                limit: self.max_depth,
            });
        }
        self.depth += 1;
        let result = body(self);
        self.depth -= 1;
        result
    }

    /// Drain the referents still queued at the outermost level and return the
    /// final offset
    pub fn finish(mut self) -> Result<usize> {
        self.drain()?;
        trace!("decode finished at offset {}", self.offset());
        Ok(self.offset())
    }

    /// Hand a decoded field to the sink, with its annotation if requested
    pub(crate) fn emit(&mut self, field: &Field, value: FieldValue, range: Range<usize>) {
        if field.summary {
            let text = field.annotation(&value);
            self.sink.summary(&text);
        }
        self.sink.field(field, &value, range);
    }
}

impl fmt::Debug for DecodeContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeContext")
            .field("cursor", &self.cursor)
            .field("pass", &self.pass)
            .field("ndr64", &self.ndr64)
            .field("depth", &self.depth)
            .field("pending_referents", &self.pointers.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{NullSink, RecordingSink};

    #[test]
    fn test_new_applies_options() {
        let data = [0u8; 16];
        let mut sink = NullSink;
        let opts = DecodeOptions::new()
            .with_byte_order(ByteOrder::BigEndian)
            .with_ndr64(true)
            .with_start_offset(3);
        let ctx = DecodeContext::new(&data, &mut sink, opts);
        assert_eq!(ctx.offset(), 3);
        assert_eq!(ctx.remaining(), 13);
        assert_eq!(ctx.byte_order(), ByteOrder::BigEndian);
        assert!(ctx.is_ndr64());
        assert!(!ctx.is_prepass());
    }

    #[test]
    fn test_start_offset_past_end_fails_cleanly() {
        use crate::context_handle::decode_context_handle;
        use crate::scalar::{decode_u32, decode_u8};

        static VALUE: Field = Field::new("value");
        let data = [0u8; 4];
        let mut sink = RecordingSink::new();
        let mut ctx = DecodeContext::new(&data, &mut sink, DecodeOptions::new().with_start_offset(8));
        assert!(decode_u8(&mut ctx, &VALUE, None).unwrap_err().is_truncation());
        assert!(decode_u32(&mut ctx, &VALUE, None).unwrap_err().is_truncation());
        assert!(decode_context_handle(&mut ctx, &VALUE, None).is_err());
        assert_eq!(ctx.offset(), 8);
        drop(ctx);
        assert!(sink.fields.is_empty());
    }

    #[test]
    fn test_nested_depth_limit() {
        let data = [0u8; 4];
        let mut sink = NullSink;
        let mut ctx = DecodeContext::new(&data, &mut sink, DecodeOptions::new().with_max_depth(2));

        let ok = ctx.nested(|ctx| ctx.nested(|ctx| Ok(ctx.depth())));
        assert_eq!(ok.unwrap(), 2);
        assert_eq!(ctx.depth(), 0);

        let err = ctx
            .nested(|ctx| ctx.nested(|ctx| ctx.nested(|_| Ok(()))))
            .unwrap_err();
        assert_eq!(err, DecodeError::RecursionLimitExceeded { offset: 0, limit: 2 });
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_emit_with_annotation() {
        static CALL_ID: Field = Field::new("call_id").summarized();
        static FLAGS: Field = Field::new("flags").hex();

        let data = [0u8; 4];
        let mut sink = RecordingSink::new();
        let mut ctx = DecodeContext::new(&data, &mut sink, DecodeOptions::new());
        ctx.emit(&CALL_ID, FieldValue::U32(9), 0..4);
        ctx.emit(&FLAGS, FieldValue::U8(3), 4..5);
        ctx.finish().unwrap();

        assert_eq!(sink.names(), vec!["call_id", "flags"]);
        assert_eq!(sink.summary_line(), "call_id(9)");
    }
}
