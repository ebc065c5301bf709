//! NDR (Network Data Representation) decoding engine for RPC dissectors
//!
//! This crate decodes DCE RPC stub data in classic NDR and NDR64 and reports
//! every field to a caller-supplied [`DecodeSink`]. Protocol dissectors drive
//! it by calling the decoders in wire order against one [`DecodeContext`]
//! per PDU body.
//!
//! # NDR Wire Format
//!
//! - Primitives align to their natural size (1, 2, 4, or 8 bytes), relative
//!   to the start of the stub data
//! - Array headers of a structure are hoisted in front of it; the context
//!   collects them in a conformant-run pre-pass
//! - Embedded pointers carry a referent id inline; the referents follow at
//!   the end of the enclosing level, in pointer order
//! - NDR64 widens referent ids and array headers to 64 bits and enum and
//!   union discriminants to 32 bits
//!
//! # Example
//!
//! ```
//! use ndr_dissect::{decode_u32, DecodeContext, DecodeOptions, Field, RecordingSink};
//!
//! static OPNUM: Field = Field::new("opnum").summarized();
//!
//! let data = [0x0f, 0x00, 0x00, 0x00];
//! let mut sink = RecordingSink::new();
//! let mut ctx = DecodeContext::new(&data, &mut sink, DecodeOptions::from_drep([0x10, 0, 0, 0]));
//! let mut opnum = 0u32;
//! decode_u32(&mut ctx, &OPNUM, Some(&mut opnum))?;
//! assert_eq!(ctx.finish()?, 4);
//! assert_eq!(opnum, 15);
//! assert_eq!(sink.summary_line(), "opnum(15)");
//! # Ok::<(), ndr_dissect::DecodeError>(())
//! ```

mod conformance;
mod context;
mod context_handle;
mod cursor;
mod drep;
mod encode;
mod error;
mod options;
mod pointers;
mod scalar;
mod sink;
mod strings;

pub use conformance::{ArrayHeader, ArrayShape, PassMode};
pub use context::DecodeContext;
pub use context_handle::{decode_context_handle, ContextHandle, ContextHandlePadding};
pub use cursor::{align_padding, Cursor};
pub use drep::{ByteOrder, CharRep, DataRepresentation, FloatRep};
pub use encode::NdrWriter;
pub use error::{ConformanceMismatch, DecodeError, Result};
pub use options::{DecodeOptions, DEFAULT_MAX_DEPTH};
pub use pointers::{
    DeferredDecode, PendingReferent, PointerDeferralStack, PointerKind, PointerPosition, PointerRef,
    ReferentHandle, ReferentRecord,
};
pub use scalar::{
    decode_duint32, decode_f32, decode_f64, decode_time32, decode_u16, decode_u1632, decode_u32,
    decode_u3264, decode_u64, decode_u8, decode_uuid, Uuid,
};
pub use sink::{Base, DecodeSink, Field, FieldValue, NullSink, RecordedField, RecordingSink};
pub use strings::{decode_string, CharWidth};

/// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};
