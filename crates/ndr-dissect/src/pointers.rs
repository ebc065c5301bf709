//! NDR pointers and deferred referents
//!
//! NDR supports three pointer semantics:
//!
//! - Reference (`[ref]`): non-null; no wire header at the top level
//! - Unique (`[unique]`): nullable referent ID, no aliasing
//! - Full (`[ptr]`): nullable referent ID, aliasing allowed
//!
//! The referent of an embedded pointer is not serialized where the pointer
//! appears. It follows all fixed-size fields of the enclosing level, in the
//! order the pointers were declared. The decoder mirrors that with a stack of
//! FIFO levels: a pointer header queues its referent decode on the current
//! level, and the level drains when the enclosing structure is done. Each
//! referent runs in a fresh level of its own, which drains before the next
//! sibling referent.
//!
//! Every queued referent gets a slot in an arena addressed by
//! [`ReferentHandle`]. A full pointer whose ID was already seen in this PDU
//! is not decoded again; it resolves to the existing slot.

use crate::conformance::PassMode;
use crate::context::DecodeContext;
use crate::error::Result;
use crate::scalar::read_u3264;
use crate::sink::{Field, FieldValue};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::Range;
use tracing::{debug, trace};

/// Pointer attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerKind {
    Ref,
    Unique,
    Full,
}

/// Where the pointer appears
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerPosition {
    /// Operation parameter
    TopLevel,
    /// Member of a structure, array or union
    Embedded,
}

/// Index of a referent in the per-PDU arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReferentHandle(usize);

impl ReferentHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Outcome of reading a pointer header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerRef {
    /// Null pointer, or a pointer seen during a conformant run
    Null,
    /// Referent queued for decoding
    Deferred(ReferentHandle),
    /// Full pointer to a referent already queued in this PDU
    Alias(ReferentHandle),
}

/// Arena entry for one referent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferentRecord {
    pub referent_id: u64,
    pub kind: PointerKind,
    /// Bytes the referent was decoded from, once it has been
    pub range: Option<Range<usize>>,
}

/// Deferred decode of one referent
pub type DeferredDecode<'a> = Box<dyn FnOnce(&mut DecodeContext<'a>) -> Result<()> + 'a>;

pub struct PendingReferent<'a> {
    pub referent_id: u64,
    pub kind: PointerKind,
    handle: ReferentHandle,
    decode: DeferredDecode<'a>,
}

impl fmt::Debug for PendingReferent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingReferent")
            .field("referent_id", &self.referent_id)
            .field("kind", &self.kind)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Per-level queues of referents waiting to be decoded
#[derive(Debug)]
pub struct PointerDeferralStack<'a> {
    levels: Vec<VecDeque<PendingReferent<'a>>>,
    arena: Vec<ReferentRecord>,
    full_pointers: HashMap<u64, ReferentHandle>,
}

impl<'a> PointerDeferralStack<'a> {
    /// Stack with a single root level
    pub fn new() -> Self {
        Self {
            levels: vec![VecDeque::new()],
            arena: Vec::new(),
            full_pointers: HashMap::new(),
        }
    }

    /// Number of levels, root included
    pub fn height(&self) -> usize {
        self.levels.len()
    }

    /// Referents queued across all levels
    pub fn pending(&self) -> usize {
        self.levels.iter().map(VecDeque::len).sum()
    }

    pub fn record(&self, handle: ReferentHandle) -> Option<&ReferentRecord> {
        self.arena.get(handle.0)
    }

    pub fn records(&self) -> &[ReferentRecord] {
        &self.arena
    }

    fn push_level(&mut self) {
        self.levels.push(VecDeque::new());
    }

    /// Drop every level above `height`, discarding their queued referents
    fn truncate(&mut self, height: usize) {
        self.levels.truncate(height.max(1));
    }

    fn pop_front(&mut self) -> Option<PendingReferent<'a>> {
        self.levels.last_mut().and_then(VecDeque::pop_front)
    }

    fn register(&mut self, referent_id: u64, kind: PointerKind) -> ReferentHandle {
        let handle = ReferentHandle(self.arena.len());
        self.arena.push(ReferentRecord {
            referent_id,
            kind,
            range: None,
        });
        if kind == PointerKind::Full {
            self.full_pointers.insert(referent_id, handle);
        }
        handle
    }

    fn enqueue(&mut self, referent_id: u64, kind: PointerKind, decode: DeferredDecode<'a>) -> ReferentHandle {
        let handle = self.register(referent_id, kind);
        if self.levels.is_empty() {
            self.levels.push(VecDeque::new());
        }
        if let Some(level) = self.levels.last_mut() {
            level.push_back(PendingReferent {
                referent_id,
                kind,
                handle,
                decode,
            });
        }
        handle
    }

    fn full_pointer(&self, referent_id: u64) -> Option<ReferentHandle> {
        self.full_pointers.get(&referent_id).copied()
    }

    fn set_range(&mut self, handle: ReferentHandle, range: Range<usize>) {
        if let Some(record) = self.arena.get_mut(handle.0) {
            record.range = Some(range);
        }
    }
}

impl Default for PointerDeferralStack<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> DecodeContext<'a> {
    pub fn pointers(&self) -> &PointerDeferralStack<'a> {
        &self.pointers
    }

    /// Read a pointer header and queue `decode` for its referent
    ///
    /// Top-level `[ref]` pointers have no header. Everything else reads a
    /// referent ID (`u32`, or `u64` under NDR64) where 0 means null. During a
    /// conformant run the header is an ordinary field: nothing is read or
    /// queued and the result is `Null`.
    pub fn pointer(
        &mut self,
        field: &Field,
        kind: PointerKind,
        position: PointerPosition,
        decode: impl FnOnce(&mut DecodeContext<'a>) -> Result<()> + 'a,
    ) -> Result<PointerRef> {
        if self.is_prepass() {
            return Ok(PointerRef::Null);
        }

        if kind == PointerKind::Ref && position == PointerPosition::TopLevel {
            let handle = self.pointers.enqueue(0, kind, Box::new(decode));
            return Ok(PointerRef::Deferred(handle));
        }

        let ndr64 = self.is_ndr64();
        let (referent_id, range) = read_u3264(&mut self.cursor, ndr64).map_err(|e| {
            debug!("{}: pointer header: {}", field.name, e);
            e
        })?;

        let target = if referent_id == 0 {
            PointerRef::Null
        } else if let Some(handle) = self.full_pointer_alias(kind, referent_id) {
            trace!("{}: full pointer 0x{:x} aliases #{}", field.name, referent_id, handle.index());
            PointerRef::Alias(handle)
        } else {
            PointerRef::Deferred(self.pointers.enqueue(referent_id, kind, Box::new(decode)))
        };

        self.emit(
            field,
            FieldValue::Pointer {
                kind,
                referent_id,
                target,
            },
            range,
        );
        Ok(target)
    }

    fn full_pointer_alias(&self, kind: PointerKind, referent_id: u64) -> Option<ReferentHandle> {
        if kind == PointerKind::Full {
            self.pointers.full_pointer(referent_id)
        } else {
            None
        }
    }

    /// Run `body` in a new pointer level and decode the referents it queued
    ///
    /// On failure the stack is restored to the height it had on entry; the
    /// referents that were not reached are discarded without running.
    pub fn deferred<R>(&mut self, body: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        let height = self.pointers.height();
        self.pointers.push_level();
        let result = body(self).and_then(|value| self.drain().map(|()| value));
        self.pointers.truncate(height);
        result
    }

    /// Decode every referent queued on the current level, in queue order
    pub fn drain(&mut self) -> Result<()> {
        while let Some(pending) = self.pointers.pop_front() {
            self.decode_referent(pending)?;
        }
        Ok(())
    }

    fn decode_referent(&mut self, pending: PendingReferent<'a>) -> Result<()> {
        let PendingReferent {
            referent_id,
            handle,
            decode,
            ..
        } = pending;
        trace!("referent 0x{:x} at offset {}", referent_id, self.offset());

        // A referent starts outside any enclosing conformant run
        let saved_pass = std::mem::replace(&mut self.pass, PassMode::Real);
        let saved_table = self.conformance.take();
        let height = self.pointers.height();
        self.pointers.push_level();

        let start = self.offset();
        let result = self.nested(|ctx| {
            decode(ctx)?;
            ctx.drain()
        });

        self.pointers.truncate(height);
        self.pass = saved_pass;
        self.conformance = saved_table;

        match result {
            Ok(()) => {
                let end = self.offset();
                self.pointers.set_range(handle, start..end);
                Ok(())
            }
            Err(e) => {
                debug!("referent 0x{:x} failed: {}", referent_id, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::ArrayShape;
    use crate::drep::ByteOrder;
    use crate::encode::NdrWriter;
    use crate::error::DecodeError;
    use crate::options::DecodeOptions;
    use crate::scalar::{decode_u16, decode_u32};
    use crate::sink::{NullSink, RecordingSink};

    static PTR: Field = Field::new("ptr");
    static PTR_A: Field = Field::new("ptr_a");
    static PTR_B: Field = Field::new("ptr_b");
    static PTR_C: Field = Field::new("ptr_c");
    static A: Field = Field::new("a");
    static B: Field = Field::new("b");
    static C: Field = Field::new("c");
    static NEXT: Field = Field::new("next");
    static VALUE: Field = Field::new("value");

    fn read_u32_field<'a>(field: &'static Field) -> impl FnOnce(&mut DecodeContext<'a>) -> Result<()> + 'a {
        move |ctx| decode_u32(ctx, field, None).map(|_| ())
    }

    #[test]
    fn test_embedded_pointers_decode_in_declaration_order() {
        // struct { ptr a; u16 x; ptr b; ptr c; } then referents a, b, c
        let mut w = NdrWriter::new(ByteOrder::LittleEndian);
        w.put_u32(0x0002_0000);
        w.put_u16(0x7777);
        w.put_u32(0x0002_0004);
        w.put_u32(0x0002_0008);
        w.put_u32(0xAAAA);
        w.put_u32(0xBBBB);
        w.put_u32(0xCCCC);
        let data = w.freeze();

        let mut sink = RecordingSink::new();
        let mut ctx = DecodeContext::new(&data, &mut sink, DecodeOptions::new());
        let handles = ctx
            .deferred(|ctx| {
                let a = ctx.pointer(&PTR_A, PointerKind::Full, PointerPosition::Embedded, read_u32_field(&A))?;
                decode_u16(ctx, &VALUE, None)?;
                let b = ctx.pointer(&PTR_B, PointerKind::Full, PointerPosition::Embedded, read_u32_field(&B))?;
                let c = ctx.pointer(&PTR_C, PointerKind::Full, PointerPosition::Embedded, read_u32_field(&C))?;
                Ok([a, b, c])
            })
            .unwrap();

        let ranges: Vec<_> = handles
            .iter()
            .map(|h| match h {
                PointerRef::Deferred(h) => ctx.pointers().record(*h).unwrap().range.clone(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(ranges, vec![Some(16..20), Some(20..24), Some(24..28)]);
        assert_eq!(ctx.finish().unwrap(), 28);

        assert_eq!(
            sink.names(),
            vec!["ptr_a", "value", "ptr_b", "ptr_c", "a", "b", "c"]
        );
        assert_eq!(sink.find("c").unwrap().value, FieldValue::U32(0xCCCC));
    }

    #[test]
    fn test_null_pointer_queues_nothing() {
        let data = [0u8; 4];
        let mut sink = RecordingSink::new();
        let mut ctx = DecodeContext::new(&data, &mut sink, DecodeOptions::new());
        let target = ctx
            .deferred(|ctx| {
                ctx.pointer(&PTR, PointerKind::Unique, PointerPosition::Embedded, |_| {
                    panic!("null referent decoded")
                })
            })
            .unwrap();
        assert_eq!(target, PointerRef::Null);
        assert!(ctx.pointers().records().is_empty());
        ctx.finish().unwrap();
        assert_eq!(sink.fields[0].display, "NULL");
    }

    #[test]
    fn test_top_level_ref_has_no_header() {
        let data = [0x05, 0, 0, 0];
        let mut sink = RecordingSink::new();
        let mut ctx = DecodeContext::new(&data, &mut sink, DecodeOptions::new());
        let target = ctx
            .pointer(&PTR, PointerKind::Ref, PointerPosition::TopLevel, read_u32_field(&VALUE))
            .unwrap();
        assert!(matches!(target, PointerRef::Deferred(_)));
        assert_eq!(ctx.offset(), 0);
        assert_eq!(ctx.pointers().pending(), 1);
        assert_eq!(ctx.finish().unwrap(), 4);
        assert_eq!(sink.names(), vec!["value"]);
    }

    #[test]
    fn test_full_pointer_alias_decodes_once() {
        let mut w = NdrWriter::new(ByteOrder::LittleEndian);
        w.put_u32(0x0002_0000);
        w.put_u32(0x0002_0000);
        w.put_u32(0x1234);
        let data = w.freeze();

        let mut sink = RecordingSink::new();
        let mut ctx = DecodeContext::new(&data, &mut sink, DecodeOptions::new());
        let (first, second) = ctx
            .deferred(|ctx| {
                let first = ctx.pointer(&PTR_A, PointerKind::Full, PointerPosition::Embedded, read_u32_field(&A))?;
                let second = ctx.pointer(&PTR_B, PointerKind::Full, PointerPosition::Embedded, read_u32_field(&B))?;
                Ok((first, second))
            })
            .unwrap();
        assert_eq!(ctx.finish().unwrap(), 12);

        let PointerRef::Deferred(handle) = first else {
            panic!("first pointer not deferred");
        };
        assert_eq!(second, PointerRef::Alias(handle));
        assert_eq!(sink.names(), vec!["ptr_a", "ptr_b", "a"]);
        assert_eq!(sink.find("ptr_b").unwrap().display, "0x00020000 -> #0");
    }

    #[test]
    fn test_unique_pointers_never_alias() {
        let mut w = NdrWriter::new(ByteOrder::LittleEndian);
        w.put_u32(0x0002_0000);
        w.put_u32(0x0002_0000);
        w.put_u32(1);
        w.put_u32(2);
        let data = w.freeze();

        let mut sink = RecordingSink::new();
        let mut ctx = DecodeContext::new(&data, &mut sink, DecodeOptions::new());
        ctx.deferred(|ctx| {
            ctx.pointer(&PTR_A, PointerKind::Unique, PointerPosition::Embedded, read_u32_field(&A))?;
            ctx.pointer(&PTR_B, PointerKind::Unique, PointerPosition::Embedded, read_u32_field(&B))?;
            Ok(())
        })
        .unwrap();
        assert_eq!(ctx.finish().unwrap(), 16);
        assert_eq!(sink.names(), vec!["ptr_a", "ptr_b", "a", "b"]);
    }

    #[test]
    fn test_nested_referents_drain_before_siblings() {
        // { ptr outer_a, ptr outer_b }
        // outer_a -> { u32 a, ptr inner } ; inner -> u32 c
        // outer_b -> u32 b
        let mut w = NdrWriter::new(ByteOrder::LittleEndian);
        w.put_u32(0x10);
        w.put_u32(0x14);
        w.put_u32(0xA);
        w.put_u32(0x18);
        w.put_u32(0xC);
        w.put_u32(0xB);
        let data = w.freeze();

        let mut sink = RecordingSink::new();
        let mut ctx = DecodeContext::new(&data, &mut sink, DecodeOptions::new());
        ctx.deferred(|ctx| {
            ctx.pointer(&PTR_A, PointerKind::Unique, PointerPosition::Embedded, |ctx| {
                decode_u32(ctx, &A, None)?;
                ctx.pointer(&PTR_C, PointerKind::Unique, PointerPosition::Embedded, read_u32_field(&C))?;
                Ok(())
            })?;
            ctx.pointer(&PTR_B, PointerKind::Unique, PointerPosition::Embedded, read_u32_field(&B))?;
            Ok(())
        })
        .unwrap();
        assert_eq!(ctx.finish().unwrap(), 24);
        assert_eq!(sink.names(), vec!["ptr_a", "ptr_b", "a", "ptr_c", "c", "b"]);
    }

    #[test]
    fn test_pointers_are_inert_during_conformant_run() {
        let mut w = NdrWriter::new(ByteOrder::LittleEndian);
        w.put_u32(1);
        w.put_u32(0x0002_0000);
        w.put_u16(9);
        w.put_u32(0x55);
        let data = w.freeze();

        let mut sink = RecordingSink::new();
        let mut ctx = DecodeContext::new(&data, &mut sink, DecodeOptions::new());
        ctx.deferred(|ctx| {
            ctx.conformant_run(|ctx| {
                ctx.pointer(&PTR, PointerKind::Unique, PointerPosition::Embedded, read_u32_field(&VALUE))?;
                ctx.array(ArrayShape::Conformant, |ctx, _| decode_u16(ctx, &A, None).map(|_| ()))?;
                Ok(())
            })
        })
        .unwrap();
        assert_eq!(ctx.pointers().records().len(), 1);
        assert_eq!(ctx.finish().unwrap(), 16);
        assert_eq!(sink.names(), vec!["max_count", "ptr", "a", "value"]);
    }

    #[test]
    fn test_ndr64_referent_ids() {
        let mut w = NdrWriter::new(ByteOrder::LittleEndian).ndr64(true);
        w.put_u3264(0x0002_0000_0000_0000);
        w.put_u32(3);
        let data = w.freeze();

        let mut sink = RecordingSink::new();
        let mut ctx = DecodeContext::new(&data, &mut sink, DecodeOptions::new().with_ndr64(true));
        let target = ctx
            .deferred(|ctx| ctx.pointer(&PTR, PointerKind::Unique, PointerPosition::Embedded, read_u32_field(&VALUE)))
            .unwrap();
        let PointerRef::Deferred(handle) = target else {
            panic!("not deferred");
        };
        assert_eq!(ctx.pointers().record(handle).unwrap().referent_id, 0x0002_0000_0000_0000);
        assert_eq!(ctx.finish().unwrap(), 12);
        assert_eq!(sink.fields[0].range, 0..8);
    }

    #[test]
    fn test_pointer_chain_hits_recursion_limit() {
        // Linked list where every node points at the next one
        let mut w = NdrWriter::new(ByteOrder::LittleEndian);
        for _ in 0..32 {
            w.put_u32(0x0002_0000);
        }
        let data = w.freeze();

        fn node(ctx: &mut DecodeContext<'_>) -> Result<()> {
            ctx.pointer(&NEXT, PointerKind::Unique, PointerPosition::Embedded, node)?;
            Ok(())
        }

        let mut sink = NullSink;
        let opts = DecodeOptions::new().with_max_depth(8);
        let mut ctx = DecodeContext::new(&data, &mut sink, opts);
        let err = ctx.deferred(node).unwrap_err();
        assert!(matches!(err, DecodeError::RecursionLimitExceeded { limit: 8, .. }));
        assert_eq!(ctx.pointers().height(), 1);
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_failed_referent_leaves_earlier_siblings_intact() {
        let mut w = NdrWriter::new(ByteOrder::LittleEndian);
        w.put_u32(0x10);
        w.put_u32(0x14);
        w.put_u32(0x18);
        w.put_u32(0xA);
        w.put_u16(0xB);
        let data = w.freeze();

        let mut sink = RecordingSink::new();
        let mut ctx = DecodeContext::new(&data, &mut sink, DecodeOptions::new());
        let err = ctx
            .deferred(|ctx| {
                ctx.pointer(&PTR_A, PointerKind::Unique, PointerPosition::Embedded, read_u32_field(&A))?;
                ctx.pointer(&PTR_B, PointerKind::Unique, PointerPosition::Embedded, read_u32_field(&B))?;
                ctx.pointer(&PTR_C, PointerKind::Unique, PointerPosition::Embedded, |_| {
                    panic!("referent after a failure must not run")
                })?;
                Ok(())
            })
            .unwrap_err();
        assert_eq!(err.offset(), 16);
        assert!(err.is_truncation());

        let records = ctx.pointers().records();
        assert_eq!(records[0].range, Some(12..16));
        assert_eq!(records[1].range, None);
        assert_eq!(records[2].range, None);
        assert_eq!(ctx.pointers().pending(), 0);
        assert_eq!(ctx.pointers().height(), 1);
        ctx.finish().unwrap();
        assert_eq!(sink.find("a").unwrap().value, FieldValue::U32(0xA));
        assert!(sink.find("b").is_none());
    }

    #[test]
    fn test_truncated_pointer_header() {
        let data = [0x01, 0x00];
        let mut sink = NullSink;
        let mut ctx = DecodeContext::new(&data, &mut sink, DecodeOptions::new());
        let err = ctx
            .pointer(&PTR, PointerKind::Full, PointerPosition::Embedded, |_| Ok(()))
            .unwrap_err();
        assert!(err.is_truncation());
        assert_eq!(ctx.offset(), 0);
        assert_eq!(ctx.pointers().pending(), 0);
    }
}
