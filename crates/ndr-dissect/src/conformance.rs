//! Conformant runs and array headers
//!
//! NDR hoists the size header of a conformant array in front of the
//! smallest aggregate that contains it:
//!
//! ```text
//! struct { u16 a; u32 b; [size_is(n)] u8 data[]; }
//!
//! max_count | a | pad | b | data[0..max_count]
//! ```
//!
//! The header is consumed before the fields that precede the array in
//! declaration order, so the aggregate is walked twice with the same
//! routine. During the conformant run ([`PassMode::Prepass`]) ordinary
//! scalars are no-ops and only array headers are read, in visitation order.
//! The real pass then hands each array occurrence the header recorded for it.
//! Both passes must visit arrays in the same order; any disagreement is
//! reported as `InconsistentConformanceHeader`.

use crate::context::DecodeContext;
use crate::error::{ConformanceMismatch, DecodeError, Result};
use crate::scalar::read_u3264;
use crate::sink::{Field, FieldValue};
use tracing::{debug, trace};

static MAX_COUNT: Field = Field::new("max_count");
static OFFSET: Field = Field::new("offset");
static ACTUAL_COUNT: Field = Field::new("actual_count");

/// Which walk of an aggregate is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassMode {
    /// Conformant run: harvest array headers, skip everything else
    Prepass,
    /// Decode for real
    Real,
}

/// Header layout of an array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayShape {
    /// `max_count`
    Conformant,
    /// `offset`, `actual_count`
    Varying,
    /// `max_count`, `offset`, `actual_count`
    ConformantVarying,
}

impl ArrayShape {
    pub fn is_conformant(self) -> bool {
        matches!(self, Self::Conformant | Self::ConformantVarying)
    }

    pub fn is_varying(self) -> bool {
        matches!(self, Self::Varying | Self::ConformantVarying)
    }
}

/// Counts read from an array header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArrayHeader {
    pub max_count: u64,
    pub offset: u64,
    pub actual_count: u64,
}

impl ArrayHeader {
    /// Number of elements present on the wire
    pub fn element_count(&self, shape: ArrayShape) -> u64 {
        if shape.is_varying() {
            self.actual_count
        } else {
            self.max_count
        }
    }
}

/// Headers harvested by the conformant run of the outermost aggregate
#[derive(Debug, Default)]
pub(crate) struct ConformanceTable {
    headers: Vec<(ArrayShape, ArrayHeader)>,
    next: usize,
}

impl ConformanceTable {
    fn record(&mut self, shape: ArrayShape, header: ArrayHeader) {
        self.headers.push((shape, header));
    }

    fn take(&mut self, shape: ArrayShape) -> std::result::Result<ArrayHeader, ConformanceMismatch> {
        let (recorded, header) = *self
            .headers
            .get(self.next)
            .ok_or(ConformanceMismatch::Unrecorded { shape })?;
        if recorded != shape {
            return Err(ConformanceMismatch::ShapeChanged {
                recorded,
                requested: shape,
            });
        }
        self.next += 1;
        Ok(header)
    }

    fn unconsumed(&self) -> usize {
        self.headers.len() - self.next
    }
}

impl<'a> DecodeContext<'a> {
    /// Walk an aggregate twice: conformant run, then the real decode
    ///
    /// `walk` must visit fields in the same order on both calls; its result
    /// from the conformant run is discarded. Inside another conformant run
    /// the walk joins the outer one and runs once in the current pass.
    pub fn conformant_run<R>(&mut self, mut walk: impl FnMut(&mut Self) -> Result<R>) -> Result<R> {
        if self.conformance.is_some() {
            return walk(self);
        }

        trace!("conformant run at offset {}", self.offset());
        let saved_pass = self.pass;
        self.conformance = Some(ConformanceTable::default());
        self.pass = PassMode::Prepass;
        let prepass = walk(self);

        self.pass = PassMode::Real;
        let result = match prepass {
            Ok(_) => {
                trace!("real pass at offset {}", self.offset());
                walk(self)
            }
            Err(e) => Err(e),
        };

        self.pass = saved_pass;
        let table = self.conformance.take();
        let value = result?;

        let remaining = table.map_or(0, |t| t.unconsumed());
        if remaining > 0 {
            return Err(self.inconsistent(ConformanceMismatch::Unconsumed { remaining }));
        }
        Ok(value)
    }

    /// Decode an array element by element
    ///
    /// The header comes from the enclosing conformant run; without one the
    /// array runs its own. `element` receives the index relative to the
    /// header's `offset` and is called once per element in the real pass
    /// only. Each element starts outside the enclosing run, so arrays inside
    /// an element read their headers in place.
    pub fn array(
        &mut self,
        shape: ArrayShape,
        mut element: impl FnMut(&mut Self, u64) -> Result<()>,
    ) -> Result<ArrayHeader> {
        let mut body = |ctx: &mut Self, header: &ArrayHeader| -> Result<()> {
            for index in 0..header.element_count(shape) {
                let saved_table = ctx.conformance.take();
                let result = ctx.nested(|ctx| element(ctx, index));
                ctx.conformance = saved_table;
                result?;
            }
            Ok(())
        };
        self.array_block(shape, &mut body)
    }

    /// Decode an array whose body is consumed in one piece
    ///
    /// Like [`array`](Self::array), but `body` receives the header and is
    /// responsible for the whole element block (strings, byte blobs).
    pub fn array_block(
        &mut self,
        shape: ArrayShape,
        body: &mut dyn FnMut(&mut Self, &ArrayHeader) -> Result<()>,
    ) -> Result<ArrayHeader> {
        self.sized_array_block(shape, 1, body)
    }

    /// [`array_block`](Self::array_block) for elements of at least
    /// `element_size` bytes
    ///
    /// A count whose elements cannot fit in the remaining bytes is rejected
    /// before `body` runs.
    pub fn sized_array_block(
        &mut self,
        shape: ArrayShape,
        element_size: usize,
        body: &mut dyn FnMut(&mut Self, &ArrayHeader) -> Result<()>,
    ) -> Result<ArrayHeader> {
        if self.conformance.is_some() {
            return self.array_in_run(shape, element_size, body);
        }
        self.conformant_run(|ctx| ctx.array_in_run(shape, element_size, &mut *body))
    }

    fn array_in_run(
        &mut self,
        shape: ArrayShape,
        element_size: usize,
        body: &mut dyn FnMut(&mut Self, &ArrayHeader) -> Result<()>,
    ) -> Result<ArrayHeader> {
        match self.pass {
            PassMode::Prepass => {
                let header = self.read_array_header(shape)?;
                if let Some(table) = self.conformance.as_mut() {
                    table.record(shape, header);
                }
                Ok(header)
            }
            PassMode::Real => {
                let taken = match self.conformance.as_mut() {
                    Some(table) => table.take(shape),
                    None => Err(ConformanceMismatch::Unrecorded { shape }),
                };
                let header = taken.map_err(|reason| self.inconsistent(reason))?;

                let count = header.element_count(shape);
                let needed = usize::try_from(count)
                    .ok()
                    .and_then(|count| count.checked_mul(element_size))
                    .unwrap_or(usize::MAX);
                if needed > self.remaining() {
                    debug!(
                        "{:?} array of {} elements of {} bytes exceeds {} remaining bytes",
                        shape,
                        count,
                        element_size,
                        self.remaining()
                    );
                    return Err(DecodeError::OutOfBounds {
                        offset: self.offset(),
                        needed,
                        have: self.remaining(),
                    });
                }
                body(self, &header)?;
                Ok(header)
            }
        }
    }

    /// Read the header fields of `shape` for real, whatever the pass
    fn read_array_header(&mut self, shape: ArrayShape) -> Result<ArrayHeader> {
        let mut header = ArrayHeader::default();
        if shape.is_conformant() {
            header.max_count = self.read_header_count(&MAX_COUNT)?;
        }
        if shape.is_varying() {
            header.offset = self.read_header_count(&OFFSET)?;
            header.actual_count = self.read_header_count(&ACTUAL_COUNT)?;
        }
        if shape == ArrayShape::ConformantVarying {
            let in_range = header
                .offset
                .checked_add(header.actual_count)
                .is_some_and(|end| end <= header.max_count);
            if !in_range {
                return Err(self.inconsistent(ConformanceMismatch::VarianceExceedsConformance {
                    max_count: header.max_count,
                    offset: header.offset,
                    actual_count: header.actual_count,
                }));
            }
        }
        Ok(header)
    }

    fn read_header_count(&mut self, field: &Field) -> Result<u64> {
        let ndr64 = self.is_ndr64();
        let (value, range) = read_u3264(&mut self.cursor, ndr64)?;
        self.emit(field, FieldValue::U64(value), range);
        Ok(value)
    }

    fn inconsistent(&self, reason: ConformanceMismatch) -> DecodeError {
        debug!("inconsistent conformance at offset {}: {}", self.offset(), reason);
        DecodeError::InconsistentConformanceHeader {
            offset: self.offset(),
            reason,
        }
    }
}
