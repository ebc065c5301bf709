//! NDR decode error types

use crate::conformance::ArrayShape;
use std::fmt;
use thiserror::Error;

/// Why the real pass could not be matched against the conformant run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConformanceMismatch {
    /// The real pass reached an array the conformant run never recorded
    Unrecorded { shape: ArrayShape },
    /// The recorded header belongs to an array of a different shape
    ShapeChanged {
        recorded: ArrayShape,
        requested: ArrayShape,
    },
    /// Headers recorded by the conformant run that the real pass never used
    Unconsumed { remaining: usize },
    /// `offset + actual_count` exceeds `max_count`
    VarianceExceedsConformance {
        max_count: u64,
        offset: u64,
        actual_count: u64,
    },
}

impl fmt::Display for ConformanceMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unrecorded { shape } => {
                write!(f, "{:?} array was not visited by the conformant run", shape)
            }
            Self::ShapeChanged { recorded, requested } => write!(
                f,
                "conformant run recorded a {:?} header, real pass expects {:?}",
                recorded, requested
            ),
            Self::Unconsumed { remaining } => {
                write!(f, "{} recorded header(s) never reached by the real pass", remaining)
            }
            Self::VarianceExceedsConformance {
                max_count,
                offset,
                actual_count,
            } => write!(
                f,
                "offset {} + actual_count {} exceeds max_count {}",
                offset, actual_count, max_count
            ),
        }
    }
}

/// NDR decoding errors
///
/// Every variant carries the byte offset the failure was detected at, so a
/// dissector can place a "malformed" marker at that point.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Requested read runs past the end of the buffer
    #[error("out of bounds at offset {offset}: needed {needed} bytes, have {have}")]
    OutOfBounds {
        offset: usize,
        needed: usize,
        have: usize,
    },

    /// Structural nesting deeper than the configured limit
    #[error("recursion limit of {limit} exceeded at offset {offset}")]
    RecursionLimitExceeded { offset: usize, limit: usize },

    /// Real pass and conformant run disagree about array headers
    #[error("inconsistent conformance header at offset {offset}: {reason}")]
    InconsistentConformanceHeader {
        offset: usize,
        reason: ConformanceMismatch,
    },
}

impl DecodeError {
    /// Byte offset at which decoding stopped
    pub fn offset(&self) -> usize {
        match self {
            Self::OutOfBounds { offset, .. }
            | Self::RecursionLimitExceeded { offset, .. }
            | Self::InconsistentConformanceHeader { offset, .. } => *offset,
        }
    }

    /// Truncation only aborts the current field; the other kinds abort the PDU
    pub fn is_truncation(&self) -> bool {
        matches!(self, Self::OutOfBounds { .. })
    }
}

/// Result type for NDR decode operations
pub type Result<T> = std::result::Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_accessor() {
        let err = DecodeError::OutOfBounds {
            offset: 12,
            needed: 4,
            have: 1,
        };
        assert_eq!(err.offset(), 12);
        assert!(err.is_truncation());

        let err = DecodeError::InconsistentConformanceHeader {
            offset: 40,
            reason: ConformanceMismatch::Unconsumed { remaining: 1 },
        };
        assert_eq!(err.offset(), 40);
        assert!(!err.is_truncation());
    }

    #[test]
    fn test_display() {
        let err = DecodeError::InconsistentConformanceHeader {
            offset: 8,
            reason: ConformanceMismatch::VarianceExceedsConformance {
                max_count: 4,
                offset: 2,
                actual_count: 3,
            },
        };
        assert_eq!(
            err.to_string(),
            "inconsistent conformance header at offset 8: offset 2 + actual_count 3 exceeds max_count 4"
        );
    }
}
