//! Output side of the decoder
//!
//! The engine never renders anything itself. Each decoded field is handed to
//! a [`DecodeSink`] owned by the calling dissector together with the byte
//! range it was read from, and fields marked for the summary line produce a
//! `name(value)` annotation.

use crate::pointers::{PointerKind, PointerRef};
use crate::scalar::Uuid;
use std::fmt;
use std::ops::Range;

/// How integers are rendered in annotations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Base {
    #[default]
    Dec,
    Hex,
}

/// Static description of a protocol field
///
/// Field descriptors are built once (usually as `static`s next to the
/// dissector that uses them) and shared read-only between decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub base: Base,
    /// Append `name(value)` to the summary line whenever this field decodes
    pub summary: bool,
}

impl Field {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            base: Base::Dec,
            summary: false,
        }
    }

    pub const fn hex(mut self) -> Self {
        self.base = Base::Hex;
        self
    }

    pub const fn summarized(mut self) -> Self {
        self.summary = true;
        self
    }

    /// Format the summary annotation for `value`
    pub fn annotation(&self, value: &FieldValue) -> String {
        format!("{}({})", self.name, value.display(self.base))
    }
}

/// A decoded value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    /// Seconds since the unix epoch
    Time(u32),
    Uuid(Uuid),
    Bytes(Vec<u8>),
    Text(String),
    Pointer {
        kind: PointerKind,
        referent_id: u64,
        target: PointerRef,
    },
}

impl FieldValue {
    /// Render for display; `Base::Hex` only affects integers
    pub fn display(&self, base: Base) -> String {
        match (self, base) {
            (Self::U8(v), Base::Hex) => format!("0x{:02x}", v),
            (Self::U16(v), Base::Hex) => format!("0x{:04x}", v),
            (Self::U32(v), Base::Hex) => format!("0x{:08x}", v),
            (Self::U64(v), Base::Hex) => format!("0x{:016x}", v),
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8(v) => write!(f, "{}", v),
            Self::U16(v) => write!(f, "{}", v),
            Self::U32(v) => write!(f, "{}", v),
            Self::U64(v) => write!(f, "{}", v),
            Self::F32(v) => write!(f, "{}", v),
            Self::F64(v) => write!(f, "{}", v),
            Self::Time(v) => write!(f, "{}", v),
            Self::Uuid(v) => write!(f, "{}", v),
            Self::Bytes(bytes) => {
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            Self::Text(s) => f.write_str(s),
            Self::Pointer {
                referent_id,
                target,
                ..
            } => match target {
                PointerRef::Null => f.write_str("NULL"),
                PointerRef::Deferred(_) => write!(f, "0x{:08x}", referent_id),
                PointerRef::Alias(handle) => {
                    write!(f, "0x{:08x} -> #{}", referent_id, handle.index())
                }
            },
        }
    }
}

/// Receiver of decoded fields, implemented by the protocol dissector
pub trait DecodeSink {
    /// A field was decoded from `range` of the buffer
    fn field(&mut self, field: &Field, value: &FieldValue, range: Range<usize>);

    /// An annotation requested by a summarized field
    fn summary(&mut self, text: &str) {
        let _ = text;
    }
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DecodeSink for NullSink {
    fn field(&mut self, _field: &Field, _value: &FieldValue, _range: Range<usize>) {}
}

/// One entry captured by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedField {
    pub name: &'static str,
    pub value: FieldValue,
    pub range: Range<usize>,
    pub display: String,
}

/// Sink that keeps every field and annotation in memory
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub fields: Vec<RecordedField>,
    pub annotations: Vec<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// First recorded field with the given name
    pub fn find(&self, name: &str) -> Option<&RecordedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Recorded field names in decode order
    pub fn names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    /// The summary line as a dissector would show it
    pub fn summary_line(&self) -> String {
        self.annotations.join(", ")
    }
}

impl DecodeSink for RecordingSink {
    fn field(&mut self, field: &Field, value: &FieldValue, range: Range<usize>) {
        self.fields.push(RecordedField {
            name: field.name,
            value: value.clone(),
            range,
            display: value.display(field.base),
        });
    }

    fn summary(&mut self, text: &str) {
        self.annotations.push(text.to_string());
    }
}
