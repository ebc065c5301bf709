//! Data Representation Format Label (DREP)
//!
//! Every DCE RPC PDU header carries a 4-byte label describing how the stub
//! data is encoded:
//!
//! ```text
//! +--------+--------+--------+--------+
//! |int|char| float  |   reserved      |
//! +--------+--------+--------+--------+
//! ```
//!
//! The integer representation selects the byte order of every multi-byte
//! scalar. Strings and floats are always decoded as ASCII and IEEE; a label
//! asking for anything else is logged.

/// Integer byte order of the stub data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    BigEndian,
    #[default]
    LittleEndian,
}

/// Character representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharRep {
    Ascii = 0,
    Ebcdic = 1,
}

/// Floating point representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatRep {
    Ieee = 0,
    Vax = 1,
    Cray = 2,
    Ibm = 3,
}

/// Decoded DREP label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRepresentation {
    pub byte_order: ByteOrder,
    pub char_rep: CharRep,
    pub float_rep: FloatRep,
}

impl DataRepresentation {
    /// Little-endian, ASCII, IEEE: what nearly every Windows peer sends
    pub fn ndr() -> Self {
        Self {
            byte_order: ByteOrder::LittleEndian,
            char_rep: CharRep::Ascii,
            float_rep: FloatRep::Ieee,
        }
    }

    /// Decode from the 4-byte wire label
    ///
    /// Byte 0: bits 4-7 integer representation, bits 0-3 character
    /// representation. Byte 1: floating point representation. Any value in a
    /// field is accepted; unknown float representations map to `Ibm`.
    pub fn decode(data: [u8; 4]) -> Self {
        let byte_order = if (data[0] & 0xF0) == 0 {
            ByteOrder::BigEndian
        } else {
            ByteOrder::LittleEndian
        };
        let char_rep = if (data[0] & 0x0F) == 0 {
            CharRep::Ascii
        } else {
            CharRep::Ebcdic
        };
        let float_rep = match data[1] {
            0 => FloatRep::Ieee,
            1 => FloatRep::Vax,
            2 => FloatRep::Cray,
            _ => FloatRep::Ibm,
        };
        Self {
            byte_order,
            char_rep,
            float_rep,
        }
    }

    /// Character and float representations decode as ASCII and IEEE
    pub fn is_native(&self) -> bool {
        self.char_rep == CharRep::Ascii && self.float_rep == FloatRep::Ieee
    }
}

impl Default for DataRepresentation {
    fn default() -> Self {
        Self::ndr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_common_labels() {
        let le = DataRepresentation::decode([0x10, 0x00, 0x00, 0x00]);
        assert_eq!(le, DataRepresentation::ndr());
        assert!(le.is_native());

        let be = DataRepresentation::decode([0x00, 0x00, 0x00, 0x00]);
        assert_eq!(be.byte_order, ByteOrder::BigEndian);
    }

    #[test]
    fn test_decode_odd_nibbles() {
        let drep = DataRepresentation::decode([0x31, 0x07, 0xFF, 0xFF]);
        assert_eq!(drep.byte_order, ByteOrder::LittleEndian);
        assert_eq!(drep.char_rep, CharRep::Ebcdic);
        assert_eq!(drep.float_rep, FloatRep::Ibm);
        assert!(!drep.is_native());
    }
}
