//! The fixed 24 byte `.csts` file header.
//!
//! ```text
//! 0   4  magic "csts"
//! 4   1  endian marker '>' or '<'
//! 5   1  datum typecode 'd' or 'q'
//! 6   1  time typecode 'd' or 'q'
//! 7   1  pad '_'
//! 8   8  start, time typecode, declared endianness
//! 16  8  step, same encoding
//! ```

use log::warn;

use crate::core::codec::{decode, encode, Datum, Endian, TypeCode, ITEM_SIZE};
use crate::core::{Epoch, Error, Number, Result};

pub const MAGIC: &[u8; 4] = b"csts";
pub const HEADER_LENGTH: usize = 24;
pub const PAD_BYTE: u8 = b'_';

pub const ENDIAN_OFFSET: usize = 4;
pub const TYPECODE_OFFSET: usize = 5;
pub const TIME_TYPECODE_OFFSET: usize = 6;
pub const PAD_OFFSET: usize = 7;
pub const START_OFFSET: usize = 8;
pub const STEP_OFFSET: usize = START_OFFSET + ITEM_SIZE;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSeriesFileHeader {
    pub endian: Endian,
    pub typecode: TypeCode,
    pub epoch: Epoch,
}

impl TimeSeriesFileHeader {
    pub fn new(typecode: TypeCode, epoch: Epoch, endian: Endian) -> Self {
        Self {
            endian,
            typecode,
            epoch,
        }
    }

    /// A header for a new file in host byte order.
    pub fn native(typecode: TypeCode, epoch: Epoch) -> Self {
        Self::new(typecode, epoch, Endian::native())
    }

    pub fn time_typecode(&self) -> TypeCode {
        self.epoch.time_typecode()
    }

    /// Parse the first `HEADER_LENGTH` bytes of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LENGTH {
            return Err(Error::Format(format!(
                "header is {} bytes, expected {HEADER_LENGTH}",
                buf.len()
            )));
        }
        let buf = &buf[..HEADER_LENGTH];
        if &buf[..MAGIC.len()] != MAGIC {
            return Err(Error::Format(format!(
                "bad leading magic, expected {:?}, got {:?}",
                String::from_utf8_lossy(MAGIC),
                String::from_utf8_lossy(&buf[..MAGIC.len()])
            )));
        }
        let endian = Endian::from_marker(buf[ENDIAN_OFFSET])?;
        let typecode = TypeCode::from_char(buf[TYPECODE_OFFSET] as char)?;
        let time_typecode = TypeCode::from_char(buf[TIME_TYPECODE_OFFSET] as char)?;
        if buf[PAD_OFFSET] != PAD_BYTE {
            warn!(
                "ignoring unexpected header pad byte {:?}, expected {:?}",
                buf[PAD_OFFSET] as char, PAD_BYTE as char
            );
        }
        let start = decode(&buf[START_OFFSET..STEP_OFFSET], time_typecode, endian)?;
        let step = decode(&buf[STEP_OFFSET..HEADER_LENGTH], time_typecode, endian)?;
        let epoch = Epoch::new(datum_number(start), datum_number(step))
            .map_err(|err| Error::Format(format!("header epoch: {err}")))?;
        Ok(Self {
            endian,
            typecode,
            epoch,
        })
    }

    pub fn transcribe(&self) -> [u8; HEADER_LENGTH] {
        let mut buf = [0u8; HEADER_LENGTH];
        buf[..MAGIC.len()].copy_from_slice(MAGIC);
        buf[ENDIAN_OFFSET] = self.endian.marker();
        buf[TYPECODE_OFFSET] = self.typecode.as_byte();
        buf[TIME_TYPECODE_OFFSET] = self.time_typecode().as_byte();
        buf[PAD_OFFSET] = PAD_BYTE;
        buf[START_OFFSET..STEP_OFFSET]
            .copy_from_slice(&encode(number_datum(self.epoch.start()), self.endian));
        buf[STEP_OFFSET..HEADER_LENGTH]
            .copy_from_slice(&encode(number_datum(self.epoch.step()), self.endian));
        buf
    }

    /// Encode one sample in this file's byte order.
    pub fn encode_datum(&self, value: Datum) -> Result<[u8; ITEM_SIZE]> {
        Ok(encode(value.coerce(self.typecode)?, self.endian))
    }

    pub fn decode_datum(&self, bytes: &[u8]) -> Result<Datum> {
        decode(bytes, self.typecode, self.endian)
    }
}

fn datum_number(value: Datum) -> Number {
    match value {
        Datum::Float(f) => Number::Float(f),
        Datum::Int(i) => Number::Int(i),
    }
}

fn number_datum(value: Number) -> Datum {
    match value {
        Number::Float(f) => Datum::Float(f),
        Number::Int(i) => Datum::Int(i),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_int_layout_is_byte_exact() {
        let header = TimeSeriesFileHeader::new(
            TypeCode::Float64,
            Epoch::new(1, 60).unwrap(),
            Endian::Big,
        );
        let bytes = header.transcribe();
        assert_eq!(&bytes[..8], b"csts>dq_");
        assert_eq!(&bytes[8..16], &[0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(&bytes[16..24], &[0, 0, 0, 0, 0, 0, 0, 60]);
    }

    #[test]
    fn header_round_trip_preserves_fields() {
        let header = TimeSeriesFileHeader::new(
            TypeCode::Int64,
            Epoch::new(1_700_000_000.5, 0.25).unwrap(),
            Endian::Little,
        );
        let parsed = TimeSeriesFileHeader::parse(&header.transcribe()).expect("parse header");
        assert_eq!(parsed, header);
        assert_eq!(parsed.time_typecode(), TypeCode::Float64);
    }

    #[test]
    fn rejects_bad_magic_marker_and_typecodes() {
        let good = TimeSeriesFileHeader::native(TypeCode::Float64, Epoch::new(0, 1).unwrap())
            .transcribe();

        let mut bad = good;
        bad[0] = b'x';
        assert!(matches!(TimeSeriesFileHeader::parse(&bad), Err(Error::Format(_))));

        let mut bad = good;
        bad[ENDIAN_OFFSET] = b'=';
        assert!(matches!(TimeSeriesFileHeader::parse(&bad), Err(Error::Format(_))));

        let mut bad = good;
        bad[TYPECODE_OFFSET] = b'f';
        assert!(matches!(TimeSeriesFileHeader::parse(&bad), Err(Error::Format(_))));

        let mut bad = good;
        bad[TIME_TYPECODE_OFFSET] = b'i';
        assert!(matches!(TimeSeriesFileHeader::parse(&bad), Err(Error::Format(_))));

        assert!(matches!(
            TimeSeriesFileHeader::parse(&good[..20]),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn odd_pad_byte_is_tolerated() {
        let mut bytes = TimeSeriesFileHeader::native(TypeCode::Int64, Epoch::new(0, 5).unwrap())
            .transcribe();
        bytes[PAD_OFFSET] = b'!';
        let parsed = TimeSeriesFileHeader::parse(&bytes).expect("pad byte only warns");
        assert_eq!(parsed.typecode, TypeCode::Int64);
    }
}
