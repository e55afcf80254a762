//! Typecodes, byte order and the single-value codecs built from them.

use std::fmt;

use crate::core::{Error, Result};

/// Width in bytes of every supported datum and time value.
pub const ITEM_SIZE: usize = 8;

/// Storage type of a sample or header time value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    /// `'d'`: IEEE 754 double.
    Float64,
    /// `'q'`: signed 64-bit integer.
    Int64,
}

impl TypeCode {
    pub fn from_char(c: char) -> Result<Self> {
        match c {
            'd' => Ok(TypeCode::Float64),
            'q' => Ok(TypeCode::Int64),
            other => Err(Error::Format(format!(
                "unsupported typecode {other:?}, expected 'd' or 'q'"
            ))),
        }
    }

    pub fn as_char(self) -> char {
        match self {
            TypeCode::Float64 => 'd',
            TypeCode::Int64 => 'q',
        }
    }

    pub fn as_byte(self) -> u8 {
        self.as_char() as u8
    }

    /// NaN for floats, zero for integers.
    pub fn default_fill(self) -> Datum {
        match self {
            TypeCode::Float64 => Datum::Float(f64::NAN),
            TypeCode::Int64 => Datum::Int(0),
        }
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl std::str::FromStr for TypeCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => TypeCode::from_char(c),
            _ => Err(Error::Parse(format!("invalid typecode {s:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

impl Endian {
    #[cfg(target_endian = "big")]
    pub const fn native() -> Self {
        Endian::Big
    }

    #[cfg(target_endian = "little")]
    pub const fn native() -> Self {
        Endian::Little
    }

    pub fn from_marker(byte: u8) -> Result<Self> {
        match byte {
            b'>' => Ok(Endian::Big),
            b'<' => Ok(Endian::Little),
            other => Err(Error::Format(format!(
                "invalid endian marker {:?}, expected '>' or '<'",
                other as char
            ))),
        }
    }

    pub fn marker(self) -> u8 {
        match self {
            Endian::Big => b'>',
            Endian::Little => b'<',
        }
    }

    pub fn is_native(self) -> bool {
        self == Self::native()
    }
}

/// A single sample value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Datum {
    Float(f64),
    Int(i64),
}

impl Datum {
    pub fn typecode(self) -> TypeCode {
        match self {
            Datum::Float(_) => TypeCode::Float64,
            Datum::Int(_) => TypeCode::Int64,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Datum::Float(f) => f,
            Datum::Int(i) => i as f64,
        }
    }

    /// The integer value, if this datum is integral.
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Datum::Int(i) => Some(i),
            Datum::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(f as i64),
            Datum::Float(_) => None,
        }
    }

    pub fn is_nan(self) -> bool {
        matches!(self, Datum::Float(f) if f.is_nan())
    }

    /// Convert to `typecode`, refusing lossy float-to-integer conversions.
    pub fn coerce(self, typecode: TypeCode) -> Result<Datum> {
        match (self, typecode) {
            (Datum::Float(_), TypeCode::Float64) | (Datum::Int(_), TypeCode::Int64) => Ok(self),
            (Datum::Int(i), TypeCode::Float64) => Ok(Datum::Float(i as f64)),
            (Datum::Float(f), TypeCode::Int64) => self.as_i64().map(Datum::Int).ok_or_else(|| {
                Error::InvalidValue(format!("{f} is not integral, cannot store as 'q'"))
            }),
        }
    }

    /// Identity comparison that treats NaN as equal to NaN.
    pub fn same(self, other: Datum) -> bool {
        match (self, other) {
            (Datum::Float(a), Datum::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Float(x) => write!(f, "{x}"),
            Datum::Int(i) => write!(f, "{i}"),
        }
    }
}

impl From<f64> for Datum {
    fn from(value: f64) -> Self {
        Datum::Float(value)
    }
}

impl From<i64> for Datum {
    fn from(value: i64) -> Self {
        Datum::Int(value)
    }
}

impl From<i32> for Datum {
    fn from(value: i32) -> Self {
        Datum::Int(value.into())
    }
}

/// Encode one datum as `ITEM_SIZE` bytes in the given order.
pub fn encode(value: Datum, endian: Endian) -> [u8; ITEM_SIZE] {
    match (value, endian) {
        (Datum::Float(f), Endian::Big) => f.to_be_bytes(),
        (Datum::Float(f), Endian::Little) => f.to_le_bytes(),
        (Datum::Int(i), Endian::Big) => i.to_be_bytes(),
        (Datum::Int(i), Endian::Little) => i.to_le_bytes(),
    }
}

/// Decode one `typecode` value from exactly `ITEM_SIZE` bytes.
pub fn decode(bytes: &[u8], typecode: TypeCode, endian: Endian) -> Result<Datum> {
    let raw: [u8; ITEM_SIZE] = bytes.try_into().map_err(|_| {
        Error::Format(format!("expected {ITEM_SIZE} bytes, got {}", bytes.len()))
    })?;
    Ok(match (typecode, endian) {
        (TypeCode::Float64, Endian::Big) => Datum::Float(f64::from_be_bytes(raw)),
        (TypeCode::Float64, Endian::Little) => Datum::Float(f64::from_le_bytes(raw)),
        (TypeCode::Int64, Endian::Big) => Datum::Int(i64::from_be_bytes(raw)),
        (TypeCode::Int64, Endian::Little) => Datum::Int(i64::from_le_bytes(raw)),
    })
}

/// Copy one exact chunk into a fixed-width item.
fn item(chunk: &[u8]) -> [u8; ITEM_SIZE] {
    let mut raw = [0u8; ITEM_SIZE];
    raw.copy_from_slice(chunk);
    raw
}

/// Extend `v` to `len` items of `fill`, failing instead of aborting when
/// the allocation is impossible.
fn grow<T: Copy>(v: &mut Vec<T>, len: usize, fill: T) -> Result<()> {
    v.try_reserve_exact(len - v.len())
        .map_err(|err| Error::InvalidValue(format!("cannot grow to {len} samples: {err}")))?;
    v.resize(len, fill);
    Ok(())
}

/// An owned, typed array of samples in host order.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    Float(Vec<f64>),
    Int(Vec<i64>),
}

impl Samples {
    pub fn new(typecode: TypeCode) -> Self {
        match typecode {
            TypeCode::Float64 => Samples::Float(Vec::new()),
            TypeCode::Int64 => Samples::Int(Vec::new()),
        }
    }

    pub fn typecode(&self) -> TypeCode {
        match self {
            Samples::Float(_) => TypeCode::Float64,
            Samples::Int(_) => TypeCode::Int64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Samples::Float(v) => v.len(),
            Samples::Int(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Datum> {
        match self {
            Samples::Float(v) => v.get(index).copied().map(Datum::Float),
            Samples::Int(v) => v.get(index).copied().map(Datum::Int),
        }
    }

    /// Store `value` at an existing `index`, coerced to this array's typecode.
    pub fn set(&mut self, index: usize, value: Datum) -> Result<()> {
        let len = self.len();
        let value = value.coerce(self.typecode())?;
        let out_of_range = || Error::Index(format!("index {index} beyond array length {len}"));
        match (self, value) {
            (Samples::Float(v), Datum::Float(f)) => *v.get_mut(index).ok_or_else(out_of_range)? = f,
            (Samples::Int(v), Datum::Int(i)) => *v.get_mut(index).ok_or_else(out_of_range)? = i,
            (samples, value) => {
                return Err(Error::InvalidValue(format!(
                    "cannot store {value} in a '{}' array",
                    samples.typecode()
                )))
            }
        }
        Ok(())
    }

    /// Grow to `len` entries with `fill`; never shrinks.
    pub fn resize(&mut self, len: usize, fill: Datum) -> Result<()> {
        match (self, fill) {
            (Samples::Float(v), Datum::Float(f)) if len > v.len() => grow(v, len, f)?,
            (Samples::Int(v), Datum::Int(i)) if len > v.len() => grow(v, len, i)?,
            (Samples::Float(_), Datum::Float(_)) | (Samples::Int(_), Datum::Int(_)) => {}
            (samples, fill) => {
                let fill = fill.coerce(samples.typecode())?;
                return samples.resize(len, fill);
            }
        }
        Ok(())
    }

    /// Values in `start..stop`, clipped to the stored length.
    pub fn values(&self, start: usize, stop: usize) -> Vec<Datum> {
        let stop = stop.min(self.len());
        if start >= stop {
            return Vec::new();
        }
        match self {
            Samples::Float(v) => v[start..stop].iter().copied().map(Datum::Float).collect(),
            Samples::Int(v) => v[start..stop].iter().copied().map(Datum::Int).collect(),
        }
    }

    /// Decode a flat byte buffer written in `endian` order.
    pub fn decode_from(bytes: &[u8], typecode: TypeCode, endian: Endian) -> Result<Self> {
        if bytes.len() % ITEM_SIZE != 0 {
            return Err(Error::Format(format!(
                "data length {} is not a multiple of item size {ITEM_SIZE}",
                bytes.len()
            )));
        }
        let chunks = bytes.chunks_exact(ITEM_SIZE);
        let samples = match (typecode, endian) {
            (TypeCode::Float64, Endian::Big) => Samples::Float(
                chunks.map(|c| f64::from_be_bytes(item(c))).collect(),
            ),
            (TypeCode::Float64, Endian::Little) => Samples::Float(
                chunks.map(|c| f64::from_le_bytes(item(c))).collect(),
            ),
            (TypeCode::Int64, Endian::Big) => Samples::Int(
                chunks.map(|c| i64::from_be_bytes(item(c))).collect(),
            ),
            (TypeCode::Int64, Endian::Little) => Samples::Int(
                chunks.map(|c| i64::from_le_bytes(item(c))).collect(),
            ),
        };
        Ok(samples)
    }

    /// Encode every sample in `endian` order.
    pub fn encode_to(&self, endian: Endian, out: &mut Vec<u8>) {
        out.reserve(self.len() * ITEM_SIZE);
        match self {
            Samples::Float(v) => v
                .iter()
                .for_each(|&f| out.extend_from_slice(&encode(Datum::Float(f), endian))),
            Samples::Int(v) => v
                .iter()
                .for_each(|&i| out.extend_from_slice(&encode(Datum::Int(i), endian))),
        }
    }
}
