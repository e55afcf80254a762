//! Time grid definitions.
//!
//! An [`Epoch`] is a `(start, step)` pair. Every series that must agree on
//! slot alignment shares one. Offsets are slot numbers counted from `start`;
//! times are UNIX seconds as `f64`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result, TypeCode};

/// Largest magnitude an `i64` may have and still be exact as an `f64`.
const F64_EXACT_INT: i64 = 1 << 53;

/// A scalar that is either integral or floating point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    pub fn is_int(self) -> bool {
        matches!(self, Number::Int(_))
    }

    /// The typecode used to store this kind of number.
    pub fn typecode(self) -> TypeCode {
        match self {
            Number::Int(_) => TypeCode::Int64,
            Number::Float(_) => TypeCode::Float64,
        }
    }

    /// Widen an integer to a float, refusing values that would round.
    fn widen(self) -> Result<Number> {
        match self {
            Number::Float(_) => Ok(self),
            Number::Int(i) if (-F64_EXACT_INT..=F64_EXACT_INT).contains(&i) => {
                Ok(Number::Float(i as f64))
            }
            Number::Int(i) => Err(Error::InvalidValue(format!(
                "{i} cannot be represented exactly as a float"
            ))),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(x) => write!(f, "{x}"),
        }
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number::Int(value)
    }
}

impl From<i32> for Number {
    fn from(value: i32) -> Self {
        Number::Int(value.into())
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number::Float(value)
    }
}

/// An immutable time grid: slot `n` begins at `start + n * step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Epoch {
    start: Number,
    step: Number,
}

impl Epoch {
    /// Build an epoch, reconciling mixed integer/float inputs.
    ///
    /// If one side is an integer and the other a float, the integer is
    /// widened to a float, which fails when it cannot be represented exactly.
    pub fn new(start: impl Into<Number>, step: impl Into<Number>) -> Result<Self> {
        let (start, step) = match (start.into(), step.into()) {
            (a @ Number::Int(_), b @ Number::Int(_)) => (a, b),
            (a @ Number::Float(_), b @ Number::Float(_)) => (a, b),
            (a, b) => (a.widen()?, b.widen()?),
        };
        let step_f = step.as_f64();
        if step_f.is_nan() || step_f <= 0.0 || step_f.is_infinite() {
            return Err(Error::InvalidValue(format!("step should be > 0, got {step}")));
        }
        if !start.as_f64().is_finite() {
            return Err(Error::InvalidValue(format!("start must be finite, got {start}")));
        }
        Ok(Self { start, step })
    }

    /// An epoch starting at UNIX time zero.
    pub fn from_step(step: impl Into<Number>) -> Result<Self> {
        let step = step.into();
        let start = match step {
            Number::Int(_) => Number::Int(0),
            Number::Float(_) => Number::Float(0.0),
        };
        Self::new(start, step)
    }

    pub fn start(&self) -> Number {
        self.start
    }

    pub fn step(&self) -> Number {
        self.step
    }

    pub fn start_f64(&self) -> f64 {
        self.start.as_f64()
    }

    pub fn step_f64(&self) -> f64 {
        self.step.as_f64()
    }

    /// Whether start and step are integers.
    pub fn is_integral(&self) -> bool {
        self.start.is_int()
    }

    /// The header time typecode for this epoch.
    pub fn time_typecode(&self) -> TypeCode {
        self.start.typecode()
    }

    /// The same step with a different start, keeping the numeric kind.
    pub fn with_start(&self, start: f64) -> Result<Self> {
        let start = match self.start {
            Number::Int(_) => {
                if start.fract() != 0.0 {
                    return Err(Error::InvalidValue(format!(
                        "start {start} is not integral for an integer epoch"
                    )));
                }
                Number::Int(start as i64)
            }
            Number::Float(_) => Number::Float(start),
        };
        Self::new(start, self.step)
    }

    /// The slot number containing `when`.
    pub fn offset(&self, when: f64) -> i64 {
        ((when - self.start_f64()) / self.step_f64()).floor() as i64
    }

    /// The start time of slot `offset`.
    ///
    /// Integer grids fall back to float arithmetic past the `i64` range.
    pub fn when(&self, offset: i64) -> f64 {
        let float = || self.start_f64() + offset as f64 * self.step_f64();
        match (self.start, self.step) {
            (Number::Int(start), Number::Int(step)) => offset
                .checked_mul(step)
                .and_then(|delta| delta.checked_add(start))
                .map_or_else(float, |when| when as f64),
            _ => float(),
        }
    }

    pub fn round_down(&self, when: f64) -> f64 {
        self.when(self.offset(when))
    }

    pub fn round_up(&self, when: f64) -> f64 {
        let down = self.round_down(when);
        if down < when {
            self.when(self.offset(when).saturating_add(1))
        } else {
            down
        }
    }

    /// Slot bounds `(offset(start), offset(round_up(stop)))`.
    pub fn offset_bounds(&self, start: f64, stop: f64) -> (i64, i64) {
        (self.offset(start), self.offset(self.round_up(stop)))
    }

    /// Slot offsets covering `[start, stop)`, which must lie at or after the epoch start.
    pub fn offset_range(&self, start: f64, stop: f64) -> Result<std::ops::Range<i64>> {
        if start < self.start_f64() {
            return Err(Error::Index(format!(
                "start {start} precedes epoch start {}",
                self.start
            )));
        }
        if stop < start {
            return Err(Error::Index(format!("stop {stop} precedes start {start}")));
        }
        let (a, b) = self.offset_bounds(start, stop);
        Ok(a..b)
    }

    /// Grid times from `round_down(start)` while `< stop`.
    ///
    /// Times before the epoch start are permitted.
    pub fn range(&self, start: f64, stop: f64) -> EpochRange {
        EpochRange {
            epoch: *self,
            next: self.offset(start),
            stop,
        }
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Epoch(start={}, step={})", self.start, self.step)
    }
}

/// Lazy sequence of grid-aligned times. Clone it to restart.
#[derive(Debug, Clone)]
pub struct EpochRange {
    epoch: Epoch,
    next: i64,
    stop: f64,
}

impl Iterator for EpochRange {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        let when = self.epoch.when(self.next);
        if when >= self.stop {
            return None;
        }
        self.next = self.next.checked_add(1)?;
        Some(when)
    }
}

/// The ways an epoch may be specified at the configuration boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EpochSpec {
    Epoch(Epoch),
    Step(Number),
    StartStep(Number, Number),
}

impl EpochSpec {
    pub fn resolve(self) -> Result<Epoch> {
        match self {
            EpochSpec::Epoch(epoch) => Ok(epoch),
            EpochSpec::Step(step) => Epoch::from_step(step),
            EpochSpec::StartStep(start, step) => Epoch::new(start, step),
        }
    }
}

impl From<Epoch> for EpochSpec {
    fn from(epoch: Epoch) -> Self {
        EpochSpec::Epoch(epoch)
    }
}

impl From<Number> for EpochSpec {
    fn from(step: Number) -> Self {
        EpochSpec::Step(step)
    }
}

impl From<i64> for EpochSpec {
    fn from(step: i64) -> Self {
        EpochSpec::Step(Number::Int(step))
    }
}

impl From<i32> for EpochSpec {
    fn from(step: i32) -> Self {
        EpochSpec::Step(Number::from(step))
    }
}

impl From<f64> for EpochSpec {
    fn from(step: f64) -> Self {
        EpochSpec::Step(Number::Float(step))
    }
}

impl<A: Into<Number>, B: Into<Number>> From<(A, B)> for EpochSpec {
    fn from((start, step): (A, B)) -> Self {
        EpochSpec::StartStep(start.into(), step.into())
    }
}
