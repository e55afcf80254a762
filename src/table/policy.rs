//! Timespan policies.
//!
//! A policy maps UNIX times onto calendar partitions (days, ISO weeks,
//! months or years in a fixed timezone) and rounds the calendar edges onto
//! the shared time grid, so every grid slot belongs to exactly one partition.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use time::{Date, Duration, Month, Weekday};

use crate::core::{Epoch, Error, Result};
use crate::table::Timezone;

/// A named, grid-aligned span of time: slots `offset0 .. offset0 + steps`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimePartition {
    pub epoch: Epoch,
    pub name: String,
    pub offset0: i64,
    pub steps: i64,
}

impl TimePartition {
    pub fn start(&self) -> f64 {
        self.epoch.when(self.offset0)
    }

    pub fn stop(&self) -> f64 {
        self.epoch.when(self.offset0 + self.steps)
    }

    pub fn contains(&self, when: f64) -> bool {
        let offset = self.epoch.offset(when);
        offset >= self.offset0 && offset < self.offset0 + self.steps
    }

    /// The epoch for this partition's own file: same step, starting at the partition.
    pub fn local_epoch(&self) -> Result<Epoch> {
        self.epoch.with_start(self.start())
    }

    /// Restrict to the grid slots inside `[start, stop)`.
    fn clipped(mut self, start: f64, stop: f64) -> Self {
        let first = self.offset0.max(self.epoch.offset(start));
        let last = (self.offset0 + self.steps).min(self.epoch.offset(self.epoch.round_up(stop)));
        self.offset0 = first;
        self.steps = (last - first).max(0);
        self
    }
}

/// Maps times to named partitions.
pub trait TimespanPolicy: fmt::Debug + Send + Sync {
    /// The registry name, e.g. `"monthly"`.
    fn name(&self) -> &str;

    fn epoch(&self) -> Epoch;

    fn timezone(&self) -> Timezone;

    /// Calendar bounds `(raw_start, raw_end)` of the unit containing `when`,
    /// with `raw_start <= when < raw_end`.
    fn raw_edges(&self, when: f64) -> Result<(f64, f64)>;

    /// The partition label for `when`.
    fn name_for_time(&self, when: f64) -> Result<String>;

    /// The raw calendar start of the partition called `name`.
    ///
    /// # Errors
    ///
    /// - `Error::Parse`: `name` is malformed or not canonical
    fn raw_start_for_name(&self, name: &str) -> Result<f64>;

    /// The partition containing `when`.
    ///
    /// Both raw edges are rounded down onto the grid, so the slot straddling
    /// a calendar boundary belongs to the later partition.
    fn span_for_time(&self, when: f64) -> Result<TimePartition> {
        let epoch = self.epoch();
        let offset = epoch.offset(when);
        let (mut raw_start, mut raw_end) = self.raw_edges(when)?;
        // A grid slot can straddle the raw end, in which case it opens the next unit.
        while offset >= epoch.offset(raw_end) {
            raw_start = raw_end;
            raw_end = self.raw_edges(raw_start)?.1;
        }
        let offset0 = epoch.offset(raw_start);
        Ok(TimePartition {
            epoch,
            name: self.name_for_time(raw_start)?,
            offset0,
            steps: epoch.offset(raw_end) - offset0,
        })
    }

    fn span_for_name(&self, name: &str) -> Result<TimePartition> {
        let epoch = self.epoch();
        let (raw_start, raw_end) = self.raw_edges(self.raw_start_for_name(name)?)?;
        let offset0 = epoch.offset(raw_start);
        Ok(TimePartition {
            epoch,
            name: name.to_string(),
            offset0,
            steps: epoch.offset(raw_end) - offset0,
        })
    }

    /// Contiguous partitions covering `[round_down(start), stop)`, the last
    /// one clipped at `round_up(stop)`.
    fn partitioned_spans(
        &self,
        start: f64,
        stop: f64,
    ) -> Box<dyn Iterator<Item = Result<TimePartition>> + '_> {
        let mut when = start;
        let mut failed = false;
        Box::new(std::iter::from_fn(move || {
            if failed || when >= stop {
                return None;
            }
            match self.span_for_time(when) {
                Ok(span) => {
                    when = span.stop();
                    Some(Ok(span.clipped(start, stop)))
                }
                Err(err) => {
                    failed = true;
                    Some(Err(err))
                }
            }
        }))
    }
}

/// The calendar units a [`CalendarPolicy`] partitions by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarUnit {
    Daily,
    Weekly,
    Monthly,
    Annual,
}

impl CalendarUnit {
    pub fn name(self) -> &'static str {
        match self {
            CalendarUnit::Daily => "daily",
            CalendarUnit::Weekly => "weekly",
            CalendarUnit::Monthly => "monthly",
            CalendarUnit::Annual => "annual",
        }
    }

    /// The first day of the unit containing `date`.
    fn floor(self, date: Date) -> Result<Date> {
        match self {
            CalendarUnit::Daily => Ok(date),
            CalendarUnit::Weekly => date
                .checked_sub(Duration::days(date.weekday().number_days_from_monday().into()))
                .ok_or_else(|| out_of_range(date)),
            CalendarUnit::Monthly => calendar_date(date.year(), date.month(), 1),
            CalendarUnit::Annual => calendar_date(date.year(), Month::January, 1),
        }
    }

    /// The first day of the unit after the one starting at `start`.
    fn next(self, start: Date) -> Result<Date> {
        match self {
            CalendarUnit::Daily => start.next_day().ok_or_else(|| out_of_range(start)),
            CalendarUnit::Weekly => start
                .checked_add(Duration::days(7))
                .ok_or_else(|| out_of_range(start)),
            CalendarUnit::Monthly => match start.month() {
                Month::December => calendar_date(start.year() + 1, Month::January, 1),
                month => calendar_date(start.year(), month.next(), 1),
            },
            CalendarUnit::Annual => calendar_date(start.year() + 1, Month::January, 1),
        }
    }

    fn label(self, date: Date) -> String {
        match self {
            CalendarUnit::Daily => format!(
                "{:04}-{:02}-{:02}",
                date.year(),
                u8::from(date.month()),
                date.day()
            ),
            CalendarUnit::Weekly => {
                let (year, week, _) = date.to_iso_week_date();
                format!("{year:04}-W{week:02}")
            }
            CalendarUnit::Monthly => format!("{:04}-{:02}", date.year(), u8::from(date.month())),
            CalendarUnit::Annual => format!("{:04}", date.year()),
        }
    }

    /// Parse a label back to the first day of its unit.
    fn parse_label(self, name: &str) -> Result<Date> {
        let bad = || Error::Parse(format!("invalid {} partition name: {name:?}", self.name()));
        let date = match self {
            CalendarUnit::Weekly => {
                let (year, week) = name.split_once("-W").ok_or_else(bad)?;
                let year = parse_field(year, 4).ok_or_else(bad)?;
                let week = parse_field(week, 2).ok_or_else(bad)?;
                Date::from_iso_week_date(year, u8::try_from(week).map_err(|_| bad())?, Weekday::Monday)
                    .map_err(|_| bad())?
            }
            _ => {
                let fields: Vec<&str> = name.split('-').collect();
                let expected = match self {
                    CalendarUnit::Daily => 3,
                    CalendarUnit::Monthly => 2,
                    _ => 1,
                };
                if fields.len() != expected {
                    return Err(bad());
                }
                let year = parse_field(fields[0], 4).ok_or_else(bad)?;
                let month = match fields.get(1) {
                    Some(field) => parse_field(field, 2).ok_or_else(bad)?,
                    None => 1,
                };
                let day = match fields.get(2) {
                    Some(field) => parse_field(field, 2).ok_or_else(bad)?,
                    None => 1,
                };
                let month = u8::try_from(month)
                    .ok()
                    .and_then(|m| Month::try_from(m).ok())
                    .ok_or_else(bad)?;
                Date::from_calendar_date(year, month, u8::try_from(day).map_err(|_| bad())?)
                    .map_err(|_| bad())?
            }
        };
        // Only canonical labels name a partition.
        if self.label(date) != name {
            return Err(bad());
        }
        Ok(date)
    }
}

impl fmt::Display for CalendarUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CalendarUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "daily" => Ok(CalendarUnit::Daily),
            "weekly" => Ok(CalendarUnit::Weekly),
            "monthly" => Ok(CalendarUnit::Monthly),
            "annual" | "yearly" => Ok(CalendarUnit::Annual),
            _ => Err(Error::InvalidValue(format!("unknown timespan policy: {s:?}"))),
        }
    }
}

/// Partitions by calendar unit in a fixed timezone.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarPolicy {
    unit: CalendarUnit,
    epoch: Epoch,
    timezone: Timezone,
}

impl CalendarPolicy {
    pub fn new(unit: CalendarUnit, epoch: Epoch, timezone: Timezone) -> Self {
        Self {
            unit,
            epoch,
            timezone,
        }
    }

    pub fn daily(epoch: Epoch) -> Self {
        Self::new(CalendarUnit::Daily, epoch, Timezone::UTC)
    }

    pub fn weekly(epoch: Epoch) -> Self {
        Self::new(CalendarUnit::Weekly, epoch, Timezone::UTC)
    }

    pub fn monthly(epoch: Epoch) -> Self {
        Self::new(CalendarUnit::Monthly, epoch, Timezone::UTC)
    }

    pub fn annual(epoch: Epoch) -> Self {
        Self::new(CalendarUnit::Annual, epoch, Timezone::UTC)
    }

    pub fn unit(&self) -> CalendarUnit {
        self.unit
    }

    /// The local calendar date containing `when`.
    fn local_date(&self, when: f64) -> Result<Date> {
        if !when.is_finite() {
            return Err(Error::InvalidValue(format!("time {when} is not finite")));
        }
        self.timezone.local_date(when.floor() as i64)
    }

    /// UNIX time of local midnight starting `date`.
    fn midnight(&self, date: Date) -> Result<f64> {
        Ok(self.timezone.midnight(date)? as f64)
    }
}

impl TimespanPolicy for CalendarPolicy {
    fn name(&self) -> &str {
        self.unit.name()
    }

    fn epoch(&self) -> Epoch {
        self.epoch
    }

    fn timezone(&self) -> Timezone {
        self.timezone
    }

    fn raw_edges(&self, when: f64) -> Result<(f64, f64)> {
        let start = self.unit.floor(self.local_date(when)?)?;
        let end = self.unit.next(start)?;
        Ok((self.midnight(start)?, self.midnight(end)?))
    }

    fn name_for_time(&self, when: f64) -> Result<String> {
        Ok(self.unit.label(self.local_date(when)?))
    }

    fn raw_start_for_name(&self, name: &str) -> Result<f64> {
        self.midnight(self.unit.parse_label(name)?)
    }
}

/// Build a policy from its registry name.
pub fn policy_from_name(
    name: &str,
    epoch: Epoch,
    timezone: Timezone,
) -> Result<Arc<dyn TimespanPolicy>> {
    let unit: CalendarUnit = name.parse()?;
    Ok(Arc::new(CalendarPolicy::new(unit, epoch, timezone)))
}

/// A policy given by name or as an instance.
#[derive(Debug, Clone)]
pub enum PolicySpec {
    Name(String),
    Policy(Arc<dyn TimespanPolicy>),
}

impl PolicySpec {
    /// Resolve to a policy instance. Names are bound to `epoch` and `timezone`.
    pub fn resolve(self, epoch: Epoch, timezone: Timezone) -> Result<Arc<dyn TimespanPolicy>> {
        match self {
            PolicySpec::Name(name) => policy_from_name(&name, epoch, timezone),
            PolicySpec::Policy(policy) => Ok(policy),
        }
    }
}

impl From<&str> for PolicySpec {
    fn from(name: &str) -> Self {
        PolicySpec::Name(name.to_string())
    }
}

impl From<String> for PolicySpec {
    fn from(name: String) -> Self {
        PolicySpec::Name(name)
    }
}

impl From<CalendarPolicy> for PolicySpec {
    fn from(policy: CalendarPolicy) -> Self {
        PolicySpec::Policy(Arc::new(policy))
    }
}

impl From<Arc<dyn TimespanPolicy>> for PolicySpec {
    fn from(policy: Arc<dyn TimespanPolicy>) -> Self {
        PolicySpec::Policy(policy)
    }
}

fn calendar_date(year: i32, month: Month, day: u8) -> Result<Date> {
    Date::from_calendar_date(year, month, day)
        .map_err(|err| Error::InvalidValue(format!("date {year}-{month}-{day}: {err}")))
}

fn out_of_range(date: Date) -> Error {
    Error::InvalidValue(format!("date arithmetic out of range near {date}"))
}

/// An unsigned decimal field of exactly `width` digits.
fn parse_field(field: &str, width: usize) -> Option<i32> {
    if field.len() != width || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}
