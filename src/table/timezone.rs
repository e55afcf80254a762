//! Timezones used to find calendar boundaries.

use std::fmt;
use std::str::FromStr;

use time::util::days_in_year_month;
use time::{Date, Duration, Month, OffsetDateTime, UtcOffset};

use crate::core::{Error, Result};

/// A UTC offset, optionally known by name. `AmericaNewYork` follows the US
/// daylight saving rules, every other zone is a fixed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timezone {
    #[default]
    UTC,
    AsiaShanghai,   // UTC+8
    AsiaTokyo,      // UTC+9
    AustraliaBrisbane, // UTC+10
    AmericaNewYork, // UTC-5, UTC-4 in summer
    Custom(i32),    // offset in seconds
}

const HOUR: i32 = 3600;

/// Local hour at which US clocks change.
const US_SWITCH_HOUR: i64 = 2;

impl Timezone {
    /// Standard (winter) offset from UTC in seconds.
    pub fn offset_seconds(&self) -> i32 {
        match self {
            Timezone::UTC => 0,
            Timezone::AsiaShanghai => 8 * HOUR,
            Timezone::AsiaTokyo => 9 * HOUR,
            Timezone::AustraliaBrisbane => 10 * HOUR,
            Timezone::AmericaNewYork => -5 * HOUR,
            Timezone::Custom(offset) => *offset,
        }
    }

    pub fn observes_dst(&self) -> bool {
        matches!(self, Timezone::AmericaNewYork)
    }

    /// Offset in effect at UNIX time `unix`.
    pub fn offset_at(&self, unix: i64) -> Result<UtcOffset> {
        let standard = self.utc_offset(self.offset_seconds())?;
        if !self.observes_dst() {
            return Ok(standard);
        }
        let summer = self.utc_offset(self.offset_seconds() + HOUR)?;
        let year = OffsetDateTime::from_unix_timestamp(unix)
            .map_err(|err| Error::InvalidValue(format!("time {unix}: {err}")))?
            .to_offset(standard)
            .year();
        let (first, last) = us_dst_dates(year)?;
        let begins = first.midnight().assume_offset(standard).unix_timestamp()
            + US_SWITCH_HOUR * 3600;
        let ends =
            last.midnight().assume_offset(summer).unix_timestamp() + US_SWITCH_HOUR * 3600;
        Ok(if begins <= unix && unix < ends { summer } else { standard })
    }

    /// The local calendar date at UNIX time `unix`.
    pub fn local_date(&self, unix: i64) -> Result<Date> {
        let utc = OffsetDateTime::from_unix_timestamp(unix)
            .map_err(|err| Error::InvalidValue(format!("time {unix}: {err}")))?;
        Ok(utc.to_offset(self.offset_at(unix)?).date())
    }

    /// UNIX time of local midnight starting `date`. Clocks never change at
    /// midnight, so the result is unique.
    pub fn midnight(&self, date: Date) -> Result<i64> {
        let mut seconds = self.offset_seconds();
        if self.observes_dst() {
            let (first, last) = us_dst_dates(date.year())?;
            if first < date && date <= last {
                seconds += HOUR;
            }
        }
        let offset = self.utc_offset(seconds)?;
        Ok(date.midnight().assume_offset(offset).unix_timestamp())
    }

    fn utc_offset(&self, seconds: i32) -> Result<UtcOffset> {
        UtcOffset::from_whole_seconds(seconds)
            .map_err(|err| Error::InvalidValue(format!("timezone {self}: {err}")))
    }

    /// The name this timezone is persisted under.
    pub fn name(&self) -> String {
        match self {
            Timezone::UTC => "UTC".to_string(),
            Timezone::AsiaShanghai => "Asia/Shanghai".to_string(),
            Timezone::AsiaTokyo => "Asia/Tokyo".to_string(),
            Timezone::AustraliaBrisbane => "Australia/Brisbane".to_string(),
            Timezone::AmericaNewYork => "America/New_York".to_string(),
            Timezone::Custom(offset) => {
                let sign = if *offset < 0 { '-' } else { '+' };
                let abs = offset.unsigned_abs();
                format!("{sign}{:02}{:02}", abs / 3600, (abs % 3600) / 60)
            }
        }
    }
}

/// Local dates on which US daylight saving time starts and ends in `year`.
fn us_dst_dates(year: i32) -> Result<(Date, Date)> {
    if year >= 2007 {
        Ok((nth_sunday(year, Month::March, 2)?, nth_sunday(year, Month::November, 1)?))
    } else if year >= 1987 {
        Ok((nth_sunday(year, Month::April, 1)?, last_sunday(year, Month::October)?))
    } else {
        Ok((last_sunday(year, Month::April)?, last_sunday(year, Month::October)?))
    }
}

fn nth_sunday(year: i32, month: Month, n: i64) -> Result<Date> {
    let first = calendar_date(year, month, 1)?;
    let to_sunday = (7 - i64::from(first.weekday().number_days_from_sunday())) % 7;
    first
        .checked_add(Duration::days(to_sunday + 7 * (n - 1)))
        .ok_or_else(|| Error::InvalidValue(format!("no Sunday {n} in {month} {year}")))
}

fn last_sunday(year: i32, month: Month) -> Result<Date> {
    let last = calendar_date(year, month, days_in_year_month(year, month))?;
    last.checked_sub(Duration::days(i64::from(
        last.weekday().number_days_from_sunday(),
    )))
    .ok_or_else(|| Error::InvalidValue(format!("no last Sunday in {month} {year}")))
}

fn calendar_date(year: i32, month: Month, day: u8) -> Result<Date> {
    Date::from_calendar_date(year, month, day)
        .map_err(|err| Error::InvalidValue(format!("{year}-{month}-{day}: {err}")))
}

impl FromStr for Timezone {
    type Err = Error;

    /// Parse a known zone name or an offset such as `+0800`, `-05:00`.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "UTC" | "utc" | "Z" | "Etc/UTC" => Ok(Timezone::UTC),
            "Asia/Shanghai" => Ok(Timezone::AsiaShanghai),
            "Asia/Tokyo" => Ok(Timezone::AsiaTokyo),
            "Australia/Brisbane" => Ok(Timezone::AustraliaBrisbane),
            "America/New_York" => Ok(Timezone::AmericaNewYork),
            _ if s.starts_with('+') || s.starts_with('-') => {
                let digits: String = s[1..].chars().filter(|c| *c != ':').collect();
                let invalid = || Error::Parse(format!("invalid timezone offset: {s}"));
                if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
                let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
                if hours > 23 || minutes > 59 {
                    return Err(invalid());
                }
                let sign = if s.starts_with('-') { -1 } else { 1 };
                match sign * (hours * 3600 + minutes * 60) {
                    0 => Ok(Timezone::UTC),
                    offset => Ok(Timezone::Custom(offset)),
                }
            }
            _ => Err(Error::Parse(format!("unknown timezone: {s}"))),
        }
    }
}

impl fmt::Display for Timezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
