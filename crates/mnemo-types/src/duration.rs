//! ISO-8601 durations (`PnYnMnWnDTnHnMnS`).
//!
//! Only integer components are accepted.  Calendar units are converted to
//! days with fixed factors (year = 365, month = 30, week = 7) because decay
//! arithmetic works in whole days.
//!
//! ```rust
//! use mnemo_types::IsoDuration;
//!
//! let d: IsoDuration = "P90D".parse().unwrap();
//! assert_eq!(d.whole_days(), 90);
//! assert_eq!("P2W".parse::<IsoDuration>().unwrap().whole_days(), 14);
//! assert!("90 days".parse::<IsoDuration>().is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("duration must start with 'P'")]
    MissingPrefix,
    #[error("duration has no components")]
    Empty,
    #[error("unexpected character {0:?} in duration")]
    UnexpectedChar(char),
    #[error("number without a unit designator")]
    MissingDesignator,
    #[error("designator {0:?} is repeated or out of order")]
    OutOfOrder(char),
    #[error("duration component overflows")]
    Overflow,
    #[error("'T' is not followed by a time component")]
    EmptyTime,
}

/// A parsed ISO-8601 duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IsoDuration {
    pub years: u32,
    pub months: u32,
    pub weeks: u32,
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

const DATE_UNITS: [char; 4] = ['Y', 'M', 'W', 'D'];
const TIME_UNITS: [char; 3] = ['H', 'M', 'S'];

impl IsoDuration {
    /// A duration of exactly `n` days.
    pub fn days(n: u32) -> Self {
        Self {
            days: n,
            ..Self::default()
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DurationParseError> {
        let rest = raw
            .trim()
            .strip_prefix('P')
            .ok_or(DurationParseError::MissingPrefix)?;
        if rest.is_empty() || rest == "T" {
            return Err(DurationParseError::Empty);
        }

        let mut out = IsoDuration::default();
        let mut in_time = false;
        // Index of the next designator allowed in the current section.
        let mut next_slot = 0usize;
        let mut digits = String::new();
        let mut components = 0usize;
        let mut time_components = 0usize;

        for c in rest.chars() {
            if c.is_ascii_digit() {
                digits.push(c);
                continue;
            }
            if c == 'T' {
                if in_time || !digits.is_empty() {
                    return Err(DurationParseError::UnexpectedChar(c));
                }
                in_time = true;
                next_slot = 0;
                continue;
            }
            let units: &[char] = if in_time { &TIME_UNITS } else { &DATE_UNITS };
            let slot = units
                .iter()
                .position(|u| *u == c)
                .ok_or(DurationParseError::UnexpectedChar(c))?;
            if slot < next_slot {
                return Err(DurationParseError::OutOfOrder(c));
            }
            if digits.is_empty() {
                return Err(DurationParseError::UnexpectedChar(c));
            }
            let value: u32 = digits.parse().map_err(|_| DurationParseError::Overflow)?;
            digits.clear();
            next_slot = slot + 1;
            components += 1;
            if in_time {
                time_components += 1;
            }

            let field = match (in_time, c) {
                (false, 'Y') => &mut out.years,
                (false, 'M') => &mut out.months,
                (false, 'W') => &mut out.weeks,
                (false, _) => &mut out.days,
                (true, 'H') => &mut out.hours,
                (true, 'M') => &mut out.minutes,
                (true, _) => &mut out.seconds,
            };
            *field = value;
        }

        if !digits.is_empty() {
            return Err(DurationParseError::MissingDesignator);
        }
        if components == 0 {
            return Err(DurationParseError::Empty);
        }
        // `T` must introduce at least one time element.
        if in_time && time_components == 0 {
            return Err(DurationParseError::EmptyTime);
        }
        Ok(out)
    }

    /// Total length in whole days; sub-day remainders are truncated.
    pub fn whole_days(&self) -> u64 {
        let calendar = u64::from(self.years) * 365
            + u64::from(self.months) * 30
            + u64::from(self.weeks) * 7
            + u64::from(self.days);
        let seconds =
            u64::from(self.hours) * 3600 + u64::from(self.minutes) * 60 + u64::from(self.seconds);
        calendar + seconds / 86_400
    }
}

impl FromStr for IsoDuration {
    type Err = DurationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for IsoDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("P")?;
        let date = [
            (self.years, 'Y'),
            (self.months, 'M'),
            (self.weeks, 'W'),
            (self.days, 'D'),
        ];
        let time = [(self.hours, 'H'), (self.minutes, 'M'), (self.seconds, 'S')];
        let mut wrote = false;
        for (n, unit) in date {
            if n > 0 {
                write!(f, "{n}{unit}")?;
                wrote = true;
            }
        }
        if time.iter().any(|(n, _)| *n > 0) {
            f.write_str("T")?;
            for (n, unit) in time {
                if n > 0 {
                    write!(f, "{n}{unit}")?;
                }
            }
            wrote = true;
        }
        if !wrote {
            f.write_str("0D")?;
        }
        Ok(())
    }
}
