// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cron spec parsing and bidirectional search
//!
//! `CronSpec` holds one bit per allowed value of each field, with a star
//! bit marking fields that were written as `*`/`?`. The star bit matters
//! for the standard day-of-month/day-of-week rule: if either is a
//! wildcard both must match, otherwise a match on either suffices.
//!
//! `next_after` is the familiar forward search. `prev_at_or_before` runs
//! the same algorithm in reverse: check fields outermost-in, and when one
//! fails, truncate everything below it and step back one second. When a
//! step wraps a field (day 1 back into the previous month, January back
//! into December) the search restarts from the month check so every field
//! is validated against the new date. Both directions do wall-clock
//! arithmetic in the spec's timezone, which is what produces the expected
//! DST behavior: local times skipped by spring-forward never match, and
//! repeated fall-back times resolve to the occurrence nearest the
//! reference.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use thiserror::Error;

/// Set when the field was written as `*` or `?`
const STAR_BIT: u64 = 1 << 63;

/// How far the searches look before giving up on an unsatisfiable spec
/// (e.g. "0 0 30 2 *")
const YEAR_LIMIT: i32 = 5;

/// Errors from parsing a cron expression
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected exactly 5 fields, found {found}: [{expr}]")]
    WrongFieldCount { found: usize, expr: String },
    #[error("unrecognized descriptor: {0}")]
    UnknownDescriptor(String),
    #[error("failed to parse int from {0}")]
    NotANumber(String),
    #[error("{value} out of range ({min}-{max}) in field {field}")]
    OutOfRange {
        value: u32,
        min: u32,
        max: u32,
        field: &'static str,
    },
    #[error("beyond end of range ({0})")]
    InvertedRange(String),
    #[error("step of range should be a positive number: {0}")]
    BadStep(String),
    #[error("provided bad location {0}")]
    BadLocation(String),
}

/// One field's inclusive bounds and (for dom/dow/month) value names
struct Bounds {
    min: u32,
    max: u32,
    field: &'static str,
    names: &'static [(&'static str, u32)],
}

const MINUTES: Bounds = Bounds {
    min: 0,
    max: 59,
    field: "minute",
    names: &[],
};
const HOURS: Bounds = Bounds {
    min: 0,
    max: 23,
    field: "hour",
    names: &[],
};
const DOM: Bounds = Bounds {
    min: 1,
    max: 31,
    field: "day-of-month",
    names: &[],
};
const MONTHS: Bounds = Bounds {
    min: 1,
    max: 12,
    field: "month",
    names: &[
        ("jan", 1),
        ("feb", 2),
        ("mar", 3),
        ("apr", 4),
        ("may", 5),
        ("jun", 6),
        ("jul", 7),
        ("aug", 8),
        ("sep", 9),
        ("oct", 10),
        ("nov", 11),
        ("dec", 12),
    ],
};
const DOW: Bounds = Bounds {
    min: 0,
    max: 6,
    field: "day-of-week",
    names: &[
        ("sun", 0),
        ("mon", 1),
        ("tue", 2),
        ("wed", 3),
        ("thu", 4),
        ("fri", 5),
        ("sat", 6),
    ],
};

/// A parsed cron spec with its governing timezone
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CronSpec {
    second: u64,
    minute: u64,
    hour: u64,
    dom: u64,
    month: u64,
    dow: u64,
    pub location: Tz,
}

impl CronSpec {
    /// Parse a standard 5-field expression (minute, hour, day-of-month,
    /// month, day-of-week) or one of the `@hourly`-style descriptors.
    ///
    /// A leading `TZ=`/`CRON_TZ=` clause is validated and then dropped: the
    /// ControlledJob's own timezone always governs, so a conflicting zone
    /// inside the expression would only mislead.
    pub fn parse(expr: &str) -> Result<Self, ParseError> {
        let mut expr = expr.trim();

        for prefix in ["TZ=", "CRON_TZ="] {
            if let Some(rest) = expr.strip_prefix(prefix) {
                let (zone, remainder) = rest
                    .split_once(char::is_whitespace)
                    .unwrap_or((rest, ""));
                zone.parse::<Tz>()
                    .map_err(|_| ParseError::BadLocation(zone.to_string()))?;
                expr = remainder.trim();
            }
        }

        if let Some(descriptor) = expr.strip_prefix('@') {
            return Self::parse_descriptor(descriptor, expr);
        }

        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ParseError::WrongFieldCount {
                found: fields.len(),
                expr: expr.to_string(),
            });
        }

        Ok(Self {
            second: 1 << 0,
            minute: parse_field(fields[0], &MINUTES)?,
            hour: parse_field(fields[1], &HOURS)?,
            dom: parse_field(fields[2], &DOM)?,
            month: parse_field(fields[3], &MONTHS)?,
            dow: parse_field(fields[4], &DOW)?,
            location: Tz::UTC,
        })
    }

    fn parse_descriptor(descriptor: &str, expr: &str) -> Result<Self, ParseError> {
        let lowered = match descriptor.to_ascii_lowercase().as_str() {
            "yearly" | "annually" => "0 0 1 1 *",
            "monthly" => "0 0 1 * *",
            "weekly" => "0 0 * * 0",
            "daily" | "midnight" => "0 0 * * *",
            "hourly" => "0 * * * *",
            _ => return Err(ParseError::UnknownDescriptor(expr.to_string())),
        };
        Self::parse(lowered)
    }

    /// Override the governing timezone
    pub fn with_location(mut self, location: Tz) -> Self {
        self.location = location;
        self
    }

    /// The next activation strictly after `reference`, or None if no match
    /// exists within five years forward
    pub fn next_after(&self, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut t = truncate_to_second(reference.with_timezone(&self.location));
        t += Duration::seconds(1);
        let year_limit = t.year() + YEAR_LIMIT;

        'wrap: loop {
            if t.year() > year_limit {
                return None;
            }

            while self.month & (1 << t.month()) == 0 {
                t = start_of_next_month(&t);
                if t.month() == 1 {
                    continue 'wrap;
                }
            }

            while !self.day_matches(&t) {
                t = start_of_next_day(&t);
                if t.day() == 1 {
                    continue 'wrap;
                }
            }

            while self.hour & (1 << t.hour()) == 0 {
                t = start_of_hour(&t) + Duration::hours(1);
                if t.hour() == 0 {
                    continue 'wrap;
                }
            }

            while self.minute & (1 << t.minute()) == 0 {
                t = truncate_to_minute(&t) + Duration::minutes(1);
                if t.minute() == 0 {
                    continue 'wrap;
                }
            }

            while self.second & (1 << t.second()) == 0 {
                t = truncate_to_second(t) + Duration::seconds(1);
                if t.second() == 0 {
                    continue 'wrap;
                }
            }

            return Some(t.with_timezone(&Utc));
        }
    }

    /// The most recent activation at or before `reference` (note the
    /// boundary is inclusive, unlike `next_after`), or None if no match
    /// exists within five years backward
    pub fn prev_at_or_before(&self, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut t = truncate_to_second(reference.with_timezone(&self.location));
        let year_limit = t.year() - YEAR_LIMIT;

        'wrap: loop {
            if t.year() < year_limit {
                return None;
            }

            while self.month & (1 << t.month()) == 0 {
                t = start_of_month(&t) - Duration::seconds(1);
                // Wrapped around into the previous year
                if t.month() == 12 {
                    continue 'wrap;
                }
            }

            while !self.day_matches(&t) {
                // Stepping back from the 1st lands in a different (possibly
                // non-matching) month, so restart the checks from the top
                let wraps = t.day() == 1;
                t = start_of_day(&t) - Duration::seconds(1);
                if wraps {
                    continue 'wrap;
                }
            }

            while self.hour & (1 << t.hour()) == 0 {
                t = start_of_hour(&t) - Duration::seconds(1);
                if t.hour() == 23 {
                    continue 'wrap;
                }
            }

            while self.minute & (1 << t.minute()) == 0 {
                t = truncate_to_minute(&t) - Duration::seconds(1);
                if t.minute() == 59 {
                    continue 'wrap;
                }
            }

            while self.second & (1 << t.second()) == 0 {
                t = t - Duration::seconds(1);
                if t.second() == 59 {
                    continue 'wrap;
                }
            }

            return Some(t.with_timezone(&Utc));
        }
    }

    /// The standard cron day rule: with a wildcard on either side both
    /// restrictions must hold, otherwise either match suffices
    fn day_matches(&self, t: &DateTime<Tz>) -> bool {
        let dom_match = self.dom & (1 << t.day()) > 0;
        let dow_match = self.dow & (1 << t.weekday().num_days_from_sunday()) > 0;
        if self.dom & STAR_BIT > 0 || self.dow & STAR_BIT > 0 {
            dom_match && dow_match
        } else {
            dom_match || dow_match
        }
    }
}

fn parse_field(expr: &str, bounds: &Bounds) -> Result<u64, ParseError> {
    let mut bits = 0u64;
    for part in expr.split(',') {
        bits |= parse_range(part, bounds)?;
    }
    Ok(bits)
}

/// Parse one comma-separated term: `*`, `?`, `N`, `N-M` or a name, each
/// with an optional `/step`. A bare `N/step` runs from N to the field max.
fn parse_range(expr: &str, bounds: &Bounds) -> Result<u64, ParseError> {
    let (range, step) = match expr.split_once('/') {
        Some((range, step)) => {
            let step: u32 = step
                .parse()
                .map_err(|_| ParseError::NotANumber(expr.to_string()))?;
            if step == 0 {
                return Err(ParseError::BadStep(expr.to_string()));
            }
            (range, Some(step))
        }
        None => (expr, None),
    };

    let (start, end, star) = if range == "*" || range == "?" {
        (bounds.min, bounds.max, true)
    } else if let Some((low, high)) = range.split_once('-') {
        (
            parse_value(low, bounds)?,
            parse_value(high, bounds)?,
            false,
        )
    } else {
        let value = parse_value(range, bounds)?;
        // With an explicit step a single value means "from here to the max"
        match step {
            Some(_) => (value, bounds.max, false),
            None => (value, value, false),
        }
    };

    if start < bounds.min || start > bounds.max || end < bounds.min || end > bounds.max {
        let value = if start < bounds.min || start > bounds.max {
            start
        } else {
            end
        };
        return Err(ParseError::OutOfRange {
            value,
            min: bounds.min,
            max: bounds.max,
            field: bounds.field,
        });
    }
    if start > end {
        return Err(ParseError::InvertedRange(expr.to_string()));
    }

    let step = step.unwrap_or(1);
    let mut bits = 0u64;
    let mut value = start;
    while value <= end {
        bits |= 1 << value;
        value += step;
    }
    // The star bit survives `*` but not `*/step`: a stepped field is a real
    // restriction for the day-matching rule
    if star && step == 1 {
        bits |= STAR_BIT;
    }
    Ok(bits)
}

fn parse_value(raw: &str, bounds: &Bounds) -> Result<u32, ParseError> {
    let lowered = raw.to_ascii_lowercase();
    if let Some(&(_, value)) = bounds.names.iter().find(|(name, _)| *name == lowered) {
        return Ok(value);
    }
    raw.parse()
        .map_err(|_| ParseError::NotANumber(raw.to_string()))
}

/// Resolve a naive local time against a timezone. An ambiguous (fall-back)
/// time resolves to its first occurrence. A time inside a spring-forward
/// gap resolves to the first representable instant after the gap, which is
/// how the searches skip over local times that never happened.
fn resolve_local(location: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match location.from_local_datetime(&naive) {
        LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => t,
        LocalResult::None => {
            let mut candidate = naive;
            loop {
                candidate += Duration::minutes(30);
                if let Some(t) = location.from_local_datetime(&candidate).earliest() {
                    return t;
                }
            }
        }
    }
}

fn start_of_month(t: &DateTime<Tz>) -> DateTime<Tz> {
    let naive = NaiveDate::from_ymd_opt(t.year(), t.month(), 1)
        .unwrap_or_else(|| t.date_naive())
        .and_hms_opt(0, 0, 0)
        .unwrap_or_else(|| t.naive_local());
    resolve_local(&t.timezone(), naive)
}

fn start_of_next_month(t: &DateTime<Tz>) -> DateTime<Tz> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    let naive = NaiveDate::from_ymd_opt(year, month, 1)
        .unwrap_or_else(|| t.date_naive())
        .and_hms_opt(0, 0, 0)
        .unwrap_or_else(|| t.naive_local());
    resolve_local(&t.timezone(), naive)
}

fn start_of_day(t: &DateTime<Tz>) -> DateTime<Tz> {
    let naive = t
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_else(|| t.naive_local());
    resolve_local(&t.timezone(), naive)
}

fn start_of_next_day(t: &DateTime<Tz>) -> DateTime<Tz> {
    let naive = (t.date_naive() + Duration::days(1))
        .and_hms_opt(0, 0, 0)
        .unwrap_or_else(|| t.naive_local());
    resolve_local(&t.timezone(), naive)
}

fn start_of_hour(t: &DateTime<Tz>) -> DateTime<Tz> {
    let naive = t
        .date_naive()
        .and_hms_opt(t.hour(), 0, 0)
        .unwrap_or_else(|| t.naive_local());
    resolve_local(&t.timezone(), naive)
}

fn truncate_to_minute(t: &DateTime<Tz>) -> DateTime<Tz> {
    let seconds = t.timestamp();
    from_timestamp(&t.timezone(), seconds - seconds.rem_euclid(60), t)
}

fn truncate_to_second(t: DateTime<Tz>) -> DateTime<Tz> {
    let timestamp = t.timestamp();
    from_timestamp(&t.timezone(), timestamp, &t)
}

fn from_timestamp(location: &Tz, seconds: i64, fallback: &DateTime<Tz>) -> DateTime<Tz> {
    location
        .timestamp_opt(seconds, 0)
        .single()
        .unwrap_or(*fallback)
}
