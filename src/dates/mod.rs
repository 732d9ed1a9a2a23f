//! Date handling for sidecar fields and filenames.
//!
//! Dates arrive from sidecars as `2024-01-07`, `20240107`, `2024-01-07T10:00:00Z`
//! and similar. They are split into [`DateParts`] by [`parse_components`] and
//! rendered back with [`format_components`] in one of the [`DateFormat`] codes.

mod tags;

pub use tags::{TagLocation, add_date_tag, collapse_whitespace, strip_date_tags};

use crate::error::{Error, Result};
use crate::record::Metadata;
use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

/// Metadata keys consulted for a record date, in order of preference.
pub const DATE_KEYS: &[&str] = &[
    "release_date",
    "releasedate",
    "released_on",
    "originally_available_at",
    "originally_available",
    "originallyavailable",
    "date",
    "upload_date",
    "uploaddate",
    "uploaded_on",
    "creation_time",
    "created_at",
];

/// Output layout of a date. Capital `Y` codes use four-digit years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateFormat {
    Ymd,
    ShortYmd,
    Ydm,
    ShortYdm,
    Dmy,
    ShortDmy,
    Mdy,
    ShortMdy,
    Md,
    Dm,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    Year,
    Month,
    Day,
}

impl DateFormat {
    pub const ALL: [DateFormat; 11] = [
        DateFormat::Ymd,
        DateFormat::ShortYmd,
        DateFormat::Ydm,
        DateFormat::ShortYdm,
        DateFormat::Dmy,
        DateFormat::ShortDmy,
        DateFormat::Mdy,
        DateFormat::ShortMdy,
        DateFormat::Md,
        DateFormat::Dm,
        DateFormat::Skip,
    ];

    pub fn code(self) -> &'static str {
        match self {
            DateFormat::Ymd => "Ymd",
            DateFormat::ShortYmd => "ymd",
            DateFormat::Ydm => "Ydm",
            DateFormat::ShortYdm => "ydm",
            DateFormat::Dmy => "dmY",
            DateFormat::ShortDmy => "dmy",
            DateFormat::Mdy => "mdY",
            DateFormat::ShortMdy => "mdy",
            DateFormat::Md => "md",
            DateFormat::Dm => "dm",
            DateFormat::Skip => "skip",
        }
    }

    fn order(self) -> &'static [Part] {
        use Part::*;
        match self {
            DateFormat::Ymd | DateFormat::ShortYmd => &[Year, Month, Day],
            DateFormat::Ydm | DateFormat::ShortYdm => &[Year, Day, Month],
            DateFormat::Dmy | DateFormat::ShortDmy => &[Day, Month, Year],
            DateFormat::Mdy | DateFormat::ShortMdy => &[Month, Day, Year],
            DateFormat::Md => &[Month, Day],
            DateFormat::Dm => &[Day, Month],
            DateFormat::Skip => &[],
        }
    }

    fn year_width(self) -> usize {
        match self {
            DateFormat::ShortYmd | DateFormat::ShortYdm | DateFormat::ShortDmy | DateFormat::ShortMdy => 2,
            _ => 4,
        }
    }

    /// Which component leads a compact digit string in this layout.
    fn leading(self) -> Part {
        match self {
            DateFormat::Dmy | DateFormat::ShortDmy | DateFormat::Dm => Part::Day,
            DateFormat::Mdy | DateFormat::ShortMdy | DateFormat::Md => Part::Month,
            _ => Part::Year,
        }
    }

    /// Day precedes month when both follow the year (`Ydm`, `ydm`).
    fn day_before_month(self) -> bool {
        matches!(
            self,
            DateFormat::Ydm | DateFormat::ShortYdm | DateFormat::Dmy | DateFormat::ShortDmy | DateFormat::Dm
        )
    }
}

impl FromStr for DateFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        DateFormat::ALL
            .iter()
            .copied()
            .find(|f| f.code() == trimmed)
            .ok_or_else(|| {
                Error::config(format!(
                    "unknown date format '{}' (expected one of Ymd, ymd, Ydm, ydm, dmY, dmy, mdY, mdy, md, dm, skip)",
                    s
                ))
            })
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Components of a date as digit strings. `year` may be empty for month/day
/// inputs; `month` and `day` are empty for year-only inputs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DateParts {
    pub year: String,
    pub month: String,
    pub day: String,
}

impl DateParts {
    fn new(year: &str, month: &str, day: &str) -> Self {
        Self {
            year: year.to_string(),
            month: month.to_string(),
            day: day.to_string(),
        }
    }
}

fn full_year(year: &str) -> i32 {
    match year.len() {
        2 => 2000 + year.parse::<i32>().unwrap_or(0),
        4 => year.parse().unwrap_or(2000),
        // Month/day only: pick a leap year so 02-29 stays valid
        _ => 2000,
    }
}

fn is_valid_date(year: &str, month: &str, day: &str) -> bool {
    let (Ok(m), Ok(d)) = (month.parse::<u32>(), day.parse::<u32>()) else {
        return false;
    };
    (1..=12).contains(&m) && NaiveDate::from_ymd_opt(full_year(year), m, d).is_some()
}

fn looks_like_year(digits: &str) -> bool {
    digits.starts_with("19") || digits.starts_with("20")
}

fn validate(parts: DateParts, original: &str) -> Result<DateParts> {
    if parts.month.is_empty() && parts.day.is_empty() {
        return Ok(parts);
    }
    if is_valid_date(&parts.year, &parts.month, &parts.day) {
        return Ok(parts);
    }
    if is_valid_date(&parts.year, &parts.day, &parts.month) {
        return Ok(DateParts {
            year: parts.year,
            month: parts.day,
            day: parts.month,
        });
    }
    Err(Error::DateParse(original.to_string()))
}

/// Split a compact or hyphenated date into components, interpreting the digit
/// layout according to `fmt`, then validate month and day.
pub fn parse_components(input: &str, fmt: DateFormat) -> Result<DateParts> {
    let digits: String = input.replace('-', "").trim().to_string();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::DateParse(input.to_string()));
    }

    let pick = |a: &str, b: &str| {
        if fmt.day_before_month() {
            (b.to_string(), a.to_string())
        } else {
            (a.to_string(), b.to_string())
        }
    };

    let parts = match digits.len() {
        8 => {
            let year_first = fmt.leading() == Part::Year
                || (looks_like_year(&digits[..4]) && !looks_like_year(&digits[4..]));
            if year_first {
                let (month, day) = if fmt.leading() == Part::Year {
                    pick(&digits[4..6], &digits[6..8])
                } else {
                    (digits[4..6].to_string(), digits[6..8].to_string())
                };
                DateParts::new(&digits[..4], &month, &day)
            } else {
                let (month, day) = pick(&digits[..2], &digits[2..4]);
                DateParts::new(&digits[4..], &month, &day)
            }
        }
        6 => {
            if fmt.leading() == Part::Year {
                let (month, day) = pick(&digits[2..4], &digits[4..6]);
                DateParts::new(&digits[..2], &month, &day)
            } else {
                let (month, day) = pick(&digits[..2], &digits[2..4]);
                DateParts::new(&digits[4..], &month, &day)
            }
        }
        4 => {
            if looks_like_year(&digits) {
                DateParts::new(&digits, "", "")
            } else {
                let (month, day) = pick(&digits[..2], &digits[2..]);
                DateParts::new("", &month, &day)
            }
        }
        _ => return Err(Error::DateParse(input.to_string())),
    };

    validate(parts, input)
}

/// Render components in `fmt` order, joined with `-`. Empty parts are omitted.
pub fn format_components(parts: &DateParts, fmt: DateFormat) -> String {
    let width = fmt.year_width();
    fmt.order()
        .iter()
        .map(|part| match part {
            Part::Year => match (parts.year.len(), width) {
                (4, 2) => parts.year[2..].to_string(),
                (2, 4) => format!("20{}", parts.year),
                _ => parts.year.clone(),
            },
            Part::Month => parts.month.clone(),
            Part::Day => parts.day.clone(),
        })
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// First usable date string from the preferred metadata keys, cut at `T`.
pub fn extract_date_from_metadata(meta: &Metadata) -> Option<String> {
    DATE_KEYS.iter().find_map(|key| {
        let value = meta.get(*key)?.as_str()?.trim();
        if value.chars().count() <= 4 {
            return None;
        }
        let date = match value.find('T') {
            Some(idx) => &value[..idx],
            None => value,
        };
        Some(date.to_string())
    })
}

/// The record date as components, when the metadata carries a parseable one.
pub fn resolve_record_date(meta: &Metadata) -> Option<DateParts> {
    let raw = extract_date_from_metadata(meta)?;
    parse_components(&raw, DateFormat::Ymd).ok()
}

/// `[<formatted>]` for the given layout, or `None` for `skip`/empty output.
pub fn date_tag(parts: &DateParts, fmt: DateFormat) -> Option<String> {
    if fmt == DateFormat::Skip {
        return None;
    }
    let formatted = format_components(parts, fmt);
    if formatted.is_empty() {
        return None;
    }
    Some(format!("[{}]", formatted))
}
