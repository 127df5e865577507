//! Type caster
//!
//! Converts one raw staging value into a typed [`Value`]. Casting never fails:
//! a value that is absent, blank, the literal `nan`, or simply unparseable
//! comes back as `None`. Callers that need to tell "blank" from "malformed"
//! must look at the raw row again.

use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::row::Value;
use crate::spec::CastKind;

/// Symbols stripped from the front of money values
const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥'];

/// A strptime-style format and whether it carries a time component
#[derive(Debug, Clone, Copy)]
enum DateFormat {
    Date(&'static str),
    DateTime(&'static str),
}

impl DateFormat {
    fn pattern(&self) -> &'static str {
        match self {
            Self::Date(p) | Self::DateTime(p) => p,
        }
    }

    fn parse(&self, s: &str) -> Option<NaiveDate> {
        let date = match self {
            Self::Date(p) => NaiveDate::parse_from_str(s, p).ok()?,
            Self::DateTime(p) => NaiveDateTime::parse_from_str(s, p).ok()?.date(),
        };

        // %Y must consume four digits, otherwise "1/2/20" would become year 20
        // instead of falling through to the %y pattern
        if self.pattern().contains("%Y") && !(1000..=9999).contains(&date.year()) {
            return None;
        }
        Some(date)
    }
}

/// Tried in order; the first match wins, so month-first beats day-first
const DATE_FORMATS: &[DateFormat] = &[
    DateFormat::Date("%Y-%m-%d"),
    DateFormat::DateTime("%Y-%m-%d %H:%M:%S"),
    DateFormat::DateTime("%Y-%m-%d %H:%M"),
    DateFormat::Date("%m/%d/%Y"),
    DateFormat::Date("%m/%d/%y"),
    DateFormat::Date("%d-%m-%Y"),
    DateFormat::Date("%d/%m/%Y"),
    DateFormat::Date("%Y/%m/%d"),
    DateFormat::Date("%b %d %Y"),
    DateFormat::Date("%B %d %Y"),
];

/// Cast a raw value according to `kind`
pub fn cast(kind: CastKind, raw: Option<&str>) -> Option<Value> {
    let s = raw?.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        return None;
    }

    match kind {
        CastKind::Text => Some(Value::Text(s.to_string())),
        CastKind::Integer => to_integer(s).map(Value::Integer),
        CastKind::Float => to_float(s).map(Value::Float),
        CastKind::Money => to_money(s).map(Value::Money),
        CastKind::Date => to_date(s).map(Value::Date),
    }
}

fn strip_thousands(s: &str) -> String {
    s.replace(',', "")
}

/// Integer with thousands separators; falls back to truncating a float
pub fn to_integer(s: &str) -> Option<i64> {
    let cleaned = strip_thousands(s.trim());
    if let Ok(i) = cleaned.parse::<i64>() {
        return Some(i);
    }

    let f = cleaned.parse::<f64>().ok().filter(|f| f.is_finite())?.trunc();
    // 2^63 is the first float past i64::MAX
    if f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return None;
    }
    Some(f as i64)
}

pub fn to_float(s: &str) -> Option<f64> {
    strip_thousands(s.trim()).parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Exact decimal; a leading currency symbol (after an optional sign) is dropped
pub fn to_money(s: &str) -> Option<Decimal> {
    let s = s.trim();
    let (sign, rest) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s.strip_prefix('+').unwrap_or(s)),
    };
    let rest = rest.trim_start();
    let rest = rest.strip_prefix(CURRENCY_SYMBOLS).unwrap_or(rest);
    let cleaned = format!("{}{}", sign, strip_thousands(rest.trim()));

    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()
}

/// Date from the fixed format list, then ISO-8601
pub fn to_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| format.parse(s))
        .or_else(|| parse_iso8601(s))
}

fn parse_iso8601(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        // Date as written in the stated offset, not converted to UTC
        return Some(dt.date_naive());
    }

    let naive = s.strip_suffix(&['Z', 'z'][..]).unwrap_or(s);
    naive
        .parse::<NaiveDateTime>()
        .map(|dt| dt.date())
        .or_else(|_| naive.parse::<NaiveDate>())
        .ok()
}
