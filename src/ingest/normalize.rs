// src/ingest/normalize.rs
//! Field normalizers. Both parsers are total: malformed input maps to the
//! sentinel (`0` / `None`), never to an error.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::ingest::types::{CandidateRecord, Provenance, ScholarshipRecord};

pub const DEFAULT_TITLE: &str = "Untitled Scholarship";
pub const DEFAULT_DESCRIPTION: &str = "No description available";

const CURRENCY_SYMBOLS: [char; 5] = ['$', '€', '£', '¥', '₦'];

static RE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").unwrap());

/// Parse a monetary amount. With several ASCII digit runs the last one wins
/// ("$100 to $500" → 500); other scripts' digits are not runs.
pub fn parse_amount(text: Option<&str>) -> u64 {
    let Some(text) = text else {
        return 0;
    };
    let stripped: String = text
        .chars()
        .filter(|c| *c != ',' && !CURRENCY_SYMBOLS.contains(c))
        .collect();

    RE_DIGITS
        .find_iter(&stripped)
        .last()
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .unwrap_or(0)
}

#[derive(Clone, Copy)]
enum Order {
    MonthDayYear,
    YearMonthDay,
    MonthNameDayYear,
}

static DATE_PATTERNS: Lazy<Vec<(Regex, Order)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"([0-9]{1,2})/([0-9]{1,2})/([0-9]{4})").unwrap(),
            Order::MonthDayYear,
        ),
        (
            Regex::new(r"([0-9]{1,2})-([0-9]{1,2})-([0-9]{4})").unwrap(),
            Order::MonthDayYear,
        ),
        (
            Regex::new(r"([0-9]{4})-([0-9]{1,2})-([0-9]{1,2})").unwrap(),
            Order::YearMonthDay,
        ),
        (
            Regex::new(r"([A-Za-z]+)\s+([0-9]{1,2}),?\s+([0-9]{4})").unwrap(),
            Order::MonthNameDayYear,
        ),
    ]
});

/// Resolve an English month name (full or abbreviated) to 1..=12.
fn month_from_name(name: &str) -> Option<u32> {
    let n = name.to_ascii_lowercase();
    let m = match n.as_str() {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sep" | "sept" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    };
    Some(m)
}

fn validated(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    if year <= 2000 || !(1..=12).contains(&month) || day < 1 {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse a deadline. Patterns are tried in fixed priority:
/// `M/D/YYYY`, `M-D-YYYY`, `YYYY-M-D`, `MonthName D, YYYY`.
/// A pattern whose fields fail validation does not stop the search.
pub fn parse_deadline(text: Option<&str>) -> Option<NaiveDate> {
    let text = text?.trim();
    if text.is_empty() {
        return None;
    }

    DATE_PATTERNS.iter().find_map(|(re, order)| {
        let caps = re.captures(text)?;
        let num = |i: usize| caps.get(i)?.as_str().parse::<u32>().ok();
        match order {
            Order::MonthDayYear => validated(num(3)? as i32, num(1)?, num(2)?),
            Order::YearMonthDay => validated(num(1)? as i32, num(2)?, num(3)?),
            Order::MonthNameDayYear => {
                let month = month_from_name(caps.get(1)?.as_str())?;
                validated(num(3)? as i32, month, num(2)?)
            }
        }
    })
}

/// Build the normalized record for one candidate. Missing text fields take
/// the same defaults the feed and API extractors use.
pub fn normalize_candidate(
    c: CandidateRecord,
    fallback_url: &str,
    provenance: Provenance,
) -> ScholarshipRecord {
    let amount = parse_amount(c.raw_amount.as_deref());
    let deadline = parse_deadline(c.raw_deadline.as_deref());
    ScholarshipRecord {
        title: c.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        description: c
            .description
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        amount,
        deadline,
        source_url: c.source_url.unwrap_or_else(|| fallback_url.to_string()),
        provenance,
    }
}
