//! Pattern-based extraction of calendar dates and bare numbers.
//!
//! Dates are normalized to `YYYY-MM-DD` when a year is present and to
//! `--MM-DD` when it is not, so "March 5, 2025" and "2025-03-05" compare equal.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::{Captures, Regex};

const MONTH: &str = r"(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)";

// "March 5, 2025", "Mar 5th 2025", "March 5"
static MONTH_DAY_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b{MONTH}\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?\b(?:,?\s+(\d{{4}})\b)?"
    ))
    .unwrap()
});

// "5 March 2025", "5th of March"
static DAY_MONTH_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?{MONTH}\b\.?(?:,?\s+(\d{{4}})\b)?"
    ))
    .unwrap()
});

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").unwrap());

// US order: month/day/year
static SLASH_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4}|\d{2})\b").unwrap());

// European order: day.month.year
static DOTTED_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})\.(\d{1,2})\.(\d{4})\b").unwrap());

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,3}(?:,\d{3})+(?:\.\d+)?\b|\b\d+(?:\.\d+)?\b").unwrap());

/// Dates and numbers mentioned in a piece of text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entities {
    pub dates: BTreeSet<String>,
    pub numbers: BTreeSet<String>,
}

impl Entities {
    pub fn extract(text: &str) -> Self {
        let mut dates = BTreeSet::new();
        let mut spans: Vec<(usize, usize)> = Vec::new();

        let patterns: [(&Regex, fn(&Captures) -> Option<String>); 5] = [
            (&*ISO_DATE, |c| ymd(&c[1], &c[2], &c[3])),
            (&*MONTH_DAY_YEAR, |c| {
                named(&c[1], &c[2], c.get(3).map(|m| m.as_str()))
            }),
            (&*DAY_MONTH_YEAR, |c| {
                named(&c[2], &c[1], c.get(3).map(|m| m.as_str()))
            }),
            (&*SLASH_DATE, |c| ymd(&expand_year(&c[3]), &c[1], &c[2])),
            (&*DOTTED_DATE, |c| ymd(&c[3], &c[2], &c[1])),
        ];

        for (pattern, normalize) in patterns {
            for caps in pattern.captures_iter(text) {
                let Some(whole) = caps.get(0) else { continue };
                if overlaps(&spans, whole.start(), whole.end()) {
                    continue;
                }
                spans.push((whole.start(), whole.end()));
                // Unparseable dates (e.g. "31/02/2025") still count, verbatim.
                let value = normalize(&caps).unwrap_or_else(|| whole.as_str().to_lowercase());
                dates.insert(value);
            }
        }

        let mut numbers = BTreeSet::new();
        for m in NUMBER.find_iter(text) {
            if overlaps(&spans, m.start(), m.end()) {
                continue;
            }
            numbers.insert(m.as_str().replace(',', ""));
        }

        Self { dates, numbers }
    }

    pub fn has_dates(&self) -> bool {
        !self.dates.is_empty()
    }

    pub fn has_signal(&self) -> bool {
        !self.dates.is_empty() || !self.numbers.is_empty()
    }

    /// Both sides mention dates and none of them agree.
    pub fn dates_disjoint(&self, other: &Entities) -> bool {
        self.has_dates() && other.has_dates() && !self.shares_date(other)
    }

    /// Both sides carry dates or numbers and share no value.
    pub fn values_disjoint(&self, other: &Entities) -> bool {
        if !self.has_signal() || !other.has_signal() {
            return false;
        }
        !self.shares_date(other) && self.numbers.is_disjoint(&other.numbers)
    }

    fn shares_date(&self, other: &Entities) -> bool {
        self.dates
            .iter()
            .any(|a| other.dates.iter().any(|b| same_day(a, b)))
    }
}

/// A year-less `--MM-DD` matches any full date on that month and day.
fn same_day(a: &str, b: &str) -> bool {
    match (a.strip_prefix("--"), b.strip_prefix("--")) {
        (Some(md), None) => b.len() == 10 && b.ends_with(md),
        (None, Some(md)) => a.len() == 10 && a.ends_with(md),
        _ => a == b,
    }
}

fn overlaps(spans: &[(usize, usize)], start: usize, end: usize) -> bool {
    spans.iter().any(|&(s, e)| start < e && s < end)
}

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.to_lowercase().chars().take(3).collect();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn named(month: &str, day: &str, year: Option<&str>) -> Option<String> {
    let month = month_number(month)?;
    match year {
        Some(year) => ymd(year, &month.to_string(), day),
        None => {
            let day: u32 = day.parse().ok()?;
            // Validate against a leap year so "February 29" is accepted.
            NaiveDate::from_ymd_opt(2024, month, day)?;
            Some(format!("--{month:02}-{day:02}"))
        }
    }
}

fn ymd(year: &str, month: &str, day: &str) -> Option<String> {
    let date = NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)?;
    Some(date.format("%Y-%m-%d").to_string())
}

fn expand_year(year: &str) -> String {
    if year.len() == 2 {
        format!("20{year}")
    } else {
        year.to_string()
    }
}
