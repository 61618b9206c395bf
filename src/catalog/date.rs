//! Fuzzy written dates resolved to a range of days and a sortable year.

use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A date as written by an editor plus the day range it can stand for.
///
/// `from`/`to` are inclusive. A plain year covers the whole year, a month
/// the whole month, a full date only itself. `year` is the year of `from`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzyDate {
    pub written: String,
    pub year: Option<i32>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

struct Patterns {
    explicit: Regex,
    iso: Regex,
    german: Regex,
    month: Regex,
    year: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        explicit: Regex::new(r"<([^>]*)>").expect("Invalid regex pattern"),
        iso: Regex::new(r"^(\d{1,4})-(\d{1,2})-(\d{1,2})$").expect("Invalid regex pattern"),
        german: Regex::new(r"^(\d{1,2})\.(\d{1,2})\.(\d{3,4})$").expect("Invalid regex pattern"),
        month: Regex::new(r"^(\d{1,2})\.(\d{3,4})$").expect("Invalid regex pattern"),
        year: Regex::new(r"\b(\d{3,4})\b").expect("Invalid regex pattern"),
    })
}

type Bounds = (NaiveDate, NaiveDate);

impl FuzzyDate {
    pub fn parse(written: &str) -> Self {
        let bounds = resolve(written);
        Self {
            written: written.to_string(),
            year: bounds.map(|(from, _)| from.year()),
            from: bounds.map(|(from, _)| from),
            to: bounds.map(|(_, to)| to),
        }
    }
}

fn resolve(written: &str) -> Option<Bounds> {
    let p = patterns();

    // `1490<1490-06-01>` or `Sommer 1490<1490-06-01,1490-08-31>`: the
    // bracketed part is authoritative
    if let Some(cap) = p.explicit.captures(written) {
        let inner = cap[1].trim();
        return match inner.split_once(',') {
            Some((from, to)) => {
                let (from, _) = resolve(from.trim())?;
                let (_, to) = resolve(to.trim())?;
                (from <= to).then_some((from, to))
            }
            None => resolve(inner),
        };
    }

    let text = written.trim();
    if let Some(cap) = p.iso.captures(text) {
        return single_day(&cap[1], &cap[2], &cap[3]);
    }
    if let Some(cap) = p.german.captures(text) {
        return single_day(&cap[3], &cap[2], &cap[1]);
    }
    if let Some(cap) = p.month.captures(text) {
        return whole_month(cap[2].parse().ok()?, cap[1].parse().ok()?);
    }

    let year: i32 = p.year.captures(text)?[1].parse().ok()?;
    Some((NaiveDate::from_ymd_opt(year, 1, 1)?, NaiveDate::from_ymd_opt(year, 12, 31)?))
}

fn single_day(year: &str, month: &str, day: &str) -> Option<Bounds> {
    let date = NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?);
    if date.is_none() {
        log::debug!("Ignoring impossible date {}-{}-{}", year, month, day);
    }
    date.map(|d| (d, d))
}

fn whole_month(year: i32, month: u32) -> Option<Bounds> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next.pred_opt()?))
}
