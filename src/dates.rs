// Date tokens used by result documents and archive file names

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Parse an 8-digit `DDMMYYYY` token into a calendar date.
///
/// Returns `None` for anything that is not exactly eight ASCII digits or does
/// not name a real day (`31022024`).
pub fn parse_ddmmyyyy(token: &str) -> Option<NaiveDate> {
    let token = token.trim();
    if token.len() != 8 || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let day: u32 = token[0..2].parse().ok()?;
    let month: u32 = token[2..4].parse().ok()?;
    let year: i32 = token[4..8].parse().ok()?;

    NaiveDate::from_ymd_opt(year, month, day)
}

/// Render back to the source token form.
pub fn to_ddmmyyyy(date: NaiveDate) -> String {
    date.format("%d%m%Y").to_string()
}

/// Human-readable form, e.g. `05 Mar 1998`.
pub fn display_date(date: NaiveDate) -> String {
    date.format("%d %b %Y").to_string()
}

/// Display form of a meet's date range; a single day renders once.
pub fn display_range(start: NaiveDate, end: NaiveDate) -> String {
    if start == end {
        display_date(start)
    } else {
        format!("{} - {}", display_date(start), display_date(end))
    }
}

/// ISO storage form (`YYYY-MM-DD`), sorts chronologically as text.
pub fn to_iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn from_iso(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

// ============================================================================
// FILE NAME HEURISTICS
// ============================================================================

// Compiled once; an invalid pattern turns the heuristic off.
fn date_token_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(0[1-9]|[12][0-9]|3[01])[A-Za-z]{3}[0-9]{4}").ok())
        .as_ref()
}

fn trailing_code_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.*?)-[0-9]{3}$").ok()).as_ref()
}

/// Find a `08Aug2025`-style token in a file stem. Returns the token and its year.
pub fn extract_date_token(stem: &str) -> Option<(String, i32)> {
    let token = date_token_re()?.find(stem)?.as_str().to_string();
    let year_digits: String = token.chars().skip(5).collect();
    let year = year_digits.parse().ok()?;
    Some((token, year))
}

/// Calendar date of a `08Aug2025`-style token.
pub fn parse_date_token(token: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(token, "%d%b%Y").ok()
}

/// File name without extension and without a trailing `-NNN` download code.
pub fn clean_stem(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);

    match trailing_code_re().and_then(|re| re.captures(stem)) {
        Some(caps) => caps[1].to_string(),
        None => stem.to_string(),
    }
}

/// Year of a date, for the `meet_year` column.
pub fn year_of(date: NaiveDate) -> i32 {
    date.year()
}
