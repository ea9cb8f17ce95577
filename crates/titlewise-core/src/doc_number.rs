//! Registration document numbers and their chronological sort key.
//!
//! Sub-registrar offices number deeds per calendar year, so a document is
//! identified by `(number, year)`. Sources write the pair in several ways:
//!
//! - `1101/2026` (EC identifiers, report fields)
//! - `1101-2026`
//! - `39 of 2026` (deed recitals)
//! - `Docno/Docyear: 4960/2011` (Tamil Nadu EC exports)
//!
//! [`DocNumber::sort_key`] renders a string that sorts by year, then number,
//! so `ORDER BY sort_key` recovers registration order.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static DOC_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*(?:of|/|-)\s*(\d{4})\b").unwrap());

/// A parsed registration document number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocNumber {
    // Field order matters: derived `Ord` compares year first.
    pub year: u16,
    pub number: u32,
}

impl DocNumber {
    /// Parse the first `<number> (of|/|-) <year>` pair in `s`.
    ///
    /// Placeholders such as `0/0` and years before 1900 are rejected.
    pub fn parse(s: &str) -> Option<Self> {
        DOC_NUMBER.captures_iter(s).find_map(|caps| {
            let number: u32 = caps[1].parse().ok()?;
            let year: u16 = caps[2].parse().ok()?;
            (number > 0 && year >= 1900).then_some(Self { year, number })
        })
    }

    /// Lexicographically sortable key: `"2026.001101"`.
    pub fn sort_key(&self) -> String {
        format!("{:04}.{:06}", self.year, self.number)
    }
}

impl fmt::Display for DocNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.number, self.year)
    }
}

/// Normalize a document number string to `number/year`, or return the input
/// with whitespace removed when it does not parse.
pub fn normalize_doc_no(s: &str) -> String {
    match DocNumber::parse(s) {
        Some(doc) => doc.to_string(),
        None => s.split_whitespace().collect(),
    }
}
