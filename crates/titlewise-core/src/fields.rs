//! Field-level normalization shared by the case normalizer and the chunker.

use std::sync::LazyLock;

use regex::Regex;

static RELATION_PREFIXES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)\bs/o\b", "son of"),
        (r"(?i)\bd/o\b", "daughter of"),
        (r"(?i)\bw/o\b", "wife of"),
        (r"(?i)\bh/o\b", "husband of"),
        (r"(?i)\bc/o\b", "care of"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), replacement))
    .collect()
});

static EXTENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)").unwrap());

static EXTENT_UNITS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)sq\.?\s*(?:yds?|yards?)|square\s*yards?", "sq.yds"),
        (r"(?i)sq\.?\s*(?:ft|feet)|square\s*feet|sqft", "sq.ft"),
        (r"(?i)sq\.?\s*m(?:tr?s?|eters?|etres?)?\b|square\s*met", "sq.m"),
        (r"(?i)cents?", "cents"),
        (r"(?i)acres?", "acres"),
        (r"(?i)guntas?", "guntas"),
    ]
    .into_iter()
    .map(|(pattern, unit)| (Regex::new(pattern).unwrap(), unit))
    .collect()
});

static SURVEY_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:survey\s*(?:no\.?|number)?|sy\.?\s*no\.?|s\.?\s*no\.?)\s*:?\s*").unwrap()
});

/// Collapse whitespace runs to single spaces and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a person's name for comparison: lowercase, collapsed
/// whitespace, relationship abbreviations spelled out.
pub fn normalize_name(name: &str) -> String {
    let mut out = collapse_whitespace(name).to_lowercase();
    for (pattern, replacement) in RELATION_PREFIXES.iter() {
        out = pattern.replace_all(&out, *replacement).into_owned();
    }
    out
}

/// Strip `Survey No.` / `Sy. No.` style prefixes.
pub fn normalize_survey_no(survey: &str) -> String {
    SURVEY_PREFIX.replace(survey, "").trim().to_string()
}

/// Split a survey field that may list several numbers (`"225/2, 228/1B2B"`).
pub fn split_survey_numbers(survey: &str) -> Vec<String> {
    survey
        .split([',', ';', '&'])
        .map(normalize_survey_no)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Normalize an extent to `<value> <unit>` (`"145 sq.yds"`).
///
/// Returns `None` when no numeric value is present. The unit is omitted when
/// none is recognized.
pub fn normalize_extent(raw: &str) -> Option<String> {
    let caps = EXTENT.captures(raw)?;
    let value: f64 = caps[1].parse().ok()?;
    let value = if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        value.to_string()
    };
    let unit = EXTENT_UNITS
        .iter()
        .find(|(pattern, _)| pattern.is_match(raw))
        .map(|(_, unit)| *unit);
    Some(match unit {
        Some(unit) => format!("{value} {unit}"),
        None => value,
    })
}

/// Canonical state name; accepts the registry's short codes.
///
/// Unknown values are title-cased so that filters compare equal regardless of
/// source casing.
pub fn canonical_state(raw: &str) -> Option<String> {
    let trimmed = collapse_whitespace(raw);
    if trimmed.is_empty() {
        return None;
    }
    let canonical = match trimmed.to_ascii_uppercase().as_str() {
        "AP" | "ANDHRA PRADESH" => "Andhra Pradesh",
        "TS" | "TG" | "TELANGANA" => "Telangana",
        "TN" | "TAMIL NADU" | "TAMILNADU" => "Tamil Nadu",
        "KA" | "KARNATAKA" => "Karnataka",
        "KL" | "KERALA" => "Kerala",
        "MH" | "MAHARASHTRA" => "Maharashtra",
        _ => return Some(title_case(&trimmed)),
    };
    Some(canonical.to_string())
}

/// Canonical deed type. Registry vocabularies differ by state; equivalent
/// names collapse to one label.
pub fn canonical_deed_type(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let label = if lower.contains("mortgage") {
        "Mortgage Deed"
    } else if lower.contains("gift") {
        "Gift Deed"
    } else if lower.contains("conveyance") || lower.contains("sale") {
        "Sale Deed"
    } else if lower.contains("partition") {
        "Partition Deed"
    } else if lower.contains("release") {
        "Release Deed"
    } else if lower.contains("settlement") {
        "Settlement Deed"
    } else {
        return title_case(&collapse_whitespace(raw));
    };
    label.to_string()
}

/// Bucket a market value in rupees (`<1L`, `1-5L`, `5-10L`, `>10L`).
pub fn value_range(raw: &str) -> Option<&'static str> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let value: u64 = digits.parse().ok()?;
    Some(match value {
        0..100_000 => "<1L",
        100_000..500_000 => "1-5L",
        500_000..1_000_000 => "5-10L",
        _ => ">10L",
    })
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_normalize_relationships() {
        assert_eq!(normalize_name("  K.  Ramesh S/O  Venkat "), "k. ramesh son of venkat");
        assert_eq!(normalize_name("Lakshmi w/o Ravi"), "lakshmi wife of ravi");
    }

    #[test]
    fn survey_prefixes_stripped() {
        assert_eq!(normalize_survey_no("Sy. No. 123/4"), "123/4");
        assert_eq!(normalize_survey_no("Survey No: 456"), "456");
        assert_eq!(split_survey_numbers("225/2, 228/1B2B"), vec!["225/2", "228/1B2B"]);
    }

    #[test]
    fn extents_normalize_units() {
        assert_eq!(normalize_extent("145 Sq. Yds").as_deref(), Some("145 sq.yds"));
        assert_eq!(normalize_extent("EXTENT: 145.0 SQ.YDS").as_deref(), Some("145 sq.yds"));
        assert_eq!(normalize_extent("2.5 Acres").as_deref(), Some("2.5 acres"));
        assert_eq!(normalize_extent("1200 sqft").as_deref(), Some("1200 sq.ft"));
        assert_eq!(normalize_extent("about 40").as_deref(), Some("40"));
        assert_eq!(normalize_extent("unknown"), None);
    }

    #[test]
    fn states_canonicalize() {
        assert_eq!(canonical_state("AP").as_deref(), Some("Andhra Pradesh"));
        assert_eq!(canonical_state("tamil nadu").as_deref(), Some("Tamil Nadu"));
        assert_eq!(canonical_state("ODISHA").as_deref(), Some("Odisha"));
        assert_eq!(canonical_state("   "), None);
    }

    #[test]
    fn deed_types_collapse_equivalents() {
        assert_eq!(canonical_deed_type("Conveyance"), "Sale Deed");
        assert_eq!(canonical_deed_type("Gift Settlement"), "Gift Deed");
        assert_eq!(canonical_deed_type("deed of gift of immovable property"), "Gift Deed");
        assert_eq!(canonical_deed_type("lease agreement"), "Lease Agreement");
    }

    #[test]
    fn value_ranges() {
        assert_eq!(value_range("Rs. 85,000"), Some("<1L"));
        assert_eq!(value_range("450000"), Some("1-5L"));
        assert_eq!(value_range("2500000"), Some(">10L"));
        assert_eq!(value_range("n/a"), None);
    }
}
