//! Case Normalizer: merged case → [`CaseExtract`].
//!
//! Each source is read independently into a flat set of fields, then the
//! sources are combined with a fixed precedence: the drafted report wins over
//! OCR'd deed text, which wins over encumbrance metadata. Party names are the
//! exception and are unioned across all three. Per-source values are kept in
//! `key_fields` as `<field>.<source>` so cross-source disagreements stay
//! visible to the Generator.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::case::{EcEntry, MergedCase, ReportJson};
use crate::doc_number::{DocNumber, normalize_doc_no};
use crate::extract::{CaseExtract, EcTransaction, Fingerprint};
use crate::fields::{
    canonical_deed_type, canonical_state, collapse_whitespace, normalize_extent, normalize_name,
    split_survey_numbers, value_range,
};
use crate::InputError;

/// Normalize a merged case into its fingerprint, key fields, and EC summary.
///
/// Fails when all three sources are empty, or when none of state, district,
/// SRO, survey number, or party name can be extracted from any source.
pub fn normalize(case: &MergedCase) -> Result<CaseExtract, InputError> {
    if !case.has_attachments() && !case.has_encumbrance() && !case.has_report() {
        return Err(InputError::EmptyCase);
    }

    let report = case
        .report_json
        .as_ref()
        .map(SourceFields::from_report)
        .unwrap_or_default();
    let deed = if case.has_attachments() {
        SourceFields::from_deed_text(&case.attachment_text())
    } else {
        SourceFields::default()
    };
    let (ec, transactions) = SourceFields::from_encumbrance(case.encumbrance_details.entries());
    let ec_summary = order_transactions(transactions);

    let sources = [(&report, "report"), (&deed, "deed"), (&ec, "ec")];
    let first = |pick: fn(&SourceFields) -> Option<&String>| {
        sources.iter().find_map(|(s, _)| pick(s)).cloned()
    };

    let state = first(|s| s.state.as_ref());
    let survey_numbers = sources
        .iter()
        .map(|(s, _)| &s.survey_numbers)
        .find(|v| !v.is_empty())
        .cloned()
        .unwrap_or_default();

    let mut seen = HashSet::new();
    let party_names: Vec<String> = sources
        .iter()
        .flat_map(|(s, _)| s.parties.iter())
        .chain(
            ec_summary
                .iter()
                .flat_map(|t| [&t.executant, &t.claimant].into_iter().flatten()),
        )
        .map(|name| normalize_name(name))
        .filter(|name| !name.is_empty() && seen.insert(name.clone()))
        .collect();

    let fingerprint = Fingerprint {
        state: state.clone(),
        district: first(|s| s.district.as_ref()),
        sro: first(|s| s.sro.as_ref()),
        survey_numbers,
        party_names,
    };
    if fingerprint.is_empty() {
        return Err(InputError::NoIdentifyingFields);
    }

    let mut key_fields = BTreeMap::new();
    for (fields, source) in sources {
        fields.write_key_fields(source, &mut key_fields);
    }
    let mortgage_flag = ec_summary.iter().any(EcTransaction::is_mortgage);
    if mortgage_flag {
        key_fields.insert("mortgage.ec".into(), "active".into());
    }
    if let Some(range) = [&ec.market_value, &deed.market_value]
        .into_iter()
        .flatten()
        .find_map(|v| value_range(v))
    {
        key_fields.insert("value_range".into(), range.into());
    }

    let case_code = case
        .report_json
        .as_ref()
        .and_then(|r| r.code.as_deref())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from);

    debug!(
        case_code = case_code.as_deref().unwrap_or("-"),
        state = state.as_deref().unwrap_or("-"),
        key_fields = key_fields.len(),
        transactions = ec_summary.len(),
        "normalized case"
    );

    Ok(CaseExtract {
        case_code,
        detected_state: state,
        fingerprint,
        key_fields,
        ec_summary,
        mortgage_flag,
    })
}

/// Deduplicate and order EC transactions by (year, number).
///
/// Entries with the same document number collapse to the first occurrence;
/// entries without one collapse only when identical. Undated entries keep
/// their input order after all dated ones.
fn order_transactions(transactions: Vec<EcTransaction>) -> Vec<EcTransaction> {
    let mut seen_docs = HashSet::new();
    let mut unique: Vec<EcTransaction> = Vec::with_capacity(transactions.len());
    for txn in transactions {
        let duplicate = match &txn.doc_no {
            Some(doc_no) => !seen_docs.insert(doc_no.clone()),
            None => unique.contains(&txn),
        };
        if !duplicate {
            unique.push(txn);
        }
    }

    let (mut dated, undated): (Vec<_>, Vec<_>) = unique.into_iter().partition(|t| t.doc.is_some());
    dated.sort_by_key(|t| t.doc);
    dated.extend(undated);
    dated
}

// ---------------------------------------------------------------------------
// Per-source field sets
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Boundaries {
    north: Option<String>,
    south: Option<String>,
    east: Option<String>,
    west: Option<String>,
}

impl Boundaries {
    fn slot(&mut self, direction: &str) -> Option<&mut Option<String>> {
        match direction.chars().next()?.to_ascii_lowercase() {
            'n' => Some(&mut self.north),
            's' => Some(&mut self.south),
            'e' => Some(&mut self.east),
            'w' => Some(&mut self.west),
            _ => None,
        }
    }

    fn fill_from(&mut self, other: Boundaries) {
        for (mine, theirs) in [
            (&mut self.north, other.north),
            (&mut self.south, other.south),
            (&mut self.east, other.east),
            (&mut self.west, other.west),
        ] {
            if mine.is_none() {
                *mine = theirs;
            }
        }
    }

    fn entries(&self) -> [(&'static str, &Option<String>); 4] {
        [
            ("boundary_north", &self.north),
            ("boundary_south", &self.south),
            ("boundary_east", &self.east),
            ("boundary_west", &self.west),
        ]
    }
}

/// Flat fields read from one source.
#[derive(Debug, Default)]
struct SourceFields {
    state: Option<String>,
    district: Option<String>,
    sro: Option<String>,
    survey_numbers: Vec<String>,
    parties: Vec<String>,
    doc_no: Option<String>,
    deed_type: Option<String>,
    owner: Option<String>,
    executant: Option<String>,
    claimant: Option<String>,
    house_no: Option<String>,
    extent: Option<String>,
    village: Option<String>,
    market_value: Option<String>,
    consideration_value: Option<String>,
    registration_date: Option<String>,
    execution_date: Option<String>,
    mutation: Option<String>,
    loan_amount: Option<String>,
    boundaries: Boundaries,
}

fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(collapse_whitespace)
        .filter(|v| !v.is_empty())
}

impl SourceFields {
    fn from_report(report: &ReportJson) -> Self {
        let mut fields = Self {
            state: report.state.as_deref().and_then(canonical_state),
            district: clean(report.district.as_deref()),
            sro: clean(report.registered_sro.as_deref()),
            survey_numbers: report
                .survey_no_deed
                .as_deref()
                .map(split_survey_numbers)
                .unwrap_or_default(),
            doc_no: clean(report.registration_no.as_deref()).map(|d| normalize_doc_no(&d)),
            deed_type: clean(report.nature_of_deed.as_deref()).map(|d| canonical_deed_type(&d)),
            owner: clean(report.owner_name.as_deref()),
            house_no: clean(
                report
                    .house_no_old
                    .as_deref()
                    .or(report.house_no_gp.as_deref())
                    .or(report.flat_no.as_deref()),
            ),
            extent: report.property_extent.as_deref().and_then(normalize_extent),
            village: clean(report.alias_name.as_deref()),
            mutation: clean(report.mutation.as_deref()),
            loan_amount: clean(report.loan_amount.as_deref()),
            ..Default::default()
        };
        fields.parties = [clean(report.applicant.as_deref()), fields.owner.clone()]
            .into_iter()
            .flatten()
            .collect();
        if let Some(b) = report.boundaries.first() {
            fields.boundaries = Boundaries {
                north: clean(b.north.as_deref()),
                south: clean(b.south.as_deref()),
                east: clean(b.east.as_deref()),
                west: clean(b.west.as_deref()),
            };
        }
        fields
    }

    fn from_deed_text(raw: &str) -> Self {
        let text = strip_stamp_noise(raw);
        let signed: Vec<String> = SIGNED_BY
            .captures_iter(&text)
            .filter_map(|c| clean(Some(&c[1])))
            .collect();
        let executant = signed
            .first()
            .cloned()
            .or_else(|| capture(&PARTY_DE, &text));
        let claimant = signed
            .get(1)
            .cloned()
            .or_else(|| capture(&PARTY_DR, &text));

        Self {
            state: STATE_NAME
                .captures(&text)
                .and_then(|c| canonical_state(&c[1])),
            district: capture(&DEED_DISTRICT, &text),
            sro: DEED_SRO.iter().find_map(|re| capture(re, &text)),
            survey_numbers: DEED_SURVEY
                .captures(&text)
                .map(|c| split_survey_numbers(&c[1]))
                .unwrap_or_default(),
            parties: [executant.clone(), claimant.clone()]
                .into_iter()
                .flatten()
                .collect(),
            doc_no: DEED_DOC_NO.iter().find_map(|re| {
                re.captures(&text)
                    .and_then(|c| DocNumber::parse(&format!("{}/{}", &c[1], &c[2])))
                    .map(|d| d.to_string())
            }),
            deed_type: DEED_TYPE
                .find(&text)
                .map(|m| canonical_deed_type(m.as_str())),
            executant,
            claimant,
            house_no: DEED_HOUSE_NO.iter().find_map(|re| capture(re, &text)),
            extent: DEED_EXTENT
                .find(&text)
                .and_then(|m| normalize_extent(m.as_str())),
            village: capture(&DEED_VILLAGE, &text),
            market_value: DEED_VALUE.captures(&text).map(|c| digits(&c[1])),
            execution_date: DEED_DATED
                .captures(&text)
                .map(|c| format!("{}-{}-{}", &c[1], short_month(&c[2]), &c[3]))
                .or_else(|| capture(&DEED_DATE_NUMERIC, &text).map(|d| d.replace('/', "-"))),
            registration_date: DEED_REGISTERED
                .captures(&text)
                .map(|c| format!("{}-{}-{}", &c[1], short_month(&c[2]), &c[3])),
            boundaries: parse_boundaries(&text),
            ..Default::default()
        }
    }

    /// Aggregate fields across all EC entries and flatten each entry into a
    /// transaction. Aggregates take the first entry that carries a value.
    fn from_encumbrance(entries: &[EcEntry]) -> (Self, Vec<EcTransaction>) {
        let mut fields = Self::default();
        let mut transactions = Vec::with_capacity(entries.len());

        for entry in entries {
            let description = entry.description.as_deref().unwrap_or_default();
            let identifiers = entry.identifiers.as_deref().unwrap_or_default();
            let deed_value = entry.deed_value.as_deref().unwrap_or_default();
            let dates = entry.dates.as_deref().unwrap_or_default();
            let parties = entry.parties.as_deref().unwrap_or_default();

            fields.state = fields
                .state
                .take()
                .or_else(|| entry.state.as_deref().and_then(canonical_state));
            fields.district = fields.district.take().or_else(|| clean(entry.district.as_deref()));
            fields.sro = fields
                .sro
                .take()
                .or_else(|| clean(entry.sro.as_deref()))
                .or_else(|| capture(&EC_SRO, identifiers));
            if fields.survey_numbers.is_empty() {
                fields.survey_numbers = match entry.survey_no.as_deref() {
                    Some(s) => split_survey_numbers(s),
                    None => EC_SURVEY
                        .captures(description)
                        .map(|c| split_survey_numbers(&c[1]))
                        .unwrap_or_default(),
                };
            }
            fields.extent = fields.extent.take().or_else(|| {
                EC_EXTENT
                    .find(description)
                    .and_then(|m| normalize_extent(m.as_str()))
            });
            fields.house_no = fields.house_no.take().or_else(|| capture(&EC_HOUSE, description));
            fields.boundaries.fill_from(parse_boundaries(description));

            let (doc, doc_no) = match entry.doc_no.as_deref().and_then(|d| clean(Some(d))) {
                Some(raw) => (DocNumber::parse(&raw), Some(normalize_doc_no(&raw))),
                None => {
                    let doc = DocNumber::parse(identifiers);
                    (doc, doc.map(|d| d.to_string()))
                }
            };
            let deed_type = clean(entry.deed_type.as_deref())
                .or_else(|| EC_DEED_CODE.captures(deed_value).and_then(|c| clean(Some(&c[1]))))
                .map(|t| canonical_deed_type(&t));

            let txn = EcTransaction {
                doc_no,
                doc,
                deed_type,
                registration_date: capture(&EC_DATE_R, dates),
                execution_date: capture(&EC_DATE_E, dates),
                executant: capture(&PARTY_DE, parties),
                claimant: capture(&PARTY_DR, parties),
                market_value: EC_MKT_VALUE.captures(deed_value).map(|c| digits(&c[1])),
                consideration_value: EC_CONS_VALUE.captures(deed_value).map(|c| digits(&c[1])),
                description: clean(Some(description)).map(|d| truncate(&d, 300)),
            };
            fields.market_value = fields.market_value.take().or_else(|| txn.market_value.clone());
            fields.consideration_value = fields
                .consideration_value
                .take()
                .or_else(|| txn.consideration_value.clone());
            transactions.push(txn);
        }

        // Title-bearing fields come from the latest non-mortgage transaction.
        let mut ordered: Vec<&EcTransaction> = transactions.iter().filter(|t| !t.is_mortgage()).collect();
        ordered.sort_by_key(|t| t.doc);
        if let Some(latest) = ordered.last() {
            fields.doc_no = latest.doc_no.clone();
            fields.deed_type = latest.deed_type.clone();
            fields.executant = latest.executant.clone();
            fields.claimant = latest.claimant.clone();
            fields.registration_date = latest.registration_date.clone();
            fields.execution_date = latest.execution_date.clone();
        }

        (fields, transactions)
    }

    fn write_key_fields(&self, source: &str, out: &mut BTreeMap<String, String>) {
        let survey = (!self.survey_numbers.is_empty()).then(|| self.survey_numbers.join(", "));
        let scalars: [(&str, Option<&String>); 18] = [
            ("state", self.state.as_ref()),
            ("district", self.district.as_ref()),
            ("sro", self.sro.as_ref()),
            ("survey_no", survey.as_ref()),
            ("doc_no", self.doc_no.as_ref()),
            ("deed_type", self.deed_type.as_ref()),
            ("owner", self.owner.as_ref()),
            ("executant", self.executant.as_ref()),
            ("claimant", self.claimant.as_ref()),
            ("house_no", self.house_no.as_ref()),
            ("extent", self.extent.as_ref()),
            ("village", self.village.as_ref()),
            ("market_value", self.market_value.as_ref()),
            ("consideration_value", self.consideration_value.as_ref()),
            ("registration_date", self.registration_date.as_ref()),
            ("execution_date", self.execution_date.as_ref()),
            ("mutation", self.mutation.as_ref()),
            ("loan_amount", self.loan_amount.as_ref()),
        ];
        let boundaries = self.boundaries.entries();
        let boundaries = boundaries.iter().map(|(k, v)| (*k, v.as_ref()));
        for (field, value) in scalars.into_iter().chain(boundaries) {
            if let Some(value) = value {
                out.insert(format!("{field}.{source}"), value.clone());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text).and_then(|c: Captures| clean(Some(&c[1])))
}

fn digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

fn short_month(month: &str) -> String {
    month.chars().take(3).collect()
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

static STAMP_NOISE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(?:twenty|fifty|hundred|thousand)\s*rupees?",
        r"(?i)india\s*non\s*judicial",
        r"(?i)non\s*judicial\s*stamp",
        r"(?i)stamp\s*s\.?\s*no\.?\s*[:\s]*\d+[a-z]*\s*\d+",
        r"(?i)denomination[:\s]*rs\.?\s*\d+",
        r"(?i)purchased\s*by",
        r"(?i)satyameva?\s*jayate?",
        r"(?i)government\s*of\s*india",
        r"सत्यमेव\s*जयते",
        r"भारत\s*सरकार",
    ]
    .into_iter()
    .map(re)
    .collect()
});

static NUMERIC_LINE: LazyLock<Regex> = LazyLock::new(|| re(r"^[\d\s./\-]+$"));

/// Remove stamp-paper boilerplate and OCR garbage lines from deed text.
fn strip_stamp_noise(text: &str) -> String {
    let mut filtered = text.to_string();
    for pattern in STAMP_NOISE.iter() {
        filtered = pattern.replace_all(&filtered, " ").into_owned();
    }
    filtered
        .lines()
        .filter(|line| {
            let line = line.trim();
            if line.chars().count() < 3 || NUMERIC_LINE.is_match(line) {
                return false;
            }
            let total = line.chars().count();
            let letters = line.chars().filter(char::is_ascii_alphabetic).count();
            total <= 10 || letters * 10 >= total * 3
        })
        .collect::<Vec<_>>()
        .join("\n")
}

static BOUNDARY_BRACKET: LazyLock<Regex> = LazyLock::new(|| re(r"\[([NSEW])\][:\s]*([^\[\]]*)"));
static BOUNDARY_WORD: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b(north|south|east|west)(?:ern\s+side)?(?:\s+by)?\s*[:\-]\s*([^,;\n\[\]]+)")
});
static DIRECTION_WORD: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)\b(?:north|south|east|west)\b"));
static BOUNDARY_JUNK: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)rupee|judicial|stamp|twenty|hundred"));

/// Parse `[N]: x [S]: y` (EC style) and `North: x, South: y` (deed style)
/// boundary descriptions. The first value seen for a direction wins.
fn parse_boundaries(text: &str) -> Boundaries {
    let mut out = Boundaries::default();
    let bracketed = BOUNDARY_BRACKET
        .captures_iter(text)
        .map(|c| (c[1].to_string(), c[2].to_string()));
    let worded = BOUNDARY_WORD.captures_iter(text).map(|c| {
        let value = &c[2];
        let end = DIRECTION_WORD.find(value).map_or(value.len(), |m| m.start());
        (c[1].to_string(), value[..end].to_string())
    });
    for (direction, value) in bracketed.chain(worded) {
        let value = collapse_whitespace(value.trim_end_matches(['.', ' ']));
        if value.is_empty() || BOUNDARY_JUNK.is_match(&value) {
            continue;
        }
        if let Some(slot) = out.slot(&direction) {
            if slot.is_none() {
                *slot = Some(value);
            }
        }
    }
    out
}

static STATE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b(andhra\s+pradesh|telangana|tamil\s*nadu|karnataka|kerala|maharashtra)\b")
});

static SIGNED_BY: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)signed\s*by[:\-\s]*([A-Za-z][A-Za-z .]+?)\s*(?:,|age\b)"));
static PARTY_DE: LazyLock<Regex> = LazyLock::new(|| re(r"\(DE\)\s*([A-Za-z][A-Za-z .]*?)\s*(?:\(|\n|\d|$)"));
static PARTY_DR: LazyLock<Regex> = LazyLock::new(|| re(r"\(DR\)\s*([A-Za-z][A-Za-z .]*?)\s*(?:\(|\n|\d|$)"));

static DEED_DOC_NO: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(?:doct?\s*no[/\s]*year|doc\.?\s*no\.?)[:\s]*(\d+)[/\s]*(?:of\s*)?(\d{4})",
        r"(?i)cs\s*no[/\s]*year[:\s]*(\d+)[/\s]*(\d{4})",
        r"(?i)document\s*no\.?\s*(\d+)\s*(?:of|/)\s*(\d{4})",
    ]
    .into_iter()
    .map(re)
    .collect()
});

static DEED_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)deed\s*of\s*(?:gift|donation)\s*of\s*immovable\s*property|gift\s*settlement\s*deed|settlement\s*deed|sale\s*deed|partition\s*deed|release\s*deed|mortgage\s*deed")
});

static DEED_SURVEY: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b(?:survey\s*(?:no\.?|number)?|sy\.?\s*no\.?)[:\s]*(\d+(?:[/\-][0-9A-Za-z]+)*(?:\s*,\s*\d+(?:[/\-][0-9A-Za-z]+)*)*)")
});

static DEED_HOUSE_NO: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)bearing\s*(?:house\s*)?(?:number|no\.?)\s*(\d+[-/]?\d*)",
        r"(?i)\b(?:door|house|d)\.?\s*no\.?[:\s]*(\d+[-/]\d+)",
    ]
    .into_iter()
    .map(re)
    .collect()
});

static DEED_EXTENT: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)(?:admeasuring|extent)\s*(?:an\s*)?(?:extent\s*)?(?:of\s*)?\d+(?:\.\d+)?\s*(?:sq\.?\s*(?:yds?|yards?|ft|feet|m(?:trs?)?)\.?|acres?|cents?|guntas?)")
});

static DEED_VILLAGE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b(?:village|vill\.?)[:\s]+([A-Za-z][A-Za-z ]*?)\s*(?:,|\n|mandal|district|panchayat)")
});

static DEED_DISTRICT: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b(?:district|dist\.)[:\s]+([A-Za-z][A-Za-z ]*?)\s*(?:,|\n|\.|state\b|registered\b)")
});

static DEED_SRO: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)sub-?registrar(?:\s*office)?[,\s]+(?:of\s+)?([A-Za-z][A-Za-z ]*?)\s*(?:\(|\n|,|along)",
        r"(?i)\bSRO[:\s]+([A-Za-z][A-Za-z ]*?)\s*(?:\(|\n|,)",
    ]
    .into_iter()
    .map(re)
    .collect()
});

static DEED_VALUE: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)(?:valued\s*at|worth|market\s*value)[:\s]*rs\.?\s*([\d,]+)"));
static DEED_DATED: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\bdated?\s+(\d{1,2})(?:st|nd|rd|th)?\s*(?:day\s*)?(?:of\s*)?([A-Za-z]{3,}),?\s*(\d{4})")
});
static DEED_DATE_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)\bdate[:\s]*(\d{2}[-/]\d{2}[-/]\d{4})"));
static DEED_REGISTERED: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)registered\s*on\D*?(\d{1,2})(?:st|nd|rd|th)?\s*(?:day\s*of\s*)?([A-Za-z]{3,}),?\s*(\d{4})")
});

static EC_SRO: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)\bSRO\s*\n?\s*([A-Z][A-Z ]*?)\s*(?:\(|\n|$)"));
static EC_SURVEY: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)survey\s*(?:no\.?)?[:\s]*(\d+(?:/[0-9A-Za-z]+)*(?:\s*,\s*\d+(?:/[0-9A-Za-z]+)*)*)")
});
static EC_EXTENT: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)extent[:\s]*[\d.]+\s*(?:sq\.?\s*(?:yds?|ft|m)\.?|acres?|cents?|guntas?)")
});
static EC_HOUSE: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)house[:\s]*(?:no\.?\s*)?([\d][\d\-/]*)"));
static EC_DEED_CODE: LazyLock<Regex> = LazyLock::new(|| re(r"^\s*\d+\s*\n?\s*([A-Za-z][A-Za-z ]*)"));
static EC_MKT_VALUE: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)mkt\.?\s*value[:\s]*rs\.?\s*([\d,]+)"));
static EC_CONS_VALUE: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)cons\.?\s*value[:\s]*rs\.?\s*([\d,]+)"));
static EC_DATE_R: LazyLock<Regex> = LazyLock::new(|| re(r"\(R\)\s*([\d\-/]+)"));
static EC_DATE_E: LazyLock<Regex> = LazyLock::new(|| re(r"\(E\)\s*([\d\-/]+)"));

#[cfg(test)]
mod tests {
    use super::*;

    fn case(json: &str) -> MergedCase {
        MergedCase::from_json(json).unwrap()
    }

    #[test]
    fn empty_case_rejected() {
        let err = normalize(&case(r#"{"attachments": [], "encumbranceDetails": []}"#)).unwrap_err();
        assert!(matches!(err, InputError::EmptyCase));
    }

    #[test]
    fn no_identifying_fields_rejected() {
        let err = normalize(&case(r#"{"attachments": ["lorem ipsum dolor sit amet"]}"#)).unwrap_err();
        assert!(matches!(err, InputError::NoIdentifyingFields));
    }

    #[test]
    fn report_wins_over_ocr_and_ec() {
        let extract = normalize(&case(
            r#"{
            "attachments": ["Schedule of property situated in Survey No. 999/1, District: Medak, State of Telangana"],
            "encumbranceDetails": [{"description": "SURVEY: 777", "state": "AP", "district": "Guntur"}],
            "reportJson": {"state": "TS", "surveyNoDeed": "Sy. No. 123/4", "registeredSRO": "Kapra"}
        }"#,
        ))
        .unwrap();
        let fp = &extract.fingerprint;
        assert_eq!(fp.state.as_deref(), Some("Telangana"));
        assert_eq!(fp.survey_numbers, vec!["123/4"]);
        assert_eq!(fp.sro.as_deref(), Some("Kapra"));
        // District falls through to the OCR text.
        assert_eq!(fp.district.as_deref(), Some("Medak"));
        assert_eq!(extract.detected_state.as_deref(), Some("Telangana"));
        assert_eq!(extract.key_fields["survey_no.deed"], "999/1");
        assert_eq!(extract.key_fields["survey_no.ec"], "777");
        assert_eq!(extract.key_fields["state.ec"], "Andhra Pradesh");
    }

    #[test]
    fn party_names_unioned_and_deduplicated() {
        let extract = normalize(&case(
            r#"{
            "encumbranceDetails": [{"parties": "(DE) RAVI KUMAR\n(DR) K LAKSHMI"}],
            "reportJson": {"applicant": "K  Lakshmi", "ownerName1": "Ravi S/O Rao"}
        }"#,
        ))
        .unwrap();
        assert_eq!(
            extract.fingerprint.party_names,
            vec!["k lakshmi", "ravi son of rao", "ravi kumar"]
        );
    }

    #[test]
    fn ec_summary_is_chronological_and_deduplicated() {
        let extract = normalize(&case(
            r#"{"encumbranceDetails": {"transactions": [
                {"identifiers": "0/0\n4960/2011 [1]\nof SRO KAPRA", "deedValue": "1\nSale\nMkt.Value: Rs. 450000"},
                {"description": "undated note"},
                {"docNo": "39 of 2026", "deedType": "Gift Settlement"},
                {"identifiers": "4960/2011 [1]"},
                {"docNo": "12/2015", "deedType": "Mortgage"},
                {"description": "undated note"}
            ]}}"#,
        ))
        .unwrap();
        let docs: Vec<Option<&str>> = extract.ec_summary.iter().map(|t| t.doc_no.as_deref()).collect();
        assert_eq!(
            docs,
            vec![Some("4960/2011"), Some("12/2015"), Some("39/2026"), None]
        );
        assert_eq!(extract.fingerprint.sro.as_deref(), Some("KAPRA"));
        assert!(extract.mortgage_flag);
        assert_eq!(extract.key_fields["doc_no.ec"], "39/2026");
        assert_eq!(extract.key_fields["deed_type.ec"], "Gift Deed");
        assert_eq!(extract.key_fields["value_range"], "1-5L");
    }

    #[test]
    fn boundary_sources_stay_distinct() {
        let extract = normalize(&case(
            r#"{
            "attachments": ["SCHEDULE OF PROPERTY\nHouse in Survey No. 123, bounded by East: Road, West: House of Ramaiah"],
            "encumbranceDetails": [{"description": "[N]: Open land [E]: Survey 456"}],
            "reportJson": {"state": "Andhra Pradesh"}
        }"#,
        ))
        .unwrap();
        assert_eq!(extract.key_fields["boundary_east.deed"], "Road");
        assert_eq!(extract.key_fields["boundary_west.deed"], "House of Ramaiah");
        assert_eq!(extract.key_fields["boundary_east.ec"], "Survey 456");
        assert_eq!(extract.key_fields["boundary_north.ec"], "Open land");
    }

    #[test]
    fn deed_text_fields() {
        let extract = normalize(&case(
            r#"{"attachments": [
            "INDIA NON JUDICIAL\nTwenty Rupees\nGIFT SETTLEMENT DEED\nThis deed dated 6th January, 2026 is registered as document No. 1101 of 2026.\nSigned by K Ravi, Age 54\nSigned by K Lakshmi, Age 30\nadmeasuring an extent of 145 Sq. Yds in Sy. No. 225/2"
        ]}"#,
        ))
        .unwrap();
        let kf = &extract.key_fields;
        assert_eq!(kf["doc_no.deed"], "1101/2026");
        assert_eq!(kf["deed_type.deed"], "Gift Deed");
        assert_eq!(kf["extent.deed"], "145 sq.yds");
        assert_eq!(kf["executant.deed"], "K Ravi");
        assert_eq!(kf["claimant.deed"], "K Lakshmi");
        assert_eq!(kf["execution_date.deed"], "6-Jan-2026");
        assert_eq!(extract.fingerprint.survey_numbers, vec!["225/2"]);
    }

    #[test]
    fn stamp_noise_removed() {
        let cleaned = strip_stamp_noise("INDIA NON JUDICIAL\n12345 678\nSALE DEED between parties");
        assert_eq!(cleaned, "SALE DEED between parties");
    }
}
