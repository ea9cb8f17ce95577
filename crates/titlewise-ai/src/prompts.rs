//! Generator and Critic prompt templates.

use crate::llm::ResponseSchema;

/// Review checklist embedded in the Generator prompt.
pub const REVIEW_CHECKLIST: &str = "\
A. Property details
- Owner name matches the latest title deed and the EC claimant (spelling, initials, surname).
- Document number and year, deed type and SRO match the deed.
- House, assessment and survey numbers match the deed.
- Village, mandal, district and state are complete.
- Extent, with units, matches the deed and is consistent across sections.

B. Schedule of property
- Boundaries (N/S/E/W) match the deed. The deed is primary; an EC difference is noted in remarks.
- Relationships between parties match the deed recitals.
- Conditional settlements (life interest and similar) are captured.

C. Documents scrutinized
- Every document relied upon is listed, oldest first, with date, type and copy kind.

D. Encumbrance certificate
- The EC period covers the policy period.
- All document numbers, years and deed types from the EC are reflected.
- Every mortgage and receipt deed is captured; an active mortgage makes the
  conclusion \"subject to discharge/release\".

E. Flow of title
- The chain is continuous from the earliest link document to the current owner.
- Each step has the correct registration number, date, parties and extent.
- Deaths are supported by certificates; representatives (PoA, heirs) are named.

F. Mutation and tax
- Mutation is consistent with the tax register; receipts name the payer, number and period.

G. Conclusion and remarks
- Restates owner, extent, identifiers and location.
- Lists encumbrances, conditional interests and EC limitations as \"subject to\".

H. State-specific considerations
- Tamil Nadu: EC party names and boundaries may be in Tamil script; compare meaning, not script.
  \"Conveyance\" equals \"Sale Deed\" and \"Gift Settlement\" equals \"Gift Deed\".
  Document numbers read \"Docno/Docyear: NNNN/YYYY\"; do not mistake them for survey numbers.
- Telangana / Andhra Pradesh: EC boundaries use [N]: [S]: [E]: [W]:; parties are marked (DE)
  executant and (DR) claimant; values read \"Mkt. Value: Rs. X, Cons. Value: Rs. Y\".
- Karnataka: some fields may be in Kannada script.
";

/// Format differences the Critic must not keep as issues.
pub const FALSE_POSITIVES: &str = "\
- A name in regional script in the EC versus its English transliteration in the report.
- \"Conveyance\" versus \"Sale Deed\", \"Gift Settlement\" versus \"Gift Deed\".
- \"4960/2011\" versus \"4960 of 2011\".
- Boundary label formats ([N]: versus North:) when the content matches.
- A survey-number issue whose evidence is actually a document number (NNNN/YYYY).
- Evidence taken from stamp-paper text (Rs., judicial, denomination) or OCR noise.
- An owner mismatch that compares the report owner with the EC executant instead of the claimant.
";

/// Stage 1: high-recall issue detection.
pub fn generator_prompt(case_extract: &str, precedents: &str, sources: &str) -> String {
    let schema = ResponseSchema::CandidateReview;
    format!(
        "You are a senior title lawyer checking a maker-drafted property title report against \
its source documents.

## Task
List every potential issue in the report. Favour recall: include uncertain issues, they are \
filtered later.

## Evidence
Every issue needs two EXACT excerpts, copied character for character:
- evidence.report: from the report text below;
- evidence.source_doc: from the deed text or EC entries below.
An issue without both excerpts is discarded.

## Checklist
{REVIEW_CHECKLIST}
## Precedents (similar reviewed cases)
{precedents}

Use precedents to calibrate: an exception recorded on a precedent is an accepted variation, \
a recurring problem deserves priority.

## Case extract
{case_extract}
## Source texts
{sources}

## Output
Return a single {name} JSON object:
{shape}
",
        name = schema.name(),
        shape = schema.shape(),
    )
}

/// Stage 2: prune, merge and calibrate the Generator's candidates.
pub fn critic_prompt(
    case_extract: &str,
    precedents: &str,
    sources: &str,
    candidates: &str,
) -> String {
    let schema = ResponseSchema::FinalReview;
    format!(
        "You are the quality-control reviewer for title review findings.

## Task
Turn the candidate issues into the final review:
1. Remove issues whose evidence is not an exact excerpt, does not prove a mismatch, or is generic.
2. Merge issues that describe the same underlying mismatch.
3. Calibrate severity with the precedents. Accepted variations become LOW; never delete them.
4. Number issues per section (PD-01, SP-01, EC-01, ...).

## Not issues
{FALSE_POSITIVES}
## Precedents
{precedents}

## Case extract
{case_extract}
## Source texts
{sources}

## Candidate issues
{candidates}

## Output
Return only the {name} JSON object:
{shape}
",
        name = schema.name(),
        shape = schema.shape(),
    )
}

/// Appended to a prompt when the previous response could not be used.
pub fn corrective_suffix(error: &str) -> String {
    format!(
        "\n\nIMPORTANT: your previous response was rejected ({error}). Output ONLY one valid JSON \
object in the format above, with no markdown fences or commentary."
    )
}
