//! `SchemaEnforcer` — spec section 4.9.
//!
//! Staged failure mode as a typed result rather than exceptions (spec
//! section 9): [`EnforceOutcome`] is `Ok`/`RepairNeeded`/`Fail`, and the
//! orchestrator branches on it instead of catching.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::{ChatAdvisorResponse, NextActionKind, Recommendation};

const MAX_RECOMMENDATIONS: usize = 5;
const MAX_NOTES_CHARS: usize = 1000;

fn course_code_in_text_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Z]{2,4} [0-9]{4}[A-Z]?").expect("static pattern"))
}

fn course_code_canonical_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Z]{2,4}) ([0-9]{4}[A-Z]?)$").expect("static pattern"))
}

/// Outcome of attempting to enforce the schema against raw model output.
pub enum EnforceOutcome {
    /// Validated and sanitized successfully.
    Ok(ChatAdvisorResponse),
    /// Decoding/validation failed; the orchestrator should re-ask once with
    /// the given repair prompt suffix appended to the original prompt.
    RepairNeeded { reason: String },
    /// A second failure after repair; the orchestrator falls back to the
    /// regex extractor.
    Fail { reason: String },
}

/// Extract a JSON object from raw model text, in the documented order:
/// fenced code block, then a balanced-brace scan, then the raw text.
#[must_use]
pub fn extract_json_candidate(raw: &str) -> String {
    if let Some(fenced) = extract_fenced_block(raw) {
        return fenced;
    }
    if let Some(balanced) = extract_balanced_braces(raw) {
        return balanced;
    }
    raw.to_string()
}

fn extract_fenced_block(raw: &str) -> Option<String> {
    let needle_json = "```json";
    if let Some(start) = raw.find(needle_json) {
        let after = &raw[start + needle_json.len()..];
        if let Some(end) = after.find("```") {
            return Some(after[..end].trim().to_string());
        }
    }
    let needle = "```";
    if let Some(start) = raw.find(needle) {
        let after = &raw[start + needle.len()..];
        if let Some(end) = after.find("```") {
            return Some(after[..end].trim().to_string());
        }
    }
    None
}

/// Balanced-brace scan from the first `{`, tracking string literals and
/// escapes so braces inside strings don't throw off the count.
fn extract_balanced_braces(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let start = raw.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        let c = b as char;
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(raw[start..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Idempotent, conservative repair: normalize smart quotes, strip
/// enclosing backticks, remove trailing commas, and swap single for double
/// quotes only when no double quote is present at all.
#[must_use]
pub fn repair(candidate: &str) -> String {
    let mut s = candidate.trim().to_string();

    s = s.replace(['\u{201C}', '\u{201D}'], "\"");
    s = s.replace(['\u{2018}', '\u{2019}'], "'");

    while s.starts_with('`') {
        s.remove(0);
    }
    while s.ends_with('`') {
        s.pop();
    }
    let s = s.trim().to_string();

    let s = remove_trailing_commas(&s);

    if !s.contains('"') && s.contains('\'') {
        s.replace('\'', "\"")
    } else {
        s
    }
}

fn remove_trailing_commas(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                i += 1;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

/// Decode and validate raw model output against `ChatAdvisorResponse`,
/// without sanitizing. Returns the staged `JSONEnforceError` on failure
/// via `Err`.
pub fn decode_and_validate(raw: &str) -> Result<ChatAdvisorResponse> {
    let candidate = extract_json_candidate(raw);
    let repaired = repair(&candidate);
    let repaired_twice = repair(&repaired);
    debug_assert_eq!(repaired, repaired_twice, "repair must be idempotent");

    let value: Value = serde_json::from_str(&repaired).map_err(|e| Error::SchemaEnforce {
        stage: "json_decode",
        detail: e.to_string(),
    })?;

    let response: ChatAdvisorResponse =
        serde_json::from_value(value).map_err(|e| Error::SchemaEnforce {
            stage: "schema_validate",
            detail: e.to_string(),
        })?;

    Ok(response)
}

/// Post-validate sanitization; never fails. Normalizes course codes,
/// dedupes (first occurrence wins), keeps up to 5, re-assigns contiguous
/// priorities, and truncates notes.
#[must_use]
pub fn sanitize(mut response: ChatAdvisorResponse) -> ChatAdvisorResponse {
    let mut seen = std::collections::HashSet::new();
    let mut deduped = Vec::new();

    for mut rec in response.recommendations.drain(..) {
        let collapsed: String = rec.course_code.split_whitespace().collect::<Vec<_>>().join(" ");
        let upper = collapsed.to_uppercase();
        let normalized = match course_code_canonical_re().captures(&upper) {
            Some(caps) => format!("{} {}", &caps[1], &caps[2]),
            None => upper,
        };
        if !seen.insert(normalized.clone()) {
            continue;
        }
        rec.course_code = normalized;
        deduped.push(rec);
        if deduped.len() == MAX_RECOMMENDATIONS {
            break;
        }
    }

    for (i, rec) in deduped.iter_mut().enumerate() {
        rec.priority = (i + 1) as u8;
    }
    response.recommendations = deduped;

    if let Some(notes) = &response.notes {
        if notes.chars().count() > MAX_NOTES_CHARS {
            response.notes = Some(notes.chars().take(MAX_NOTES_CHARS).collect());
        }
    }

    response
}

/// Build the re-ask prompt: the original prompt plus an instruction to
/// emit only a conforming JSON object, with the schema appended.
#[must_use]
pub fn build_reask_prompt(original_prompt: &str, schema_json: &str) -> String {
    format!(
        "{original_prompt}\n\nNow output ONLY a JSON object that conforms to this schema. No prose, no code fences.\nSCHEMA:\n{schema_json}"
    )
}

/// Last-resort regex-based fallback used after a second strict-JSON
/// failure: extracts up to three course codes and stamps
/// `validation_passed = false` is the caller's responsibility (this
/// builds the recommendations; the caller sets that flag on the envelope
/// it wraps them in).
#[must_use]
pub fn regex_fallback_recommendations(raw: &str) -> Vec<Recommendation> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for m in course_code_in_text_re().find_iter(raw) {
        let code = m.as_str().to_string();
        if !seen.insert(code.clone()) {
            continue;
        }
        out.push(Recommendation {
            course_code: code.clone(),
            title: code.clone(),
            rationale: "Extracted from unstructured model output after repeated schema failures."
                .to_string(),
            priority: (out.len() + 1) as u8,
            next_action: NextActionKind::CheckPrereqs,
            difficulty_warning: None,
            source: None,
        });
        if out.len() == 3 {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json() {
        let raw = "here you go:\n```json\n{\"a\": 1}\n```\nthanks";
        assert_eq!(extract_json_candidate(raw), "{\"a\": 1}");
    }

    #[test]
    fn extracts_balanced_braces_with_nested_strings() {
        let raw = "prefix {\"a\": \"}\", \"b\": {\"c\": 1}} suffix";
        let got = extract_json_candidate(raw);
        assert_eq!(got, "{\"a\": \"}\", \"b\": {\"c\": 1}}");
    }

    #[test]
    fn repair_is_idempotent() {
        let inputs = vec![
            "```json\n{'a': 1,}\n```",
            "\u{201C}hello\u{201D}",
            "{\"a\": 1,}",
            "plain text with no json",
        ];
        for raw in inputs {
            let once = repair(raw);
            let twice = repair(&once);
            assert_eq!(once, twice, "not idempotent for input: {raw}");
        }
    }

    #[test]
    fn repair_removes_trailing_commas() {
        let repaired = repair("{\"a\": [1, 2,], \"b\": 3,}");
        assert_eq!(repaired, "{\"a\": [1, 2], \"b\": 3}");
    }

    #[test]
    fn repair_swaps_single_quotes_only_when_no_double_quotes() {
        let repaired = repair("{'a': 1}");
        assert_eq!(repaired, "{\"a\": 1}");
        let untouched = repair("{\"a\": \"it's fine\"}");
        assert_eq!(untouched, "{\"a\": \"it's fine\"}");
    }

    fn sample_response(codes: &[&str]) -> ChatAdvisorResponse {
        ChatAdvisorResponse {
            recommendations: codes
                .iter()
                .enumerate()
                .map(|(i, c)| Recommendation {
                    course_code: (*c).to_string(),
                    title: "Title".to_string(),
                    rationale: "Because".to_string(),
                    priority: (i + 1) as u8,
                    next_action: NextActionKind::AddToPlan,
                    difficulty_warning: None,
                    source: None,
                })
                .collect(),
            constraints: vec![],
            next_actions: vec![],
            notes: None,
            provenance: vec![],
        }
    }

    #[test]
    fn sanitize_dedupes_normalizes_and_reassigns_priorities() {
        let response = sample_response(&["cs  1110", "CS 1110", "math 2210", "cs 2110", "cs 3110", "cs 4410"]);
        let sanitized = sanitize(response);
        assert_eq!(sanitized.recommendations.len(), 5);
        let codes: Vec<_> = sanitized.recommendations.iter().map(|r| r.course_code.clone()).collect();
        assert_eq!(codes, vec!["CS 1110", "MATH 2210", "CS 2110", "CS 3110", "CS 4410"]);
        let priorities: Vec<_> = sanitized.recommendations.iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn sanitize_truncates_notes() {
        let mut response = sample_response(&["CS 1110"]);
        response.notes = Some("x".repeat(2000));
        let sanitized = sanitize(response);
        assert_eq!(sanitized.notes.unwrap().chars().count(), MAX_NOTES_CHARS);
    }

    #[test]
    fn regex_fallback_extracts_up_to_three_codes() {
        let raw = "Consider CS 3110, MATH 2210, CS 4410, and CS 4820 next.";
        let recs = regex_fallback_recommendations(raw);
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0].course_code, "CS 3110");
    }

    #[test]
    fn decode_and_validate_round_trips_valid_json() {
        let raw = r#"{"recommendations":[{"course_code":"CS 3110","title":"Data Structures","rationale":"next","priority":1,"next_action":"add_to_plan"}],"constraints":[],"next_actions":[],"provenance":[]}"#;
        let decoded = decode_and_validate(raw).unwrap();
        assert_eq!(decoded.recommendations.len(), 1);
    }
}
