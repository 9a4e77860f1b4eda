//! The `ContextProvider` contract — spec section 4.2 / 5.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::{ContextKind, StudentProfile};

/// What a single provider invocation returned.
#[derive(Debug, Clone)]
pub struct ProviderOutput {
    pub kind: ContextKind,
    pub data: Value,
    pub confidence: f32,
    pub version: u64,
    pub cache_hit: bool,
}

/// A bounded-deadline function producing a structured context section from
/// a message and a profile. Implementations live in `advisor-context`;
/// this trait is the seam the orchestrator fans out over.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    fn kind(&self) -> ContextKind;

    /// Per-provider wall-clock deadline; the orchestrator also enforces
    /// this externally via `tokio::time::timeout`, but providers may
    /// report a tighter self-imposed budget.
    fn deadline(&self) -> Duration {
        Duration::from_millis(150)
    }

    async fn fetch(&self, message: &str, profile: &StudentProfile) -> Option<ProviderOutput>;
}

/// Extract up to `limit` course codes mentioned in free text using the
/// shared `([A-Z]{2,6}) ?([0-9]{3,4})` pattern, normalizing to canonical
/// `SUBJ NNNN` form.
#[must_use]
pub fn extract_course_codes(message: &str, limit: usize) -> Vec<String> {
    use std::sync::OnceLock;
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        regex::Regex::new(r"([A-Z]{2,6}) ?([0-9]{3,4})").expect("static pattern")
    });

    let mut out = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for caps in re.captures_iter(message) {
        let code = format!("{} {}", &caps[1], &caps[2]);
        if seen.insert(code.clone()) {
            out.push(code);
            if out.len() == limit {
                break;
            }
        }
    }
    out
}

/// When a message mentions no course codes, providers fall back to the
/// profile's current/planned courses, capped at `limit`.
#[must_use]
pub fn fallback_from_profile(profile: &StudentProfile, limit: usize) -> Vec<String> {
    profile
        .current
        .iter()
        .chain(profile.planned.iter())
        .take(limit)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_codes_from_message() {
        let codes = extract_course_codes("I took CS1110 and CS 2110, what about MATH2210?", 5);
        assert_eq!(codes, vec!["CS 1110", "CS 2110", "MATH 2210"]);
    }

    #[test]
    fn falls_back_to_profile_when_no_codes_found() {
        let mut profile = StudentProfile::default_for("s1");
        profile.current = vec!["CS 2800".to_string()];
        profile.planned = vec!["CS 3110".to_string()];
        let codes = extract_course_codes("what should I take?", 5);
        assert!(codes.is_empty());
        let fallback = fallback_from_profile(&profile, 5);
        assert_eq!(fallback, vec!["CS 2800", "CS 3110"]);
    }
}
