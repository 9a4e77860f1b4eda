//! `TokenBudgetManager` — spec section 4.7.

use std::collections::HashMap;

use crate::types::ContextKind;

/// `tokens(s) ≈ max(1, len(s)/4)`.
#[must_use]
pub fn estimate_tokens(s: &str) -> u32 {
    (s.len() as u32 / 4).max(1)
}

/// A section of the assembled prompt, keyed by a stable name (either a
/// `ContextKind` or one of the two fixed sections below).
#[derive(Debug, Clone)]
pub struct PromptSection {
    pub name: String,
    pub text: String,
}

const STUDENT_PROFILE: &str = "student_profile";
const CONVERSATION_HISTORY: &str = "conversation_history";
const SYSTEM_TEMPLATE: &str = "system_template";

fn base_budget(name: &str) -> Option<u32> {
    match name {
        STUDENT_PROFILE => Some(200),
        "vector_search" => Some(150),
        "graph_analysis" => Some(60),
        "professor_intel" => Some(120),
        "difficulty_data" => Some(80),
        "enrollment_data" => Some(80),
        CONVERSATION_HISTORY => Some(300),
        SYSTEM_TEMPLATE => Some(150),
        _ => None,
    }
}

fn priority_weight(name: &str) -> f32 {
    match name {
        STUDENT_PROFILE => 1.0,
        "vector_search" => 0.8,
        "graph_analysis" => 0.9,
        "professor_intel" => 0.85,
        "difficulty_data" => 0.7,
        "enrollment_data" => 0.6,
        _ => 1.0,
    }
}

fn conversation_length_factor(message_count: usize) -> f32 {
    if message_count <= 5 {
        1.0
    } else if message_count <= 10 {
        0.85
    } else {
        0.7
    }
}

/// Priority order sections are allocated in, highest first.
const ALLOCATION_ORDER: &[&str] = &[
    STUDENT_PROFILE,
    "graph_analysis",
    "professor_intel",
    "vector_search",
    CONVERSATION_HISTORY,
    "difficulty_data",
    "enrollment_data",
    SYSTEM_TEMPLATE,
];

/// Clamps sections to per-section caps, scales by conversation length, and
/// enforces a hard total ceiling.
pub struct TokenBudgetManager {
    total_ceiling: u32,
}

impl TokenBudgetManager {
    #[must_use]
    pub fn new(total_ceiling: u32) -> Self {
        Self { total_ceiling }
    }

    /// Adjusted per-section budget in tokens after priority weighting and
    /// conversation-length scaling.
    #[must_use]
    pub fn adjusted_budget(&self, name: &str, message_count: usize) -> Option<u32> {
        let base = base_budget(name)?;
        let weight = priority_weight(name);
        let factor = conversation_length_factor(message_count);
        Some(((base as f32) * weight * factor).round().max(1.0) as u32)
    }

    /// Allocate sections in priority order until the total ceiling is
    /// reached, clamping each section's text by character count (4 chars
    /// per token) with a trailing ellipsis, then clamp the whole assembled
    /// prompt as a safety net.
    pub fn assemble(&self, sections: HashMap<String, String>, message_count: usize) -> String {
        let mut remaining = self.total_ceiling;
        let mut ordered_names: Vec<&str> = ALLOCATION_ORDER
            .iter()
            .copied()
            .filter(|n| sections.contains_key(*n))
            .collect();
        for name in sections.keys() {
            if !ordered_names.contains(&name.as_str()) {
                ordered_names.push(name.as_str());
            }
        }

        let mut parts = Vec::new();
        for name in ordered_names {
            if remaining == 0 {
                break;
            }
            let Some(text) = sections.get(name) else {
                continue;
            };
            let Some(mut budget) = self.adjusted_budget(name, message_count) else {
                continue;
            };
            budget = budget.min(remaining);
            if budget == 0 {
                continue;
            }
            let clamped = clamp_to_tokens(text, budget);
            let used = estimate_tokens(&clamped);
            remaining = remaining.saturating_sub(used);
            parts.push(format!("[{name}]\n{clamped}"));
        }

        let assembled = parts.join("\n\n");
        clamp_to_tokens(&assembled, self.total_ceiling)
    }
}

/// Truncate `text` by character count to fit `budget` tokens (4 chars per
/// token), appending an ellipsis when truncated.
#[must_use]
pub fn clamp_to_tokens(text: &str, budget: u32) -> String {
    let max_chars = (budget as usize) * 4;
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{truncated}...")
}

/// Render a provider's context kind plus its served version as a
/// `source:v<version>` attribution tag used in the prompt's sources list.
#[must_use]
pub fn source_tag(kind: ContextKind, version: u64) -> String {
    format!("{}:v{}", kind.as_str(), version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimate_floor_is_one() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("ab"), 1);
        assert_eq!(estimate_tokens(&"a".repeat(40)), 10);
    }

    #[test]
    fn conversation_length_scales_budget() {
        let mgr = TokenBudgetManager::new(1200);
        let short = mgr.adjusted_budget("student_profile", 3).unwrap();
        let long = mgr.adjusted_budget("student_profile", 15).unwrap();
        assert!(long < short);
    }

    #[test]
    fn assemble_respects_total_ceiling() {
        let mgr = TokenBudgetManager::new(50);
        let mut sections = HashMap::new();
        sections.insert("student_profile".to_string(), "x".repeat(2000));
        sections.insert("vector_search".to_string(), "y".repeat(2000));
        let assembled = mgr.assemble(sections, 3);
        assert!(estimate_tokens(&assembled) <= 50);
    }

    #[test]
    fn clamp_adds_ellipsis_only_when_truncated() {
        let short = clamp_to_tokens("hello", 10);
        assert_eq!(short, "hello");
        let long = clamp_to_tokens(&"a".repeat(100), 5);
        assert!(long.ends_with("..."));
    }
}
