//! Core data model shared across the advisor workspace.
//!
//! Types mirror spec section 3 verbatim; field names are chosen for
//! `serde_json` wire compatibility with the HTTP surface in
//! `advisor-server`.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

fn course_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Z]{2,4} [0-9]{3,4}[A-Z]?$").expect("static course code pattern")
    })
}

/// A canonical `SUBJ NNNN` course code.
pub type CourseCode = String;

/// Normalize a raw course code string to canonical `SUBJ NNNN` form,
/// collapsing internal whitespace and upper-casing. Idempotent:
/// `normalize_course_code(normalize_course_code(c)) == normalize_course_code(c)`.
#[must_use]
pub fn normalize_course_code(raw: &str) -> String {
    let collapsed: String = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.to_uppercase()
}

/// Whether a normalized code matches the canonical pattern.
#[must_use]
pub fn is_valid_course_code(code: &str) -> bool {
    course_code_re().is_match(code)
}

/// A single scheduling preference/blocked window for a student.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeWindow {
    pub days: Vec<char>,
    pub start_min: u16,
    pub end_min: u16,
}

/// `StudentProfile` — spec section 3.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudentProfile {
    pub id: String,
    #[serde(default)]
    pub major: Option<String>,
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub minor: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub completed: Vec<CourseCode>,
    #[serde(default)]
    pub current: Vec<CourseCode>,
    #[serde(default)]
    pub planned: Vec<CourseCode>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub gpa: Option<f32>,
    #[serde(default)]
    pub gpa_goal: Option<f32>,
    #[serde(default)]
    pub risk_tolerance: Option<String>,
    #[serde(default)]
    pub blocked_times: Vec<TimeWindow>,
    #[serde(default)]
    pub preferences: HashMap<String, serde_json::Value>,
}

impl StudentProfile {
    /// A minimal profile used when no conversation or incoming profile
    /// exists yet.
    #[must_use]
    pub fn default_for(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            major: None,
            track: None,
            minor: None,
            year: None,
            completed: Vec::new(),
            current: Vec::new(),
            planned: Vec::new(),
            interests: Vec::new(),
            gpa: None,
            gpa_goal: None,
            risk_tolerance: None,
            blocked_times: Vec::new(),
            preferences: HashMap::new(),
        }
    }

    /// Normalize every course code list in place.
    pub fn normalize_course_codes(&mut self) {
        for list in [
            &mut self.completed,
            &mut self.current,
            &mut self.planned,
        ] {
            for code in list.iter_mut() {
                *code = normalize_course_code(code);
            }
        }
    }
}

/// A single turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
    pub ts: DateTime<Utc>,
    #[serde(default)]
    pub tokens: Option<u32>,
}

/// Tagged role of a conversation message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// Maximum number of messages retained per conversation; oldest evicted.
pub const MAX_CONVERSATION_MESSAGES: usize = 20;

/// `ConversationState` — spec section 3.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationState {
    pub id: String,
    pub profile: StudentProfile,
    pub messages: Vec<ConversationMessage>,
    pub active_recommendations: Vec<Recommendation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    #[must_use]
    pub fn new(id: impl Into<String>, profile: StudentProfile) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            profile,
            messages: Vec::new(),
            active_recommendations: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message, evicting the oldest once the bound is exceeded.
    pub fn push_message(&mut self, message: ConversationMessage) {
        self.messages.push(message);
        while self.messages.len() > MAX_CONVERSATION_MESSAGES {
            self.messages.remove(0);
        }
        self.updated_at = Utc::now();
    }

    /// The last up-to-`n` messages, oldest first.
    #[must_use]
    pub fn tail(&self, n: usize) -> &[ConversationMessage] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }
}

/// Kind of a prerequisite edge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    Prerequisite,
    PrerequisiteOr,
    Corequisite,
    Recommended,
    Unsure,
}

/// `PrerequisiteEdge` — spec section 3.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrerequisiteEdge {
    pub from: CourseCode,
    pub to: CourseCode,
    pub kind: EdgeKind,
    pub confidence: f32,
    pub weight: f32,
}

/// Per-letter-grade histogram percentages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GradeHistogram {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub f: f32,
}

impl GradeHistogram {
    #[must_use]
    pub fn sum(&self) -> f32 {
        self.a + self.b + self.c + self.d + self.f
    }

    /// `pass_rate = sum(A..D)%/100`.
    #[must_use]
    pub fn pass_rate(&self) -> f32 {
        (self.a + self.b + self.c + self.d) / 100.0
    }
}

/// `CourseGradesStats` — spec section 3.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CourseGradesStats {
    pub course_code: CourseCode,
    pub terms: Vec<String>,
    pub mean_gpa: f32,
    pub stdev_gpa: f32,
    pub pass_rate: f32,
    pub histogram: GradeHistogram,
    pub enrollment_count: u32,
    pub difficulty_percentile: f32,
    pub provenance: ProvenanceTag,
}

/// A single meeting pattern within a section bundle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SectionMeeting {
    pub days: Vec<char>,
    pub start_min: u16,
    pub end_min: u16,
}

impl SectionMeeting {
    /// Whether two meetings share a day and overlap in time.
    #[must_use]
    pub fn conflicts_with(&self, other: &SectionMeeting) -> bool {
        let shares_day = self.days.iter().any(|d| other.days.contains(d));
        shares_day && self.start_min < other.end_min && other.start_min < self.end_min
    }
}

/// One registrable bundle of meetings for a course.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SectionBundle {
    pub bundle_id: String,
    pub course_code: CourseCode,
    pub meetings: Vec<SectionMeeting>,
}

/// Kind of degree requirement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequirementKind {
    CountAtLeast,
    CreditsAtLeast,
    AllOfSet,
}

/// A course that can satisfy a requirement, with credit weight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Satisfier {
    pub code: CourseCode,
    pub credits: f32,
}

/// Default credit weight assumed for a course absent other data.
pub const DEFAULT_COURSE_CREDITS: f32 = 3.0;

/// `RequirementSpec` — spec section 3.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequirementSpec {
    pub id: String,
    pub summary: String,
    pub kind: RequirementKind,
    pub min_count: u32,
    pub min_credits: f32,
    pub satisfiers: Vec<Satisfier>,
}

/// `UnmetReq` — spec section 3.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnmetReq {
    pub id: String,
    pub summary: String,
    pub kind: RequirementKind,
    pub count_gap: u32,
    pub credit_gap: f32,
    pub courses_to_satisfy: Vec<CourseCode>,
}

/// `ProvenanceTag` — spec section 3 / 4.4.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProvenanceTag {
    pub source: String,
    pub entity_id: String,
    #[serde(default)]
    pub tenant: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub data_version: Option<String>,
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub ttl_seconds: u64,
    #[serde(default)]
    pub soft_ttl_seconds: Option<u64>,
    #[serde(default)]
    pub meta: HashMap<String, serde_json::Value>,
}

impl ProvenanceTag {
    /// Hard stale: tag missing (handled by caller) or `now >= expires_at`.
    #[must_use]
    pub fn is_hard_stale(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(exp) if now >= exp)
    }

    /// Soft stale: `now >= fetched_at + soft_ttl_seconds` when configured.
    #[must_use]
    pub fn is_soft_stale(&self, now: DateTime<Utc>) -> bool {
        match self.soft_ttl_seconds {
            Some(soft) => now >= self.fetched_at + chrono::Duration::seconds(soft as i64),
            None => false,
        }
    }
}

/// Next action a recommendation can suggest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NextActionKind {
    AddToPlan,
    CheckPrereqs,
    ConsiderAlternative,
    WaitlistMonitor,
}

/// One recommendation entry within a `ChatAdvisorResponse`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub course_code: CourseCode,
    pub title: String,
    pub rationale: String,
    pub priority: u8,
    pub next_action: NextActionKind,
    #[serde(default)]
    pub difficulty_warning: Option<String>,
    #[serde(default)]
    pub source: Option<serde_json::Value>,
}

/// A suggested follow-up action in the enforced envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NextAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub course_code: Option<CourseCode>,
}

/// `ChatAdvisorResponse` — the enforced envelope, spec section 3 / 4.9.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatAdvisorResponse {
    pub recommendations: Vec<Recommendation>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub next_actions: Vec<NextAction>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub provenance: Vec<String>,
}

/// Kind of context contributed to a chat prompt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    VectorSearch,
    GraphAnalysis,
    ProfessorIntel,
    DifficultyData,
    GradesData,
    EnrollmentData,
    ScheduleFit,
    DegreeProgress,
    ConflictDetection,
}

impl ContextKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextKind::VectorSearch => "vector_search",
            ContextKind::GraphAnalysis => "graph_analysis",
            ContextKind::ProfessorIntel => "professor_intel",
            ContextKind::DifficultyData => "difficulty_data",
            ContextKind::GradesData => "grades_data",
            ContextKind::EnrollmentData => "enrollment_data",
            ContextKind::ScheduleFit => "schedule_fit",
            ContextKind::DegreeProgress => "degree_progress",
            ContextKind::ConflictDetection => "conflict_detection",
        }
    }
}

/// `ContextSource` — spec section 3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSource {
    pub kind: ContextKind,
    pub data: serde_json::Value,
    pub confidence: f32,
    pub token_count: u32,
    pub processing_time_ms: u64,
    pub cache_hit: bool,
    pub version: u64,
    pub source_tag: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_idempotent() {
        let raw = "  cs   1110 ";
        let once = normalize_course_code(raw);
        let twice = normalize_course_code(&once);
        assert_eq!(once, twice);
        assert_eq!(once, "CS 1110");
    }

    #[test]
    fn valid_course_code_pattern() {
        assert!(is_valid_course_code("CS 1110"));
        assert!(is_valid_course_code("MATH 2210"));
        assert!(!is_valid_course_code("cs 1110"));
        assert!(!is_valid_course_code("CS1110"));
    }

    #[test]
    fn conversation_evicts_oldest() {
        let mut state = ConversationState::new("c1", StudentProfile::default_for("s1"));
        for i in 0..25 {
            state.push_message(ConversationMessage {
                role: MessageRole::User,
                content: format!("msg {i}"),
                ts: Utc::now(),
                tokens: None,
            });
        }
        assert_eq!(state.messages.len(), MAX_CONVERSATION_MESSAGES);
        assert_eq!(state.messages.first().unwrap().content, "msg 5");
    }

    #[test]
    fn meeting_conflict_detection() {
        let a = SectionMeeting {
            days: vec!['M'],
            start_min: 600,
            end_min: 660,
        };
        let b = SectionMeeting {
            days: vec!['M'],
            start_min: 630,
            end_min: 690,
        };
        let c = SectionMeeting {
            days: vec!['T'],
            start_min: 600,
            end_min: 660,
        };
        assert!(a.conflicts_with(&b));
        assert!(!a.conflicts_with(&c));
    }

    #[test]
    fn grade_histogram_pass_rate() {
        let h = GradeHistogram {
            a: 30.0,
            b: 30.0,
            c: 20.0,
            d: 10.0,
            f: 10.0,
        };
        assert!((h.sum() - 100.0).abs() < 5.0);
        assert!((h.pass_rate() - 0.9).abs() < 1e-6);
    }
}
