//! `ScheduleFitContext` — spec section 4.2. Extracts candidate courses
//! (falling back to `profile.planned`) and ranks schedules via section 4.5.

use advisor_core::context_provider::{extract_course_codes, fallback_from_profile, ProviderOutput};
use advisor_core::kv::KvStore;
use advisor_core::types::{ContextKind, StudentProfile};
use advisor_core::ContextProvider;
use advisor_schedule::{SchedulePrefs, ScheduleFitService};
use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

const MAX_COURSES: usize = 4;
const RESULT_LIMIT: usize = 3;

pub struct ScheduleFitContext<K: KvStore> {
    service: ScheduleFitService<K>,
    term: String,
}

impl<K: KvStore> ScheduleFitContext<K> {
    #[must_use]
    pub fn new(service: ScheduleFitService<K>, term: String) -> Self {
        Self { service, term }
    }
}

#[async_trait]
impl<K: KvStore + 'static> ContextProvider for ScheduleFitContext<K> {
    fn kind(&self) -> ContextKind {
        ContextKind::ScheduleFit
    }

    async fn fetch(&self, message: &str, profile: &StudentProfile) -> Option<ProviderOutput> {
        let mut codes = extract_course_codes(message, MAX_COURSES);
        if codes.is_empty() {
            codes = fallback_from_profile(profile, MAX_COURSES);
        }
        if codes.len() < 2 {
            return None;
        }

        let prefs = SchedulePrefs {
            dislikes_morning: profile.preferences.get("dislikes_morning").and_then(|v| v.as_bool()).unwrap_or(false),
            no_fri: profile.preferences.get("no_fri").and_then(|v| v.as_bool()).unwrap_or(false),
        };

        match self.service.rank_schedules(&self.term, &codes, prefs, RESULT_LIMIT).await {
            Ok(schedules) => {
                if schedules.is_empty() {
                    return None;
                }
                Some(ProviderOutput {
                    kind: self.kind(),
                    data: json!({ "course_codes": codes, "schedules": schedules }),
                    confidence: 0.8,
                    version: 1,
                    cache_hit: false,
                })
            }
            Err(e) => {
                warn!(error = %e, "schedule fit context: ranking failed");
                None
            }
        }
    }
}
