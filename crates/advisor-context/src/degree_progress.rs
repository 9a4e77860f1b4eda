//! `DegreeProgressContext` — spec section 4.2. Summarizes up to 5 unmet
//! requirements for the student's declared major into a short text block.

use advisor_core::context_provider::ProviderOutput;
use advisor_core::kv::KvStore;
use advisor_core::token_budget::clamp_to_tokens;
use advisor_core::types::{ContextKind, StudentProfile};
use advisor_core::ContextProvider;
use advisor_degree::DegreeProgressEvaluator;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::warn;

const SUMMARY_TOKEN_BUDGET: u32 = 150;
const MAX_UNMET_SHOWN: usize = 5;

pub struct DegreeProgressContext<K: KvStore> {
    evaluator: DegreeProgressEvaluator<K>,
}

impl<K: KvStore> DegreeProgressContext<K> {
    #[must_use]
    pub fn new(evaluator: DegreeProgressEvaluator<K>) -> Self {
        Self { evaluator }
    }
}

#[async_trait]
impl<K: KvStore + 'static> ContextProvider for DegreeProgressContext<K> {
    fn kind(&self) -> ContextKind {
        ContextKind::DegreeProgress
    }

    async fn fetch(&self, _message: &str, profile: &StudentProfile) -> Option<ProviderOutput> {
        let major = profile.major.as_ref()?;

        match self.evaluator.unmet_requirements(&profile.id, major, &profile.completed).await {
            Ok(unmet) => {
                let shown: Vec<_> = unmet.iter().take(MAX_UNMET_SHOWN).collect();
                if shown.is_empty() {
                    return None;
                }
                let summary_lines: Vec<String> = shown
                    .iter()
                    .map(|r| format!("{}: {} short ({} courses, {} credits)", r.summary, r.id, r.count_gap, r.credit_gap))
                    .collect();
                let summary_text = clamp_to_tokens(&summary_lines.join("; "), SUMMARY_TOKEN_BUDGET);

                Some(ProviderOutput {
                    kind: self.kind(),
                    data: json!({
                        "unmet": shown,
                        "summary_text": summary_text,
                        "provenance": { "source": "graph", "as_of": Utc::now() },
                    }),
                    confidence: 0.9,
                    version: 1,
                    cache_hit: false,
                })
            }
            Err(e) => {
                warn!(error = %e, major = %major, "degree progress context: evaluation failed");
                None
            }
        }
    }
}
