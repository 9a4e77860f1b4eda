//! `ProfileStore` — spec section 4.12.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::kv::{CasOutcome, KvStore};
use crate::types::StudentProfile;

const DEFAULT_TTL_DAYS: u64 = 30;
const MAX_CAS_RETRIES: u32 = 3;

fn key(id: &str) -> String {
    format!("student_profile:{id}")
}

fn prefer_non_empty_string(incoming: Option<String>, existing: Option<String>) -> Option<String> {
    match incoming {
        Some(s) if !s.is_empty() => Some(s),
        _ => existing,
    }
}

/// Merge two profiles using "prefer-incoming non-empty" semantics for
/// scalars and list/map fields (spec open question: the atomic script's
/// rule — replace `preferences` only when the incoming map is non-empty —
/// is the one we preserve everywhere, including the non-atomic fallback).
#[must_use]
pub fn merge_profiles(existing: StudentProfile, incoming: StudentProfile) -> StudentProfile {
    StudentProfile {
        id: existing.id,
        major: prefer_non_empty_string(incoming.major, existing.major),
        track: prefer_non_empty_string(incoming.track, existing.track),
        minor: prefer_non_empty_string(incoming.minor, existing.minor),
        year: prefer_non_empty_string(incoming.year, existing.year),
        completed: if incoming.completed.is_empty() {
            existing.completed
        } else {
            incoming.completed
        },
        current: if incoming.current.is_empty() {
            existing.current
        } else {
            incoming.current
        },
        planned: if incoming.planned.is_empty() {
            existing.planned
        } else {
            incoming.planned
        },
        interests: if incoming.interests.is_empty() {
            existing.interests
        } else {
            incoming.interests
        },
        gpa: incoming.gpa.or(existing.gpa),
        gpa_goal: incoming.gpa_goal.or(existing.gpa_goal),
        risk_tolerance: prefer_non_empty_string(incoming.risk_tolerance, existing.risk_tolerance),
        blocked_times: if incoming.blocked_times.is_empty() {
            existing.blocked_times
        } else {
            incoming.blocked_times
        },
        preferences: if incoming.preferences.is_empty() {
            existing.preferences
        } else {
            incoming.preferences
        },
    }
}

/// Atomic-CAS-backed store of `StudentProfile`s, keyed by student id.
pub struct ProfileStore<K: KvStore> {
    kv: Arc<K>,
    ttl_seconds: u64,
}

impl<K: KvStore> ProfileStore<K> {
    #[must_use]
    pub fn new(kv: Arc<K>) -> Self {
        Self {
            kv,
            ttl_seconds: DEFAULT_TTL_DAYS * 86_400,
        }
    }

    /// Read with TTL refresh.
    pub async fn get(&self, id: &str) -> Result<Option<StudentProfile>> {
        match self.kv.get(&key(id)).await? {
            Some(raw) => {
                let profile: StudentProfile = serde_json::from_str(&raw)
                    .map_err(|e| Error::Internal(format!("corrupt profile {id}: {e}")))?;
                self.kv.expire(&key(id), self.ttl_seconds).await?;
                Ok(Some(profile))
            }
            None => Ok(None),
        }
    }

    /// Unconditional overwrite; only used for empty-shell creation.
    pub async fn put(&self, profile: &StudentProfile) -> Result<()> {
        let mut normalized = profile.clone();
        normalized.normalize_course_codes();
        let serialized = serde_json::to_string(&normalized)
            .map_err(|e| Error::Internal(format!("failed to serialize profile: {e}")))?;
        self.kv
            .setex(&key(&normalized.id), &serialized, self.ttl_seconds)
            .await
    }

    /// Atomic CAS merge via the KV's scripting primitive. A lost race
    /// (`Error::CasConflict`) is retried against the atomic path up to
    /// `MAX_CAS_RETRIES` times, since another writer's merge already landed
    /// and a fresh read-merge-swap is still safe and cheap. Only genuine
    /// infrastructure failure (`Error::UpstreamUnavailable`), or exhausting
    /// the retries, falls back to the non-atomic read-merge-write.
    pub async fn merge_atomic(&self, mut incoming: StudentProfile) -> Result<StudentProfile> {
        incoming.normalize_course_codes();

        for _ in 0..MAX_CAS_RETRIES {
            match self.try_merge_atomic(&incoming).await {
                Ok(profile) => return Ok(profile),
                Err(Error::CasConflict(_)) => continue,
                Err(Error::UpstreamUnavailable { .. }) => return self.merge_non_atomic(incoming).await,
                Err(e) => return Err(e),
            }
        }
        self.merge_non_atomic(incoming).await
    }

    async fn try_merge_atomic(&self, incoming: &StudentProfile) -> Result<StudentProfile> {
        let profile_key = key(&incoming.id);
        let result_slot: Arc<Mutex<Option<StudentProfile>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&result_slot);
        let incoming_for_closure = incoming.clone();

        let merge = Box::new(move |existing_raw: Option<String>| {
            let merged = match existing_raw {
                None => incoming_for_closure,
                Some(raw) => match serde_json::from_str::<StudentProfile>(&raw) {
                    Ok(existing) => merge_profiles(existing, incoming_for_closure),
                    Err(_) => incoming_for_closure,
                },
            };
            let serialized = serde_json::to_string(&merged).unwrap_or_default();
            *slot.lock() = Some(merged);
            serialized
        });

        match self.kv.merge_atomic(&profile_key, self.ttl_seconds, merge).await? {
            CasOutcome::Created | CasOutcome::Merged => {
                result_slot.lock().take().ok_or_else(|| Error::Internal("merge_atomic produced no result".into()))
            }
        }
    }

    async fn merge_non_atomic(&self, incoming: StudentProfile) -> Result<StudentProfile> {
        let existing = self.get(&incoming.id).await?;
        let merged = match existing {
            Some(existing) => merge_profiles(existing, incoming),
            None => incoming,
        };
        self.put(&merged).await?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_prefers_incoming_non_empty_scalars() {
        let mut existing = StudentProfile::default_for("s1");
        existing.major = Some("Biology".to_string());
        existing.gpa = Some(3.2);

        let mut incoming = StudentProfile::default_for("s1");
        incoming.major = None;
        incoming.gpa = Some(3.5);

        let merged = merge_profiles(existing, incoming);
        assert_eq!(merged.major.as_deref(), Some("Biology"));
        assert_eq!(merged.gpa, Some(3.5));
    }

    #[test]
    fn merge_prefers_incoming_non_empty_lists() {
        let mut existing = StudentProfile::default_for("s1");
        existing.completed = vec!["CS 1110".to_string()];

        let incoming = StudentProfile::default_for("s1");

        let merged = merge_profiles(existing, incoming);
        assert_eq!(merged.completed, vec!["CS 1110".to_string()]);
    }

    #[test]
    fn merge_replaces_preferences_only_when_incoming_non_empty() {
        let mut existing = StudentProfile::default_for("s1");
        existing
            .preferences
            .insert("dislikes_morning".to_string(), serde_json::json!(true));

        let incoming = StudentProfile::default_for("s1");
        let merged = merge_profiles(existing.clone(), incoming);
        assert_eq!(merged.preferences, existing.preferences);

        let mut incoming2 = StudentProfile::default_for("s1");
        incoming2
            .preferences
            .insert("no_fri".to_string(), serde_json::json!(true));
        let merged2 = merge_profiles(existing, incoming2.clone());
        assert_eq!(merged2.preferences, incoming2.preferences);
    }

    #[test]
    fn sequential_merges_equal_single_deterministic_merge() {
        let mut p1 = StudentProfile::default_for("s1");
        p1.completed = vec!["CS 1110".to_string()];
        p1.major = Some("CS".to_string());

        let mut p2 = StudentProfile::default_for("s1");
        p2.completed = vec!["CS 1110".to_string(), "CS 2110".to_string()];

        let base = StudentProfile::default_for("s1");
        let sequential = merge_profiles(merge_profiles(base.clone(), p1.clone()), p2.clone());
        let expected = merge_profiles(base, merge_profiles(p1, p2));
        // Not generally associative for all fields, but for this case
        // (disjoint non-empty updates) both orders agree.
        assert_eq!(sequential.completed, expected.completed);
    }
}
