//! Conflict-aware scoring and beam search over section-bundle choices —
//! spec section 4.5. Pure functions of already-fetched `SectionBundle`
//! lists; no I/O.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use advisor_core::types::SectionBundle;
use serde::{Deserialize, Serialize};

const W_CONFLICT: i32 = 15;
const W_GAP: i32 = 5;
const W_EARLY: i32 = 5;
const W_FRIDAY: i32 = 8;
const BONUS_LIGHT_DAY: i32 = 5;
const GAP_MIN: u16 = 120;
const EARLY_MIN: u16 = 540;
const LIGHT_DAY_HOURS_MAX_MIN: u16 = 240;

#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulePrefs {
    pub dislikes_morning: bool,
    pub no_fri: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedSchedule {
    pub bundle_ids: Vec<String>,
    pub fit_score: u8,
    #[serde(default)]
    pub conflict_reason: Option<String>,
    pub total_gaps: u32,
    pub earliest_start: u16,
}

struct Assignment<'a> {
    course_code: &'a str,
    bundle: &'a SectionBundle,
}

fn score_assignment(assignment: &[Assignment], prefs: SchedulePrefs) -> RankedSchedule {
    let mut conflict_reason = None;
    let mut conflict_count = 0u32;
    for i in 0..assignment.len() {
        for j in (i + 1)..assignment.len() {
            for m1 in &assignment[i].bundle.meetings {
                for m2 in &assignment[j].bundle.meetings {
                    if m1.conflicts_with(m2) {
                        conflict_count += 1;
                        if conflict_reason.is_none() {
                            conflict_reason =
                                Some(format!("{}×{}", assignment[i].course_code, assignment[j].course_code));
                        }
                    }
                }
            }
        }
    }

    let mut by_day: HashMap<char, Vec<(u16, u16)>> = HashMap::new();
    let mut earliest_start = u16::MAX;
    let mut any_early = false;
    let mut any_friday = false;
    for a in assignment {
        for m in &a.bundle.meetings {
            earliest_start = earliest_start.min(m.start_min);
            if m.start_min < EARLY_MIN {
                any_early = true;
            }
            if m.days.contains(&'F') {
                any_friday = true;
            }
            for &d in &m.days {
                by_day.entry(d).or_default().push((m.start_min, m.end_min));
            }
        }
    }
    if earliest_start == u16::MAX {
        earliest_start = 0;
    }

    let mut total_gaps = 0u32;
    let mut every_day_light = true;
    for meetings in by_day.values_mut() {
        meetings.sort_unstable();
        let mut total_minutes: u32 = 0;
        for w in meetings.windows(2) {
            let gap = w[1].0.saturating_sub(w[0].1);
            if gap >= GAP_MIN {
                total_gaps += 1;
            }
        }
        for (start, end) in meetings.iter() {
            total_minutes += u32::from(end.saturating_sub(*start));
        }
        if total_minutes > u32::from(LIGHT_DAY_HOURS_MAX_MIN) {
            every_day_light = false;
        }
    }

    let mut score: i32 = 100;
    score -= W_CONFLICT * conflict_count as i32;
    score -= W_GAP * total_gaps as i32;
    if any_early && prefs.dislikes_morning {
        score -= W_EARLY;
    }
    if any_friday && prefs.no_fri {
        score -= W_FRIDAY;
    }
    if every_day_light && !by_day.is_empty() {
        score += BONUS_LIGHT_DAY;
    }
    let fit_score = score.clamp(0, 100) as u8;

    let mut bundle_ids: Vec<String> = assignment.iter().map(|a| a.bundle.bundle_id.clone()).collect();
    bundle_ids.sort();

    RankedSchedule {
        bundle_ids,
        fit_score,
        conflict_reason,
        total_gaps,
        earliest_start,
    }
}

/// Beam search over one candidate bundle per course, respecting
/// `beam_width`/`node_limit`/`deadline`. Returns every complete assignment
/// surviving the final beam, scored — callers rank/dedupe/truncate.
pub fn search(
    courses_in_order: &[(String, Vec<SectionBundle>)],
    prefs: SchedulePrefs,
    beam_width: usize,
    node_limit: usize,
    deadline: Duration,
) -> Vec<RankedSchedule> {
    if courses_in_order.iter().any(|(_, bundles)| bundles.is_empty()) {
        return Vec::new();
    }

    let started = Instant::now();
    let mut beam: Vec<Vec<(usize, usize)>> = vec![Vec::new()];
    let mut node_count = 0usize;

    'outer: for (course_idx, (_, bundles)) in courses_in_order.iter().enumerate() {
        if started.elapsed() > deadline {
            break 'outer;
        }
        let mut next_beam: Vec<Vec<(usize, usize)>> = Vec::new();
        for state in &beam {
            for (bundle_idx, _) in bundles.iter().enumerate() {
                node_count += 1;
                if node_count > node_limit {
                    break 'outer;
                }
                let mut extended = state.clone();
                extended.push((course_idx, bundle_idx));
                next_beam.push(extended);
            }
        }

        next_beam.sort_by_cached_key(|state| {
            let assignment: Vec<Assignment> = state
                .iter()
                .map(|&(ci, bi)| Assignment {
                    course_code: &courses_in_order[ci].0,
                    bundle: &courses_in_order[ci].1[bi],
                })
                .collect();
            score_assignment(&assignment, prefs).fit_score
        });
        next_beam.reverse();
        next_beam.truncate(beam_width);
        beam = next_beam;
    }

    let full_len = courses_in_order.len();
    beam.into_iter()
        .filter(|state| state.len() == full_len)
        .map(|state| {
            let assignment: Vec<Assignment> = state
                .iter()
                .map(|&(ci, bi)| Assignment {
                    course_code: &courses_in_order[ci].0,
                    bundle: &courses_in_order[ci].1[bi],
                })
                .collect();
            score_assignment(&assignment, prefs)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use advisor_core::types::SectionMeeting;

    fn bundle(id: &str, code: &str, days: Vec<char>, start: u16, end: u16) -> SectionBundle {
        SectionBundle {
            bundle_id: id.to_string(),
            course_code: code.to_string(),
            meetings: vec![SectionMeeting { days, start_min: start, end_min: end }],
        }
    }

    #[test]
    fn forced_conflict_scores_ninety_with_reason() {
        let courses = vec![
            ("CS 1110".to_string(), vec![bundle("b1", "CS 1110", vec!['M'], 600, 660)]),
            ("MATH 1910".to_string(), vec![bundle("b2", "MATH 1910", vec!['M'], 630, 690)]),
        ];
        let results = search(&courses, SchedulePrefs::default(), 1024, 50_000, Duration::from_millis(300));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].fit_score, 90);
        assert!(results[0].conflict_reason.as_ref().unwrap().contains("CS 1110"));
        assert!(results[0].conflict_reason.as_ref().unwrap().contains("MATH 1910"));
    }

    #[test]
    fn zero_candidates_for_any_course_yields_empty_result() {
        let courses = vec![("CS 1110".to_string(), Vec::new())];
        let results = search(&courses, SchedulePrefs::default(), 1024, 50_000, Duration::from_millis(300));
        assert!(results.is_empty());
    }

    #[test]
    fn disjoint_schedule_earns_light_day_bonus() {
        let courses = vec![("CS 1110".to_string(), vec![bundle("b1", "CS 1110", vec!['M'], 600, 660)])];
        let results = search(&courses, SchedulePrefs::default(), 1024, 50_000, Duration::from_millis(300));
        assert_eq!(results[0].fit_score, 100);
    }
}
