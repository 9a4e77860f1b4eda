//! Pure evaluation of `RequirementSpec` against a completed-course set —
//! spec section 4.6. No I/O; `service.rs` wraps this with caching.

use std::collections::HashSet;

use advisor_core::types::{RequirementKind, RequirementSpec, UnmetReq};

/// Evaluate every spec in `specs` against `have`, returning only the unmet
/// ones ordered `(-credit_gap, -count_gap, id)`.
pub fn evaluate(specs: &[RequirementSpec], have: &HashSet<String>) -> Vec<UnmetReq> {
    let mut unmet: Vec<UnmetReq> = specs.iter().filter_map(|spec| evaluate_one(spec, have)).collect();

    unmet.sort_by(|a, b| {
        b.credit_gap
            .partial_cmp(&a.credit_gap)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.count_gap.cmp(&a.count_gap))
            .then(a.id.cmp(&b.id))
    });
    unmet
}

fn evaluate_one(spec: &RequirementSpec, have: &HashSet<String>) -> Option<UnmetReq> {
    // An unknown-kind spec with no satisfiers to evaluate against falls
    // back to a minimal count-at-least-one requirement.
    let effective_kind = if spec.satisfiers.is_empty() { RequirementKind::CountAtLeast } else { spec.kind };

    match effective_kind {
        RequirementKind::AllOfSet => evaluate_all_of_set(spec, have),
        RequirementKind::CountAtLeast => evaluate_count_at_least(spec, have),
        RequirementKind::CreditsAtLeast => evaluate_credits_at_least(spec, have),
    }
}

fn evaluate_all_of_set(spec: &RequirementSpec, have: &HashSet<String>) -> Option<UnmetReq> {
    let missing: Vec<String> = spec.satisfiers.iter().map(|s| s.code.clone()).filter(|c| !have.contains(c)).collect();
    if missing.is_empty() {
        return None;
    }
    Some(UnmetReq {
        id: spec.id.clone(),
        summary: spec.summary.clone(),
        kind: spec.kind,
        count_gap: missing.len() as u32,
        credit_gap: 0.0,
        courses_to_satisfy: missing.into_iter().take(5).collect(),
    })
}

fn evaluate_count_at_least(spec: &RequirementSpec, have: &HashSet<String>) -> Option<UnmetReq> {
    let min_count = if spec.min_count == 0 { 1 } else { spec.min_count };
    let satisfied = spec.satisfiers.iter().filter(|s| have.contains(&s.code)).count() as u32;
    let count_gap = min_count.saturating_sub(satisfied);
    if count_gap == 0 {
        return None;
    }
    let take_n = (count_gap as usize * 2).max(1);
    let courses_to_satisfy: Vec<String> =
        spec.satisfiers.iter().filter(|s| !have.contains(&s.code)).map(|s| s.code.clone()).take(take_n).collect();
    Some(UnmetReq {
        id: spec.id.clone(),
        summary: spec.summary.clone(),
        kind: spec.kind,
        count_gap,
        credit_gap: 0.0,
        courses_to_satisfy,
    })
}

fn evaluate_credits_at_least(spec: &RequirementSpec, have: &HashSet<String>) -> Option<UnmetReq> {
    let have_credits: f32 = spec.satisfiers.iter().filter(|s| have.contains(&s.code)).map(|s| s.credits).sum();
    let credit_gap = (spec.min_credits - have_credits).max(0.0);
    if credit_gap <= 0.0 {
        return None;
    }
    let mut unsatisfied: Vec<&advisor_core::types::Satisfier> =
        spec.satisfiers.iter().filter(|s| !have.contains(&s.code)).collect();
    unsatisfied.sort_by(|a, b| b.credits.partial_cmp(&a.credits).unwrap_or(std::cmp::Ordering::Equal));
    let courses_to_satisfy: Vec<String> = unsatisfied.into_iter().map(|s| s.code.clone()).collect();
    Some(UnmetReq {
        id: spec.id.clone(),
        summary: spec.summary.clone(),
        kind: spec.kind,
        count_gap: 0,
        credit_gap,
        courses_to_satisfy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use advisor_core::types::Satisfier;

    fn satisfier(code: &str, credits: f32) -> Satisfier {
        Satisfier { code: code.to_string(), credits }
    }

    fn have(codes: &[&str]) -> HashSet<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn scenario_c_ordering_and_gaps() {
        let specs = vec![
            RequirementSpec {
                id: "core_sequence".to_string(),
                summary: "Core sequence".to_string(),
                kind: RequirementKind::AllOfSet,
                min_count: 0,
                min_credits: 0.0,
                satisfiers: vec![
                    satisfier("CS 1110", 4.0),
                    satisfier("CS 2110", 4.0),
                    satisfier("CS 2800", 4.0),
                    satisfier("CS 3110", 4.0),
                ],
            },
            RequirementSpec {
                id: "electives".to_string(),
                summary: "Technical electives".to_string(),
                kind: RequirementKind::CreditsAtLeast,
                min_count: 0,
                min_credits: 12.0,
                satisfiers: vec![
                    satisfier("CS 4410", 4.0),
                    satisfier("CS 4820", 4.0),
                    satisfier("CS 4780", 4.0),
                    satisfier("CS 4700", 3.0),
                ],
            },
            RequirementSpec {
                id: "breadth".to_string(),
                summary: "Breadth requirement".to_string(),
                kind: RequirementKind::CountAtLeast,
                min_count: 2,
                min_credits: 0.0,
                satisfiers: vec![satisfier("ENGRI 1100", 3.0), satisfier("PHYS 1112", 4.0), satisfier("MATH 2940", 4.0)],
            },
        ];
        let completed = have(&["CS 1110", "CS 2110", "CS 2800", "CS 4410"]);

        let result = evaluate(&specs, &completed);
        let ids: Vec<&str> = result.iter().map(|r| r.id.as_str()).collect();

        // electives: have 4410 (4 credits) of 12 -> gap 8, the largest credit_gap
        assert_eq!(ids[0], "electives");
        assert_eq!(result[0].credit_gap, 8.0);

        // core_sequence missing CS 3110 only
        let core = result.iter().find(|r| r.id == "core_sequence").unwrap();
        assert_eq!(core.count_gap, 1);
        assert_eq!(core.courses_to_satisfy, vec!["CS 3110".to_string()]);

        // breadth: 0 of 2 satisfied -> gap 2
        let breadth = result.iter().find(|r| r.id == "breadth").unwrap();
        assert_eq!(breadth.count_gap, 2);
    }

    #[test]
    fn fully_satisfied_requirement_is_omitted() {
        let spec = RequirementSpec {
            id: "intro".to_string(),
            summary: "Intro".to_string(),
            kind: RequirementKind::AllOfSet,
            min_count: 0,
            min_credits: 0.0,
            satisfiers: vec![satisfier("CS 1110", 4.0)],
        };
        let result = evaluate(&[spec], &have(&["CS 1110"]));
        assert!(result.is_empty());
    }

    #[test]
    fn empty_satisfiers_falls_back_to_count_at_least_one() {
        let spec = RequirementSpec {
            id: "mystery".to_string(),
            summary: "Unclassified requirement".to_string(),
            kind: RequirementKind::CreditsAtLeast,
            min_count: 0,
            min_credits: 0.0,
            satisfiers: Vec::new(),
        };
        let result = evaluate(&[spec], &have(&[]));
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].count_gap, 1);
    }
}
