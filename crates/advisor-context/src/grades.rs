//! Grades CSV loader and cross-term aggregator backing `GradesContext` and
//! `DifficultyContext` — spec section 4.2.

use std::collections::HashMap;

use advisor_core::error::{Error, Result};
use advisor_core::types::{normalize_course_code, CourseGradesStats, GradeHistogram, ProvenanceTag};
use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use statrs::statistics::Statistics;

#[derive(Debug, Clone, Deserialize)]
struct GradeRow {
    course_id: String,
    term: String,
    mean_gpa: f32,
    grade_a_pct: f32,
    grade_b_pct: f32,
    grade_c_pct: f32,
    grade_d_pct: f32,
    grade_f_pct: f32,
    enrollment_count: u32,
    difficulty_percentile: f32,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// In-memory grades table, grouped by normalized course code, plus the
/// source file's content hash for provenance/cache keys.
pub struct GradesCatalog {
    by_course: HashMap<String, Vec<GradeRow>>,
    pub file_hash: String,
}

impl GradesCatalog {
    /// Fixed, deterministic dataset used in place of `load` when demo mode
    /// is active — no CSV file touched, no per-environment grade data
    /// leaked into a demo/presentation run.
    #[must_use]
    pub fn demo_fixture() -> Self {
        let rows: Vec<GradeRow> = vec![
            GradeRow {
                course_id: "CS1110".to_string(),
                term: "FA24".to_string(),
                mean_gpa: 3.4,
                grade_a_pct: 40.0,
                grade_b_pct: 35.0,
                grade_c_pct: 15.0,
                grade_d_pct: 5.0,
                grade_f_pct: 5.0,
                enrollment_count: 320,
                difficulty_percentile: 45.0,
            },
            GradeRow {
                course_id: "CS2110".to_string(),
                term: "FA24".to_string(),
                mean_gpa: 3.2,
                grade_a_pct: 32.0,
                grade_b_pct: 36.0,
                grade_c_pct: 20.0,
                grade_d_pct: 7.0,
                grade_f_pct: 5.0,
                enrollment_count: 260,
                difficulty_percentile: 62.0,
            },
            GradeRow {
                course_id: "CS3110".to_string(),
                term: "FA24".to_string(),
                mean_gpa: 2.9,
                grade_a_pct: 22.0,
                grade_b_pct: 33.0,
                grade_c_pct: 28.0,
                grade_d_pct: 10.0,
                grade_f_pct: 7.0,
                enrollment_count: 180,
                difficulty_percentile: 81.0,
            },
        ];

        let mut by_course: HashMap<String, Vec<GradeRow>> = HashMap::new();
        for row in rows {
            let code = normalize_course_code(&row.course_id);
            by_course.entry(code).or_default().push(row);
        }

        Self { by_course, file_hash: "demo-fixture".to_string() }
    }

    pub fn load(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::UpstreamUnavailable { service: "grades_csv".to_string(), detail: format!("{path}: {e}") })?;
        let file_hash = sha256_hex(raw.as_bytes());

        let mut reader = csv::Reader::from_reader(raw.as_bytes());
        let mut by_course: HashMap<String, Vec<GradeRow>> = HashMap::new();
        for record in reader.deserialize() {
            let row: GradeRow =
                record.map_err(|e| Error::Internal(format!("malformed grades row in {path}: {e}")))?;
            let code = normalize_course_code(&row.course_id);
            by_course.entry(code).or_default().push(row);
        }

        Ok(Self { by_course, file_hash })
    }

    /// Aggregate every term's row for `course_code` into one
    /// `CourseGradesStats`, or `None` if the course has no rows.
    #[must_use]
    pub fn aggregate(&self, course_code: &str) -> Option<CourseGradesStats> {
        let code = normalize_course_code(course_code);
        let rows = self.by_course.get(&code)?;
        if rows.is_empty() {
            return None;
        }

        let terms: Vec<String> = rows.iter().map(|r| r.term.clone()).collect();
        let gpas: Vec<f64> = rows.iter().map(|r| f64::from(r.mean_gpa)).collect();
        let mean_gpa = gpas.clone().mean();
        let stdev_gpa = if gpas.len() > 1 { gpas.population_std_dev() } else { 0.0 };

        let n = rows.len() as f32;
        let histogram = GradeHistogram {
            a: rows.iter().map(|r| r.grade_a_pct).sum::<f32>() / n,
            b: rows.iter().map(|r| r.grade_b_pct).sum::<f32>() / n,
            c: rows.iter().map(|r| r.grade_c_pct).sum::<f32>() / n,
            d: rows.iter().map(|r| r.grade_d_pct).sum::<f32>() / n,
            f: rows.iter().map(|r| r.grade_f_pct).sum::<f32>() / n,
        };
        if (histogram.sum() - 100.0).abs() > 5.0 {
            return None;
        }

        let enrollment_count: u32 = rows.iter().map(|r| r.enrollment_count).sum();
        let difficulty_percentile = rows.iter().map(|r| r.difficulty_percentile).sum::<f32>() / n;

        let aggregate_for_hash = serde_json::json!({
            "course_code": code,
            "mean_gpa": mean_gpa,
            "stdev_gpa": stdev_gpa,
            "histogram": histogram,
        });
        let data_version = sha256_hex(serde_json::to_string(&aggregate_for_hash).unwrap_or_default().as_bytes());

        let provenance = ProvenanceTag {
            source: "grades".to_string(),
            entity_id: code.clone(),
            tenant: None,
            version: None,
            data_version: Some(data_version),
            observed_at: None,
            fetched_at: Utc::now(),
            expires_at: None,
            ttl_seconds: 24 * 3600,
            soft_ttl_seconds: Some(3 * 24 * 3600),
            meta: HashMap::from([("file_hash".to_string(), serde_json::Value::String(self.file_hash.clone()))]),
        };

        Some(CourseGradesStats {
            course_code: code,
            terms,
            mean_gpa: mean_gpa as f32,
            stdev_gpa: stdev_gpa as f32,
            pass_rate: histogram.pass_rate(),
            histogram,
            enrollment_count,
            difficulty_percentile,
            provenance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    #[test]
    fn aggregates_across_terms_and_computes_pass_rate() {
        let file = write_csv(
            "course_id,term,mean_gpa,grade_a_pct,grade_b_pct,grade_c_pct,grade_d_pct,grade_f_pct,enrollment_count,difficulty_percentile\n\
             CS1110,FA23,3.4,40,35,15,5,5,300,60\n\
             CS1110,SP24,3.2,35,35,18,7,5,280,65\n",
        );
        let catalog = GradesCatalog::load(file.path().to_str().unwrap()).unwrap();
        let stats = catalog.aggregate("CS 1110").unwrap();
        assert_eq!(stats.terms, vec!["FA23".to_string(), "SP24".to_string()]);
        assert_eq!(stats.enrollment_count, 580);
        assert!((stats.mean_gpa - 3.3).abs() < 0.01);
        assert!(stats.pass_rate > 0.9);
    }

    #[test]
    fn missing_course_returns_none() {
        let file = write_csv(
            "course_id,term,mean_gpa,grade_a_pct,grade_b_pct,grade_c_pct,grade_d_pct,grade_f_pct,enrollment_count,difficulty_percentile\n",
        );
        let catalog = GradesCatalog::load(file.path().to_str().unwrap()).unwrap();
        assert!(catalog.aggregate("CS 9999").is_none());
    }
}
