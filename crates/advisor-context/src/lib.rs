pub mod conflict_detection;
pub mod degree_progress;
pub mod difficulty;
pub mod enrollment;
pub mod grades;
pub mod grades_context;
pub mod graph;
pub mod professor;
pub mod schedule_fit;
pub mod vector;

pub use conflict_detection::ConflictDetectionContext;
pub use degree_progress::DegreeProgressContext;
pub use difficulty::DifficultyContext;
pub use enrollment::EnrollmentContext;
pub use grades::GradesCatalog;
pub use grades_context::GradesContext;
pub use graph::GraphContext;
pub use professor::{deterministic_mock, ProfessorContext, ProfessorInfo, ProfessorScraper};
pub use schedule_fit::ScheduleFitContext;
pub use vector::VectorContext;
