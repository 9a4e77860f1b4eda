pub mod beam;
pub mod roster;
pub mod service;

pub use beam::{RankedSchedule, SchedulePrefs};
pub use roster::RosterFetcher;
pub use service::{ScheduleFitConfig, ScheduleFitService};
