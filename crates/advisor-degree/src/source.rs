//! The requirement-spec source seam — one round trip per major, grounded
//! on the same fetcher-trait shape as `advisor_schedule::RosterFetcher`.
//! A concrete graph-backed implementation lives outside this crate.

use advisor_core::error::Result;
use advisor_core::types::RequirementSpec;
use async_trait::async_trait;

#[async_trait]
pub trait RequirementSpecSource: Send + Sync {
    async fn fetch_specs(&self, major: &str) -> Result<Vec<RequirementSpec>>;
}
