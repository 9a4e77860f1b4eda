//! The roster fetcher seam — source of per-course `SectionBundle` lists,
//! grounded on the same bounded-deadline `ContextProvider` shape used
//! elsewhere in the workspace. Concrete implementations live outside this
//! crate (e.g. an HTTP registrar client or a graph-backed one).

use advisor_core::error::Result;
use advisor_core::types::SectionBundle;
use async_trait::async_trait;

#[async_trait]
pub trait RosterFetcher: Send + Sync {
    async fn fetch_bundles(&self, term: &str, course_code: &str) -> Result<Vec<SectionBundle>>;
}
