//! The health/metrics/trigger/state/shows/refilter HTTP surface. Thin by
//! design: every handler delegates to the orchestrator, the cache, or the
//! scheduler and shapes the result as JSON.

mod handlers;
mod routes;

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::cache::Cache;
use crate::downstream::DownstreamLibrary;
use crate::orchestrator::Orchestrator;
use crate::scheduler::Scheduler;

pub use routes::build_router;

/// Shared application state handed to every handler. Cheap to clone:
/// everything behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub cache: Cache,
    pub downstream: Arc<dyn DownstreamLibrary>,
    pub orchestrator: Arc<Orchestrator>,
    pub scheduler: Arc<Scheduler>,
    pub metrics_handle: PrometheusHandle,
}
