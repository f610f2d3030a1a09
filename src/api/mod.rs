pub mod handlers;
pub mod routes;

pub use routes::*;

use crate::ml::RiskPipeline;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RiskPipeline>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(pipeline: Arc<RiskPipeline>) -> Self {
        Self {
            pipeline,
            started_at: Instant::now(),
        }
    }
}
