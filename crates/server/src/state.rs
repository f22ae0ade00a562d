//! Shared application state

use std::sync::Arc;

use maktaba_config::RuntimeEnvironment;
use maktaba_search::SearchPipeline;

/// State handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SearchPipeline>,
    pub environment: RuntimeEnvironment,
}

impl AppState {
    pub fn new(pipeline: Arc<SearchPipeline>, environment: RuntimeEnvironment) -> Self {
        Self {
            pipeline,
            environment,
        }
    }
}
