use std::sync::Arc;

use crate::artifacts::ArtifactManager;
use crate::config::Config;
use crate::forward::Forwarder;
use crate::observability::Metrics;
use crate::pipeline::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<Pipeline>,
    pub artifacts: Arc<ArtifactManager>,
    pub forwarder: Forwarder,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config, artifacts: Arc<ArtifactManager>, forwarder: Forwarder) -> Self {
        let metrics = Arc::new(Metrics::new());
        let pipeline = Pipeline::new(&config, Arc::clone(&metrics));
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            artifacts,
            forwarder,
            metrics,
        }
    }
}
