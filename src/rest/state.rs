//! API state for the trigger server.

use std::sync::Arc;

use crate::config::Config;
use crate::pipeline::Runner;

/// Shared state for the trigger API
#[derive(Clone)]
pub struct ApiState {
    /// Application configuration (reserved for future auth settings)
    #[allow(dead_code)]
    pub config: Arc<Config>,
    /// The assembled pipeline; one instance serves every invocation
    pub runner: Arc<Runner>,
}

impl ApiState {
    pub fn new(config: Config, runner: Arc<Runner>) -> Self {
        Self {
            config: Arc::new(config),
            runner,
        }
    }
}
