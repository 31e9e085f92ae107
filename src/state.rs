use std::sync::Arc;

use crate::config::ServerConfig;
use crate::queue::SpeakQueue;

/// Application state shared across handlers.
pub struct AppState {
    pub config: ServerConfig,
    pub queue: Arc<SpeakQueue>,
}

impl AppState {
    pub fn new(config: ServerConfig, queue: Arc<SpeakQueue>) -> Arc<Self> {
        Arc::new(Self { config, queue })
    }
}
