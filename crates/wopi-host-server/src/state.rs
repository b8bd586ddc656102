//! Shared server state.

use std::sync::Arc;

use wopi_host::{DiscoveryDocumentFactory, FileRepository, WopiConfig};

/// Collaborators shared by every request handler.
pub struct AppState {
    pub config: WopiConfig,
    pub repository: Arc<dyn FileRepository>,
    pub discovery: DiscoveryDocumentFactory,
}

impl AppState {
    /// Build the state for one server process.
    ///
    /// One `reqwest` client backs all discovery fetches so connection pooling
    /// works across requests.
    pub fn new(config: WopiConfig, repository: Arc<dyn FileRepository>) -> Self {
        let discovery = DiscoveryDocumentFactory::new(
            reqwest::Client::new(),
            config.discovery_endpoint.clone(),
        );

        Self {
            config,
            repository,
            discovery,
        }
    }
}
