//! Cached construction of the [`DiscoveryDocument`].
//!
//! Fetching and parsing the discovery manifest is expensive relative to the
//! requests that need it, so one loaded document is shared until a proof
//! verification taints it. A tainted or missing document is refetched on the
//! next request; a failed refetch evicts rather than caches, so the system
//! keeps retrying instead of pinning an empty document.

use std::sync::Arc;

use moka::sync::Cache;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::discovery::DiscoveryDocument;

/// Cache key for the single shared discovery document.
const DISCOVERY_DOCUMENT_CACHE_KEY: &str = "wopi-discovery-document";

/// Produces the discovery document consulted by request handling, refetching
/// it from the client's discovery endpoint when the cached one is tainted.
#[derive(Clone)]
pub struct DiscoveryDocumentFactory {
    client: reqwest::Client,
    cache: Cache<String, Arc<DiscoveryDocument>>,
    discovery_endpoint: Option<Url>,
}

impl DiscoveryDocumentFactory {
    /// Create a factory fetching from `discovery_endpoint`.
    ///
    /// With no endpoint configured the factory degrades to handing out the
    /// empty document, and callers fall back to their non-discovery paths.
    pub fn new(client: reqwest::Client, discovery_endpoint: Option<Url>) -> Self {
        Self {
            client,
            cache: Cache::new(1),
            discovery_endpoint,
        }
    }

    /// Return the current discovery document, fetching if needed.
    ///
    /// Never errors: every failure mode collapses into the empty document,
    /// which is handed back uncached so the next request tries again.
    pub async fn create_document(&self, cancel: &CancellationToken) -> Arc<DiscoveryDocument> {
        if let Some(document) = self.cache.get(DISCOVERY_DOCUMENT_CACHE_KEY) {
            if !document.is_tainted() {
                return document;
            }

            debug!("cached discovery document is tainted; refetching");
        }

        let Some(endpoint) = &self.discovery_endpoint else {
            warn!("no discovery endpoint is configured; serving the empty discovery document");
            return Arc::new(DiscoveryDocument::Empty);
        };

        let document = Arc::new(DiscoveryDocument::fetch(&self.client, endpoint, cancel).await);

        if document.is_empty() {
            warn!(endpoint = %endpoint, "discovery document could not be loaded; evicting any cached copy");
            self.cache.invalidate(DISCOVERY_DOCUMENT_CACHE_KEY);
        } else {
            self.cache
                .insert(DISCOVERY_DOCUMENT_CACHE_KEY.to_string(), Arc::clone(&document));
        }

        document
    }
}
