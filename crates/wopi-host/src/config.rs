//! Host configuration and feature flags.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

/// Capability flags controlling what the host advertises to editing clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Features {
    /// Whether clients may edit files. Drives the `SupportsUpdate`,
    /// `UserCanWrite` and `ReadOnly` capability flags in CheckFileInfo.
    #[serde(default)]
    pub allow_file_edit: bool,
}

/// WOPI host configuration.
///
/// A missing discovery endpoint is a supported degraded state: the host still
/// serves WOPI file operations, it just cannot resolve editor launch URLs or
/// verify callback proofs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WopiConfig {
    /// Absolute URL of the editing client's discovery endpoint.
    #[serde(default)]
    pub discovery_endpoint: Option<Url>,

    /// Absolute base URL under which this host serves `/wopi/files`; used to
    /// build the `WOPISrc` value in editor launch URLs.
    #[serde(default)]
    pub host_files_endpoint: Option<Url>,

    /// Address the server binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Root directory of the filesystem-backed file repository.
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    /// Brand name surfaced in the editor's breadcrumb UI.
    #[serde(default = "default_brand_name")]
    pub brand_name: String,

    #[serde(default)]
    pub features: Features,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("wopi-storage")
}

fn default_brand_name() -> String {
    "WOPI Host".to_string()
}

impl Default for WopiConfig {
    fn default() -> Self {
        Self {
            discovery_endpoint: None,
            host_files_endpoint: None,
            bind_addr: default_bind_addr(),
            storage_root: default_storage_root(),
            brand_name: default_brand_name(),
            features: Features::default(),
        }
    }
}

impl WopiConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `WOPI_DISCOVERY_ENDPOINT` | Absolute URL of the client's discovery endpoint |
    /// | `WOPI_HOST_FILES_ENDPOINT` | Absolute base URL of this host's `/wopi/files` surface |
    /// | `WOPI_BIND_ADDR` | Listen address (default: `127.0.0.1:8080`) |
    /// | `WOPI_STORAGE_ROOT` | File repository root (default: `wopi-storage`) |
    /// | `WOPI_ALLOW_FILE_EDIT` | Enable edit capabilities (`1`/`true`) |
    /// | `WOPI_BRAND_NAME` | Breadcrumb brand name |
    ///
    /// A malformed endpoint URL is treated the same as an absent one: the
    /// host starts in the degraded no-discovery state instead of failing.
    pub fn from_env() -> Self {
        Self {
            discovery_endpoint: absolute_url_var("WOPI_DISCOVERY_ENDPOINT"),
            host_files_endpoint: absolute_url_var("WOPI_HOST_FILES_ENDPOINT"),
            bind_addr: std::env::var("WOPI_BIND_ADDR").unwrap_or_else(|_| default_bind_addr()),
            storage_root: std::env::var("WOPI_STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_storage_root()),
            brand_name: std::env::var("WOPI_BRAND_NAME").unwrap_or_else(|_| default_brand_name()),
            features: Features {
                allow_file_edit: bool_var("WOPI_ALLOW_FILE_EDIT"),
            },
        }
    }

    /// Set the discovery endpoint.
    pub fn with_discovery_endpoint(mut self, endpoint: Url) -> Self {
        self.discovery_endpoint = Some(endpoint);
        self
    }

    /// Set the host files endpoint.
    pub fn with_host_files_endpoint(mut self, endpoint: Url) -> Self {
        self.host_files_endpoint = Some(endpoint);
        self
    }

    /// Set the file repository root.
    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = root.into();
        self
    }

    /// Allow or forbid file edits.
    pub fn with_allow_file_edit(mut self, allow: bool) -> Self {
        self.features.allow_file_edit = allow;
        self
    }
}

fn absolute_url_var(name: &str) -> Option<Url> {
    let value = std::env::var(name).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    match Url::parse(trimmed) {
        Ok(url) if !url.cannot_be_a_base() => Some(url),
        _ => {
            warn!(variable = name, value = trimmed, "ignoring malformed endpoint url");
            None
        }
    }
}

fn bool_var(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
