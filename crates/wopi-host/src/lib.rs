//! Host-side implementation of the WOPI protocol core.
//!
//! WOPI (Web Application Open Platform Interface) is the HTTP contract by
//! which a remote document editor discovers a host's capabilities, fetches
//! file bytes and metadata, and pushes edited content back, while proving
//! cryptographically that its callbacks are genuine. This crate implements
//! the protocol core:
//!
//! - Discovery document lifecycle: fetching, parsing and caching the editing
//!   client's capability/trust manifest, including its rotating signing keys
//! - Proof-key verification: byte-exact reconstruction of the signed callback
//!   payload and RSA-SHA256 signature checks with key-rotation fallback
//! - Request classification and dispatch: typed [`WopiOperation`]s with a
//!   shared validation pipeline and per-operation integrity contracts
//!
//! Everything storage-shaped stays behind the [`FileRepository`] trait; the
//! companion server crate supplies an HTTP surface and a filesystem-backed
//! repository.
//!
//! # Quick Start
//!
//! ```
//! use wopi_host::{WopiOperation, WopiRequestFactory};
//!
//! let operation = WopiRequestFactory::classify(
//!     "GET",
//!     "/wopi/files/report.docx%7C1.0",
//!     Some("access_token=secret"),
//! );
//!
//! assert!(matches!(operation, WopiOperation::CheckFileInfo { .. }));
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `WOPI_DISCOVERY_ENDPOINT` | Absolute URL of the client's discovery endpoint |
//! | `WOPI_HOST_FILES_ENDPOINT` | Absolute base URL of this host's `/wopi/files` surface |
//! | `WOPI_BIND_ADDR` | Listen address (default: `127.0.0.1:8080`) |
//! | `WOPI_STORAGE_ROOT` | File repository root (default: `wopi-storage`) |
//! | `WOPI_ALLOW_FILE_EDIT` | Enable edit capabilities (`1`/`true`) |
//! | `WOPI_BRAND_NAME` | Breadcrumb brand name |

pub mod classify;
pub mod config;
pub mod discovery;
pub mod error;
pub mod factory;
pub mod file;
pub mod operations;
pub mod proof;
pub mod repo;

// Re-export main types
pub use classify::WopiRequestFactory;
pub use config::{Features, WopiConfig};
pub use discovery::{ActionRow, DiscoveryDocument, ProofHeaders, ProofKeys};
pub use error::{WopiError, WopiResult};
pub use factory::DiscoveryDocumentFactory;
pub use file::{File, FileMetadata, FileStatus, FileWriteDetails};
pub use operations::{CheckFileInfoPayload, OperationContext, WopiOperation, WopiResponse};
pub use repo::FileRepository;
