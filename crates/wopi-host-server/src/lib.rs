//! HTTP surface for the WOPI protocol core.
//!
//! Wires the `wopi-host` library onto an axum router: the WOPI file
//! endpoints with callback proof enforcement, the editor launch endpoint,
//! a health check, and a filesystem-backed [`FileRepository`]
//! implementation so the binary runs against local storage.
//!
//! [`FileRepository`]: wopi_host::FileRepository

pub mod error;
pub mod repository;
pub mod routes;
pub mod state;

pub use repository::LocalFileRepository;
pub use routes::app_router;
pub use state::AppState;
