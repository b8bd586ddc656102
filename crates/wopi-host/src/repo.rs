//! The file-store collaborator contract.
//!
//! The protocol core never talks to concrete storage. Everything it needs
//! from the backing store goes through [`FileRepository`], which a host
//! process implements over its storage of choice (local disk, blob store,
//! database). Implementations surface absence and I/O failures through
//! [`WopiError`](crate::error::WopiError) so operations can map them onto
//! protocol responses.

use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

use crate::error::WopiResult;
use crate::file::{File, FileMetadata, FileWriteDetails};

/// Storage contract consumed by the protocol operations.
///
/// All operations are async and cancellation-aware: implementations should
/// observe the token at least once before doing work, and the content-copy
/// path must abort cooperatively when it fires.
#[async_trait]
pub trait FileRepository: Send + Sync {
    /// Look up the metadata for a specific version of a file.
    ///
    /// # Returns
    ///
    /// - `Ok(FileMetadata)` when the file version exists
    /// - `Err(WopiError::FileNotFound)` when it does not
    /// - `Err(WopiError::Storage)` for backend failures
    async fn get_metadata(
        &self,
        file: &File,
        cancel: &CancellationToken,
    ) -> WopiResult<FileMetadata>;

    /// Copy the file's content into `writer` and describe what was written.
    ///
    /// The returned [`FileWriteDetails`] reports the version, length, content
    /// type and content hash of the bytes actually written, which callers
    /// cross-check against [`FileMetadata`] before releasing them.
    async fn write_to_stream(
        &self,
        file: &File,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
        cancel: &CancellationToken,
    ) -> WopiResult<FileWriteDetails>;

    /// Persist `content` as a new version of the named file.
    ///
    /// Version allocation belongs to the repository. Returns the version
    /// string assigned to the stored copy.
    async fn save(
        &self,
        file: &File,
        content: &[u8],
        content_type: &str,
        cancel: &CancellationToken,
    ) -> WopiResult<String>;
}
