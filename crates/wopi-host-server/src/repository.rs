//! Filesystem-backed [`FileRepository`] implementation.
//!
//! Content lives at `<root>/<name>/<version>` with a JSON sidecar
//! (`<version>.meta.json`) carrying the metadata contract. This is the
//! repository the binary and the integration tests run against; cloud-backed
//! repositories implement the same trait elsewhere.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use wopi_host::{File, FileMetadata, FileRepository, FileStatus, FileWriteDetails, WopiError, WopiResult};

const SIDECAR_SUFFIX: &str = ".meta.json";
const DEFAULT_OWNER: &str = "local-host";
const DEFAULT_DESCRIPTION: &str = "stored by the wopi host";

/// Per-version metadata persisted next to the content file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sidecar {
    title: String,
    description: String,
    owner: String,
    content_type: String,
    /// Base64-encoded SHA-256 of the content file.
    content_hash: String,
    size_in_bytes: u64,
    last_write_time: DateTime<Utc>,
    status: FileStatus,
}

/// File repository over a local directory tree.
pub struct LocalFileRepository {
    root: PathBuf,
}

impl LocalFileRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn content_path(&self, file: &File) -> PathBuf {
        self.root.join(file.name()).join(file.version())
    }

    fn sidecar_path(&self, file: &File) -> PathBuf {
        self.root
            .join(file.name())
            .join(format!("{}{SIDECAR_SUFFIX}", file.version()))
    }

    /// Store content under an exact identity with an explicit status.
    ///
    /// `save` is the protocol path and always allocates its own version;
    /// this is the provisioning path, used to seed files whose identity and
    /// verification status are decided elsewhere (upload pipeline, tests).
    pub async fn put(
        &self,
        file: &File,
        content: &[u8],
        content_type: &str,
        status: FileStatus,
    ) -> WopiResult<()> {
        let sidecar = Sidecar {
            title: file.name().to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            owner: DEFAULT_OWNER.to_string(),
            content_type: content_type.to_string(),
            content_hash: BASE64.encode(Sha256::digest(content)),
            size_in_bytes: content.len() as u64,
            last_write_time: Utc::now(),
            status,
        };

        self.write_version(file, content, &sidecar).await
    }

    async fn write_version(&self, file: &File, content: &[u8], sidecar: &Sidecar) -> WopiResult<()> {
        let dir = self.root.join(file.name());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|err| storage_error(&dir, &err))?;

        let content_path = self.content_path(file);
        tokio::fs::write(&content_path, content)
            .await
            .map_err(|err| storage_error(&content_path, &err))?;

        let sidecar_path = self.sidecar_path(file);
        let json = serde_json::to_vec_pretty(sidecar).map_err(|err| WopiError::Storage {
            message: format!("failed to serialize sidecar for {file}: {err}"),
        })?;
        tokio::fs::write(&sidecar_path, json)
            .await
            .map_err(|err| storage_error(&sidecar_path, &err))?;

        debug!(%file, path = %content_path.display(), "stored file version");
        Ok(())
    }

    async fn read_sidecar(&self, file: &File) -> WopiResult<Sidecar> {
        let path = self.sidecar_path(file);
        let bytes = tokio::fs::read(&path).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                WopiError::FileNotFound { file_id: file.id() }
            } else {
                storage_error(&path, &err)
            }
        })?;

        serde_json::from_slice(&bytes).map_err(|err| WopiError::Storage {
            message: format!("sidecar for {file} is not parsable: {err}"),
        })
    }
}

#[async_trait]
impl FileRepository for LocalFileRepository {
    async fn get_metadata(
        &self,
        file: &File,
        cancel: &CancellationToken,
    ) -> WopiResult<FileMetadata> {
        if cancel.is_cancelled() {
            return Err(WopiError::Cancelled);
        }

        let sidecar = self.read_sidecar(file).await?;
        let extension = file_extension(file.name()).ok_or_else(|| WopiError::Validation {
            field: "file name",
            reason: format!("{} has no extension", file.name()),
        })?;

        FileMetadata::new(
            &sidecar.title,
            &sidecar.description,
            file.version(),
            &sidecar.owner,
            file.name(),
            &extension,
            sidecar.size_in_bytes,
            sidecar.last_write_time,
            &sidecar.content_hash,
            sidecar.status,
        )
    }

    async fn write_to_stream(
        &self,
        file: &File,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
        cancel: &CancellationToken,
    ) -> WopiResult<FileWriteDetails> {
        if cancel.is_cancelled() {
            return Err(WopiError::Cancelled);
        }

        let sidecar = self.read_sidecar(file).await?;
        let path = self.content_path(file);
        let content = tokio::fs::read(&path).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                WopiError::FileNotFound { file_id: file.id() }
            } else {
                storage_error(&path, &err)
            }
        })?;

        tokio::select! {
            () = cancel.cancelled() => return Err(WopiError::Cancelled),
            result = writer.write_all(&content) => {
                result.map_err(|err| WopiError::Storage {
                    message: format!("failed to copy {file} to the response: {err}"),
                })?;
            }
        }

        Ok(FileWriteDetails {
            version: file.version().to_string(),
            content_type: sidecar.content_type,
            content_hash: BASE64.encode(Sha256::digest(&content)),
            content_length: content.len() as u64,
            content_encoding: None,
            content_language: None,
            last_accessed: None,
            last_modified: sidecar.last_write_time,
        })
    }

    async fn save(
        &self,
        file: &File,
        content: &[u8],
        content_type: &str,
        cancel: &CancellationToken,
    ) -> WopiResult<String> {
        if cancel.is_cancelled() {
            return Err(WopiError::Cancelled);
        }

        let now = Utc::now();
        let version = now.timestamp_millis().to_string();
        let copy = File::with(file.name(), &version)?;

        let sidecar = Sidecar {
            title: file.name().to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            owner: DEFAULT_OWNER.to_string(),
            content_type: content_type.to_string(),
            content_hash: BASE64.encode(Sha256::digest(content)),
            size_in_bytes: content.len() as u64,
            last_write_time: now,
            // hash and size were computed from the bytes just written, so the
            // copy is verified by construction
            status: FileStatus::Verified,
        };

        self.write_version(&copy, content, &sidecar).await?;
        Ok(version)
    }
}

/// Extension of `name` including the leading dot.
fn file_extension(name: &str) -> Option<String> {
    let (_, extension) = name.rsplit_once('.')?;
    if extension.is_empty() {
        return None;
    }
    Some(format!(".{extension}"))
}

fn storage_error(path: &Path, err: &io::Error) -> WopiError {
    WopiError::Storage {
        message: format!("{}: {err}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repository() -> (tempfile::TempDir, LocalFileRepository) {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = LocalFileRepository::new(dir.path());
        (dir, repo)
    }

    #[tokio::test]
    async fn test_put_then_get_metadata() {
        let (_dir, repo) = repository();
        let cancel = CancellationToken::new();
        let file = File::with("report.docx", "1.0").unwrap();

        repo.put(&file, b"content", "application/msword", FileStatus::Verified)
            .await
            .expect("put should succeed");

        let metadata = repo.get_metadata(&file, &cancel).await.expect("metadata");

        assert_eq!(metadata.name, "report.docx");
        assert_eq!(metadata.version, "1.0");
        assert_eq!(metadata.extension, ".docx");
        assert_eq!(metadata.size_in_bytes, 7);
        assert_eq!(metadata.content_hash, BASE64.encode(Sha256::digest(b"content")));
        assert!(metadata.is_safe_to_share());
    }

    #[tokio::test]
    async fn test_missing_file_reports_not_found() {
        let (_dir, repo) = repository();
        let cancel = CancellationToken::new();
        let file = File::with("missing.docx", "1.0").unwrap();

        let result = repo.get_metadata(&file, &cancel).await;
        assert!(matches!(result, Err(WopiError::FileNotFound { .. })));

        let mut sink = Vec::new();
        let result = repo.write_to_stream(&file, &mut sink, &cancel).await;
        assert!(matches!(result, Err(WopiError::FileNotFound { .. })));
    }

    #[tokio::test]
    async fn test_write_to_stream_reports_what_it_wrote() {
        let (_dir, repo) = repository();
        let cancel = CancellationToken::new();
        let file = File::with("report.docx", "1.0").unwrap();

        repo.put(&file, b"the bytes", "application/msword", FileStatus::Verified)
            .await
            .expect("put should succeed");

        let mut sink = Vec::new();
        let details = repo
            .write_to_stream(&file, &mut sink, &cancel)
            .await
            .expect("copy should succeed");

        assert_eq!(sink, b"the bytes");
        assert_eq!(details.version, "1.0");
        assert_eq!(details.content_type, "application/msword");
        assert_eq!(details.content_length, 9);
        assert_eq!(details.content_hash, BASE64.encode(Sha256::digest(b"the bytes")));
    }

    #[tokio::test]
    async fn test_save_allocates_a_version_and_verifies_the_copy() {
        let (_dir, repo) = repository();
        let cancel = CancellationToken::new();
        let file = File::with("report.docx", "1.0").unwrap();

        let version = repo
            .save(&file, b"updated", "application/msword", &cancel)
            .await
            .expect("save should succeed");

        assert_ne!(version, "1.0");
        version.parse::<i64>().expect("version should be a millisecond timestamp");

        let copy = File::with("report.docx", &version).unwrap();
        let metadata = repo.get_metadata(&copy, &cancel).await.expect("metadata");
        assert_eq!(metadata.status, FileStatus::Verified);
        assert_eq!(metadata.size_in_bytes, 7);
    }

    #[tokio::test]
    async fn test_versions_are_stored_side_by_side() {
        let (_dir, repo) = repository();
        let cancel = CancellationToken::new();

        let one = File::with("report.docx", "1.0").unwrap();
        let two = File::with("report.docx", "2.0").unwrap();

        repo.put(&one, b"first", "application/msword", FileStatus::Verified)
            .await
            .unwrap();
        repo.put(&two, b"second", "application/msword", FileStatus::Verified)
            .await
            .unwrap();

        let mut sink = Vec::new();
        repo.write_to_stream(&one, &mut sink, &cancel).await.unwrap();
        assert_eq!(sink, b"first");

        let mut sink = Vec::new();
        repo.write_to_stream(&two, &mut sink, &cancel).await.unwrap();
        assert_eq!(sink, b"second");
    }

    #[tokio::test]
    async fn test_cancellation_is_observed() {
        let (_dir, repo) = repository();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let file = File::with("report.docx", "1.0").unwrap();

        assert!(matches!(
            repo.get_metadata(&file, &cancel).await,
            Err(WopiError::Cancelled)
        ));
        assert!(matches!(
            repo.save(&file, b"x", "application/msword", &cancel).await,
            Err(WopiError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_name_without_extension_fails_metadata() {
        let (_dir, repo) = repository();
        let cancel = CancellationToken::new();
        let file = File::with("README", "1.0").unwrap();

        repo.put(&file, b"content", "text/plain", FileStatus::Verified)
            .await
            .unwrap();

        let result = repo.get_metadata(&file, &cancel).await;
        assert!(matches!(result, Err(WopiError::Validation { .. })));
    }
}
