//! Typed WOPI file operations and the pipeline that handles them.
//!
//! A [`WopiOperation`] is produced by request classification and carries the
//! file identity plus the access token presented with the request. Handling
//! runs a shared validation pipeline (cancellation, token validity) before the
//! per-operation body, and yields a [`WopiResponse`] for the server to map
//! onto HTTP.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::config::Features;
use crate::error::{WopiError, WopiResult};
use crate::file::{File, FileMetadata};
use crate::repo::FileRepository;

/// Token value treated as known-invalid, standing in for a real token check.
const INVALID_ACCESS_TOKEN_PLACEHOLDER: &str = "<invalid-access-token>";

/// Content type recorded for saved content when the client sent none.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Longest file name the host accepts, advertised through CheckFileInfo.
const FILE_NAME_MAX_LENGTH: u32 = 250;

/// A classified WOPI request.
///
/// [`WopiOperation::None`] is the sentinel for requests that did not classify
/// to a supported operation; callers check [`WopiOperation::is_empty`] before
/// handling.
#[derive(Debug, Clone, PartialEq)]
pub enum WopiOperation {
    None,
    CheckFileInfo { file: File, access_token: String },
    GetFile { file: File, access_token: String },
    PostFile { file: File, access_token: String },
}

impl WopiOperation {
    /// Whether this is the sentinel for an unrecognized request.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::None)
    }

    /// The access token presented with the request.
    pub fn access_token(&self) -> Option<&str> {
        match self {
            Self::None => Option::None,
            Self::CheckFileInfo { access_token, .. }
            | Self::GetFile { access_token, .. }
            | Self::PostFile { access_token, .. } => Some(access_token),
        }
    }

    /// The file the operation targets.
    pub fn file(&self) -> Option<&File> {
        match self {
            Self::None => Option::None,
            Self::CheckFileInfo { file, .. }
            | Self::GetFile { file, .. }
            | Self::PostFile { file, .. } => Some(file),
        }
    }

    /// Whether the operation mutates the file it targets.
    pub fn requires_write_access(&self) -> bool {
        matches!(self, Self::PostFile { .. })
    }

    /// Whether the access token can no longer be vouched for.
    pub fn is_unable_to_validate_access_token(&self) -> bool {
        match self.access_token() {
            Option::None => true,
            Some(token) => token.trim().is_empty() || token == INVALID_ACCESS_TOKEN_PLACEHOLDER,
        }
    }

    /// Run the shared validation pipeline and the operation body.
    ///
    /// # Errors
    ///
    /// * [`WopiError::EmptyOperation`] when invoked on the sentinel; callers
    ///   check [`WopiOperation::is_empty`] first.
    /// * [`WopiError::Cancelled`] when the request was already cancelled.
    /// * [`WopiError::ExpiredAccessToken`] when the token can no longer be
    ///   validated.
    /// * Repository, validation and integrity errors from the operation body.
    pub async fn handle(
        &self,
        context: &OperationContext<'_>,
        cancel: &CancellationToken,
    ) -> WopiResult<WopiResponse> {
        if self.is_empty() {
            return Err(WopiError::EmptyOperation);
        }
        if cancel.is_cancelled() {
            return Err(WopiError::Cancelled);
        }
        if self.is_unable_to_validate_access_token() {
            return Err(WopiError::ExpiredAccessToken);
        }

        match self {
            Self::None => Err(WopiError::EmptyOperation),
            Self::CheckFileInfo { file, .. } => check_file_info(file, context, cancel).await,
            Self::GetFile { file, .. } => get_file(file, context, cancel).await,
            Self::PostFile { file, .. } => post_file(file, context, cancel).await,
        }
    }
}

/// Collaborators and request payload an operation needs at handling time.
pub struct OperationContext<'a> {
    pub repository: &'a dyn FileRepository,
    pub features: &'a Features,
    /// Brand name surfaced in the editor's breadcrumb UI.
    pub brand_name: &'a str,
    /// Request body; only meaningful for write operations.
    pub body: &'a [u8],
    /// Content type of the request body, when the client declared one.
    pub content_type: Option<&'a str>,
}

/// Typed outcome of a handled operation, mapped onto HTTP by the server.
#[derive(Debug)]
pub enum WopiResponse {
    CheckFileInfo {
        item_version: String,
        payload: CheckFileInfoPayload,
    },
    FileContent {
        item_version: String,
        content_type: String,
        content: Vec<u8>,
    },
    Saved {
        item_version: String,
    },
}

impl WopiResponse {
    /// The version the client is told about through `X-WOPI-ItemVersion`.
    pub fn item_version(&self) -> &str {
        match self {
            Self::CheckFileInfo { item_version, .. }
            | Self::FileContent { item_version, .. }
            | Self::Saved { item_version } => item_version,
        }
    }
}

/// CheckFileInfo response body.
///
/// Field names must match the WOPI property names exactly, which is what the
/// serde renames pin down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CheckFileInfoPayload {
    pub base_file_name: String,
    pub owner_id: String,
    pub size: u64,
    pub user_id: String,
    pub version: String,

    pub supports_update: bool,

    pub user_friendly_name: String,
    pub read_only: bool,
    pub user_can_present: bool,
    pub user_can_write: bool,

    pub breadcrumb_brand_name: String,
    pub breadcrumb_doc_name: String,

    pub allow_additional_microsoft_services: bool,
    pub allow_error_report_prompt: bool,
    pub allow_external_marketplace: bool,
    pub client_throttling_protection: String,
    pub disable_print: bool,
    pub disable_translation: bool,
    pub file_extension: String,
    pub file_name_max_length: u32,
    pub last_modified_time: String,
    pub requested_call_throttling: String,
    #[serde(rename = "SHA256")]
    pub sha256: String,
    pub sharing_status: String,
}

impl CheckFileInfoPayload {
    /// Build the payload for a verified file.
    ///
    /// Until a token service contributes a real user identity, the file's
    /// owner stands in for the requesting user.
    fn new(metadata: &FileMetadata, features: &Features, brand_name: &str) -> Self {
        let allow_edit = features.allow_file_edit;

        Self {
            base_file_name: metadata.base_file_name().to_string(),
            owner_id: metadata.owner.clone(),
            size: metadata.size_in_bytes,
            user_id: metadata.owner.clone(),
            version: metadata.version.clone(),
            supports_update: allow_edit,
            user_friendly_name: metadata.owner.clone(),
            read_only: !allow_edit,
            user_can_present: true,
            user_can_write: allow_edit,
            breadcrumb_brand_name: brand_name.to_string(),
            breadcrumb_doc_name: metadata.name.clone(),
            allow_additional_microsoft_services: true,
            allow_error_report_prompt: false,
            allow_external_marketplace: false,
            client_throttling_protection: "Normal".to_string(),
            disable_print: false,
            disable_translation: false,
            file_extension: metadata.extension.clone(),
            file_name_max_length: FILE_NAME_MAX_LENGTH,
            last_modified_time: metadata.last_write_time.clone(),
            requested_call_throttling: "Normal".to_string(),
            sha256: metadata.content_hash.clone(),
            sharing_status: "Private".to_string(),
        }
    }
}

async fn check_file_info(
    file: &File,
    context: &OperationContext<'_>,
    cancel: &CancellationToken,
) -> WopiResult<WopiResponse> {
    let metadata = context.repository.get_metadata(file, cancel).await?;

    if !metadata.is_safe_to_share() {
        return Err(WopiError::NotSafeToShare {
            file_id: file.id(),
            status: metadata.status.to_string(),
        });
    }

    let item_version = metadata.version.clone();
    let payload = CheckFileInfoPayload::new(&metadata, context.features, context.brand_name);

    Ok(WopiResponse::CheckFileInfo {
        item_version,
        payload,
    })
}

/// Buffers the whole file, then verifies version and content hash before any
/// byte is released to the client.
async fn get_file(
    file: &File,
    context: &OperationContext<'_>,
    cancel: &CancellationToken,
) -> WopiResult<WopiResponse> {
    let metadata = context.repository.get_metadata(file, cancel).await?;

    if !metadata.is_safe_to_share() {
        return Err(WopiError::NotSafeToShare {
            file_id: file.id(),
            status: metadata.status.to_string(),
        });
    }

    let mut content = Vec::new();
    let details = context
        .repository
        .write_to_stream(file, &mut content, cancel)
        .await?;

    if details.version != file.version() {
        let err = WopiError::VersionMismatch {
            file_id: file.id(),
            requested: file.version().to_string(),
            served: details.version,
        };
        error!(error = %err, "refusing to serve content that failed its version check");
        return Err(err);
    }

    let content_hash = BASE64.encode(Sha256::digest(&content));
    if content_hash != metadata.content_hash {
        let err = WopiError::ContentHashMismatch {
            file_id: file.id(),
            expected: metadata.content_hash,
            actual: content_hash,
        };
        error!(error = %err, "refusing to serve content that failed its integrity check");
        return Err(err);
    }

    Ok(WopiResponse::FileContent {
        item_version: details.version,
        content_type: details.content_type,
        content,
    })
}

async fn post_file(
    file: &File,
    context: &OperationContext<'_>,
    cancel: &CancellationToken,
) -> WopiResult<WopiResponse> {
    if context.body.is_empty() {
        return Err(WopiError::Validation {
            field: "content",
            reason: "request body must not be empty".to_string(),
        });
    }

    let content_type = context.content_type.unwrap_or(DEFAULT_CONTENT_TYPE);
    let item_version = context
        .repository
        .save(file, context.body, content_type, cancel)
        .await?;

    debug!(file = %file, version = %item_version, "saved new file version");

    Ok(WopiResponse::Saved { item_version })
}
