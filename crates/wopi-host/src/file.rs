//! File identities and the metadata contract served by the file repository.

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{WopiError, WopiResult};

/// Separator between the name and version halves of a file id.
const ID_SEPARATOR: char = '|';

/// Identity of one version of one file.
///
/// Name comparison is case-insensitive; version comparison is ordinal. The
/// derived id (`name|version`) is the canonical external reference and
/// round-trips through [`File::parse_id`].
#[derive(Debug, Clone)]
pub struct File {
    name: String,
    version: String,
}

impl File {
    /// Create an identity from a name and version, both non-blank after trimming.
    pub fn with(name: &str, version: &str) -> WopiResult<Self> {
        let name = name.trim();
        let version = version.trim();

        if name.is_empty() {
            return Err(WopiError::Validation {
                field: "file name",
                reason: "must not be blank".to_string(),
            });
        }
        if version.is_empty() {
            return Err(WopiError::Validation {
                field: "file version",
                reason: "must not be blank".to_string(),
            });
        }

        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
        })
    }

    /// Parse a `name|version` id back into an identity.
    ///
    /// Returns `None` when the separator is missing, either half is blank, or
    /// the version half contains a further separator.
    pub fn parse_id(id: &str) -> Option<Self> {
        let (name, version) = id.split_once(ID_SEPARATOR)?;

        if version.contains(ID_SEPARATOR) {
            return None;
        }

        Self::with(name, version).ok()
    }

    /// The canonical `name|version` reference.
    pub fn id(&self) -> String {
        format!("{}{}{}", self.name, ID_SEPARATOR, self.version)
    }

    /// The file name, including its extension.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The opaque version label.
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl PartialEq for File {
    fn eq(&self, other: &Self) -> bool {
        self.name.to_lowercase() == other.name.to_lowercase() && self.version == other.version
    }
}

impl Eq for File {}

impl Hash for File {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.to_lowercase().hash(state);
        self.version.hash(state);
    }
}

impl fmt::Display for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Lifecycle status of a stored file.
///
/// Only [`FileStatus::Verified`] authorizes serving content to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Uploading,
    Uploaded,
    Failed,
    Verified,
    Quarantined,
    Recycled,
    Deleted,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Uploading => "Uploading",
            Self::Uploaded => "Uploaded",
            Self::Failed => "Failed",
            Self::Verified => "Verified",
            Self::Quarantined => "Quarantined",
            Self::Recycled => "Recycled",
            Self::Deleted => "Deleted",
        };
        f.write_str(label)
    }
}

/// Metadata describing one version of one file, produced per request by the
/// file repository and never cached beyond it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub title: String,
    pub description: String,
    pub version: String,
    pub owner: String,
    /// File name including its extension.
    pub name: String,
    /// Extension including the leading dot, e.g. `.docx`.
    pub extension: String,
    pub size_in_bytes: u64,
    /// ISO-8601 UTC timestamp of the last write.
    pub last_write_time: String,
    /// Base64-encoded SHA-256 of the content.
    pub content_hash: String,
    pub status: FileStatus,
}

impl FileMetadata {
    /// Create validated metadata.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        title: &str,
        description: &str,
        version: &str,
        owner: &str,
        name: &str,
        extension: &str,
        size_in_bytes: u64,
        last_write_time: DateTime<Utc>,
        content_hash: &str,
        status: FileStatus,
    ) -> WopiResult<Self> {
        fn non_blank(field: &'static str, value: &str) -> WopiResult<()> {
            if value.trim().is_empty() {
                return Err(WopiError::Validation {
                    field,
                    reason: "must not be blank".to_string(),
                });
            }
            Ok(())
        }

        non_blank("title", title)?;
        non_blank("description", description)?;
        non_blank("version", version)?;
        non_blank("owner", owner)?;
        non_blank("name", name)?;
        non_blank("extension", extension)?;
        non_blank("content hash", content_hash)?;

        if extension.len() < 3 {
            return Err(WopiError::Validation {
                field: "extension",
                reason: "must be at least 3 characters long".to_string(),
            });
        }
        if size_in_bytes == 0 {
            return Err(WopiError::Validation {
                field: "size",
                reason: "must be greater than 0 bytes".to_string(),
            });
        }

        Ok(Self {
            title: title.to_string(),
            description: description.to_string(),
            version: version.to_string(),
            owner: owner.to_string(),
            name: name.to_string(),
            extension: extension.to_string(),
            size_in_bytes,
            last_write_time: last_write_time.to_rfc3339_opts(SecondsFormat::Millis, true),
            content_hash: content_hash.to_string(),
            status,
        })
    }

    /// Whether the file's status authorizes serving its content.
    pub fn is_safe_to_share(&self) -> bool {
        self.status == FileStatus::Verified
    }

    /// The name with its recorded extension stripped, for display to clients.
    pub fn base_file_name(&self) -> &str {
        if self.name.len() > self.extension.len() {
            let split = self.name.len() - self.extension.len();
            if self.name.is_char_boundary(split)
                && self.name[split..].eq_ignore_ascii_case(&self.extension)
            {
                return &self.name[..split];
            }
        }
        &self.name
    }
}

/// Result of writing a file's content out of storage, used to cross-check the
/// bytes actually served against the metadata contract.
#[derive(Debug, Clone)]
pub struct FileWriteDetails {
    pub version: String,
    pub content_type: String,
    /// Base64-encoded SHA-256 of the bytes written.
    pub content_hash: String,
    pub content_length: u64,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub last_accessed: Option<DateTime<Utc>>,
    pub last_modified: DateTime<Utc>,
}
