//! Request classification: `(method, path, query)` to a typed operation.
//!
//! Classification is deliberately forgiving: everything that is not a
//! well-formed, token-carrying WOPI file request collapses into
//! [`WopiOperation::None`], so the HTTP layer always receives a well-typed
//! "nothing to do" value instead of an error for expected-shape failures.

use percent_encoding::percent_decode_str;
use tracing::debug;

use crate::file::File;
use crate::operations::WopiOperation;

const WOPI_SEGMENT: &str = "wopi";
const FILES_SEGMENT: &str = "files";
const FOLDERS_SEGMENT: &str = "folders";
const CONTENTS_SUFFIX: &str = "/contents";
const ACCESS_TOKEN_PARAMETER: &str = "access_token";

/// Version addressed by a bare file name, pending per-request version
/// resolution by a real token service.
const DEFAULT_FILE_VERSION: &str = "1.0";

/// Turns inbound HTTP requests into [`WopiOperation`] values.
pub struct WopiRequestFactory;

impl WopiRequestFactory {
    /// Classify one request.
    ///
    /// `path` is the still-encoded request path, `query` the raw query
    /// string. Rules, in order:
    ///
    /// * not under `/wopi`, or no non-blank `access_token`: [`WopiOperation::None`]
    /// * `/wopi/files/{id}/contents`: GET is GetFile, POST is PostFile
    /// * `/wopi/files/{id}`: GET is CheckFileInfo
    /// * `/wopi/folders/...`: recognized, always [`WopiOperation::None`]
    ///
    /// The id is percent-decoded; an id carrying the `|` separator is parsed
    /// as `name|version`, and a bare file name addresses the default version
    /// `1.0`. A malformed id (blank halves, extra separators) does not
    /// classify. An operation whose token fails validation is discarded
    /// here, so callers never observe a constructed-but-unauthorized
    /// operation.
    pub fn classify(method: &str, path: &str, query: Option<&str>) -> WopiOperation {
        let Some(access_token) = access_token(query) else {
            debug!(path, "request carries no usable access token");
            return WopiOperation::None;
        };

        let path = path.strip_prefix('/').unwrap_or(path);
        let (first, rest) = path.split_once('/').unwrap_or((path, ""));
        if !first.eq_ignore_ascii_case(WOPI_SEGMENT) {
            return WopiOperation::None;
        }

        let (area, remainder) = rest.split_once('/').unwrap_or((rest, ""));

        let operation = if area.eq_ignore_ascii_case(FOLDERS_SEGMENT) {
            // folder operations are recognized but not supported by this host
            debug!(path, "ignoring folder request");
            WopiOperation::None
        } else if area.eq_ignore_ascii_case(FILES_SEGMENT) && !remainder.is_empty() {
            classify_file_request(method, remainder, access_token)
        } else {
            WopiOperation::None
        };

        if operation.is_unable_to_validate_access_token() {
            debug!(path, "discarding operation with an unvalidatable access token");
            return WopiOperation::None;
        }

        operation
    }
}

fn classify_file_request(method: &str, remainder: &str, access_token: String) -> WopiOperation {
    if let Some(id) = remainder.strip_suffix(CONTENTS_SUFFIX) {
        let Some(file) = decode_file_id(id) else {
            return WopiOperation::None;
        };

        return if method.eq_ignore_ascii_case("GET") {
            WopiOperation::GetFile { file, access_token }
        } else if method.eq_ignore_ascii_case("POST") {
            WopiOperation::PostFile { file, access_token }
        } else {
            WopiOperation::None
        };
    }

    let Some(file) = decode_file_id(remainder) else {
        return WopiOperation::None;
    };

    if method.eq_ignore_ascii_case("GET") {
        WopiOperation::CheckFileInfo { file, access_token }
    } else {
        WopiOperation::None
    }
}

/// Decoded, non-blank `access_token` query value.
fn access_token(query: Option<&str>) -> Option<String> {
    let query = query?;

    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == ACCESS_TOKEN_PARAMETER)
        .map(|(_, value)| value.into_owned())
        .filter(|token| !token.trim().is_empty())
}

fn decode_file_id(encoded: &str) -> Option<File> {
    let id = percent_decode_str(encoded).decode_utf8().ok()?;

    if id.contains('|') {
        File::parse_id(&id)
    } else {
        File::with(&id, DEFAULT_FILE_VERSION).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY: Option<&str> = Some("access_token=expiring-in-an-hour");

    #[test]
    fn test_get_file_path_classifies_as_check_file_info() {
        let operation =
            WopiRequestFactory::classify("GET", "/wopi/files/report.docx%7C1.0", QUERY);

        let WopiOperation::CheckFileInfo { file, access_token } = operation else {
            panic!("expected check file info, got {operation:?}");
        };

        assert_eq!(file.name(), "report.docx");
        assert_eq!(file.version(), "1.0");
        assert_eq!(access_token, "expiring-in-an-hour");
    }

    #[test]
    fn test_get_contents_path_classifies_as_get_file() {
        let operation =
            WopiRequestFactory::classify("GET", "/wopi/files/report.docx%7C1.0/contents", QUERY);

        let WopiOperation::GetFile { file, .. } = operation else {
            panic!("expected get file, got {operation:?}");
        };

        assert_eq!(file.id(), "report.docx|1.0");
    }

    #[test]
    fn test_post_contents_path_classifies_as_post_file() {
        let operation =
            WopiRequestFactory::classify("POST", "/wopi/files/report.docx%7C1.0/contents", QUERY);

        assert!(operation.requires_write_access());

        let WopiOperation::PostFile { file, .. } = operation else {
            panic!("expected post file, got {operation:?}");
        };

        assert_eq!(file.id(), "report.docx|1.0");
    }

    #[test]
    fn test_unsupported_methods_do_not_classify() {
        for method in ["PUT", "DELETE", "PATCH", "HEAD"] {
            let info =
                WopiRequestFactory::classify(method, "/wopi/files/report.docx%7C1.0", QUERY);
            assert!(info.is_empty(), "{method} on the file path should not classify");

            let contents = WopiRequestFactory::classify(
                method,
                "/wopi/files/report.docx%7C1.0/contents",
                QUERY,
            );
            assert!(contents.is_empty(), "{method} on contents should not classify");
        }

        let post_info = WopiRequestFactory::classify("POST", "/wopi/files/report.docx%7C1.0", QUERY);
        assert!(post_info.is_empty(), "POST without /contents should not classify");
    }

    #[test]
    fn test_paths_outside_wopi_do_not_classify() {
        assert!(WopiRequestFactory::classify("GET", "/api/files/report.docx%7C1.0", QUERY)
            .is_empty());
        assert!(WopiRequestFactory::classify("GET", "/", QUERY).is_empty());
        assert!(WopiRequestFactory::classify("GET", "/wopinot/files/a%7C1", QUERY).is_empty());
    }

    #[test]
    fn test_wopi_prefix_matches_case_insensitively() {
        let operation =
            WopiRequestFactory::classify("GET", "/WOPI/Files/report.docx%7C1.0", QUERY);
        assert!(!operation.is_empty());
    }

    #[test]
    fn test_folder_requests_are_recognized_but_empty() {
        for method in ["GET", "POST"] {
            let operation = WopiRequestFactory::classify(
                method,
                "/wopi/folders/projects%7C1/children",
                QUERY,
            );
            assert!(operation.is_empty());
        }
    }

    #[test]
    fn test_missing_or_blank_access_token_does_not_classify() {
        let path = "/wopi/files/report.docx%7C1.0";

        assert!(WopiRequestFactory::classify("GET", path, None).is_empty());
        assert!(WopiRequestFactory::classify("GET", path, Some("")).is_empty());
        assert!(WopiRequestFactory::classify("GET", path, Some("other=1")).is_empty());
        assert!(WopiRequestFactory::classify("GET", path, Some("access_token=")).is_empty());
        assert!(
            WopiRequestFactory::classify("GET", path, Some("access_token=%20%20")).is_empty(),
            "a whitespace-only token should not classify"
        );
    }

    #[test]
    fn test_known_invalid_access_token_is_discarded_after_construction() {
        let operation = WopiRequestFactory::classify(
            "GET",
            "/wopi/files/report.docx%7C1.0",
            Some("access_token=%3Cinvalid-access-token%3E"),
        );

        assert!(operation.is_empty());
    }

    #[test]
    fn test_access_token_is_percent_decoded() {
        let operation = WopiRequestFactory::classify(
            "GET",
            "/wopi/files/report.docx%7C1.0",
            Some("access_token=a%2Bb%3D%3D"),
        );

        assert_eq!(operation.access_token(), Some("a+b=="));
    }

    #[test]
    fn test_bare_file_name_classifies_with_the_default_version() {
        let operation = WopiRequestFactory::classify("GET", "/wopi/files/report.docx", QUERY);

        let WopiOperation::CheckFileInfo { file, .. } = operation else {
            panic!("expected check file info, got {operation:?}");
        };

        assert_eq!(file.name(), "report.docx");
        assert_eq!(file.version(), "1.0");
    }

    #[test]
    fn test_bare_file_name_contents_classifies_with_the_default_version() {
        let operation =
            WopiRequestFactory::classify("GET", "/wopi/files/report.docx/contents", QUERY);

        let WopiOperation::GetFile { file, .. } = operation else {
            panic!("expected get file, got {operation:?}");
        };

        assert_eq!(file.id(), "report.docx|1.0");
    }

    #[test]
    fn test_malformed_file_ids_do_not_classify() {
        for id in ["%7Cversion-only", "name-only%7C", "a%7Cb%7Cc", "%20%20"] {
            let path = format!("/wopi/files/{id}");
            let operation = WopiRequestFactory::classify("GET", &path, QUERY);
            assert!(operation.is_empty(), "id {id:?} should not classify");
        }

        assert!(WopiRequestFactory::classify("GET", "/wopi/files/", QUERY).is_empty());
        assert!(WopiRequestFactory::classify("GET", "/wopi/files", QUERY).is_empty());
    }

    #[test]
    fn test_file_name_may_contain_spaces() {
        let operation = WopiRequestFactory::classify(
            "GET",
            "/wopi/files/Annual%20Report.docx%7C2.0",
            QUERY,
        );

        let WopiOperation::CheckFileInfo { file, .. } = operation else {
            panic!("expected check file info, got {operation:?}");
        };

        assert_eq!(file.name(), "Annual Report.docx");
    }
}
