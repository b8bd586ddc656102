//! The axum router and request handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{OriginalUri, Query, State};
use axum::http::header::{CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;
use wopi_host::{
    File, OperationContext, ProofHeaders, WopiError, WopiRequestFactory, WopiResponse,
};

use crate::error::ApiError;
use crate::state::AppState;

const ITEM_VERSION_HEADER: HeaderName = HeaderName::from_static("x-wopi-itemversion");
const TIMESTAMP_HEADER: HeaderName = HeaderName::from_static("x-wopi-timestamp");
const PROOF_HEADER: HeaderName = HeaderName::from_static("x-wopi-proof");
const PROOF_OLD_HEADER: HeaderName = HeaderName::from_static("x-wopi-proofold");
const FORWARDED_PROTO_HEADER: HeaderName = HeaderName::from_static("x-forwarded-proto");

const LAUNCH_ACTION_DEFAULT: &str = "view";

/// Build the router for one server process.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/wopi/health-check", get(health_check))
        .route("/wopi/launch", get(launch))
        .route("/wopi/files/{*path}", any(dispatch))
        .route("/wopi/folders/{*path}", any(dispatch))
        .with_state(state)
}

/// Liveness probe.
async fn health_check() -> String {
    format!(
        "OK as of {}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// One WOPI file or folder request: classify, enforce callback proof, handle.
async fn dispatch(
    State(state): State<Arc<AppState>>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (cancel, _cancel_on_drop) = request_cancellation();

    let operation = WopiRequestFactory::classify(method.as_str(), uri.path(), uri.query());
    if operation.is_empty() {
        debug!(method = %method, uri = %uri, "request did not classify to a wopi operation");
        return StatusCode::NOT_FOUND.into_response();
    }

    if let Some(response) = enforce_proof(&state, &uri, &headers, &cancel).await {
        return response;
    }

    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let context = OperationContext {
        repository: state.repository.as_ref(),
        features: &state.config.features,
        brand_name: &state.config.brand_name,
        body: &body,
        content_type,
    };

    match operation.handle(&context, &cancel).await {
        Ok(response) => wopi_response(response),
        Err(err) => ApiError(err).into_response(),
    }
}

/// Verify callback proof headers when the request carries them.
///
/// Requests without an `X-WOPI-Proof` header pass through with a warning:
/// local clients do not always sign, and present-but-invalid is the attack
/// case the protocol defends against. Returns the rejection response when
/// the request must not proceed.
async fn enforce_proof(
    state: &AppState,
    uri: &Uri,
    headers: &HeaderMap,
    cancel: &CancellationToken,
) -> Option<Response> {
    let proof = header_value(headers, &PROOF_HEADER);
    if proof.is_none() {
        warn!(uri = %uri, "request carries no proof header; accepting unsigned callback");
        return None;
    }

    let document = state.discovery.create_document(cancel).await;
    if document.is_empty() {
        warn!(uri = %uri, "no discovery document available; cannot verify callback proof");
        return None;
    }

    let proof_headers = ProofHeaders {
        timestamp: header_value(headers, &TIMESTAMP_HEADER),
        proof,
        proof_old: header_value(headers, &PROOF_OLD_HEADER),
    };

    let fallback_scheme = state
        .config
        .host_files_endpoint
        .as_ref()
        .map(Url::scheme)
        .unwrap_or("http");
    let url = request_url(uri, headers, fallback_scheme);

    match document.verify_proof(&url, &proof_headers) {
        Ok(true) => None,
        Ok(false) => Some(
            (StatusCode::UNAUTHORIZED, "callback proof failed validation").into_response(),
        ),
        Err(err) => Some(ApiError(err).into_response()),
    }
}

/// The fully-qualified URL the client signed, reconstructed from the Host
/// header and the request target.
///
/// The scheme comes from `X-Forwarded-Proto` when a reverse proxy set it.
/// Otherwise the caller supplies the scheme this host is published under.
fn request_url(uri: &Uri, headers: &HeaderMap, fallback_scheme: &str) -> String {
    let scheme = headers
        .get(FORWARDED_PROTO_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(fallback_scheme);
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{scheme}://{host}{uri}")
}

/// A token cancelled when the request handler is dropped, so repository and
/// discovery work stops when the client goes away.
fn request_cancellation() -> (CancellationToken, DropGuard) {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    (token, guard)
}

fn header_value(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Map a handled operation onto HTTP.
fn wopi_response(response: WopiResponse) -> Response {
    let item_version = response.item_version().to_string();

    let mut http_response = match response {
        WopiResponse::CheckFileInfo { payload, .. } => Json(payload).into_response(),
        WopiResponse::FileContent {
            content_type,
            content,
            ..
        } => {
            let mut http_response = content.into_response();
            if let Ok(value) = HeaderValue::from_str(&content_type) {
                http_response.headers_mut().insert(CONTENT_TYPE, value);
            }
            http_response
        }
        WopiResponse::Saved { .. } => StatusCode::OK.into_response(),
    };

    if let Ok(value) = HeaderValue::from_str(&item_version) {
        http_response.headers_mut().insert(ITEM_VERSION_HEADER, value);
    }

    http_response
}

#[derive(Debug, Deserialize)]
struct LaunchQuery {
    file_id: Option<String>,
    action: Option<String>,
}

#[derive(Debug, Serialize)]
struct LaunchResponse {
    editor_endpoint: String,
    access_token: String,
    file_id: String,
}

/// Resolve an editor launch URL for a file.
///
/// Routes the file's extension and the requested action through the
/// discovery document, with `WOPISrc` pointing at this host's file endpoint
/// for that id, and mints an access token for the editor to present back.
async fn launch(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LaunchQuery>,
) -> Response {
    let (cancel, _cancel_on_drop) = request_cancellation();

    let Some(file) = query.file_id.as_deref().and_then(File::parse_id) else {
        return (StatusCode::BAD_REQUEST, "file_id must be name|version").into_response();
    };

    let Some(extension) = file.name().rsplit_once('.').map(|(_, ext)| ext.to_string()) else {
        return (StatusCode::BAD_REQUEST, "file name has no extension").into_response();
    };

    let Some(host_file_endpoint) = host_file_endpoint(&state, &file.id()) else {
        return ApiError(WopiError::Config {
            message: "no host files endpoint is configured".to_string(),
        })
        .into_response();
    };

    let document = state.discovery.create_document(&cancel).await;
    if document.is_empty() {
        return (
            StatusCode::BAD_GATEWAY,
            "no discovery document is available",
        )
            .into_response();
    }

    let action = query.action.as_deref().unwrap_or(LAUNCH_ACTION_DEFAULT);
    let resolved =
        document.endpoint_for_file_extension(&extension, action, Some(&host_file_endpoint));

    match resolved {
        Ok(Some(editor_endpoint)) => {
            // uuid pending a real token service
            let access_token = Uuid::new_v4().simple().to_string();

            Json(LaunchResponse {
                editor_endpoint: editor_endpoint.into(),
                access_token,
                file_id: file.id(),
            })
            .into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            format!("no editor action {action:?} for extension {extension:?}"),
        )
            .into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

/// `WOPISrc` for one file: the configured files endpoint plus the encoded id.
fn host_file_endpoint(state: &AppState, file_id: &str) -> Option<Url> {
    let mut endpoint = state.config.host_files_endpoint.clone()?;
    endpoint.path_segments_mut().ok()?.pop_if_empty().push(file_id);
    Some(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(pairs: &[(&HeaderName, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert((*name).clone(), HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn test_request_url_uses_the_fallback_scheme() {
        let uri: Uri = "/wopi/files/a%7C1.0?access_token=t".parse().unwrap();
        let headers = headers_with(&[(&HOST, "files.example.net")]);

        assert_eq!(
            request_url(&uri, &headers, "https"),
            "https://files.example.net/wopi/files/a%7C1.0?access_token=t"
        );
    }

    #[test]
    fn test_request_url_prefers_the_forwarded_proto_header() {
        let uri: Uri = "/wopi/files/a%7C1.0".parse().unwrap();
        let headers = headers_with(&[
            (&HOST, "files.example.net"),
            (&FORWARDED_PROTO_HEADER, "https"),
        ]);

        assert_eq!(
            request_url(&uri, &headers, "http"),
            "https://files.example.net/wopi/files/a%7C1.0"
        );
    }

    #[test]
    fn test_request_url_without_a_host_header_falls_back_to_localhost() {
        let uri: Uri = "/wopi/health-check".parse().unwrap();

        assert_eq!(
            request_url(&uri, &HeaderMap::new(), "http"),
            "http://localhost/wopi/health-check"
        );
    }

    #[test]
    fn test_request_cancellation_fires_when_the_guard_drops() {
        let (token, guard) = request_cancellation();

        assert!(!token.is_cancelled());
        drop(guard);
        assert!(token.is_cancelled());
    }
}
