//! Discovery document lifecycle: fetch, parse, routing, proof validation.
//!
//! The editing client publishes an XML manifest (its "discovery document")
//! enumerating the file types and actions it supports and the rotating RSA
//! public keys it signs callbacks with. This module retrieves and parses
//! that manifest, resolves editor launch URLs from its routing rows, and
//! checks callback proof headers against its keys. A single staleness bit
//! records when a proof only verified against a previous key generation, so
//! the factory knows to refetch.

use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use reqwest::header;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::error::{WopiError, WopiResult};
use crate::proof;

/// Media types accepted from the discovery endpoint.
const ACCEPTED_MEDIA_TYPES: &[&str] = &["application/xml", "text/xml"];

const WOPI_SRC_PLACEHOLDER: &str = "<WOPI_SRC=PLACEHOLDER_VALUE>";
const WOPI_SRC_OPTIONAL_PLACEHOLDER: &str = "<WOPI_SRC=PLACEHOLDER_VALUE[&]>";

/// Placeholders the host does not fill in. Removing them tells the client to
/// use its default value for that parameter.
static UNFILLED_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<\w+=PLACEHOLDER_VALUE(?:\[&\])?>").expect("placeholder pattern is valid")
});

/// Capability/trust manifest published by the editing client.
///
/// `Empty` stands for "no usable document": the endpoint is unconfigured,
/// the fetch failed, or the body did not parse. Routing and proof checks on
/// `Empty` fail with [`WopiError::EmptyDocument`] so a miswired call site
/// surfaces as a hard error instead of quietly misbehaving.
#[derive(Debug)]
pub enum DiscoveryDocument {
    Empty,
    Loaded {
        /// Endpoint the manifest was fetched from.
        source: Url,
        /// All `net-zone` &gt; `app` &gt; `action` rows, in document order.
        actions: Vec<ActionRow>,
        /// Signing keys published alongside the routing table.
        keys: ProofKeys,
        /// Set when a proof only verified against a previous key
        /// generation; a tainted document is replaced on the next request.
        tainted: AtomicBool,
    },
}

/// One routable action row from the manifest.
#[derive(Debug, Clone)]
pub struct ActionRow {
    pub app: String,
    pub name: String,
    pub ext: String,
    pub urlsrc: String,
}

/// Base64 CSP public key blobs published by the editing client. When the
/// manifest omits `oldvalue` the current key doubles as the old one.
#[derive(Debug, Clone)]
pub struct ProofKeys {
    pub current: String,
    pub old: String,
}

/// Proof header values from one inbound callback.
#[derive(Debug, Clone, Default)]
pub struct ProofHeaders {
    /// `X-WOPI-Timestamp` as transmitted.
    pub timestamp: Option<String>,
    /// `X-WOPI-Proof`: base64 signature by the client's current key.
    pub proof: Option<String>,
    /// `X-WOPI-ProofOld`: base64 signature by the client's previous key.
    pub proof_old: Option<String>,
}

impl DiscoveryDocument {
    /// Fetch and parse the manifest from `source`.
    ///
    /// Degrades to [`DiscoveryDocument::Empty`] on any failure: unreachable
    /// endpoint, non-success status, a content type other than XML, or an
    /// unusable body. The caller retries on a later request.
    pub async fn fetch(
        client: &reqwest::Client,
        source: &Url,
        cancel: &CancellationToken,
    ) -> Self {
        let request = client
            .get(source.clone())
            .header(header::ACCEPT, ACCEPTED_MEDIA_TYPES.join(", "))
            .send();

        let response = tokio::select! {
            () = cancel.cancelled() => {
                debug!(url = %source, "discovery fetch cancelled");
                return DiscoveryDocument::Empty;
            }
            result = request => match result {
                Ok(response) => response,
                Err(error) => {
                    warn!(url = %source, error = %error, "discovery endpoint unreachable");
                    return DiscoveryDocument::Empty;
                }
            },
        };

        let status = response.status();
        if !status.is_success() {
            warn!(url = %source, status = %status, "discovery endpoint returned failure status");
            return DiscoveryDocument::Empty;
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| {
                value
                    .split(';')
                    .next()
                    .unwrap_or(value)
                    .trim()
                    .to_ascii_lowercase()
            })
            .unwrap_or_default();

        if !ACCEPTED_MEDIA_TYPES.contains(&content_type.as_str()) {
            warn!(
                url = %source,
                content_type = %content_type,
                "discovery endpoint returned an unsupported content type"
            );
            return DiscoveryDocument::Empty;
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(error) => {
                warn!(url = %source, error = %error, "discovery document body could not be read");
                return DiscoveryDocument::Empty;
            }
        };

        Self::from_xml(source.clone(), &body)
    }

    /// Parse a manifest body already in hand.
    ///
    /// Returns [`DiscoveryDocument::Empty`] when the body is not XML, lacks
    /// the `wopi-discovery` root, or lacks a `proof-key` element with a
    /// `value` attribute.
    pub fn from_xml(source: Url, body: &str) -> Self {
        if !has_discovery_root(body) {
            warn!(url = %source, "discovery document is missing the wopi-discovery root");
            return DiscoveryDocument::Empty;
        }

        let manifest: DiscoveryManifest = match quick_xml::de::from_str(body) {
            Ok(manifest) => manifest,
            Err(error) => {
                warn!(url = %source, error = %error, "discovery document is not parsable");
                return DiscoveryDocument::Empty;
            }
        };

        let Some(proof_key) = manifest.proof_key else {
            warn!(url = %source, "discovery document has no proof-key element");
            return DiscoveryDocument::Empty;
        };

        let Some(current) = proof_key.value.filter(|value| !value.trim().is_empty()) else {
            warn!(url = %source, "discovery document proof-key has no value attribute");
            return DiscoveryDocument::Empty;
        };

        let old = proof_key
            .oldvalue
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| current.clone());

        let actions: Vec<ActionRow> = manifest
            .net_zones
            .into_iter()
            .flat_map(|zone| zone.apps)
            .flat_map(|app| {
                let app_name = app.name.unwrap_or_default();
                app.actions
                    .into_iter()
                    .map(move |action| (app_name.clone(), action))
            })
            .filter_map(|(app, action)| {
                Some(ActionRow {
                    app,
                    name: action.name?,
                    ext: action.ext?,
                    urlsrc: action.urlsrc?,
                })
            })
            .collect();

        debug!(url = %source, actions = actions.len(), "discovery document loaded");

        DiscoveryDocument::Loaded {
            source,
            actions,
            keys: ProofKeys { current, old },
            tainted: AtomicBool::new(false),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, DiscoveryDocument::Empty)
    }

    /// Whether a proof check flagged this document as stale.
    pub fn is_tainted(&self) -> bool {
        match self {
            DiscoveryDocument::Empty => false,
            DiscoveryDocument::Loaded { tainted, .. } => tainted.load(Ordering::Relaxed),
        }
    }

    /// Resolve the editor launch URL for a file extension and action.
    ///
    /// Scans the routing rows for a case-insensitive `ext` + action name
    /// match, applies URL-source templating, and appends `WOPISrc` pointing
    /// at `host_file_endpoint`. Returns `Ok(None)` when nothing routes: a
    /// blank extension, a missing host endpoint, or no matching row.
    pub fn endpoint_for_file_extension(
        &self,
        file_extension: &str,
        file_action: &str,
        host_file_endpoint: Option<&Url>,
    ) -> WopiResult<Option<Url>> {
        let DiscoveryDocument::Loaded {
            source, actions, ..
        } = self
        else {
            return Err(WopiError::EmptyDocument);
        };

        let extension = file_extension.trim();
        let extension = extension.strip_prefix('.').unwrap_or(extension);
        if extension.is_empty() {
            return Ok(None);
        }

        let Some(host_endpoint) = host_file_endpoint else {
            return Ok(None);
        };

        for row in actions {
            if !row.ext.eq_ignore_ascii_case(extension)
                || !row.name.eq_ignore_ascii_case(file_action)
            {
                continue;
            }

            let launch = transform_url_source(&row.urlsrc, host_endpoint.as_str());

            let Ok(mut launch_url) = Url::parse(&launch) else {
                warn!(
                    document = %source,
                    app = %row.app,
                    urlsrc = %row.urlsrc,
                    "matched action urlsrc is not an absolute url"
                );
                return Ok(None);
            };

            launch_url
                .query_pairs_mut()
                .append_pair("WOPISrc", host_endpoint.as_str());

            debug!(
                document = %source,
                app = %row.app,
                ext = %row.ext,
                action = %row.name,
                "resolved editor endpoint"
            );

            return Ok(Some(launch_url));
        }

        Ok(None)
    }

    /// Validate the proof headers attached to a callback.
    ///
    /// Rebuilds the signed message from the raw `access_token` query value,
    /// the upper-cased request URL and the `X-WOPI-Timestamp` header, then
    /// applies the key-rotation decision table, first match wins:
    ///
    /// 1. `X-WOPI-Proof` verifies against the current key: valid.
    /// 2. `X-WOPI-ProofOld` verifies against the current key: valid, and the
    ///    document is marked stale (the client already signs with a key we
    ///    have not seen).
    /// 3. `X-WOPI-Proof` verifies against the old key: valid.
    /// 4. Anything else, including a missing or unparsable timestamp and
    ///    missing proof headers: invalid, and the document is marked stale.
    pub fn verify_proof(&self, request_url: &str, headers: &ProofHeaders) -> WopiResult<bool> {
        let DiscoveryDocument::Loaded {
            source,
            keys,
            tainted,
            ..
        } = self
        else {
            return Err(WopiError::EmptyDocument);
        };

        let access_token = raw_query_value(request_url, "access_token").unwrap_or("");

        let timestamp = headers
            .timestamp
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok());

        debug!(
            document = %source,
            url = %request_url,
            timestamp = ?timestamp,
            has_proof = headers.proof.is_some(),
            has_proof_old = headers.proof_old.is_some(),
            "checking callback proof"
        );

        if let Some(timestamp) = timestamp {
            let expected = proof::expected_proof_bytes(access_token, request_url, timestamp);
            let given = headers.proof.as_deref().map(str::trim);
            let given_old = headers.proof_old.as_deref().map(str::trim);

            if let Some(given) = given {
                if proof::verify(&expected, given, &keys.current) {
                    return Ok(true);
                }
            }

            if let Some(given_old) = given_old {
                if proof::verify(&expected, given_old, &keys.current) {
                    debug!(
                        document = %source,
                        "proof verified with previous proof header; marking document stale"
                    );
                    tainted.store(true, Ordering::Relaxed);
                    return Ok(true);
                }
            }

            if let Some(given) = given {
                if proof::verify(&expected, given, &keys.old) {
                    return Ok(true);
                }
            }
        }

        tainted.store(true, Ordering::Relaxed);
        warn!(document = %source, url = %request_url, "callback proof failed validation");
        Ok(false)
    }
}

/// Substitute `WOPI_SRC` placeholders in an action `urlsrc`, drop every
/// other placeholder, and trim a single dangling `&`. A trailing `?` is
/// load-bearing for some clients and stays.
fn transform_url_source(urlsrc: &str, wopi_src: &str) -> String {
    let filled = urlsrc
        .replace(
            WOPI_SRC_OPTIONAL_PLACEHOLDER,
            &format!("WOPI_SRC={wopi_src}&"),
        )
        .replace(WOPI_SRC_PLACEHOLDER, &format!("WOPI_SRC={wopi_src}"));

    let cleaned = UNFILLED_PLACEHOLDER.replace_all(&filled, "");
    let cleaned: &str = cleaned.strip_suffix('&').unwrap_or(&cleaned);
    cleaned.to_string()
}

/// Whether the first element in `body` is the `wopi-discovery` root.
fn has_discovery_root(body: &str) -> bool {
    let mut reader = Reader::from_str(body);
    loop {
        match reader.read_event() {
            Ok(Event::Start(element) | Event::Empty(element)) => {
                return element.name().as_ref() == b"wopi-discovery";
            }
            Ok(Event::Eof) | Err(_) => return false,
            Ok(_) => {}
        }
    }
}

/// Raw (still percent-encoded) value of a query parameter, exactly as it
/// appears in the transmitted URL.
fn raw_query_value<'a>(url: &'a str, name: &str) -> Option<&'a str> {
    let url = url.split_once('#').map_or(url, |(head, _)| head);
    let (_, query) = url.split_once('?')?;

    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        (key == name).then_some(value)
    })
}

#[derive(Debug, Deserialize)]
struct DiscoveryManifest {
    #[serde(rename = "net-zone", default)]
    net_zones: Vec<NetZoneElement>,
    #[serde(rename = "proof-key")]
    proof_key: Option<ProofKeyElement>,
}

#[derive(Debug, Deserialize)]
struct NetZoneElement {
    #[serde(rename = "app", default)]
    apps: Vec<AppElement>,
}

#[derive(Debug, Deserialize)]
struct AppElement {
    #[serde(rename = "@name")]
    name: Option<String>,
    #[serde(rename = "action", default)]
    actions: Vec<ActionElement>,
}

#[derive(Debug, Deserialize)]
struct ActionElement {
    #[serde(rename = "@name")]
    name: Option<String>,
    #[serde(rename = "@ext")]
    ext: Option<String>,
    #[serde(rename = "@urlsrc")]
    urlsrc: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProofKeyElement {
    #[serde(rename = "@value")]
    value: Option<String>,
    #[serde(rename = "@oldvalue")]
    oldvalue: Option<String>,
}
