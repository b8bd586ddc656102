//! Proof-key verification (message assembly and signature check).
//!
//! Editing clients sign every callback with a rotating RSA key pair whose
//! public halves are published in the discovery document. This module
//! rebuilds the exact byte sequence the client signed and checks the
//! RSA PKCS#1 v1.5 SHA-256 signature against a public key delivered in the
//! Microsoft CSP `PUBLICKEYBLOB` layout.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::sha2::{Digest, Sha256};
use rsa::{BigUint, Pkcs1v15Sign, RsaPublicKey};

const BLOB_HEADER_LEN: usize = 20;
const BLOB_TYPE_PUBLIC_KEY: u8 = 0x06;
const BLOB_VERSION: u8 = 0x02;
const RSA1_MAGIC: &[u8; 4] = b"RSA1";

/// Assemble the byte sequence the editing client signs for one callback.
///
/// Three length-prefixed fields, each prefix a 4-byte big-endian length:
///
/// 1. UTF-8 bytes of the URL-encoded access token exactly as transmitted
///    in the query string
/// 2. UTF-8 bytes of the upper-cased fully-qualified request URL
/// 3. the 8-byte big-endian encoding of the `X-WOPI-Timestamp` value
///
/// Field order and byte order are part of the wire contract; any deviation
/// makes every signature check fail.
pub fn expected_proof_bytes(access_token: &str, request_url: &str, timestamp: i64) -> Vec<u8> {
    let token_bytes = access_token.as_bytes();
    let upper_url = request_url.to_uppercase();
    let url_bytes = upper_url.as_bytes();
    let timestamp_bytes = timestamp.to_be_bytes();

    let mut expected = Vec::with_capacity(12 + token_bytes.len() + url_bytes.len() + 8);
    expected.extend_from_slice(&(token_bytes.len() as u32).to_be_bytes());
    expected.extend_from_slice(token_bytes);
    expected.extend_from_slice(&(url_bytes.len() as u32).to_be_bytes());
    expected.extend_from_slice(url_bytes);
    expected.extend_from_slice(&(timestamp_bytes.len() as u32).to_be_bytes());
    expected.extend_from_slice(&timestamp_bytes);
    expected
}

/// Check a base64 signature over `expected` against a base64 CSP key blob.
///
/// Returns `false` for malformed base64, a malformed key blob, a key the
/// RSA backend rejects, or a signature that does not verify. No error
/// escapes to the caller; a failed decode counts the same as a failed
/// signature.
pub fn verify(expected: &[u8], signature_b64: &str, key_blob_b64: &str) -> bool {
    let Ok(signature) = BASE64.decode(signature_b64) else {
        return false;
    };
    let Ok(blob) = BASE64.decode(key_blob_b64) else {
        return false;
    };
    let Some(key) = public_key_from_csp_blob(&blob) else {
        return false;
    };

    let digest = Sha256::digest(expected);
    key.verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &signature)
        .is_ok()
}

/// Import an RSA public key from the Microsoft CSP `PUBLICKEYBLOB` layout.
///
/// Layout: BLOBHEADER (type `0x06`, version 2, two reserved bytes, a 4-byte
/// algorithm id), then RSAPUBKEY (`RSA1` magic, bit length, public exponent),
/// then the modulus. All integers little-endian.
fn public_key_from_csp_blob(blob: &[u8]) -> Option<RsaPublicKey> {
    if blob.len() < BLOB_HEADER_LEN {
        return None;
    }
    if blob[0] != BLOB_TYPE_PUBLIC_KEY || blob[1] != BLOB_VERSION {
        return None;
    }
    if &blob[8..12] != RSA1_MAGIC {
        return None;
    }

    let bit_len = u32::from_le_bytes([blob[12], blob[13], blob[14], blob[15]]) as usize;
    let modulus_len = bit_len / 8;
    if modulus_len == 0 || blob.len() < BLOB_HEADER_LEN + modulus_len {
        return None;
    }

    let exponent = u32::from_le_bytes([blob[16], blob[17], blob[18], blob[19]]);

    let mut modulus = blob[BLOB_HEADER_LEN..BLOB_HEADER_LEN + modulus_len].to_vec();
    modulus.reverse();

    RsaPublicKey::new(BigUint::from_bytes_be(&modulus), BigUint::from(exponent)).ok()
}
