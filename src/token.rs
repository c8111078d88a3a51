//! Best-effort decoding of three-segment bearer tokens.
//!
//! This is not validation: signatures are never checked. It only exposes the
//! JSON segments (typically header and claims) so the gateway can derive a
//! display name for the session subject.

use base64ct::{Base64Unpadded, Base64UrlUnpadded, Encoding};
use serde_json::Value;
use thiserror::Error;

const SEGMENTS: usize = 3;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("malformed credential: expected {SEGMENTS} dot-separated segments, found {found}")]
pub struct MalformedCredential {
    pub found: usize,
}

/// Decode every segment of a `header.payload.signature` token.
///
/// Segments that are not base64 encoded JSON are skipped, so the result holds
/// between zero and three values in their original order.
///
/// # Errors
/// Returns [`MalformedCredential`] when the token does not have exactly three segments.
pub fn decode_bearer_token(token: &str) -> Result<Vec<Value>, MalformedCredential> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != SEGMENTS {
        return Err(MalformedCredential {
            found: segments.len(),
        });
    }

    Ok(segments.into_iter().filter_map(decode_segment).collect())
}

/// Check the three-segment shape without decoding anything.
#[must_use]
pub fn is_well_formed(token: &str) -> bool {
    token.split('.').count() == SEGMENTS
}

fn decode_segment(segment: &str) -> Option<Value> {
    let bytes = decode_base64_lenient(segment)?;
    let text = String::from_utf8(bytes).ok()?;
    serde_json::from_str(&text).ok()
}

/// Accept both the standard and URL-safe alphabets, with or without padding.
pub(crate) fn decode_base64_lenient(input: &str) -> Option<Vec<u8>> {
    let trimmed = input.trim().trim_end_matches('=');
    if trimmed.contains(['+', '/']) {
        Base64Unpadded::decode_vec(trimmed).ok()
    } else {
        Base64UrlUnpadded::decode_vec(trimmed).ok()
    }
}

/// Pick a human readable name out of a decoded claims object.
#[must_use]
pub fn display_name_claim(claims: &Value) -> Option<&str> {
    ["name", "preferred_username", "email", "sub"]
        .iter()
        .find_map(|key| claims.get(key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|name| !name.is_empty())
}
