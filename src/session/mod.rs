//! Session state carried in the browser cookie.
//!
//! [`SessionState`] is a value type: every update returns a new value, so the
//! state observed by one stage of a request can never be changed behind its back
//! by another stage or another request.

pub mod cookie;
pub mod probe;
pub mod reconcile;

use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use cookie::{CookieSession, PersistSession, SessionCookieConfig};
pub use probe::HasSessionCookie;
pub use reconcile::{Candidate, Reconciliation, reconcile};

pub const DEFAULT_DISPLAY_NAME: &str = "Anonymous";
pub const DEFAULT_LOCALE: &str = "en-US";
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Member of the cookie payload holding the serialized [`SessionState`].
pub const SESSION_STATE_KEY: &str = "sessionState";

/// Why a candidate reading of the session cookie produced nothing usable.
#[derive(Debug, Error)]
pub enum CookieDecodeError {
    #[error("cookie value is not valid base64")]
    Base64,
    #[error("cookie value is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("cookie value is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cookie payload is not a JSON object")]
    NotAnObject,
    #[error("signature cookie is missing")]
    MissingSignature,
    #[error("signature does not match any session key")]
    Signature,
}

/// Identity payload shown to the frontend. Unknown members are kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    #[serde(default = "default_display_name")]
    pub display_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Subject {
    #[must_use]
    pub fn named(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            extra: Map::new(),
        }
    }
}

impl Default for Subject {
    fn default() -> Self {
        Self::named(DEFAULT_DISPLAY_NAME)
    }
}

/// Authoritative per-visitor session record.
///
/// A non-empty credential always implies `authenticated`; decoding enforces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "WireSessionState")]
pub struct SessionState {
    authenticated: bool,
    subject: Subject,
    credential: String,
    locale: String,
    timezone: String,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            authenticated: false,
            subject: Subject::default(),
            credential: String::new(),
            locale: DEFAULT_LOCALE.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }
}

impl SessionState {
    #[must_use]
    pub const fn authenticated(&self) -> bool {
        self.authenticated
    }

    #[must_use]
    pub const fn subject(&self) -> &Subject {
        &self.subject
    }

    #[must_use]
    pub fn credential(&self) -> &str {
        &self.credential
    }

    /// The credential, if there is one worth forwarding.
    #[must_use]
    pub fn bearer(&self) -> Option<&str> {
        Some(self.credential.as_str()).filter(|credential| !credential.trim().is_empty())
    }

    #[must_use]
    pub fn locale(&self) -> &str {
        &self.locale
    }

    #[must_use]
    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    /// Build the authenticated state that follows an accepted recovery.
    #[must_use]
    pub fn recovered(
        &self,
        credential: String,
        subject: Subject,
        locale: Option<String>,
        timezone: Option<String>,
    ) -> Self {
        Self {
            authenticated: true,
            subject,
            credential,
            locale: locale.unwrap_or_else(|| self.locale.clone()),
            timezone: timezone.unwrap_or_else(|| self.timezone.clone()),
        }
    }

    /// Copy of this state with the credential blanked, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        Self {
            credential: String::new(),
            ..self.clone()
        }
    }

    /// Read a state from a decoded cookie payload object.
    ///
    /// A payload without a `sessionState` member reads as the default state.
    ///
    /// # Errors
    /// Returns [`CookieDecodeError::Json`] if the member does not have the expected shape.
    pub fn from_payload(payload: &Map<String, Value>) -> Result<Self, CookieDecodeError> {
        match payload.get(SESSION_STATE_KEY) {
            Some(value) if !value.is_null() => Ok(Self::deserialize(value)?),
            _ => Ok(Self::default()),
        }
    }

    /// Wrap the state in the object stored in the cookie.
    ///
    /// # Errors
    /// Returns an error if the state cannot be represented as JSON.
    pub fn to_payload(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let mut payload = Map::new();
        payload.insert(SESSION_STATE_KEY.to_string(), serde_json::to_value(self)?);
        Ok(payload)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireSessionState {
    authenticated: bool,
    subject: Subject,
    credential: String,
    locale: String,
    timezone: String,
}

impl Default for WireSessionState {
    fn default() -> Self {
        let state = SessionState::default();
        Self {
            authenticated: state.authenticated,
            subject: state.subject,
            credential: state.credential,
            locale: state.locale,
            timezone: state.timezone,
        }
    }
}

impl From<WireSessionState> for SessionState {
    fn from(wire: WireSessionState) -> Self {
        Self {
            authenticated: wire.authenticated || !wire.credential.is_empty(),
            subject: wire.subject,
            credential: wire.credential,
            locale: wire.locale,
            timezone: wire.timezone,
        }
    }
}

fn default_display_name() -> String {
    DEFAULT_DISPLAY_NAME.to_string()
}

/// Encode a cookie payload object as base64(JSON).
///
/// # Errors
/// Returns an error if the payload cannot be serialized.
pub fn encode_payload(payload: &Map<String, Value>) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(payload)?;
    Ok(Base64::encode_string(json.as_bytes()))
}

/// Decode a raw cookie value: base64, then UTF-8, then a JSON object.
///
/// # Errors
/// Returns the first step that failed as a [`CookieDecodeError`].
pub fn decode_payload(raw: &str) -> Result<Map<String, Value>, CookieDecodeError> {
    let bytes = crate::token::decode_base64_lenient(raw).ok_or(CookieDecodeError::Base64)?;
    let text = String::from_utf8(bytes)?;
    match serde_json::from_str::<Value>(&text)? {
        Value::Object(payload) => Ok(payload),
        _ => Err(CookieDecodeError::NotAnObject),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn signed_in() -> SessionState {
        let mut subject = Subject::named("Ada");
        subject.extra.insert("sub".to_string(), json!("1234"));
        SessionState::default().recovered(
            "h.p.s".to_string(),
            subject,
            Some("fr-CA".to_string()),
            Some("America/Montreal".to_string()),
        )
    }

    #[test]
    fn default_state_is_anonymous() {
        let state = SessionState::default();
        assert!(!state.authenticated());
        assert_eq!(state.credential(), "");
        assert_eq!(state.bearer(), None);
        assert_eq!(state.subject().display_name, "Anonymous");
        assert_eq!(state.locale(), "en-US");
        assert_eq!(state.timezone(), "UTC");
    }

    #[test]
    fn wire_format_is_camel_case() {
        let value = serde_json::to_value(signed_in()).unwrap();
        assert_eq!(
            value,
            json!({
                "authenticated": true,
                "subject": {"displayName": "Ada", "sub": "1234"},
                "credential": "h.p.s",
                "locale": "fr-CA",
                "timezone": "America/Montreal",
            })
        );
    }

    #[test]
    fn cookie_round_trip_preserves_every_field() {
        let state = signed_in();
        let raw = encode_payload(&state.to_payload().unwrap()).unwrap();
        let decoded = SessionState::from_payload(&decode_payload(&raw).unwrap()).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn missing_members_take_defaults() {
        let state: SessionState = serde_json::from_value(json!({})).unwrap();
        assert_eq!(state, SessionState::default());

        let state: SessionState =
            serde_json::from_value(json!({"subject": {"avatar": "x.png"}})).unwrap();
        assert_eq!(state.subject().display_name, "Anonymous");
        assert_eq!(state.subject().extra.get("avatar"), Some(&json!("x.png")));
    }

    #[test]
    fn credential_implies_authenticated() {
        let state: SessionState =
            serde_json::from_value(json!({"authenticated": false, "credential": "a.b.c"}))
                .unwrap();
        assert!(state.authenticated());
        assert_eq!(state.bearer(), Some("a.b.c"));
    }

    #[test]
    fn recovered_keeps_previous_preferences_when_not_given() {
        let previous = signed_in();
        let next = previous.recovered("x.y.z".to_string(), Subject::named("Bob"), None, None);
        assert_eq!(next.locale(), "fr-CA");
        assert_eq!(next.timezone(), "America/Montreal");
        assert_eq!(previous.credential(), "h.p.s");
    }

    #[test]
    fn payload_without_session_state_reads_as_default() {
        let payload = decode_payload(&Base64::encode_string(br#"{"other":1}"#)).unwrap();
        assert_eq!(
            SessionState::from_payload(&payload).unwrap(),
            SessionState::default()
        );
    }

    #[test]
    fn decode_payload_reports_the_failing_step() {
        assert!(matches!(decode_payload("***"), Err(CookieDecodeError::Base64)));
        assert!(matches!(
            decode_payload(&Base64::encode_string(&[0xff, 0xfe])),
            Err(CookieDecodeError::Utf8(_))
        ));
        assert!(matches!(
            decode_payload(&Base64::encode_string(b"not json")),
            Err(CookieDecodeError::Json(_))
        ));
        assert!(matches!(
            decode_payload(&Base64::encode_string(b"[1,2]")),
            Err(CookieDecodeError::NotAnObject)
        ));
    }

    #[test]
    fn redacted_drops_only_the_credential() {
        let state = signed_in().redacted();
        assert_eq!(state.credential(), "");
        assert!(state.authenticated());
        assert_eq!(state.subject().display_name, "Ada");
    }
}
