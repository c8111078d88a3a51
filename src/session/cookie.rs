//! Signed session cookie.
//!
//! The cookie value is base64(JSON) of an object whose `sessionState` member
//! holds the serialized [`SessionState`]. A companion `<name>.sig` cookie holds
//! an HMAC-SHA256 of `<name>=<value>`. The first configured key signs; every
//! configured key verifies, so keys can be rotated without logging users out.

use super::{CookieDecodeError, SessionState, decode_payload, encode_payload};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use sha2::Sha256;
use std::sync::Arc;
use tower_cookies::{Cookie, Cookies, cookie::ParseError};
use tracing::{debug, error};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_SUFFIX: &str = ".sig";

#[derive(Clone)]
pub struct SessionCookieConfig {
    name: String,
    keys: Vec<SecretString>,
    max_age_seconds: i64,
    secure: bool,
}

impl SessionCookieConfig {
    #[must_use]
    pub fn new(name: String, keys: Vec<SecretString>) -> Self {
        Self {
            name,
            keys,
            max_age_seconds: 86_400,
            secure: false,
        }
    }

    #[must_use]
    pub const fn with_max_age_seconds(mut self, seconds: i64) -> Self {
        self.max_age_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn signature_name(&self) -> String {
        format!("{}{SIGNATURE_SUFFIX}", self.name)
    }

    #[must_use]
    pub const fn max_age_seconds(&self) -> i64 {
        self.max_age_seconds
    }

    #[must_use]
    pub const fn secure(&self) -> bool {
        self.secure
    }

    /// Sign `<name>=<value>` with the first session key.
    #[must_use]
    pub fn sign(&self, value: &str) -> Option<String> {
        let mut mac = self.keys.first().and_then(mac_for)?;
        mac.update(self.signed_content(value).as_bytes());
        Some(Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes()))
    }

    /// Check a signature against every session key.
    #[must_use]
    pub fn verify(&self, value: &str, signature: &str) -> bool {
        let Ok(expected) = Base64UrlUnpadded::decode_vec(signature.trim()) else {
            return false;
        };
        let content = self.signed_content(value);
        self.keys.iter().filter_map(mac_for).any(|mut mac| {
            mac.update(content.as_bytes());
            mac.verify_slice(&expected).is_ok()
        })
    }

    /// Verify and decode a raw cookie value and its signature.
    ///
    /// # Errors
    /// Returns a [`CookieDecodeError`] if the signature is missing or wrong, or the value does not decode.
    pub fn open(
        &self,
        value: &str,
        signature: Option<&str>,
    ) -> Result<Map<String, Value>, CookieDecodeError> {
        let signature = signature.ok_or(CookieDecodeError::MissingSignature)?;
        if !self.verify(value, signature) {
            return Err(CookieDecodeError::Signature);
        }
        decode_payload(value)
    }

    /// Read the session cookie straight from the jar.
    ///
    /// `Ok(None)` means the browser sent no session cookie at all.
    ///
    /// # Errors
    /// Returns a [`CookieDecodeError`] when a cookie is present but unusable.
    pub fn read(&self, cookies: &Cookies) -> Result<Option<Map<String, Value>>, CookieDecodeError> {
        let Some(value) = cookies.get(&self.name) else {
            return Ok(None);
        };
        let signature = cookies.get(&self.signature_name());
        self.open(value.value(), signature.as_ref().map(|cookie| cookie.value()))
            .map(Some)
    }

    fn signed_content(&self, value: &str) -> String {
        format!("{}={value}", self.name)
    }

    fn build_cookie(&self, name: &str, value: &str) -> Result<Cookie<'static>, ParseError> {
        let max_age = self.max_age_seconds;
        let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
        // Only mark cookies secure when the frontend is served over HTTPS.
        if self.secure {
            cookie.push_str("; Secure");
        }
        Cookie::parse(cookie)
    }
}

impl std::fmt::Debug for SessionCookieConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCookieConfig")
            .field("name", &self.name)
            .field("keys", &format_args!("[*** x{}]", self.keys.len()))
            .field("max_age_seconds", &self.max_age_seconds)
            .field("secure", &self.secure)
            .finish()
    }
}

fn mac_for(key: &SecretString) -> Option<HmacSha256> {
    HmacSha256::new_from_slice(key.expose_secret().as_bytes()).ok()
}

/// Request-scoped session object populated from the verified cookie.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CookieSession {
    payload: Map<String, Value>,
}

impl CookieSession {
    #[must_use]
    pub const fn from_payload(payload: Map<String, Value>) -> Self {
        Self { payload }
    }

    #[must_use]
    pub const fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// The session state member, if the cookie carried one.
    ///
    /// # Errors
    /// Returns [`CookieDecodeError::Json`] if the member has the wrong shape.
    pub fn session_state(&self) -> Result<Option<SessionState>, CookieDecodeError> {
        match self.payload.get(super::SESSION_STATE_KEY) {
            Some(value) if !value.is_null() => SessionState::from_payload(&self.payload).map(Some),
            _ => Ok(None),
        }
    }

    /// New session object carrying `state`, other payload members untouched.
    ///
    /// # Errors
    /// Returns an error if the state cannot be serialized.
    pub fn with_session_state(&self, state: &SessionState) -> Result<Self, serde_json::Error> {
        let mut payload = self.payload.clone();
        payload.extend(state.to_payload()?);
        Ok(Self { payload })
    }
}

/// Response extension asking the cookie middleware to persist a new state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistSession(pub SessionState);

/// Cookie middleware: exposes the verified cookie as a [`CookieSession`] and
/// writes the cookie back when a handler returns [`PersistSession`].
pub async fn session_cookie(
    State(config): State<Arc<SessionCookieConfig>>,
    cookies: Cookies,
    mut request: Request,
    next: Next,
) -> Response {
    let session = match config.read(&cookies) {
        Ok(Some(payload)) => CookieSession::from_payload(payload),
        Ok(None) => CookieSession::default(),
        Err(err) => {
            debug!("Ignoring session cookie: {err}");
            CookieSession::default()
        }
    };
    request.extensions_mut().insert(session.clone());

    let mut response = next.run(request).await;

    if let Some(PersistSession(state)) = response.extensions_mut().remove::<PersistSession>() {
        if let Err(err) = persist(&config, &cookies, &session, &state) {
            error!("Failed to persist session cookie: {err}");
        }
    }

    response
}

fn persist(
    config: &SessionCookieConfig,
    cookies: &Cookies,
    session: &CookieSession,
    state: &SessionState,
) -> anyhow::Result<()> {
    let session = session.with_session_state(state)?;
    let value = encode_payload(session.payload())?;
    let signature = config
        .sign(&value)
        .ok_or_else(|| anyhow::anyhow!("no usable session key to sign the cookie"))?;

    cookies.add(config.build_cookie(config.name(), &value)?);
    cookies.add(config.build_cookie(&config.signature_name(), &signature)?);
    debug!(
        authenticated = state.authenticated(),
        "Session cookie written"
    );

    Ok(())
}
