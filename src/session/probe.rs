//! "Has session cookie" probe.
//!
//! Parses the raw `Cookie` request header on its own, without going through the
//! cookie jar, and records what it found for the session cookie and its
//! signature. Values are percent-decoded the same way the jar encodes them.
//! The reconciler uses it as the last cookie-based reading.

use super::{CookieDecodeError, SessionCookieConfig, SessionState};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::COOKIE},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tower_cookies::Cookie;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HasSessionCookie {
    value: Option<String>,
    signature: Option<String>,
}

impl HasSessionCookie {
    /// Look for the session cookie pair in the request headers.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap, config: &SessionCookieConfig) -> Self {
        let signature_name = config.signature_name();
        let mut probe = Self::default();

        let cookies = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|header| header.to_str().ok())
            .flat_map(Cookie::split_parse_encoded)
            .filter_map(Result::ok);

        for cookie in cookies {
            if probe.value.is_none() && cookie.name() == config.name() {
                probe.value = Some(cookie.value().to_string());
            } else if probe.signature.is_none() && cookie.name() == signature_name {
                probe.signature = Some(cookie.value().to_string());
            }
        }

        probe
    }

    /// Decode the probed cookie into a session state.
    ///
    /// # Errors
    /// Returns a [`CookieDecodeError`] when the cookie is present but unusable.
    pub fn session_state(
        &self,
        config: &SessionCookieConfig,
    ) -> Result<Option<SessionState>, CookieDecodeError> {
        let Some(value) = self.value.as_deref() else {
            return Ok(None);
        };
        let payload = config.open(value, self.signature.as_deref())?;
        SessionState::from_payload(&payload).map(Some)
    }
}

/// Middleware attaching a [`HasSessionCookie`] to every request.
pub async fn has_session_cookie(
    State(config): State<Arc<SessionCookieConfig>>,
    mut request: Request,
    next: Next,
) -> Response {
    let probe = HasSessionCookie::from_headers(request.headers(), &config);
    request.extensions_mut().insert(probe);
    next.run(request).await
}
