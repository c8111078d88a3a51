//! Per-request session reconciliation.
//!
//! Priority, first usable reading wins:
//! 1. the cookie middleware's session object,
//! 2. the session cookie read straight from the jar,
//! 3. the session-cookie probe,
//! 4. the state already attached to the request, or the default state.
//!
//! Readings are plain values; a failed reading is recorded and skipped, never
//! propagated.

use super::{
    CookieDecodeError, CookieSession, HasSessionCookie, SessionCookieConfig, SessionState,
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tower_cookies::Cookies;
use tracing::{debug, warn};

/// Outcome of one attempt at reading the session: absent, present, or broken.
pub type Reading = Result<Option<SessionState>, CookieDecodeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    SessionObject,
    RawCookie,
    CookieProbe,
    WorkingContext,
    Default,
}

impl Candidate {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SessionObject => "session-object",
            Self::RawCookie => "raw-cookie",
            Self::CookieProbe => "cookie-probe",
            Self::WorkingContext => "working-context",
            Self::Default => "default",
        }
    }
}

#[derive(Debug)]
pub struct Reconciliation {
    pub state: SessionState,
    pub source: Candidate,
    pub failures: Vec<(Candidate, CookieDecodeError)>,
}

/// Pick the authoritative state out of the three readings.
#[must_use]
pub fn reconcile(
    session_object: Reading,
    raw_cookie: Reading,
    probe: Reading,
    working: Option<SessionState>,
) -> Reconciliation {
    let mut failures = Vec::new();
    let mut winner = None;

    for (candidate, reading) in [
        (Candidate::SessionObject, session_object),
        (Candidate::RawCookie, raw_cookie),
        (Candidate::CookieProbe, probe),
    ] {
        match reading {
            Ok(Some(state)) if winner.is_none() => winner = Some((state, candidate)),
            Ok(_) => {}
            Err(err) => failures.push((candidate, err)),
        }
    }

    let (state, source) = winner.unwrap_or_else(|| match working {
        Some(state) => (state, Candidate::WorkingContext),
        None => (SessionState::default(), Candidate::Default),
    });

    Reconciliation {
        state,
        source,
        failures,
    }
}

/// Middleware running [`reconcile`] and handing the result to the rest of the request.
///
/// The winning state is inserted as a `SessionState` request extension.
pub async fn reconcile_session(
    State(config): State<Arc<SessionCookieConfig>>,
    cookies: Cookies,
    mut request: Request,
    next: Next,
) -> Response {
    let extensions = request.extensions();

    let session_object = extensions
        .get::<CookieSession>()
        .map_or(Ok(None), CookieSession::session_state);
    let raw_cookie = config.read(&cookies).and_then(|payload| {
        payload
            .as_ref()
            .map(SessionState::from_payload)
            .transpose()
    });
    let probe = extensions
        .get::<HasSessionCookie>()
        .map_or(Ok(None), |probe| probe.session_state(&config));
    let working = extensions.get::<SessionState>().cloned();

    let Reconciliation {
        state,
        source,
        failures,
    } = reconcile(session_object, raw_cookie, probe, working);

    for (candidate, err) in &failures {
        warn!(candidate = candidate.as_str(), "Session reading failed: {err}");
    }
    debug!(
        source = source.as_str(),
        authenticated = state.authenticated(),
        "Session reconciled"
    );

    request.extensions_mut().insert(state);

    next.run(request).await
}
