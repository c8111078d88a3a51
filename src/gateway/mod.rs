use crate::{
    APP_USER_AGENT,
    session::{
        SessionCookieConfig, cookie::session_cookie, probe::has_session_cookie,
        reconcile::reconcile_session,
    },
};
use anyhow::{Context, Result, bail};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Request,
        header::{AUTHORIZATION, COOKIE, SET_COOKIE},
    },
    middleware::from_fn_with_state,
    routing::{any, get},
};
use regex::Regex;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_http::{
    request_id::PropagateRequestIdLayer, sensitive_headers::SetSensitiveHeadersLayer,
    set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use url::Url;

pub mod acceptance;
pub mod handlers;
mod openapi;
pub mod proxy;

pub use acceptance::{Acceptance, CredentialAcceptor, StructuralAcceptor};
pub use openapi::openapi;
pub use proxy::ProxyAuthDecorator;

use handlers::{health, recovery, whois};

pub const DEFAULT_PROXY_TIMEOUT: Duration = Duration::from_millis(2000);
pub const DEFAULT_PROXY_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

const REQUEST_ID: &str = "x-request-id";

/// One or more `/segment` parts, no trailing slash.
#[must_use]
pub fn is_valid_base_path(path: &str) -> bool {
    Regex::new(r"^(/[A-Za-z0-9._~-]+)+$").is_ok_and(|re| re.is_match(path))
}

/// RFC 6265 cookie-name token.
#[must_use]
pub fn is_valid_cookie_name(name: &str) -> bool {
    Regex::new(r"^[!#$%&'*+.^_`|~0-9A-Za-z-]+$").is_ok_and(|re| re.is_match(name))
}

/// Everything the gateway needs, fixed at startup.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    base_path: String,
    cookie: SessionCookieConfig,
    upstream_origin: Option<Url>,
    proxy_timeout: Duration,
    proxy_max_body_bytes: usize,
    whois_redact_credential: bool,
}

impl GatewayConfig {
    /// A trailing slash on `base_path` is ignored.
    #[must_use]
    pub fn new(base_path: &str, cookie: SessionCookieConfig) -> Self {
        Self {
            base_path: base_path.trim_end_matches('/').to_string(),
            cookie,
            upstream_origin: None,
            proxy_timeout: DEFAULT_PROXY_TIMEOUT,
            proxy_max_body_bytes: DEFAULT_PROXY_MAX_BODY_BYTES,
            whois_redact_credential: false,
        }
    }

    #[must_use]
    pub fn with_upstream_origin(mut self, upstream_origin: Option<Url>) -> Self {
        self.upstream_origin = upstream_origin;
        self
    }

    #[must_use]
    pub const fn with_proxy_timeout(mut self, timeout: Duration) -> Self {
        self.proxy_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_proxy_max_body_bytes(mut self, bytes: usize) -> Self {
        self.proxy_max_body_bytes = bytes;
        self
    }

    #[must_use]
    pub const fn with_whois_redact_credential(mut self, redact: bool) -> Self {
        self.whois_redact_credential = redact;
        self
    }

    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    #[must_use]
    pub const fn cookie(&self) -> &SessionCookieConfig {
        &self.cookie
    }

    #[must_use]
    pub const fn upstream_origin(&self) -> Option<&Url> {
        self.upstream_origin.as_ref()
    }

    #[must_use]
    pub const fn proxy_timeout(&self) -> Duration {
        self.proxy_timeout
    }

    #[must_use]
    pub const fn proxy_max_body_bytes(&self) -> usize {
        self.proxy_max_body_bytes
    }

    #[must_use]
    pub const fn whois_redact_credential(&self) -> bool {
        self.whois_redact_credential
    }

    #[must_use]
    pub fn recovery_path(&self) -> String {
        format!("{}/recovery", self.base_path)
    }

    #[must_use]
    pub fn whois_path(&self) -> String {
        format!("{}/whois", self.base_path)
    }

    #[must_use]
    pub fn proxy_path(&self) -> String {
        format!("{}/proxy", self.base_path)
    }
}

/// Build the gateway router.
///
/// `/health` sits outside the base path. Everything else lives under it, and
/// requests outside both never reach the session stack.
///
/// # Errors
/// Returns an error if the base path is invalid or the upstream HTTP client
/// cannot be built.
pub fn router(config: GatewayConfig, acceptor: Arc<dyn CredentialAcceptor>) -> Result<Router> {
    if !is_valid_base_path(config.base_path()) {
        bail!("Invalid base path: {:?}", config.base_path());
    }

    let cookie_config = Arc::new(config.cookie().clone());
    let config = Arc::new(config);

    let mut bff = Router::new()
        .route("/recovery", get(recovery::form).post(recovery::recover))
        .route("/whois", any(whois::whois));

    if let Some(upstream) = config.upstream_origin() {
        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(config.proxy_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build upstream HTTP client")?;
        let state = Arc::new(handlers::proxy::ProxyState::new(
            ProxyAuthDecorator::new(upstream.clone(), config.proxy_path()),
            client,
            config.proxy_max_body_bytes(),
        ));

        bff = bff.merge(
            Router::new()
                .route("/proxy", any(handlers::proxy::forward))
                .route("/proxy/*path", any(handlers::proxy::forward))
                .layer(Extension(state)),
        );
    }

    // Layers wrap outside-in: the cookie jar first, then the cookie session,
    // the probe, and reconciliation right before the handlers.
    let bff = bff
        .layer(from_fn_with_state(cookie_config.clone(), reconcile_session))
        .layer(from_fn_with_state(cookie_config.clone(), has_session_cookie))
        .layer(from_fn_with_state(cookie_config, session_cookie))
        .layer(CookieManagerLayer::new());

    let app = Router::new()
        .route("/health", get(health::health))
        .nest(config.base_path(), bff)
        .layer(
            ServiceBuilder::new()
                .layer(SetSensitiveHeadersLayer::new([
                    COOKIE,
                    SET_COOKIE,
                    AUTHORIZATION,
                ]))
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(acceptor))
                .layer(Extension(config)),
        );

    Ok(app)
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    config: GatewayConfig,
    acceptor: Arc<dyn CredentialAcceptor>,
) -> Result<()> {
    let proxy_path = config.proxy_path();
    match config.upstream_origin() {
        Some(upstream) => info!("Will proxy {proxy_path} => {upstream}"),
        None => info!("Will NOT proxy {proxy_path}"),
    }

    let app = router(config, acceptor)?;

    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use secrecy::SecretString;
    use tower::ServiceExt;

    fn config() -> GatewayConfig {
        GatewayConfig::new(
            "/bff/",
            SessionCookieConfig::new("bff".to_string(), vec![SecretString::from("k".to_string())]),
        )
    }

    #[test]
    fn derived_paths() {
        let config = config();
        assert_eq!(config.base_path(), "/bff");
        assert_eq!(config.recovery_path(), "/bff/recovery");
        assert_eq!(config.whois_path(), "/bff/whois");
        assert_eq!(config.proxy_path(), "/bff/proxy");
        assert_eq!(config.proxy_timeout(), Duration::from_secs(2));
        assert!(config.upstream_origin().is_none());
    }

    #[test]
    fn base_path_validation() {
        assert!(is_valid_base_path("/bff"));
        assert!(is_valid_base_path("/api/v1.0/bff"));
        assert!(!is_valid_base_path("/"));
        assert!(!is_valid_base_path("bff"));
        assert!(!is_valid_base_path("/bff/"));
        assert!(!is_valid_base_path("/b ff"));
    }

    #[test]
    fn cookie_name_validation() {
        assert!(is_valid_cookie_name("bff"));
        assert!(is_valid_cookie_name("__Host-bff"));
        assert!(!is_valid_cookie_name("b;ff"));
        assert!(!is_valid_cookie_name("b=ff"));
        assert!(!is_valid_cookie_name(""));
    }

    #[test]
    fn root_base_path_is_refused() {
        let config = GatewayConfig::new(
            "/",
            SessionCookieConfig::new("bff".to_string(), vec![SecretString::from("k".to_string())]),
        );
        assert!(router(config, Arc::new(StructuralAcceptor)).is_err());
    }

    #[tokio::test]
    async fn request_id_is_generated_and_propagated() {
        let app = router(config(), Arc::new(StructuralAcceptor)).unwrap();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let request_id = response.headers().get(REQUEST_ID).unwrap();
        assert!(Ulid::from_string(request_id.to_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn proxy_routes_only_exist_with_an_upstream() {
        let app = router(config(), Arc::new(StructuralAcceptor)).unwrap();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/bff/proxy/users")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn paths_outside_the_base_are_not_routed() {
        let app = router(config(), Arc::new(StructuralAcceptor)).unwrap();
        for uri in ["/whois", "/recovery", "/other/bff/whois"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }
}
