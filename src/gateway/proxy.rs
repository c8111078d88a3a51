//! Authorization decorator for proxied requests.
//!
//! The browser never talks to the upstream directly: its cookies and referer
//! stay at the gateway and the session credential travels as a bearer token
//! instead. Upstream attempts to set cookies or redirect the browser are
//! dropped on the way back.

use crate::{error::GatewayError, session::SessionState};
use axum::http::{
    HeaderMap, HeaderName, HeaderValue, Uri,
    header::{
        AUTHORIZATION, CONNECTION, CONTENT_LENGTH, COOKIE, HOST, LOCATION, PROXY_AUTHENTICATE,
        PROXY_AUTHORIZATION, REFERER, SET_COOKIE, TE, TRAILER, TRANSFER_ENCODING, UPGRADE,
    },
};
use url::Url;

static HOP_BY_HOP: [HeaderName; 8] = [
    CONNECTION,
    HeaderName::from_static("keep-alive"),
    PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION,
    TE,
    TRAILER,
    TRANSFER_ENCODING,
    UPGRADE,
];

static STRIPPED_OUTBOUND: [HeaderName; 5] = [COOKIE, REFERER, HOST, AUTHORIZATION, CONTENT_LENGTH];

static STRIPPED_INBOUND: [HeaderName; 3] = [SET_COOKIE, LOCATION, CONTENT_LENGTH];

#[derive(Debug, Clone)]
pub struct ProxyAuthDecorator {
    upstream: Url,
    prefix: String,
}

impl ProxyAuthDecorator {
    /// `prefix` is the full inbound path the proxy is mounted at, e.g. `/bff/proxy`.
    #[must_use]
    pub const fn new(upstream: Url, prefix: String) -> Self {
        Self { upstream, prefix }
    }

    /// The credential to forward, or [`GatewayError::Unauthorized`].
    ///
    /// # Errors
    /// Returns `Unauthorized` when the session carries no credential.
    pub fn authorize<'a>(&self, state: &'a SessionState) -> Result<&'a str, GatewayError> {
        state.bearer().ok_or(GatewayError::Unauthorized)
    }

    /// Map the inbound URI onto the upstream: upstream path, then whatever
    /// followed the proxy prefix, then the original query.
    ///
    /// # Errors
    /// Returns `InvalidUpstreamPath` if the URI is not under the prefix or tries
    /// to climb out of the upstream path.
    pub fn outbound_url(&self, uri: &Uri) -> Result<Url, GatewayError> {
        let path = uri.path();
        let rest = path
            .strip_prefix(self.prefix.as_str())
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
            .ok_or_else(|| GatewayError::InvalidUpstreamPath(path.to_string()))?;

        if rest.split('/').any(is_dot_segment) {
            return Err(GatewayError::InvalidUpstreamPath(path.to_string()));
        }

        let mut url = self.upstream.clone();
        if !rest.is_empty() {
            let joined = format!("{}{rest}", self.upstream.path().trim_end_matches('/'));
            url.set_path(&joined);
        }
        url.set_query(uri.query());

        Ok(url)
    }

    /// Headers sent upstream: the inbound set minus browser identity and
    /// hop-by-hop headers, plus the bearer credential.
    ///
    /// # Errors
    /// Returns `Unauthorized` if the credential cannot be carried in a header.
    pub fn outbound_headers(
        &self,
        inbound: &HeaderMap,
        credential: &str,
    ) -> Result<HeaderMap, GatewayError> {
        let mut headers = without_hop_by_hop(inbound);
        for name in &STRIPPED_OUTBOUND {
            headers.remove(name);
        }

        let mut bearer = HeaderValue::from_str(&format!("Bearer {credential}"))
            .map_err(|_| GatewayError::Unauthorized)?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        Ok(headers)
    }

    /// Headers relayed back to the browser.
    #[must_use]
    pub fn response_headers(&self, upstream: &HeaderMap) -> HeaderMap {
        let mut headers = without_hop_by_hop(upstream);
        for name in &STRIPPED_INBOUND {
            headers.remove(name);
        }
        headers
    }
}

fn without_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    // Headers named in `Connection` are hop-by-hop as well.
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    let mut headers = headers.clone();
    for name in HOP_BY_HOP.iter().chain(&listed) {
        headers.remove(name);
    }
    headers
}

fn is_dot_segment(segment: &str) -> bool {
    let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
    decoded == "." || decoded == ".."
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::session::Subject;

    fn decorator(upstream: &str) -> ProxyAuthDecorator {
        ProxyAuthDecorator::new(Url::parse(upstream).unwrap(), "/bff/proxy".to_string())
    }

    fn uri(value: &str) -> Uri {
        value.parse().unwrap()
    }

    #[test]
    fn unauthenticated_sessions_are_refused() {
        let decorator = decorator("http://api.local");
        assert!(matches!(
            decorator.authorize(&SessionState::default()),
            Err(GatewayError::Unauthorized)
        ));

        let state =
            SessionState::default().recovered("a.b.c".to_string(), Subject::default(), None, None);
        assert_eq!(decorator.authorize(&state).unwrap(), "a.b.c");
    }

    #[test]
    fn path_is_appended_to_the_upstream_path() {
        let decorator = decorator("http://api.local/v1/");
        assert_eq!(
            decorator
                .outbound_url(&uri("/bff/proxy/users/7?expand=roles"))
                .unwrap()
                .as_str(),
            "http://api.local/v1/users/7?expand=roles"
        );
        assert_eq!(
            decorator.outbound_url(&uri("/bff/proxy")).unwrap().as_str(),
            "http://api.local/v1/"
        );
    }

    #[test]
    fn path_outside_the_prefix_is_rejected() {
        let decorator = decorator("http://api.local/v1");
        assert!(decorator.outbound_url(&uri("/bff/proxyish")).is_err());
        assert!(decorator.outbound_url(&uri("/bff/whois")).is_err());
        assert!(decorator.outbound_url(&uri("/bff/proxy/../admin")).is_err());
        assert!(decorator.outbound_url(&uri("/bff/proxy/%2E%2e/admin")).is_err());
    }

    #[test]
    fn outbound_headers_carry_only_the_bearer() {
        let mut inbound = HeaderMap::new();
        inbound.insert(COOKIE, HeaderValue::from_static("bff=abc; bff.sig=def"));
        inbound.insert(REFERER, HeaderValue::from_static("https://app.local/page"));
        inbound.insert(AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        inbound.insert(HOST, HeaderValue::from_static("app.local"));
        inbound.insert(CONNECTION, HeaderValue::from_static("keep-alive, x-trace"));
        inbound.insert("x-trace", HeaderValue::from_static("1"));
        inbound.insert("accept", HeaderValue::from_static("application/json"));

        let headers = decorator("http://api.local")
            .outbound_headers(&inbound, "h.p.s")
            .unwrap();

        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer h.p.s");
        assert!(headers.get(AUTHORIZATION).unwrap().is_sensitive());
        assert_eq!(headers.get("accept").unwrap(), "application/json");
        for name in ["cookie", "referer", "host", "connection", "x-trace"] {
            assert!(headers.get(name).is_none(), "{name} was forwarded");
        }
    }

    #[test]
    fn response_headers_drop_cookies_and_redirects() {
        let mut upstream = HeaderMap::new();
        upstream.insert(SET_COOKIE, HeaderValue::from_static("upstream=1"));
        upstream.insert(LOCATION, HeaderValue::from_static("https://idp.local/login"));
        upstream.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        upstream.insert("content-type", HeaderValue::from_static("application/json"));

        let headers = decorator("http://api.local").response_headers(&upstream);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("content-type").unwrap(), "application/json");
    }
}
