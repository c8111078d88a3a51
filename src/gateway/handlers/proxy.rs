use crate::{error::GatewayError, gateway::ProxyAuthDecorator, session::SessionState};
use axum::{
    body::{Body, to_bytes},
    extract::{Extension, OriginalUri, Request},
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Shared by every proxied request.
#[derive(Debug)]
pub struct ProxyState {
    decorator: ProxyAuthDecorator,
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl ProxyState {
    #[must_use]
    pub const fn new(
        decorator: ProxyAuthDecorator,
        client: reqwest::Client,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            decorator,
            client,
            max_body_bytes,
        }
    }
}

#[utoipa::path(
    get,
    path= "/bff/proxy/{path}",
    params(
        ("path" = String, Path, description = "Path forwarded to the upstream API")
    ),
    responses (
        (status = 200, description = "Upstream response, relayed"),
        (status = 401, description = "Session has no credential"),
        (status = 413, description = "Request body too large"),
        (status = 502, description = "Upstream unreachable or its response too large"),
        (status = 504, description = "Upstream timed out")
    ),
    tag= "proxy"
)]
/// Forward the request upstream with the session credential as a bearer token.
///
/// The upstream response is read in full before anything is sent back, and
/// is held to the same size limit as the request body.
///
/// # Errors
/// Returns a [`GatewayError`] when the session is unauthenticated or the upstream call fails.
pub async fn forward(
    Extension(proxy): Extension<Arc<ProxyState>>,
    Extension(state): Extension<SessionState>,
    OriginalUri(uri): OriginalUri,
    request: Request,
) -> Result<Response, GatewayError> {
    let decorator = &proxy.decorator;
    let credential = decorator.authorize(&state)?;
    let url = decorator.outbound_url(&uri)?;

    let (parts, body) = request.into_parts();
    let headers = decorator.outbound_headers(&parts.headers, credential)?;
    let body = to_bytes(body, proxy.max_body_bytes)
        .await
        .map_err(|_| GatewayError::PayloadTooLarge)?;

    info!(method = %parts.method, upstream = %url, "Proxying request");

    let upstream = proxy
        .client
        .request(parts.method, url)
        .headers(headers)
        .body(body)
        .send()
        .await?;

    let status = upstream.status();
    let headers = decorator.response_headers(upstream.headers());
    let body = read_capped(upstream, proxy.max_body_bytes).await?;

    debug!(status = status.as_u16(), bytes = body.len(), "Upstream responded");

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;

    Ok(response)
}

/// Buffer the upstream body, giving up once it exceeds `limit` bytes.
async fn read_capped(
    mut upstream: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, GatewayError> {
    let announced = upstream.content_length().unwrap_or(0);
    if announced > u64::try_from(limit).unwrap_or(u64::MAX) {
        return Err(response_too_large(limit));
    }

    let mut body = Vec::new();
    while let Some(chunk) = upstream.chunk().await? {
        if body.len() + chunk.len() > limit {
            return Err(response_too_large(limit));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

fn response_too_large(limit: usize) -> GatewayError {
    GatewayError::UpstreamUnavailable(format!("response body exceeds {limit} bytes"))
}
