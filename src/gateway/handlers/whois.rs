use crate::{gateway::GatewayConfig, session::SessionState};
use axum::{
    extract::Extension,
    http::header::CACHE_CONTROL,
    response::{IntoResponse, Json},
};
use std::sync::Arc;

#[utoipa::path(
    get,
    path= "/bff/whois",
    responses (
        (status = 200, description = "Reconciled session state of the caller")
    ),
    tag= "session"
)]
/// Report the reconciled session state. Never changes it.
pub async fn whois(
    config: Extension<Arc<GatewayConfig>>,
    Extension(state): Extension<SessionState>,
) -> impl IntoResponse {
    let state = if config.whois_redact_credential() {
        state.redacted()
    } else {
        state
    };

    ([(CACHE_CONTROL, "no-store")], Json(state))
}
