//! Session recovery: trade a presented credential for a persisted session.

use crate::{
    gateway::{CredentialAcceptor, GatewayConfig},
    session::{PersistSession, SessionState, Subject},
    token::{decode_bearer_token, display_name_claim},
};
use axum::{
    Form, Json,
    extract::{Extension, FromRequest, Request},
    http::{
        HeaderMap, StatusCode,
        header::{ACCEPT_LANGUAGE, CONTENT_TYPE, LOCATION},
    },
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize, Debug, Default)]
pub struct RecoveryForm {
    credential: Option<String>,
    /// Older clients post the credential under this name.
    jwt: Option<String>,
    locale: Option<String>,
    timezone: Option<String>,
}

impl RecoveryForm {
    fn credential(&self) -> Option<&str> {
        non_blank(self.credential.as_deref().or(self.jwt.as_deref()))
    }

    fn locale(&self) -> Option<String> {
        non_blank(self.locale.as_deref()).map(str::to_string)
    }

    fn timezone(&self) -> Option<String> {
        non_blank(self.timezone.as_deref()).map(str::to_string)
    }
}

/// Empty form fields arrive as `Some("")`; treat them as absent.
fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[utoipa::path(
    get,
    path= "/bff/recovery",
    responses (
        (status = 200, description = "Recovery form")
    ),
    tag= "session"
)]
pub async fn form(config: Extension<Arc<GatewayConfig>>) -> Html<String> {
    Html(render_form(&config.recovery_path(), false))
}

#[utoipa::path(
    post,
    path= "/bff/recovery",
    request_body(content = RecoveryForm, content_type = "application/x-www-form-urlencoded"),
    responses (
        (status = 302, description = "Credential accepted, session cookie set, redirect to whois"),
        (status = 401, description = "Credential missing or rejected, form rendered again")
    ),
    tag= "session"
)]
/// Accepts the credential as a form post or a JSON body.
pub async fn recover(
    config: Extension<Arc<GatewayConfig>>,
    acceptor: Extension<Arc<dyn CredentialAcceptor>>,
    Extension(state): Extension<SessionState>,
    request: Request,
) -> Response {
    let accept_language = preferred_locale(request.headers());
    let form = read_form(request).await;

    let Some(credential) = form.credential() else {
        debug!("Recovery attempt without a credential");
        return rejected(&config);
    };

    if !acceptor.check(credential).is_accepted() {
        debug!("Recovery credential rejected");
        return rejected(&config);
    }

    let next = state.recovered(
        credential.to_string(),
        subject_for(credential, state.subject()),
        form.locale().or(accept_language),
        form.timezone(),
    );

    info!(
        subject = %next.subject().display_name,
        "Session recovered"
    );

    let mut response = (StatusCode::FOUND, [(LOCATION, config.whois_path())]).into_response();
    response.extensions_mut().insert(PersistSession(next));
    response
}

async fn read_form(request: Request) -> RecoveryForm {
    let is_json = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));

    let parsed = if is_json {
        Json::<RecoveryForm>::from_request(request, &())
            .await
            .map(|Json(form)| form)
            .map_err(|err| err.body_text())
    } else {
        Form::<RecoveryForm>::from_request(request, &())
            .await
            .map(|Form(form)| form)
            .map_err(|err| err.body_text())
    };

    parsed.unwrap_or_else(|err| {
        debug!("Unreadable recovery body: {err}");
        RecoveryForm::default()
    })
}

fn rejected(config: &GatewayConfig) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Html(render_form(&config.recovery_path(), true)),
    )
        .into_response()
}

/// Subject from the token claims, or the previous one when the claims carry no name.
fn subject_for(credential: &str, previous: &Subject) -> Subject {
    let claims = decode_bearer_token(credential).unwrap_or_default();
    claims
        .iter()
        .find_map(|segment| {
            let name = display_name_claim(segment)?;
            let mut subject = Subject::named(name);
            if let Some(sub) = segment.get("sub").and_then(Value::as_str) {
                subject.extra.insert("id".to_string(), Value::from(sub));
            }
            Some(subject)
        })
        .unwrap_or_else(|| previous.clone())
}

/// First language tag of `Accept-Language`, if it names one.
fn preferred_locale(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ACCEPT_LANGUAGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|tag| tag.split(';').next())
        .map(str::trim)
        .filter(|tag| !tag.is_empty() && *tag != "*")
        .map(str::to_string)
}

fn render_form(action: &str, failed: bool) -> String {
    let notice = if failed {
        "<p role=\"alert\">The credential was not accepted.</p>"
    } else {
        ""
    };

    format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Session recovery</title></head>
<body>
<h1>Session recovery</h1>
{notice}
<form method="post" action="{action}">
<label for="credential">Credential</label>
<textarea id="credential" name="credential" rows="6" cols="60" required></textarea>
<button type="submit">Recover session</button>
</form>
</body>
</html>
"#
    )
}
