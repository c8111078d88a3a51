use super::handlers::{health, proxy, recovery, whois};
use utoipa::{
    OpenApi,
    openapi::{InfoBuilder, Tag},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        recovery::form,
        recovery::recover,
        whois::whois,
        proxy::forward
    ),
    components(schemas(health::Health, recovery::RecoveryForm))
)]
struct ApiDoc;

/// `OpenAPI` document for the default `/bff` base path.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();

    // Use Cargo.toml metadata instead of the derive defaults.
    doc.info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(Some(env!("CARGO_PKG_DESCRIPTION")).filter(|value| !value.is_empty()))
        .build();

    let mut session_tag = Tag::new("session");
    session_tag.description = Some("Session recovery and inspection".to_string());

    let mut proxy_tag = Tag::new("proxy");
    proxy_tag.description = Some("Authorized forwarding to the upstream API".to_string());

    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Liveness".to_string());

    doc.tags = Some(vec![session_tag, proxy_tag, health_tag]);

    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route() {
        let doc = openapi();
        for path in ["/health", "/bff/recovery", "/bff/whois", "/bff/proxy/{path}"] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
    }
}
