//! # bff (Backend-for-Frontend Session Gateway)
//!
//! `bff` sits between a browser and an upstream API. The browser only ever
//! holds an `HttpOnly` session cookie; the gateway turns that cookie into a
//! bearer credential when forwarding calls upstream.
//!
//! ## Session reconciliation
//!
//! Every request under the base path (default `/bff`) gets exactly one
//! authoritative [`session::SessionState`]. Up to three independent readings of
//! the session cookie are tried in priority order (the cookie middleware's
//! session object, a direct decode of the raw cookie, the session-cookie probe)
//! before falling back to the default anonymous state. Decode failures are
//! logged and never abort the request.
//!
//! ## Recovery
//!
//! `POST {base}/recovery` exchanges a presented credential for a persisted
//! session and redirects to `{base}/whois`, which echoes the reconciled state.
//!
//! ## Proxy
//!
//! `{base}/proxy/*` is forwarded to the configured upstream origin with an
//! `Authorization: Bearer` header. Browser cookies and referers never leave the
//! gateway, and upstream `Set-Cookie`/`Location` headers never reach the browser.

pub mod cli;
pub mod error;
pub mod gateway;
pub mod session;
pub mod token;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
