//! Map parsed CLI arguments to the action to run.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_BASE_PATH, ARG_PORT, proxy, session};
use crate::gateway::GatewayConfig;
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(3000);
    let base_path = matches
        .get_one::<String>(ARG_BASE_PATH)
        .cloned()
        .context("missing required argument: --base-path")?;

    let session_opts = session::Options::parse(matches)?;
    let proxy_opts = proxy::Options::parse(matches)?;

    let config = GatewayConfig::new(&base_path, session_opts.cookie)
        .with_upstream_origin(proxy_opts.upstream_origin)
        .with_proxy_timeout(proxy_opts.timeout)
        .with_proxy_max_body_bytes(proxy_opts.max_body_bytes)
        .with_whois_redact_credential(proxy_opts.whois_redact_credential);

    Ok(Action::Server(Args { port, config }))
}
