use crate::{
    cli::telemetry,
    gateway::{self, GatewayConfig, StructuralAcceptor},
};
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub config: GatewayConfig,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let result = gateway::new(args.port, args.config, Arc::new(StructuralAcceptor)).await;

    telemetry::shutdown_tracer();

    result
}

fn log_startup_args(args: &Args) {
    let config = &args.config;
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("base_path", config.base_path().to_string()),
        ("cookie_name", config.cookie().name().to_string()),
        (
            "cookie_max_age_seconds",
            config.cookie().max_age_seconds().to_string(),
        ),
        ("cookie_secure", config.cookie().secure().to_string()),
        (
            "upstream_origin",
            config
                .upstream_origin()
                .map_or_else(|| "none".to_string(), ToString::to_string),
        ),
        (
            "proxy_timeout_ms",
            config.proxy_timeout().as_millis().to_string(),
        ),
        (
            "proxy_max_body_bytes",
            config.proxy_max_body_bytes().to_string(),
        ),
        (
            "whois_redact_credential",
            config.whois_redact_credential().to_string(),
        ),
    ];

    for (key, value) in entries {
        info!(key, value = %value, "Startup configuration");
    }
}
