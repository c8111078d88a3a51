use anyhow::Result;
use clap::{
    Arg, ArgAction, ArgMatches, Command,
    builder::{BoolishValueParser, ValueParser},
};
use std::time::Duration;
use url::Url;

pub const ARG_UPSTREAM_ORIGIN: &str = "upstream-origin";
pub const ARG_PROXY_TIMEOUT_MS: &str = "proxy-timeout-ms";
pub const ARG_PROXY_MAX_BODY_BYTES: &str = "proxy-max-body-bytes";
pub const ARG_WHOIS_REDACT_CREDENTIAL: &str = "whois-redact-credential";

#[derive(Debug, Clone)]
pub struct Options {
    pub upstream_origin: Option<Url>,
    pub timeout: Duration,
    pub max_body_bytes: usize,
    pub whois_redact_credential: bool,
}

impl Options {
    /// Parse proxy arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a value cannot be read.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            upstream_origin: matches.get_one::<Url>(ARG_UPSTREAM_ORIGIN).cloned(),
            timeout: Duration::from_millis(
                matches
                    .get_one::<u64>(ARG_PROXY_TIMEOUT_MS)
                    .copied()
                    .unwrap_or(2000),
            ),
            max_body_bytes: matches
                .get_one::<usize>(ARG_PROXY_MAX_BODY_BYTES)
                .copied()
                .unwrap_or(crate::gateway::DEFAULT_PROXY_MAX_BODY_BYTES),
            whois_redact_credential: matches.get_flag(ARG_WHOIS_REDACT_CREDENTIAL),
        })
    }
}

#[must_use]
pub fn validator_upstream_origin() -> ValueParser {
    ValueParser::from(move |origin: &str| -> std::result::Result<Url, String> {
        let url = Url::parse(origin).map_err(|err| format!("invalid URL: {err}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err("upstream origin must be an http(s) URL".to_string());
        }
        if url.host_str().is_none() {
            return Err("upstream origin must include a host".to_string());
        }
        Ok(url)
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_UPSTREAM_ORIGIN)
                .long(ARG_UPSTREAM_ORIGIN)
                .help("Upstream API URL, example: https://api.tld/v1 (proxy disabled when unset)")
                .env("BFF_UPSTREAM_ORIGIN")
                .value_parser(validator_upstream_origin()),
        )
        .arg(
            Arg::new(ARG_PROXY_TIMEOUT_MS)
                .long(ARG_PROXY_TIMEOUT_MS)
                .help("Upstream request timeout in milliseconds")
                .env("BFF_PROXY_TIMEOUT_MS")
                .default_value("2000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_PROXY_MAX_BODY_BYTES)
                .long(ARG_PROXY_MAX_BODY_BYTES)
                .help("Largest request body forwarded upstream, in bytes")
                .env("BFF_PROXY_MAX_BODY_BYTES")
                .default_value("2097152")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_WHOIS_REDACT_CREDENTIAL)
                .long(ARG_WHOIS_REDACT_CREDENTIAL)
                .help("Leave the credential out of whois responses")
                .env("BFF_WHOIS_REDACT_CREDENTIAL")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
}
