use crate::{gateway::is_valid_cookie_name, session::SessionCookieConfig};
use anyhow::{Context, Result, anyhow};
use clap::{
    Arg, ArgAction, ArgMatches, Command,
    builder::{BoolishValueParser, ValueParser},
};
use secrecy::SecretString;

pub const ARG_COOKIE_NAME: &str = "cookie-name";
pub const ARG_SESSION_SECRET_KEYS: &str = "session-secret-keys";
pub const ARG_COOKIE_MAX_AGE: &str = "cookie-max-age";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";

#[derive(Debug, Clone)]
pub struct Options {
    pub cookie: SessionCookieConfig,
}

impl Options {
    /// Parse session cookie arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing or no usable key is given.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let name = matches
            .get_one::<String>(ARG_COOKIE_NAME)
            .cloned()
            .context("missing required argument: --cookie-name")?;

        let keys = matches
            .get_one::<String>(ARG_SESSION_SECRET_KEYS)
            .map(|keys| split_keys(keys.as_str()))
            .unwrap_or_default();
        if keys.is_empty() {
            return Err(anyhow!(
                "missing required argument: --{ARG_SESSION_SECRET_KEYS}"
            ));
        }

        let max_age = matches
            .get_one::<i64>(ARG_COOKIE_MAX_AGE)
            .copied()
            .unwrap_or(86_400);
        let secure = matches.get_flag(ARG_COOKIE_SECURE);

        Ok(Self {
            cookie: SessionCookieConfig::new(name, keys)
                .with_max_age_seconds(max_age)
                .with_secure(secure),
        })
    }
}

/// Comma separated keys, first one signs. Blank entries are ignored.
fn split_keys(keys: &str) -> Vec<SecretString> {
    keys.split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(|key| SecretString::from(key.to_string()))
        .collect()
}

#[must_use]
pub fn validator_cookie_name() -> ValueParser {
    ValueParser::from(move |name: &str| -> std::result::Result<String, String> {
        if is_valid_cookie_name(name) {
            Ok(name.to_string())
        } else {
            Err("cookie name must be an RFC 6265 token".to_string())
        }
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_COOKIE_NAME)
                .long(ARG_COOKIE_NAME)
                .help("Session cookie name, the signature cookie gets a .sig suffix")
                .env("BFF_COOKIE_NAME")
                .default_value("bff")
                .value_parser(validator_cookie_name()),
        )
        .arg(
            Arg::new(ARG_SESSION_SECRET_KEYS)
                .long(ARG_SESSION_SECRET_KEYS)
                .help("Comma separated cookie signing keys, the first one signs")
                .env("BFF_SESSION_SECRET_KEYS")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_COOKIE_MAX_AGE)
                .long(ARG_COOKIE_MAX_AGE)
                .help("Session cookie lifetime in seconds")
                .env("BFF_COOKIE_MAX_AGE")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark session cookies Secure (frontend served over HTTPS)")
                .env("BFF_COOKIE_SECURE")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
}
