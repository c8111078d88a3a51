pub mod logging;
pub mod proxy;
pub mod session;

use crate::gateway::is_valid_base_path;
use clap::{
    Arg, ColorChoice, Command,
    builder::{
        ValueParser,
        styling::{AnsiColor, Effects, Styles},
    },
};

pub const ARG_PORT: &str = "port";
pub const ARG_BASE_PATH: &str = "base-path";

#[must_use]
pub fn validator_base_path() -> ValueParser {
    ValueParser::from(move |path: &str| -> std::result::Result<String, String> {
        let path = path.trim_end_matches('/');
        if is_valid_base_path(path) {
            Ok(path.to_string())
        } else {
            Err("expected one or more /segment parts, e.g. /bff".to_string())
        }
    })
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("bff")
        .about("Backend-for-frontend session gateway")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("3000")
                .env("BFF_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_BASE_PATH)
                .long(ARG_BASE_PATH)
                .help("Path prefix owned by the gateway")
                .default_value("/bff")
                .env("BFF_BASE_PATH")
                .value_parser(validator_base_path()),
        );

    let command = session::with_args(command);
    let command = proxy::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "bff");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Backend-for-frontend session gateway".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_defaults() {
        temp_env::with_vars(
            [
                ("BFF_PORT", None::<&str>),
                ("BFF_BASE_PATH", None::<&str>),
                ("BFF_SESSION_SECRET_KEYS", Some("one,two")),
            ],
            || {
                let matches = new().get_matches_from(vec!["bff"]);
                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(3000));
                assert_eq!(
                    matches.get_one::<String>(ARG_BASE_PATH).map(String::as_str),
                    Some("/bff")
                );
            },
        );
    }

    #[test]
    fn test_base_path_from_env() {
        temp_env::with_vars(
            [
                ("BFF_BASE_PATH", Some("/api/session/")),
                ("BFF_SESSION_SECRET_KEYS", Some("one")),
            ],
            || {
                let matches = new().get_matches_from(vec!["bff"]);
                assert_eq!(
                    matches.get_one::<String>(ARG_BASE_PATH).map(String::as_str),
                    Some("/api/session")
                );
            },
        );
    }

    #[test]
    fn test_invalid_base_path() {
        let result = new().try_get_matches_from(vec![
            "bff",
            "--session-secret-keys",
            "one",
            "--base-path",
            "no-leading-slash",
        ]);
        assert!(result.is_err());

        let result = new().try_get_matches_from(vec![
            "bff",
            "--session-secret-keys",
            "one",
            "--base-path",
            "/",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_session_keys_required() {
        temp_env::with_vars([("BFF_SESSION_SECRET_KEYS", None::<&str>)], || {
            let result = new().try_get_matches_from(vec!["bff"]);
            assert!(result.is_err());
        });
    }
}
