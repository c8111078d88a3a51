use clap::{
    Arg, ArgAction, Command,
    builder::{BoolishValueParser, ValueParser},
};

pub const ARG_VERBOSITY: &str = "verbosity";
pub const ARG_LOG_JSON: &str = "log-json";

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("BFF_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(validator_log_level()),
        )
        .arg(
            Arg::new(ARG_LOG_JSON)
                .long(ARG_LOG_JSON)
                .help("Write logs as JSON lines")
                .env("BFF_LOG_JSON")
                .global(true)
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_names_and_numbers() {
        let command =
            Command::new("bff").arg(Arg::new("level").long("level").value_parser(validator_log_level()));
        for (input, expected) in [("error", 0u8), ("WARN", 1), ("debug", 3), ("4", 4)] {
            let matches = command
                .clone()
                .get_matches_from(vec!["bff", "--level", input]);
            assert_eq!(matches.get_one::<u8>("level").copied(), Some(expected), "{input}");
        }
        assert!(
            command
                .try_get_matches_from(vec!["bff", "--level", "loud"])
                .is_err()
        );
    }

    #[test]
    fn verbosity_counts_flags() {
        let matches = with_args(Command::new("bff")).get_matches_from(vec!["bff", "-vvv"]);
        assert_eq!(matches.get_one::<u8>(ARG_VERBOSITY).copied(), Some(3));
    }

    #[test]
    fn log_json_flag() {
        let matches = with_args(Command::new("bff")).get_matches_from(vec!["bff"]);
        assert!(!matches.get_flag(ARG_LOG_JSON));

        let matches =
            with_args(Command::new("bff")).get_matches_from(vec!["bff", "--log-json"]);
        assert!(matches.get_flag(ARG_LOG_JSON));
    }
}
