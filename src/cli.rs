use clap::{Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("yalidine")
        .about("Probe the Yalidine / Guepex delivery APIs")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .num_args(1)
                .global(true)
                .help("Override RUST_LOG level (e.g., info, debug)"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .global(true)
                .help("Log every request and response")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("agent")
                .long("agent")
                .num_args(1)
                .global(true)
                .help("yalidine or guepex (default: YALIDINE_AGENT or yalidine)"),
        )
        .subcommand_required(true)
        .subcommand(Command::new("ping").about("Check that the API answers"))
        .subcommand(Command::new("quota").about("Probe once and print remaining quota"))
        .subcommand(
            Command::new("get")
                .about("GET an endpoint and print the JSON payload")
                .arg(Arg::new("endpoint").required(true))
                .arg(
                    Arg::new("query")
                        .long("query")
                        .short('q')
                        .num_args(1)
                        .action(ArgAction::Append)
                        .help("Query parameter as key=value"),
                ),
        )
        .subcommand(Command::new("init").about("Warm the reference-data cache"))
}

pub fn parse_query_pair(raw: &str) -> Option<(String, String)> {
    let (k, v) = raw.split_once('=')?;
    if k.is_empty() {
        return None;
    }
    Some((k.to_string(), v.to_string()))
}

/// Filter override for the logger: `--debug` forces debug, else an explicit
/// level, else none (RUST_LOG or info applies).
pub fn log_filter(level: Option<&str>, debug: bool) -> Option<&str> {
    if debug {
        Some("debug")
    } else {
        level
    }
}

pub fn init_logging(level: Option<&str>, debug: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(filter) = log_filter(level, debug) {
        builder.parse_filters(filter);
    }
    builder.init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_pairs() {
        assert_eq!(
            parse_query_pair("page_size=1"),
            Some(("page_size".into(), "1".into()))
        );
        assert_eq!(parse_query_pair("name=a=b"), Some(("name".into(), "a=b".into())));
        assert_eq!(parse_query_pair("=x"), None);
        assert_eq!(parse_query_pair("flag"), None);
    }

    #[test]
    fn debug_flag_forces_debug_level() {
        assert_eq!(log_filter(Some("warn"), true), Some("debug"));
        assert_eq!(log_filter(None, true), Some("debug"));
        assert_eq!(log_filter(Some("warn"), false), Some("warn"));
        assert_eq!(log_filter(None, false), None);
    }

    #[test]
    fn cli_is_well_formed() {
        build_cli().debug_assert();
    }
}
