mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, parse_filter, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "ashlink", version, about = "ASH serial link host tools")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Per-target log directives, e.g. `warn,ashlink_host=trace`.
    #[arg(
        long,
        value_name = "DIRECTIVES",
        env = "ASHLINK_LOG",
        value_parser = parse_filter,
        global = true
    )]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level, cli.log_filter.as_deref());

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_loopback_subcommand() {
        let cli = Cli::try_parse_from([
            "ashlink",
            "loopback",
            "--preset",
            "2",
            "--count",
            "8",
            "--drop-every",
            "3",
        ])
        .expect("loopback args should parse");

        let Command::Loopback(args) = cli.command else {
            panic!("expected loopback command");
        };
        assert_eq!(args.preset, 2);
        assert_eq!(args.count, 8);
        assert_eq!(args.drop_every, Some(3));
    }

    #[test]
    fn rejects_preset_with_config_file() {
        let err = Cli::try_parse_from([
            "ashlink",
            "loopback",
            "--preset",
            "1",
            "--config",
            "link.json",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn rejects_zero_drop_interval() {
        let err = Cli::try_parse_from(["ashlink", "loopback", "--drop-every", "0"])
            .expect_err("zero interval should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from([
            "ashlink",
            "presets",
            "--format",
            "json",
            "--log-level",
            "debug",
        ])
        .expect("global flags should parse after subcommand");
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert!(matches!(cli.command, Command::Presets(_)));
    }

    #[test]
    fn log_filter_accepts_target_directives() {
        let cli = Cli::try_parse_from([
            "ashlink",
            "loopback",
            "--log-filter",
            "warn,ashlink_host::send=trace",
        ])
        .expect("target directives should parse");
        assert_eq!(
            cli.log_filter.as_deref(),
            Some("warn,ashlink_host::send=trace")
        );

        let err = Cli::try_parse_from(["ashlink", "loopback", "--log-filter", "ashlink=loud"])
            .expect_err("unknown level should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
