use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Check `--log-filter` directives such as `warn,ashlink_host=trace`.
pub fn parse_filter(directives: &str) -> Result<String, String> {
    EnvFilter::try_new(directives)
        .map(|_| directives.to_string())
        .map_err(|err| err.to_string())
}

/// Build the event filter: explicit directives win over the plain level.
pub fn build_filter(level: LogLevel, directives: Option<&str>) -> EnvFilter {
    match directives {
        Some(directives) => EnvFilter::try_new(directives)
            .unwrap_or_else(|_| EnvFilter::default().add_directive(level.as_filter().into())),
        None => EnvFilter::default().add_directive(level.as_filter().into()),
    }
}

/// Route library `tracing` events to stderr, keeping stdout for command output.
pub fn init_logging(format: LogFormat, level: LogLevel, directives: Option<&str>) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(build_filter(level, directives))
        .with_ansi(false)
        .with_target(level >= LogLevel::Debug || directives.is_some());

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_becomes_default_directive() {
        let filter = build_filter(LogLevel::Debug, None);
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn directives_override_level() {
        let filter = build_filter(LogLevel::Error, Some("warn,ashlink_host=trace"));
        let shown = filter.to_string();
        assert!(shown.contains("ashlink_host=trace"), "got {shown}");
        assert!(!shown.contains("error"), "got {shown}");
    }

    #[test]
    fn malformed_directives_are_rejected() {
        assert!(parse_filter("ashlink_host=loud").is_err());
        assert_eq!(parse_filter("info").as_deref(), Ok("info"));
    }
}
