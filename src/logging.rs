use tracing::Level;
use tracing_subscriber::fmt::time::SystemTime;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

/// Install the process-wide subscriber. `RUST_LOG` overrides `level`.
///
/// Safe to call more than once; later calls leave the first subscriber in
/// place.
pub fn init_logging(level: Level, json_output: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    if json_output {
        let fmt_layer = fmt::layer()
            .json()
            .with_timer(SystemTime)
            .with_target(true)
            .with_thread_names(true);

        let _ = Registry::default().with(env_filter).with(fmt_layer).try_init();
    } else {
        let fmt_layer = fmt::layer()
            .with_timer(SystemTime)
            .with_target(true)
            .with_thread_names(true)
            .with_writer(std::io::stderr);

        let _ = Registry::default().with(env_filter).with(fmt_layer).try_init();
    }
}

fn default_directives(level: Level) -> String {
    format!("tablet_client={},warn", level)
}

/// Parse a `--log-level` value (`error`, `warn`, `info`, `debug`, `trace`).
pub fn parse_level(value: &str) -> Option<Level> {
    value.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(default_directives(Level::DEBUG), "tablet_client=DEBUG,warn");
        assert!(EnvFilter::try_new(default_directives(Level::TRACE)).is_ok());
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Some(Level::DEBUG));
        assert_eq!(parse_level("WARN"), Some(Level::WARN));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_repeated_init_is_harmless() {
        init_logging(Level::INFO, false);
        init_logging(Level::DEBUG, true);
    }
}
