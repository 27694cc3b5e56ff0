use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    Debug,
}

impl Verbosity {
    pub fn from_count(quiet: bool, verbose: u8) -> Self {
        match (quiet, verbose) {
            (true, _) => Verbosity::Quiet,
            (false, 0) => Verbosity::Normal,
            (false, 1) => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    }

    fn default_filter(self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "info",
            Verbosity::Debug => "debug",
        }
    }
}

/// File logging at `info` plus a stderr layer whose level follows the CLI
/// verbosity flags. `SAVESMITH_LOG`, then `RUST_LOG`, overrides both.
pub fn init_logging(log_dir: &Path, verbosity: Verbosity) -> Option<WorkerGuard> {
    let (file_layer, guard) = match std::fs::create_dir_all(log_dir) {
        Ok(()) => {
            // Files like savesmith.log.2024-01-21
            let appender = tracing_appender::rolling::daily(log_dir, "savesmith.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_filter(env_filter().unwrap_or_else(|| EnvFilter::new("info")));
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .with_filter(env_filter().unwrap_or_else(|| EnvFilter::new(verbosity.default_filter())));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .init();
    guard
}

fn env_filter() -> Option<EnvFilter> {
    EnvFilter::try_from_env("SAVESMITH_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_flags() {
        assert_eq!(Verbosity::from_count(true, 3), Verbosity::Quiet);
        assert_eq!(Verbosity::from_count(false, 0), Verbosity::Normal);
        assert_eq!(Verbosity::from_count(false, 1), Verbosity::Verbose);
        assert_eq!(Verbosity::from_count(false, 2), Verbosity::Debug);
    }

    #[test]
    fn stderr_levels_follow_verbosity() {
        assert_eq!(Verbosity::Quiet.default_filter(), "error");
        assert_eq!(Verbosity::Normal.default_filter(), "warn");
        assert_eq!(Verbosity::Debug.default_filter(), "debug");
        assert!(EnvFilter::try_new(Verbosity::Verbose.default_filter()).is_ok());
    }
}
