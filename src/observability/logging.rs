//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Default filter when nothing else is configured.
const DEFAULT_FILTER: &str = "warn,ingrisk=info";

/// Filter used with `--verbose`.
const VERBOSE_FILTER: &str = "info,ingrisk=debug";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name, falling back to [`LogFormat::Pretty`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Event filter.
    pub filter: EnvFilter,
    /// Log file; stderr when unset.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Builds logging configuration from settings.
    ///
    /// Filter precedence: `INGRISK_LOG`, `RUST_LOG`, `--verbose`, the config
    /// file, then the built-in default.
    #[must_use]
    pub fn from_settings(settings: &LoggingSettings, verbose: bool) -> Self {
        Self::from_settings_with(settings, verbose, |key| std::env::var(key).ok())
    }

    fn from_settings_with<F>(settings: &LoggingSettings, verbose: bool, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let directive = filter_directive(settings, verbose, lookup);
        let filter = EnvFilter::try_new(&directive).unwrap_or_else(|e| {
            eprintln!("ingrisk: invalid log filter '{directive}': {e}; using '{DEFAULT_FILTER}'");
            EnvFilter::new(DEFAULT_FILTER)
        });

        Self {
            format: settings
                .format
                .as_deref()
                .map(LogFormat::parse)
                .unwrap_or_default(),
            filter,
            file: settings.file.clone(),
        }
    }
}

fn filter_directive<F>(settings: &LoggingSettings, verbose: bool, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let from_env = || {
        ["INGRISK_LOG", "RUST_LOG"]
            .iter()
            .filter_map(|key| lookup(key))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
    };

    from_env()
        .or_else(|| verbose.then(|| VERBOSE_FILTER.to_string()))
        .or_else(|| settings.filter.clone())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}
