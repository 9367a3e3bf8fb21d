//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup, after the effective level is known.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// HTTP stack targets that are chatty at `debug`; pinned to `warn` unless
/// `RUST_LOG` says otherwise.
const QUIET_TARGETS: &[&str] = &["hyper_util", "h2", "rustls", "reqwest"];

/// Install the global subscriber, writing to stderr.
///
/// With `prefer_level` set (a `-v` flag was given) `level` wins and
/// `RUST_LOG` is only consulted when `level` does not parse. Otherwise
/// `RUST_LOG` wins and `level` is the fallback.
pub fn init(level: &str, prefer_level: bool) -> Result<(), AppError> {
    let filter = if prefer_level {
        match level_filter(level) {
            Ok(filter) => filter,
            Err(level_err) => EnvFilter::try_from_default_env().map_err(|env_err| {
                AppError::Logger(format!(
                    "invalid log level '{level}': {level_err}; RUST_LOG parse failed: {env_err}"
                ))
            })?,
        }
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| level_filter(level))
            .map_err(|e| AppError::Logger(format!("invalid log level '{level}': {e}")))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))?;

    Ok(())
}

/// Build a filter from a config level, with [`QUIET_TARGETS`] pinned to `warn`.
fn level_filter(level: &str) -> Result<EnvFilter, tracing_subscriber::filter::ParseError> {
    let mut filter = EnvFilter::try_new(level)?;
    for target in QUIET_TARGETS {
        filter = filter.add_directive(format!("{target}=warn").parse()?);
    }
    Ok(filter)
}

/// Check that a configured level names one tracing level (`off`, `error`
/// … `trace`). Directive lists like `info,h2=warn` belong in `RUST_LOG`.
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    match level.trim() {
        "" => Err(AppError::Logger("log level must not be empty".into())),
        name => name
            .parse::<LevelFilter>()
            .map_err(|_| AppError::Logger(format!("unrecognised log level: '{name}'"))),
    }
}
