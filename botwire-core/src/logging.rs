//! Log level selection.
//!
//! The level ladder is `NONE < ERROR < WARNING < INFO < DEBUG`, read from
//! `RLBOT_LOG_LEVEL` and defaulting to `WARNING`.

use tracing_subscriber::filter::LevelFilter;

use crate::config::ENV_LOG_LEVEL;

/// Parse one rung of the level ladder. Unknown values fall back to `WARNING`.
#[must_use]
pub fn parse_level(value: &str) -> LevelFilter {
    match value.trim().to_ascii_uppercase().as_str() {
        "NONE" => LevelFilter::OFF,
        "ERROR" => LevelFilter::ERROR,
        "WARNING" => LevelFilter::WARN,
        "INFO" => LevelFilter::INFO,
        "DEBUG" => LevelFilter::DEBUG,
        _ => LevelFilter::WARN,
    }
}

/// The level selected by the environment, or the default.
#[must_use]
pub fn level_from_env() -> LevelFilter {
    std::env::var(ENV_LOG_LEVEL)
        .map(|v| parse_level(&v))
        .unwrap_or(LevelFilter::WARN)
}

/// Install a fmt subscriber at the environment-selected level.
///
/// Best-effort: a no-op when a global subscriber is already installed, so
/// tests and embedding applications can bring their own.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level_from_env())
        .try_init();
}
