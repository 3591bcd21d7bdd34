//! Logging utilities

pub use log::{debug, error, info, trace, warn};

use log::LevelFilter;

/// Parse a textual log level, falling back to `Info` for unknown names
pub fn parse_level(level: &str) -> LevelFilter {
    level.parse().unwrap_or(LevelFilter::Info)
}

/// Initialize the logging system
///
/// `RUST_LOG` still wins over `default_level` when it is set.
pub fn init(default_level: &str) {
    let result = env_logger::Builder::new()
        .filter_level(parse_level(default_level))
        .parse_default_env()
        .try_init();

    if result.is_err() {
        log::debug!("Logger already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_level("WARN"), LevelFilter::Warn);
        assert_eq!(parse_level("nonsense"), LevelFilter::Info);
    }
}
