//! Tracing subscriber setup

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::AclConfig;

/// Install a global fmt subscriber filtered by `RUST_LOG`, or `level` when unset
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

/// [`init_tracing`] at the configured `log_level`
pub fn init_tracing_from_config(config: &AclConfig) -> bool {
    init_tracing(&config.log_level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        init_tracing("debug");
        assert!(!init_tracing("info"));
    }
}
