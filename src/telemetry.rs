//! Logging and metrics setup

use crate::config::MonitoringConfig;
use tracing_subscriber::EnvFilter;

/// Install logging, and register metrics when enabled
pub fn init(config: &MonitoringConfig) {
    init_tracing(config);
    if config.metrics_enabled {
        crate::metrics::init();
    }
}

/// Install the global `tracing` subscriber
///
/// `RUST_LOG` takes precedence over the configured level. Returns false when
/// a subscriber was already installed, which leaves the existing one active.
pub fn init_tracing(config: &MonitoringConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        let config = MonitoringConfig {
            log_level: "not a [valid directive".to_string(),
            ..Default::default()
        };
        init_tracing(&config);
        assert!(!init_tracing(&MonitoringConfig::default()));
    }
}
