//! Logging setup for hosts that do not install their own subscriber.

use tracing_subscriber::EnvFilter;

use mnema_core::config::GeneralConfig;

/// Filter built from the configured level; an unparsable level falls back
/// to `info`.
#[must_use]
pub fn filter_for(config: &GeneralConfig) -> EnvFilter {
    EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a global fmt subscriber. `RUST_LOG` overrides the configured
/// level. Returns `false` if a subscriber was already installed.
pub fn init(config: &GeneralConfig) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for(config));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}
