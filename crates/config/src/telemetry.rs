//! Tracing subscriber setup

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::settings::ObservabilitySettings;

/// Initialize the global tracing subscriber
///
/// RUST_LOG wins over the configured level. Safe to call once per process;
/// returns quietly if a subscriber is already installed (tests).
pub fn init(settings: &ObservabilitySettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone()));

    let registry = tracing_subscriber::registry().with(filter);

    let result = if settings.json_logs {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
