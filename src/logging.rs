//! # Structured Logging
//!
//! Environment-aware tracing setup. Development gets human-readable
//! console output, production gets JSON lines for log aggregation.
//! `RUST_LOG` overrides the per-environment default filter.

use crate::config::detect_environment;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize the global tracing subscriber once. Safe to call from
/// multiple entry points; later calls are no-ops, and an already-set
/// subscriber (e.g. from a host application) is left in place.
pub fn init_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = detect_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_log_level(&environment)));

        let registry = tracing_subscriber::registry();
        let result = if environment == "production" {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_ansi(false)
                        .with_filter(filter),
                )
                .try_init()
        } else {
            registry
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_level(true)
                        .with_filter(filter),
                )
                .try_init()
        };

        if result.is_err() {
            tracing::debug!("Global tracing subscriber already set; keeping it");
        } else {
            tracing::info!(environment = %environment, "🔧 Structured logging initialized");
        }
    });
}

fn default_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}
