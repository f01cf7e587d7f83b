//! Tracing and logging setup shared by every process that embeds the
//! warehouse engine.

use serde::{Deserialize, Serialize};

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is not set.
    pub filter: String,
    /// JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Initialize process-wide tracing.
///
/// Safe to call multiple times; returns `false` when a subscriber was
/// already installed.
pub fn init(config: &ObservabilityConfig) -> bool {
    tracing::init(config)
}

/// Tracing configuration (filters, layers).
pub mod tracing;
