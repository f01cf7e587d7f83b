//! Subscriber installation.

use tracing_subscriber::EnvFilter;

use crate::ObservabilityConfig;

fn filtro(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init(config: &ObservabilityConfig) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filtro(config))
        .with_timer(tracing_subscriber::fmt::time::SystemTime);

    let instalado = if config.json {
        builder.json().with_target(false).try_init().is_ok()
    } else {
        builder.with_target(true).try_init().is_ok()
    };
    if instalado {
        ::tracing::debug!(json = config.json, filter = %config.filter, "tracing subscriber installed");
    }
    instalado
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        let config = ObservabilityConfig {
            filter: "almacen=debug".to_string(),
            json: true,
        };
        let _ = init(&config);
        assert!(!init(&config));
    }

    #[test]
    fn malformed_filter_falls_back() {
        let config = ObservabilityConfig {
            filter: "[[".to_string(),
            json: false,
        };
        let _ = filtro(&config);
    }
}
