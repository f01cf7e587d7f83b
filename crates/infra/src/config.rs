//! Configuration loading.
//!
//! Values come from environment variables; anything missing or malformed
//! falls back to its default with a warning.

use serde::{Deserialize, Serialize};
use tracing::warn;

use almacen_observability::ObservabilityConfig;

pub const ENV_DIAS_ALERTA_VENCIMIENTO: &str = "ALMACEN_DIAS_ALERTA_VENCIMIENTO";
pub const ENV_PREFIJO_RECEPCION: &str = "ALMACEN_PREFIJO_RECEPCION";
pub const ENV_PREFIJO_SALIDA: &str = "ALMACEN_PREFIJO_SALIDA";
pub const ENV_LOG_FILTER: &str = "ALMACEN_LOG_FILTER";
pub const ENV_LOG_JSON: &str = "ALMACEN_LOG_JSON";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlmacenConfig {
    /// Default horizon of the "expiring soon" lot listing.
    pub dias_alerta_vencimiento: u32,
    pub prefijo_recepcion: String,
    pub prefijo_salida: String,
    pub observabilidad: ObservabilityConfig,
}

impl Default for AlmacenConfig {
    fn default() -> Self {
        Self {
            dias_alerta_vencimiento: 30,
            prefijo_recepcion: "REC".to_string(),
            prefijo_salida: "SAL".to_string(),
            observabilidad: ObservabilityConfig::default(),
        }
    }
}

impl AlmacenConfig {
    pub fn from_env() -> Self {
        Self::desde(|clave| std::env::var(clave).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn desde(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defecto = Self::default();
        let texto = |clave: &str| {
            lookup(clave)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let dias_alerta_vencimiento = match texto(ENV_DIAS_ALERTA_VENCIMIENTO) {
            Some(v) => v.parse().unwrap_or_else(|_| {
                warn!(
                    variable = ENV_DIAS_ALERTA_VENCIMIENTO,
                    valor = %v,
                    "not a day count; using default"
                );
                defecto.dias_alerta_vencimiento
            }),
            None => defecto.dias_alerta_vencimiento,
        };

        let json = match texto(ENV_LOG_JSON).map(|v| v.to_ascii_lowercase()) {
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes") => true,
            Some(v) if matches!(v.as_str(), "0" | "false" | "no") => false,
            Some(v) => {
                warn!(variable = ENV_LOG_JSON, valor = %v, "not a boolean; using default");
                defecto.observabilidad.json
            }
            None => defecto.observabilidad.json,
        };

        Self {
            dias_alerta_vencimiento,
            prefijo_recepcion: texto(ENV_PREFIJO_RECEPCION).unwrap_or(defecto.prefijo_recepcion),
            prefijo_salida: texto(ENV_PREFIJO_SALIDA).unwrap_or(defecto.prefijo_salida),
            observabilidad: ObservabilityConfig {
                filter: texto(ENV_LOG_FILTER).unwrap_or(defecto.observabilidad.filter),
                json,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pares: &[(&str, &str)]) -> AlmacenConfig {
        let mapa: HashMap<String, String> = pares
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AlmacenConfig::desde(|k| mapa.get(k).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(config(&[]), AlmacenConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let c = config(&[
            (ENV_DIAS_ALERTA_VENCIMIENTO, "15"),
            (ENV_PREFIJO_RECEPCION, "ING"),
            (ENV_PREFIJO_SALIDA, " DES "),
            (ENV_LOG_FILTER, "almacen_infra=debug"),
            (ENV_LOG_JSON, "TRUE"),
        ]);
        assert_eq!(c.dias_alerta_vencimiento, 15);
        assert_eq!(c.prefijo_recepcion, "ING");
        assert_eq!(c.prefijo_salida, "DES");
        assert_eq!(c.observabilidad.filter, "almacen_infra=debug");
        assert!(c.observabilidad.json);
    }

    #[test]
    fn malformed_values_fall_back() {
        let c = config(&[(ENV_DIAS_ALERTA_VENCIMIENTO, "-3"), (ENV_LOG_JSON, "quizas")]);
        assert_eq!(c.dias_alerta_vencimiento, 30);
        assert!(!c.observabilidad.json);
    }
}
