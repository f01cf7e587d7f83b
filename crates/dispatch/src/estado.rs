use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use almacen_core::DomainError;

/// Dispatch document lifecycle.
///
/// ```text
/// PENDIENTE      -> EN_PREPARACION | CANCELADO
/// EN_PREPARACION -> LISTO | CANCELADO
/// LISTO          -> DESPACHADA
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EstadoSalida {
    Pendiente,
    EnPreparacion,
    Listo,
    Despachada,
    Cancelado,
}

impl EstadoSalida {
    pub const TODOS: [EstadoSalida; 5] = [
        EstadoSalida::Pendiente,
        EstadoSalida::EnPreparacion,
        EstadoSalida::Listo,
        EstadoSalida::Despachada,
        EstadoSalida::Cancelado,
    ];

    pub fn transiciones(self) -> &'static [EstadoSalida] {
        use EstadoSalida::*;
        match self {
            Pendiente => &[EnPreparacion, Cancelado],
            EnPreparacion => &[Listo, Cancelado],
            Listo => &[Despachada],
            Despachada | Cancelado => &[],
        }
    }

    pub fn puede_pasar_a(self, destino: EstadoSalida) -> bool {
        self.transiciones().contains(&destino)
    }

    pub fn es_terminal(self) -> bool {
        self.transiciones().is_empty()
    }

    /// Documents that still hold their order claims.
    pub fn activo(self) -> bool {
        self != EstadoSalida::Cancelado
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EstadoSalida::Pendiente => "PENDIENTE",
            EstadoSalida::EnPreparacion => "EN_PREPARACION",
            EstadoSalida::Listo => "LISTO",
            EstadoSalida::Despachada => "DESPACHADA",
            EstadoSalida::Cancelado => "CANCELADO",
        }
    }
}

impl fmt::Display for EstadoSalida {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EstadoSalida {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalizado = s.trim().to_ascii_uppercase();
        EstadoSalida::TODOS
            .into_iter()
            .find(|e| e.as_str() == normalizado)
            .ok_or_else(|| DomainError::validation(format!("unknown estado de salida: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_only_before_ready() {
        use EstadoSalida::*;
        assert!(Pendiente.puede_pasar_a(Cancelado));
        assert!(EnPreparacion.puede_pasar_a(Cancelado));
        assert!(!Listo.puede_pasar_a(Cancelado));
        assert!(!Despachada.puede_pasar_a(Cancelado));
    }

    #[test]
    fn no_skipping_steps() {
        use EstadoSalida::*;
        assert!(!Pendiente.puede_pasar_a(Listo));
        assert!(!Pendiente.puede_pasar_a(Despachada));
        assert!(!EnPreparacion.puede_pasar_a(Despachada));
        assert!(!Listo.puede_pasar_a(Pendiente));
    }

    #[test]
    fn terminal_states_have_no_edges() {
        for estado in EstadoSalida::TODOS {
            assert_eq!(
                estado.es_terminal(),
                matches!(estado, EstadoSalida::Despachada | EstadoSalida::Cancelado)
            );
        }
    }

    #[test]
    fn wire_name_uses_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&EstadoSalida::EnPreparacion).unwrap(),
            "\"EN_PREPARACION\""
        );
        assert_eq!("en_preparacion".parse::<EstadoSalida>().unwrap(), EstadoSalida::EnPreparacion);
    }
}
