use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use almacen_core::DomainError;

/// Reception document lifecycle.
///
/// ```text
/// PENDIENTE  -> CONFIRMADO | ANULADO
/// CONFIRMADO -> ANULADO | REVISADO
/// REVISADO   -> CERRADO | CORREGIDO | CON_AJUSTES
/// CORREGIDO  -> REVISADO
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EstadoRecepcion {
    Pendiente,
    Confirmado,
    Anulado,
    Revisado,
    Cerrado,
    Corregido,
    ConAjustes,
}

impl EstadoRecepcion {
    pub const TODOS: [EstadoRecepcion; 7] = [
        EstadoRecepcion::Pendiente,
        EstadoRecepcion::Confirmado,
        EstadoRecepcion::Anulado,
        EstadoRecepcion::Revisado,
        EstadoRecepcion::Cerrado,
        EstadoRecepcion::Corregido,
        EstadoRecepcion::ConAjustes,
    ];

    /// Outgoing edges; anything not listed is rejected.
    pub fn transiciones(self) -> &'static [EstadoRecepcion] {
        use EstadoRecepcion::*;
        match self {
            Pendiente => &[Confirmado, Anulado],
            Confirmado => &[Anulado, Revisado],
            Revisado => &[Cerrado, Corregido, ConAjustes],
            Corregido => &[Revisado],
            Anulado | Cerrado | ConAjustes => &[],
        }
    }

    pub fn puede_pasar_a(self, destino: EstadoRecepcion) -> bool {
        self.transiciones().contains(&destino)
    }

    pub fn es_terminal(self) -> bool {
        self.transiciones().is_empty()
    }

    /// Whether entradas are on the ledger for a document in this state.
    pub fn tiene_entradas(self) -> bool {
        !matches!(self, EstadoRecepcion::Pendiente | EstadoRecepcion::Anulado)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EstadoRecepcion::Pendiente => "PENDIENTE",
            EstadoRecepcion::Confirmado => "CONFIRMADO",
            EstadoRecepcion::Anulado => "ANULADO",
            EstadoRecepcion::Revisado => "REVISADO",
            EstadoRecepcion::Cerrado => "CERRADO",
            EstadoRecepcion::Corregido => "CORREGIDO",
            EstadoRecepcion::ConAjustes => "CON_AJUSTES",
        }
    }
}

impl fmt::Display for EstadoRecepcion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EstadoRecepcion {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalizado = s.trim().to_ascii_uppercase();
        EstadoRecepcion::TODOS
            .into_iter()
            .find(|e| e.as_str() == normalizado)
            .ok_or_else(|| DomainError::validation(format!("unknown estado de recepción: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_documented_edges() {
        use EstadoRecepcion::*;
        let permitidas = [
            (Pendiente, Confirmado),
            (Pendiente, Anulado),
            (Confirmado, Anulado),
            (Confirmado, Revisado),
            (Revisado, Cerrado),
            (Revisado, Corregido),
            (Revisado, ConAjustes),
            (Corregido, Revisado),
        ];
        for desde in EstadoRecepcion::TODOS {
            for hacia in EstadoRecepcion::TODOS {
                assert_eq!(
                    desde.puede_pasar_a(hacia),
                    permitidas.contains(&(desde, hacia)),
                    "{desde} -> {hacia}"
                );
            }
        }
    }

    #[test]
    fn anulado_is_terminal() {
        assert!(EstadoRecepcion::Anulado.es_terminal());
        assert!(!EstadoRecepcion::Confirmado.es_terminal());
    }

    #[test]
    fn parses_wire_names() {
        assert_eq!("con_ajustes".parse::<EstadoRecepcion>().unwrap(), EstadoRecepcion::ConAjustes);
        assert!("BORRADOR".parse::<EstadoRecepcion>().is_err());
        assert_eq!(
            serde_json::to_string(&EstadoRecepcion::ConAjustes).unwrap(),
            "\"CON_AJUSTES\""
        );
    }
}
