//! Domain error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::ProductoId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// One product that cannot be served from current stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductoFaltante {
    pub id_producto: ProductoId,
    pub cantidad_necesaria: i64,
    pub stock_disponible: i64,
    /// `cantidad_necesaria - stock_disponible`, always positive.
    pub cantidad_faltante: i64,
}

impl ProductoFaltante {
    pub fn new(id_producto: ProductoId, cantidad_necesaria: i64, stock_disponible: i64) -> Self {
        Self {
            id_producto,
            cantidad_necesaria,
            stock_disponible,
            cantidad_faltante: cantidad_necesaria - stock_disponible,
        }
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// conflicts, stock shortfalls). Any operation failing with one of these
/// leaves stock, lots and documents untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input, invalid state transition, non-positive quantity.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated (including poisoned locks).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Unknown product, lot, document or order.
    #[error("not found: {0}")]
    NotFound(String),

    /// Stale state, duplicate closing, order already claimed.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Requested quantities exceed what stock can serve.
    #[error("insufficient stock for {} product(s)", .0.len())]
    InsufficientStock(Vec<ProductoFaltante>),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn insufficient_stock(faltantes: Vec<ProductoFaltante>) -> Self {
        Self::InsufficientStock(faltantes)
    }

    /// Error used when a transition table rejects an edge.
    pub fn transicion_invalida(desde: impl core::fmt::Debug, hacia: impl core::fmt::Debug) -> Self {
        Self::Validation(format!("transición inválida: {desde:?} -> {hacia:?}"))
    }

    /// Error used when a `std::sync` lock is found poisoned.
    pub fn lock_poisoned() -> Self {
        Self::InvariantViolation("lock poisoned".to_string())
    }

    pub fn faltantes(&self) -> Option<&[ProductoFaltante]> {
        match self {
            Self::InsufficientStock(f) => Some(f),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faltante_computes_missing_quantity() {
        let p = ProductoId::new();
        let f = ProductoFaltante::new(p, 20, 7);
        assert_eq!(f.cantidad_faltante, 13);
    }

    #[test]
    fn insufficient_stock_exposes_shortfalls() {
        let p = ProductoId::new();
        let err = DomainError::insufficient_stock(vec![ProductoFaltante::new(p, 5, 2)]);
        assert_eq!(err.faltantes().map(|f| f.len()), Some(1));
        assert_eq!(err.to_string(), "insufficient stock for 1 product(s)");
        assert!(DomainError::conflict("x").faltantes().is_none());
    }

    #[test]
    fn transicion_invalida_is_a_validation_error() {
        let err = DomainError::transicion_invalida("LISTO", "PENDIENTE");
        match err {
            DomainError::Validation(msg) if msg.contains("transición inválida") => {}
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
