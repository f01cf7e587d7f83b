//! `almacen-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use clock::{Reloj, RelojFijo, RelojSistema};
pub use error::{DomainError, DomainResult, ProductoFaltante};
pub use id::{
    CierreId, ConductorId, EmpleadoId, LoteId, MovimientoId, OrdenId, ProductoId, RecepcionId,
    RutaId, SalidaId,
};
