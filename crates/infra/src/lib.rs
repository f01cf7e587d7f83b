//! Infrastructure layer: the concurrent stock ledger, document repositories,
//! the engines built on them, and configuration.

pub mod almacen;
pub mod cierre;
pub mod config;
pub mod ledger;
pub mod numeracion;
pub mod recepcion;
pub mod repository;
pub mod salida;

#[cfg(test)]
mod integration_tests;

pub use almacen::Almacen;
pub use cierre::CierreEngine;
pub use config::AlmacenConfig;
pub use ledger::{FalloRecalculo, RecalculoReporte, StockLedger, Transaccion};
pub use numeracion::Numerador;
pub use recepcion::{DocumentoRecepcionEngine, NuevaRecepcion};
pub use repository::{Flujo, InMemoryRepository};
pub use salida::{DocumentoSalidaEngine, NuevaSalida};
