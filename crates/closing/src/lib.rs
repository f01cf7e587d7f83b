//! Period closing module: monthly and yearly stock snapshots per product.

pub mod cierre;
pub mod periodo;

pub use cierre::{CierreInventario, EstadoCierre, Totales, calcular};
pub use periodo::{Periodo, TipoCierre};
