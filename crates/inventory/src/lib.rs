//! Inventory domain module: products, lots, the movement ledger and FIFO
//! depletion.
//!
//! This crate contains business rules only, implemented as deterministic
//! domain logic (no IO, no locks, no storage). Concurrency and transactions
//! live in `almacen-infra`.

pub mod fifo;
pub mod kardex;
pub mod lote;
pub mod movimiento;
pub mod producto;
pub mod validator;

pub use fifo::{Asignacion, StockInsuficiente};
pub use kardex::{Correccion, Kardex, PuntoRestauracion};
pub use lote::{EstadoLote, Lote, LoteSpec};
pub use movimiento::{FiltroMovimientos, MovimientoInventario, Origen, Referencia, TipoMovimiento};
pub use producto::{NuevoProducto, Producto};
pub use validator::{Requerimiento, ValidacionStockResult};
