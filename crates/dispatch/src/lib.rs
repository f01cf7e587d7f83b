//! Dispatch domain module: orders claimed by outgoing documents, and the
//! document lifecycle up to depletion.
//!
//! FIFO depletion itself happens in the stock ledger (`almacen-infra`);
//! this crate only decides.

pub mod documento;
pub mod estado;
pub mod orden;

pub use documento::{
    AgregarOrdenes, CambiarEstado, CrearSalida, Despachar, DocumentoSalida, FiltroSalidas,
    SalidaCommand, SalidaEvent,
};
pub use estado::EstadoSalida;
pub use orden::{EstadoOrden, LineaOrden, NuevaOrden, Orden, ResumenOrden};
