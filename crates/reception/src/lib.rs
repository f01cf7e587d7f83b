//! Reception domain module: incoming-goods documents and their supervision
//! lifecycle.
//!
//! Documents are aggregates; posting their entradas to the stock ledger is
//! orchestrated by `almacen-infra`.

pub mod documento;
pub mod estado;

pub use documento::{
    ActualizarDetalles, AnularRecepcion, ConfirmarRecepcion, CrearRecepcion, DetalleRecepcion,
    DocumentoRecepcion, EntradaRegistrada, FiltroRecepciones, RecepcionCommand, RecepcionEvent,
    Supervisar,
};
pub use estado::EstadoRecepcion;
