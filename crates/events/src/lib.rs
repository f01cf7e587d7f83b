//! Domain events and their audit records.

pub mod event;
pub mod record;

pub use event::Event;
pub use record::EventRecord;
