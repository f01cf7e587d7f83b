use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use almacen_core::EmpleadoId;

use crate::Event;

/// Audit record for one event applied to a document stream.
///
/// Notes:
/// - **Append-only**: `sequence_number` increases by one per stream, starting at 1.
/// - `actor` is whoever the caller said performed the action; it is recorded, never checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord<E> {
    sequence_number: u64,
    event_type: String,
    actor: Option<EmpleadoId>,
    recorded_at: DateTime<Utc>,
    payload: E,
}

impl<E: Event> EventRecord<E> {
    pub fn new(sequence_number: u64, actor: Option<EmpleadoId>, payload: E) -> Self {
        Self {
            sequence_number,
            event_type: payload.event_type().to_string(),
            actor,
            recorded_at: payload.occurred_at(),
            payload,
        }
    }
}

impl<E> EventRecord<E> {
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn actor(&self) -> Option<EmpleadoId> {
        self.actor
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl<E: Serialize> EventRecord<E> {
    /// JSON form handed to external consumers (report generator, audit export).
    pub fn to_json(&self) -> Result<JsonValue, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize)]
    struct Probado {
        at: DateTime<Utc>,
    }

    impl Event for Probado {
        fn event_type(&self) -> &'static str {
            "test.probado"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.at
        }
    }

    #[test]
    fn record_copies_event_metadata() {
        let at = Utc::now();
        let actor = EmpleadoId::new();
        let record = EventRecord::new(3, Some(actor), Probado { at });

        assert_eq!(record.sequence_number(), 3);
        assert_eq!(record.event_type(), "test.probado");
        assert_eq!(record.actor(), Some(actor));
        assert_eq!(record.recorded_at(), at);

        let json = record.to_json().unwrap();
        assert_eq!(json["event_type"], "test.probado");
        assert_eq!(json["sequence_number"], 3);
    }
}
