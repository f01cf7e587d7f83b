//! Time source injected into the engines.
//!
//! Expiry classification and movement timestamps depend on "now"; engines
//! receive a `Reloj` at construction instead of reading the system clock
//! directly, so tests can pin the date.

use std::sync::RwLock;

use chrono::{DateTime, Duration, NaiveDate, Utc};

pub trait Reloj: Send + Sync {
    fn ahora(&self) -> DateTime<Utc>;

    /// Calendar date used for expiry checks (UTC).
    fn hoy(&self) -> NaiveDate {
        self.ahora().date_naive()
    }
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct RelojSistema;

impl Reloj for RelojSistema {
    fn ahora(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug)]
pub struct RelojFijo {
    ahora: RwLock<DateTime<Utc>>,
}

impl RelojFijo {
    pub fn new(ahora: DateTime<Utc>) -> Self {
        Self {
            ahora: RwLock::new(ahora),
        }
    }

    /// Clock pinned at noon UTC of the given date.
    pub fn en_fecha(fecha: NaiveDate) -> Self {
        let mediodia = fecha.and_hms_opt(12, 0, 0).unwrap_or_default();
        Self::new(mediodia.and_utc())
    }

    pub fn fijar(&self, ahora: DateTime<Utc>) {
        if let Ok(mut guard) = self.ahora.write() {
            *guard = ahora;
        }
    }

    pub fn avanzar(&self, delta: Duration) {
        if let Ok(mut guard) = self.ahora.write() {
            *guard += delta;
        }
    }
}

impl Reloj for RelojFijo {
    fn ahora(&self) -> DateTime<Utc> {
        match self.ahora.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
