use core::fmt;
use core::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use almacen_core::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TipoCierre {
    Mensual,
    Anual,
}

/// Closing period, written `YYYY-MM` (monthly) or `YYYY` (yearly).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Periodo {
    Mensual { anio: i32, mes: u32 },
    Anual { anio: i32 },
}

impl Periodo {
    pub fn mensual(anio: i32, mes: u32) -> DomainResult<Self> {
        if !(1..=12).contains(&mes) {
            return Err(DomainError::validation(format!("mes fuera de rango: {mes}")));
        }
        Self::validar_anio(anio)?;
        Ok(Periodo::Mensual { anio, mes })
    }

    pub fn anual(anio: i32) -> DomainResult<Self> {
        Self::validar_anio(anio)?;
        Ok(Periodo::Anual { anio })
    }

    fn validar_anio(anio: i32) -> DomainResult<()> {
        if !(1900..=9998).contains(&anio) {
            return Err(DomainError::validation(format!("año fuera de rango: {anio}")));
        }
        Ok(())
    }

    pub fn tipo(self) -> TipoCierre {
        match self {
            Periodo::Mensual { .. } => TipoCierre::Mensual,
            Periodo::Anual { .. } => TipoCierre::Anual,
        }
    }

    /// First day of the period.
    pub fn inicio(self) -> NaiveDate {
        let (anio, mes) = match self {
            Periodo::Mensual { anio, mes } => (anio, mes),
            Periodo::Anual { anio } => (anio, 1),
        };
        NaiveDate::from_ymd_opt(anio, mes, 1).unwrap_or(NaiveDate::MIN)
    }

    /// First day after the period.
    pub fn fin_exclusivo(self) -> NaiveDate {
        self.siguiente().inicio()
    }

    /// Last day of the period (inclusive).
    pub fn fin(self) -> NaiveDate {
        self.fin_exclusivo().pred_opt().unwrap_or(NaiveDate::MAX)
    }

    pub fn contiene(self, fecha: NaiveDate) -> bool {
        fecha >= self.inicio() && fecha < self.fin_exclusivo()
    }

    pub fn anterior(self) -> Periodo {
        match self {
            Periodo::Mensual { anio, mes: 1 } => Periodo::Mensual { anio: anio - 1, mes: 12 },
            Periodo::Mensual { anio, mes } => Periodo::Mensual { anio, mes: mes - 1 },
            Periodo::Anual { anio } => Periodo::Anual { anio: anio - 1 },
        }
    }

    pub fn siguiente(self) -> Periodo {
        match self {
            Periodo::Mensual { anio, mes: 12 } => Periodo::Mensual { anio: anio + 1, mes: 1 },
            Periodo::Mensual { anio, mes } => Periodo::Mensual { anio, mes: mes + 1 },
            Periodo::Anual { anio } => Periodo::Anual { anio: anio + 1 },
        }
    }
}

impl fmt::Display for Periodo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Periodo::Mensual { anio, mes } => write!(f, "{anio:04}-{mes:02}"),
            Periodo::Anual { anio } => write!(f, "{anio:04}"),
        }
    }
}

impl FromStr for Periodo {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalido = || DomainError::validation(format!("periodo must be YYYY-MM or YYYY, got {s:?}"));
        let digitos = |p: &str, n: usize| p.len() == n && p.bytes().all(|b| b.is_ascii_digit());

        match s.split_once('-') {
            Some((anio, mes)) if digitos(anio, 4) && digitos(mes, 2) => {
                let anio = anio.parse().map_err(|_| invalido())?;
                let mes = mes.parse().map_err(|_| invalido())?;
                Periodo::mensual(anio, mes)
            }
            None if digitos(s, 4) => Periodo::anual(s.parse().map_err(|_| invalido())?),
            _ => Err(invalido()),
        }
    }
}

impl TryFrom<String> for Periodo {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Periodo> for String {
    fn from(value: Periodo) -> Self {
        value.to_string()
    }
}
