//! Period closings: opening balance, period totals and the closing law
//! `stock_final = stock_inicial + total_entradas - total_salidas`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use almacen_core::{CierreId, DomainError, DomainResult, EmpleadoId, ProductoId};
use almacen_inventory::MovimientoInventario;

use crate::periodo::{Periodo, TipoCierre};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EstadoCierre {
    Activo,
    Archivado,
}

/// Figures of one product over one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totales {
    pub stock_inicial: i64,
    pub total_entradas: i64,
    pub total_salidas: i64,
}

impl Totales {
    pub fn stock_final(&self) -> i64 {
        let exacto = i128::from(self.stock_inicial) + i128::from(self.total_entradas)
            - i128::from(self.total_salidas);
        i64::try_from(exacto).unwrap_or(if exacto < 0 { i64::MIN } else { i64::MAX })
    }
}

/// Opening balance of `periodo`.
///
/// The previous closing wins when there is one. Otherwise the balance is read
/// off the movement stream (`movimientos` in posting order): the stock after
/// the last movement before the period, else the stock before the first
/// movement at or after its start, else `stock_actual`.
pub fn stock_inicial(
    periodo: Periodo,
    anterior: Option<&CierreInventario>,
    movimientos: &[MovimientoInventario],
    stock_actual: i64,
) -> i64 {
    if let Some(cierre) = anterior {
        return cierre.stock_final();
    }
    let inicio = periodo.inicio();
    let (previos, resto): (Vec<_>, Vec<_>) = movimientos
        .iter()
        .partition(|m| m.fecha_movimiento.date_naive() < inicio);
    previos
        .last()
        .map(|m| m.stock_nuevo)
        .or_else(|| resto.first().map(|m| m.stock_anterior))
        .unwrap_or(stock_actual)
}

/// Entradas and salidas dated inside `periodo`. AJUSTE counts on the side its
/// direction points to.
pub fn totales_periodo(periodo: Periodo, movimientos: &[MovimientoInventario]) -> (i64, i64) {
    movimientos
        .iter()
        .filter(|m| periodo.contiene(m.fecha_movimiento.date_naive()))
        .fold((0, 0), |(entradas, salidas), m| {
            let delta = m.delta();
            if delta >= 0 {
                (entradas.saturating_add(delta), salidas)
            } else {
                (entradas, salidas.saturating_sub(delta))
            }
        })
}

pub fn calcular(
    periodo: Periodo,
    anterior: Option<&CierreInventario>,
    movimientos: &[MovimientoInventario],
    stock_actual: i64,
) -> Totales {
    let (total_entradas, total_salidas) = totales_periodo(periodo, movimientos);
    Totales {
        stock_inicial: stock_inicial(periodo, anterior, movimientos, stock_actual),
        total_entradas,
        total_salidas,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CierreInventario {
    id: CierreId,
    producto_id: ProductoId,
    periodo: Periodo,
    tipo_cierre: TipoCierre,
    stock_inicial: i64,
    total_entradas: i64,
    total_salidas: i64,
    stock_final: i64,
    estado: EstadoCierre,
    creado_por: EmpleadoId,
    fecha_cierre: DateTime<Utc>,
    archivado_por: Option<EmpleadoId>,
    fecha_archivo: Option<DateTime<Utc>>,
}

impl CierreInventario {
    pub fn generar(
        producto_id: ProductoId,
        periodo: Periodo,
        totales: Totales,
        creado_por: EmpleadoId,
        ahora: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CierreId::new(),
            producto_id,
            periodo,
            tipo_cierre: periodo.tipo(),
            stock_inicial: totales.stock_inicial,
            total_entradas: totales.total_entradas,
            total_salidas: totales.total_salidas,
            stock_final: totales.stock_final(),
            estado: EstadoCierre::Activo,
            creado_por,
            fecha_cierre: ahora,
            archivado_por: None,
            fecha_archivo: None,
        }
    }

    pub fn id(&self) -> CierreId {
        self.id
    }

    pub fn producto_id(&self) -> ProductoId {
        self.producto_id
    }

    pub fn periodo(&self) -> Periodo {
        self.periodo
    }

    pub fn tipo_cierre(&self) -> TipoCierre {
        self.tipo_cierre
    }

    pub fn stock_inicial(&self) -> i64 {
        self.stock_inicial
    }

    pub fn total_entradas(&self) -> i64 {
        self.total_entradas
    }

    pub fn total_salidas(&self) -> i64 {
        self.total_salidas
    }

    pub fn stock_final(&self) -> i64 {
        self.stock_final
    }

    pub fn estado(&self) -> EstadoCierre {
        self.estado
    }

    pub fn creado_por(&self) -> EmpleadoId {
        self.creado_por
    }

    pub fn fecha_cierre(&self) -> DateTime<Utc> {
        self.fecha_cierre
    }

    pub fn archivado_por(&self) -> Option<EmpleadoId> {
        self.archivado_por
    }

    pub fn fecha_archivo(&self) -> Option<DateTime<Utc>> {
        self.fecha_archivo
    }

    pub fn cumple_ley_de_cierre(&self) -> bool {
        i128::from(self.stock_final)
            == i128::from(self.stock_inicial) + i128::from(self.total_entradas)
                - i128::from(self.total_salidas)
    }

    pub fn archivar(&mut self, por: EmpleadoId, ahora: DateTime<Utc>) -> DomainResult<()> {
        if self.estado == EstadoCierre::Archivado {
            return Err(DomainError::conflict(format!(
                "cierre {} of {} is already archived",
                self.id, self.periodo
            )));
        }
        self.estado = EstadoCierre::Archivado;
        self.archivado_por = Some(por);
        self.fecha_archivo = Some(ahora);
        Ok(())
    }
}
