use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use almacen_core::{EmpleadoId, LoteId, MovimientoId, ProductoId, RecepcionId, SalidaId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TipoMovimiento {
    Entrada,
    Salida,
    Ajuste,
}

/// Source a movement is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "tipo", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Referencia {
    Recepcion(RecepcionId),
    Salida(SalidaId),
    Lote(LoteId),
    Externa(String),
}

/// Why and on whose behalf a movement is posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origen {
    pub motivo: String,
    pub referencia: Option<Referencia>,
    pub id_empleado: Option<EmpleadoId>,
}

impl Origen {
    pub fn new(motivo: impl Into<String>) -> Self {
        Self {
            motivo: motivo.into(),
            referencia: None,
            id_empleado: None,
        }
    }

    pub fn con_referencia(mut self, referencia: Referencia) -> Self {
        self.referencia = Some(referencia);
        self
    }

    pub fn por(mut self, id_empleado: EmpleadoId) -> Self {
        self.id_empleado = Some(id_empleado);
        self
    }
}

/// Immutable ledger entry.
///
/// `stock_anterior`/`stock_nuevo` are product-level figures (lot-aggregated for
/// lot-tracked products), so the entries of one product chain together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovimientoInventario {
    pub id: MovimientoId,
    /// Position in the product's stream, starting at 1.
    pub secuencia: u64,
    pub producto_id: ProductoId,
    pub lote_id: Option<LoteId>,
    pub tipo: TipoMovimiento,
    pub cantidad: i64,
    pub stock_anterior: i64,
    pub stock_nuevo: i64,
    pub motivo: String,
    pub referencia: Option<Referencia>,
    pub id_empleado: Option<EmpleadoId>,
    pub fecha_movimiento: DateTime<Utc>,
}

impl MovimientoInventario {
    /// Effect on product stock (positive increases it).
    pub fn delta(&self) -> i64 {
        self.stock_nuevo - self.stock_anterior
    }

    pub fn es_ingreso(&self) -> bool {
        self.delta() > 0
    }
}

/// Query over the ledger; all criteria optional, date bounds inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiltroMovimientos {
    pub producto_id: Option<ProductoId>,
    pub tipo: Option<TipoMovimiento>,
    pub desde: Option<DateTime<Utc>>,
    pub hasta: Option<DateTime<Utc>>,
}

impl FiltroMovimientos {
    pub fn por_producto(producto_id: ProductoId) -> Self {
        Self {
            producto_id: Some(producto_id),
            ..Self::default()
        }
    }

    pub fn coincide(&self, m: &MovimientoInventario) -> bool {
        self.producto_id.is_none_or(|p| p == m.producto_id)
            && self.tipo.is_none_or(|t| t == m.tipo)
            && self.desde.is_none_or(|d| m.fecha_movimiento >= d)
            && self.hasta.is_none_or(|h| m.fecha_movimiento <= h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn movimiento(tipo: TipoMovimiento, anterior: i64, nuevo: i64) -> MovimientoInventario {
        MovimientoInventario {
            id: MovimientoId::new(),
            secuencia: 1,
            producto_id: ProductoId::new(),
            lote_id: None,
            tipo,
            cantidad: (nuevo - anterior).abs(),
            stock_anterior: anterior,
            stock_nuevo: nuevo,
            motivo: "test".to_string(),
            referencia: None,
            id_empleado: None,
            fecha_movimiento: Utc::now(),
        }
    }

    #[test]
    fn ajuste_direction_comes_from_stock_pair() {
        assert!(movimiento(TipoMovimiento::Ajuste, 5, 8).es_ingreso());
        assert_eq!(movimiento(TipoMovimiento::Ajuste, 8, 5).delta(), -3);
    }

    #[test]
    fn filter_bounds_are_inclusive() {
        let m = movimiento(TipoMovimiento::Salida, 10, 4);
        let filtro = FiltroMovimientos {
            producto_id: Some(m.producto_id),
            tipo: Some(TipoMovimiento::Salida),
            desde: Some(m.fecha_movimiento),
            hasta: Some(m.fecha_movimiento),
        };
        assert!(filtro.coincide(&m));

        let fuera = FiltroMovimientos {
            desde: Some(m.fecha_movimiento + Duration::seconds(1)),
            ..FiltroMovimientos::default()
        };
        assert!(!fuera.coincide(&m));
        assert!(!FiltroMovimientos::por_producto(ProductoId::new()).coincide(&m));
    }

    #[test]
    fn referencia_serializes_tagged() {
        let id = SalidaId::new();
        let json = serde_json::to_value(Referencia::Salida(id)).unwrap();
        assert_eq!(json["tipo"], "SALIDA");
        assert_eq!(json["id"], id.to_string());
    }
}
