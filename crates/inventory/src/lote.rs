use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use almacen_core::{DomainError, DomainResult, LoteId, ProductoId};

/// Batch status.
///
/// Derived from quantity and expiry on every mutation; only `Archivado` is
/// sticky. `Vencido` wins over `Agotado` for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EstadoLote {
    Activo,
    Agotado,
    Vencido,
    Archivado,
}

/// Identity and dates of a batch, as supplied by receptions or manual creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoteSpec {
    pub codigo_lote: String,
    pub fecha_elaboracion: NaiveDate,
    pub fecha_vencimiento: Option<NaiveDate>,
}

impl LoteSpec {
    pub fn new(
        codigo_lote: impl Into<String>,
        fecha_elaboracion: NaiveDate,
        fecha_vencimiento: Option<NaiveDate>,
    ) -> Self {
        Self {
            codigo_lote: codigo_lote.into(),
            fecha_elaboracion,
            fecha_vencimiento,
        }
    }

    pub fn validar(&self) -> DomainResult<()> {
        if self.codigo_lote.trim().is_empty() {
            return Err(DomainError::validation("codigo_lote cannot be empty"));
        }
        if let Some(vence) = self.fecha_vencimiento {
            if vence < self.fecha_elaboracion {
                return Err(DomainError::validation(
                    "fecha_vencimiento cannot precede fecha_elaboracion",
                ));
            }
        }
        Ok(())
    }
}

/// A dated quantity of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lote {
    id: LoteId,
    producto_id: ProductoId,
    codigo_lote: String,
    fecha_elaboracion: NaiveDate,
    fecha_vencimiento: Option<NaiveDate>,
    cantidad_inicial: i64,
    cantidad_actual: i64,
    estado: EstadoLote,
}

impl Lote {
    pub(crate) fn crear(
        producto_id: ProductoId,
        spec: &LoteSpec,
        cantidad: i64,
        hoy: NaiveDate,
    ) -> DomainResult<Self> {
        spec.validar()?;
        if cantidad <= 0 {
            return Err(DomainError::validation("cantidad must be positive"));
        }
        let mut lote = Self {
            id: LoteId::new(),
            producto_id,
            codigo_lote: spec.codigo_lote.trim().to_string(),
            fecha_elaboracion: spec.fecha_elaboracion,
            fecha_vencimiento: spec.fecha_vencimiento,
            cantidad_inicial: cantidad,
            cantidad_actual: cantidad,
            estado: EstadoLote::Activo,
        };
        lote.refrescar_estado(hoy);
        Ok(lote)
    }

    pub fn id(&self) -> LoteId {
        self.id
    }

    pub fn producto_id(&self) -> ProductoId {
        self.producto_id
    }

    pub fn codigo_lote(&self) -> &str {
        &self.codigo_lote
    }

    pub fn fecha_elaboracion(&self) -> NaiveDate {
        self.fecha_elaboracion
    }

    pub fn fecha_vencimiento(&self) -> Option<NaiveDate> {
        self.fecha_vencimiento
    }

    pub fn cantidad_inicial(&self) -> i64 {
        self.cantidad_inicial
    }

    pub fn cantidad_actual(&self) -> i64 {
        self.cantidad_actual
    }

    pub fn estado(&self) -> EstadoLote {
        self.estado
    }

    pub fn archivado(&self) -> bool {
        self.estado == EstadoLote::Archivado
    }

    pub fn vencido(&self, hoy: NaiveDate) -> bool {
        self.fecha_vencimiento.is_some_and(|v| v < hoy)
    }

    /// Expires on or before `limite` but not before `hoy`.
    pub fn vence_antes_de(&self, hoy: NaiveDate, limite: NaiveDate) -> bool {
        self.fecha_vencimiento
            .is_some_and(|v| v >= hoy && v <= limite)
    }

    /// Whether FIFO depletion may draw from this lot.
    pub fn seleccionable(&self, hoy: NaiveDate) -> bool {
        !self.archivado() && self.cantidad_actual > 0 && !self.vencido(hoy)
    }

    pub fn refrescar_estado(&mut self, hoy: NaiveDate) {
        if self.archivado() {
            return;
        }
        self.estado = if self.vencido(hoy) {
            EstadoLote::Vencido
        } else if self.cantidad_actual == 0 {
            EstadoLote::Agotado
        } else {
            EstadoLote::Activo
        };
    }

    pub(crate) fn incrementar(&mut self, cantidad: i64, hoy: NaiveDate) -> DomainResult<()> {
        if self.archivado() {
            return Err(DomainError::validation(format!(
                "lote {} is archived",
                self.codigo_lote
            )));
        }
        let inicial = self.cantidad_inicial.checked_add(cantidad);
        let actual = self.cantidad_actual.checked_add(cantidad);
        let (Some(inicial), Some(actual)) = (inicial, actual) else {
            return Err(DomainError::validation(format!(
                "entrada overflows the quantity of lote {}",
                self.codigo_lote
            )));
        };
        self.cantidad_inicial = inicial;
        self.cantidad_actual = actual;
        self.refrescar_estado(hoy);
        Ok(())
    }

    /// Signed correction bounded by `0..=cantidad_inicial`.
    pub(crate) fn ajustar(&mut self, delta: i64, hoy: NaiveDate) -> DomainResult<()> {
        if self.archivado() {
            return Err(DomainError::validation(format!(
                "lote {} is archived",
                self.codigo_lote
            )));
        }
        let nueva = self.cantidad_actual.checked_add(delta).ok_or_else(|| {
            DomainError::validation(format!("ajuste overflows lote {}", self.codigo_lote))
        })?;
        if nueva < 0 {
            return Err(DomainError::invariant("lote cantidad_actual cannot go negative"));
        }
        if nueva > self.cantidad_inicial {
            return Err(DomainError::validation(format!(
                "ajuste would exceed cantidad_inicial of lote {}",
                self.codigo_lote
            )));
        }
        self.cantidad_actual = nueva;
        self.refrescar_estado(hoy);
        Ok(())
    }

    pub(crate) fn archivar(&mut self) -> DomainResult<()> {
        if self.archivado() {
            return Err(DomainError::conflict(format!(
                "lote {} already archived",
                self.codigo_lote
            )));
        }
        if self.cantidad_actual != 0 {
            return Err(DomainError::invariant(
                "lote must be emptied before archiving",
            ));
        }
        self.estado = EstadoLote::Archivado;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fecha(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn lote(cantidad: i64, vence: Option<NaiveDate>, hoy: NaiveDate) -> Lote {
        let spec = LoteSpec::new("L-1", fecha(2024, 11, 1), vence);
        Lote::crear(ProductoId::new(), &spec, cantidad, hoy).unwrap()
    }

    #[test]
    fn new_lot_is_active_with_equal_quantities() {
        let hoy = fecha(2024, 12, 1);
        let l = lote(10, Some(fecha(2025, 1, 1)), hoy);
        assert_eq!(l.estado(), EstadoLote::Activo);
        assert_eq!(l.cantidad_inicial(), 10);
        assert_eq!(l.cantidad_actual(), 10);
        assert!(l.seleccionable(hoy));
    }

    #[test]
    fn emptied_lot_becomes_agotado() {
        let hoy = fecha(2024, 12, 1);
        let mut l = lote(10, None, hoy);
        l.ajustar(-10, hoy).unwrap();
        assert_eq!(l.estado(), EstadoLote::Agotado);
        assert!(!l.seleccionable(hoy));
    }

    #[test]
    fn vencido_takes_precedence_but_agotado_still_blocks() {
        let hoy = fecha(2024, 12, 1);
        let mut l = lote(3, Some(fecha(2024, 12, 10)), hoy);
        l.ajustar(-3, hoy).unwrap();
        assert_eq!(l.estado(), EstadoLote::Agotado);

        let despues = fecha(2024, 12, 11);
        l.refrescar_estado(despues);
        assert_eq!(l.estado(), EstadoLote::Vencido);
        assert!(!l.seleccionable(despues));
    }

    #[test]
    fn expiry_day_itself_is_not_expired() {
        let hoy = fecha(2025, 1, 1);
        let l = lote(5, Some(hoy), hoy);
        assert!(!l.vencido(hoy));
        assert!(l.seleccionable(hoy));
    }

    #[test]
    fn ajuste_cannot_exceed_bounds() {
        let hoy = fecha(2024, 12, 1);
        let mut l = lote(5, None, hoy);
        assert!(matches!(l.ajustar(1, hoy), Err(DomainError::Validation(_))));
        assert!(matches!(
            l.ajustar(-6, hoy),
            Err(DomainError::InvariantViolation(_))
        ));
        assert_eq!(l.cantidad_actual(), 5);
    }

    #[test]
    fn incrementar_grows_both_quantities() {
        let hoy = fecha(2024, 12, 1);
        let mut l = lote(10, None, hoy);
        l.ajustar(-5, hoy).unwrap();
        l.incrementar(10, hoy).unwrap();
        assert_eq!(l.cantidad_actual(), 15);
        assert_eq!(l.cantidad_inicial(), 20);
    }

    #[test]
    fn overflowing_changes_leave_lot_untouched() {
        let hoy = fecha(2024, 12, 1);
        let mut l = lote(i64::MAX - 1, None, hoy);
        assert!(matches!(l.incrementar(2, hoy), Err(DomainError::Validation(_))));
        assert_eq!(l.cantidad_actual(), i64::MAX - 1);
        assert_eq!(l.cantidad_inicial(), i64::MAX - 1);
        assert!(matches!(l.ajustar(i64::MAX, hoy), Err(DomainError::Validation(_))));
        l.incrementar(1, hoy).unwrap();
        assert_eq!(l.cantidad_actual(), i64::MAX);
    }

    #[test]
    fn archived_lot_rejects_changes() {
        let hoy = fecha(2024, 12, 1);
        let mut l = lote(2, None, hoy);
        assert!(l.archivar().is_err());
        l.ajustar(-2, hoy).unwrap();
        l.archivar().unwrap();
        assert_eq!(l.estado(), EstadoLote::Archivado);
        assert!(l.incrementar(1, hoy).is_err());
        l.refrescar_estado(hoy);
        assert_eq!(l.estado(), EstadoLote::Archivado);
    }

    #[test]
    fn spec_rejects_expiry_before_elaboration() {
        let spec = LoteSpec::new("X", fecha(2024, 12, 1), Some(fecha(2024, 11, 1)));
        assert!(matches!(spec.validar(), Err(DomainError::Validation(_))));
    }
}
