//! Per-product stock card: the product, its lots and its movement stream.
//!
//! Every stock-affecting operation goes through a `Kardex`. Operations are
//! all-or-nothing: a failing call leaves lots, stock and the movement stream
//! exactly as they were.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use almacen_core::{
    DomainError, DomainResult, LoteId, MovimientoId, ProductoFaltante, ProductoId,
};

use crate::fifo;
use crate::lote::{Lote, LoteSpec};
use crate::movimiento::{MovimientoInventario, Origen, Referencia, TipoMovimiento};
use crate::producto::Producto;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kardex {
    producto: Producto,
    lotes: Vec<Lote>,
    movimientos: Vec<MovimientoInventario>,
}

/// State to roll a `Kardex` back to. The movement stream is append-only, so
/// only its length is kept.
#[derive(Debug, Clone)]
pub struct PuntoRestauracion {
    producto: Producto,
    lotes: Vec<Lote>,
    movimientos: usize,
}

/// Drift corrected by a recalculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correccion {
    pub producto_id: ProductoId,
    pub stock_anterior: i64,
    pub stock_corregido: i64,
}

impl Kardex {
    pub fn new(producto: Producto) -> Self {
        Self {
            producto,
            lotes: Vec::new(),
            movimientos: Vec::new(),
        }
    }

    pub fn producto(&self) -> &Producto {
        &self.producto
    }

    pub fn producto_id(&self) -> ProductoId {
        self.producto.id()
    }

    pub fn lotes(&self) -> &[Lote] {
        &self.lotes
    }

    pub fn lote(&self, id: LoteId) -> Option<&Lote> {
        self.lotes.iter().find(|l| l.id() == id)
    }

    pub fn lote_por_codigo(&self, codigo: &str) -> Option<&Lote> {
        let codigo = codigo.trim();
        self.lotes.iter().find(|l| l.codigo_lote() == codigo)
    }

    pub fn movimientos(&self) -> &[MovimientoInventario] {
        &self.movimientos
    }

    /// Σ `cantidad_actual` over non-archived lots.
    pub fn stock_lotes(&self) -> i64 {
        self.lotes
            .iter()
            .filter(|l| !l.archivado())
            .map(Lote::cantidad_actual)
            .fold(0, i64::saturating_add)
    }

    fn total_lotes(&self) -> Option<i64> {
        self.lotes
            .iter()
            .filter(|l| !l.archivado())
            .try_fold(0i64, |total, l| total.checked_add(l.cantidad_actual()))
    }

    /// Signed sum of every movement in the stream.
    pub fn stock_segun_movimientos(&self) -> i64 {
        self.movimientos.iter().map(MovimientoInventario::delta).sum()
    }

    /// What a salida could draw today: eligible lots, or plain stock.
    pub fn disponible(&self, hoy: NaiveDate) -> i64 {
        if self.producto.requiere_lote() {
            fifo::disponible(&self.lotes, hoy)
        } else {
            self.producto.stock_actual()
        }
    }

    pub fn punto_restauracion(&self) -> PuntoRestauracion {
        PuntoRestauracion {
            producto: self.producto.clone(),
            lotes: self.lotes.clone(),
            movimientos: self.movimientos.len(),
        }
    }

    pub fn restaurar(&mut self, punto: PuntoRestauracion) {
        self.producto = punto.producto;
        self.lotes = punto.lotes;
        self.movimientos.truncate(punto.movimientos);
    }

    pub fn refrescar_estados(&mut self, hoy: NaiveDate) {
        for lote in &mut self.lotes {
            lote.refrescar_estado(hoy);
        }
    }

    /// Checks the stock/lot invariants; used after recalculation and in tests.
    pub fn verificar_invariantes(&self) -> DomainResult<()> {
        for lote in &self.lotes {
            if lote.cantidad_actual() < 0 || lote.cantidad_actual() > lote.cantidad_inicial() {
                return Err(DomainError::invariant(format!(
                    "lote {} out of bounds ({} of {})",
                    lote.codigo_lote(),
                    lote.cantidad_actual(),
                    lote.cantidad_inicial()
                )));
            }
        }
        if self.producto.requiere_lote() && self.producto.stock_actual() != self.stock_lotes() {
            return Err(DomainError::invariant(format!(
                "stock_actual {} differs from lot total {}",
                self.producto.stock_actual(),
                self.stock_lotes()
            )));
        }
        Ok(())
    }

    pub fn registrar_entrada(
        &mut self,
        cantidad: i64,
        lote: Option<&LoteSpec>,
        origen: &Origen,
        ahora: DateTime<Utc>,
    ) -> DomainResult<MovimientoInventario> {
        validar_cantidad(cantidad)?;
        validar_origen(origen)?;
        let hoy = ahora.date_naive();

        self.atomico(|k| {
            let lote_id = match (k.producto.requiere_lote(), lote) {
                (true, Some(spec)) => Some(k.resolver_lote(spec, cantidad, hoy)?),
                (true, None) => {
                    return Err(DomainError::validation(format!(
                        "producto {} requires a lote",
                        k.producto.codigo()
                    )));
                }
                (false, Some(_)) => {
                    return Err(DomainError::validation(format!(
                        "producto {} is not lot-tracked",
                        k.producto.codigo()
                    )));
                }
                (false, None) => None,
            };
            k.postear(TipoMovimiento::Entrada, lote_id, cantidad, origen, ahora)
        })
    }

    /// Manual batch creation: the code must be new for this product.
    pub fn crear_lote(
        &mut self,
        spec: &LoteSpec,
        cantidad: i64,
        origen: &Origen,
        ahora: DateTime<Utc>,
    ) -> DomainResult<(Lote, MovimientoInventario)> {
        if !self.producto.requiere_lote() {
            return Err(DomainError::validation(format!(
                "producto {} is not lot-tracked",
                self.producto.codigo()
            )));
        }
        if self.lote_por_codigo(&spec.codigo_lote).is_some() {
            return Err(DomainError::conflict(format!(
                "lote {} already exists for producto {}",
                spec.codigo_lote.trim(),
                self.producto.codigo()
            )));
        }

        let movimiento = self.registrar_entrada(cantidad, Some(spec), origen, ahora)?;
        let lote = movimiento
            .lote_id
            .and_then(|id| self.lote(id))
            .cloned()
            .ok_or_else(|| DomainError::invariant("entrada did not create a lote"))?;
        Ok((lote, movimiento))
    }

    /// Depletes stock. Without `lote_id`, lot-tracked products are drawn FIFO
    /// and one movement is posted per lot touched.
    pub fn registrar_salida(
        &mut self,
        cantidad: i64,
        lote_id: Option<LoteId>,
        origen: &Origen,
        ahora: DateTime<Utc>,
    ) -> DomainResult<Vec<MovimientoInventario>> {
        validar_cantidad(cantidad)?;
        validar_origen(origen)?;
        let hoy = ahora.date_naive();
        let producto_id = self.producto_id();

        if !self.producto.requiere_lote() {
            if lote_id.is_some() {
                return Err(DomainError::validation(format!(
                    "producto {} is not lot-tracked",
                    self.producto.codigo()
                )));
            }
            let stock = self.producto.stock_actual();
            if cantidad > stock {
                return Err(DomainError::insufficient_stock(vec![ProductoFaltante::new(
                    producto_id,
                    cantidad,
                    stock,
                )]));
            }
            return Ok(vec![self.postear(TipoMovimiento::Salida, None, cantidad, origen, ahora)?]);
        }

        let plan = match lote_id {
            Some(id) => {
                let lote = self
                    .lote(id)
                    .ok_or_else(|| DomainError::not_found(format!("lote {id}")))?;
                if lote.archivado() {
                    return Err(DomainError::validation(format!(
                        "lote {} is archived",
                        lote.codigo_lote()
                    )));
                }
                if cantidad > lote.cantidad_actual() {
                    return Err(DomainError::insufficient_stock(vec![ProductoFaltante::new(
                        producto_id,
                        cantidad,
                        lote.cantidad_actual(),
                    )]));
                }
                vec![fifo::Asignacion {
                    lote_id: id,
                    cantidad,
                }]
            }
            None => fifo::planificar(&self.lotes, cantidad, hoy).map_err(|e| {
                DomainError::insufficient_stock(vec![ProductoFaltante::new(
                    producto_id,
                    e.solicitado,
                    e.disponible,
                )])
            })?,
        };

        self.atomico(|k| {
            let mut movimientos = Vec::with_capacity(plan.len());
            for asignacion in &plan {
                k.lote_mut(asignacion.lote_id)?
                    .ajustar(-asignacion.cantidad, hoy)?;
                movimientos.push(k.postear(
                    TipoMovimiento::Salida,
                    Some(asignacion.lote_id),
                    asignacion.cantidad,
                    origen,
                    ahora,
                )?);
            }
            Ok(movimientos)
        })
    }

    /// Signed correction (physical count, write-off, reversal).
    pub fn registrar_ajuste(
        &mut self,
        delta: i64,
        lote_id: Option<LoteId>,
        origen: &Origen,
        ahora: DateTime<Utc>,
    ) -> DomainResult<MovimientoInventario> {
        if delta == 0 {
            return Err(DomainError::validation("ajuste delta cannot be zero"));
        }
        let magnitud = delta
            .checked_abs()
            .ok_or_else(|| DomainError::validation("ajuste delta overflows"))?;
        validar_origen(origen)?;
        let hoy = ahora.date_naive();
        let producto_id = self.producto_id();

        match (self.producto.requiere_lote(), lote_id) {
            (true, Some(id)) => {
                let lote = self
                    .lote(id)
                    .ok_or_else(|| DomainError::not_found(format!("lote {id}")))?;
                if delta < 0 && magnitud > lote.cantidad_actual() {
                    return Err(DomainError::insufficient_stock(vec![ProductoFaltante::new(
                        producto_id,
                        magnitud,
                        lote.cantidad_actual(),
                    )]));
                }
                self.atomico(|k| {
                    k.lote_mut(id)?.ajustar(delta, hoy)?;
                    k.postear_ajuste(delta, Some(id), origen, ahora)
                })
            }
            (true, None) => Err(DomainError::validation(format!(
                "ajuste on producto {} requires a lote",
                self.producto.codigo()
            ))),
            (false, Some(_)) => Err(DomainError::validation(format!(
                "producto {} is not lot-tracked",
                self.producto.codigo()
            ))),
            (false, None) => {
                let stock = self.producto.stock_actual();
                if delta < 0 && magnitud > stock {
                    return Err(DomainError::insufficient_stock(vec![ProductoFaltante::new(
                        producto_id,
                        magnitud,
                        stock,
                    )]));
                }
                self.postear_ajuste(delta, None, origen, ahora)
            }
        }
    }

    /// Writes off any remaining quantity and archives the lot.
    pub fn archivar_lote(
        &mut self,
        lote_id: LoteId,
        origen: &Origen,
        ahora: DateTime<Utc>,
    ) -> DomainResult<Option<MovimientoInventario>> {
        validar_origen(origen)?;
        let lote = self
            .lote(lote_id)
            .ok_or_else(|| DomainError::not_found(format!("lote {lote_id}")))?;
        if lote.archivado() {
            return Err(DomainError::conflict(format!(
                "lote {} already archived",
                lote.codigo_lote()
            )));
        }
        let restante = lote.cantidad_actual();

        let mut origen = origen.clone();
        if origen.referencia.is_none() {
            origen.referencia = Some(Referencia::Lote(lote_id));
        }

        self.atomico(|k| {
            let baja = if restante > 0 {
                Some(k.registrar_ajuste(-restante, Some(lote_id), &origen, ahora)?)
            } else {
                None
            };
            k.lote_mut(lote_id)?.archivar()?;
            Ok(baja)
        })
    }

    /// Re-derives `stock_actual` from lots (or from the movement stream for
    /// products without lots). Never posts movements.
    pub fn recalcular(&mut self) -> Option<Correccion> {
        let esperado = if self.producto.requiere_lote() {
            self.stock_lotes()
        } else {
            self.stock_segun_movimientos()
        };
        let actual = self.producto.stock_actual();
        if esperado == actual {
            return None;
        }
        self.producto.fijar_stock(esperado);
        Some(Correccion {
            producto_id: self.producto_id(),
            stock_anterior: actual,
            stock_corregido: esperado,
        })
    }

    fn atomico<T>(&mut self, f: impl FnOnce(&mut Self) -> DomainResult<T>) -> DomainResult<T> {
        let punto = self.punto_restauracion();
        let resultado = f(self);
        if resultado.is_err() {
            self.restaurar(punto);
        }
        resultado
    }

    fn lote_mut(&mut self, id: LoteId) -> DomainResult<&mut Lote> {
        self.lotes
            .iter_mut()
            .find(|l| l.id() == id)
            .ok_or_else(|| DomainError::not_found(format!("lote {id}")))
    }

    /// Adds `cantidad` to the lot named by `spec`, creating it if needed.
    fn resolver_lote(&mut self, spec: &LoteSpec, cantidad: i64, hoy: NaiveDate) -> DomainResult<LoteId> {
        spec.validar()?;
        if let Some(id) = self.lote_por_codigo(&spec.codigo_lote).map(Lote::id) {
            self.lote_mut(id)?.incrementar(cantidad, hoy)?;
            return Ok(id);
        }
        let lote = Lote::crear(self.producto_id(), spec, cantidad, hoy)?;
        let id = lote.id();
        self.lotes.push(lote);
        Ok(id)
    }

    /// Appends a movement whose lot quantities have already been applied.
    fn postear(
        &mut self,
        tipo: TipoMovimiento,
        lote_id: Option<LoteId>,
        cantidad: i64,
        origen: &Origen,
        ahora: DateTime<Utc>,
    ) -> DomainResult<MovimientoInventario> {
        let delta = match tipo {
            TipoMovimiento::Entrada => cantidad,
            TipoMovimiento::Salida => -cantidad,
            TipoMovimiento::Ajuste => cantidad,
        };
        self.anexar(tipo, lote_id, cantidad, delta, origen, ahora)
    }

    fn postear_ajuste(
        &mut self,
        delta: i64,
        lote_id: Option<LoteId>,
        origen: &Origen,
        ahora: DateTime<Utc>,
    ) -> DomainResult<MovimientoInventario> {
        self.anexar(TipoMovimiento::Ajuste, lote_id, delta.abs(), delta, origen, ahora)
    }

    /// Stock is computed before anything is written; an overflow leaves the
    /// product untouched.
    fn anexar(
        &mut self,
        tipo: TipoMovimiento,
        lote_id: Option<LoteId>,
        cantidad: i64,
        delta: i64,
        origen: &Origen,
        ahora: DateTime<Utc>,
    ) -> DomainResult<MovimientoInventario> {
        let stock_nuevo = if self.producto.requiere_lote() {
            self.total_lotes()
        } else {
            self.producto.stock_actual().checked_add(delta)
        };
        let (stock_nuevo, stock_anterior) = stock_nuevo
            .and_then(|nuevo| Some((nuevo, nuevo.checked_sub(delta)?)))
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "stock of producto {} would overflow",
                    self.producto.codigo()
                ))
            })?;
        self.producto.fijar_stock(stock_nuevo);

        let movimiento = MovimientoInventario {
            id: MovimientoId::new(),
            secuencia: self.movimientos.len() as u64 + 1,
            producto_id: self.producto_id(),
            lote_id,
            tipo,
            cantidad,
            stock_anterior,
            stock_nuevo,
            motivo: origen.motivo.trim().to_string(),
            referencia: origen.referencia.clone(),
            id_empleado: origen.id_empleado,
            fecha_movimiento: ahora,
        };
        self.movimientos.push(movimiento.clone());
        Ok(movimiento)
    }
}

fn validar_cantidad(cantidad: i64) -> DomainResult<()> {
    if cantidad <= 0 {
        return Err(DomainError::validation("cantidad must be positive"));
    }
    Ok(())
}

fn validar_origen(origen: &Origen) -> DomainResult<()> {
    if origen.motivo.trim().is_empty() {
        return Err(DomainError::validation("motivo cannot be empty"));
    }
    Ok(())
}
