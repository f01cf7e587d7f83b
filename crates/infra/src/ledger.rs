//! Concurrent stock ledger.
//!
//! Each product's `Kardex` (product, lots, movement stream) lives behind its
//! own `Mutex`. Single-product operations lock one kardex; multi-product
//! operations go through [`StockLedger::transaccion`], which locks every
//! product involved in ascending `ProductoId` order and rolls all of them
//! back if the body fails.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use almacen_core::{DomainError, DomainResult, LoteId, ProductoId, Reloj};
use almacen_inventory::{
    Correccion, FiltroMovimientos, Kardex, Lote, LoteSpec, MovimientoInventario, NuevoProducto,
    Origen, Producto, PuntoRestauracion, Requerimiento, ValidacionStockResult, validator,
};

type Celda = Arc<Mutex<Kardex>>;

#[derive(Default)]
struct Catalogo {
    kardex: HashMap<ProductoId, Celda>,
    codigos: HashMap<String, ProductoId>,
}

fn bloquear(celda: &Celda) -> DomainResult<MutexGuard<'_, Kardex>> {
    celda.lock().map_err(|_| DomainError::lock_poisoned())
}

/// Outcome of a batch recalculation. Failures are collected, not raised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalculoReporte {
    pub revisados: usize,
    pub correcciones: Vec<Correccion>,
    pub fallos: Vec<FalloRecalculo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FalloRecalculo {
    pub producto_id: ProductoId,
    pub error: String,
}

pub struct StockLedger {
    catalogo: RwLock<Catalogo>,
    reloj: Arc<dyn Reloj>,
}

/// Exclusive access to a fixed set of products for the duration of one
/// ledger transaction.
pub struct Transaccion<'a> {
    guardias: Vec<(ProductoId, MutexGuard<'a, Kardex>)>,
    ahora: DateTime<Utc>,
}

impl Transaccion<'_> {
    pub fn ahora(&self) -> DateTime<Utc> {
        self.ahora
    }

    pub fn hoy(&self) -> NaiveDate {
        self.ahora.date_naive()
    }

    pub fn kardex(&self, id: ProductoId) -> DomainResult<&Kardex> {
        self.guardias
            .iter()
            .find(|(p, _)| *p == id)
            .map(|(_, k)| &**k)
            .ok_or_else(|| no_bloqueado(id))
    }

    pub fn kardex_mut(&mut self, id: ProductoId) -> DomainResult<&mut Kardex> {
        self.guardias
            .iter_mut()
            .find(|(p, _)| *p == id)
            .map(|(_, k)| &mut **k)
            .ok_or_else(|| no_bloqueado(id))
    }

    pub fn disponible(&self, id: ProductoId) -> DomainResult<i64> {
        let hoy = self.hoy();
        Ok(self.kardex(id)?.disponible(hoy))
    }

    /// Stock check against the locked state; nothing can change underneath.
    pub fn validar(&self, requerimientos: &[Requerimiento]) -> DomainResult<ValidacionStockResult> {
        validator::validar(requerimientos, |id| self.disponible(id))
    }

    pub fn entrada(
        &mut self,
        id: ProductoId,
        cantidad: i64,
        lote: Option<&LoteSpec>,
        origen: &Origen,
    ) -> DomainResult<MovimientoInventario> {
        let ahora = self.ahora;
        self.kardex_mut(id)?.registrar_entrada(cantidad, lote, origen, ahora)
    }

    pub fn salida(
        &mut self,
        id: ProductoId,
        cantidad: i64,
        lote_id: Option<LoteId>,
        origen: &Origen,
    ) -> DomainResult<Vec<MovimientoInventario>> {
        let ahora = self.ahora;
        self.kardex_mut(id)?.registrar_salida(cantidad, lote_id, origen, ahora)
    }

    pub fn ajuste(
        &mut self,
        id: ProductoId,
        delta: i64,
        lote_id: Option<LoteId>,
        origen: &Origen,
    ) -> DomainResult<MovimientoInventario> {
        let ahora = self.ahora;
        self.kardex_mut(id)?.registrar_ajuste(delta, lote_id, origen, ahora)
    }
}

fn no_bloqueado(id: ProductoId) -> DomainError {
    DomainError::invariant(format!("producto {id} is not locked by this transaction"))
}

impl StockLedger {
    pub fn new(reloj: Arc<dyn Reloj>) -> Self {
        Self {
            catalogo: RwLock::new(Catalogo::default()),
            reloj,
        }
    }

    pub fn reloj(&self) -> &Arc<dyn Reloj> {
        &self.reloj
    }

    /// Adds a product with zero stock. `id` and `codigo` are unique.
    pub fn registrar_producto(&self, nuevo: NuevoProducto) -> DomainResult<Producto> {
        let producto = Producto::registrar(nuevo)?;
        let mut catalogo = self
            .catalogo
            .write()
            .map_err(|_| DomainError::lock_poisoned())?;

        if catalogo.kardex.contains_key(&producto.id()) {
            return Err(DomainError::conflict(format!(
                "producto {} already registered",
                producto.id()
            )));
        }
        if let Some(otro) = catalogo.codigos.get(producto.codigo()) {
            return Err(DomainError::conflict(format!(
                "codigo {} already used by producto {otro}",
                producto.codigo()
            )));
        }

        catalogo
            .codigos
            .insert(producto.codigo().to_string(), producto.id());
        catalogo.kardex.insert(
            producto.id(),
            Arc::new(Mutex::new(Kardex::new(producto.clone()))),
        );

        info!(
            producto = %producto.id(),
            codigo = producto.codigo(),
            requiere_lote = producto.requiere_lote(),
            "producto registrado"
        );
        Ok(producto)
    }

    fn celda(&self, id: ProductoId) -> DomainResult<Celda> {
        let catalogo = self
            .catalogo
            .read()
            .map_err(|_| DomainError::lock_poisoned())?;
        catalogo
            .kardex
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("producto {id}")))
    }

    /// Every product cell, ordered by id. The catalog lock is released on return.
    fn celdas(&self) -> DomainResult<Vec<(ProductoId, Celda)>> {
        let catalogo = self
            .catalogo
            .read()
            .map_err(|_| DomainError::lock_poisoned())?;
        let mut celdas: Vec<_> = catalogo
            .kardex
            .iter()
            .map(|(id, celda)| (*id, Arc::clone(celda)))
            .collect();
        celdas.sort_by_key(|(id, _)| *id);
        Ok(celdas)
    }

    /// Runs `f` holding the locks of every product in `ids`.
    ///
    /// Locks are taken in ascending id order. If `f` fails, every kardex is
    /// restored to the state it had when the locks were taken.
    pub fn transaccion<T>(
        &self,
        ids: impl IntoIterator<Item = ProductoId>,
        f: impl FnOnce(&mut Transaccion<'_>) -> DomainResult<T>,
    ) -> DomainResult<T> {
        let ids: BTreeSet<ProductoId> = ids.into_iter().collect();
        let celdas = ids
            .iter()
            .map(|id| Ok((*id, self.celda(*id)?)))
            .collect::<DomainResult<Vec<_>>>()?;

        let ahora = self.reloj.ahora();
        let hoy = ahora.date_naive();
        let mut guardias = Vec::with_capacity(celdas.len());
        for (id, celda) in &celdas {
            let mut kardex = bloquear(celda)?;
            kardex.refrescar_estados(hoy);
            guardias.push((*id, kardex));
        }
        debug!(productos = guardias.len(), "ledger locks acquired");

        let puntos: Vec<PuntoRestauracion> = guardias
            .iter()
            .map(|(_, k)| k.punto_restauracion())
            .collect();
        let mut tx = Transaccion { guardias, ahora };

        let resultado = f(&mut tx);
        if let Err(error) = &resultado {
            for ((_, kardex), punto) in tx.guardias.iter_mut().zip(puntos) {
                kardex.restaurar(punto);
            }
            debug!(error = %error, "ledger transaction rolled back");
        }
        resultado
    }

    /// Read access to one product with lot states refreshed for today.
    fn leer<T>(&self, id: ProductoId, f: impl FnOnce(&Kardex, NaiveDate) -> T) -> DomainResult<T> {
        let celda = self.celda(id)?;
        let mut kardex = bloquear(&celda)?;
        let hoy = self.reloj.hoy();
        kardex.refrescar_estados(hoy);
        Ok(f(&kardex, hoy))
    }

    pub fn registrar_entrada(
        &self,
        producto_id: ProductoId,
        cantidad: i64,
        lote: Option<&LoteSpec>,
        origen: &Origen,
    ) -> DomainResult<MovimientoInventario> {
        let movimiento =
            self.transaccion([producto_id], |tx| tx.entrada(producto_id, cantidad, lote, origen))?;
        info!(
            producto = %producto_id,
            lote = ?movimiento.lote_id,
            cantidad,
            stock = movimiento.stock_nuevo,
            "entrada registrada"
        );
        Ok(movimiento)
    }

    /// Manual batch creation; Conflict if the code already exists for the product.
    pub fn crear_lote(
        &self,
        producto_id: ProductoId,
        spec: &LoteSpec,
        cantidad: i64,
        origen: &Origen,
    ) -> DomainResult<(Lote, MovimientoInventario)> {
        let (lote, movimiento) = self.transaccion([producto_id], |tx| {
            let ahora = tx.ahora();
            tx.kardex_mut(producto_id)?
                .crear_lote(spec, cantidad, origen, ahora)
        })?;
        info!(producto = %producto_id, lote = %lote.id(), codigo = lote.codigo_lote(), cantidad, "lote creado");
        Ok((lote, movimiento))
    }

    pub fn registrar_salida(
        &self,
        producto_id: ProductoId,
        cantidad: i64,
        lote_id: Option<LoteId>,
        origen: &Origen,
    ) -> DomainResult<Vec<MovimientoInventario>> {
        let movimientos = self.transaccion([producto_id], |tx| {
            tx.salida(producto_id, cantidad, lote_id, origen)
        })?;
        info!(
            producto = %producto_id,
            cantidad,
            lotes = movimientos.len(),
            "salida registrada"
        );
        Ok(movimientos)
    }

    pub fn registrar_ajuste(
        &self,
        producto_id: ProductoId,
        delta: i64,
        lote_id: Option<LoteId>,
        origen: &Origen,
    ) -> DomainResult<MovimientoInventario> {
        let movimiento =
            self.transaccion([producto_id], |tx| tx.ajuste(producto_id, delta, lote_id, origen))?;
        info!(producto = %producto_id, lote = ?lote_id, delta, "ajuste registrado");
        Ok(movimiento)
    }

    /// Writes off the remainder of a lot and archives it.
    pub fn archivar_lote(
        &self,
        lote_id: LoteId,
        origen: &Origen,
    ) -> DomainResult<Option<MovimientoInventario>> {
        let producto_id = self.producto_de_lote(lote_id)?;
        let baja = self.transaccion([producto_id], |tx| {
            let ahora = tx.ahora();
            tx.kardex_mut(producto_id)?
                .archivar_lote(lote_id, origen, ahora)
        })?;
        info!(
            producto = %producto_id,
            lote = %lote_id,
            baja = baja.as_ref().map(|m| m.cantidad).unwrap_or(0),
            "lote archivado"
        );
        Ok(baja)
    }

    fn producto_de_lote(&self, lote_id: LoteId) -> DomainResult<ProductoId> {
        for (id, celda) in self.celdas()? {
            if bloquear(&celda)?.lote(lote_id).is_some() {
                return Ok(id);
            }
        }
        Err(DomainError::not_found(format!("lote {lote_id}")))
    }

    pub fn producto(&self, id: ProductoId) -> DomainResult<Producto> {
        self.leer(id, |k, _| k.producto().clone())
    }

    /// All products ordered by codigo.
    pub fn productos(&self) -> DomainResult<Vec<Producto>> {
        let mut productos = Vec::new();
        for (_, celda) in self.celdas()? {
            productos.push(bloquear(&celda)?.producto().clone());
        }
        productos.sort_by(|a, b| a.codigo().cmp(b.codigo()));
        Ok(productos)
    }

    pub fn productos_bajo_minimo(&self) -> DomainResult<Vec<Producto>> {
        Ok(self
            .productos()?
            .into_iter()
            .filter(Producto::bajo_minimo)
            .collect())
    }

    pub fn ids_productos(&self) -> DomainResult<Vec<ProductoId>> {
        Ok(self.celdas()?.into_iter().map(|(id, _)| id).collect())
    }

    /// Consistent copy of one product's stock card.
    pub fn kardex(&self, id: ProductoId) -> DomainResult<Kardex> {
        self.leer(id, |k, _| k.clone())
    }

    pub fn lotes_por_producto(&self, id: ProductoId) -> DomainResult<Vec<Lote>> {
        self.leer(id, |k, _| k.lotes().to_vec())
    }

    pub fn lote(&self, lote_id: LoteId) -> DomainResult<Lote> {
        let producto_id = self.producto_de_lote(lote_id)?;
        self.leer(producto_id, |k, _| k.lote(lote_id).cloned())?
            .ok_or_else(|| DomainError::not_found(format!("lote {lote_id}")))
    }

    /// Lots with stock expiring between today and `dias` days from now,
    /// soonest first.
    pub fn lotes_por_vencer(&self, dias: u32) -> DomainResult<Vec<Lote>> {
        let hoy = self.reloj.hoy();
        let limite = hoy + Duration::days(i64::from(dias));
        let mut lotes = self.filtrar_lotes(|l| {
            !l.archivado() && l.cantidad_actual() > 0 && l.vence_antes_de(hoy, limite)
        })?;
        lotes.sort_by_key(|l| (l.fecha_vencimiento(), l.id()));
        Ok(lotes)
    }

    /// Non-archived lots past their expiry date.
    pub fn lotes_vencidos(&self) -> DomainResult<Vec<Lote>> {
        let hoy = self.reloj.hoy();
        let mut lotes = self.filtrar_lotes(|l| !l.archivado() && l.vencido(hoy))?;
        lotes.sort_by_key(|l| (l.fecha_vencimiento(), l.id()));
        Ok(lotes)
    }

    fn filtrar_lotes(&self, criterio: impl Fn(&Lote) -> bool) -> DomainResult<Vec<Lote>> {
        let hoy = self.reloj.hoy();
        let mut lotes = Vec::new();
        for (_, celda) in self.celdas()? {
            let mut kardex = bloquear(&celda)?;
            kardex.refrescar_estados(hoy);
            lotes.extend(kardex.lotes().iter().filter(|l| criterio(l)).cloned());
        }
        Ok(lotes)
    }

    /// Movements matching `filtro`, oldest first.
    pub fn movimientos(&self, filtro: &FiltroMovimientos) -> DomainResult<Vec<MovimientoInventario>> {
        let celdas = match filtro.producto_id {
            Some(id) => vec![(id, self.celda(id)?)],
            None => self.celdas()?,
        };
        let mut movimientos = Vec::new();
        for (_, celda) in celdas {
            let kardex = bloquear(&celda)?;
            movimientos.extend(kardex.movimientos().iter().filter(|m| filtro.coincide(m)).cloned());
        }
        movimientos.sort_by(|a, b| {
            a.fecha_movimiento
                .cmp(&b.fecha_movimiento)
                .then_with(|| a.producto_id.cmp(&b.producto_id))
                .then_with(|| a.secuencia.cmp(&b.secuencia))
        });
        Ok(movimientos)
    }

    pub fn disponible(&self, id: ProductoId) -> DomainResult<i64> {
        self.leer(id, |k, hoy| k.disponible(hoy))
    }

    /// Read-only sufficiency check; locks one product at a time.
    pub fn validar_stock(&self, requerimientos: &[Requerimiento]) -> DomainResult<ValidacionStockResult> {
        validator::validar(requerimientos, |id| self.disponible(id))
    }

    pub fn recalcular_stock_producto(&self, id: ProductoId) -> DomainResult<Option<Correccion>> {
        let celda = self.celda(id)?;
        let mut kardex = bloquear(&celda)?;
        let correccion = kardex.recalcular();
        kardex.verificar_invariantes()?;
        if let Some(c) = &correccion {
            info!(
                producto = %id,
                anterior = c.stock_anterior,
                corregido = c.stock_corregido,
                "stock recalculado"
            );
        }
        Ok(correccion)
    }

    /// Recalculates every product, one lock at a time.
    pub fn recalcular_stock_todos(&self) -> DomainResult<RecalculoReporte> {
        let mut reporte = RecalculoReporte::default();
        for (id, _) in self.celdas()? {
            reporte.revisados += 1;
            match self.recalcular_stock_producto(id) {
                Ok(Some(c)) => reporte.correcciones.push(c),
                Ok(None) => {}
                Err(error) => {
                    warn!(producto = %id, error = %error, "recalculation failed");
                    reporte.fallos.push(FalloRecalculo {
                        producto_id: id,
                        error: error.to_string(),
                    });
                }
            }
        }
        info!(
            revisados = reporte.revisados,
            correcciones = reporte.correcciones.len(),
            fallos = reporte.fallos.len(),
            "recalculation finished"
        );
        Ok(reporte)
    }
}
