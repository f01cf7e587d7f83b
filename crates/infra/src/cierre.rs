//! Period closings over the whole catalog.

use std::sync::{Arc, RwLock, RwLockReadGuard};

use tracing::info;

use almacen_closing::{CierreInventario, Periodo, TipoCierre, calcular};
use almacen_core::{CierreId, DomainError, DomainResult, EmpleadoId, ProductoId};

use crate::ledger::StockLedger;

pub struct CierreEngine {
    ledger: Arc<StockLedger>,
    cierres: RwLock<Vec<CierreInventario>>,
}

impl CierreEngine {
    pub fn new(ledger: Arc<StockLedger>) -> Self {
        Self {
            ledger,
            cierres: RwLock::new(Vec::new()),
        }
    }

    /// Closes `periodo` ("YYYY-MM") for every product.
    pub fn ejecutar_cierre_mensual(
        &self,
        periodo: &str,
        id_usuario: EmpleadoId,
    ) -> DomainResult<Vec<CierreInventario>> {
        self.ejecutar(periodo.parse()?, TipoCierre::Mensual, id_usuario)
    }

    /// Closes `periodo` ("YYYY") for every product.
    pub fn ejecutar_cierre_anual(
        &self,
        periodo: &str,
        id_usuario: EmpleadoId,
    ) -> DomainResult<Vec<CierreInventario>> {
        self.ejecutar(periodo.parse()?, TipoCierre::Anual, id_usuario)
    }

    fn ejecutar(
        &self,
        periodo: Periodo,
        tipo: TipoCierre,
        id_usuario: EmpleadoId,
    ) -> DomainResult<Vec<CierreInventario>> {
        if periodo.tipo() != tipo {
            return Err(DomainError::validation(format!(
                "periodo {periodo} is not a {tipo:?} period"
            )));
        }
        let ahora = self.ledger.reloj().ahora();
        if periodo.inicio() > ahora.date_naive() {
            return Err(DomainError::validation(format!(
                "periodo {periodo} has not started yet"
            )));
        }

        let mut cierres = self
            .cierres
            .write()
            .map_err(|_| DomainError::lock_poisoned())?;
        if let Some(existente) = cierres.iter().find(|c| c.periodo() == periodo) {
            return Err(DomainError::conflict(format!(
                "periodo {periodo} already closed for producto {}",
                existente.producto_id()
            )));
        }

        let anterior = periodo.anterior();
        let mut nuevos = Vec::new();
        for producto_id in self.ledger.ids_productos()? {
            let kardex = self.ledger.kardex(producto_id)?;
            let previo = cierres
                .iter()
                .find(|c| c.producto_id() == producto_id && c.periodo() == anterior);
            let totales = calcular(
                periodo,
                previo,
                kardex.movimientos(),
                kardex.producto().stock_actual(),
            );
            nuevos.push(CierreInventario::generar(
                producto_id,
                periodo,
                totales,
                id_usuario,
                ahora,
            ));
        }
        cierres.extend(nuevos.iter().cloned());

        info!(
            periodo = %periodo,
            tipo = ?tipo,
            productos = nuevos.len(),
            usuario = %id_usuario,
            "cierre ejecutado"
        );
        Ok(nuevos)
    }

    fn leer(&self) -> DomainResult<RwLockReadGuard<'_, Vec<CierreInventario>>> {
        self.cierres.read().map_err(|_| DomainError::lock_poisoned())
    }

    pub fn listar_por_periodo(&self, periodo: Periodo) -> DomainResult<Vec<CierreInventario>> {
        Ok(self
            .leer()?
            .iter()
            .filter(|c| c.periodo() == periodo)
            .cloned()
            .collect())
    }

    /// Every closing of one product, oldest period first.
    pub fn listar_por_producto(&self, producto_id: ProductoId) -> DomainResult<Vec<CierreInventario>> {
        let mut cierres: Vec<_> = self
            .leer()?
            .iter()
            .filter(|c| c.producto_id() == producto_id)
            .cloned()
            .collect();
        cierres.sort_by_key(|c| c.periodo().inicio());
        Ok(cierres)
    }

    pub fn obtener(&self, id: CierreId) -> DomainResult<CierreInventario> {
        self.leer()?
            .iter()
            .find(|c| c.id() == id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("cierre {id}")))
    }

    pub fn archivar(&self, id: CierreId, id_usuario: EmpleadoId) -> DomainResult<CierreInventario> {
        let ahora = self.ledger.reloj().ahora();
        let mut cierres = self
            .cierres
            .write()
            .map_err(|_| DomainError::lock_poisoned())?;
        let cierre = cierres
            .iter_mut()
            .find(|c| c.id() == id)
            .ok_or_else(|| DomainError::not_found(format!("cierre {id}")))?;
        cierre.archivar(id_usuario, ahora)?;
        info!(cierre = %id, periodo = %cierre.periodo(), usuario = %id_usuario, "cierre archivado");
        Ok(cierre.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use almacen_closing::EstadoCierre;
    use almacen_core::RelojFijo;
    use almacen_inventory::{NuevoProducto, Origen};
    use chrono::{Duration, NaiveDate};

    fn fecha(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn escenario() -> (Arc<RelojFijo>, Arc<StockLedger>, CierreEngine, ProductoId) {
        let reloj = Arc::new(RelojFijo::en_fecha(fecha(2024, 11, 5)));
        let ledger = Arc::new(StockLedger::new(reloj.clone()));
        let p = ledger
            .registrar_producto(NuevoProducto {
                id: ProductoId::new(),
                codigo: "ARROZ".to_string(),
                nombre: "Arroz".to_string(),
                requiere_lote: false,
                stock_minimo: 0,
                stock_maximo: None,
                dias_vida_util: 0,
            })
            .unwrap()
            .id();
        let engine = CierreEngine::new(Arc::clone(&ledger));
        (reloj, ledger, engine, p)
    }

    #[test]
    fn monthly_closings_chain() {
        let (reloj, ledger, engine, p) = escenario();
        let origen = Origen::new("prueba");
        ledger.registrar_entrada(p, 40, None, &origen).unwrap();
        reloj.avanzar(Duration::days(15));
        ledger.registrar_salida(p, 10, None, &origen).unwrap();
        reloj.fijar(fecha(2024, 12, 3).and_hms_opt(9, 0, 0).unwrap().and_utc());
        ledger.registrar_entrada(p, 25, None, &origen).unwrap();
        ledger.registrar_ajuste(p, -5, None, &origen).unwrap();

        let noviembre = engine.ejecutar_cierre_mensual("2024-11", EmpleadoId::new()).unwrap();
        assert_eq!(noviembre.len(), 1);
        assert_eq!(
            (noviembre[0].stock_inicial(), noviembre[0].total_entradas(), noviembre[0].total_salidas()),
            (0, 40, 10)
        );
        assert_eq!(noviembre[0].stock_final(), 30);

        let diciembre = engine.ejecutar_cierre_mensual("2024-12", EmpleadoId::new()).unwrap();
        let c = &diciembre[0];
        assert_eq!(c.stock_inicial(), 30);
        assert_eq!((c.total_entradas(), c.total_salidas()), (25, 5));
        assert_eq!(c.stock_final(), 50);
        assert!(c.cumple_ley_de_cierre());
    }

    #[test]
    fn repeated_closing_is_a_conflict() {
        let (_, _, engine, _) = escenario();
        engine.ejecutar_cierre_mensual("2024-10", EmpleadoId::new()).unwrap();
        let err = engine
            .ejecutar_cierre_mensual("2024-10", EmpleadoId::new())
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        let periodo: Periodo = "2024-10".parse().unwrap();
        assert_eq!(engine.listar_por_periodo(periodo).unwrap().len(), 1);
    }

    #[test]
    fn rejects_future_and_mistyped_periods() {
        let (_, _, engine, _) = escenario();
        assert!(matches!(
            engine.ejecutar_cierre_mensual("2025-01", EmpleadoId::new()),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            engine.ejecutar_cierre_mensual("2024", EmpleadoId::new()),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            engine.ejecutar_cierre_anual("2024-03", EmpleadoId::new()),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            engine.ejecutar_cierre_mensual("noviembre", EmpleadoId::new()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn annual_closing_and_archive() {
        let (_, ledger, engine, p) = escenario();
        ledger.registrar_entrada(p, 12, None, &Origen::new("prueba")).unwrap();
        let anual = engine.ejecutar_cierre_anual("2024", EmpleadoId::new()).unwrap();
        assert_eq!(anual[0].tipo_cierre(), TipoCierre::Anual);
        assert_eq!(anual[0].stock_final(), 12);

        let archivado = engine.archivar(anual[0].id(), EmpleadoId::new()).unwrap();
        assert_eq!(archivado.estado(), EstadoCierre::Archivado);
        assert!(matches!(
            engine.archivar(anual[0].id(), EmpleadoId::new()),
            Err(DomainError::Conflict(_))
        ));
        assert_eq!(engine.listar_por_producto(p).unwrap().len(), 1);
        assert!(matches!(
            engine.obtener(CierreId::new()),
            Err(DomainError::NotFound(_))
        ));
    }
}
