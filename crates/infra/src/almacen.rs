//! Process-level wiring: one ledger shared by the document engines.

use std::sync::Arc;

use tracing::info;

use almacen_core::{DomainResult, Reloj, RelojSistema};
use almacen_inventory::Lote;

use crate::cierre::CierreEngine;
use crate::config::AlmacenConfig;
use crate::ledger::StockLedger;
use crate::recepcion::DocumentoRecepcionEngine;
use crate::salida::DocumentoSalidaEngine;

pub struct Almacen {
    config: AlmacenConfig,
    ledger: Arc<StockLedger>,
    recepciones: DocumentoRecepcionEngine,
    salidas: DocumentoSalidaEngine,
    cierres: CierreEngine,
}

impl Almacen {
    pub fn new(config: AlmacenConfig, reloj: Arc<dyn Reloj>) -> Self {
        let ledger = Arc::new(StockLedger::new(reloj));
        Self {
            recepciones: DocumentoRecepcionEngine::new(
                Arc::clone(&ledger),
                config.prefijo_recepcion.clone(),
            ),
            salidas: DocumentoSalidaEngine::new(Arc::clone(&ledger), config.prefijo_salida.clone()),
            cierres: CierreEngine::new(Arc::clone(&ledger)),
            ledger,
            config,
        }
    }

    /// Configuration from the environment, tracing installed, wall clock.
    pub fn desde_entorno() -> Self {
        let config = AlmacenConfig::from_env();
        almacen_observability::init(&config.observabilidad);
        info!(
            dias_alerta_vencimiento = config.dias_alerta_vencimiento,
            prefijo_recepcion = %config.prefijo_recepcion,
            prefijo_salida = %config.prefijo_salida,
            "almacén inicializado"
        );
        Self::new(config, Arc::new(RelojSistema))
    }

    pub fn config(&self) -> &AlmacenConfig {
        &self.config
    }

    pub fn ledger(&self) -> &StockLedger {
        &self.ledger
    }

    pub fn recepciones(&self) -> &DocumentoRecepcionEngine {
        &self.recepciones
    }

    pub fn salidas(&self) -> &DocumentoSalidaEngine {
        &self.salidas
    }

    pub fn cierres(&self) -> &CierreEngine {
        &self.cierres
    }

    /// Lots expiring within `dias`, or the configured horizon when `None`.
    pub fn lotes_por_vencer(&self, dias: Option<u32>) -> DomainResult<Vec<Lote>> {
        self.ledger
            .lotes_por_vencer(dias.unwrap_or(self.config.dias_alerta_vencimiento))
    }
}
