//! Outgoing documents: order claims, state flow and FIFO depletion on
//! dispatch.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use almacen_core::{
    ConductorId, DomainError, DomainResult, EmpleadoId, ExpectedVersion, OrdenId, RutaId, SalidaId,
};
use almacen_dispatch::{
    AgregarOrdenes, CambiarEstado, CrearSalida, Despachar, DocumentoSalida, EstadoSalida,
    FiltroSalidas, NuevaOrden, Orden, ResumenOrden, SalidaCommand, SalidaEvent,
};
use almacen_events::EventRecord;
use almacen_inventory::{Origen, Referencia, ValidacionStockResult};

use crate::ledger::StockLedger;
use crate::numeracion::Numerador;
use crate::repository::InMemoryRepository;

/// Input of `crear`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NuevaSalida {
    pub id_ruta: RutaId,
    pub id_conductor: ConductorId,
    pub ids_ordenes: Vec<OrdenId>,
    pub fecha_salida: NaiveDate,
}

type TablaOrdenes = HashMap<OrdenId, Orden>;

pub struct DocumentoSalidaEngine {
    ledger: Arc<StockLedger>,
    documentos: InMemoryRepository<DocumentoSalida>,
    ordenes: Mutex<TablaOrdenes>,
    numeracion: Numerador,
}

fn sin_duplicados(ids: &[OrdenId]) -> DomainResult<()> {
    if ids.is_empty() {
        return Err(DomainError::validation("at least one orden is required"));
    }
    let mut vistos = HashSet::with_capacity(ids.len());
    for id in ids {
        if !vistos.insert(*id) {
            return Err(DomainError::validation(format!("orden {id} is listed twice")));
        }
    }
    Ok(())
}

/// Claims every order for `salida` or none of them.
fn reclamar_todas(
    tabla: &mut TablaOrdenes,
    ids: &[OrdenId],
    salida: SalidaId,
) -> DomainResult<Vec<ResumenOrden>> {
    for id in ids {
        tabla
            .get(id)
            .ok_or_else(|| DomainError::not_found(format!("orden {id}")))?
            .verificar_reclamable(salida)?;
    }
    let mut resumenes = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(orden) = tabla.get_mut(id) {
            orden.reclamar(salida)?;
            resumenes.push(orden.resumen());
        }
    }
    Ok(resumenes)
}

fn liberar_todas(tabla: &mut TablaOrdenes, ids: &[OrdenId], salida: SalidaId) -> usize {
    let mut liberadas = 0;
    for id in ids {
        if tabla.get_mut(id).is_some_and(|orden| orden.liberar(salida)) {
            liberadas += 1;
        }
    }
    liberadas
}

impl DocumentoSalidaEngine {
    pub fn new(ledger: Arc<StockLedger>, prefijo: impl Into<String>) -> Self {
        Self {
            ledger,
            documentos: InMemoryRepository::new("salida"),
            ordenes: Mutex::new(HashMap::new()),
            numeracion: Numerador::new(prefijo),
        }
    }

    fn tabla(&self) -> DomainResult<MutexGuard<'_, TablaOrdenes>> {
        self.ordenes.lock().map_err(|_| DomainError::lock_poisoned())
    }

    /// Feeds an order from the order module. Every line's product must exist.
    pub fn registrar_orden(&self, nueva: NuevaOrden) -> DomainResult<Orden> {
        for linea in &nueva.lineas {
            self.ledger.producto(linea.producto_id)?;
        }
        let orden = Orden::registrar(nueva)?;
        let mut tabla = self.tabla()?;
        if tabla.contains_key(&orden.id()) {
            return Err(DomainError::conflict(format!(
                "orden {} already registered",
                orden.id()
            )));
        }
        tabla.insert(orden.id(), orden.clone());
        info!(orden = %orden.id(), numero = orden.numero(), total = orden.total(), "orden registrada");
        Ok(orden)
    }

    pub fn orden(&self, id: OrdenId) -> DomainResult<Orden> {
        self.tabla()?
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("orden {id}")))
    }

    pub fn marcar_entregada(&self, id: OrdenId) -> DomainResult<Orden> {
        let mut tabla = self.tabla()?;
        let orden = tabla
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("orden {id}")))?;
        orden.marcar_entregada()?;
        info!(orden = %id, "orden entregada");
        Ok(orden.clone())
    }

    /// Claims the orders and opens a PENDIENTE document over them. If any
    /// order cannot be claimed nothing is claimed and no document exists.
    pub fn crear(&self, nueva: NuevaSalida, id_empleado: EmpleadoId) -> DomainResult<DocumentoSalida> {
        sin_duplicados(&nueva.ids_ordenes)?;
        let id = SalidaId::new();
        let ordenes = reclamar_todas(&mut *self.tabla()?, &nueva.ids_ordenes, id)?;

        let comando = SalidaCommand::Crear(CrearSalida {
            salida_id: id,
            numero_documento: self.numeracion.siguiente(),
            id_ruta: nueva.id_ruta,
            id_conductor: nueva.id_conductor,
            fecha_salida: nueva.fecha_salida,
            ordenes,
            id_empleado,
            occurred_at: self.ledger.reloj().ahora(),
        });
        let documento = match self
            .documentos
            .crear(DocumentoSalida::empty(id), &comando, id_empleado)
        {
            Ok(documento) => documento,
            Err(error) => {
                liberar_todas(&mut *self.tabla()?, &nueva.ids_ordenes, id);
                return Err(error);
            }
        };

        info!(
            salida = %id,
            numero = documento.numero_documento(),
            ruta = %documento.id_ruta(),
            ordenes = documento.ids_ordenes().len(),
            valor_total = documento.valor_total(),
            "salida creada"
        );
        Ok(documento)
    }

    pub fn agregar_ordenes(
        &self,
        id: SalidaId,
        ids_ordenes: Vec<OrdenId>,
        id_empleado: EmpleadoId,
        esperado: ExpectedVersion,
    ) -> DomainResult<DocumentoSalida> {
        sin_duplicados(&ids_ordenes)?;
        let ahora = self.ledger.reloj().ahora();
        self.documentos.con_documento(&id, esperado, |flujo| {
            flujo.documento().verificar_ampliable()?;
            let mut tabla = self.tabla()?;
            let ordenes = reclamar_todas(&mut tabla, &ids_ordenes, id)?;
            let comando = SalidaCommand::AgregarOrdenes(AgregarOrdenes {
                ordenes,
                id_empleado,
                occurred_at: ahora,
            });
            if let Err(error) = flujo.ejecutar(&comando, id_empleado) {
                liberar_todas(&mut tabla, &ids_ordenes, id);
                return Err(error);
            }
            drop(tabla);

            info!(salida = %id, agregadas = ids_ordenes.len(), "ordenes agregadas");
            Ok(flujo.documento().clone())
        })
    }

    /// Applies the state table. CANCELADO releases every claimed order.
    ///
    /// `version` is the version the caller last read; a document changed since
    /// then is a `Conflict`, so racing transitions cannot both apply.
    pub fn cambiar_estado(
        &self,
        id: SalidaId,
        nuevo_estado: EstadoSalida,
        id_empleado: EmpleadoId,
        version: u64,
    ) -> DomainResult<DocumentoSalida> {
        let ahora = self.ledger.reloj().ahora();
        self.documentos.con_documento(&id, ExpectedVersion::Exact(version), |flujo| {
            let desde = flujo.documento().estado();
            flujo.documento().verificar_cambio(nuevo_estado)?;
            let tabla = if nuevo_estado == EstadoSalida::Cancelado {
                Some(self.tabla()?)
            } else {
                None
            };
            flujo.ejecutar(
                &SalidaCommand::CambiarEstado(CambiarEstado {
                    nuevo_estado,
                    id_empleado,
                    occurred_at: ahora,
                }),
                id_empleado,
            )?;
            let liberadas = tabla
                .map(|mut t| liberar_todas(&mut t, flujo.documento().ids_ordenes(), id))
                .unwrap_or(0);

            info!(salida = %id, desde = %desde, hacia = %nuevo_estado, liberadas, "estado de salida cambiado");
            Ok(flujo.documento().clone())
        })
    }

    /// Read-only stock check of the consolidated detalles.
    pub fn validar_stock(&self, id: SalidaId) -> DomainResult<ValidacionStockResult> {
        let documento = self.documentos.obtener(&id)?;
        self.ledger.validar_stock(documento.detalles())
    }

    /// Depletes every detalle FIFO and marks the document and its orders
    /// DESPACHADA, all in one ledger transaction. A shortfall found under the
    /// locks aborts with InsufficientStock and changes nothing.
    pub fn despachar(
        &self,
        id: SalidaId,
        id_empleado: EmpleadoId,
        esperado: ExpectedVersion,
    ) -> DomainResult<DocumentoSalida> {
        self.documentos.con_documento(&id, esperado, |flujo| {
            flujo.documento().verificar_despachable()?;
            let documento = flujo.documento().clone();
            let detalles = documento.detalles().to_vec();
            let origen = Origen::new(format!("despacho {}", documento.numero_documento()))
                .con_referencia(Referencia::Salida(id))
                .por(id_empleado);

            let productos = detalles.iter().map(|d| d.producto_id);
            let movimientos = self.ledger.transaccion(productos, |tx| {
                let validacion = tx.validar(&detalles)?;
                if !validacion.valido {
                    warn!(
                        salida = %id,
                        faltantes = validacion.productos_faltantes.len(),
                        "despacho rechazado por stock insuficiente"
                    );
                }
                validacion.exigir()?;

                let mut tabla = self.tabla()?;
                let mut despachadas = Vec::with_capacity(documento.ids_ordenes().len());
                for orden_id in documento.ids_ordenes() {
                    let mut orden = tabla
                        .get(orden_id)
                        .cloned()
                        .ok_or_else(|| DomainError::not_found(format!("orden {orden_id}")))?;
                    orden.marcar_despachada(id)?;
                    despachadas.push(orden);
                }

                let mut movimientos = Vec::new();
                for detalle in &detalles {
                    let posteados = tx.salida(detalle.producto_id, detalle.cantidad, None, &origen)?;
                    movimientos.extend(posteados.into_iter().map(|m| m.id));
                }

                flujo.ejecutar(
                    &SalidaCommand::Despachar(Despachar {
                        movimientos: movimientos.clone(),
                        id_empleado,
                        occurred_at: tx.ahora(),
                    }),
                    id_empleado,
                )?;
                for orden in despachadas {
                    tabla.insert(orden.id(), orden);
                }
                Ok(movimientos)
            })?;

            info!(
                salida = %id,
                numero = documento.numero_documento(),
                productos = detalles.len(),
                movimientos = movimientos.len(),
                "salida despachada"
            );
            Ok(flujo.documento().clone())
        })
    }

    pub fn obtener(&self, id: SalidaId) -> DomainResult<DocumentoSalida> {
        self.documentos.obtener(&id)
    }

    /// Documents matching `filtro`, ordered by numero.
    pub fn listar(&self, filtro: &FiltroSalidas) -> DomainResult<Vec<DocumentoSalida>> {
        let mut documentos = self.documentos.listar(|d| filtro.coincide(d))?;
        documentos.sort_by(|a, b| a.numero_documento().cmp(b.numero_documento()));
        Ok(documentos)
    }

    pub fn listar_por_ruta(&self, id_ruta: RutaId) -> DomainResult<Vec<DocumentoSalida>> {
        self.listar(&FiltroSalidas::por_ruta(id_ruta))
    }

    pub fn historial(&self, id: SalidaId) -> DomainResult<Vec<EventRecord<SalidaEvent>>> {
        self.documentos.historial(&id)
    }
}
