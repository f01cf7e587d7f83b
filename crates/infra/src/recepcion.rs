//! Reception documents: creation, confirmation into the ledger, annulment
//! with compensating adjustments, and supervision.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::info;

use almacen_core::{
    DomainError, DomainResult, EmpleadoId, ExpectedVersion, RecepcionId,
};
use almacen_events::EventRecord;
use almacen_inventory::{LoteSpec, Origen, Producto, Referencia};
use almacen_reception::{
    ActualizarDetalles, AnularRecepcion, ConfirmarRecepcion, CrearRecepcion, DetalleRecepcion,
    DocumentoRecepcion, EntradaRegistrada, EstadoRecepcion, FiltroRecepciones, RecepcionCommand,
    RecepcionEvent, Supervisar,
};

use crate::ledger::StockLedger;
use crate::numeracion::Numerador;
use crate::repository::InMemoryRepository;

/// Input of `crear`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NuevaRecepcion {
    pub fecha_elaboracion: NaiveDate,
    pub motivo: String,
    pub detalles: Vec<DetalleRecepcion>,
}

pub struct DocumentoRecepcionEngine {
    ledger: Arc<StockLedger>,
    documentos: InMemoryRepository<DocumentoRecepcion>,
    numeracion: Numerador,
}

/// Lot identity for one detalle; `None` for products without lots.
fn lote_para(
    producto: &Producto,
    detalle: &DetalleRecepcion,
    fecha_elaboracion: NaiveDate,
) -> DomainResult<Option<LoteSpec>> {
    match (producto.requiere_lote(), detalle.codigo_lote.as_deref()) {
        (true, Some(codigo)) => {
            let fecha_vencimiento = detalle.fecha_vencimiento.or_else(|| {
                (producto.dias_vida_util() > 0).then(|| {
                    fecha_elaboracion + Duration::days(i64::from(producto.dias_vida_util()))
                })
            });
            let spec = LoteSpec::new(codigo, fecha_elaboracion, fecha_vencimiento);
            spec.validar()?;
            Ok(Some(spec))
        }
        (true, None) => Err(DomainError::validation(format!(
            "producto {} requires codigo_lote",
            producto.codigo()
        ))),
        (false, Some(_)) => Err(DomainError::validation(format!(
            "producto {} is not lot-tracked",
            producto.codigo()
        ))),
        (false, None) => Ok(None),
    }
}

impl DocumentoRecepcionEngine {
    pub fn new(ledger: Arc<StockLedger>, prefijo: impl Into<String>) -> Self {
        Self {
            ledger,
            documentos: InMemoryRepository::new("recepción"),
            numeracion: Numerador::new(prefijo),
        }
    }

    /// Products must exist and agree with the lot data given for them.
    fn verificar_detalles(&self, detalles: &[DetalleRecepcion], fecha: NaiveDate) -> DomainResult<()> {
        for detalle in detalles {
            let producto = self.ledger.producto(detalle.producto_id)?;
            lote_para(&producto, detalle, fecha)?;
        }
        Ok(())
    }

    pub fn crear(&self, nueva: NuevaRecepcion, id_empleado: EmpleadoId) -> DomainResult<DocumentoRecepcion> {
        self.verificar_detalles(&nueva.detalles, nueva.fecha_elaboracion)?;

        let id = RecepcionId::new();
        let comando = RecepcionCommand::Crear(CrearRecepcion {
            recepcion_id: id,
            numero_documento: self.numeracion.siguiente(),
            fecha_elaboracion: nueva.fecha_elaboracion,
            motivo: nueva.motivo,
            detalles: nueva.detalles,
            id_empleado,
            occurred_at: self.ledger.reloj().ahora(),
        });
        let documento = self
            .documentos
            .crear(DocumentoRecepcion::empty(id), &comando, id_empleado)?;

        info!(
            recepcion = %id,
            numero = documento.numero_documento(),
            detalles = documento.detalles().len(),
            "recepción creada"
        );
        Ok(documento)
    }

    pub fn actualizar_detalles(
        &self,
        id: RecepcionId,
        detalles: Vec<DetalleRecepcion>,
        id_empleado: EmpleadoId,
        esperado: ExpectedVersion,
    ) -> DomainResult<DocumentoRecepcion> {
        let ahora = self.ledger.reloj().ahora();
        self.documentos.con_documento(&id, esperado, |flujo| {
            if flujo.documento().estado() == EstadoRecepcion::Pendiente {
                self.verificar_detalles(&detalles, flujo.documento().fecha_elaboracion())?;
            }
            flujo.ejecutar(
                &RecepcionCommand::ActualizarDetalles(ActualizarDetalles {
                    detalles,
                    id_empleado,
                    occurred_at: ahora,
                }),
                id_empleado,
            )?;
            Ok(flujo.documento().clone())
        })
    }

    /// Posts one ENTRADA per detalle in a single ledger transaction and marks
    /// the document CONFIRMADO. A second call fails with Conflict.
    pub fn confirmar(
        &self,
        id: RecepcionId,
        id_empleado: EmpleadoId,
        esperado: ExpectedVersion,
    ) -> DomainResult<DocumentoRecepcion> {
        self.documentos.con_documento(&id, esperado, |flujo| {
            flujo.documento().verificar_confirmable()?;
            let documento = flujo.documento().clone();
            let origen = Origen::new(documento.motivo())
                .con_referencia(Referencia::Recepcion(id))
                .por(id_empleado);

            let entradas = self.ledger.transaccion(documento.productos(), |tx| {
                let mut entradas = Vec::with_capacity(documento.detalles().len());
                for detalle in documento.detalles() {
                    let producto = tx.kardex(detalle.producto_id)?.producto().clone();
                    let lote = lote_para(&producto, detalle, documento.fecha_elaboracion())?;
                    let movimiento =
                        tx.entrada(detalle.producto_id, detalle.cantidad, lote.as_ref(), &origen)?;
                    entradas.push(EntradaRegistrada {
                        movimiento_id: movimiento.id,
                        producto_id: detalle.producto_id,
                        lote_id: movimiento.lote_id,
                        cantidad: detalle.cantidad,
                    });
                }
                flujo.ejecutar(
                    &RecepcionCommand::Confirmar(ConfirmarRecepcion {
                        entradas: entradas.clone(),
                        id_empleado,
                        occurred_at: tx.ahora(),
                    }),
                    id_empleado,
                )?;
                Ok(entradas)
            })?;

            info!(
                recepcion = %id,
                numero = documento.numero_documento(),
                entradas = entradas.len(),
                "recepción confirmada"
            );
            Ok(flujo.documento().clone())
        })
    }

    /// Terminal. A confirmed document has every entrada reversed by a negative
    /// AJUSTE; if any received lot no longer holds its quantity nothing changes.
    ///
    /// `version` is the version the caller last read. If anything changed the
    /// document since, the call fails with `Conflict`.
    pub fn anular(
        &self,
        id: RecepcionId,
        motivo: &str,
        id_empleado: EmpleadoId,
        version: u64,
    ) -> DomainResult<DocumentoRecepcion> {
        self.documentos.con_documento(&id, ExpectedVersion::Exact(version), |flujo| {
            let compensar = flujo.documento().verificar_anulable(motivo)?;
            let documento = flujo.documento().clone();
            let motivo = motivo.trim().to_string();

            let ajustes = if compensar {
                let origen = Origen::new(format!("anulación: {motivo}"))
                    .con_referencia(Referencia::Recepcion(id))
                    .por(id_empleado);
                let productos = documento.entradas().iter().map(|e| e.producto_id);
                self.ledger.transaccion(productos, |tx| {
                    let mut ajustes = Vec::with_capacity(documento.entradas().len());
                    for entrada in documento.entradas() {
                        let ajuste =
                            tx.ajuste(entrada.producto_id, -entrada.cantidad, entrada.lote_id, &origen)?;
                        ajustes.push(ajuste.id);
                    }
                    flujo.ejecutar(
                        &RecepcionCommand::Anular(AnularRecepcion {
                            motivo: motivo.clone(),
                            ajustes: ajustes.clone(),
                            id_empleado,
                            occurred_at: tx.ahora(),
                        }),
                        id_empleado,
                    )?;
                    Ok(ajustes)
                })?
            } else {
                flujo.ejecutar(
                    &RecepcionCommand::Anular(AnularRecepcion {
                        motivo: motivo.clone(),
                        ajustes: Vec::new(),
                        id_empleado,
                        occurred_at: self.ledger.reloj().ahora(),
                    }),
                    id_empleado,
                )?;
                Vec::new()
            };

            info!(
                recepcion = %id,
                numero = documento.numero_documento(),
                ajustes = ajustes.len(),
                motivo = %motivo,
                "recepción anulada"
            );
            Ok(flujo.documento().clone())
        })
    }

    pub fn revisar(
        &self,
        id: RecepcionId,
        id_supervisor: EmpleadoId,
        observaciones: Option<String>,
        version: u64,
    ) -> DomainResult<DocumentoRecepcion> {
        self.supervisar(id, EstadoRecepcion::Revisado, id_supervisor, observaciones, version)
    }

    pub fn cerrar(
        &self,
        id: RecepcionId,
        id_supervisor: EmpleadoId,
        observaciones: Option<String>,
        version: u64,
    ) -> DomainResult<DocumentoRecepcion> {
        self.supervisar(id, EstadoRecepcion::Cerrado, id_supervisor, observaciones, version)
    }

    pub fn corregir(
        &self,
        id: RecepcionId,
        id_supervisor: EmpleadoId,
        observaciones: Option<String>,
        version: u64,
    ) -> DomainResult<DocumentoRecepcion> {
        self.supervisar(id, EstadoRecepcion::Corregido, id_supervisor, observaciones, version)
    }

    pub fn marcar_con_ajustes(
        &self,
        id: RecepcionId,
        id_supervisor: EmpleadoId,
        observaciones: Option<String>,
        version: u64,
    ) -> DomainResult<DocumentoRecepcion> {
        self.supervisar(id, EstadoRecepcion::ConAjustes, id_supervisor, observaciones, version)
    }

    /// Supervision moves require the version the supervisor last read, so two
    /// supervisors acting on the same state cannot both succeed.
    fn supervisar(
        &self,
        id: RecepcionId,
        destino: EstadoRecepcion,
        id_supervisor: EmpleadoId,
        observaciones: Option<String>,
        version: u64,
    ) -> DomainResult<DocumentoRecepcion> {
        let comando = RecepcionCommand::Supervisar(Supervisar {
            destino,
            observaciones,
            id_supervisor,
            occurred_at: self.ledger.reloj().ahora(),
        });
        let documento = self
            .documentos
            .ejecutar(&id, ExpectedVersion::Exact(version), &comando, id_supervisor)?;
        info!(recepcion = %id, estado = %destino, supervisor = %id_supervisor, "recepción supervisada");
        Ok(documento)
    }

    pub fn obtener(&self, id: RecepcionId) -> DomainResult<DocumentoRecepcion> {
        self.documentos.obtener(&id)
    }

    /// Documents matching `filtro`, ordered by numero.
    pub fn listar(&self, filtro: &FiltroRecepciones) -> DomainResult<Vec<DocumentoRecepcion>> {
        let mut documentos = self.documentos.listar(|d| filtro.coincide(d))?;
        documentos.sort_by(|a, b| a.numero_documento().cmp(b.numero_documento()));
        Ok(documentos)
    }

    pub fn historial(&self, id: RecepcionId) -> DomainResult<Vec<EventRecord<RecepcionEvent>>> {
        self.documentos.historial(&id)
    }
}
