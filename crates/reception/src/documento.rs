use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use almacen_core::{
    Aggregate, AggregateRoot, DomainError, EmpleadoId, LoteId, MovimientoId, ProductoId,
    RecepcionId,
};
use almacen_events::Event;

use crate::estado::EstadoRecepcion;

/// One received product line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetalleRecepcion {
    pub producto_id: ProductoId,
    pub cantidad: i64,
    /// Required for lot-tracked products (checked by the engine, which knows the product).
    pub codigo_lote: Option<String>,
    /// Overrides the expiry derived from the product's shelf life.
    pub fecha_vencimiento: Option<NaiveDate>,
    pub observaciones: Option<String>,
}

impl DetalleRecepcion {
    pub fn new(producto_id: ProductoId, cantidad: i64) -> Self {
        Self {
            producto_id,
            cantidad,
            codigo_lote: None,
            fecha_vencimiento: None,
            observaciones: None,
        }
    }

    pub fn con_lote(mut self, codigo_lote: impl Into<String>) -> Self {
        self.codigo_lote = Some(codigo_lote.into());
        self
    }

    pub fn con_vencimiento(mut self, fecha: NaiveDate) -> Self {
        self.fecha_vencimiento = Some(fecha);
        self
    }

    pub fn con_observaciones(mut self, observaciones: impl Into<String>) -> Self {
        self.observaciones = Some(observaciones.into());
        self
    }

    /// Same stock-relevant content, annotations aside.
    fn mismo_contenido(&self, otro: &DetalleRecepcion) -> bool {
        self.producto_id == otro.producto_id
            && self.cantidad == otro.cantidad
            && self.codigo_lote == otro.codigo_lote
            && self.fecha_vencimiento == otro.fecha_vencimiento
    }
}

/// Ledger entrada posted on confirmation; kept so annulment can reverse it exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntradaRegistrada {
    pub movimiento_id: MovimientoId,
    pub producto_id: ProductoId,
    pub lote_id: Option<LoteId>,
    pub cantidad: i64,
}

/// Aggregate root: DocumentoRecepcion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentoRecepcion {
    id: RecepcionId,
    numero_documento: String,
    fecha_elaboracion: NaiveDate,
    motivo: String,
    estado: EstadoRecepcion,
    detalles: Vec<DetalleRecepcion>,
    entradas: Vec<EntradaRegistrada>,
    creado_por: Option<EmpleadoId>,
    fecha_creacion: Option<DateTime<Utc>>,
    confirmado_por: Option<EmpleadoId>,
    fecha_confirmacion: Option<DateTime<Utc>>,
    revisado_por: Option<EmpleadoId>,
    observaciones_revision: Option<String>,
    anulado_por: Option<EmpleadoId>,
    motivo_anulacion: Option<String>,
    cambiado_por: Option<EmpleadoId>,
    fecha_cambio_estado: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl DocumentoRecepcion {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: RecepcionId) -> Self {
        Self {
            id,
            numero_documento: String::new(),
            fecha_elaboracion: NaiveDate::default(),
            motivo: String::new(),
            estado: EstadoRecepcion::Pendiente,
            detalles: Vec::new(),
            entradas: Vec::new(),
            creado_por: None,
            fecha_creacion: None,
            confirmado_por: None,
            fecha_confirmacion: None,
            revisado_por: None,
            observaciones_revision: None,
            anulado_por: None,
            motivo_anulacion: None,
            cambiado_por: None,
            fecha_cambio_estado: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> RecepcionId {
        self.id
    }

    pub fn numero_documento(&self) -> &str {
        &self.numero_documento
    }

    pub fn fecha_elaboracion(&self) -> NaiveDate {
        self.fecha_elaboracion
    }

    pub fn motivo(&self) -> &str {
        &self.motivo
    }

    pub fn estado(&self) -> EstadoRecepcion {
        self.estado
    }

    pub fn detalles(&self) -> &[DetalleRecepcion] {
        &self.detalles
    }

    pub fn entradas(&self) -> &[EntradaRegistrada] {
        &self.entradas
    }

    pub fn creado_por(&self) -> Option<EmpleadoId> {
        self.creado_por
    }

    pub fn confirmado_por(&self) -> Option<EmpleadoId> {
        self.confirmado_por
    }

    pub fn fecha_confirmacion(&self) -> Option<DateTime<Utc>> {
        self.fecha_confirmacion
    }

    pub fn revisado_por(&self) -> Option<EmpleadoId> {
        self.revisado_por
    }

    pub fn observaciones_revision(&self) -> Option<&str> {
        self.observaciones_revision.as_deref()
    }

    pub fn anulado_por(&self) -> Option<EmpleadoId> {
        self.anulado_por
    }

    pub fn motivo_anulacion(&self) -> Option<&str> {
        self.motivo_anulacion.as_deref()
    }

    pub fn cambiado_por(&self) -> Option<EmpleadoId> {
        self.cambiado_por
    }

    pub fn fecha_cambio_estado(&self) -> Option<DateTime<Utc>> {
        self.fecha_cambio_estado
    }

    pub fn productos(&self) -> Vec<ProductoId> {
        self.detalles.iter().map(|d| d.producto_id).collect()
    }

    /// Confirmation precondition, checked before anything touches the ledger.
    pub fn verificar_confirmable(&self) -> Result<(), DomainError> {
        self.ensure_created()?;
        if self.estado != EstadoRecepcion::Pendiente {
            return Err(DomainError::conflict(format!(
                "recepción {} is {} and cannot be confirmed again",
                self.numero_documento, self.estado
            )));
        }
        Ok(())
    }

    /// Annulment precondition; true when compensating movements are needed.
    pub fn verificar_anulable(&self, motivo: &str) -> Result<bool, DomainError> {
        self.ensure_created()?;
        if motivo.trim().is_empty() {
            return Err(DomainError::validation("motivo de anulación cannot be empty"));
        }
        self.ensure_transition(EstadoRecepcion::Anulado)?;
        Ok(self.estado.tiene_entradas())
    }
}

impl AggregateRoot for DocumentoRecepcion {
    type Id = RecepcionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CrearRecepcion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrearRecepcion {
    pub recepcion_id: RecepcionId,
    pub numero_documento: String,
    pub fecha_elaboracion: NaiveDate,
    pub motivo: String,
    pub detalles: Vec<DetalleRecepcion>,
    pub id_empleado: EmpleadoId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ActualizarDetalles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualizarDetalles {
    pub detalles: Vec<DetalleRecepcion>,
    pub id_empleado: EmpleadoId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmarRecepcion (entradas already posted by the engine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmarRecepcion {
    pub entradas: Vec<EntradaRegistrada>,
    pub id_empleado: EmpleadoId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AnularRecepcion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnularRecepcion {
    pub motivo: String,
    /// Compensating AJUSTE movements posted by the engine (empty if never confirmed).
    pub ajustes: Vec<MovimientoId>,
    pub id_empleado: EmpleadoId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: a supervision step (revisar, cerrar, corregir, marcar con ajustes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supervisar {
    pub destino: EstadoRecepcion,
    pub observaciones: Option<String>,
    pub id_supervisor: EmpleadoId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecepcionCommand {
    Crear(CrearRecepcion),
    ActualizarDetalles(ActualizarDetalles),
    Confirmar(ConfirmarRecepcion),
    Anular(AnularRecepcion),
    Supervisar(Supervisar),
}

/// Event: RecepcionCreada.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecepcionCreada {
    pub recepcion_id: RecepcionId,
    pub numero_documento: String,
    pub fecha_elaboracion: NaiveDate,
    pub motivo: String,
    pub detalles: Vec<DetalleRecepcion>,
    pub id_empleado: EmpleadoId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DetallesActualizados.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetallesActualizados {
    pub detalles: Vec<DetalleRecepcion>,
    pub id_empleado: EmpleadoId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RecepcionConfirmada.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecepcionConfirmada {
    pub entradas: Vec<EntradaRegistrada>,
    pub id_empleado: EmpleadoId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RecepcionAnulada.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecepcionAnulada {
    pub motivo: String,
    pub ajustes: Vec<MovimientoId>,
    pub id_empleado: EmpleadoId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RecepcionSupervisada (REVISADO, CERRADO, CORREGIDO, CON_AJUSTES).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecepcionSupervisada {
    pub desde: EstadoRecepcion,
    pub hacia: EstadoRecepcion,
    pub observaciones: Option<String>,
    pub id_supervisor: EmpleadoId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecepcionEvent {
    Creada(RecepcionCreada),
    DetallesActualizados(DetallesActualizados),
    Confirmada(RecepcionConfirmada),
    Anulada(RecepcionAnulada),
    Supervisada(RecepcionSupervisada),
}

impl RecepcionEvent {
    pub fn actor(&self) -> EmpleadoId {
        match self {
            RecepcionEvent::Creada(e) => e.id_empleado,
            RecepcionEvent::DetallesActualizados(e) => e.id_empleado,
            RecepcionEvent::Confirmada(e) => e.id_empleado,
            RecepcionEvent::Anulada(e) => e.id_empleado,
            RecepcionEvent::Supervisada(e) => e.id_supervisor,
        }
    }
}

impl Event for RecepcionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RecepcionEvent::Creada(_) => "recepcion.documento.creado",
            RecepcionEvent::DetallesActualizados(_) => "recepcion.documento.detalles_actualizados",
            RecepcionEvent::Confirmada(_) => "recepcion.documento.confirmado",
            RecepcionEvent::Anulada(_) => "recepcion.documento.anulado",
            RecepcionEvent::Supervisada(e) => match e.hacia {
                EstadoRecepcion::Revisado => "recepcion.documento.revisado",
                EstadoRecepcion::Cerrado => "recepcion.documento.cerrado",
                EstadoRecepcion::Corregido => "recepcion.documento.corregido",
                _ => "recepcion.documento.con_ajustes",
            },
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RecepcionEvent::Creada(e) => e.occurred_at,
            RecepcionEvent::DetallesActualizados(e) => e.occurred_at,
            RecepcionEvent::Confirmada(e) => e.occurred_at,
            RecepcionEvent::Anulada(e) => e.occurred_at,
            RecepcionEvent::Supervisada(e) => e.occurred_at,
        }
    }
}

impl Aggregate for DocumentoRecepcion {
    type Command = RecepcionCommand;
    type Event = RecepcionEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RecepcionEvent::Creada(e) => {
                self.id = e.recepcion_id;
                self.numero_documento = e.numero_documento.clone();
                self.fecha_elaboracion = e.fecha_elaboracion;
                self.motivo = e.motivo.clone();
                self.detalles = e.detalles.clone();
                self.estado = EstadoRecepcion::Pendiente;
                self.creado_por = Some(e.id_empleado);
                self.fecha_creacion = Some(e.occurred_at);
                self.created = true;
            }
            RecepcionEvent::DetallesActualizados(e) => {
                self.detalles = e.detalles.clone();
            }
            RecepcionEvent::Confirmada(e) => {
                self.estado = EstadoRecepcion::Confirmado;
                self.entradas = e.entradas.clone();
                self.confirmado_por = Some(e.id_empleado);
                self.fecha_confirmacion = Some(e.occurred_at);
                self.marcar_cambio(e.id_empleado, e.occurred_at);
            }
            RecepcionEvent::Anulada(e) => {
                self.estado = EstadoRecepcion::Anulado;
                self.anulado_por = Some(e.id_empleado);
                self.motivo_anulacion = Some(e.motivo.clone());
                self.marcar_cambio(e.id_empleado, e.occurred_at);
            }
            RecepcionEvent::Supervisada(e) => {
                self.estado = e.hacia;
                if e.hacia == EstadoRecepcion::Revisado {
                    self.revisado_por = Some(e.id_supervisor);
                }
                if e.observaciones.is_some() {
                    self.observaciones_revision = e.observaciones.clone();
                }
                self.marcar_cambio(e.id_supervisor, e.occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RecepcionCommand::Crear(cmd) => self.handle_crear(cmd),
            RecepcionCommand::ActualizarDetalles(cmd) => self.handle_actualizar(cmd),
            RecepcionCommand::Confirmar(cmd) => self.handle_confirmar(cmd),
            RecepcionCommand::Anular(cmd) => self.handle_anular(cmd),
            RecepcionCommand::Supervisar(cmd) => self.handle_supervisar(cmd),
        }
    }
}

impl DocumentoRecepcion {
    fn marcar_cambio(&mut self, actor: EmpleadoId, at: DateTime<Utc>) {
        self.cambiado_por = Some(actor);
        self.fecha_cambio_estado = Some(at);
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("recepción {}", self.id)));
        }
        Ok(())
    }

    fn ensure_transition(&self, destino: EstadoRecepcion) -> Result<(), DomainError> {
        if !self.estado.puede_pasar_a(destino) {
            return Err(DomainError::transicion_invalida(self.estado, destino));
        }
        Ok(())
    }

    fn validar_detalles(detalles: &[DetalleRecepcion]) -> Result<(), DomainError> {
        if detalles.is_empty() {
            return Err(DomainError::validation("recepción needs at least one detalle"));
        }
        for d in detalles {
            if d.cantidad <= 0 {
                return Err(DomainError::validation(format!(
                    "cantidad for producto {} must be positive",
                    d.producto_id
                )));
            }
            if d.codigo_lote.as_deref().is_some_and(|c| c.trim().is_empty()) {
                return Err(DomainError::validation("codigo_lote cannot be blank"));
            }
        }
        Ok(())
    }

    fn handle_crear(&self, cmd: &CrearRecepcion) -> Result<Vec<RecepcionEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("recepción already exists"));
        }
        if cmd.numero_documento.trim().is_empty() {
            return Err(DomainError::validation("numero_documento cannot be empty"));
        }
        if cmd.motivo.trim().is_empty() {
            return Err(DomainError::validation("motivo cannot be empty"));
        }
        Self::validar_detalles(&cmd.detalles)?;

        Ok(vec![RecepcionEvent::Creada(RecepcionCreada {
            recepcion_id: cmd.recepcion_id,
            numero_documento: cmd.numero_documento.trim().to_string(),
            fecha_elaboracion: cmd.fecha_elaboracion,
            motivo: cmd.motivo.trim().to_string(),
            detalles: cmd.detalles.clone(),
            id_empleado: cmd.id_empleado,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_actualizar(
        &self,
        cmd: &ActualizarDetalles,
    ) -> Result<Vec<RecepcionEvent>, DomainError> {
        self.ensure_created()?;
        match self.estado {
            EstadoRecepcion::Pendiente => Self::validar_detalles(&cmd.detalles)?,
            EstadoRecepcion::Corregido => {
                let solo_anotaciones = cmd.detalles.len() == self.detalles.len()
                    && cmd
                        .detalles
                        .iter()
                        .zip(&self.detalles)
                        .all(|(nuevo, actual)| nuevo.mismo_contenido(actual));
                if !solo_anotaciones {
                    return Err(DomainError::validation(
                        "only observaciones can change once the recepción is confirmed",
                    ));
                }
            }
            otro => {
                return Err(DomainError::validation(format!(
                    "detalles cannot be edited while {otro}"
                )));
            }
        }

        Ok(vec![RecepcionEvent::DetallesActualizados(DetallesActualizados {
            detalles: cmd.detalles.clone(),
            id_empleado: cmd.id_empleado,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirmar(
        &self,
        cmd: &ConfirmarRecepcion,
    ) -> Result<Vec<RecepcionEvent>, DomainError> {
        self.verificar_confirmable()?;

        Ok(vec![RecepcionEvent::Confirmada(RecepcionConfirmada {
            entradas: cmd.entradas.clone(),
            id_empleado: cmd.id_empleado,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_anular(&self, cmd: &AnularRecepcion) -> Result<Vec<RecepcionEvent>, DomainError> {
        self.verificar_anulable(&cmd.motivo)?;

        Ok(vec![RecepcionEvent::Anulada(RecepcionAnulada {
            motivo: cmd.motivo.trim().to_string(),
            ajustes: cmd.ajustes.clone(),
            id_empleado: cmd.id_empleado,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_supervisar(&self, cmd: &Supervisar) -> Result<Vec<RecepcionEvent>, DomainError> {
        self.ensure_created()?;
        if matches!(
            cmd.destino,
            EstadoRecepcion::Pendiente | EstadoRecepcion::Confirmado | EstadoRecepcion::Anulado
        ) {
            return Err(DomainError::validation(format!(
                "{} is not a supervision step",
                cmd.destino
            )));
        }
        self.ensure_transition(cmd.destino)?;

        Ok(vec![RecepcionEvent::Supervisada(RecepcionSupervisada {
            desde: self.estado,
            hacia: cmd.destino,
            observaciones: cmd
                .observaciones
                .as_ref()
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty()),
            id_supervisor: cmd.id_supervisor,
            occurred_at: cmd.occurred_at,
        })])
    }
}

/// Listing criteria; date bounds are inclusive on `fecha_elaboracion`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiltroRecepciones {
    pub estado: Option<EstadoRecepcion>,
    pub fecha_inicio: Option<NaiveDate>,
    pub fecha_fin: Option<NaiveDate>,
}

impl FiltroRecepciones {
    pub fn coincide(&self, doc: &DocumentoRecepcion) -> bool {
        self.estado.is_none_or(|e| e == doc.estado())
            && self.fecha_inicio.is_none_or(|f| doc.fecha_elaboracion() >= f)
            && self.fecha_fin.is_none_or(|f| doc.fecha_elaboracion() <= f)
    }
}
