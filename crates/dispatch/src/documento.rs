use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use almacen_core::{
    Aggregate, AggregateRoot, ConductorId, DomainError, EmpleadoId, MovimientoId, OrdenId,
    RutaId, SalidaId,
};
use almacen_events::Event;
use almacen_inventory::{Requerimiento, validator::consolidar};

use crate::estado::EstadoSalida;
use crate::orden::ResumenOrden;

/// Aggregate root: DocumentoSalida.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentoSalida {
    id: SalidaId,
    numero_documento: String,
    id_ruta: RutaId,
    id_conductor: ConductorId,
    fecha_salida: NaiveDate,
    estado: EstadoSalida,
    valor_total: u64,
    ids_ordenes: Vec<OrdenId>,
    detalles: Vec<Requerimiento>,
    movimientos: Vec<MovimientoId>,
    creado_por: Option<EmpleadoId>,
    cambiado_por: Option<EmpleadoId>,
    fecha_cambio_estado: Option<DateTime<Utc>>,
    despachado_por: Option<EmpleadoId>,
    fecha_despacho: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl DocumentoSalida {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: SalidaId) -> Self {
        Self {
            id,
            numero_documento: String::new(),
            id_ruta: RutaId::default(),
            id_conductor: ConductorId::default(),
            fecha_salida: NaiveDate::default(),
            estado: EstadoSalida::Pendiente,
            valor_total: 0,
            ids_ordenes: Vec::new(),
            detalles: Vec::new(),
            movimientos: Vec::new(),
            creado_por: None,
            cambiado_por: None,
            fecha_cambio_estado: None,
            despachado_por: None,
            fecha_despacho: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SalidaId {
        self.id
    }

    pub fn numero_documento(&self) -> &str {
        &self.numero_documento
    }

    pub fn id_ruta(&self) -> RutaId {
        self.id_ruta
    }

    pub fn id_conductor(&self) -> ConductorId {
        self.id_conductor
    }

    pub fn fecha_salida(&self) -> NaiveDate {
        self.fecha_salida
    }

    pub fn estado(&self) -> EstadoSalida {
        self.estado
    }

    pub fn valor_total(&self) -> u64 {
        self.valor_total
    }

    pub fn ids_ordenes(&self) -> &[OrdenId] {
        &self.ids_ordenes
    }

    /// Consolidated quantity per product, ordered by product id.
    pub fn detalles(&self) -> &[Requerimiento] {
        &self.detalles
    }

    /// SALIDA movements posted when the document was dispatched.
    pub fn movimientos(&self) -> &[MovimientoId] {
        &self.movimientos
    }

    pub fn creado_por(&self) -> Option<EmpleadoId> {
        self.creado_por
    }

    pub fn cambiado_por(&self) -> Option<EmpleadoId> {
        self.cambiado_por
    }

    pub fn fecha_cambio_estado(&self) -> Option<DateTime<Utc>> {
        self.fecha_cambio_estado
    }

    pub fn despachado_por(&self) -> Option<EmpleadoId> {
        self.despachado_por
    }

    pub fn fecha_despacho(&self) -> Option<DateTime<Utc>> {
        self.fecha_despacho
    }

    /// Orders can only be added while the document is PENDIENTE.
    pub fn verificar_ampliable(&self) -> Result<(), DomainError> {
        self.ensure_created()?;
        if self.estado != EstadoSalida::Pendiente {
            return Err(DomainError::conflict(format!(
                "salida {} is {}; orders can only be added while PENDIENTE",
                self.numero_documento, self.estado
            )));
        }
        Ok(())
    }

    pub fn verificar_despachable(&self) -> Result<(), DomainError> {
        self.ensure_created()?;
        self.ensure_transition(EstadoSalida::Despachada)
    }

    /// Checks a state change requested through `cambiar_estado`.
    pub fn verificar_cambio(&self, destino: EstadoSalida) -> Result<(), DomainError> {
        self.ensure_created()?;
        if destino == EstadoSalida::Despachada {
            return Err(DomainError::validation(
                "DESPACHADA is only reachable through despachar",
            ));
        }
        self.ensure_transition(destino)
    }
}

impl AggregateRoot for DocumentoSalida {
    type Id = SalidaId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CrearSalida. `ordenes` were claimed by the engine beforehand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrearSalida {
    pub salida_id: SalidaId,
    pub numero_documento: String,
    pub id_ruta: RutaId,
    pub id_conductor: ConductorId,
    pub fecha_salida: NaiveDate,
    pub ordenes: Vec<ResumenOrden>,
    pub id_empleado: EmpleadoId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AgregarOrdenes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgregarOrdenes {
    pub ordenes: Vec<ResumenOrden>,
    pub id_empleado: EmpleadoId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CambiarEstado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CambiarEstado {
    pub nuevo_estado: EstadoSalida,
    pub id_empleado: EmpleadoId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Despachar. `movimientos` are the SALIDA postings already made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Despachar {
    pub movimientos: Vec<MovimientoId>,
    pub id_empleado: EmpleadoId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalidaCommand {
    Crear(CrearSalida),
    AgregarOrdenes(AgregarOrdenes),
    CambiarEstado(CambiarEstado),
    Despachar(Despachar),
}

/// Event: SalidaCreada.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalidaCreada {
    pub salida_id: SalidaId,
    pub numero_documento: String,
    pub id_ruta: RutaId,
    pub id_conductor: ConductorId,
    pub fecha_salida: NaiveDate,
    pub ordenes: Vec<ResumenOrden>,
    /// Consolidated lines after this event.
    pub detalles: Vec<Requerimiento>,
    pub valor_total: u64,
    pub id_empleado: EmpleadoId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrdenesAgregadas. Carries the resulting consolidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrdenesAgregadas {
    pub ordenes: Vec<ResumenOrden>,
    pub detalles: Vec<Requerimiento>,
    pub valor_total: u64,
    pub id_empleado: EmpleadoId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: EstadoCambiado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstadoCambiado {
    pub desde: EstadoSalida,
    pub hacia: EstadoSalida,
    pub id_empleado: EmpleadoId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SalidaDespachada.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalidaDespachada {
    pub movimientos: Vec<MovimientoId>,
    pub id_empleado: EmpleadoId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalidaEvent {
    Creada(SalidaCreada),
    OrdenesAgregadas(OrdenesAgregadas),
    EstadoCambiado(EstadoCambiado),
    Despachada(SalidaDespachada),
}

impl SalidaEvent {
    pub fn actor(&self) -> EmpleadoId {
        match self {
            SalidaEvent::Creada(e) => e.id_empleado,
            SalidaEvent::OrdenesAgregadas(e) => e.id_empleado,
            SalidaEvent::EstadoCambiado(e) => e.id_empleado,
            SalidaEvent::Despachada(e) => e.id_empleado,
        }
    }
}

impl Event for SalidaEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SalidaEvent::Creada(_) => "salida.documento.creado",
            SalidaEvent::OrdenesAgregadas(_) => "salida.documento.ordenes_agregadas",
            SalidaEvent::EstadoCambiado(_) => "salida.documento.estado_cambiado",
            SalidaEvent::Despachada(_) => "salida.documento.despachado",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SalidaEvent::Creada(e) => e.occurred_at,
            SalidaEvent::OrdenesAgregadas(e) => e.occurred_at,
            SalidaEvent::EstadoCambiado(e) => e.occurred_at,
            SalidaEvent::Despachada(e) => e.occurred_at,
        }
    }
}

impl Aggregate for DocumentoSalida {
    type Command = SalidaCommand;
    type Event = SalidaEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SalidaEvent::Creada(e) => {
                self.id = e.salida_id;
                self.numero_documento = e.numero_documento.clone();
                self.id_ruta = e.id_ruta;
                self.id_conductor = e.id_conductor;
                self.fecha_salida = e.fecha_salida;
                self.estado = EstadoSalida::Pendiente;
                self.ids_ordenes.clear();
                self.incorporar(&e.ordenes, &e.detalles, e.valor_total);
                self.creado_por = Some(e.id_empleado);
                self.created = true;
            }
            SalidaEvent::OrdenesAgregadas(e) => {
                self.incorporar(&e.ordenes, &e.detalles, e.valor_total);
            }
            SalidaEvent::EstadoCambiado(e) => {
                self.estado = e.hacia;
                self.cambiado_por = Some(e.id_empleado);
                self.fecha_cambio_estado = Some(e.occurred_at);
            }
            SalidaEvent::Despachada(e) => {
                self.estado = EstadoSalida::Despachada;
                self.movimientos = e.movimientos.clone();
                self.despachado_por = Some(e.id_empleado);
                self.fecha_despacho = Some(e.occurred_at);
                self.cambiado_por = Some(e.id_empleado);
                self.fecha_cambio_estado = Some(e.occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SalidaCommand::Crear(cmd) => self.handle_crear(cmd),
            SalidaCommand::AgregarOrdenes(cmd) => self.handle_agregar(cmd),
            SalidaCommand::CambiarEstado(cmd) => self.handle_cambiar_estado(cmd),
            SalidaCommand::Despachar(cmd) => self.handle_despachar(cmd),
        }
    }
}

impl DocumentoSalida {
    fn incorporar(&mut self, ordenes: &[ResumenOrden], detalles: &[Requerimiento], valor_total: u64) {
        self.ids_ordenes.extend(ordenes.iter().map(|o| o.orden_id));
        self.detalles = detalles.to_vec();
        self.valor_total = valor_total;
    }

    /// Lines and value the document would hold after taking `ordenes`.
    fn acumular(&self, ordenes: &[ResumenOrden]) -> Result<(Vec<Requerimiento>, u64), DomainError> {
        let lineas = ordenes.iter().flat_map(|o| o.lineas.iter().copied());
        let detalles = consolidar(self.detalles.iter().copied().chain(lineas))?;
        let mut valor_total = self.valor_total;
        for o in ordenes {
            valor_total = valor_total.checked_add(o.total).ok_or_else(|| {
                DomainError::validation(format!("valor_total overflows adding orden {}", o.orden_id))
            })?;
        }
        Ok((detalles, valor_total))
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("salida {}", self.id)));
        }
        Ok(())
    }

    fn ensure_transition(&self, destino: EstadoSalida) -> Result<(), DomainError> {
        if !self.estado.puede_pasar_a(destino) {
            return Err(DomainError::transicion_invalida(self.estado, destino));
        }
        Ok(())
    }

    fn validar_ordenes(&self, ordenes: &[ResumenOrden]) -> Result<(), DomainError> {
        if ordenes.is_empty() {
            return Err(DomainError::validation("at least one orden is required"));
        }
        let mut vistas: Vec<OrdenId> = self.ids_ordenes.clone();
        for o in ordenes {
            if vistas.contains(&o.orden_id) {
                return Err(DomainError::validation(format!(
                    "orden {} is listed twice",
                    o.orden_id
                )));
            }
            vistas.push(o.orden_id);
        }
        Ok(())
    }

    fn handle_crear(&self, cmd: &CrearSalida) -> Result<Vec<SalidaEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("salida already exists"));
        }
        if cmd.numero_documento.trim().is_empty() {
            return Err(DomainError::validation("numero_documento cannot be empty"));
        }
        self.validar_ordenes(&cmd.ordenes)?;
        let (detalles, valor_total) = self.acumular(&cmd.ordenes)?;

        Ok(vec![SalidaEvent::Creada(SalidaCreada {
            salida_id: cmd.salida_id,
            numero_documento: cmd.numero_documento.trim().to_string(),
            id_ruta: cmd.id_ruta,
            id_conductor: cmd.id_conductor,
            fecha_salida: cmd.fecha_salida,
            ordenes: cmd.ordenes.clone(),
            detalles,
            valor_total,
            id_empleado: cmd.id_empleado,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_agregar(&self, cmd: &AgregarOrdenes) -> Result<Vec<SalidaEvent>, DomainError> {
        self.verificar_ampliable()?;
        self.validar_ordenes(&cmd.ordenes)?;
        let (detalles, valor_total) = self.acumular(&cmd.ordenes)?;

        Ok(vec![SalidaEvent::OrdenesAgregadas(OrdenesAgregadas {
            ordenes: cmd.ordenes.clone(),
            detalles,
            valor_total,
            id_empleado: cmd.id_empleado,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cambiar_estado(&self, cmd: &CambiarEstado) -> Result<Vec<SalidaEvent>, DomainError> {
        self.verificar_cambio(cmd.nuevo_estado)?;

        Ok(vec![SalidaEvent::EstadoCambiado(EstadoCambiado {
            desde: self.estado,
            hacia: cmd.nuevo_estado,
            id_empleado: cmd.id_empleado,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_despachar(&self, cmd: &Despachar) -> Result<Vec<SalidaEvent>, DomainError> {
        self.verificar_despachable()?;

        Ok(vec![SalidaEvent::Despachada(SalidaDespachada {
            movimientos: cmd.movimientos.clone(),
            id_empleado: cmd.id_empleado,
            occurred_at: cmd.occurred_at,
        })])
    }
}

/// Listing criteria; date bounds are inclusive on `fecha_salida`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiltroSalidas {
    pub estado: Option<EstadoSalida>,
    pub fecha_inicio: Option<NaiveDate>,
    pub fecha_fin: Option<NaiveDate>,
    pub id_ruta: Option<RutaId>,
}

impl FiltroSalidas {
    pub fn por_ruta(id_ruta: RutaId) -> Self {
        Self {
            id_ruta: Some(id_ruta),
            ..Self::default()
        }
    }

    pub fn coincide(&self, doc: &DocumentoSalida) -> bool {
        self.estado.is_none_or(|e| e == doc.estado())
            && self.fecha_inicio.is_none_or(|f| doc.fecha_salida() >= f)
            && self.fecha_fin.is_none_or(|f| doc.fecha_salida() <= f)
            && self.id_ruta.is_none_or(|r| r == doc.id_ruta())
    }
}
