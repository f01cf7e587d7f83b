//! In-memory document streams.
//!
//! Every document lives in its own stream: current aggregate state plus the
//! audit records of the events that produced it. Commands run under the
//! stream's lock with an optimistic version check.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::{Arc, Mutex, RwLock};

use almacen_core::{Aggregate, DomainError, DomainResult, EmpleadoId, ExpectedVersion};
use almacen_events::{Event, EventRecord};

/// One document and its audit trail.
#[derive(Debug, Clone)]
pub struct Flujo<A: Aggregate> {
    documento: A,
    historial: Vec<EventRecord<A::Event>>,
}

impl<A> Flujo<A>
where
    A: Aggregate<Error = DomainError>,
    A::Event: Event,
{
    pub fn documento(&self) -> &A {
        &self.documento
    }

    pub fn historial(&self) -> &[EventRecord<A::Event>] {
        &self.historial
    }

    /// Decides and applies `comando`. On error the document is untouched.
    pub fn ejecutar(&mut self, comando: &A::Command, actor: EmpleadoId) -> DomainResult<Vec<A::Event>> {
        let eventos = self.documento.handle(comando)?;
        for evento in &eventos {
            self.documento.apply(evento);
            let secuencia = self.historial.len() as u64 + 1;
            self.historial
                .push(EventRecord::new(secuencia, Some(actor), evento.clone()));
        }
        Ok(eventos)
    }
}

/// In-memory repository of document streams.
///
/// Intended for a single process; a persistent store would replace it.
#[derive(Debug)]
pub struct InMemoryRepository<A: Aggregate> {
    nombre: &'static str,
    flujos: RwLock<HashMap<A::Id, Arc<Mutex<Flujo<A>>>>>,
}

impl<A> InMemoryRepository<A>
where
    A: Aggregate<Error = DomainError> + Clone,
    A::Event: Event,
    A::Id: Copy + Display,
{
    pub fn new(nombre: &'static str) -> Self {
        Self {
            nombre,
            flujos: RwLock::new(HashMap::new()),
        }
    }

    /// Runs the creating command against `vacio` and stores the result.
    pub fn crear(&self, vacio: A, comando: &A::Command, actor: EmpleadoId) -> DomainResult<A> {
        let mut flujo = Flujo {
            documento: vacio,
            historial: Vec::new(),
        };
        flujo.ejecutar(comando, actor)?;
        let documento = flujo.documento.clone();
        let id = *documento.id();

        let mut flujos = self
            .flujos
            .write()
            .map_err(|_| DomainError::lock_poisoned())?;
        if flujos.contains_key(&id) {
            return Err(DomainError::conflict(format!("{} {id} already exists", self.nombre)));
        }
        flujos.insert(id, Arc::new(Mutex::new(flujo)));
        Ok(documento)
    }

    fn celda(&self, id: &A::Id) -> DomainResult<Arc<Mutex<Flujo<A>>>> {
        let flujos = self
            .flujos
            .read()
            .map_err(|_| DomainError::lock_poisoned())?;
        flujos
            .get(id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("{} {id}", self.nombre)))
    }

    /// Runs `f` holding the document's lock, after checking `esperado`.
    pub fn con_documento<T>(
        &self,
        id: &A::Id,
        esperado: ExpectedVersion,
        f: impl FnOnce(&mut Flujo<A>) -> DomainResult<T>,
    ) -> DomainResult<T> {
        let celda = self.celda(id)?;
        let mut flujo = celda.lock().map_err(|_| DomainError::lock_poisoned())?;
        esperado.check(flujo.documento.version())?;
        f(&mut flujo)
    }

    pub fn ejecutar(
        &self,
        id: &A::Id,
        esperado: ExpectedVersion,
        comando: &A::Command,
        actor: EmpleadoId,
    ) -> DomainResult<A> {
        self.con_documento(id, esperado, |flujo| {
            flujo.ejecutar(comando, actor)?;
            Ok(flujo.documento.clone())
        })
    }

    pub fn obtener(&self, id: &A::Id) -> DomainResult<A> {
        let celda = self.celda(id)?;
        let flujo = celda.lock().map_err(|_| DomainError::lock_poisoned())?;
        Ok(flujo.documento.clone())
    }

    pub fn historial(&self, id: &A::Id) -> DomainResult<Vec<EventRecord<A::Event>>> {
        let celda = self.celda(id)?;
        let flujo = celda.lock().map_err(|_| DomainError::lock_poisoned())?;
        Ok(flujo.historial.clone())
    }

    /// Snapshot of every document accepted by `criterio`.
    pub fn listar(&self, criterio: impl Fn(&A) -> bool) -> DomainResult<Vec<A>> {
        let celdas: Vec<_> = {
            let flujos = self
                .flujos
                .read()
                .map_err(|_| DomainError::lock_poisoned())?;
            flujos.values().cloned().collect()
        };
        let mut documentos = Vec::new();
        for celda in celdas {
            let flujo = celda.lock().map_err(|_| DomainError::lock_poisoned())?;
            if criterio(&flujo.documento) {
                documentos.push(flujo.documento.clone());
            }
        }
        Ok(documentos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use almacen_core::{AggregateRoot, ProductoId, RecepcionId};
    use almacen_reception::{
        ConfirmarRecepcion, CrearRecepcion, DetalleRecepcion, DocumentoRecepcion, EstadoRecepcion,
        RecepcionCommand,
    };
    use chrono::{NaiveDate, Utc};

    fn crear(repo: &InMemoryRepository<DocumentoRecepcion>) -> DocumentoRecepcion {
        let id = RecepcionId::new();
        let cmd = RecepcionCommand::Crear(CrearRecepcion {
            recepcion_id: id,
            numero_documento: "REC-000001".to_string(),
            fecha_elaboracion: NaiveDate::from_ymd_opt(2024, 12, 1).unwrap(),
            motivo: "compra".to_string(),
            detalles: vec![DetalleRecepcion::new(ProductoId::new(), 1)],
            id_empleado: EmpleadoId::new(),
            occurred_at: Utc::now(),
        });
        repo.crear(DocumentoRecepcion::empty(id), &cmd, EmpleadoId::new())
            .unwrap()
    }

    fn confirmar() -> RecepcionCommand {
        RecepcionCommand::Confirmar(ConfirmarRecepcion {
            entradas: vec![],
            id_empleado: EmpleadoId::new(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn stale_version_is_a_conflict() {
        let repo = InMemoryRepository::new("recepción");
        let doc = crear(&repo);
        let id = doc.id_typed();

        let err = repo
            .ejecutar(&id, ExpectedVersion::Exact(0), &confirmar(), EmpleadoId::new())
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(msg) if msg.contains("optimistic")));

        let doc = repo
            .ejecutar(&id, ExpectedVersion::Exact(1), &confirmar(), EmpleadoId::new())
            .unwrap();
        assert_eq!(doc.estado(), EstadoRecepcion::Confirmado);
        assert_eq!(doc.version(), 2);
    }

    #[test]
    fn rejected_command_leaves_no_history() {
        let repo = InMemoryRepository::new("recepción");
        let id = crear(&repo).id_typed();
        repo.ejecutar(&id, ExpectedVersion::Any, &confirmar(), EmpleadoId::new())
            .unwrap();
        assert!(repo
            .ejecutar(&id, ExpectedVersion::Any, &confirmar(), EmpleadoId::new())
            .is_err());

        let historial = repo.historial(&id).unwrap();
        let tipos: Vec<_> = historial.iter().map(|r| r.event_type().to_string()).collect();
        assert_eq!(
            tipos,
            vec!["recepcion.documento.creado", "recepcion.documento.confirmado"]
        );
        assert_eq!(historial[1].sequence_number(), 2);
    }

    #[test]
    fn unknown_document_is_not_found() {
        let repo: InMemoryRepository<DocumentoRecepcion> = InMemoryRepository::new("recepción");
        let err = repo.obtener(&RecepcionId::new()).unwrap_err();
        assert!(matches!(err, DomainError::NotFound(msg) if msg.starts_with("recepción")));
    }

    #[test]
    fn listar_applies_criterio() {
        let repo = InMemoryRepository::new("recepción");
        crear(&repo);
        let id = crear(&repo).id_typed();
        repo.ejecutar(&id, ExpectedVersion::Any, &confirmar(), EmpleadoId::new())
            .unwrap();
        let confirmadas = repo
            .listar(|d: &DocumentoRecepcion| d.estado() == EstadoRecepcion::Confirmado)
            .unwrap();
        assert_eq!(confirmadas.len(), 1);
        assert_eq!(repo.listar(|_| true).unwrap().len(), 2);
    }
}
