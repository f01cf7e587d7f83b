//! Customer orders as seen by dispatch.
//!
//! Orders are owned by an external module; the warehouse keeps a copy in its
//! orders table so documents can claim them exclusively.

use core::fmt;

use serde::{Deserialize, Serialize};

use almacen_core::{DomainError, DomainResult, OrdenId, ProductoId, SalidaId};
use almacen_inventory::Requerimiento;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EstadoOrden {
    Pendiente,
    Confirmada,
    Despachada,
    Entregada,
    Cancelada,
}

impl EstadoOrden {
    /// Orders in these states can be put on a truck.
    pub fn despachable(self) -> bool {
        matches!(self, EstadoOrden::Pendiente | EstadoOrden::Confirmada)
    }
}

impl fmt::Display for EstadoOrden {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EstadoOrden::Pendiente => "PENDIENTE",
            EstadoOrden::Confirmada => "CONFIRMADA",
            EstadoOrden::Despachada => "DESPACHADA",
            EstadoOrden::Entregada => "ENTREGADA",
            EstadoOrden::Cancelada => "CANCELADA",
        };
        f.write_str(s)
    }
}

/// Order line: product, quantity, unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineaOrden {
    pub producto_id: ProductoId,
    pub cantidad: i64,
    /// Price in smallest currency unit (cents).
    pub precio_unitario: u64,
}

impl LineaOrden {
    pub fn subtotal(&self) -> DomainResult<u64> {
        u64::try_from(self.cantidad)
            .ok()
            .and_then(|cantidad| cantidad.checked_mul(self.precio_unitario))
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "subtotal for producto {} overflows",
                    self.producto_id
                ))
            })
    }
}

/// Order data as delivered by the order module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NuevaOrden {
    pub id: OrdenId,
    pub numero: String,
    pub estado: EstadoOrden,
    pub lineas: Vec<LineaOrden>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orden {
    id: OrdenId,
    numero: String,
    estado: EstadoOrden,
    lineas: Vec<LineaOrden>,
    total: u64,
    documento_salida: Option<SalidaId>,
}

/// What a dispatch document keeps from each order it claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumenOrden {
    pub orden_id: OrdenId,
    pub total: u64,
    pub lineas: Vec<Requerimiento>,
}

impl Orden {
    pub fn registrar(nueva: NuevaOrden) -> DomainResult<Self> {
        let numero = nueva.numero.trim().to_string();
        if numero.is_empty() {
            return Err(DomainError::validation("numero de orden cannot be empty"));
        }
        if nueva.lineas.is_empty() {
            return Err(DomainError::validation(format!("orden {numero} has no lineas")));
        }
        if nueva.lineas.iter().any(|l| l.cantidad <= 0) {
            return Err(DomainError::validation(format!(
                "orden {numero} has a non-positive cantidad"
            )));
        }

        let mut total: u64 = 0;
        for linea in &nueva.lineas {
            total = total.checked_add(linea.subtotal()?).ok_or_else(|| {
                DomainError::validation(format!("total of orden {numero} overflows"))
            })?;
        }
        Ok(Self {
            id: nueva.id,
            numero,
            estado: nueva.estado,
            lineas: nueva.lineas,
            total,
            documento_salida: None,
        })
    }

    pub fn id(&self) -> OrdenId {
        self.id
    }

    pub fn numero(&self) -> &str {
        &self.numero
    }

    pub fn estado(&self) -> EstadoOrden {
        self.estado
    }

    pub fn lineas(&self) -> &[LineaOrden] {
        &self.lineas
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn documento_salida(&self) -> Option<SalidaId> {
        self.documento_salida
    }

    pub fn resumen(&self) -> ResumenOrden {
        ResumenOrden {
            orden_id: self.id,
            total: self.total,
            lineas: self
                .lineas
                .iter()
                .map(|l| Requerimiento::new(l.producto_id, l.cantidad))
                .collect(),
        }
    }

    /// Checks that `salida` could claim this order, without claiming it.
    pub fn verificar_reclamable(&self, salida: SalidaId) -> DomainResult<()> {
        if let Some(dueno) = self.documento_salida {
            return Err(DomainError::conflict(format!(
                "orden {} is already claimed by salida {dueno} (requested by {salida})",
                self.numero
            )));
        }
        if !self.estado.despachable() {
            return Err(DomainError::validation(format!(
                "orden {} is {} and cannot be dispatched",
                self.numero, self.estado
            )));
        }
        Ok(())
    }

    pub fn reclamar(&mut self, salida: SalidaId) -> DomainResult<()> {
        self.verificar_reclamable(salida)?;
        self.documento_salida = Some(salida);
        Ok(())
    }

    /// Drops the claim if `salida` holds it; no-op otherwise.
    pub fn liberar(&mut self, salida: SalidaId) -> bool {
        if self.documento_salida == Some(salida) {
            self.documento_salida = None;
            true
        } else {
            false
        }
    }

    pub fn marcar_despachada(&mut self, salida: SalidaId) -> DomainResult<()> {
        if self.documento_salida != Some(salida) {
            return Err(DomainError::invariant(format!(
                "orden {} is not claimed by salida {salida}",
                self.numero
            )));
        }
        if !self.estado.despachable() {
            return Err(DomainError::invariant(format!(
                "orden {} is {} while its salida is dispatched",
                self.numero, self.estado
            )));
        }
        self.estado = EstadoOrden::Despachada;
        Ok(())
    }

    pub fn marcar_entregada(&mut self) -> DomainResult<()> {
        if self.estado != EstadoOrden::Despachada {
            return Err(DomainError::transicion_invalida(self.estado, EstadoOrden::Entregada));
        }
        self.estado = EstadoOrden::Entregada;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orden(estado: EstadoOrden) -> Orden {
        Orden::registrar(NuevaOrden {
            id: OrdenId::new(),
            numero: "ORD-1".to_string(),
            estado,
            lineas: vec![
                LineaOrden {
                    producto_id: ProductoId::new(),
                    cantidad: 3,
                    precio_unitario: 250,
                },
                LineaOrden {
                    producto_id: ProductoId::new(),
                    cantidad: 2,
                    precio_unitario: 1_000,
                },
            ],
        })
        .unwrap()
    }

    #[test]
    fn total_is_sum_of_line_subtotals() {
        assert_eq!(orden(EstadoOrden::Pendiente).total(), 2_750);
    }

    #[test]
    fn overflowing_amounts_are_rejected() {
        let linea = |cantidad, precio_unitario| LineaOrden {
            producto_id: ProductoId::new(),
            cantidad,
            precio_unitario,
        };
        let registrar = |lineas| {
            Orden::registrar(NuevaOrden {
                id: OrdenId::new(),
                numero: "ORD-9".to_string(),
                estado: EstadoOrden::Pendiente,
                lineas,
            })
        };

        assert!(matches!(
            registrar(vec![linea(2, u64::MAX / 2 + 1)]),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            registrar(vec![linea(1, u64::MAX), linea(1, 1)]),
            Err(DomainError::Validation(_))
        ));
        assert_eq!(registrar(vec![linea(1, u64::MAX)]).unwrap().total(), u64::MAX);
    }

    #[test]
    fn registrar_rejects_empty_orders() {
        let err = Orden::registrar(NuevaOrden {
            id: OrdenId::new(),
            numero: "ORD-2".to_string(),
            estado: EstadoOrden::Pendiente,
            lineas: vec![],
        })
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn claim_is_exclusive() {
        let mut o = orden(EstadoOrden::Confirmada);
        let a = SalidaId::new();
        let b = SalidaId::new();
        o.reclamar(a).unwrap();
        assert_eq!(o.documento_salida(), Some(a));

        match o.reclamar(b).unwrap_err() {
            DomainError::Conflict(msg) if msg.contains("already claimed") => {}
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(o.documento_salida(), Some(a));
    }

    #[test]
    fn only_pending_or_confirmed_orders_are_claimable() {
        let mut o = orden(EstadoOrden::Cancelada);
        assert!(matches!(o.reclamar(SalidaId::new()), Err(DomainError::Validation(_))));
        assert_eq!(o.documento_salida(), None);
    }

    #[test]
    fn liberar_only_by_owner() {
        let mut o = orden(EstadoOrden::Pendiente);
        let a = SalidaId::new();
        o.reclamar(a).unwrap();
        assert!(!o.liberar(SalidaId::new()));
        assert!(o.liberar(a));
        assert!(o.reclamar(SalidaId::new()).is_ok());
    }

    #[test]
    fn delivery_follows_dispatch() {
        let mut o = orden(EstadoOrden::Pendiente);
        assert!(o.marcar_entregada().is_err());
        let a = SalidaId::new();
        o.reclamar(a).unwrap();
        o.marcar_despachada(a).unwrap();
        o.marcar_entregada().unwrap();
        assert_eq!(o.estado(), EstadoOrden::Entregada);
    }
}
