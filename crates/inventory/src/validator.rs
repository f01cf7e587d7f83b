//! Read-only stock sufficiency check.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use almacen_core::{DomainError, DomainResult, ProductoFaltante, ProductoId};

/// A quantity of one product that some document needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requerimiento {
    pub producto_id: ProductoId,
    pub cantidad: i64,
}

impl Requerimiento {
    pub fn new(producto_id: ProductoId, cantidad: i64) -> Self {
        Self {
            producto_id,
            cantidad,
        }
    }
}

/// Outcome of a stock check. Shortfalls are data here, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidacionStockResult {
    pub valido: bool,
    pub productos_faltantes: Vec<ProductoFaltante>,
}

impl ValidacionStockResult {
    /// Escalates shortfalls into `DomainError::InsufficientStock`.
    pub fn exigir(self) -> DomainResult<()> {
        if self.valido {
            Ok(())
        } else {
            Err(DomainError::insufficient_stock(self.productos_faltantes))
        }
    }
}

/// Sums quantities per product, ordered by product id.
pub fn consolidar(
    requerimientos: impl IntoIterator<Item = Requerimiento>,
) -> DomainResult<Vec<Requerimiento>> {
    let mut totales: BTreeMap<ProductoId, i64> = BTreeMap::new();
    for r in requerimientos {
        let total = totales.entry(r.producto_id).or_insert(0);
        *total = total.checked_add(r.cantidad).ok_or_else(|| {
            DomainError::validation(format!("cantidad for producto {} overflows", r.producto_id))
        })?;
    }
    Ok(totales
        .into_iter()
        .map(|(producto_id, cantidad)| Requerimiento::new(producto_id, cantidad))
        .collect())
}

/// Compares each (consolidated) requirement against `disponible`.
///
/// `disponible` fails only for unknown products; it must not mutate anything.
pub fn validar<F>(requerimientos: &[Requerimiento], mut disponible: F) -> DomainResult<ValidacionStockResult>
where
    F: FnMut(ProductoId) -> DomainResult<i64>,
{
    if let Some(r) = requerimientos.iter().find(|r| r.cantidad <= 0) {
        return Err(DomainError::validation(format!(
            "cantidad for producto {} must be positive",
            r.producto_id
        )));
    }

    let mut productos_faltantes = Vec::new();
    for r in consolidar(requerimientos.iter().copied())? {
        let stock = disponible(r.producto_id)?;
        if r.cantidad > stock {
            productos_faltantes.push(ProductoFaltante::new(r.producto_id, r.cantidad, stock));
        }
    }

    Ok(ValidacionStockResult {
        valido: productos_faltantes.is_empty(),
        productos_faltantes,
    })
}
