use serde::{Deserialize, Serialize};

use almacen_core::{DomainError, DomainResult, ProductoId};

/// Product as seen by the inventory ledger.
///
/// The catalog itself (names, prices, categories) is owned by an external
/// module; the ledger only keeps what stock bookkeeping needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Producto {
    id: ProductoId,
    codigo: String,
    nombre: String,
    requiere_lote: bool,
    stock_actual: i64,
    stock_minimo: i64,
    stock_maximo: Option<i64>,
    dias_vida_util: u32,
}

/// Registration data for a product entering the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NuevoProducto {
    pub id: ProductoId,
    pub codigo: String,
    pub nombre: String,
    pub requiere_lote: bool,
    pub stock_minimo: i64,
    pub stock_maximo: Option<i64>,
    pub dias_vida_util: u32,
}

impl Producto {
    /// Build a product with zero stock. Stock only ever changes through ledger movements.
    pub fn registrar(nuevo: NuevoProducto) -> DomainResult<Self> {
        if nuevo.codigo.trim().is_empty() {
            return Err(DomainError::validation("codigo cannot be empty"));
        }
        if nuevo.nombre.trim().is_empty() {
            return Err(DomainError::validation("nombre cannot be empty"));
        }
        if nuevo.stock_minimo < 0 {
            return Err(DomainError::validation("stock_minimo cannot be negative"));
        }
        if let Some(max) = nuevo.stock_maximo {
            if max < nuevo.stock_minimo {
                return Err(DomainError::validation(
                    "stock_maximo cannot be lower than stock_minimo",
                ));
            }
        }

        Ok(Self {
            id: nuevo.id,
            codigo: nuevo.codigo.trim().to_string(),
            nombre: nuevo.nombre.trim().to_string(),
            requiere_lote: nuevo.requiere_lote,
            stock_actual: 0,
            stock_minimo: nuevo.stock_minimo,
            stock_maximo: nuevo.stock_maximo,
            dias_vida_util: nuevo.dias_vida_util,
        })
    }

    pub fn id(&self) -> ProductoId {
        self.id
    }

    pub fn codigo(&self) -> &str {
        &self.codigo
    }

    pub fn nombre(&self) -> &str {
        &self.nombre
    }

    pub fn requiere_lote(&self) -> bool {
        self.requiere_lote
    }

    pub fn stock_actual(&self) -> i64 {
        self.stock_actual
    }

    pub fn stock_minimo(&self) -> i64 {
        self.stock_minimo
    }

    pub fn stock_maximo(&self) -> Option<i64> {
        self.stock_maximo
    }

    pub fn dias_vida_util(&self) -> u32 {
        self.dias_vida_util
    }

    pub fn bajo_minimo(&self) -> bool {
        self.stock_actual < self.stock_minimo
    }

    pub fn sobre_maximo(&self) -> bool {
        self.stock_maximo.is_some_and(|max| self.stock_actual > max)
    }

    /// Only the owning `Kardex` writes stock.
    pub(crate) fn fijar_stock(&mut self, stock: i64) {
        self.stock_actual = stock;
    }
}
