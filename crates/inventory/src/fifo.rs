//! FIFO-by-expiry lot selection.
//!
//! Planning is a pure function over a snapshot of lots; the `Kardex` applies
//! the resulting plan under the product lock.

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use almacen_core::LoteId;

use crate::lote::Lote;

/// Quantity to take from one lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asignacion {
    pub lote_id: LoteId,
    pub cantidad: i64,
}

/// Plan could not be met; carries what the eligible lots hold in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockInsuficiente {
    pub solicitado: i64,
    pub disponible: i64,
}

/// Expiry ascending (lots without expiry last), then elaboration, then id.
pub fn orden_fifo(a: &Lote, b: &Lote) -> Ordering {
    let vencimiento = match (a.fecha_vencimiento(), b.fecha_vencimiento()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    vencimiento
        .then_with(|| a.fecha_elaboracion().cmp(&b.fecha_elaboracion()))
        .then_with(|| a.id().cmp(&b.id()))
}

/// Eligible lots in consumption order.
pub fn lotes_elegibles<'a>(lotes: &'a [Lote], hoy: NaiveDate) -> Vec<&'a Lote> {
    let mut elegibles: Vec<&Lote> = lotes.iter().filter(|l| l.seleccionable(hoy)).collect();
    elegibles.sort_by(|a, b| orden_fifo(a, b));
    elegibles
}

/// Total quantity FIFO could draw today.
pub fn disponible(lotes: &[Lote], hoy: NaiveDate) -> i64 {
    lotes
        .iter()
        .filter(|l| l.seleccionable(hoy))
        .map(Lote::cantidad_actual)
        .fold(0, i64::saturating_add)
}

/// Plan a depletion of `cantidad` units, draining each lot before the next.
///
/// Either the full quantity is planned or nothing is.
pub fn planificar(
    lotes: &[Lote],
    cantidad: i64,
    hoy: NaiveDate,
) -> Result<Vec<Asignacion>, StockInsuficiente> {
    let total = disponible(lotes, hoy);
    if cantidad > total {
        return Err(StockInsuficiente {
            solicitado: cantidad,
            disponible: total,
        });
    }

    let mut restante = cantidad;
    let mut plan = Vec::new();
    for lote in lotes_elegibles(lotes, hoy) {
        if restante == 0 {
            break;
        }
        let tomar = restante.min(lote.cantidad_actual());
        plan.push(Asignacion {
            lote_id: lote.id(),
            cantidad: tomar,
        });
        restante -= tomar;
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lote::LoteSpec;
    use almacen_core::ProductoId;
    use proptest::prelude::*;

    fn fecha(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn hoy() -> NaiveDate {
        fecha(2024, 12, 1)
    }

    fn lote(codigo: &str, cantidad: i64, elaboracion: NaiveDate, vence: Option<NaiveDate>) -> Lote {
        let spec = LoteSpec::new(codigo, elaboracion, vence);
        Lote::crear(ProductoId::new(), &spec, cantidad, hoy()).unwrap()
    }

    #[test]
    fn earliest_expiry_is_drained_first() {
        let l1 = lote("L1", 5, fecha(2024, 10, 1), Some(fecha(2025, 1, 1)));
        let l2 = lote("L2", 10, fecha(2024, 9, 1), Some(fecha(2025, 2, 1)));
        let lotes = vec![l2.clone(), l1.clone()];

        let plan = planificar(&lotes, 8, hoy()).unwrap();
        assert_eq!(
            plan,
            vec![
                Asignacion { lote_id: l1.id(), cantidad: 5 },
                Asignacion { lote_id: l2.id(), cantidad: 3 },
            ]
        );
    }

    #[test]
    fn sufficient_first_lot_leaves_second_untouched() {
        let l1 = lote("L1", 20, fecha(2024, 10, 1), Some(fecha(2025, 1, 1)));
        let l2 = lote("L2", 10, fecha(2024, 10, 1), Some(fecha(2025, 2, 1)));
        let plan = planificar(&[l2, l1.clone()], 7, hoy()).unwrap();
        assert_eq!(plan, vec![Asignacion { lote_id: l1.id(), cantidad: 7 }]);
    }

    #[test]
    fn lots_without_expiry_go_last() {
        let sin = lote("SIN", 5, fecha(2024, 1, 1), None);
        let con = lote("CON", 5, fecha(2024, 11, 1), Some(fecha(2026, 1, 1)));
        let orden = lotes_elegibles(&[sin.clone(), con.clone()], hoy())
            .into_iter()
            .map(Lote::id)
            .collect::<Vec<_>>();
        assert_eq!(orden, vec![con.id(), sin.id()]);
    }

    #[test]
    fn ties_break_on_elaboration_date() {
        let vence = Some(fecha(2025, 3, 1));
        let nuevo = lote("NUEVO", 5, fecha(2024, 11, 1), vence);
        let viejo = lote("VIEJO", 5, fecha(2024, 10, 1), vence);
        let plan = planificar(&[nuevo, viejo.clone()], 2, hoy()).unwrap();
        assert_eq!(plan[0].lote_id, viejo.id());
    }

    #[test]
    fn expired_and_empty_lots_are_skipped() {
        let vencido = lote("V", 50, fecha(2024, 1, 1), Some(fecha(2024, 11, 30)));
        let vigente = lote("OK", 4, fecha(2024, 11, 1), Some(fecha(2025, 1, 1)));
        let lotes = vec![vencido, vigente.clone()];

        assert_eq!(disponible(&lotes, hoy()), 4);
        let err = planificar(&lotes, 5, hoy()).unwrap_err();
        assert_eq!(err, StockInsuficiente { solicitado: 5, disponible: 4 });
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: a successful plan covers exactly the requested quantity,
        /// never overdraws a lot, and follows FIFO order.
        #[test]
        fn plan_is_exact_and_ordered(
            cantidades in prop::collection::vec(1i64..50, 1..8),
            offsets in prop::collection::vec(0i64..60, 8),
            solicitado in 1i64..300,
        ) {
            let lotes: Vec<Lote> = cantidades
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    let vence = hoy() + chrono::Duration::days(offsets[i]);
                    lote(&format!("L{i}"), *c, fecha(2024, 11, 1), Some(vence))
                })
                .collect();
            let total: i64 = cantidades.iter().sum();

            match planificar(&lotes, solicitado, hoy()) {
                Ok(plan) => {
                    prop_assert!(solicitado <= total);
                    prop_assert_eq!(plan.iter().map(|a| a.cantidad).sum::<i64>(), solicitado);

                    let orden: Vec<LoteId> = lotes_elegibles(&lotes, hoy()).iter().map(|l| l.id()).collect();
                    for (i, asignacion) in plan.iter().enumerate() {
                        prop_assert_eq!(asignacion.lote_id, orden[i]);
                        let lote = lotes.iter().find(|l| l.id() == asignacion.lote_id).unwrap();
                        prop_assert!(asignacion.cantidad > 0);
                        prop_assert!(asignacion.cantidad <= lote.cantidad_actual());
                        // every lot before the last one is fully drained
                        if i + 1 < plan.len() {
                            prop_assert_eq!(asignacion.cantidad, lote.cantidad_actual());
                        }
                    }
                }
                Err(e) => {
                    prop_assert!(solicitado > total);
                    prop_assert_eq!(e.disponible, total);
                }
            }
        }
    }
}
