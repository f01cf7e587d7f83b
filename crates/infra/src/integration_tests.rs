//! End-to-end tests across the engines sharing one ledger.
//!
//! Verifies:
//! - reception confirmation feeds FIFO dispatch
//! - dispatch is all-or-nothing across products
//! - order claims and document transitions hold up under concurrent callers
//! - closings agree with the ledger

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use chrono::{Duration, NaiveDate};
    use proptest::prelude::*;

    use almacen_core::{
        AggregateRoot, ConductorId, DomainError, EmpleadoId, ExpectedVersion, OrdenId, ProductoId, RelojFijo, RutaId,
    };
    use almacen_dispatch::{EstadoOrden, EstadoSalida, LineaOrden, NuevaOrden};
    use almacen_inventory::{EstadoLote, LoteSpec, NuevoProducto, Origen, TipoMovimiento};
    use almacen_reception::{DetalleRecepcion, EstadoRecepcion};

    use crate::almacen::Almacen;
    use crate::config::AlmacenConfig;
    use crate::ledger::StockLedger;
    use crate::recepcion::NuevaRecepcion;
    use crate::salida::NuevaSalida;

    fn fecha(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup() -> (Arc<RelojFijo>, Almacen) {
        let reloj = Arc::new(RelojFijo::en_fecha(fecha(2024, 12, 1)));
        let almacen = Almacen::new(AlmacenConfig::default(), reloj.clone());
        (reloj, almacen)
    }

    fn producto(almacen: &Almacen, codigo: &str, requiere_lote: bool) -> ProductoId {
        almacen
            .ledger()
            .registrar_producto(NuevoProducto {
                id: ProductoId::new(),
                codigo: codigo.to_string(),
                nombre: codigo.to_string(),
                requiere_lote,
                stock_minimo: 0,
                stock_maximo: None,
                dias_vida_util: 0,
            })
            .unwrap()
            .id()
    }

    fn orden(almacen: &Almacen, lineas: &[(ProductoId, i64)]) -> OrdenId {
        almacen
            .salidas()
            .registrar_orden(NuevaOrden {
                id: OrdenId::new(),
                numero: "ORD".to_string(),
                estado: EstadoOrden::Confirmada,
                lineas: lineas
                    .iter()
                    .map(|(p, c)| LineaOrden {
                        producto_id: *p,
                        cantidad: *c,
                        precio_unitario: 100,
                    })
                    .collect(),
            })
            .unwrap()
            .id()
    }

    fn salida(ids: Vec<OrdenId>) -> NuevaSalida {
        NuevaSalida {
            id_ruta: RutaId::new(),
            id_conductor: ConductorId::new(),
            ids_ordenes: ids,
            fecha_salida: fecha(2024, 12, 2),
        }
    }

    fn lista_para_despacho(almacen: &Almacen, ids: Vec<OrdenId>) -> almacen_core::SalidaId {
        let mut doc = almacen
            .salidas()
            .crear(salida(ids), EmpleadoId::new())
            .unwrap();
        for estado in [EstadoSalida::EnPreparacion, EstadoSalida::Listo] {
            doc = almacen
                .salidas()
                .cambiar_estado(doc.id_typed(), estado, EmpleadoId::new(), doc.version())
                .unwrap();
        }
        doc.id_typed()
    }

    #[test]
    fn reception_to_fifo_dispatch() {
        let (_, almacen) = setup();
        let leche = producto(&almacen, "LECHE", true);

        let doc = almacen
            .recepciones()
            .crear(
                NuevaRecepcion {
                    fecha_elaboracion: fecha(2024, 11, 30),
                    motivo: "compra".to_string(),
                    detalles: vec![
                        DetalleRecepcion::new(leche, 10)
                            .con_lote("L2")
                            .con_vencimiento(fecha(2025, 2, 1)),
                        DetalleRecepcion::new(leche, 5)
                            .con_lote("L1")
                            .con_vencimiento(fecha(2025, 1, 1)),
                    ],
                },
                EmpleadoId::new(),
            )
            .unwrap();
        almacen
            .recepciones()
            .confirmar(doc.id_typed(), EmpleadoId::new(), ExpectedVersion::Exact(1))
            .unwrap();

        let id = lista_para_despacho(&almacen, vec![orden(&almacen, &[(leche, 8)])]);
        almacen
            .salidas()
            .despachar(id, EmpleadoId::new(), ExpectedVersion::Any)
            .unwrap();

        let lotes = almacen.ledger().lotes_por_producto(leche).unwrap();
        let l1 = lotes.iter().find(|l| l.codigo_lote() == "L1").unwrap();
        let l2 = lotes.iter().find(|l| l.codigo_lote() == "L2").unwrap();
        assert_eq!((l1.cantidad_actual(), l1.estado()), (0, EstadoLote::Agotado));
        assert_eq!(l2.cantidad_actual(), 7);

        let kardex = almacen.ledger().kardex(leche).unwrap();
        let salidas: Vec<_> = kardex
            .movimientos()
            .iter()
            .filter(|m| m.tipo == TipoMovimiento::Salida)
            .map(|m| (m.lote_id, m.cantidad))
            .collect();
        assert_eq!(salidas, vec![(Some(l1.id()), 5), (Some(l2.id()), 3)]);
        assert_eq!(kardex.producto().stock_actual(), 7);
        kardex.verificar_invariantes().unwrap();
    }

    #[test]
    fn concurrent_confirmations_post_entries_once() {
        let (_, almacen) = setup();
        let almacen = Arc::new(almacen);
        let arroz = producto(&almacen, "ARROZ", false);
        let id = almacen
            .recepciones()
            .crear(
                NuevaRecepcion {
                    fecha_elaboracion: fecha(2024, 12, 1),
                    motivo: "compra".to_string(),
                    detalles: vec![DetalleRecepcion::new(arroz, 25)],
                },
                EmpleadoId::new(),
            )
            .unwrap()
            .id_typed();

        let barrera = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let almacen = Arc::clone(&almacen);
                let barrera = Arc::clone(&barrera);
                thread::spawn(move || {
                    barrera.wait();
                    almacen
                        .recepciones()
                        .confirmar(id, EmpleadoId::new(), ExpectedVersion::Any)
                })
            })
            .collect();
        let resultados: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(resultados.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(resultados
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, DomainError::Conflict(_))));
        assert_eq!(almacen.ledger().producto(arroz).unwrap().stock_actual(), 25);
        assert_eq!(almacen.ledger().kardex(arroz).unwrap().movimientos().len(), 1);
        assert_eq!(
            almacen.recepciones().obtener(id).unwrap().estado(),
            EstadoRecepcion::Confirmado
        );
    }

    #[test]
    fn dispatch_is_atomic_across_products() {
        let (_, almacen) = setup();
        let a = producto(&almacen, "A", false);
        let b = producto(&almacen, "B", false);
        let origen = Origen::new("inventario inicial");
        almacen.ledger().registrar_entrada(a, 50, None, &origen).unwrap();
        almacen.ledger().registrar_entrada(b, 3, None, &origen).unwrap();

        let id = lista_para_despacho(&almacen, vec![orden(&almacen, &[(a, 10), (b, 4)])]);
        let err = almacen
            .salidas()
            .despachar(id, EmpleadoId::new(), ExpectedVersion::Any)
            .unwrap_err();
        assert_eq!(err.faltantes().map(|f| f.len()), Some(1));

        for (p, stock) in [(a, 50), (b, 3)] {
            let kardex = almacen.ledger().kardex(p).unwrap();
            assert_eq!(kardex.producto().stock_actual(), stock);
            assert_eq!(kardex.movimientos().len(), 1);
        }
        assert_eq!(almacen.salidas().obtener(id).unwrap().estado(), EstadoSalida::Listo);
    }

    #[test]
    fn racing_documents_claim_each_order_once() {
        let (_, almacen) = setup();
        let almacen = Arc::new(almacen);
        let p = producto(&almacen, "P", false);
        let compartida = orden(&almacen, &[(p, 1)]);

        let barrera = Arc::new(Barrier::new(6));
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let almacen = Arc::clone(&almacen);
                let barrera = Arc::clone(&barrera);
                let propia = orden(&almacen, &[(p, 2)]);
                thread::spawn(move || {
                    barrera.wait();
                    let resultado = almacen
                        .salidas()
                        .crear(salida(vec![propia, compartida]), EmpleadoId::new());
                    (propia, resultado)
                })
            })
            .collect();

        let mut ganadores = 0;
        for handle in handles {
            let (propia, resultado) = handle.join().unwrap();
            match resultado {
                Ok(doc) => {
                    ganadores += 1;
                    assert_eq!(
                        almacen.salidas().orden(compartida).unwrap().documento_salida(),
                        Some(doc.id_typed())
                    );
                }
                Err(DomainError::Conflict(_)) => {
                    assert_eq!(almacen.salidas().orden(propia).unwrap().documento_salida(), None);
                }
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(ganadores, 1);
        assert_eq!(
            almacen
                .salidas()
                .listar(&Default::default())
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn concurrent_dispatches_never_oversell() {
        let (_, almacen) = setup();
        let almacen = Arc::new(almacen);
        let agua = producto(&almacen, "AGUA", true);
        almacen
            .ledger()
            .registrar_entrada(
                agua,
                20,
                Some(&LoteSpec::new("A1", fecha(2024, 11, 1), Some(fecha(2025, 6, 1)))),
                &Origen::new("compra"),
            )
            .unwrap();

        let ids: Vec<_> = (0..5)
            .map(|_| lista_para_despacho(&almacen, vec![orden(&almacen, &[(agua, 6)])]))
            .collect();
        let handles: Vec<_> = ids
            .into_iter()
            .map(|id| {
                let almacen = Arc::clone(&almacen);
                thread::spawn(move || {
                    almacen
                        .salidas()
                        .despachar(id, EmpleadoId::new(), ExpectedVersion::Any)
                })
            })
            .collect();
        let resultados: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let despachadas = resultados.iter().filter(|r| r.is_ok()).count();
        assert_eq!(despachadas, 3);
        assert!(resultados
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, DomainError::InsufficientStock(_))));
        let kardex = almacen.ledger().kardex(agua).unwrap();
        assert_eq!(kardex.producto().stock_actual(), 2);
        kardex.verificar_invariantes().unwrap();
    }

    #[test]
    fn closing_agrees_with_ledger() {
        let (reloj, almacen) = setup();
        let p = producto(&almacen, "HARINA", false);
        let origen = Origen::new("prueba");
        almacen.ledger().registrar_entrada(p, 30, None, &origen).unwrap();
        almacen.ledger().registrar_salida(p, 12, None, &origen).unwrap();
        almacen.ledger().registrar_ajuste(p, 2, None, &origen).unwrap();
        reloj.avanzar(Duration::days(35));
        almacen.ledger().registrar_salida(p, 5, None, &origen).unwrap();

        let cierres = almacen
            .cierres()
            .ejecutar_cierre_mensual("2024-12", EmpleadoId::new())
            .unwrap();
        let c = &cierres[0];
        assert!(c.cumple_ley_de_cierre());
        assert_eq!((c.stock_inicial(), c.total_entradas(), c.total_salidas()), (0, 32, 12));
        assert_eq!(c.stock_final(), 20);
        assert_eq!(almacen.ledger().producto(p).unwrap().stock_actual(), 15);

        let enero = almacen
            .cierres()
            .ejecutar_cierre_mensual("2025-01", EmpleadoId::new())
            .unwrap();
        assert_eq!(enero[0].stock_inicial(), 20);
        assert_eq!(enero[0].stock_final(), 15);
    }

    #[test]
    fn expiring_lots_use_configured_horizon() {
        let (_, almacen) = setup();
        let yogur = producto(&almacen, "YOGUR", true);
        let origen = Origen::new("compra");
        for (codigo, vence) in [("PRONTO", fecha(2024, 12, 20)), ("LEJOS", fecha(2025, 3, 1))] {
            almacen
                .ledger()
                .registrar_entrada(
                    yogur,
                    4,
                    Some(&LoteSpec::new(codigo, fecha(2024, 11, 1), Some(vence))),
                    &origen,
                )
                .unwrap();
        }
        assert_eq!(almacen.config().dias_alerta_vencimiento, 30);
        assert_eq!(almacen.lotes_por_vencer(None).unwrap().len(), 1);
        assert_eq!(almacen.lotes_por_vencer(Some(120)).unwrap().len(), 2);
    }

    #[test]
    fn states_serialize_for_reports() {
        let (_, almacen) = setup();
        let p = producto(&almacen, "P", false);
        let id = lista_para_despacho(&almacen, vec![orden(&almacen, &[(p, 1)])]);
        let doc = almacen.salidas().obtener(id).unwrap();
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["estado"], "LISTO");
        assert_eq!(
            serde_json::to_value(EstadoRecepcion::ConAjustes).unwrap(),
            "CON_AJUSTES"
        );
        assert_eq!(
            serde_json::to_value(EstadoSalida::EnPreparacion).unwrap(),
            "EN_PREPARACION"
        );
    }

    #[derive(Debug, Clone)]
    enum Operacion {
        Entrada(usize, i64),
        Salida(i64),
        Ajuste(usize, i64),
        Archivar(usize),
    }

    fn operacion() -> impl Strategy<Value = Operacion> {
        prop_oneof![
            (0usize..3, 1i64..20).prop_map(|(l, c)| Operacion::Entrada(l, c)),
            (1i64..25).prop_map(Operacion::Salida),
            (0usize..3, -10i64..10).prop_map(|(l, d)| Operacion::Ajuste(l, d)),
            (0usize..3).prop_map(Operacion::Archivar),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: whatever sequence of ledger calls succeeds or fails, the
        /// product's stock equals the sum of its live lots and every lot stays
        /// within 0..=cantidad_inicial.
        #[test]
        fn ledger_invariants_hold(ops in prop::collection::vec(operacion(), 1..40)) {
            let ledger = StockLedger::new(Arc::new(RelojFijo::en_fecha(fecha(2024, 12, 1))));
            let p = ledger
                .registrar_producto(NuevoProducto {
                    id: ProductoId::new(),
                    codigo: "PROP".to_string(),
                    nombre: "Prop".to_string(),
                    requiere_lote: true,
                    stock_minimo: 0,
                    stock_maximo: None,
                    dias_vida_util: 0,
                })
                .unwrap()
                .id();
            let origen = Origen::new("prop");
            let codigos = ["L0", "L1", "L2"];

            for op in ops {
                let lote_id = |i: usize| {
                    ledger
                        .lotes_por_producto(p)
                        .unwrap()
                        .into_iter()
                        .find(|l| l.codigo_lote() == codigos[i])
                        .map(|l| l.id())
                };
                let _ = match op {
                    Operacion::Entrada(i, c) => {
                        let spec = LoteSpec::new(
                            codigos[i],
                            fecha(2024, 11, 1),
                            Some(fecha(2025, 1, 1) + Duration::days(i as i64 * 30)),
                        );
                        ledger.registrar_entrada(p, c, Some(&spec), &origen).map(|_| ())
                    }
                    Operacion::Salida(c) => ledger.registrar_salida(p, c, None, &origen).map(|_| ()),
                    Operacion::Ajuste(i, d) => match lote_id(i) {
                        Some(id) => ledger.registrar_ajuste(p, d, Some(id), &origen).map(|_| ()),
                        None => Ok(()),
                    },
                    Operacion::Archivar(i) => match lote_id(i) {
                        Some(id) => ledger.archivar_lote(id, &origen).map(|_| ()),
                        None => Ok(()),
                    },
                };

                let kardex = ledger.kardex(p).unwrap();
                prop_assert!(kardex.verificar_invariantes().is_ok());
                let vivos: i64 = kardex
                    .lotes()
                    .iter()
                    .filter(|l| !l.archivado())
                    .map(|l| l.cantidad_actual())
                    .sum();
                prop_assert_eq!(kardex.producto().stock_actual(), vivos);
                for lote in kardex.lotes() {
                    prop_assert!(lote.cantidad_actual() >= 0);
                    prop_assert!(lote.cantidad_actual() <= lote.cantidad_inicial());
                }
            }
        }
    }
}
