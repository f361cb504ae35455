use comisiones_core::{
    error::SettlementError,
    parameter_store::CommissionParameter,
    store::SettlementStore,
    types::{Periodo, Tier, Zona},
};

fn store() -> SettlementStore {
    let store = SettlementStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store
}

fn param(ruc: &str, meta: u32) -> CommissionParameter {
    CommissionParameter {
        ruc: ruc.into(),
        periodo: Periodo::new(2025, 4).expect("valid period"),
        zona: Zona::Provincia,
        meta,
        tier: Tier::Regular,
        marcha_blanca: false,
    }
}

#[test]
fn duplicate_key_fails_whole_upload() {
    let store = store();
    let err = store
        .insert_parameters(&[
            param("20100066603", 5),
            param("20512345678", 3),
            param("20100066603", 9),
        ])
        .expect_err("duplicate must be rejected");
    assert!(matches!(
        err,
        SettlementError::DuplicateParameter { ref ruc, periodo: 202504 } if ruc == "20100066603"
    ));

    let periodo = Periodo::new(2025, 4).expect("valid period");
    assert!(store.parameters_for(periodo, Zona::Provincia).expect("read").is_empty());
}

#[test]
fn upload_conflicting_with_existing_row_is_rejected() {
    let store = store();
    store.insert_parameters(&[param("20100066603", 5)]).expect("first upload");
    assert!(store.insert_parameters(&[param("20100066603", 6)]).is_err());

    let periodo = Periodo::new(2025, 4).expect("valid period");
    let rows = store.parameters_for(periodo, Zona::Provincia).expect("read");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].meta, 5);
}

#[test]
fn manual_edit_is_last_write_wins() {
    let store = store();
    store.insert_parameters(&[param("20100066603", 5)]).expect("upload");
    let mut edited = param("20100066603", 8);
    edited.tier = Tier::Gold;
    edited.marcha_blanca = true;
    store.upsert_parameter(&edited).expect("edit");

    let periodo = Periodo::new(2025, 4).expect("valid period");
    let rows = store.parameters_for(periodo, Zona::Provincia).expect("read");
    assert_eq!(rows, vec![edited]);
}
