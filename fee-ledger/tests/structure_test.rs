//! Fee structure lifecycle integration tests.

mod common;

use chrono::Utc;
use common::{actor, days_ahead, dec, gst_exclusive, no_tax, TestEngine};
use fee_ledger::models::{BillingCycle, CreateStructure, InstallmentEntry, UpdateStructure};
use fee_ledger::store::LedgerStore;
use fee_ledger::AppError;
use rust_decimal::Decimal;

#[tokio::test]
async fn create_structure_rejects_negative_amount() {
    let app = TestEngine::spawn();

    let result = app
        .engine
        .structures
        .create_structure(
            CreateStructure {
                coaching_id: app.coaching_id,
                name: "Broken".to_string(),
                amount: dec(-100),
                cycle: BillingCycle::Monthly,
                late_fine_per_day: Decimal::ZERO,
                tax: no_tax(),
                installment_plan: None,
                line_items: vec![],
            },
            actor(),
        )
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn installment_cycle_requires_plan() {
    let app = TestEngine::spawn();

    let result = app
        .engine
        .structures
        .create_structure(
            CreateStructure {
                coaching_id: app.coaching_id,
                name: "Annual".to_string(),
                amount: dec(12000),
                cycle: BillingCycle::Installment,
                late_fine_per_day: Decimal::ZERO,
                tax: no_tax(),
                installment_plan: None,
                line_items: vec![],
            },
            actor(),
        )
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn plan_is_rejected_on_recurring_cycle() {
    let app = TestEngine::spawn();

    let result = app
        .engine
        .structures
        .create_structure(
            CreateStructure {
                coaching_id: app.coaching_id,
                name: "Tuition".to_string(),
                amount: dec(1000),
                cycle: BillingCycle::Monthly,
                late_fine_per_day: Decimal::ZERO,
                tax: no_tax(),
                installment_plan: Some(vec![InstallmentEntry {
                    label: "Term 1".to_string(),
                    amount: dec(500),
                    due_date: days_ahead(30),
                }]),
                line_items: vec![],
            },
            actor(),
        )
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn update_cascades_onto_unpaid_records() {
    let app = TestEngine::spawn();
    let structure = app
        .create_structure("Tuition", 1000, BillingCycle::Monthly, 0, no_tax())
        .await;
    let outcome = app
        .assign(app.member_id, structure.structure_id, days_ahead(10))
        .await;
    let record_id = outcome.seeded[0].record_id;
    assert_eq!(outcome.seeded[0].final_amount, dec(1000));

    app.engine
        .structures
        .update_structure(
            app.coaching_id,
            structure.structure_id,
            UpdateStructure {
                amount: Some(dec(1200)),
                ..Default::default()
            },
            actor(),
        )
        .await
        .expect("Failed to update structure");

    let record = app
        .store
        .get_record(app.coaching_id, record_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.base_amount, dec(1200));
    assert_eq!(record.final_amount, dec(1200));
}

#[tokio::test]
async fn update_cascade_recomputes_tax() {
    let app = TestEngine::spawn();
    let structure = app
        .create_structure("Tuition", 1000, BillingCycle::Monthly, 0, no_tax())
        .await;
    let outcome = app
        .assign(app.member_id, structure.structure_id, days_ahead(10))
        .await;
    let record_id = outcome.seeded[0].record_id;

    app.engine
        .structures
        .update_structure(
            app.coaching_id,
            structure.structure_id,
            UpdateStructure {
                tax: Some(gst_exclusive(18)),
                ..Default::default()
            },
            actor(),
        )
        .await
        .expect("Failed to update structure");

    let record = app
        .store
        .get_record(app.coaching_id, record_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.tax_amount, dec(180));
    assert_eq!(record.cgst_amount, dec(90));
    assert_eq!(record.sgst_amount, dec(90));
    assert_eq!(record.final_amount, dec(1180));
}

#[tokio::test]
async fn delete_is_soft_once_records_exist() {
    let app = TestEngine::spawn();
    let structure = app
        .create_structure("Tuition", 1000, BillingCycle::Monthly, 0, no_tax())
        .await;
    app.assign(app.member_id, structure.structure_id, days_ahead(10))
        .await;

    app.engine
        .structures
        .delete_structure(app.coaching_id, structure.structure_id, actor())
        .await
        .expect("Failed to delete structure");

    // Still present, just deactivated.
    let stored = app
        .engine
        .structures
        .get_structure(app.coaching_id, structure.structure_id)
        .await
        .expect("Structure should survive as inactive");
    assert!(!stored.is_active);
}

#[tokio::test]
async fn delete_is_hard_when_never_billed() {
    let app = TestEngine::spawn();
    let structure = app
        .create_structure("Unused", 500, BillingCycle::Once, 0, no_tax())
        .await;

    app.engine
        .structures
        .delete_structure(app.coaching_id, structure.structure_id, actor())
        .await
        .expect("Failed to delete structure");

    let result = app
        .engine
        .structures
        .get_structure(app.coaching_id, structure.structure_id)
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn list_structures_filters_inactive() {
    let app = TestEngine::spawn();
    let active = app
        .create_structure("Active", 1000, BillingCycle::Monthly, 0, no_tax())
        .await;
    let retired = app
        .create_structure("Retired", 800, BillingCycle::Monthly, 0, no_tax())
        .await;
    app.engine
        .structures
        .update_structure(
            app.coaching_id,
            retired.structure_id,
            UpdateStructure {
                is_active: Some(false),
                ..Default::default()
            },
            actor(),
        )
        .await
        .unwrap();

    let visible = app
        .engine
        .structures
        .list_structures(app.coaching_id, false)
        .await
        .unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].structure_id, active.structure_id);

    let all = app
        .engine
        .structures
        .list_structures(app.coaching_id, true)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn create_structure_writes_audit_trail() {
    let app = TestEngine::spawn();
    let structure = app
        .create_structure("Tuition", 1000, BillingCycle::Monthly, 0, no_tax())
        .await;
    common::drain_tasks().await;

    let audits = app
        .store
        .list_audit(app.coaching_id, Some(structure.structure_id))
        .await
        .unwrap();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].event, "structure.created");
    assert!(audits[0].before.is_none());
    assert!(audits[0].after.is_some());
    assert!(audits[0].created_utc <= Utc::now());
}
