//! Assignment lifecycle integration tests.

mod common;

use common::{actor, days_ahead, dec, no_tax, TestEngine};
use fee_ledger::models::{AssignFee, BillingCycle, FeeStatus, InstallmentEntry, PaymentMode};
use fee_ledger::services::RecordPayment;
use fee_ledger::store::LedgerStore;
use fee_ledger::AppError;
use rust_decimal::Decimal;
use uuid::Uuid;

#[tokio::test]
async fn assign_fee_rejects_unknown_member() {
    let app = TestEngine::spawn();
    let structure = app
        .create_structure("Tuition", 1000, BillingCycle::Monthly, 0, no_tax())
        .await;

    let result = app
        .engine
        .assignments
        .assign_fee(
            AssignFee {
                coaching_id: app.coaching_id,
                member_id: Uuid::new_v4(),
                structure_id: structure.structure_id,
                custom_amount: None,
                discount_amount: Decimal::ZERO,
                scholarship_amount: None,
                start_date: days_ahead(10),
                end_date: None,
            },
            actor(),
        )
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn assign_fee_seeds_one_record() {
    let app = TestEngine::spawn();
    let structure = app
        .create_structure("Tuition", 1000, BillingCycle::Monthly, 0, no_tax())
        .await;

    let outcome = app
        .assign(app.member_id, structure.structure_id, days_ahead(10))
        .await;

    assert_eq!(outcome.seeded.len(), 1);
    let record = &outcome.seeded[0];
    assert_eq!(record.due_date, days_ahead(10));
    assert_eq!(record.status, FeeStatus::Pending);
    assert_eq!(record.final_amount, dec(1000));
    assert!(outcome.assignment.is_active);
}

#[tokio::test]
async fn installment_plan_seeds_one_record_per_entry() {
    let app = TestEngine::spawn();
    let structure = app
        .installment_structure(
            "Annual Program",
            vec![
                InstallmentEntry {
                    label: "Term 1".to_string(),
                    amount: dec(4000),
                    due_date: days_ahead(10),
                },
                InstallmentEntry {
                    label: "Term 2".to_string(),
                    amount: dec(4000),
                    due_date: days_ahead(100),
                },
                InstallmentEntry {
                    label: "Term 3".to_string(),
                    amount: dec(4000),
                    due_date: days_ahead(190),
                },
            ],
        )
        .await;

    let outcome = app
        .assign(app.member_id, structure.structure_id, days_ahead(10))
        .await;

    assert_eq!(outcome.seeded.len(), 3);
    assert_eq!(outcome.seeded[0].title, "Annual Program - Term 1");
    assert_eq!(outcome.seeded[0].final_amount, dec(4000));
    assert_eq!(outcome.seeded[2].due_date, days_ahead(190));
}

#[tokio::test]
async fn custom_amount_and_discount_flow_into_record() {
    let app = TestEngine::spawn();
    let structure = app
        .create_structure("Tuition", 1000, BillingCycle::Monthly, 0, no_tax())
        .await;

    let outcome = app
        .engine
        .assignments
        .assign_fee(
            AssignFee {
                coaching_id: app.coaching_id,
                member_id: app.member_id,
                structure_id: structure.structure_id,
                custom_amount: Some(dec(800)),
                discount_amount: dec(100),
                scholarship_amount: Some(dec(50)),
                start_date: days_ahead(10),
                end_date: None,
            },
            actor(),
        )
        .await
        .unwrap();

    let record = &outcome.seeded[0];
    assert_eq!(record.base_amount, dec(800));
    assert_eq!(record.discount_amount, dec(150));
    assert_eq!(record.final_amount, dec(650));
}

#[tokio::test]
async fn discount_exceeding_amount_is_rejected() {
    let app = TestEngine::spawn();
    let structure = app
        .create_structure("Tuition", 1000, BillingCycle::Monthly, 0, no_tax())
        .await;

    let result = app
        .engine
        .assignments
        .assign_fee(
            AssignFee {
                coaching_id: app.coaching_id,
                member_id: app.member_id,
                structure_id: structure.structure_id,
                custom_amount: None,
                discount_amount: dec(900),
                scholarship_amount: Some(dec(200)),
                start_date: days_ahead(10),
                end_date: None,
            },
            actor(),
        )
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn reassign_same_structure_dedups_records() {
    let app = TestEngine::spawn();
    let structure = app
        .create_structure("Tuition", 1000, BillingCycle::Monthly, 0, no_tax())
        .await;

    let first = app
        .assign(app.member_id, structure.structure_id, days_ahead(10))
        .await;
    let second = app
        .assign(app.member_id, structure.structure_id, days_ahead(10))
        .await;

    // Same binding, same record: dedup on (assignment, due date).
    assert_eq!(
        first.assignment.assignment_id,
        second.assignment.assignment_id
    );
    assert_eq!(first.seeded[0].record_id, second.seeded[0].record_id);
}

#[tokio::test]
async fn reassign_same_structure_applies_new_start_date() {
    let app = TestEngine::spawn();
    let structure = app
        .create_structure("Tuition", 1000, BillingCycle::Monthly, 0, no_tax())
        .await;

    let first = app
        .assign(app.member_id, structure.structure_id, days_ahead(10))
        .await;
    let second = app
        .assign(app.member_id, structure.structure_id, days_ahead(20))
        .await;

    // Same binding, but the refreshed start date seeds the new due date.
    assert_eq!(
        first.assignment.assignment_id,
        second.assignment.assignment_id
    );
    assert_eq!(second.assignment.start_date, days_ahead(20));
    assert_eq!(second.seeded[0].due_date, days_ahead(20));
    assert_ne!(first.seeded[0].record_id, second.seeded[0].record_id);
}

#[tokio::test]
async fn reassign_different_structure_deletes_unpaid_records() {
    let app = TestEngine::spawn();
    let old = app
        .create_structure("Old Plan", 1000, BillingCycle::Monthly, 0, no_tax())
        .await;
    let new = app
        .create_structure("New Plan", 1500, BillingCycle::Monthly, 0, no_tax())
        .await;

    let first = app
        .assign(app.member_id, old.structure_id, days_ahead(10))
        .await;
    let old_record_id = first.seeded[0].record_id;

    let second = app
        .assign(app.member_id, new.structure_id, days_ahead(10))
        .await;

    assert_ne!(
        first.assignment.assignment_id,
        second.assignment.assignment_id
    );
    // Unpaid record from the old binding is gone.
    let gone = app
        .store
        .get_record(app.coaching_id, old_record_id)
        .await
        .unwrap();
    assert!(gone.is_none());
    // Old binding deactivated, new one active.
    let old_assignment = app
        .store
        .get_assignment(app.coaching_id, first.assignment.assignment_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!old_assignment.is_active);
    assert_eq!(second.seeded[0].final_amount, dec(1500));
}

#[tokio::test]
async fn reassign_waives_partially_paid_record_keeping_money() {
    let app = TestEngine::spawn();
    let old = app
        .create_structure("Old Plan", 1000, BillingCycle::Monthly, 0, no_tax())
        .await;
    let new = app
        .create_structure("New Plan", 1500, BillingCycle::Monthly, 0, no_tax())
        .await;

    let first = app
        .assign(app.member_id, old.structure_id, days_ahead(10))
        .await;
    let record_id = first.seeded[0].record_id;

    app.engine
        .payments
        .record_payment(RecordPayment {
            coaching_id: app.coaching_id,
            record_id,
            amount: dec(400),
            mode: PaymentMode::Cash,
            transaction_ref: None,
            note: None,
            actor: actor(),
        })
        .await
        .expect("Failed to record payment");

    app.assign(app.member_id, new.structure_id, days_ahead(10))
        .await;

    let waived = app
        .store
        .get_record(app.coaching_id, record_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(waived.status, FeeStatus::Waived);
    assert_eq!(waived.final_amount, dec(400));
    assert_eq!(waived.paid_amount, dec(400));
    assert_eq!(waived.balance(), Decimal::ZERO);
}

#[tokio::test]
async fn remove_assignment_deactivates_binding() {
    let app = TestEngine::spawn();
    let structure = app
        .create_structure("Tuition", 1000, BillingCycle::Monthly, 0, no_tax())
        .await;
    let outcome = app
        .assign(app.member_id, structure.structure_id, days_ahead(10))
        .await;

    app.engine
        .assignments
        .remove_assignment(app.coaching_id, outcome.assignment.assignment_id, actor())
        .await
        .expect("Failed to remove assignment");

    let assignment = app
        .store
        .get_assignment(app.coaching_id, outcome.assignment.assignment_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!assignment.is_active);
    let record = app
        .store
        .get_record(app.coaching_id, outcome.seeded[0].record_id)
        .await
        .unwrap();
    assert!(record.is_none());
}

#[tokio::test]
async fn toggle_pause_flips_state() {
    let app = TestEngine::spawn();
    let structure = app
        .create_structure("Tuition", 1000, BillingCycle::Monthly, 0, no_tax())
        .await;
    let outcome = app
        .assign(app.member_id, structure.structure_id, days_ahead(10))
        .await;

    let paused = app
        .engine
        .assignments
        .toggle_pause(app.coaching_id, outcome.assignment.assignment_id, actor())
        .await
        .unwrap();
    assert!(paused.is_paused);

    let resumed = app
        .engine
        .assignments
        .toggle_pause(app.coaching_id, outcome.assignment.assignment_id, actor())
        .await
        .unwrap();
    assert!(!resumed.is_paused);
}
