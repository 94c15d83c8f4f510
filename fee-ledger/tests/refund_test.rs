//! Refund integration tests: status recomputation and accounting.

mod common;

use common::{actor, days_ago, days_ahead, dec, no_tax, TestEngine};
use fee_ledger::models::{BillingCycle, FeeStatus, PaymentMode};
use fee_ledger::services::{RecordPayment, RecordRefund};
use fee_ledger::AppError;
use uuid::Uuid;

async fn paid_record(app: &TestEngine, start_offset_days: i64, amount: i64) -> Uuid {
    let structure = app
        .create_structure("Tuition", amount, BillingCycle::Once, 0, no_tax())
        .await;
    let start = if start_offset_days >= 0 {
        days_ahead(start_offset_days)
    } else {
        days_ago(-start_offset_days)
    };
    let outcome = app.assign(app.member_id, structure.structure_id, start).await;
    let record_id = outcome.seeded[0].record_id;
    app.engine
        .payments
        .record_payment(RecordPayment {
            coaching_id: app.coaching_id,
            record_id,
            amount: dec(amount),
            mode: PaymentMode::Card,
            transaction_ref: None,
            note: None,
            actor: actor(),
        })
        .await
        .expect("Failed to record payment");
    record_id
}

fn refund(app: &TestEngine, record_id: Uuid, amount: i64) -> RecordRefund {
    RecordRefund {
        coaching_id: app.coaching_id,
        record_id,
        amount: dec(amount),
        reason: Some("Duplicate payment".to_string()),
        mode: PaymentMode::BankTransfer,
        actor: actor(),
    }
}

#[tokio::test]
async fn partial_refund_reopens_record() {
    let app = TestEngine::spawn();
    let record_id = paid_record(&app, 10, 1000).await;

    let outcome = app
        .engine
        .payments
        .record_refund(refund(&app, record_id, 400))
        .await
        .expect("Failed to record refund");

    assert_eq!(outcome.record.status, FeeStatus::PartiallyPaid);
    assert_eq!(outcome.record.paid_amount, dec(600));
    assert_eq!(outcome.record.balance(), dec(400));
    // Final amount untouched: refunds only move paid.
    assert_eq!(outcome.record.final_amount, dec(1000));
}

#[tokio::test]
async fn full_refund_before_due_date_returns_to_pending() {
    let app = TestEngine::spawn();
    let record_id = paid_record(&app, 10, 1000).await;

    let outcome = app
        .engine
        .payments
        .record_refund(refund(&app, record_id, 1000))
        .await
        .unwrap();

    assert_eq!(outcome.record.status, FeeStatus::Pending);
    assert_eq!(outcome.record.paid_amount, dec(0));
}

#[tokio::test]
async fn full_refund_past_due_date_goes_overdue() {
    let app = TestEngine::spawn();
    let record_id = paid_record(&app, -10, 1000).await;

    let outcome = app
        .engine
        .payments
        .record_refund(refund(&app, record_id, 1000))
        .await
        .unwrap();

    assert_eq!(outcome.record.status, FeeStatus::Overdue);
}

#[tokio::test]
async fn refund_exceeding_paid_is_rejected() {
    let app = TestEngine::spawn();
    let record_id = paid_record(&app, 10, 1000).await;

    let result = app
        .engine
        .payments
        .record_refund(refund(&app, record_id, 1001))
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn refund_against_waived_record_is_rejected() {
    let app = TestEngine::spawn();
    let structure = app
        .create_structure("Tuition", 1000, BillingCycle::Once, 0, no_tax())
        .await;
    let outcome = app
        .assign(app.member_id, structure.structure_id, days_ahead(10))
        .await;
    let record_id = outcome.seeded[0].record_id;
    app.engine
        .payments
        .record_payment(RecordPayment {
            coaching_id: app.coaching_id,
            record_id,
            amount: dec(300),
            mode: PaymentMode::Cash,
            transaction_ref: None,
            note: None,
            actor: actor(),
        })
        .await
        .unwrap();
    app.engine
        .payments
        .waive_fee(app.coaching_id, record_id, actor())
        .await
        .unwrap();

    let result = app
        .engine
        .payments
        .record_refund(refund(&app, record_id, 300))
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn repeated_refunds_drain_paid_amount() {
    let app = TestEngine::spawn();
    let record_id = paid_record(&app, 10, 1000).await;

    app.engine
        .payments
        .record_refund(refund(&app, record_id, 600))
        .await
        .unwrap();
    let second = app
        .engine
        .payments
        .record_refund(refund(&app, record_id, 400))
        .await
        .unwrap();

    assert_eq!(second.record.paid_amount, dec(0));
    assert_eq!(second.record.status, FeeStatus::Pending);

    let third = app
        .engine
        .payments
        .record_refund(refund(&app, record_id, 1))
        .await;
    assert!(matches!(third, Err(AppError::Validation(_))));
}
