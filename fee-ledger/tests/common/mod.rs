//! Test helper module for fee-ledger integration tests.
//!
//! Wires the engine against the in-memory store, a static member
//! directory and a recording notifier.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use fee_ledger::collaborators::{Notifier, StaticDirectory};
use fee_ledger::config::EngineConfig;
use fee_ledger::error::AppError;
use fee_ledger::models::{
    Actor, AssignFee, BillingCycle, CreateStructure, FeeStructure, InstallmentEntry, SupplyType,
    TaxConfig, TaxType,
};
use fee_ledger::services::AssignOutcome;
use fee_ledger::store::MemoryStore;
use fee_ledger::FeeLedger;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Notifier that records every dispatch for later assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Uuid, String, String)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(Uuid, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        user_id: Uuid,
        title: &str,
        message: &str,
        _payload: serde_json::Value,
    ) -> Result<(), AppError> {
        self.sent
            .lock()
            .unwrap()
            .push((user_id, title.to_string(), message.to_string()));
        Ok(())
    }
}

/// Engine wired against in-memory collaborators, with one registered
/// member.
pub struct TestEngine {
    pub engine: FeeLedger,
    pub store: Arc<MemoryStore>,
    pub directory: Arc<StaticDirectory>,
    pub notifier: Arc<RecordingNotifier>,
    pub coaching_id: Uuid,
    pub member_id: Uuid,
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

impl TestEngine {
    pub fn spawn() -> Self {
        Self::spawn_with_config(EngineConfig::default())
    }

    pub fn spawn_with_config(config: EngineConfig) -> Self {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(StaticDirectory::new());
        let notifier = Arc::new(RecordingNotifier::default());

        let coaching_id = Uuid::new_v4();
        let member_id = Uuid::new_v4();
        directory.add_member(coaching_id, member_id);

        let engine = FeeLedger::new(store.clone(), directory.clone(), notifier.clone(), config);

        TestEngine {
            engine,
            store,
            directory,
            notifier,
            coaching_id,
            member_id,
        }
    }

    /// Register another member under the test coaching tenant.
    pub fn add_member(&self) -> Uuid {
        let member_id = Uuid::new_v4();
        self.directory.add_member(self.coaching_id, member_id);
        member_id
    }

    pub async fn create_structure(
        &self,
        name: &str,
        amount: i64,
        cycle: BillingCycle,
        fine_per_day: i64,
        tax: TaxConfig,
    ) -> FeeStructure {
        self.engine
            .structures
            .create_structure(
                CreateStructure {
                    coaching_id: self.coaching_id,
                    name: name.to_string(),
                    amount: dec(amount),
                    cycle,
                    late_fine_per_day: dec(fine_per_day),
                    tax,
                    installment_plan: None,
                    line_items: vec![],
                },
                actor(),
            )
            .await
            .expect("Failed to create structure")
    }

    pub async fn installment_structure(
        &self,
        name: &str,
        plan: Vec<InstallmentEntry>,
    ) -> FeeStructure {
        let total: Decimal = plan.iter().map(|e| e.amount).sum();
        self.engine
            .structures
            .create_structure(
                CreateStructure {
                    coaching_id: self.coaching_id,
                    name: name.to_string(),
                    amount: total,
                    cycle: BillingCycle::Installment,
                    late_fine_per_day: Decimal::ZERO,
                    tax: no_tax(),
                    installment_plan: Some(plan),
                    line_items: vec![],
                },
                actor(),
            )
            .await
            .expect("Failed to create installment structure")
    }

    pub async fn assign(
        &self,
        member_id: Uuid,
        structure_id: Uuid,
        start_date: NaiveDate,
    ) -> AssignOutcome {
        self.engine
            .assignments
            .assign_fee(
                AssignFee {
                    coaching_id: self.coaching_id,
                    member_id,
                    structure_id,
                    custom_amount: None,
                    discount_amount: Decimal::ZERO,
                    scholarship_amount: None,
                    start_date,
                    end_date: None,
                },
                actor(),
            )
            .await
            .expect("Failed to assign fee")
    }
}

pub fn actor() -> Actor {
    Actor::User(Uuid::new_v4())
}

pub fn dec(n: i64) -> Decimal {
    Decimal::from(n)
}

pub fn no_tax() -> TaxConfig {
    TaxConfig {
        tax_type: TaxType::None,
        rate: Decimal::ZERO,
        supply_type: SupplyType::IntraState,
        cess_rate: Decimal::ZERO,
    }
}

pub fn gst_exclusive(rate: i64) -> TaxConfig {
    TaxConfig {
        tax_type: TaxType::GstExclusive,
        rate: dec(rate),
        supply_type: SupplyType::IntraState,
        cess_rate: Decimal::ZERO,
    }
}

pub fn gst_inclusive(rate: i64) -> TaxConfig {
    TaxConfig {
        tax_type: TaxType::GstInclusive,
        rate: dec(rate),
        supply_type: SupplyType::IntraState,
        cess_rate: Decimal::ZERO,
    }
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn days_ago(n: i64) -> NaiveDate {
    today() - Duration::days(n)
}

pub fn days_ahead(n: i64) -> NaiveDate {
    today() + Duration::days(n)
}

/// Let spawned fire-and-forget tasks (audit appends, notifications)
/// settle.
pub async fn drain_tasks() {
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
}
