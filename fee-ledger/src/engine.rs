//! Engine facade: wires the store and collaborators into the individual
//! services and exposes them as one handle.

use crate::collaborators::{Directory, Notifier};
use crate::config::EngineConfig;
use crate::services::{
    AssignmentService, AuditLogger, LedgerProjector, PaymentProcessor, ReconciliationSweep,
    RecordFactory, ReminderService, StructureService,
};
use crate::store::LedgerStore;
use std::sync::Arc;
use tracing::info;

/// One engine instance per process. All services share the same store
/// handle, audit logger and sweep gate, so debounce windows and
/// per-record locks are process-wide.
#[derive(Clone)]
pub struct FeeLedger {
    pub structures: StructureService,
    pub assignments: AssignmentService,
    pub payments: PaymentProcessor,
    pub sweep: ReconciliationSweep,
    pub ledger: LedgerProjector,
    pub reminders: ReminderService,
}

impl FeeLedger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        directory: Arc<dyn Directory>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        crate::services::metrics::init_metrics();

        let audit = AuditLogger::new(Arc::clone(&store));
        let records = RecordFactory::new(Arc::clone(&store));
        let sweep = ReconciliationSweep::new(Arc::clone(&store), audit.clone(), config);

        let engine = Self {
            structures: StructureService::new(Arc::clone(&store), audit.clone()),
            assignments: AssignmentService::new(
                Arc::clone(&store),
                Arc::clone(&directory),
                records.clone(),
                audit.clone(),
            ),
            payments: PaymentProcessor::new(Arc::clone(&store), records, audit),
            ledger: LedgerProjector::new(Arc::clone(&store), sweep.clone()),
            reminders: ReminderService::new(store, directory, notifier),
            sweep,
        };
        info!("Fee ledger engine initialized");
        engine
    }
}
