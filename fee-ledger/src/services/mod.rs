pub mod assignments;
pub mod audit;
pub mod cycle;
pub mod ledger;
pub mod metrics;
pub mod payments;
pub mod reconcile;
pub mod records;
pub mod remind;
pub mod structures;
pub mod tax;

pub use assignments::{AssignOutcome, AssignmentService};
pub use audit::AuditLogger;
pub use ledger::{
    CalendarDay, CoachingSummary, LedgerEvent, LedgerEventKind, LedgerProjector, LedgerSummary,
    MemberLedger, OverdueEntry, StudentLedger,
};
pub use payments::{
    PaymentOutcome, PaymentProcessor, RecordPayment, RecordRefund, RefundOutcome,
};
pub use reconcile::{ReconciliationSweep, SweepReport};
pub use records::RecordFactory;
pub use remind::{BulkRemindSummary, ReminderService};
pub use structures::StructureService;
