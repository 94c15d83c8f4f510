//! Persistence seam for all engine entities.
//!
//! The engine assumes a store capable of serializable (or equivalently
//! optimistic-conflict-detecting) commits and upsert-with-increment for
//! the receipt sequence. Versioned writes take the version the caller
//! read; the store rejects the write with [`AppError::Conflict`] when the
//! stored version has moved, and the caller retries the whole operation
//! once.

mod memory;

pub use memory::MemoryStore;

use crate::error::AppError;
use crate::models::{
    AuditLog, FeeAssignment, FeePayment, FeeRecord, FeeRefund, FeeStructure, NewPayment, NewRefund,
    RecordFilter,
};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    // -------------------------------------------------------------------------
    // Structure operations
    // -------------------------------------------------------------------------

    async fn insert_structure(&self, structure: &FeeStructure) -> Result<(), AppError>;

    async fn get_structure(
        &self,
        coaching_id: Uuid,
        structure_id: Uuid,
    ) -> Result<Option<FeeStructure>, AppError>;

    async fn update_structure(&self, structure: &FeeStructure) -> Result<(), AppError>;

    /// Hard delete. Returns false when the structure does not exist.
    async fn delete_structure(&self, coaching_id: Uuid, structure_id: Uuid)
        -> Result<bool, AppError>;

    async fn list_structures(
        &self,
        coaching_id: Uuid,
        include_inactive: bool,
    ) -> Result<Vec<FeeStructure>, AppError>;

    /// Whether any record was ever billed from the structure.
    async fn structure_has_records(
        &self,
        coaching_id: Uuid,
        structure_id: Uuid,
    ) -> Result<bool, AppError>;

    // -------------------------------------------------------------------------
    // Assignment operations
    // -------------------------------------------------------------------------

    async fn insert_assignment(&self, assignment: &FeeAssignment) -> Result<(), AppError>;

    async fn update_assignment(&self, assignment: &FeeAssignment) -> Result<(), AppError>;

    async fn get_assignment(
        &self,
        coaching_id: Uuid,
        assignment_id: Uuid,
    ) -> Result<Option<FeeAssignment>, AppError>;

    async fn find_active_assignment(
        &self,
        coaching_id: Uuid,
        member_id: Uuid,
    ) -> Result<Option<FeeAssignment>, AppError>;

    // -------------------------------------------------------------------------
    // Record operations
    // -------------------------------------------------------------------------

    /// Insert deduplicated on (assignment_id, due_date). Returns the stored
    /// record and whether this call created it.
    async fn insert_record_if_absent(
        &self,
        record: FeeRecord,
    ) -> Result<(FeeRecord, bool), AppError>;

    async fn get_record(
        &self,
        coaching_id: Uuid,
        record_id: Uuid,
    ) -> Result<Option<FeeRecord>, AppError>;

    /// Versioned write: fails with Conflict unless the stored version equals
    /// `expected_version`; on success the stored version is bumped.
    async fn update_record(
        &self,
        record: &FeeRecord,
        expected_version: i64,
    ) -> Result<(), AppError>;

    async fn delete_record(&self, coaching_id: Uuid, record_id: Uuid) -> Result<bool, AppError>;

    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<FeeRecord>, AppError>;

    // -------------------------------------------------------------------------
    // Payment and refund operations
    // -------------------------------------------------------------------------

    /// Atomic money commit: version-check and write the record, increment the
    /// (coaching, financial-year) receipt sequence, and append the payment
    /// row carrying the allocated receipt number. All or nothing.
    async fn commit_payment(
        &self,
        record: &FeeRecord,
        expected_version: i64,
        payment: NewPayment,
    ) -> Result<FeePayment, AppError>;

    /// Atomic refund commit: version-check and write the record, append the
    /// refund row. All or nothing.
    async fn commit_refund(
        &self,
        record: &FeeRecord,
        expected_version: i64,
        refund: NewRefund,
    ) -> Result<FeeRefund, AppError>;

    async fn list_payments(
        &self,
        coaching_id: Uuid,
        record_id: Option<Uuid>,
        member_id: Option<Uuid>,
    ) -> Result<Vec<FeePayment>, AppError>;

    async fn list_refunds(
        &self,
        coaching_id: Uuid,
        record_id: Option<Uuid>,
        member_id: Option<Uuid>,
    ) -> Result<Vec<FeeRefund>, AppError>;

    // -------------------------------------------------------------------------
    // Audit operations
    // -------------------------------------------------------------------------

    async fn append_audit(&self, entry: &AuditLog) -> Result<(), AppError>;

    async fn list_audit(
        &self,
        coaching_id: Uuid,
        entity_id: Option<Uuid>,
    ) -> Result<Vec<AuditLog>, AppError>;
}
