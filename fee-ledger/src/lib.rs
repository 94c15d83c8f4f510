//! fee-ledger: Fee ledger and billing engine for multi-tenant coaching
//! operations.
//!
//! Turns reusable fee structures into running, auditable timelines of
//! obligations, payments, refunds, tax breakdowns and late fines per
//! enrolled member. Persistence, member directory lookup and notification
//! delivery are collaborator seams supplied by the embedder.

pub mod collaborators;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod services;
pub mod store;

pub use engine::FeeLedger;
pub use error::AppError;
