//! The status-transition coordinator.
//!
//! Reclassifying a message touches the message itself, its alerts, the
//! dashboard counters, the owner's location statistics and both copies of
//! the owner's security score. None of that is transactional, so a
//! transition runs as an ordered list of steps: the lookup gates everything,
//! the primary write decides success, and the aggregate adjustments are
//! best-effort. Every attempt that gets past the lookup is audited.
//!
//! Generic over any backend implementing
//! [`verdict_core::store::AuditLog`].

pub mod bulk;
pub mod coordinator;
pub mod error;
pub mod reader;

pub use bulk::{BulkFailure, BulkItem, BulkReport, BulkSuccess, BulkSummary, FailureKind};
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use error::{Error, Result};

#[cfg(test)]
mod tests;
