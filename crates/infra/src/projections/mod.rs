//! Projection implementations (read model builders).
//!
//! Projections consume committed envelopes and are rebuildable from the event
//! store at any time.

pub mod audit_trail;

pub use audit_trail::{AuditEntry, AuditTrail};
