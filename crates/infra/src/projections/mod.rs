//! Projection implementations (read model builders).
//!
//! Projections consume published envelopes and maintain query-optimized
//! read models. All of them are rebuildable from the event stream,
//! tenant-isolated, and idempotent under at-least-once delivery.

pub mod audits;

pub use audits::{AuditReadModel, AuditsProjection, AuditsProjectionError};
