//! `stocktake-audit`: the audit campaign aggregate.
//!
//! An audit is a stock-verification campaign with an explicit lifecycle
//! (planned, in progress, completed, cancelled), a sampled set of items to
//! count, and reconciliation totals derived from those items. Everything in
//! this crate is pure: commands are decided against in-memory state and the
//! outcome is a list of events or a rejection.

pub mod audit;
pub mod item;
pub mod reconcile;
pub mod sampling;
pub mod status;

pub use audit::{
    Audit, AuditCommand, AuditEvent, AuditId, CancelAudit, CompleteAudit, DeleteAudit, PlanAudit,
    ReactivateAudit, RecordCount, RunAudit, UpdateDetails, VerifyItem,
};
pub use item::{AuditItem, AuditItemId, AuditItemStatus, InventoryItemId, ProductId, VariantId};
pub use reconcile::{ReconciliationTotals, reconcile};
pub use sampling::{FULL_INVENTORY_SAMPLE_CAP, StockRow, WAREHOUSE_SAMPLE_CAP, sample_cap, sample_items};
pub use status::{AuditStatus, AuditType, WarehouseId, WarehouseScope, ensure_transition};
