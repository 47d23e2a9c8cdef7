use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocktake_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, UserId};
use stocktake_events::Event;

use crate::item::{AuditItem, AuditItemId, AuditItemStatus, ProductId};
use crate::reconcile::{ReconciliationTotals, reconcile};
use crate::status::{AuditStatus, AuditType, WarehouseScope, ensure_transition};

/// Audit identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditId(pub AggregateId);

impl AuditId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for AuditId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Audit.
///
/// Item counts and reconciliation totals live inside the aggregate so a
/// status flip and its side effects always ride the same event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Audit {
    id: AuditId,
    tenant_id: Option<TenantId>,
    audit_number: u64,
    audit_type: AuditType,
    scope: WarehouseScope,
    status: AuditStatus,
    planned_date: DateTime<Utc>,
    started_date: Option<DateTime<Utc>>,
    completed_date: Option<DateTime<Utc>>,
    items_planned: u32,
    items_counted: u32,
    discrepancies: u32,
    adjustment_value_cents: i64,
    notes: Option<String>,
    supervised_by: Option<UserId>,
    items: Vec<AuditItem>,
    version: u64,
    created: bool,
    deleted: bool,
}

impl Audit {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: AuditId) -> Self {
        Self {
            id,
            tenant_id: None,
            audit_number: 0,
            audit_type: AuditType::CycleCount,
            scope: WarehouseScope::AllWarehouses,
            status: AuditStatus::Planned,
            planned_date: DateTime::<Utc>::UNIX_EPOCH,
            started_date: None,
            completed_date: None,
            items_planned: 0,
            items_counted: 0,
            discrepancies: 0,
            adjustment_value_cents: 0,
            notes: None,
            supervised_by: None,
            items: Vec::new(),
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> AuditId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn audit_number(&self) -> u64 {
        self.audit_number
    }

    pub fn audit_type(&self) -> AuditType {
        self.audit_type
    }

    pub fn scope(&self) -> &WarehouseScope {
        &self.scope
    }

    pub fn status(&self) -> AuditStatus {
        self.status
    }

    pub fn planned_date(&self) -> DateTime<Utc> {
        self.planned_date
    }

    pub fn started_date(&self) -> Option<DateTime<Utc>> {
        self.started_date
    }

    pub fn completed_date(&self) -> Option<DateTime<Utc>> {
        self.completed_date
    }

    pub fn items_planned(&self) -> u32 {
        self.items_planned
    }

    pub fn items_counted(&self) -> u32 {
        self.items_counted
    }

    pub fn discrepancies(&self) -> u32 {
        self.discrepancies
    }

    pub fn adjustment_value_cents(&self) -> i64 {
        self.adjustment_value_cents
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn supervised_by(&self) -> Option<UserId> {
        self.supervised_by
    }

    pub fn items(&self) -> &[AuditItem] {
        &self.items
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl AggregateRoot for Audit {
    type Id = AuditId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlanAudit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanAudit {
    pub tenant_id: TenantId,
    pub audit_id: AuditId,
    pub audit_number: u64,
    pub audit_type: AuditType,
    pub scope: WarehouseScope,
    pub planned_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub supervised_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateDetails. Fields left as `None` are untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDetails {
    pub tenant_id: TenantId,
    pub audit_id: AuditId,
    pub planned_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub supervised_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RunAudit. `items` is the frozen sample selected by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunAudit {
    pub tenant_id: TenantId,
    pub audit_id: AuditId,
    pub items: Vec<AuditItem>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordCount. Submitting a second count for the same item
/// replaces the first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCount {
    pub tenant_id: TenantId,
    pub audit_id: AuditId,
    pub item_id: AuditItemId,
    pub counted_quantity: i64,
    pub counted_by: UserId,
    pub discrepancy_reason: Option<String>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VerifyItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyItem {
    pub tenant_id: TenantId,
    pub audit_id: AuditId,
    pub item_id: AuditItemId,
    pub verified_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteAudit. Unit costs are looked up by the caller and
/// passed in so the decision stays pure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteAudit {
    pub tenant_id: TenantId,
    pub audit_id: AuditId,
    pub unit_costs_cents: BTreeMap<ProductId, i64>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelAudit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAudit {
    pub tenant_id: TenantId,
    pub audit_id: AuditId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReactivateAudit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactivateAudit {
    pub tenant_id: TenantId,
    pub audit_id: AuditId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteAudit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAudit {
    pub tenant_id: TenantId,
    pub audit_id: AuditId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCommand {
    PlanAudit(PlanAudit),
    UpdateDetails(UpdateDetails),
    RunAudit(RunAudit),
    RecordCount(RecordCount),
    VerifyItem(VerifyItem),
    CompleteAudit(CompleteAudit),
    CancelAudit(CancelAudit),
    ReactivateAudit(ReactivateAudit),
    DeleteAudit(DeleteAudit),
}

/// Event: AuditPlanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditPlanned {
    pub tenant_id: TenantId,
    pub audit_id: AuditId,
    pub audit_number: u64,
    pub audit_type: AuditType,
    pub scope: WarehouseScope,
    pub planned_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub supervised_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AuditDetailsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditDetailsUpdated {
    pub tenant_id: TenantId,
    pub audit_id: AuditId,
    pub planned_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub supervised_by: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AuditStarted. Carries the full sampled item set so the status
/// flip and the sample are committed together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStarted {
    pub tenant_id: TenantId,
    pub audit_id: AuditId,
    pub started_date: DateTime<Utc>,
    pub items: Vec<AuditItem>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemCounted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCounted {
    pub tenant_id: TenantId,
    pub audit_id: AuditId,
    pub item_id: AuditItemId,
    pub counted_quantity: i64,
    pub counted_by: UserId,
    pub discrepancy_reason: Option<String>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemVerified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemVerified {
    pub tenant_id: TenantId,
    pub audit_id: AuditId,
    pub item_id: AuditItemId,
    pub verified_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AuditCompleted. Totals are frozen here; later cost changes do
/// not rewrite a completed audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditCompleted {
    pub tenant_id: TenantId,
    pub audit_id: AuditId,
    pub completed_date: DateTime<Utc>,
    pub totals: ReconciliationTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AuditCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditCancelled {
    pub tenant_id: TenantId,
    pub audit_id: AuditId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AuditReactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReactivated {
    pub tenant_id: TenantId,
    pub audit_id: AuditId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AuditDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditDeleted {
    pub tenant_id: TenantId,
    pub audit_id: AuditId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEvent {
    AuditPlanned(AuditPlanned),
    AuditDetailsUpdated(AuditDetailsUpdated),
    AuditStarted(AuditStarted),
    ItemCounted(ItemCounted),
    ItemVerified(ItemVerified),
    AuditCompleted(AuditCompleted),
    AuditCancelled(AuditCancelled),
    AuditReactivated(AuditReactivated),
    AuditDeleted(AuditDeleted),
}

impl Event for AuditEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AuditEvent::AuditPlanned(_) => "audit.planned",
            AuditEvent::AuditDetailsUpdated(_) => "audit.details_updated",
            AuditEvent::AuditStarted(_) => "audit.started",
            AuditEvent::ItemCounted(_) => "audit.item_counted",
            AuditEvent::ItemVerified(_) => "audit.item_verified",
            AuditEvent::AuditCompleted(_) => "audit.completed",
            AuditEvent::AuditCancelled(_) => "audit.cancelled",
            AuditEvent::AuditReactivated(_) => "audit.reactivated",
            AuditEvent::AuditDeleted(_) => "audit.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AuditEvent::AuditPlanned(e) => e.occurred_at,
            AuditEvent::AuditDetailsUpdated(e) => e.occurred_at,
            AuditEvent::AuditStarted(e) => e.occurred_at,
            AuditEvent::ItemCounted(e) => e.occurred_at,
            AuditEvent::ItemVerified(e) => e.occurred_at,
            AuditEvent::AuditCompleted(e) => e.occurred_at,
            AuditEvent::AuditCancelled(e) => e.occurred_at,
            AuditEvent::AuditReactivated(e) => e.occurred_at,
            AuditEvent::AuditDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Audit {
    type Command = AuditCommand;
    type Event = AuditEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AuditEvent::AuditPlanned(e) => {
                self.id = e.audit_id;
                self.tenant_id = Some(e.tenant_id);
                self.audit_number = e.audit_number;
                self.audit_type = e.audit_type;
                self.scope = e.scope.clone();
                self.status = AuditStatus::Planned;
                self.planned_date = e.planned_date;
                self.notes = e.notes.clone();
                self.supervised_by = e.supervised_by;
                self.created = true;
            }
            AuditEvent::AuditDetailsUpdated(e) => {
                if let Some(planned_date) = e.planned_date {
                    self.planned_date = planned_date;
                }
                if let Some(notes) = &e.notes {
                    self.notes = Some(notes.clone());
                }
                if let Some(supervised_by) = e.supervised_by {
                    self.supervised_by = Some(supervised_by);
                }
            }
            AuditEvent::AuditStarted(e) => {
                self.status = AuditStatus::InProgress;
                self.started_date = Some(e.started_date);
                self.items = e.items.clone();
                self.items_planned = e.items.len() as u32;
            }
            AuditEvent::ItemCounted(e) => {
                if let Some(item) = self.items.iter_mut().find(|i| i.id == e.item_id) {
                    item.counted_quantity = Some(e.counted_quantity);
                    item.counted_by = Some(e.counted_by);
                    item.counted_at = Some(e.occurred_at);
                    item.discrepancy_reason = e.discrepancy_reason.clone();
                    if let Some(notes) = &e.notes {
                        item.notes = Some(notes.clone());
                    }
                    item.status = if e.counted_quantity == item.expected_quantity {
                        AuditItemStatus::Counted
                    } else {
                        AuditItemStatus::Discrepancy
                    };
                }
            }
            AuditEvent::ItemVerified(e) => {
                if let Some(item) = self.items.iter_mut().find(|i| i.id == e.item_id) {
                    item.verified_by = Some(e.verified_by);
                    item.verified_at = Some(e.occurred_at);
                    if item.status == AuditItemStatus::Counted {
                        item.status = AuditItemStatus::Verified;
                    }
                }
            }
            AuditEvent::AuditCompleted(e) => {
                self.status = AuditStatus::Completed;
                self.completed_date = Some(e.completed_date);
                self.items_counted = e.totals.items_counted;
                self.discrepancies = e.totals.discrepancies;
                self.adjustment_value_cents = e.totals.adjustment_value_cents;
            }
            AuditEvent::AuditCancelled(_) => {
                self.status = AuditStatus::Cancelled;
            }
            AuditEvent::AuditReactivated(_) => {
                // Back to the drawing board: the old sample is stale by
                // definition, so it is purged along with its counts.
                self.status = AuditStatus::Planned;
                self.started_date = None;
                self.completed_date = None;
                self.items.clear();
                self.items_planned = 0;
                self.items_counted = 0;
                self.discrepancies = 0;
                self.adjustment_value_cents = 0;
            }
            AuditEvent::AuditDeleted(_) => {
                self.deleted = true;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AuditCommand::PlanAudit(cmd) => self.handle_plan(cmd),
            AuditCommand::UpdateDetails(cmd) => self.handle_update_details(cmd),
            AuditCommand::RunAudit(cmd) => self.handle_run(cmd),
            AuditCommand::RecordCount(cmd) => self.handle_record_count(cmd),
            AuditCommand::VerifyItem(cmd) => self.handle_verify_item(cmd),
            AuditCommand::CompleteAudit(cmd) => self.handle_complete(cmd),
            AuditCommand::CancelAudit(cmd) => self.handle_cancel(cmd),
            AuditCommand::ReactivateAudit(cmd) => self.handle_reactivate(cmd),
            AuditCommand::DeleteAudit(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Audit {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn ensure_audit_id(&self, audit_id: AuditId) -> Result<(), DomainError> {
        if self.id != audit_id {
            return Err(DomainError::conflict("audit_id mismatch"));
        }
        Ok(())
    }

    fn ensure_live(&self, tenant_id: TenantId, audit_id: AuditId) -> Result<(), DomainError> {
        if !self.created || self.deleted {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(tenant_id)?;
        self.ensure_audit_id(audit_id)
    }

    fn item(&self, item_id: AuditItemId) -> Result<&AuditItem, DomainError> {
        self.items
            .iter()
            .find(|i| i.id == item_id)
            .ok_or_else(DomainError::not_found)
    }

    fn handle_plan(&self, cmd: &PlanAudit) -> Result<Vec<AuditEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("audit already exists"));
        }
        if cmd.audit_number == 0 {
            return Err(DomainError::validation("audit_number must be positive"));
        }

        Ok(vec![AuditEvent::AuditPlanned(AuditPlanned {
            tenant_id: cmd.tenant_id,
            audit_id: cmd.audit_id,
            audit_number: cmd.audit_number,
            audit_type: cmd.audit_type,
            scope: cmd.scope.clone(),
            planned_date: cmd.planned_date,
            notes: cmd.notes.clone(),
            supervised_by: cmd.supervised_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_details(&self, cmd: &UpdateDetails) -> Result<Vec<AuditEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.audit_id)?;

        // Detail fields are orthogonal to the lifecycle: a patch may land in
        // any status, only a status change goes through the transition table.
        if cmd.planned_date.is_none() && cmd.notes.is_none() && cmd.supervised_by.is_none() {
            return Ok(Vec::new());
        }

        Ok(vec![AuditEvent::AuditDetailsUpdated(AuditDetailsUpdated {
            tenant_id: cmd.tenant_id,
            audit_id: cmd.audit_id,
            planned_date: cmd.planned_date,
            notes: cmd.notes.clone(),
            supervised_by: cmd.supervised_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_run(&self, cmd: &RunAudit) -> Result<Vec<AuditEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.audit_id)?;
        ensure_transition(self.status, AuditStatus::InProgress)?;

        let mut seen = std::collections::HashSet::new();
        for item in &cmd.items {
            if !seen.insert(item.inventory_item_id) {
                return Err(DomainError::validation(
                    "sampled items must reference distinct inventory rows",
                ));
            }
        }

        Ok(vec![AuditEvent::AuditStarted(AuditStarted {
            tenant_id: cmd.tenant_id,
            audit_id: cmd.audit_id,
            started_date: cmd.occurred_at,
            items: cmd.items.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_count(&self, cmd: &RecordCount) -> Result<Vec<AuditEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.audit_id)?;

        if self.status != AuditStatus::InProgress {
            return Err(DomainError::precondition(
                "counts can only be recorded while the audit is in progress",
            ));
        }
        if cmd.counted_quantity < 0 {
            return Err(DomainError::validation("counted_quantity must not be negative"));
        }
        self.item(cmd.item_id)?;

        Ok(vec![AuditEvent::ItemCounted(ItemCounted {
            tenant_id: cmd.tenant_id,
            audit_id: cmd.audit_id,
            item_id: cmd.item_id,
            counted_quantity: cmd.counted_quantity,
            counted_by: cmd.counted_by,
            discrepancy_reason: cmd.discrepancy_reason.clone(),
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_verify_item(&self, cmd: &VerifyItem) -> Result<Vec<AuditEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.audit_id)?;

        if self.status != AuditStatus::InProgress {
            return Err(DomainError::precondition(
                "items can only be verified while the audit is in progress",
            ));
        }
        let item = self.item(cmd.item_id)?;
        if !item.is_counted() {
            return Err(DomainError::precondition("item has not been counted yet"));
        }

        Ok(vec![AuditEvent::ItemVerified(ItemVerified {
            tenant_id: cmd.tenant_id,
            audit_id: cmd.audit_id,
            item_id: cmd.item_id,
            verified_by: cmd.verified_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteAudit) -> Result<Vec<AuditEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.audit_id)?;
        ensure_transition(self.status, AuditStatus::Completed)?;

        let totals = reconcile(&self.items, &cmd.unit_costs_cents);

        Ok(vec![AuditEvent::AuditCompleted(AuditCompleted {
            tenant_id: cmd.tenant_id,
            audit_id: cmd.audit_id,
            completed_date: cmd.occurred_at,
            totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelAudit) -> Result<Vec<AuditEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.audit_id)?;
        ensure_transition(self.status, AuditStatus::Cancelled)?;

        Ok(vec![AuditEvent::AuditCancelled(AuditCancelled {
            tenant_id: cmd.tenant_id,
            audit_id: cmd.audit_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reactivate(&self, cmd: &ReactivateAudit) -> Result<Vec<AuditEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.audit_id)?;
        ensure_transition(self.status, AuditStatus::Planned)?;

        Ok(vec![AuditEvent::AuditReactivated(AuditReactivated {
            tenant_id: cmd.tenant_id,
            audit_id: cmd.audit_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteAudit) -> Result<Vec<AuditEvent>, DomainError> {
        self.ensure_live(cmd.tenant_id, cmd.audit_id)?;

        if self.status == AuditStatus::InProgress {
            return Err(DomainError::precondition("cannot delete an in-progress audit"));
        }

        Ok(vec![AuditEvent::AuditDeleted(AuditDeleted {
            tenant_id: cmd.tenant_id,
            audit_id: cmd.audit_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{AuditItemId, AuditItemStatus, InventoryItemId, ProductId};
    use crate::status::WarehouseId;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_audit_id() -> AuditId {
        AuditId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_item(expected: i64) -> AuditItem {
        AuditItem {
            id: AuditItemId::new(),
            product_id: ProductId::new(),
            variant_id: None,
            warehouse_id: WarehouseId::new("W1"),
            inventory_item_id: InventoryItemId::new(),
            product_name: "widget".to_string(),
            variant_name: None,
            expected_quantity: expected,
            counted_quantity: None,
            status: AuditItemStatus::Pending,
            counted_by: None,
            counted_at: None,
            verified_by: None,
            verified_at: None,
            discrepancy_reason: None,
            notes: None,
        }
    }

    fn planned_audit(tenant_id: TenantId, audit_id: AuditId) -> Audit {
        let mut audit = Audit::empty(audit_id);
        let cmd = PlanAudit {
            tenant_id,
            audit_id,
            audit_number: 1,
            audit_type: AuditType::CycleCount,
            scope: WarehouseScope::Warehouse(WarehouseId::new("W1")),
            planned_date: test_time(),
            notes: None,
            supervised_by: None,
            occurred_at: test_time(),
        };
        for event in audit.handle(&AuditCommand::PlanAudit(cmd)).unwrap() {
            audit.apply(&event);
        }
        audit
    }

    fn running_audit(tenant_id: TenantId, audit_id: AuditId, items: Vec<AuditItem>) -> Audit {
        let mut audit = planned_audit(tenant_id, audit_id);
        let cmd = RunAudit {
            tenant_id,
            audit_id,
            items,
            occurred_at: test_time(),
        };
        for event in audit.handle(&AuditCommand::RunAudit(cmd)).unwrap() {
            audit.apply(&event);
        }
        audit
    }

    #[test]
    fn plan_audit_emits_audit_planned_event() {
        let audit = Audit::empty(test_audit_id());
        let tenant_id = test_tenant_id();
        let audit_id = test_audit_id();
        let cmd = PlanAudit {
            tenant_id,
            audit_id,
            audit_number: 7,
            audit_type: AuditType::SpotCheck,
            scope: WarehouseScope::AllWarehouses,
            planned_date: test_time(),
            notes: Some("quarter close".to_string()),
            supervised_by: None,
            occurred_at: test_time(),
        };

        let events = audit.handle(&AuditCommand::PlanAudit(cmd)).unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            AuditEvent::AuditPlanned(e) => {
                assert_eq!(e.tenant_id, tenant_id);
                assert_eq!(e.audit_id, audit_id);
                assert_eq!(e.audit_number, 7);
                assert_eq!(e.audit_type, AuditType::SpotCheck);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn plan_twice_is_a_conflict() {
        let tenant_id = test_tenant_id();
        let audit_id = test_audit_id();
        let audit = planned_audit(tenant_id, audit_id);

        let cmd = PlanAudit {
            tenant_id,
            audit_id,
            audit_number: 2,
            audit_type: AuditType::CycleCount,
            scope: WarehouseScope::AllWarehouses,
            planned_date: test_time(),
            notes: None,
            supervised_by: None,
            occurred_at: test_time(),
        };

        let err = audit.handle(&AuditCommand::PlanAudit(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn run_freezes_the_sample_and_flips_status_in_one_event() {
        let tenant_id = test_tenant_id();
        let audit_id = test_audit_id();
        let audit = planned_audit(tenant_id, audit_id);

        let items = vec![test_item(10), test_item(5)];
        let cmd = RunAudit {
            tenant_id,
            audit_id,
            items: items.clone(),
            occurred_at: test_time(),
        };

        let events = audit.handle(&AuditCommand::RunAudit(cmd)).unwrap();
        assert_eq!(events.len(), 1);

        let mut after = audit.clone();
        after.apply(&events[0]);
        assert_eq!(after.status(), AuditStatus::InProgress);
        assert_eq!(after.items().len(), 2);
        assert_eq!(after.items_planned(), 2);
        assert!(after.started_date().is_some());
    }

    #[test]
    fn run_with_duplicate_inventory_rows_is_rejected() {
        let tenant_id = test_tenant_id();
        let audit_id = test_audit_id();
        let audit = planned_audit(tenant_id, audit_id);

        let item = test_item(3);
        let mut dup = test_item(3);
        dup.inventory_item_id = item.inventory_item_id;

        let cmd = RunAudit {
            tenant_id,
            audit_id,
            items: vec![item, dup],
            occurred_at: test_time(),
        };

        let err = audit.handle(&AuditCommand::RunAudit(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn run_with_an_empty_sample_is_allowed() {
        let tenant_id = test_tenant_id();
        let audit_id = test_audit_id();
        let audit = planned_audit(tenant_id, audit_id);

        let cmd = RunAudit {
            tenant_id,
            audit_id,
            items: Vec::new(),
            occurred_at: test_time(),
        };

        assert!(audit.handle(&AuditCommand::RunAudit(cmd)).is_ok());
    }

    #[test]
    fn run_on_a_completed_audit_is_an_invalid_transition() {
        let tenant_id = test_tenant_id();
        let audit_id = test_audit_id();
        let mut audit = running_audit(tenant_id, audit_id, vec![test_item(4)]);

        let complete = CompleteAudit {
            tenant_id,
            audit_id,
            unit_costs_cents: BTreeMap::new(),
            occurred_at: test_time(),
        };
        for event in audit.handle(&AuditCommand::CompleteAudit(complete)).unwrap() {
            audit.apply(&event);
        }

        let cmd = RunAudit {
            tenant_id,
            audit_id,
            items: Vec::new(),
            occurred_at: test_time(),
        };

        let err = audit.handle(&AuditCommand::RunAudit(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }

    #[test]
    fn record_count_tracks_discrepancy_status() {
        let tenant_id = test_tenant_id();
        let audit_id = test_audit_id();
        let item = test_item(10);
        let item_id = item.id;
        let mut audit = running_audit(tenant_id, audit_id, vec![item]);

        let cmd = RecordCount {
            tenant_id,
            audit_id,
            item_id,
            counted_quantity: 8,
            counted_by: UserId::new(),
            discrepancy_reason: Some("damaged units removed".to_string()),
            notes: None,
            occurred_at: test_time(),
        };
        for event in audit.handle(&AuditCommand::RecordCount(cmd)).unwrap() {
            audit.apply(&event);
        }

        let item = &audit.items()[0];
        assert_eq!(item.counted_quantity, Some(8));
        assert_eq!(item.status, AuditItemStatus::Discrepancy);
        assert_eq!(item.variance(), Some(-2));
    }

    #[test]
    fn recounting_an_item_replaces_the_previous_count() {
        let tenant_id = test_tenant_id();
        let audit_id = test_audit_id();
        let item = test_item(10);
        let item_id = item.id;
        let mut audit = running_audit(tenant_id, audit_id, vec![item]);

        for quantity in [8, 10] {
            let cmd = RecordCount {
                tenant_id,
                audit_id,
                item_id,
                counted_quantity: quantity,
                counted_by: UserId::new(),
                discrepancy_reason: None,
                notes: None,
                occurred_at: test_time(),
            };
            for event in audit.handle(&AuditCommand::RecordCount(cmd)).unwrap() {
                audit.apply(&event);
            }
        }

        let item = &audit.items()[0];
        assert_eq!(item.counted_quantity, Some(10));
        assert_eq!(item.status, AuditItemStatus::Counted);
    }

    #[test]
    fn record_count_for_unknown_item_is_not_found() {
        let tenant_id = test_tenant_id();
        let audit_id = test_audit_id();
        let audit = running_audit(tenant_id, audit_id, vec![test_item(4)]);

        let cmd = RecordCount {
            tenant_id,
            audit_id,
            item_id: AuditItemId::new(),
            counted_quantity: 4,
            counted_by: UserId::new(),
            discrepancy_reason: None,
            notes: None,
            occurred_at: test_time(),
        };

        let err = audit.handle(&AuditCommand::RecordCount(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::NotFound));
    }

    #[test]
    fn record_count_outside_in_progress_is_a_precondition_failure() {
        let tenant_id = test_tenant_id();
        let audit_id = test_audit_id();
        let audit = planned_audit(tenant_id, audit_id);

        let cmd = RecordCount {
            tenant_id,
            audit_id,
            item_id: AuditItemId::new(),
            counted_quantity: 1,
            counted_by: UserId::new(),
            discrepancy_reason: None,
            notes: None,
            occurred_at: test_time(),
        };

        let err = audit.handle(&AuditCommand::RecordCount(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::PreconditionFailed(_)));
    }

    #[test]
    fn verify_requires_a_prior_count() {
        let tenant_id = test_tenant_id();
        let audit_id = test_audit_id();
        let item = test_item(4);
        let item_id = item.id;
        let mut audit = running_audit(tenant_id, audit_id, vec![item]);

        let verify = VerifyItem {
            tenant_id,
            audit_id,
            item_id,
            verified_by: UserId::new(),
            occurred_at: test_time(),
        };

        let err = audit
            .handle(&AuditCommand::VerifyItem(verify.clone()))
            .unwrap_err();
        assert!(matches!(err, DomainError::PreconditionFailed(_)));

        let count = RecordCount {
            tenant_id,
            audit_id,
            item_id,
            counted_quantity: 4,
            counted_by: UserId::new(),
            discrepancy_reason: None,
            notes: None,
            occurred_at: test_time(),
        };
        for event in audit.handle(&AuditCommand::RecordCount(count)).unwrap() {
            audit.apply(&event);
        }
        for event in audit.handle(&AuditCommand::VerifyItem(verify)).unwrap() {
            audit.apply(&event);
        }

        assert_eq!(audit.items()[0].status, AuditItemStatus::Verified);
        assert!(audit.items()[0].verified_at.is_some());
    }

    #[test]
    fn complete_freezes_reconciliation_totals() {
        let tenant_id = test_tenant_id();
        let audit_id = test_audit_id();

        let items: Vec<AuditItem> = (0..10).map(|_| test_item(10)).collect();
        let product_id = items[0].product_id;
        let item_ids: Vec<AuditItemId> = items.iter().map(|i| i.id).collect();
        let mut audit = running_audit(tenant_id, audit_id, items);

        // Count 7 of 10; 3 of those counts disagree with expectations.
        for (n, item_id) in item_ids.iter().take(7).enumerate() {
            let counted = if n < 3 { 9 } else { 10 };
            let cmd = RecordCount {
                tenant_id,
                audit_id,
                item_id: *item_id,
                counted_quantity: counted,
                counted_by: UserId::new(),
                discrepancy_reason: None,
                notes: None,
                occurred_at: test_time(),
            };
            for event in audit.handle(&AuditCommand::RecordCount(cmd)).unwrap() {
                audit.apply(&event);
            }
        }

        let costs = BTreeMap::from([(product_id, 250)]);
        let cmd = CompleteAudit {
            tenant_id,
            audit_id,
            unit_costs_cents: costs,
            occurred_at: test_time(),
        };
        let events = audit.handle(&AuditCommand::CompleteAudit(cmd)).unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            AuditEvent::AuditCompleted(e) => {
                assert_eq!(e.totals.items_counted, 7);
                assert_eq!(e.totals.discrepancies, 3);
                assert_eq!(e.totals.adjustment_value_cents, 3 * -250);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        for event in events {
            audit.apply(&event);
        }
        assert_eq!(audit.status(), AuditStatus::Completed);
        assert_eq!(audit.items_counted(), 7);
        assert_eq!(audit.discrepancies(), 3);
        assert_eq!(audit.adjustment_value_cents(), -750);
    }

    #[test]
    fn complete_twice_is_an_invalid_transition() {
        let tenant_id = test_tenant_id();
        let audit_id = test_audit_id();
        let mut audit = running_audit(tenant_id, audit_id, vec![test_item(1)]);

        let cmd = CompleteAudit {
            tenant_id,
            audit_id,
            unit_costs_cents: BTreeMap::new(),
            occurred_at: test_time(),
        };
        for event in audit.handle(&AuditCommand::CompleteAudit(cmd.clone())).unwrap() {
            audit.apply(&event);
        }

        let err = audit.handle(&AuditCommand::CompleteAudit(cmd)).unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidTransition { ref from, ref to }
                if from == "completed" && to == "completed"
        ));
    }

    #[test]
    fn cancel_then_reactivate_purges_the_sample() {
        let tenant_id = test_tenant_id();
        let audit_id = test_audit_id();
        let item = test_item(5);
        let item_id = item.id;
        let mut audit = running_audit(tenant_id, audit_id, vec![item]);

        let count = RecordCount {
            tenant_id,
            audit_id,
            item_id,
            counted_quantity: 2,
            counted_by: UserId::new(),
            discrepancy_reason: None,
            notes: None,
            occurred_at: test_time(),
        };
        for event in audit.handle(&AuditCommand::RecordCount(count)).unwrap() {
            audit.apply(&event);
        }

        let cancel = CancelAudit {
            tenant_id,
            audit_id,
            occurred_at: test_time(),
        };
        for event in audit.handle(&AuditCommand::CancelAudit(cancel)).unwrap() {
            audit.apply(&event);
        }
        assert_eq!(audit.status(), AuditStatus::Cancelled);

        let reactivate = ReactivateAudit {
            tenant_id,
            audit_id,
            occurred_at: test_time(),
        };
        for event in audit.handle(&AuditCommand::ReactivateAudit(reactivate)).unwrap() {
            audit.apply(&event);
        }

        assert_eq!(audit.status(), AuditStatus::Planned);
        assert!(audit.items().is_empty());
        assert_eq!(audit.items_planned(), 0);
        assert!(audit.started_date().is_none());
    }

    #[test]
    fn completed_audits_cannot_be_reactivated() {
        let tenant_id = test_tenant_id();
        let audit_id = test_audit_id();
        let mut audit = running_audit(tenant_id, audit_id, Vec::new());

        let cmd = CompleteAudit {
            tenant_id,
            audit_id,
            unit_costs_cents: BTreeMap::new(),
            occurred_at: test_time(),
        };
        for event in audit.handle(&AuditCommand::CompleteAudit(cmd)).unwrap() {
            audit.apply(&event);
        }

        let reactivate = ReactivateAudit {
            tenant_id,
            audit_id,
            occurred_at: test_time(),
        };
        let err = audit
            .handle(&AuditCommand::ReactivateAudit(reactivate))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }

    #[test]
    fn in_progress_audits_cannot_be_deleted() {
        let tenant_id = test_tenant_id();
        let audit_id = test_audit_id();
        let audit = running_audit(tenant_id, audit_id, vec![test_item(2)]);

        let cmd = DeleteAudit {
            tenant_id,
            audit_id,
            occurred_at: test_time(),
        };

        let err = audit.handle(&AuditCommand::DeleteAudit(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::PreconditionFailed(_)));
    }

    #[test]
    fn deleted_audits_reject_further_commands() {
        let tenant_id = test_tenant_id();
        let audit_id = test_audit_id();
        let mut audit = planned_audit(tenant_id, audit_id);

        let delete = DeleteAudit {
            tenant_id,
            audit_id,
            occurred_at: test_time(),
        };
        for event in audit.handle(&AuditCommand::DeleteAudit(delete)).unwrap() {
            audit.apply(&event);
        }
        assert!(audit.is_deleted());

        let cmd = UpdateDetails {
            tenant_id,
            audit_id,
            planned_date: None,
            notes: Some("too late".to_string()),
            supervised_by: None,
            occurred_at: test_time(),
        };
        let err = audit.handle(&AuditCommand::UpdateDetails(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::NotFound));
    }

    #[test]
    fn commands_from_another_tenant_read_as_not_found() {
        let audit_id = test_audit_id();
        let audit = planned_audit(test_tenant_id(), audit_id);

        let cmd = CancelAudit {
            tenant_id: test_tenant_id(),
            audit_id,
            occurred_at: test_time(),
        };

        let err = audit.handle(&AuditCommand::CancelAudit(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::NotFound));
    }

    #[test]
    fn handle_never_mutates_the_aggregate() {
        let tenant_id = test_tenant_id();
        let audit_id = test_audit_id();
        let audit = planned_audit(tenant_id, audit_id);
        let snapshot = audit.clone();

        let cmd = RunAudit {
            tenant_id,
            audit_id,
            items: vec![test_item(1)],
            occurred_at: test_time(),
        };
        audit.handle(&AuditCommand::RunAudit(cmd)).unwrap();

        assert_eq!(audit, snapshot);
    }

    #[test]
    fn update_details_with_no_fields_emits_nothing() {
        let tenant_id = test_tenant_id();
        let audit_id = test_audit_id();
        let audit = planned_audit(tenant_id, audit_id);

        let cmd = UpdateDetails {
            tenant_id,
            audit_id,
            planned_date: None,
            notes: None,
            supervised_by: None,
            occurred_at: test_time(),
        };

        let events = audit.handle(&AuditCommand::UpdateDetails(cmd)).unwrap();
        assert!(events.is_empty());
    }
}
