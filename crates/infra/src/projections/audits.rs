use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use stocktake_audit::{
    AuditEvent, AuditId, AuditItem, AuditItemStatus, AuditStatus, AuditType, WarehouseScope,
};
use stocktake_core::{AggregateId, TenantId, UserId};
use stocktake_events::EventEnvelope;

use crate::read_model::TenantStore;

/// Queryable audit read model: one record per audit, items included.
///
/// Items live inside the record, so removing the record on deletion drops
/// the audit and every child item in one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditReadModel {
    pub audit_id: AuditId,
    pub tenant_id: TenantId,
    pub audit_number: u64,
    pub audit_type: AuditType,
    pub scope: WarehouseScope,
    pub status: AuditStatus,
    pub planned_date: DateTime<Utc>,
    pub started_date: Option<DateTime<Utc>>,
    pub completed_date: Option<DateTime<Utc>>,
    pub items_planned: u32,
    pub items_counted: u32,
    pub discrepancies: u32,
    pub adjustment_value_cents: i64,
    pub notes: Option<String>,
    pub supervised_by: Option<UserId>,
    pub items: Vec<AuditItem>,
    /// Stream version of the last applied event.
    pub version: u64,
}

/// Tenant+aggregate cursor to support at-least-once delivery.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum AuditsProjectionError {
    #[error("failed to deserialize audit event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("event for unknown audit (type {event_type})")]
    UnknownAudit { event_type: String },
}

/// Audit read model projection.
///
/// Consumes published envelopes (JSON payloads) and maintains a
/// tenant-isolated record per audit. Replays at or below the per-stream
/// cursor are ignored, so redelivery is harmless.
#[derive(Debug)]
pub struct AuditsProjection<S>
where
    S: TenantStore<AggregateId, AuditReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> AuditsProjection<S>
where
    S: TenantStore<AggregateId, AuditReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: TenantId, audit_id: AuditId) -> Option<AuditReadModel> {
        self.store.get(tenant_id, &audit_id.0)
    }

    /// All audits for a tenant, ordered by audit number.
    pub fn list(&self, tenant_id: TenantId) -> Vec<AuditReadModel> {
        let mut audits = self.store.list(tenant_id);
        audits.sort_by_key(|a| a.audit_number);
        audits
    }

    /// Items of one audit, ordered by product name then variant name.
    pub fn items(&self, tenant_id: TenantId, audit_id: AuditId) -> Option<Vec<AuditItem>> {
        let record = self.store.get(tenant_id, &audit_id.0)?;
        let mut items = record.items;
        items.sort_by(|a, b| {
            (&a.product_name, &a.variant_name).cmp(&(&b.product_name, &b.variant_name))
        });
        Some(items)
    }

    /// Completed audits for a tenant, in no particular order.
    pub fn completed(&self, tenant_id: TenantId) -> Vec<AuditReadModel> {
        self.store
            .list(tenant_id)
            .into_iter()
            .filter(|a| a.status == AuditStatus::Completed)
            .collect()
    }

    /// Apply a published envelope into the projection.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), AuditsProjectionError> {
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let Ok(mut cursors) = self.cursors.write() else {
            return Ok(());
        };
        let key = CursorKey {
            tenant_id,
            aggregate_id,
        };
        let last = *cursors.get(&key).unwrap_or(&0);

        if seq == 0 {
            return Err(AuditsProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            // Duplicate or replay; safe to ignore.
            return Ok(());
        }
        if last != 0 && seq != last + 1 {
            return Err(AuditsProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: AuditEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| AuditsProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, event_audit_id) = event_scope(&event);
        if event_tenant != tenant_id {
            return Err(AuditsProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if event_audit_id.0 != aggregate_id {
            return Err(AuditsProjectionError::TenantIsolation(
                "event audit_id does not match envelope aggregate_id".to_string(),
            ));
        }

        self.apply_event(tenant_id, event_audit_id, seq, &event)?;

        cursors.insert(key, seq);
        Ok(())
    }

    fn apply_event(
        &self,
        tenant_id: TenantId,
        audit_id: AuditId,
        seq: u64,
        event: &AuditEvent,
    ) -> Result<(), AuditsProjectionError> {
        if let AuditEvent::AuditPlanned(e) = event {
            self.store.upsert(
                tenant_id,
                audit_id.0,
                AuditReadModel {
                    audit_id,
                    tenant_id,
                    audit_number: e.audit_number,
                    audit_type: e.audit_type,
                    scope: e.scope.clone(),
                    status: AuditStatus::Planned,
                    planned_date: e.planned_date,
                    started_date: None,
                    completed_date: None,
                    items_planned: 0,
                    items_counted: 0,
                    discrepancies: 0,
                    adjustment_value_cents: 0,
                    notes: e.notes.clone(),
                    supervised_by: e.supervised_by,
                    items: Vec::new(),
                    version: seq,
                },
            );
            return Ok(());
        }

        if let AuditEvent::AuditDeleted(_) = event {
            // One removal drops the audit and all of its items.
            self.store.remove(tenant_id, &audit_id.0);
            return Ok(());
        }

        let mut record = self.store.get(tenant_id, &audit_id.0).ok_or_else(|| {
            AuditsProjectionError::UnknownAudit {
                event_type: stocktake_events::Event::event_type(event).to_string(),
            }
        })?;

        match event {
            AuditEvent::AuditPlanned(_) | AuditEvent::AuditDeleted(_) => unreachable!(),
            AuditEvent::AuditDetailsUpdated(e) => {
                if let Some(planned_date) = e.planned_date {
                    record.planned_date = planned_date;
                }
                if let Some(notes) = &e.notes {
                    record.notes = Some(notes.clone());
                }
                if let Some(supervised_by) = e.supervised_by {
                    record.supervised_by = Some(supervised_by);
                }
            }
            AuditEvent::AuditStarted(e) => {
                record.status = AuditStatus::InProgress;
                record.started_date = Some(e.started_date);
                record.items = e.items.clone();
                record.items_planned = e.items.len() as u32;
            }
            AuditEvent::ItemCounted(e) => {
                if let Some(item) = record.items.iter_mut().find(|i| i.id == e.item_id) {
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
                if let Some(item) = record.items.iter_mut().find(|i| i.id == e.item_id) {
                    item.verified_by = Some(e.verified_by);
                    item.verified_at = Some(e.occurred_at);
                    if item.status == AuditItemStatus::Counted {
                        item.status = AuditItemStatus::Verified;
                    }
                }
            }
            AuditEvent::AuditCompleted(e) => {
                record.status = AuditStatus::Completed;
                record.completed_date = Some(e.completed_date);
                record.items_counted = e.totals.items_counted;
                record.discrepancies = e.totals.discrepancies;
                record.adjustment_value_cents = e.totals.adjustment_value_cents;
            }
            AuditEvent::AuditCancelled(_) => {
                record.status = AuditStatus::Cancelled;
            }
            AuditEvent::AuditReactivated(_) => {
                record.status = AuditStatus::Planned;
                record.started_date = None;
                record.completed_date = None;
                record.items.clear();
                record.items_planned = 0;
                record.items_counted = 0;
                record.discrepancies = 0;
                record.adjustment_value_cents = 0;
            }
        }

        record.version = seq;
        self.store.upsert(tenant_id, audit_id.0, record);
        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), AuditsProjectionError> {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();

        let mut tenants = envs.iter().map(|e| e.tenant_id()).collect::<Vec<_>>();
        tenants.sort_by_key(|t| *t.as_uuid().as_bytes());
        tenants.dedup();
        for t in tenants {
            self.store.clear_tenant(t);
        }

        // Deterministic replay order: tenant, aggregate, sequence.
        envs.sort_by_key(|e| {
            (
                *e.tenant_id().as_uuid().as_bytes(),
                *e.aggregate_id().as_uuid().as_bytes(),
                e.sequence_number(),
            )
        });

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}

fn event_scope(event: &AuditEvent) -> (TenantId, AuditId) {
    match event {
        AuditEvent::AuditPlanned(e) => (e.tenant_id, e.audit_id),
        AuditEvent::AuditDetailsUpdated(e) => (e.tenant_id, e.audit_id),
        AuditEvent::AuditStarted(e) => (e.tenant_id, e.audit_id),
        AuditEvent::ItemCounted(e) => (e.tenant_id, e.audit_id),
        AuditEvent::ItemVerified(e) => (e.tenant_id, e.audit_id),
        AuditEvent::AuditCompleted(e) => (e.tenant_id, e.audit_id),
        AuditEvent::AuditCancelled(e) => (e.tenant_id, e.audit_id),
        AuditEvent::AuditReactivated(e) => (e.tenant_id, e.audit_id),
        AuditEvent::AuditDeleted(e) => (e.tenant_id, e.audit_id),
    }
}
