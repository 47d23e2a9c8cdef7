//! End-to-end pipeline tests: dispatch commands through the in-memory
//! store and bus, feed the published envelopes into the audits projection,
//! and assert on what a caller would read back.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;

use stocktake_audit::{
    Audit, AuditCommand, AuditId, AuditItem, AuditItemId, AuditItemStatus, AuditStatus, AuditType,
    CompleteAudit, DeleteAudit, InventoryItemId, PlanAudit, ProductId, RecordCount, RunAudit,
    WarehouseId, WarehouseScope,
};
use stocktake_core::{AggregateId, TenantId, UserId};
use stocktake_events::{EventBus, EventEnvelope, InMemoryEventBus};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::InMemoryEventStore;
use crate::projections::AuditsProjection;
use crate::read_model::InMemoryTenantStore;

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Bus>;
type Projection = AuditsProjection<InMemoryTenantStore<AggregateId, crate::projections::AuditReadModel>>;

const AGGREGATE_TYPE: &str = "audit";

struct Pipeline {
    dispatcher: Dispatcher,
    projection: Projection,
    subscription: stocktake_events::Subscription<EventEnvelope<JsonValue>>,
}

impl Pipeline {
    fn new() -> Self {
        let store = Arc::new(InMemoryEventStore::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let subscription = bus.subscribe();
        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            projection: AuditsProjection::new(InMemoryTenantStore::new()),
            subscription,
        }
    }

    fn dispatch(
        &self,
        tenant_id: TenantId,
        audit_id: AuditId,
        command: AuditCommand,
    ) -> Result<usize, DispatchError> {
        let committed = self.dispatcher.dispatch(
            tenant_id,
            audit_id.0,
            AGGREGATE_TYPE,
            command,
            |_, id| Audit::empty(AuditId::new(id)),
        )?;
        Ok(committed.len())
    }

    /// Drain everything the bus delivered into the projection.
    fn drain(&self) {
        while let Ok(envelope) = self.subscription.try_recv() {
            self.projection.apply_envelope(&envelope).unwrap();
        }
    }
}

fn item(product_name: &str, variant_name: Option<&str>, expected: i64) -> AuditItem {
    AuditItem {
        id: AuditItemId::new(),
        product_id: ProductId::new(),
        variant_id: None,
        warehouse_id: WarehouseId::new("W1"),
        inventory_item_id: InventoryItemId::new(),
        product_name: product_name.to_string(),
        variant_name: variant_name.map(str::to_string),
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

fn plan(tenant_id: TenantId, audit_id: AuditId, number: u64) -> AuditCommand {
    AuditCommand::PlanAudit(PlanAudit {
        tenant_id,
        audit_id,
        audit_number: number,
        audit_type: AuditType::CycleCount,
        scope: WarehouseScope::Warehouse(WarehouseId::new("W1")),
        planned_date: Utc::now(),
        notes: None,
        supervised_by: None,
        occurred_at: Utc::now(),
    })
}

fn run(tenant_id: TenantId, audit_id: AuditId, items: Vec<AuditItem>) -> AuditCommand {
    AuditCommand::RunAudit(RunAudit {
        tenant_id,
        audit_id,
        items,
        occurred_at: Utc::now(),
    })
}

#[test]
fn full_lifecycle_lands_in_the_read_model() {
    let pipeline = Pipeline::new();
    let tenant_id = TenantId::new();
    let audit_id = AuditId::new(AggregateId::new());

    pipeline.dispatch(tenant_id, audit_id, plan(tenant_id, audit_id, 1)).unwrap();

    let short = item("beans", None, 10);
    let short_id = short.id;
    let short_product = short.product_id;
    let exact = item("rice", None, 4);
    let exact_id = exact.id;
    pipeline
        .dispatch(tenant_id, audit_id, run(tenant_id, audit_id, vec![short, exact]))
        .unwrap();

    for (item_id, quantity) in [(short_id, 7i64), (exact_id, 4)] {
        pipeline
            .dispatch(
                tenant_id,
                audit_id,
                AuditCommand::RecordCount(RecordCount {
                    tenant_id,
                    audit_id,
                    item_id,
                    counted_quantity: quantity,
                    counted_by: UserId::new(),
                    discrepancy_reason: None,
                    notes: None,
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap();
    }

    pipeline
        .dispatch(
            tenant_id,
            audit_id,
            AuditCommand::CompleteAudit(CompleteAudit {
                tenant_id,
                audit_id,
                unit_costs_cents: BTreeMap::from([(short_product, 100)]),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

    pipeline.drain();

    let record = pipeline.projection.get(tenant_id, audit_id).unwrap();
    assert_eq!(record.status, AuditStatus::Completed);
    assert_eq!(record.items_planned, 2);
    assert_eq!(record.items_counted, 2);
    assert_eq!(record.discrepancies, 1);
    assert_eq!(record.adjustment_value_cents, -300);
    assert!(record.completed_date.is_some());
}

#[test]
fn concurrent_runs_let_exactly_one_win() {
    let pipeline = Pipeline::new();
    let tenant_id = TenantId::new();
    let audit_id = AuditId::new(AggregateId::new());

    pipeline.dispatch(tenant_id, audit_id, plan(tenant_id, audit_id, 1)).unwrap();

    let first = pipeline.dispatch(tenant_id, audit_id, run(tenant_id, audit_id, vec![item("a", None, 1)]));
    let second = pipeline.dispatch(tenant_id, audit_id, run(tenant_id, audit_id, vec![item("b", None, 1)]));

    assert_eq!(first.unwrap(), 1);
    assert!(matches!(second.unwrap_err(), DispatchError::InvalidTransition { .. }));

    pipeline.drain();
    let record = pipeline.projection.get(tenant_id, audit_id).unwrap();
    assert_eq!(record.items_planned, 1);
    assert_eq!(record.items[0].product_name, "a");
}

#[test]
fn delete_removes_audit_and_items_together() {
    let pipeline = Pipeline::new();
    let tenant_id = TenantId::new();
    let audit_id = AuditId::new(AggregateId::new());

    pipeline.dispatch(tenant_id, audit_id, plan(tenant_id, audit_id, 1)).unwrap();
    pipeline.drain();
    assert!(pipeline.projection.get(tenant_id, audit_id).is_some());

    pipeline
        .dispatch(
            tenant_id,
            audit_id,
            AuditCommand::DeleteAudit(DeleteAudit {
                tenant_id,
                audit_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
    pipeline.drain();

    assert!(pipeline.projection.get(tenant_id, audit_id).is_none());
    assert!(pipeline.projection.items(tenant_id, audit_id).is_none());
}

#[test]
fn projection_ignores_redelivered_envelopes() {
    let pipeline = Pipeline::new();
    let tenant_id = TenantId::new();
    let audit_id = AuditId::new(AggregateId::new());

    pipeline.dispatch(tenant_id, audit_id, plan(tenant_id, audit_id, 1)).unwrap();

    let envelope = pipeline.subscription.try_recv().unwrap();
    pipeline.projection.apply_envelope(&envelope).unwrap();
    pipeline.projection.apply_envelope(&envelope).unwrap();

    let audits = pipeline.projection.list(tenant_id);
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].version, 1);
}

#[test]
fn item_listing_sorts_by_product_then_variant() {
    let pipeline = Pipeline::new();
    let tenant_id = TenantId::new();
    let audit_id = AuditId::new(AggregateId::new());

    pipeline.dispatch(tenant_id, audit_id, plan(tenant_id, audit_id, 1)).unwrap();
    pipeline
        .dispatch(
            tenant_id,
            audit_id,
            run(
                tenant_id,
                audit_id,
                vec![
                    item("rice", Some("white"), 1),
                    item("beans", None, 1),
                    item("rice", Some("brown"), 1),
                ],
            ),
        )
        .unwrap();
    pipeline.drain();

    let items = pipeline.projection.items(tenant_id, audit_id).unwrap();
    let names: Vec<(String, Option<String>)> = items
        .into_iter()
        .map(|i| (i.product_name, i.variant_name))
        .collect();
    assert_eq!(
        names,
        vec![
            ("beans".to_string(), None),
            ("rice".to_string(), Some("brown".to_string())),
            ("rice".to_string(), Some("white".to_string())),
        ]
    );
}

#[test]
fn audits_list_orders_by_audit_number() {
    let pipeline = Pipeline::new();
    let tenant_id = TenantId::new();

    for number in [3u64, 1, 2] {
        let audit_id = AuditId::new(AggregateId::new());
        pipeline.dispatch(tenant_id, audit_id, plan(tenant_id, audit_id, number)).unwrap();
    }
    pipeline.drain();

    let numbers: Vec<u64> = pipeline
        .projection
        .list(tenant_id)
        .into_iter()
        .map(|a| a.audit_number)
        .collect();
    assert_eq!(numbers, vec![1, 2, 3]);
}

#[test]
fn tenants_cannot_read_each_other() {
    let pipeline = Pipeline::new();
    let tenant_a = TenantId::new();
    let tenant_b = TenantId::new();
    let audit_id = AuditId::new(AggregateId::new());

    pipeline.dispatch(tenant_a, audit_id, plan(tenant_a, audit_id, 1)).unwrap();
    pipeline.drain();

    assert!(pipeline.projection.get(tenant_b, audit_id).is_none());
    assert!(pipeline.projection.list(tenant_b).is_empty());
}
