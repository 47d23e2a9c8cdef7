use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use stocktake_audit::{
    Audit, AuditEvent, AuditId, AuditItem, ProductId, StockRow, WarehouseScope,
};
use stocktake_core::{Aggregate, AggregateId, DomainError, TenantId};
use stocktake_events::{EventBus, EventEnvelope, InMemoryEventBus};
use stocktake_infra::{
    command_dispatcher::{CommandDispatcher, DispatchError},
    event_store::{EventStore, InMemoryEventStore, StoredEvent},
    projections::{AuditReadModel, AuditsProjection},
    read_model::InMemoryTenantStore,
    sequence::{AuditNumberAllocator, InMemoryAuditNumbers},
    sources::{InMemoryStockLevels, InMemoryUnitCosts, StockSnapshotSource, UnitCostSource},
};

#[cfg(feature = "postgres")]
use sqlx::PgPool;
#[cfg(feature = "postgres")]
use stocktake_infra::event_store::PostgresEventStore;

/// Stream type identifier for audit aggregates.
pub const AUDIT_AGGREGATE_TYPE: &str = "audit";

/// Realtime message broadcasted via SSE.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RealtimeMessage {
    pub tenant_id: TenantId,
    pub topic: String,
    pub payload: serde_json::Value,
}

type Envelope = EventEnvelope<serde_json::Value>;

// Type-erased dispatcher for in-memory implementations
type InMemoryDispatcher =
    CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<Envelope>>>;

// Type-erased dispatcher for the Postgres-backed store
#[cfg(feature = "postgres")]
type PersistentDispatcher =
    CommandDispatcher<Arc<PostgresEventStore>, Arc<InMemoryEventBus<Envelope>>>;

type AuditsStore = Arc<InMemoryTenantStore<AggregateId, AuditReadModel>>;

#[derive(Clone)]
pub enum AppServices {
    InMemory {
        dispatcher: Arc<InMemoryDispatcher>,
        event_store: Arc<InMemoryEventStore>,
        event_bus: Arc<InMemoryEventBus<Envelope>>,
        audits_projection: Arc<AuditsProjection<AuditsStore>>,
        stock_levels: Arc<InMemoryStockLevels>,
        unit_costs: Arc<InMemoryUnitCosts>,
        audit_numbers: Arc<InMemoryAuditNumbers>,
        realtime_tx: broadcast::Sender<RealtimeMessage>,
    },
    #[cfg(feature = "postgres")]
    Persistent {
        dispatcher: Arc<PersistentDispatcher>,
        event_store: Arc<PostgresEventStore>,
        event_bus: Arc<InMemoryEventBus<Envelope>>,
        audits_projection: Arc<AuditsProjection<AuditsStore>>,
        stock_levels: Arc<InMemoryStockLevels>,
        unit_costs: Arc<InMemoryUnitCosts>,
        audit_numbers: Arc<InMemoryAuditNumbers>,
        realtime_tx: broadcast::Sender<RealtimeMessage>,
    },
}

pub async fn build_services() -> AppServices {
    let use_persistent = std::env::var("USE_PERSISTENT_STORES")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    if use_persistent {
        #[cfg(feature = "postgres")]
        {
            return build_persistent_services().await;
        }
        #[cfg(not(feature = "postgres"))]
        {
            tracing::warn!(
                "USE_PERSISTENT_STORES=true but postgres feature not enabled, falling back to in-memory"
            );
            return build_in_memory_services();
        }
    }

    build_in_memory_services()
}

pub fn build_in_memory_services() -> AppServices {
    // In-memory infra wiring (dev/test): store + bus + projection.
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Arc<InMemoryEventBus<Envelope>> = Arc::new(InMemoryEventBus::new());

    let rm_store: AuditsStore = Arc::new(InMemoryTenantStore::new());
    let audits_projection: Arc<AuditsProjection<AuditsStore>> =
        Arc::new(AuditsProjection::new(rm_store));

    let stock_levels = Arc::new(InMemoryStockLevels::new());
    let unit_costs = Arc::new(InMemoryUnitCosts::new());
    let audit_numbers = Arc::new(InMemoryAuditNumbers::new());

    // Realtime channel (SSE): lossy broadcast, tenant-filtered in handlers.
    let (realtime_tx, _realtime_rx) = broadcast::channel::<RealtimeMessage>(256);

    spawn_projection_subscriber(bus.subscribe(), audits_projection.clone(), realtime_tx.clone());

    let dispatcher: Arc<InMemoryDispatcher> =
        Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));
    AppServices::InMemory {
        dispatcher,
        event_store: store,
        event_bus: bus,
        audits_projection,
        stock_levels,
        unit_costs,
        audit_numbers,
        realtime_tx,
    }
}

#[cfg(feature = "postgres")]
async fn build_persistent_services() -> AppServices {
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");

    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to Postgres");

    let store = Arc::new(PostgresEventStore::new(pool));
    let bus: Arc<InMemoryEventBus<Envelope>> = Arc::new(InMemoryEventBus::new());

    // The read model stays in memory and is rebuilt from the store as
    // events flow; it can be swapped to a persistent store later.
    let rm_store: AuditsStore = Arc::new(InMemoryTenantStore::new());
    let audits_projection: Arc<AuditsProjection<AuditsStore>> =
        Arc::new(AuditsProjection::new(rm_store));

    let stock_levels = Arc::new(InMemoryStockLevels::new());
    let unit_costs = Arc::new(InMemoryUnitCosts::new());
    let audit_numbers = Arc::new(InMemoryAuditNumbers::new());

    let (realtime_tx, _realtime_rx) = broadcast::channel::<RealtimeMessage>(256);

    spawn_projection_subscriber(bus.subscribe(), audits_projection.clone(), realtime_tx.clone());

    let dispatcher: Arc<PersistentDispatcher> =
        Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));
    AppServices::Persistent {
        dispatcher,
        event_store: store,
        event_bus: bus,
        audits_projection,
        stock_levels,
        unit_costs,
        audit_numbers,
        realtime_tx,
    }
}

/// Background subscriber: bus -> projection, then realtime fanout.
fn spawn_projection_subscriber(
    sub: stocktake_events::Subscription<Envelope>,
    audits_projection: Arc<AuditsProjection<AuditsStore>>,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
) {
    tokio::task::spawn_blocking(move || {
        loop {
            match sub.recv() {
                Ok(env) => {
                    let at = env.aggregate_type().to_string();

                    if at == AUDIT_AGGREGATE_TYPE {
                        if let Err(e) = audits_projection.apply_envelope(&env) {
                            tracing::warn!("projection apply failed: {e}");
                            continue;
                        }
                    }

                    // Broadcast projection update (lossy; no backpressure on core).
                    let _ = realtime_tx.send(RealtimeMessage {
                        tenant_id: env.tenant_id(),
                        topic: format!("{at}.projection_updated"),
                        payload: serde_json::json!({
                            "kind": "projection_update",
                            "aggregate_type": at,
                            "aggregate_id": env.aggregate_id().to_string(),
                            "sequence_number": env.sequence_number(),
                        }),
                    });
                }
                Err(_) => break,
            }
        }
    });
}

impl AppServices {
    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        match self {
            AppServices::InMemory { realtime_tx, .. } => realtime_tx,
            #[cfg(feature = "postgres")]
            AppServices::Persistent { realtime_tx, .. } => realtime_tx,
        }
    }

    pub fn stock_levels(&self) -> &Arc<InMemoryStockLevels> {
        match self {
            AppServices::InMemory { stock_levels, .. } => stock_levels,
            #[cfg(feature = "postgres")]
            AppServices::Persistent { stock_levels, .. } => stock_levels,
        }
    }

    pub fn unit_costs(&self) -> &Arc<InMemoryUnitCosts> {
        match self {
            AppServices::InMemory { unit_costs, .. } => unit_costs,
            #[cfg(feature = "postgres")]
            AppServices::Persistent { unit_costs, .. } => unit_costs,
        }
    }

    pub fn next_audit_number(&self, tenant_id: TenantId) -> u64 {
        match self {
            AppServices::InMemory { audit_numbers, .. } => audit_numbers.next(tenant_id),
            #[cfg(feature = "postgres")]
            AppServices::Persistent { audit_numbers, .. } => audit_numbers.next(tenant_id),
        }
    }

    pub fn stock_rows(&self, tenant_id: TenantId, scope: &WarehouseScope) -> Vec<StockRow> {
        self.stock_levels().stock_rows(tenant_id, scope)
    }

    pub fn unit_cost_cents(&self, tenant_id: TenantId, product_id: ProductId) -> Option<i64> {
        self.unit_costs().unit_cost_cents(tenant_id, product_id)
    }

    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: stocktake_events::Event + serde::Serialize + serde::de::DeserializeOwned,
    {
        match self {
            AppServices::InMemory { dispatcher, .. } => dispatcher.dispatch::<A>(
                tenant_id,
                aggregate_id,
                aggregate_type,
                command,
                make_aggregate,
            ),
            #[cfg(feature = "postgres")]
            AppServices::Persistent { dispatcher, .. } => dispatcher.dispatch::<A>(
                tenant_id,
                aggregate_id,
                aggregate_type,
                command,
                make_aggregate,
            ),
        }
    }

    /// Rehydrate an audit straight from the event store.
    ///
    /// The command path needs strongly consistent state (scope for sampling,
    /// item set for costing) and cannot wait on the projection to catch up.
    pub fn load_audit(
        &self,
        tenant_id: TenantId,
        audit_id: AuditId,
    ) -> Result<Audit, DispatchError> {
        let history = match self {
            AppServices::InMemory { event_store, .. } => {
                event_store.load_stream(tenant_id, audit_id.0)?
            }
            #[cfg(feature = "postgres")]
            AppServices::Persistent { event_store, .. } => {
                event_store.load_stream(tenant_id, audit_id.0)?
            }
        };

        let mut audit = Audit::empty(audit_id);
        for stored in &history {
            let event: AuditEvent = serde_json::from_value(stored.payload.clone())
                .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
            audit.apply(&event);
        }
        Ok(audit)
    }

    pub fn audit_get(&self, tenant_id: TenantId, audit_id: AuditId) -> Option<AuditReadModel> {
        match self {
            AppServices::InMemory { audits_projection, .. } => {
                audits_projection.get(tenant_id, audit_id)
            }
            #[cfg(feature = "postgres")]
            AppServices::Persistent { audits_projection, .. } => {
                audits_projection.get(tenant_id, audit_id)
            }
        }
    }

    pub fn audits_list(&self, tenant_id: TenantId) -> Vec<AuditReadModel> {
        match self {
            AppServices::InMemory { audits_projection, .. } => audits_projection.list(tenant_id),
            #[cfg(feature = "postgres")]
            AppServices::Persistent { audits_projection, .. } => audits_projection.list(tenant_id),
        }
    }

    pub fn audit_items(&self, tenant_id: TenantId, audit_id: AuditId) -> Option<Vec<AuditItem>> {
        match self {
            AppServices::InMemory { audits_projection, .. } => {
                audits_projection.items(tenant_id, audit_id)
            }
            #[cfg(feature = "postgres")]
            AppServices::Persistent { audits_projection, .. } => {
                audits_projection.items(tenant_id, audit_id)
            }
        }
    }

    pub fn audits_completed(&self, tenant_id: TenantId) -> Vec<AuditReadModel> {
        match self {
            AppServices::InMemory { audits_projection, .. } => {
                audits_projection.completed(tenant_id)
            }
            #[cfg(feature = "postgres")]
            AppServices::Persistent { audits_projection, .. } => {
                audits_projection.completed(tenant_id)
            }
        }
    }
}

/// Build an SSE stream for a tenant (used by `/stream`).
pub fn tenant_sse_stream(
    services: Arc<AppServices>,
    tenant_id: TenantId,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(m) if m.tenant_id == tenant_id => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
