//! External data the audit flow samples from.
//!
//! Stock levels and unit costs are owned by other systems; audits only
//! read point-in-time snapshots of them. These traits keep the command
//! path testable with seeded in-memory fixtures.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use stocktake_audit::{ProductId, StockRow, WarehouseScope};
use stocktake_core::TenantId;

/// Point-in-time view of inventory rows, scoped to a tenant.
///
/// Implementations return raw rows; eligibility filtering and capping are
/// the sampling policy's job.
pub trait StockSnapshotSource: Send + Sync {
    fn stock_rows(&self, tenant_id: TenantId, scope: &WarehouseScope) -> Vec<StockRow>;
}

impl<S> StockSnapshotSource for Arc<S>
where
    S: StockSnapshotSource + ?Sized,
{
    fn stock_rows(&self, tenant_id: TenantId, scope: &WarehouseScope) -> Vec<StockRow> {
        (**self).stock_rows(tenant_id, scope)
    }
}

/// Unit cost lookup for reconciliation. `None` means no cost on record.
pub trait UnitCostSource: Send + Sync {
    fn unit_cost_cents(&self, tenant_id: TenantId, product_id: ProductId) -> Option<i64>;
}

impl<S> UnitCostSource for Arc<S>
where
    S: UnitCostSource + ?Sized,
{
    fn unit_cost_cents(&self, tenant_id: TenantId, product_id: ProductId) -> Option<i64> {
        (**self).unit_cost_cents(tenant_id, product_id)
    }
}

/// Seedable in-memory stock levels for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryStockLevels {
    rows: RwLock<HashMap<TenantId, Vec<StockRow>>>,
}

impl InMemoryStockLevels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, tenant_id: TenantId, rows: Vec<StockRow>) {
        if let Ok(mut map) = self.rows.write() {
            map.entry(tenant_id).or_default().extend(rows);
        }
    }
}

impl StockSnapshotSource for InMemoryStockLevels {
    fn stock_rows(&self, tenant_id: TenantId, _scope: &WarehouseScope) -> Vec<StockRow> {
        let map = match self.rows.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };
        map.get(&tenant_id).cloned().unwrap_or_default()
    }
}

/// Seedable in-memory unit costs for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryUnitCosts {
    costs: RwLock<HashMap<(TenantId, ProductId), i64>>,
}

impl InMemoryUnitCosts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, tenant_id: TenantId, product_id: ProductId, cents: i64) {
        if let Ok(mut map) = self.costs.write() {
            map.insert((tenant_id, product_id), cents);
        }
    }
}

impl UnitCostSource for InMemoryUnitCosts {
    fn unit_cost_cents(&self, tenant_id: TenantId, product_id: ProductId) -> Option<i64> {
        let map = self.costs.read().ok()?;
        map.get(&(tenant_id, product_id)).copied()
    }
}
