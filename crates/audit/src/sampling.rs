//! Item sampling policy: which inventory rows an audit will verify.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::item::{AuditItem, AuditItemId, AuditItemStatus, InventoryItemId, ProductId, VariantId};
use crate::status::{WarehouseId, WarehouseScope};

/// Per-run item cap for a warehouse-scoped audit.
pub const WAREHOUSE_SAMPLE_CAP: usize = 100;

/// Per-run item cap for a whole-inventory audit. Deliberately tighter:
/// full-inventory audits are expensive and rare, cycle counts are the
/// common case and get the larger warehouse-local cap.
pub const FULL_INVENTORY_SAMPLE_CAP: usize = 50;

/// A point-in-time view of one inventory row, as presented by the external
/// stock store at sampling time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRow {
    pub inventory_item_id: InventoryItemId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub warehouse_id: WarehouseId,
    pub product_name: String,
    pub variant_name: Option<String>,
    pub on_hand: i64,
}

pub fn sample_cap(scope: &WarehouseScope) -> usize {
    match scope {
        WarehouseScope::Warehouse(_) => WAREHOUSE_SAMPLE_CAP,
        WarehouseScope::AllWarehouses => FULL_INVENTORY_SAMPLE_CAP,
    }
}

/// Select the rows an audit will verify and freeze them as pending items.
///
/// Eligibility: positive on-hand quantity, and (for warehouse-scoped
/// audits) the matching warehouse. The same inventory row never produces
/// two items; selection order beyond the cap is not significant.
pub fn sample_items(scope: &WarehouseScope, rows: &[StockRow]) -> Vec<AuditItem> {
    let cap = sample_cap(scope);
    let mut seen: HashSet<InventoryItemId> = HashSet::new();
    let mut items = Vec::new();

    for row in rows {
        if items.len() >= cap {
            break;
        }
        if row.on_hand <= 0 {
            continue;
        }
        if let WarehouseScope::Warehouse(w) = scope {
            if row.warehouse_id != *w {
                continue;
            }
        }
        if !seen.insert(row.inventory_item_id) {
            continue;
        }

        items.push(AuditItem {
            id: AuditItemId::new(),
            product_id: row.product_id,
            variant_id: row.variant_id,
            warehouse_id: row.warehouse_id.clone(),
            inventory_item_id: row.inventory_item_id,
            product_name: row.product_name.clone(),
            variant_name: row.variant_name.clone(),
            expected_quantity: row.on_hand,
            counted_quantity: None,
            status: AuditItemStatus::Pending,
            counted_by: None,
            counted_at: None,
            verified_by: None,
            verified_at: None,
            discrepancy_reason: None,
            notes: None,
        });
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(warehouse: &str, on_hand: i64) -> StockRow {
        StockRow {
            inventory_item_id: InventoryItemId::new(),
            product_id: ProductId::new(),
            variant_id: None,
            warehouse_id: WarehouseId::new(warehouse),
            product_name: "widget".to_string(),
            variant_name: None,
            on_hand,
        }
    }

    #[test]
    fn warehouse_scope_caps_at_one_hundred() {
        let rows: Vec<StockRow> = (0..150).map(|_| row("W1", 5)).collect();
        let scope = WarehouseScope::Warehouse(WarehouseId::new("W1"));

        let items = sample_items(&scope, &rows);
        assert_eq!(items.len(), 100);
    }

    #[test]
    fn full_inventory_scope_caps_at_fifty() {
        let rows: Vec<StockRow> = (0..80).map(|i| row(if i % 2 == 0 { "W1" } else { "W2" }, 3)).collect();

        let items = sample_items(&WarehouseScope::AllWarehouses, &rows);
        assert_eq!(items.len(), 50);
    }

    #[test]
    fn zero_and_negative_quantity_rows_are_ineligible() {
        let rows = vec![row("W1", 0), row("W1", -2), row("W1", 4)];
        let scope = WarehouseScope::Warehouse(WarehouseId::new("W1"));

        let items = sample_items(&scope, &rows);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].expected_quantity, 4);
    }

    #[test]
    fn rows_outside_the_scoped_warehouse_are_skipped() {
        let rows = vec![row("W1", 4), row("W2", 9), row("W1", 2)];
        let scope = WarehouseScope::Warehouse(WarehouseId::new("W1"));

        let items = sample_items(&scope, &rows);
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.warehouse_id.as_str() == "W1"));
    }

    #[test]
    fn the_same_inventory_row_never_appears_twice() {
        let mut dup = row("W1", 6);
        dup.on_hand = 6;
        let rows = vec![dup.clone(), dup.clone(), row("W1", 1)];
        let scope = WarehouseScope::Warehouse(WarehouseId::new("W1"));

        let items = sample_items(&scope, &rows);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn expected_quantity_snapshots_on_hand() {
        let rows = vec![row("W1", 42)];
        let scope = WarehouseScope::Warehouse(WarehouseId::new("W1"));

        let items = sample_items(&scope, &rows);
        assert_eq!(items[0].expected_quantity, 42);
        assert_eq!(items[0].counted_quantity, None);
        assert_eq!(items[0].status, AuditItemStatus::Pending);
    }
}
