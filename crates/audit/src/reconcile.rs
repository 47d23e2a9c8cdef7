//! Reconciliation: fold counted items into the totals a completed audit
//! carries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::item::{AuditItem, ProductId};

/// Totals derived from an audit's items at completion time. Values are in
/// minor currency units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationTotals {
    pub items_counted: u32,
    pub discrepancies: u32,
    pub adjustment_value_cents: i64,
}

/// Compute completion totals. A pure fold over the items: counting an item
/// twice in the input would double it, but items are keyed by id upstream
/// so each appears once. Items with no unit cost on record contribute zero
/// to the adjustment value. Running this twice over the same items yields
/// the same totals.
pub fn reconcile(
    items: &[AuditItem],
    unit_costs_cents: &BTreeMap<ProductId, i64>,
) -> ReconciliationTotals {
    let mut totals = ReconciliationTotals::default();

    for item in items {
        if !item.is_counted() {
            continue;
        }
        totals.items_counted += 1;

        let variance = item.variance().unwrap_or(0);
        if variance != 0 {
            totals.discrepancies += 1;
            let cost = unit_costs_cents.get(&item.product_id).copied().unwrap_or(0);
            totals.adjustment_value_cents += variance * cost;
        }
    }

    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{AuditItemId, AuditItemStatus, InventoryItemId, VariantId};
    use crate::status::WarehouseId;

    fn item(product_id: ProductId, expected: i64, counted: Option<i64>) -> AuditItem {
        let status = match counted {
            None => AuditItemStatus::Pending,
            Some(c) if c == expected => AuditItemStatus::Counted,
            Some(_) => AuditItemStatus::Discrepancy,
        };
        AuditItem {
            id: AuditItemId::new(),
            product_id,
            variant_id: None::<VariantId>,
            warehouse_id: WarehouseId::new("W1"),
            inventory_item_id: InventoryItemId::new(),
            product_name: "widget".to_string(),
            variant_name: None,
            expected_quantity: expected,
            counted_quantity: counted,
            status,
            counted_by: None,
            counted_at: None,
            verified_by: None,
            verified_at: None,
            discrepancy_reason: None,
            notes: None,
        }
    }

    #[test]
    fn counts_and_discrepancies() {
        let p = ProductId::new();
        let items = vec![
            item(p, 10, Some(10)),
            item(p, 5, Some(3)),
            item(p, 2, Some(4)),
            item(p, 8, None),
        ];
        let costs = BTreeMap::from([(p, 150)]);

        let totals = reconcile(&items, &costs);
        assert_eq!(totals.items_counted, 3);
        assert_eq!(totals.discrepancies, 2);
        // (3 - 5) * 150 + (4 - 2) * 150
        assert_eq!(totals.adjustment_value_cents, 0);
    }

    #[test]
    fn missing_unit_cost_contributes_zero() {
        let known = ProductId::new();
        let unknown = ProductId::new();
        let items = vec![item(known, 10, Some(7)), item(unknown, 10, Some(7))];
        let costs = BTreeMap::from([(known, 200)]);

        let totals = reconcile(&items, &costs);
        assert_eq!(totals.discrepancies, 2);
        assert_eq!(totals.adjustment_value_cents, -3 * 200);
    }

    #[test]
    fn uncounted_items_are_ignored() {
        let p = ProductId::new();
        let items = vec![item(p, 4, None), item(p, 4, None)];

        let totals = reconcile(&items, &BTreeMap::new());
        assert_eq!(totals, ReconciliationTotals::default());
    }

    #[test]
    fn reconciliation_is_idempotent() {
        let p = ProductId::new();
        let items = vec![item(p, 10, Some(8)), item(p, 3, Some(3))];
        let costs = BTreeMap::from([(p, 50)]);

        let first = reconcile(&items, &costs);
        let second = reconcile(&items, &costs);
        assert_eq!(first, second);
        assert_eq!(first.adjustment_value_cents, -100);
    }
}
