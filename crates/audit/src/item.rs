//! Audit items: one counting task per sampled inventory row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stocktake_core::UserId;

use crate::status::WarehouseId;

macro_rules! impl_item_uuid_newtype {
    ($(#[$meta:meta])* $t:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(Uuid);

        impl $t {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl core::str::FromStr for $t {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::from_str(s)?))
            }
        }
    };
}

impl_item_uuid_newtype!(
    /// Identifier of one counting task within an audit.
    AuditItemId
);
impl_item_uuid_newtype!(
    /// Identifier of a product in the external catalog.
    ProductId
);
impl_item_uuid_newtype!(
    /// Identifier of a product variant in the external catalog.
    VariantId
);
impl_item_uuid_newtype!(
    /// Identifier of the inventory row the item was sampled from.
    InventoryItemId
);

/// Counting status of one audit item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditItemStatus {
    /// Sampled, not yet counted.
    Pending,
    /// Counted; counted quantity matches expected.
    Counted,
    /// Count reviewed and signed off by a second person.
    Verified,
    /// Counted; counted quantity differs from expected.
    Discrepancy,
}

/// One sampled inventory row to verify.
///
/// `expected_quantity` is a snapshot taken at sampling time and never
/// mutated afterwards. Product and variant names are snapshotted alongside
/// so item listings can sort without a catalog join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditItem {
    pub id: AuditItemId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub warehouse_id: WarehouseId,
    pub inventory_item_id: InventoryItemId,
    pub product_name: String,
    pub variant_name: Option<String>,
    pub expected_quantity: i64,
    pub counted_quantity: Option<i64>,
    pub status: AuditItemStatus,
    pub counted_by: Option<UserId>,
    pub counted_at: Option<DateTime<Utc>>,
    pub verified_by: Option<UserId>,
    pub verified_at: Option<DateTime<Utc>>,
    pub discrepancy_reason: Option<String>,
    pub notes: Option<String>,
}

impl AuditItem {
    /// Counted minus expected; None until a count has been submitted.
    ///
    /// Always derived from the latest count, never stored independently.
    pub fn variance(&self) -> Option<i64> {
        self.counted_quantity.map(|c| c - self.expected_quantity)
    }

    pub fn is_counted(&self) -> bool {
        self.counted_quantity.is_some()
    }

    pub fn is_discrepant(&self) -> bool {
        matches!(self.variance(), Some(v) if v != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_item(expected: i64) -> AuditItem {
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

    #[test]
    fn variance_is_a_pure_function_of_the_count() {
        let mut item = pending_item(10);
        assert_eq!(item.variance(), None);
        assert!(!item.is_discrepant());

        item.counted_quantity = Some(10);
        assert_eq!(item.variance(), Some(0));
        assert!(!item.is_discrepant());

        item.counted_quantity = Some(7);
        assert_eq!(item.variance(), Some(-3));
        assert!(item.is_discrepant());
    }
}
