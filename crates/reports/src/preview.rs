//! Synchronous aggregates shown to the caller before the report renders.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::CompletedAuditSummary;

/// Headline numbers over the audits a report will cover.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPreview {
    pub total_audits: u32,
    pub earliest_completed: Option<DateTime<Utc>>,
    pub latest_completed: Option<DateTime<Utc>>,
    pub audits_by_type: BTreeMap<String, u32>,
    pub warehouses: Vec<String>,
    pub total_discrepancies: u64,
    pub total_adjustment_value_cents: i64,
}

impl DataPreview {
    pub fn from_audits(audits: &[&CompletedAuditSummary]) -> Self {
        let mut preview = DataPreview {
            total_audits: audits.len() as u32,
            ..DataPreview::default()
        };
        let mut warehouses: Vec<String> = Vec::new();

        for audit in audits {
            preview.earliest_completed = Some(match preview.earliest_completed {
                Some(d) => d.min(audit.completed_date),
                None => audit.completed_date,
            });
            preview.latest_completed = Some(match preview.latest_completed {
                Some(d) => d.max(audit.completed_date),
                None => audit.completed_date,
            });
            *preview
                .audits_by_type
                .entry(audit.audit_type.as_str().to_string())
                .or_insert(0) += 1;
            warehouses.push(audit.scope.label());
            preview.total_discrepancies += u64::from(audit.discrepancies);
            preview.total_adjustment_value_cents += audit.adjustment_value_cents;
        }

        warehouses.sort();
        warehouses.dedup();
        preview.warehouses = warehouses;
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use stocktake_audit::{AuditId, AuditType, WarehouseId, WarehouseScope};
    use stocktake_core::AggregateId;

    fn audit(scope: WarehouseScope, days_ago: i64) -> CompletedAuditSummary {
        CompletedAuditSummary {
            audit_id: AuditId::new(AggregateId::new()),
            audit_number: 1,
            audit_type: AuditType::CycleCount,
            scope,
            completed_date: Utc::now() - Duration::days(days_ago),
            discrepancies: 3,
            adjustment_value_cents: -50,
        }
    }

    #[test]
    fn empty_input_yields_an_empty_preview() {
        let preview = DataPreview::from_audits(&[]);
        assert_eq!(preview, DataPreview::default());
    }

    #[test]
    fn aggregates_sum_and_warehouses_dedupe() {
        let w1 = WarehouseScope::Warehouse(WarehouseId::new("W1"));
        let a = audit(w1.clone(), 1);
        let b = audit(w1, 9);
        let c = audit(WarehouseScope::AllWarehouses, 4);

        let preview = DataPreview::from_audits(&[&a, &b, &c]);
        assert_eq!(preview.total_audits, 3);
        assert_eq!(preview.total_discrepancies, 9);
        assert_eq!(preview.total_adjustment_value_cents, -150);
        assert_eq!(preview.warehouses, vec!["W1".to_string(), "all".to_string()]);
        assert_eq!(preview.earliest_completed, Some(b.completed_date));
        assert_eq!(preview.latest_completed, Some(a.completed_date));
    }

    #[test]
    fn type_counts_key_by_snake_case_name() {
        let a = audit(WarehouseScope::AllWarehouses, 1);
        let preview = DataPreview::from_audits(&[&a]);
        assert_eq!(preview.audits_by_type.get("cycle_count"), Some(&1));
    }
}
