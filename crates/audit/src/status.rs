//! Audit lifecycle status, audit type, and warehouse scope.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use stocktake_core::{DomainError, DomainResult};

/// Kind of stock-verification campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditType {
    FullInventory,
    CycleCount,
    SpotCheck,
}

impl AuditType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditType::FullInventory => "full_inventory",
            AuditType::CycleCount => "cycle_count",
            AuditType::SpotCheck => "spot_check",
        }
    }
}

impl core::fmt::Display for AuditType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full_inventory" => Ok(AuditType::FullInventory),
            "cycle_count" => Ok(AuditType::CycleCount),
            "spot_check" => Ok(AuditType::SpotCheck),
            other => Err(DomainError::validation(format!(
                "unknown audit type '{other}'"
            ))),
        }
    }
}

/// Audit status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Planned,
    InProgress,
    Completed,
    Cancelled,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Planned => "planned",
            AuditStatus::InProgress => "in_progress",
            AuditStatus::Completed => "completed",
            AuditStatus::Cancelled => "cancelled",
        }
    }

    /// The complete transition table. Completed is terminal; a cancelled
    /// audit may be reactivated back to planned.
    pub fn allowed_transitions(self) -> &'static [AuditStatus] {
        match self {
            AuditStatus::Planned => &[AuditStatus::InProgress, AuditStatus::Cancelled],
            AuditStatus::InProgress => &[AuditStatus::Completed, AuditStatus::Cancelled],
            AuditStatus::Completed => &[],
            AuditStatus::Cancelled => &[AuditStatus::Planned],
        }
    }

    pub fn can_transition_to(self, next: AuditStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }
}

impl core::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(AuditStatus::Planned),
            "in_progress" => Ok(AuditStatus::InProgress),
            "completed" => Ok(AuditStatus::Completed),
            "cancelled" => Ok(AuditStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown audit status '{other}'"
            ))),
        }
    }
}

/// Gate a requested status change through the transition table.
///
/// The rejection names the attempted pair so callers can surface it as-is.
pub fn ensure_transition(from: AuditStatus, to: AuditStatus) -> DomainResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(DomainError::invalid_transition(from, to))
    }
}

/// Identifier of a warehouse (external master data; opaque code like "W1").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarehouseId(String);

impl WarehouseId {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for WarehouseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scope of an audit: one warehouse, or the whole inventory.
///
/// Serialized as a plain string ("all", or the warehouse code) to match the
/// wire shape callers send.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WarehouseScope {
    Warehouse(WarehouseId),
    AllWarehouses,
}

impl WarehouseScope {
    /// Stable label: the warehouse code, or "all".
    pub fn label(&self) -> String {
        match self {
            WarehouseScope::Warehouse(w) => w.as_str().to_string(),
            WarehouseScope::AllWarehouses => "all".to_string(),
        }
    }
}

impl From<String> for WarehouseScope {
    fn from(value: String) -> Self {
        if value == "all" {
            WarehouseScope::AllWarehouses
        } else {
            WarehouseScope::Warehouse(WarehouseId::new(value))
        }
    }
}

impl From<WarehouseScope> for String {
    fn from(value: WarehouseScope) -> Self {
        value.label()
    }
}

impl core::fmt::Display for WarehouseScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL: [AuditStatus; 4] = [
        AuditStatus::Planned,
        AuditStatus::InProgress,
        AuditStatus::Completed,
        AuditStatus::Cancelled,
    ];

    #[test]
    fn table_matches_the_lifecycle() {
        use AuditStatus::*;

        assert!(Planned.can_transition_to(InProgress));
        assert!(Planned.can_transition_to(Cancelled));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Cancelled));
        assert!(Cancelled.can_transition_to(Planned));

        assert!(Completed.allowed_transitions().is_empty());
        assert!(!Planned.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Planned));
    }

    #[test]
    fn rejection_reports_the_attempted_pair() {
        let err = ensure_transition(AuditStatus::Completed, AuditStatus::InProgress).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid transition: completed -> in_progress"
        );
    }

    #[test]
    fn scope_round_trips_through_strings() {
        assert_eq!(
            WarehouseScope::from("all".to_string()),
            WarehouseScope::AllWarehouses
        );
        let scope = WarehouseScope::from("W1".to_string());
        assert_eq!(scope, WarehouseScope::Warehouse(WarehouseId::new("W1")));
        assert_eq!(scope.label(), "W1");
    }

    proptest! {
        /// The table is the only path: every pair is either listed in
        /// `allowed_transitions` or rejected, never both.
        #[test]
        fn every_pair_is_table_or_rejection(from_idx in 0usize..4, to_idx in 0usize..4) {
            let from = ALL[from_idx];
            let to = ALL[to_idx];

            let listed = from.allowed_transitions().contains(&to);
            let outcome = ensure_transition(from, to);

            prop_assert_eq!(listed, outcome.is_ok());
            if let Err(e) = outcome {
                prop_assert_eq!(
                    e.to_string(),
                    format!("invalid transition: {from} -> {to}")
                );
            }
        }
    }
}
