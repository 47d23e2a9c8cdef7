//! Report job descriptors and generation.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stocktake_audit::{AuditId, AuditType, WarehouseId, WarehouseScope};
use stocktake_core::DomainError;

use crate::preview::DataPreview;

/// Unique report job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportJobId(pub Uuid);

impl ReportJobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ReportJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ReportJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The enumerated set of compliance reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    InventorySummary,
    DiscrepancyAnalysis,
    AuditTrail,
    ComplianceStatus,
    ValuationImpact,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::InventorySummary => "inventory_summary",
            ReportType::DiscrepancyAnalysis => "discrepancy_analysis",
            ReportType::AuditTrail => "audit_trail",
            ReportType::ComplianceStatus => "compliance_status",
            ReportType::ValuationImpact => "valuation_impact",
        }
    }

    /// Estimated rendering time per report kind. The trail report walks
    /// every event stream in the window, hence the widest estimate.
    pub fn duration_minutes(&self) -> i64 {
        match self {
            ReportType::InventorySummary => 2,
            ReportType::DiscrepancyAnalysis => 5,
            ReportType::AuditTrail => 10,
            ReportType::ComplianceStatus => 3,
            ReportType::ValuationImpact => 7,
        }
    }
}

impl std::fmt::Display for ReportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inventory_summary" => Ok(ReportType::InventorySummary),
            "discrepancy_analysis" => Ok(ReportType::DiscrepancyAnalysis),
            "audit_trail" => Ok(ReportType::AuditTrail),
            "compliance_status" => Ok(ReportType::ComplianceStatus),
            "valuation_impact" => Ok(ReportType::ValuationImpact),
            other => Err(DomainError::validation(format!(
                "unknown report type '{other}'"
            ))),
        }
    }
}

/// Output format of the rendered report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    #[default]
    Pdf,
    Csv,
    Xlsx,
}

/// Report job lifecycle status. Jobs are handed out Generating; the
/// renderer owns the rest of the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Generating,
    Ready,
    Failed,
}

/// Optional narrowing of the audit set feeding a report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFilters {
    pub warehouse_id: Option<WarehouseId>,
    pub audit_type: Option<AuditType>,
}

/// A report generation request, already validated at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub report_type: ReportType,
    pub period_days: u32,
    pub format: ReportFormat,
    pub filters: ReportFilters,
    pub recipients: Vec<String>,
}

/// The slice of a completed audit that report aggregation needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedAuditSummary {
    pub audit_id: AuditId,
    pub audit_number: u64,
    pub audit_type: AuditType,
    pub scope: WarehouseScope,
    pub completed_date: DateTime<Utc>,
    pub discrepancies: u32,
    pub adjustment_value_cents: i64,
}

impl CompletedAuditSummary {
    fn matches(&self, cutoff: DateTime<Utc>, filters: &ReportFilters) -> bool {
        if self.completed_date < cutoff {
            return false;
        }
        if let Some(audit_type) = filters.audit_type {
            if self.audit_type != audit_type {
                return false;
            }
        }
        if let Some(warehouse_id) = &filters.warehouse_id {
            // An all-warehouses audit covers every warehouse, so it matches
            // any warehouse filter.
            match &self.scope {
                WarehouseScope::Warehouse(w) if w != warehouse_id => return false,
                _ => {}
            }
        }
        true
    }
}

/// A report job descriptor handed back synchronously.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportJob {
    pub id: ReportJobId,
    pub report_type: ReportType,
    pub status: ReportStatus,
    pub format: ReportFormat,
    pub created_at: DateTime<Utc>,
    pub estimated_completion: DateTime<Utc>,
    pub filters: ReportFilters,
    pub recipients: Vec<String>,
    pub data_preview: DataPreview,
}

/// Build a Generating job over the completed audits in the request window.
///
/// Callers parse and validate `report_type` before touching any audit data,
/// so an unknown type never costs a query.
pub fn generate(
    request: &ReportRequest,
    completed_audits: &[CompletedAuditSummary],
    now: DateTime<Utc>,
) -> ReportJob {
    let cutoff = now - Duration::days(i64::from(request.period_days));
    let matched: Vec<&CompletedAuditSummary> = completed_audits
        .iter()
        .filter(|a| a.matches(cutoff, &request.filters))
        .collect();

    ReportJob {
        id: ReportJobId::new(),
        report_type: request.report_type,
        status: ReportStatus::Generating,
        format: request.format,
        created_at: now,
        estimated_completion: now + Duration::minutes(request.report_type.duration_minutes()),
        filters: request.filters.clone(),
        recipients: request.recipients.clone(),
        data_preview: DataPreview::from_audits(&matched),
    }
}
