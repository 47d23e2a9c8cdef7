use chrono::{DateTime, Utc};
use serde::Deserialize;

use stocktake_audit::{Audit, AuditItem};
use stocktake_core::{AggregateRoot, UserId};
use stocktake_infra::projections::AuditReadModel;
use stocktake_reports::ReportJob;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateAuditRequest {
    #[serde(rename = "type")]
    pub audit_type: String,
    /// A warehouse code, or "all" for a whole-inventory audit.
    pub warehouse_scope: String,
    pub planned_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub supervised_by: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct PatchAuditRequest {
    /// Target lifecycle status; absent means detail-only patch.
    pub status: Option<String>,
    pub planned_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub supervised_by: Option<UserId>,
}

impl PatchAuditRequest {
    pub fn has_detail_fields(&self) -> bool {
        self.planned_date.is_some() || self.notes.is_some() || self.supervised_by.is_some()
    }
}

#[derive(Debug, Deserialize)]
pub struct RecordCountRequest {
    pub counted_quantity: i64,
    pub discrepancy_reason: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ReportFiltersRequest {
    pub warehouse_id: Option<String>,
    pub audit_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateReportRequest {
    pub report_type: String,
    /// Window in days over completed audits.
    pub period_days: u32,
    pub format: Option<String>,
    #[serde(default)]
    pub filters: ReportFiltersRequest,
    #[serde(default)]
    pub recipients: Vec<String>,
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn audit_to_json(rm: &AuditReadModel) -> serde_json::Value {
    serde_json::json!({
        "id": rm.audit_id.0.to_string(),
        "audit_number": rm.audit_number,
        "type": rm.audit_type.as_str(),
        "warehouse_scope": rm.scope.label(),
        "status": rm.status.as_str(),
        "planned_date": rm.planned_date.to_rfc3339(),
        "started_date": rm.started_date.map(|d| d.to_rfc3339()),
        "completed_date": rm.completed_date.map(|d| d.to_rfc3339()),
        "items_planned": rm.items_planned,
        "items_counted": rm.items_counted,
        "discrepancies": rm.discrepancies,
        "adjustment_value_cents": rm.adjustment_value_cents,
        "notes": &rm.notes,
        "supervised_by": rm.supervised_by.map(|u| u.to_string()),
        "version": rm.version,
    })
}

/// Same shape as [`audit_to_json`], sourced from the rehydrated aggregate.
/// Command routes answer with this so the caller never races the projection.
pub fn audit_state_to_json(audit: &Audit) -> serde_json::Value {
    serde_json::json!({
        "id": audit.id_typed().0.to_string(),
        "audit_number": audit.audit_number(),
        "type": audit.audit_type().as_str(),
        "warehouse_scope": audit.scope().label(),
        "status": audit.status().as_str(),
        "planned_date": audit.planned_date().to_rfc3339(),
        "started_date": audit.started_date().map(|d| d.to_rfc3339()),
        "completed_date": audit.completed_date().map(|d| d.to_rfc3339()),
        "items_planned": audit.items_planned(),
        "items_counted": audit.items_counted(),
        "discrepancies": audit.discrepancies(),
        "adjustment_value_cents": audit.adjustment_value_cents(),
        "notes": audit.notes(),
        "supervised_by": audit.supervised_by().map(|u| u.to_string()),
        "version": audit.version(),
    })
}

pub fn item_to_json(item: &AuditItem) -> serde_json::Value {
    serde_json::json!({
        "id": item.id.to_string(),
        "product_id": item.product_id.to_string(),
        "variant_id": item.variant_id.map(|v| v.to_string()),
        "warehouse_id": item.warehouse_id.as_str(),
        "inventory_item_id": item.inventory_item_id.to_string(),
        "product_name": &item.product_name,
        "variant_name": &item.variant_name,
        "expected_quantity": item.expected_quantity,
        "counted_quantity": item.counted_quantity,
        "variance": item.variance(),
        "status": item.status,
        "counted_by": item.counted_by.map(|u| u.to_string()),
        "counted_at": item.counted_at.map(|d| d.to_rfc3339()),
        "verified_by": item.verified_by.map(|u| u.to_string()),
        "verified_at": item.verified_at.map(|d| d.to_rfc3339()),
        "discrepancy_reason": &item.discrepancy_reason,
        "notes": &item.notes,
    })
}

pub fn report_job_to_json(job: &ReportJob) -> serde_json::Value {
    let id = job.id.0.to_string();
    serde_json::json!({
        "job_id": id,
        "report_type": job.report_type.as_str(),
        "status": job.status,
        "format": job.format,
        "created_at": job.created_at.to_rfc3339(),
        "estimated_completion": job.estimated_completion.to_rfc3339(),
        "status_url": format!("/reports/{id}"),
        "download_url": format!("/reports/{id}/download"),
        "data_preview": serde_json::to_value(&job.data_preview)
            .unwrap_or_else(|_| serde_json::json!({})),
    })
}
