use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use chrono::Utc;

use stocktake_audit::WarehouseId;
use stocktake_auth::Permission;
use stocktake_reports::{
    CompletedAuditSummary, ReportFilters, ReportFormat, ReportRequest, ReportType, generate,
};

use crate::app::routes::common::CmdAuth;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new().route("/compliance", post(generate_compliance_report))
}

pub async fn generate_compliance_report(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::GenerateReportRequest>,
) -> axum::response::Response {
    // Unknown report types are rejected before any audit data is read.
    let report_type: ReportType = match body.report_type.parse() {
        Ok(t) => t,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string());
        }
    };

    let format = match body.format.as_deref() {
        Some(s) => match errors::parse_report_format(s) {
            Ok(f) => f,
            Err(resp) => return resp,
        },
        None => ReportFormat::default(),
    };

    let audit_type = match body.filters.audit_type.as_deref() {
        Some(s) => match errors::parse_audit_type(s) {
            Ok(t) => Some(t),
            Err(resp) => return resp,
        },
        None => None,
    };

    let gate = CmdAuth {
        inner: (),
        required: vec![Permission::new("reports.generate")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &gate) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let request = ReportRequest {
        report_type,
        period_days: body.period_days,
        format,
        filters: ReportFilters {
            warehouse_id: body.filters.warehouse_id.map(WarehouseId::new),
            audit_type,
        },
        recipients: body.recipients,
    };

    // Point-in-time snapshot of the completed audits; no locks, no mutation.
    let summaries: Vec<CompletedAuditSummary> = services
        .audits_completed(tenant.tenant_id())
        .into_iter()
        .filter_map(|rm| {
            rm.completed_date.map(|completed_date| CompletedAuditSummary {
                audit_id: rm.audit_id,
                audit_number: rm.audit_number,
                audit_type: rm.audit_type,
                scope: rm.scope,
                completed_date,
                discrepancies: rm.discrepancies,
                adjustment_value_cents: rm.adjustment_value_cents,
            })
        })
        .collect();

    let job = generate(&request, &summaries, Utc::now());

    (StatusCode::ACCEPTED, Json(dto::report_job_to_json(&job))).into_response()
}
