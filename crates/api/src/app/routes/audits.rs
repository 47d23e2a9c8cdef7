use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use stocktake_audit::{
    Audit, AuditCommand, AuditId, AuditItemId, AuditStatus, CancelAudit, CompleteAudit,
    DeleteAudit, PlanAudit, ProductId, ReactivateAudit, RecordCount, RunAudit, UpdateDetails,
    VerifyItem, WarehouseScope, sample_items,
};
use stocktake_auth::Permission;
use stocktake_core::{AggregateId, TenantId, UserId};
use stocktake_infra::command_dispatcher::DispatchError;

use crate::app::routes::common::CmdAuth;
use crate::app::services::{AUDIT_AGGREGATE_TYPE, AppServices};
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_audit).get(list_audits))
        .route(
            "/:id",
            get(get_audit).patch(patch_audit).delete(delete_audit),
        )
        .route("/:id/run", post(run_audit))
        .route("/:id/items", get(list_audit_items))
        .route("/:id/items/:item_id/count", post(record_count))
        .route("/:id/items/:item_id/verify", post(verify_item))
}

pub async fn create_audit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateAuditRequest>,
) -> axum::response::Response {
    let audit_type = match errors::parse_audit_type(&body.audit_type) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let scope = WarehouseScope::from(body.warehouse_scope);

    let agg = AggregateId::new();
    let audit_id = AuditId::new(agg);
    let now = Utc::now();
    let audit_number = services.next_audit_number(tenant.tenant_id());

    let cmd = AuditCommand::PlanAudit(PlanAudit {
        tenant_id: tenant.tenant_id(),
        audit_id,
        audit_number,
        audit_type,
        scope,
        planned_date: body.planned_date.unwrap_or(now),
        notes: body.notes,
        supervised_by: body.supervised_by,
        occurred_at: now,
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("audits.manage")],
    };

    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let committed = match dispatch_audit(&services, tenant.tenant_id(), audit_id, cmd_auth.inner) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": agg.to_string(),
            "audit_number": audit_number,
            "events_committed": committed,
        })),
    )
        .into_response()
}

pub async fn list_audits(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    let audits: Vec<serde_json::Value> = services
        .audits_list(tenant.tenant_id())
        .iter()
        .map(dto::audit_to_json)
        .collect();

    (StatusCode::OK, Json(audits)).into_response()
}

pub async fn get_audit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let audit_id = match parse_audit_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.audit_get(tenant.tenant_id(), audit_id) {
        Some(rm) => (StatusCode::OK, Json(dto::audit_to_json(&rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "audit not found"),
    }
}

pub async fn run_audit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let audit_id = match parse_audit_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let gate = CmdAuth {
        inner: (),
        required: vec![Permission::new("audits.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &gate) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match start_audit(&services, tenant.tenant_id(), audit_id) {
        Ok((generated, _committed)) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "started",
                "items_generated": generated,
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn patch_audit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::PatchAuditRequest>,
) -> axum::response::Response {
    let audit_id = match parse_audit_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let gate = CmdAuth {
        inner: (),
        required: vec![Permission::new("audits.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &gate) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let tenant_id = tenant.tenant_id();

    // Detail fields are lifecycle-independent and land before any status
    // change carried by the same request.
    if body.has_detail_fields() {
        let cmd = AuditCommand::UpdateDetails(UpdateDetails {
            tenant_id,
            audit_id,
            planned_date: body.planned_date,
            notes: body.notes.clone(),
            supervised_by: body.supervised_by,
            occurred_at: Utc::now(),
        });
        if let Err(e) = dispatch_audit(&services, tenant_id, audit_id, cmd) {
            return errors::dispatch_error_to_response(e);
        }
    }

    if let Some(status) = body.status.as_deref() {
        let target: AuditStatus = match status.parse() {
            Ok(s) => s,
            Err(_) => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "validation_error",
                    "status must be one of: planned, in_progress, completed, cancelled",
                );
            }
        };

        let result = match target {
            AuditStatus::InProgress => {
                start_audit(&services, tenant_id, audit_id).map(|(_, committed)| committed)
            }
            AuditStatus::Completed => complete_audit(&services, tenant_id, audit_id),
            AuditStatus::Cancelled => dispatch_audit(
                &services,
                tenant_id,
                audit_id,
                AuditCommand::CancelAudit(CancelAudit {
                    tenant_id,
                    audit_id,
                    occurred_at: Utc::now(),
                }),
            ),
            AuditStatus::Planned => dispatch_audit(
                &services,
                tenant_id,
                audit_id,
                AuditCommand::ReactivateAudit(ReactivateAudit {
                    tenant_id,
                    audit_id,
                    occurred_at: Utc::now(),
                }),
            ),
        };

        if let Err(e) = result {
            return errors::dispatch_error_to_response(e);
        }
    }

    // The response carries the post-patch state. Reading back through the
    // event store keeps it consistent with the commands just committed.
    let audit = match services.load_audit(tenant_id, audit_id) {
        Ok(a) if a.tenant_id() == Some(tenant_id) && !a.is_deleted() => a,
        Ok(_) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "audit not found"),
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (StatusCode::OK, Json(dto::audit_state_to_json(&audit))).into_response()
}

pub async fn delete_audit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let audit_id = match parse_audit_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = AuditCommand::DeleteAudit(DeleteAudit {
        tenant_id: tenant.tenant_id(),
        audit_id,
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("audits.manage")],
    };

    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match dispatch_audit(&services, tenant.tenant_id(), audit_id, cmd_auth.inner) {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": audit_id.0.to_string(),
                "deleted": true,
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_audit_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let audit_id = match parse_audit_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.audit_items(tenant.tenant_id(), audit_id) {
        Some(items) => {
            let items: Vec<serde_json::Value> = items.iter().map(dto::item_to_json).collect();
            (StatusCode::OK, Json(items)).into_response()
        }
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "audit not found"),
    }
}

pub async fn record_count(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, item_id)): Path<(String, String)>,
    Json(body): Json<dto::RecordCountRequest>,
) -> axum::response::Response {
    let audit_id = match parse_audit_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let item_id: AuditItemId = match item_id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid item id"),
    };

    let cmd = AuditCommand::RecordCount(RecordCount {
        tenant_id: tenant.tenant_id(),
        audit_id,
        item_id,
        counted_quantity: body.counted_quantity,
        counted_by: principal_user_id(&principal),
        discrepancy_reason: body.discrepancy_reason,
        notes: body.notes,
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("audits.count")],
    };

    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match dispatch_audit(&services, tenant.tenant_id(), audit_id, cmd_auth.inner) {
        Ok(committed) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "audit_id": audit_id.0.to_string(),
                "item_id": item_id.to_string(),
                "events_committed": committed,
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn verify_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, item_id)): Path<(String, String)>,
) -> axum::response::Response {
    let audit_id = match parse_audit_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let item_id: AuditItemId = match item_id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid item id"),
    };

    let cmd = AuditCommand::VerifyItem(VerifyItem {
        tenant_id: tenant.tenant_id(),
        audit_id,
        item_id,
        verified_by: principal_user_id(&principal),
        occurred_at: Utc::now(),
    });

    let cmd_auth = CmdAuth {
        inner: cmd,
        required: vec![Permission::new("audits.verify")],
    };

    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    match dispatch_audit(&services, tenant.tenant_id(), audit_id, cmd_auth.inner) {
        Ok(committed) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "audit_id": audit_id.0.to_string(),
                "item_id": item_id.to_string(),
                "events_committed": committed,
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// The RUN action: sample from the current stock snapshot and flip the
/// audit to in-progress as one command. The aggregate enforces single-shot
/// semantics, so a concurrent run loses with an invalid-transition error.
fn start_audit(
    services: &AppServices,
    tenant_id: TenantId,
    audit_id: AuditId,
) -> Result<(usize, usize), DispatchError> {
    match try_start_audit(services, tenant_id, audit_id) {
        // A raced run can fail the version check before it reaches the
        // status check. Retrying reloads the stream, so the loser reports
        // the transition rejection instead of a write conflict.
        Err(DispatchError::Concurrency(_)) => try_start_audit(services, tenant_id, audit_id),
        other => other,
    }
}

fn try_start_audit(
    services: &AppServices,
    tenant_id: TenantId,
    audit_id: AuditId,
) -> Result<(usize, usize), DispatchError> {
    let audit = services.load_audit(tenant_id, audit_id)?;
    if audit.tenant_id() != Some(tenant_id) {
        return Err(DispatchError::NotFound);
    }

    let rows = services.stock_rows(tenant_id, audit.scope());
    let items = sample_items(audit.scope(), &rows);
    let generated = items.len();

    let cmd = AuditCommand::RunAudit(RunAudit {
        tenant_id,
        audit_id,
        items,
        occurred_at: Utc::now(),
    });

    let committed = dispatch_audit(services, tenant_id, audit_id, cmd)?;
    Ok((generated, committed))
}

/// The COMPLETE action: look up a unit cost per sampled product and let the
/// aggregate reconcile. Missing costs are simply absent from the map.
fn complete_audit(
    services: &AppServices,
    tenant_id: TenantId,
    audit_id: AuditId,
) -> Result<usize, DispatchError> {
    let audit = services.load_audit(tenant_id, audit_id)?;
    if audit.tenant_id() != Some(tenant_id) {
        return Err(DispatchError::NotFound);
    }

    let mut unit_costs_cents: BTreeMap<ProductId, i64> = BTreeMap::new();
    for item in audit.items() {
        if let Some(cents) = services.unit_cost_cents(tenant_id, item.product_id) {
            unit_costs_cents.insert(item.product_id, cents);
        }
    }

    let cmd = AuditCommand::CompleteAudit(CompleteAudit {
        tenant_id,
        audit_id,
        unit_costs_cents,
        occurred_at: Utc::now(),
    });

    dispatch_audit(services, tenant_id, audit_id, cmd)
}

fn dispatch_audit(
    services: &AppServices,
    tenant_id: TenantId,
    audit_id: AuditId,
    command: AuditCommand,
) -> Result<usize, DispatchError> {
    let committed = services.dispatch::<Audit>(
        tenant_id,
        audit_id.0,
        AUDIT_AGGREGATE_TYPE,
        command,
        |_, id| Audit::empty(AuditId::new(id)),
    )?;
    Ok(committed.len())
}

fn parse_audit_id(id: &str) -> Result<AuditId, axum::response::Response> {
    id.parse::<AggregateId>()
        .map(AuditId::new)
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid audit id"))
}

fn principal_user_id(principal: &PrincipalContext) -> UserId {
    UserId::from_uuid(*principal.principal_id().as_uuid())
}
