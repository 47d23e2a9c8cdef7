use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stocktake_audit::AuditType;
use stocktake_infra::command_dispatcher::DispatchError;
use stocktake_reports::ReportFormat;

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        DispatchError::InvalidTransition { from, to } => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_transition",
            format!("invalid transition: {from} -> {to}"),
        ),
        DispatchError::PreconditionFailed(msg) => {
            json_error(StatusCode::PRECONDITION_FAILED, "precondition_failed", msg)
        }
        DispatchError::Unauthorized => {
            json_error(StatusCode::FORBIDDEN, "unauthorized", "unauthorized")
        }
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        // Storage-layer detail stays in the logs, not in the response body.
        DispatchError::Deserialize(msg) => {
            tracing::error!("event payload deserialization failed: {msg}");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal error",
            )
        }
        DispatchError::Store(e) => {
            tracing::error!("event store failure: {e}");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal error",
            )
        }
        DispatchError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
        DispatchError::TenantIsolation(msg) => {
            json_error(StatusCode::FORBIDDEN, "tenant_isolation", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn parse_audit_type(s: &str) -> Result<AuditType, axum::response::Response> {
    s.parse::<AuditType>().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "type must be one of: full_inventory, cycle_count, spot_check",
        )
    })
}

pub fn parse_report_format(s: &str) -> Result<ReportFormat, axum::response::Response> {
    match s.to_lowercase().as_str() {
        "pdf" => Ok(ReportFormat::Pdf),
        "csv" => Ok(ReportFormat::Csv),
        "xlsx" => Ok(ReportFormat::Xlsx),
        _ => Err(json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "format must be one of: pdf, csv, xlsx",
        )),
    }
}
