//! handlers/recovery_handler.rs
use actix_web::{web, HttpResponse};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::{handlers::error_response, services::log_recovery_service::LogRecoveryService};

/// POST /api/recovery/run
pub async fn run_recovery_endpoint(recovery: web::Data<LogRecoveryService>) -> HttpResponse {
    let cancel = CancellationToken::new();
    match recovery.recover_all(&cancel).await {
        Ok(report) => HttpResponse::Ok().json(json!({
            "success": report.failed == 0,
            "data": report
        })),
        Err(e) => error_response(&e),
    }
}

/// POST /api/recovery/group/{group_id}
pub async fn recover_group_endpoint(
    recovery: web::Data<LogRecoveryService>,
    path: web::Path<String>,
) -> HttpResponse {
    let group_id = path.into_inner();
    match recovery.recover_missing_campaign(&group_id).await {
        Ok(record) => HttpResponse::Ok().json(json!({
            "success": true,
            "data": record
        })),
        Err(e) => {
            log::error!("(recover_group_endpoint) group={}: {}", group_id, e);
            error_response(&e)
        }
    }
}
