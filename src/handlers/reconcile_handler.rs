//! handlers/reconcile_handler.rs
use actix_web::{web, HttpResponse};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::{handlers::error_response, services::status_reconciler::StatusReconciler};

/// POST /api/campaigns/{id}/reconcile
pub async fn reconcile_campaign_endpoint(
    reconciler: web::Data<StatusReconciler>,
    path: web::Path<String>,
) -> HttpResponse {
    let campaign_id = path.into_inner();
    match reconciler.reconcile_campaign(&campaign_id).await {
        Ok(outcome) => HttpResponse::Ok().json(json!({
            "success": true,
            "data": outcome
        })),
        Err(e) => {
            log::error!(
                "(reconcile_campaign_endpoint) campaña {}: {}",
                campaign_id,
                e
            );
            error_response(&e)
        }
    }
}

/// POST /api/campaigns/reconcile
pub async fn reconcile_active_endpoint(reconciler: web::Data<StatusReconciler>) -> HttpResponse {
    let cancel = CancellationToken::new();
    match reconciler.reconcile_active(&cancel).await {
        Ok(report) => HttpResponse::Ok().json(json!({
            "success": report.failed == 0,
            "data": report
        })),
        Err(e) => error_response(&e),
    }
}
