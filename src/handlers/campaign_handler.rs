//! handlers/campaign_handler.rs
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::{
    handlers::error_response,
    models::campaign_model::PlanCampaignRequest,
    services::{
        campaign_store::CampaignStore, delivery_log_service::DeliveryLogService,
        dispatch_service::DispatchService, recipient_service::RecipientService,
    },
};

#[derive(Deserialize)]
pub struct PaginationQuery {
    page: Option<u64>,
    page_size: Option<u64>,
}

#[derive(Deserialize)]
pub struct DispatchDueQuery {
    #[serde(default)]
    dry_run: bool,
}

#[derive(Deserialize)]
pub struct OptOutRequest {
    opt_out: bool,
}

/// POST /api/campaigns/plan
pub async fn plan_campaign_endpoint(
    dispatch_service: web::Data<DispatchService>,
    body: web::Json<PlanCampaignRequest>,
) -> HttpResponse {
    match dispatch_service.plan_campaign(body.into_inner()).await {
        Ok(resp) => HttpResponse::Ok().json(json!({
            "success": resp.failed_batches.is_empty(),
            "data": resp
        })),
        Err(e) => {
            log::error!("(plan_campaign_endpoint) {}", e);
            error_response(&e)
        }
    }
}

/// GET /api/campaigns
pub async fn list_campaigns_endpoint(
    store: web::Data<CampaignStore>,
    query: web::Query<PaginationQuery>,
) -> HttpResponse {
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(20);

    match store.list_campaigns(page, page_size).await {
        Ok(list) => HttpResponse::Ok().json(list),
        Err(e) => error_response(&e),
    }
}

/// GET /api/campaigns/{id}
pub async fn get_campaign_endpoint(
    store: web::Data<CampaignStore>,
    path: web::Path<String>,
) -> HttpResponse {
    match store.get_campaign(&path.into_inner()).await {
        Ok(record) => HttpResponse::Ok().json(record),
        Err(e) => error_response(&e),
    }
}

/// GET /api/campaigns/{id}/logs
pub async fn campaign_logs_endpoint(
    store: web::Data<CampaignStore>,
    logs: web::Data<DeliveryLogService>,
    path: web::Path<String>,
) -> HttpResponse {
    let campaign_id = path.into_inner();
    if let Err(e) = store.get_campaign(&campaign_id).await {
        return error_response(&e);
    }
    match logs.list_for_campaign(&campaign_id).await {
        Ok(entries) => HttpResponse::Ok().json(json!({
            "campaign_id": campaign_id,
            "total": entries.len(),
            "items": entries
        })),
        Err(e) => error_response(&e),
    }
}

/// POST /api/campaigns/{id}/activate
pub async fn activate_campaign_endpoint(
    dispatch_service: web::Data<DispatchService>,
    path: web::Path<String>,
) -> HttpResponse {
    let campaign_id = path.into_inner();
    match dispatch_service.activate_campaign(&campaign_id).await {
        Ok(outcome) => HttpResponse::Ok().json(json!({
            "success": true,
            "data": outcome
        })),
        Err(e) => {
            log::error!("(activate_campaign_endpoint) campaña {}: {}", campaign_id, e);
            error_response(&e)
        }
    }
}

/// POST /api/campaigns/{id}/archive
pub async fn archive_campaign_endpoint(
    store: web::Data<CampaignStore>,
    path: web::Path<String>,
) -> HttpResponse {
    let campaign_id = path.into_inner();
    match store.archive_campaign(&campaign_id).await {
        Ok(()) => HttpResponse::Ok().json(json!({
            "success": true,
            "campaign_id": campaign_id
        })),
        Err(e) => error_response(&e),
    }
}

/// POST /api/campaigns/dispatch-due?dry_run=true
pub async fn dispatch_due_endpoint(
    dispatch_service: web::Data<DispatchService>,
    query: web::Query<DispatchDueQuery>,
) -> HttpResponse {
    // Una corrida manual no se cancela desde afuera
    let cancel = CancellationToken::new();
    match dispatch_service
        .dispatch_due(Utc::now(), query.dry_run, &cancel)
        .await
    {
        Ok(report) => HttpResponse::Ok().json(json!({
            "success": report.failed == 0,
            "data": report
        })),
        Err(e) => error_response(&e),
    }
}

/// POST /api/customers/{phone}/opt-out
pub async fn set_opt_out_endpoint(
    recipient_service: web::Data<RecipientService>,
    path: web::Path<String>,
    body: web::Json<OptOutRequest>,
) -> HttpResponse {
    let phone = path.into_inner();
    match recipient_service.set_opt_out(&phone, body.opt_out).await {
        Ok(()) => HttpResponse::Ok().json(json!({
            "success": true,
            "phone": phone,
            "opt_out": body.opt_out
        })),
        Err(e) => error_response(&e),
    }
}
