//! handlers/asset_handler.rs
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::{
    handlers::error_response,
    services::asset_dedup_service::{AssetDedupService, SqliteAssetSource},
};

#[derive(Deserialize)]
pub struct DedupQuery {
    image_id: Option<String>,
}

/// POST /api/assets/index
pub async fn index_assets_endpoint(source: web::Data<SqliteAssetSource>) -> HttpResponse {
    match source.index_storage().await {
        Ok(report) => HttpResponse::Ok().json(json!({
            "success": true,
            "data": report
        })),
        Err(e) => error_response(&e),
    }
}

/// POST /api/assets/dedup[?image_id=...]
pub async fn dedup_assets_endpoint(
    dedup_service: web::Data<AssetDedupService>,
    query: web::Query<DedupQuery>,
) -> HttpResponse {
    let result = match &query.image_id {
        Some(image_id) => dedup_service.dedup_image(image_id).await,
        None => dedup_service.dedup().await,
    };
    match result {
        Ok(report) => HttpResponse::Ok().json(json!({
            "success": true,
            "data": report
        })),
        Err(e) => {
            log::error!("(dedup_assets_endpoint) {}", e);
            error_response(&e)
        }
    }
}
