//! handlers/mod.rs
//! Módulo que agrupa los distintos handlers (campañas, conciliación, recuperación, imágenes).
pub mod asset_handler;
pub mod campaign_handler;
pub mod reconcile_handler;
pub mod recovery_handler;

use actix_web::HttpResponse;
use serde_json::json;

use crate::error::CampaignError;

/// Traduce el error de dominio a la respuesta HTTP correspondiente
pub fn error_response(e: &CampaignError) -> HttpResponse {
    let body = json!({
        "success": false,
        "error": e.to_string()
    });
    match e {
        CampaignError::InvalidInput(_) | CampaignError::InvalidState(_) => {
            HttpResponse::BadRequest().json(body)
        }
        CampaignError::NotFound(_) => HttpResponse::NotFound().json(body),
        CampaignError::Gateway(_) => HttpResponse::BadGateway().json(body),
        CampaignError::Persistence(_) | CampaignError::Storage(_) => {
            HttpResponse::InternalServerError().json(body)
        }
    }
}
