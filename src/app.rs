//! app.rs
use crate::handlers::{asset_handler, campaign_handler, reconcile_handler, recovery_handler};
use actix_web::web;

pub fn init_app(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(
                web::scope("/campaigns")
                    .route(
                        "",
                        web::get().to(campaign_handler::list_campaigns_endpoint),
                    )
                    .route(
                        "/plan",
                        web::post().to(campaign_handler::plan_campaign_endpoint),
                    )
                    .route(
                        "/dispatch-due",
                        web::post().to(campaign_handler::dispatch_due_endpoint),
                    )
                    .route(
                        "/reconcile",
                        web::post().to(reconcile_handler::reconcile_active_endpoint),
                    )
                    .route(
                        "/{id}",
                        web::get().to(campaign_handler::get_campaign_endpoint),
                    )
                    .route(
                        "/{id}/logs",
                        web::get().to(campaign_handler::campaign_logs_endpoint),
                    )
                    .route(
                        "/{id}/activate",
                        web::post().to(campaign_handler::activate_campaign_endpoint),
                    )
                    .route(
                        "/{id}/archive",
                        web::post().to(campaign_handler::archive_campaign_endpoint),
                    )
                    .route(
                        "/{id}/reconcile",
                        web::post().to(reconcile_handler::reconcile_campaign_endpoint),
                    ),
            )
            .service(
                web::scope("/customers").route(
                    "/{phone}/opt-out",
                    web::post().to(campaign_handler::set_opt_out_endpoint),
                ),
            )
            .service(
                web::scope("/recovery")
                    .route("/run", web::post().to(recovery_handler::run_recovery_endpoint))
                    .route(
                        "/group/{group_id}",
                        web::post().to(recovery_handler::recover_group_endpoint),
                    ),
            )
            .service(
                web::scope("/assets")
                    .route("/index", web::post().to(asset_handler::index_assets_endpoint))
                    .route("/dedup", web::post().to(asset_handler::dedup_assets_endpoint)),
            ),
    );
}
