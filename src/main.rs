use actix_web::{web, App, HttpServer};
use chrono::Utc;
use dotenv::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::campaign_config::CampaignGlobalConfig;
use crate::logger::init_logger;
use crate::services::asset_dedup_service::{AssetDedupService, SqliteAssetSource};
use crate::services::campaign_store::CampaignStore;
use crate::services::delivery_log_service::DeliveryLogService;
use crate::services::dispatch_service::DispatchService;
use crate::services::gateway_client::{GatewayClient, SolapiGatewayClient};
use crate::services::log_recovery_service::LogRecoveryService;
use crate::services::recipient_service::RecipientService;
use crate::services::status_reconciler::StatusReconciler;

mod app;
mod config;
mod db;
mod error;
mod handlers;
mod logger;
mod models;
mod services;

#[cfg(test)]
mod tests;

/// Una pasada de los jobs: enviar lo vencido, conciliar, reparar logs.
async fn run_background_cycle(
    dispatch_service: &DispatchService,
    reconciler: &StatusReconciler,
    recovery: &LogRecoveryService,
    cancel: &CancellationToken,
) {
    match dispatch_service.dispatch_due(Utc::now(), false, cancel).await {
        Ok(r) if r.processed > 0 => log::info!(
            "(background) dispatch_due: {} procesados, {} con error",
            r.processed,
            r.failed
        ),
        Ok(_) => {}
        Err(e) => log::error!("(background) dispatch_due falló: {}", e),
    }
    if cancel.is_cancelled() {
        return;
    }

    if let Err(e) = reconciler.reconcile_active(cancel).await {
        log::error!("(background) reconcile_active falló: {}", e);
    }
    if cancel.is_cancelled() {
        return;
    }

    if let Err(e) = recovery.recover_all(cancel).await {
        log::error!("(background) recover_all falló: {}", e);
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok(); // Cargar .env al inicio
    init_logger();

    let config = CampaignGlobalConfig::from_env();
    if !config.gateway_configured() {
        log::warn!("Credenciales de Solapi incompletas: los envíos van a fallar");
    }

    // Conectarnos a la DB y aplicar migraciones
    let db_pool = db::setup_database(&config.database_path).await?;
    db::run_migrations(&db_pool).await?;

    let gateway: Arc<dyn GatewayClient> = Arc::new(SolapiGatewayClient::new(&config));

    let campaign_store = CampaignStore::new(db_pool.clone());
    let delivery_logs = DeliveryLogService::new(db_pool.clone());
    let recipient_service = RecipientService::new(db_pool.clone());

    let asset_source = SqliteAssetSource::new(db_pool.clone(), config.asset_storage_root.clone());
    let asset_service =
        AssetDedupService::new(Arc::new(asset_source.clone()), campaign_store.clone());

    let dispatch_service = DispatchService::new(
        campaign_store.clone(),
        recipient_service.clone(),
        asset_service.clone(),
        gateway.clone(),
        &config,
    );
    let reconciler =
        StatusReconciler::new(campaign_store.clone(), delivery_logs.clone(), gateway.clone());
    let recovery =
        LogRecoveryService::new(campaign_store.clone(), delivery_logs.clone(), gateway.clone());

    // Jobs periódicos; se detienen cuando el servidor termina
    let cancel = CancellationToken::new();
    let jobs = if config.poll_interval_secs > 0 {
        let dispatch_service = dispatch_service.clone();
        let reconciler = reconciler.clone();
        let recovery = recovery.clone();
        let cancel = cancel.clone();
        let period = Duration::from_secs(config.poll_interval_secs);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        run_background_cycle(&dispatch_service, &reconciler, &recovery, &cancel).await;
                    }
                }
            }
            log::info!("(background) Jobs detenidos");
        }))
    } else {
        log::info!("POLL_INTERVAL_SECS=0: jobs periódicos desactivados");
        None
    };

    // Levantar servidor
    log::info!("Levantando servidor en {}:{}", config.bind_addr, config.port);
    let bind = (config.bind_addr.clone(), config.port);
    let server_result = HttpServer::new(move || {
        App::new()
            .app_data(web::JsonConfig::default().limit(4 * 1024 * 1024))
            .app_data(web::Data::new(campaign_store.clone()))
            .app_data(web::Data::new(delivery_logs.clone()))
            .app_data(web::Data::new(recipient_service.clone()))
            .app_data(web::Data::new(dispatch_service.clone()))
            .app_data(web::Data::new(reconciler.clone()))
            .app_data(web::Data::new(recovery.clone()))
            .app_data(web::Data::new(asset_source.clone()))
            .app_data(web::Data::new(asset_service.clone()))
            .configure(app::init_app)
    })
    .workers(1)
    .bind(bind)?
    .run()
    .await;

    cancel.cancel();
    if let Some(handle) = jobs {
        if let Err(e) = handle.await {
            log::error!("(background) La tarea de jobs terminó con error: {}", e);
        }
    }

    server_result?;
    Ok(())
}
