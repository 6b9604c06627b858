//! services/mod.rs
//! Módulo que agrupa distintos "servicios" o "capas de negocio" de la app.

pub mod asset_dedup_service;
pub mod batch_planner;
pub mod campaign_store;
pub mod delivery_log_service;
pub mod dispatch_service;
pub mod gateway_client;
pub mod log_recovery_service;
pub mod recipient_service;
pub mod status_reconciler;
