//! models/mod.rs
//! Módulo raíz para modelos/estructuras compartidas.

pub mod asset_model;
pub mod campaign_model;
pub mod delivery_log_model;
pub mod gateway_model;
pub mod report_model;
