//! config/campaign_config.rs
//! Configuración global del servicio de campañas (gateway, lotes, jobs).
//! Se arma desde variables de entorno (.env) con valores por defecto.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignGlobalConfig {
    pub database_path: String,
    pub bind_addr: String,
    pub port: u16,

    // Gateway (Solapi)
    pub gateway_base_url: String,
    #[serde(skip_serializing)]
    pub gateway_api_key: String,
    #[serde(skip_serializing)]
    pub gateway_api_secret: String,
    pub gateway_sender: String,
    pub gateway_timeout_secs: u64,

    // Lotes
    pub max_batch_size: usize,     // techo impuesto por el proveedor
    pub batch_interval_minutes: i64,

    // Jobs en segundo plano; 0 los desactiva
    pub poll_interval_secs: u64,

    pub asset_storage_root: String,
}

impl Default for CampaignGlobalConfig {
    fn default() -> Self {
        CampaignGlobalConfig {
            database_path: "./data/campaigns.db".to_string(),
            bind_addr: "0.0.0.0".to_string(),
            port: 5022,
            gateway_base_url: "https://api.solapi.com".to_string(),
            gateway_api_key: String::new(),
            gateway_api_secret: String::new(),
            gateway_sender: String::new(),
            gateway_timeout_secs: 30,
            max_batch_size: 200,
            batch_interval_minutes: 30,
            poll_interval_secs: 300,
            asset_storage_root: "./data/assets".to_string(),
        }
    }
}

impl CampaignGlobalConfig {
    /// Lee la configuración del entorno. Valores numéricos inválidos
    /// se reemplazan por el default (con warning).
    pub fn from_env() -> Self {
        let d = CampaignGlobalConfig::default();
        CampaignGlobalConfig {
            database_path: env::var("DATABASE_URL").unwrap_or(d.database_path),
            bind_addr: env::var("BIND_ADDR").unwrap_or(d.bind_addr),
            port: parse_var("PORT", d.port),
            gateway_base_url: env::var("SOLAPI_BASE_URL").unwrap_or(d.gateway_base_url),
            gateway_api_key: env::var("SOLAPI_API_KEY").unwrap_or_default(),
            gateway_api_secret: env::var("SOLAPI_API_SECRET").unwrap_or_default(),
            gateway_sender: env::var("SOLAPI_SENDER").unwrap_or_default(),
            gateway_timeout_secs: parse_var("GATEWAY_TIMEOUT_SECS", d.gateway_timeout_secs),
            max_batch_size: parse_var("MAX_BATCH_SIZE", d.max_batch_size),
            batch_interval_minutes: parse_var("BATCH_INTERVAL_MINUTES", d.batch_interval_minutes),
            poll_interval_secs: parse_var("POLL_INTERVAL_SECS", d.poll_interval_secs),
            asset_storage_root: env::var("ASSET_STORAGE_ROOT").unwrap_or(d.asset_storage_root),
        }
    }

    pub fn gateway_configured(&self) -> bool {
        !self.gateway_api_key.is_empty()
            && !self.gateway_api_secret.is_empty()
            && !self.gateway_sender.is_empty()
    }
}

fn parse_var<T: FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                log::warn!(
                    "Valor inválido para {}='{}', usando default {}",
                    name,
                    raw,
                    default
                );
                default
            }
        },
        Err(_) => default,
    }
}
