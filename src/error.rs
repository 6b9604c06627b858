//! error.rs
//! Errores del dominio de campañas (planificación, envío, conciliación).

use thiserror::Error;

pub type CampaignResult<T> = std::result::Result<T, CampaignError>;

#[derive(Error, Debug)]
pub enum CampaignError {
    /// Parámetros inválidos; se rechaza antes de persistir nada
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Transporte, autenticación o timeout contra el gateway
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Fallo de escritura/lectura en la base de datos
    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// Archivos del storage de imágenes
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Transición de estado no permitida (p.ej. activar algo ya enviado)
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl CampaignError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        CampaignError::InvalidInput(msg.into())
    }

    pub fn gateway(msg: impl Into<String>) -> Self {
        CampaignError::Gateway(msg.into())
    }
}

impl From<serde_json::Error> for CampaignError {
    fn from(e: serde_json::Error) -> Self {
        CampaignError::Persistence(sqlx::Error::Decode(Box::new(e)))
    }
}

impl From<chrono::ParseError> for CampaignError {
    fn from(e: chrono::ParseError) -> Self {
        CampaignError::Persistence(sqlx::Error::Decode(Box::new(e)))
    }
}

impl From<reqwest::Error> for CampaignError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CampaignError::Gateway(format!("timeout: {}", e))
        } else {
            CampaignError::Gateway(e.to_string())
        }
    }
}
