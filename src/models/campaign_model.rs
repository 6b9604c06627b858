//! models/campaign_model.rs
//! Registro de campaña: un registro por lote de envío.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CampaignError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Sms,
    /// Mensaje largo (texto sin imagen)
    Lms,
    Mms,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Sms => "SMS",
            MessageType::Lms => "LMS",
            MessageType::Mms => "MMS",
        }
    }
}

impl FromStr for MessageType {
    type Err = CampaignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SMS" => Ok(MessageType::Sms),
            "LMS" => Ok(MessageType::Lms),
            "MMS" => Ok(MessageType::Mms),
            other => Err(CampaignError::invalid_input(format!(
                "message_type desconocido: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Sent,
    Partial,
    Failed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Scheduled => "scheduled",
            CampaignStatus::Sending => "sending",
            CampaignStatus::Sent => "sent",
            CampaignStatus::Partial => "partial",
            CampaignStatus::Failed => "failed",
        }
    }

    /// Se puede activar (enviar al gateway) desde este estado
    pub fn is_activatable(&self) -> bool {
        matches!(self, CampaignStatus::Draft | CampaignStatus::Scheduled)
    }

    /// sent / partial / failed: ya pasó por el reconciliador
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            CampaignStatus::Sent | CampaignStatus::Partial | CampaignStatus::Failed
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Sent | CampaignStatus::Failed)
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CampaignStatus {
    type Err = CampaignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "scheduled" => Ok(CampaignStatus::Scheduled),
            "sending" => Ok(CampaignStatus::Sending),
            "sent" => Ok(CampaignStatus::Sent),
            "partial" => Ok(CampaignStatus::Partial),
            "failed" => Ok(CampaignStatus::Failed),
            other => Err(CampaignError::invalid_input(format!(
                "status desconocido: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub id: String,
    pub message_text: String,
    pub message_type: MessageType,
    pub image_ref: Option<String>,
    pub recipients: Vec<String>, // normalizados, inmutables
    pub status: CampaignStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub provider_group_id: Option<String>,
    pub sent_count: i64,
    pub success_count: i64,
    pub fail_count: i64,
    pub note: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub needs_recheck: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CampaignRecord {
    pub fn recipient_count(&self) -> i64 {
        self.recipients.len() as i64
    }
}

/// Datos para insertar un registro nuevo (un lote)
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub message_text: String,
    pub message_type: MessageType,
    pub image_ref: Option<String>,
    pub recipients: Vec<String>,
    pub status: CampaignStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

/// Request de POST /api/campaigns/plan
#[derive(Debug, Clone, Deserialize)]
pub struct PlanCampaignRequest {
    pub message_text: String,
    pub message_type: MessageType,
    pub image_ref: Option<String>,
    pub recipients: Vec<String>,

    /// Inicio del primer lote, en cualquier offset (se guarda en UTC)
    pub start_at: DateTime<chrono::FixedOffset>,
    pub interval_minutes: Option<i64>,
    pub batch_size: Option<i64>,

    /// true => los lotes quedan en 'draft' hasta confirmación manual
    #[serde(default)]
    pub require_confirmation: bool,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedBatch {
    pub id: String,
    pub recipient_count: usize,
    pub scheduled_at: DateTime<Utc>,
    pub status: CampaignStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanCampaignResponse {
    pub batches: Vec<CreatedBatch>,
    /// Lotes que no se pudieron guardar (los demás sí quedaron creados)
    pub failed_batches: Vec<String>,
    pub rejected_recipients: Vec<String>,
    pub opted_out: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListCampaignsResponse {
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub items: Vec<CampaignRecord>,
}
