//! models/gateway_model.rs
//! Estructuras que intercambiamos con el gateway SMS/MMS.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::campaign_model::MessageType;

/// Mensaje compartido por todos los destinatarios de un lote
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    pub text: String,
    pub message_type: MessageType,
}

/// Conteos de un grupo del proveedor. Todo en cero puede significar
/// "todavía procesando", no necesariamente terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCounts {
    pub total: i64,
    pub success: i64,
    pub fail: i64,
}

impl GroupCounts {
    pub fn new(total: i64, success: i64, fail: i64) -> Self {
        GroupCounts {
            total,
            success,
            fail,
        }
    }

    /// total - success - fail, nunca negativo
    pub fn sending(&self) -> i64 {
        (self.total - self.success - self.fail).max(0)
    }

    pub fn is_all_zero(&self) -> bool {
        self.total == 0 && self.success == 0 && self.fail == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Delivered,
    Pending,
    Failed,
}

impl OutcomeStatus {
    /// Clasifica el status/statusCode que devuelve el proveedor.
    /// 4000 = entregado; 1000/2000/3000 = en proceso; otro código = fallo.
    pub fn classify(status: Option<&str>, status_code: Option<&str>) -> OutcomeStatus {
        let status = status.unwrap_or_default().to_ascii_uppercase();
        let code = status_code.unwrap_or_default().trim();

        if code == "4000" || status == "COMPLETE" || status == "DELIVERED" {
            return OutcomeStatus::Delivered;
        }
        if matches!(status.as_str(), "FAILED" | "REJECTED") {
            return OutcomeStatus::Failed;
        }
        if matches!(code, "1000" | "2000" | "3000")
            || matches!(status.as_str(), "SENDING" | "PENDING" | "ACCEPTED")
        {
            return OutcomeStatus::Pending;
        }
        if !code.is_empty() {
            return OutcomeStatus::Failed;
        }
        OutcomeStatus::Pending
    }
}

/// Resultado por destinatario de fetch_message_list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageOutcome {
    pub recipient: String,
    pub status: OutcomeStatus,
    pub status_code: Option<String>,
    pub text: Option<String>,
    pub message_type: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl MessageOutcome {
    pub fn new(recipient: &str, status: OutcomeStatus) -> Self {
        MessageOutcome {
            recipient: recipient.to_string(),
            status,
            status_code: None,
            text: None,
            message_type: None,
            sent_at: None,
        }
    }
}
