//! models/report_model.rs
//! Reportes agregados que devuelven los jobs (un item por campaña).

use serde::Serialize;

use crate::models::campaign_model::CampaignStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    /// Conteos/estado persistidos
    Updated,
    /// Respuesta en cero o desactualizada: estado intacto, marcado para revisión
    FlaggedForRecheck,
    /// El snapshot era peor que lo ya guardado; se descartó
    IgnoredRegression,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub campaign_id: String,
    pub action: ReconcileAction,
    pub previous_status: CampaignStatus,
    pub status: CampaignStatus,
    pub sent_count: i64,
    pub success_count: i64,
    pub fail_count: i64,
    /// true si los conteos vinieron de la lista por destinatario
    pub from_message_list: bool,
    pub logs_written: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryOutcome {
    pub campaign_id: String,
    pub recovered_count: u64,
    pub skipped: bool,
    /// Filas faltantes cuando 0 < existentes < destinatarios (no se repara)
    pub gap: Option<i64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub campaign_id: String,
    pub provider_group_id: Option<String>,
    pub recipient_count: usize,
    pub dry_run: bool,
}

/// Un item por campaña: Ok con el resultado o el error registrado
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport<T: Serialize> {
    pub campaign_id: String,
    pub result: Option<T>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport<T: Serialize> {
    pub processed: usize,
    pub failed: usize,
    /// true si la corrida se detuvo antes de terminar
    pub cancelled: bool,
    pub items: Vec<ItemReport<T>>,
}

impl<T: Serialize> RunReport<T> {
    pub fn new() -> Self {
        RunReport {
            processed: 0,
            failed: 0,
            cancelled: false,
            items: Vec::new(),
        }
    }

    pub fn push_ok(&mut self, campaign_id: &str, result: T) {
        self.processed += 1;
        self.items.push(ItemReport {
            campaign_id: campaign_id.to_string(),
            result: Some(result),
            error: None,
        });
    }

    pub fn push_err(&mut self, campaign_id: &str, error: String) {
        self.processed += 1;
        self.failed += 1;
        self.items.push(ItemReport {
            campaign_id: campaign_id.to_string(),
            result: None,
            error: Some(error),
        });
    }
}

impl<T: Serialize> Default for RunReport<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryReport {
    pub outcomes: Vec<RecoveryOutcome>,
    pub recovered_total: u64,
    pub gaps: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl RecoveryReport {
    pub fn push(&mut self, outcome: RecoveryOutcome) {
        self.recovered_total += outcome.recovered_count;
        if outcome.gap.is_some() {
            self.gaps += 1;
        }
        if outcome.error.is_some() {
            self.failed += 1;
        }
        self.outcomes.push(outcome);
    }
}
