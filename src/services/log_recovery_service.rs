//! services/log_recovery_service.rs
//! Garantiza una fila de delivery_logs por destinatario en campañas ya
//! cerradas, y reconstruye campañas que el proveedor envió pero que no
//! quedaron registradas.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{CampaignError, CampaignResult},
    models::{
        campaign_model::{CampaignRecord, CampaignStatus, MessageType, NewCampaign},
        delivery_log_model::DeliveryStatus,
        gateway_model::MessageOutcome,
        report_model::{RecoveryOutcome, RecoveryReport},
    },
    services::{
        campaign_store::CampaignStore,
        delivery_log_service::{DeliveryLogService, DeliveryLogWrite},
        gateway_client::GatewayClient,
        recipient_service::normalize_phone,
        status_reconciler::{
            bounded_update, counts_from_outcomes, derive_status, log_writes_from_outcomes,
            sanitize_counts, StatusDecision,
        },
    },
};

const RECOVERABLE_STATUSES: [CampaignStatus; 3] = [
    CampaignStatus::Sent,
    CampaignStatus::Partial,
    CampaignStatus::Failed,
];

#[derive(Clone)]
pub struct LogRecoveryService {
    store: CampaignStore,
    logs: DeliveryLogService,
    gateway: Arc<dyn GatewayClient>,
}

impl LogRecoveryService {
    pub fn new(
        store: CampaignStore,
        logs: DeliveryLogService,
        gateway: Arc<dyn GatewayClient>,
    ) -> Self {
        Self {
            store,
            logs,
            gateway,
        }
    }

    /// Recorre sent/partial/failed. El error de una campaña queda en su
    /// resultado y la corrida sigue con las demás.
    pub async fn recover_all(&self, cancel: &CancellationToken) -> CampaignResult<RecoveryReport> {
        let campaigns = self.store.list_by_status(&RECOVERABLE_STATUSES, true).await?;
        log::info!(
            "(recover_all) Revisando logs de {} campañas",
            campaigns.len()
        );

        let mut report = RecoveryReport::default();
        for campaign in campaigns {
            if cancel.is_cancelled() {
                log::info!("(recover_all) Corrida cancelada, se detiene");
                report.cancelled = true;
                break;
            }

            let outcome = match self.recover_campaign(&campaign).await {
                Ok(o) => o,
                Err(e) => {
                    log::error!(
                        "(recover_all) Error recuperando logs de campaña {}: {}",
                        campaign.id,
                        e
                    );
                    RecoveryOutcome {
                        campaign_id: campaign.id.clone(),
                        error: Some(e.to_string()),
                        ..Default::default()
                    }
                }
            };
            report.push(outcome);
        }

        log::info!(
            "(recover_all) {} filas recuperadas, {} campañas con hueco, {} con error",
            report.recovered_total,
            report.gaps,
            report.failed
        );
        Ok(report)
    }

    pub async fn recover_campaign(
        &self,
        campaign: &CampaignRecord,
    ) -> CampaignResult<RecoveryOutcome> {
        let mut outcome = RecoveryOutcome {
            campaign_id: campaign.id.clone(),
            ..Default::default()
        };

        let existing = self.logs.count_for_campaign(&campaign.id).await?;
        let expected = campaign.recipient_count();

        if expected == 0 || existing >= expected {
            outcome.skipped = true;
            return Ok(outcome);
        }

        if existing > 0 {
            // No se sabe qué destinatarios faltan: se informa y no se inventa
            let gap = expected - existing;
            log::warn!(
                "(recover_campaign) Campaña {} tiene {} de {} logs; faltan {} sin poder identificarlos",
                campaign.id,
                existing,
                expected,
                gap
            );
            outcome.gap = Some(gap);
            return Ok(outcome);
        }

        let status = if campaign.status == CampaignStatus::Failed {
            DeliveryStatus::Failed
        } else {
            DeliveryStatus::Sent
        };
        let sent_at = campaign.sent_at.unwrap_or_else(Utc::now);
        let writes: Vec<DeliveryLogWrite> = campaign
            .recipients
            .iter()
            .map(|phone| DeliveryLogWrite {
                recipient_phone: phone.clone(),
                status,
                sent_at,
            })
            .collect();

        outcome.recovered_count = self
            .logs
            .insert_missing_entries(&campaign.id, self.gateway.channel(), &writes)
            .await?;

        log::info!(
            "(recover_campaign) Campaña {}: {} logs sintetizados como '{}'",
            campaign.id,
            outcome.recovered_count,
            status.as_str()
        );
        Ok(outcome)
    }

    /// Crea la campaña de un grupo del proveedor que no está vinculado a
    /// ningún registro. Si ya existe, la devuelve sin tocar nada.
    pub async fn recover_missing_campaign(&self, group_id: &str) -> CampaignResult<CampaignRecord> {
        if let Some(existing) = self.store.find_by_group_id(group_id).await? {
            log::info!(
                "(recover_missing_campaign) group={} ya vinculado a la campaña {}",
                group_id,
                existing.id
            );
            return Ok(existing);
        }

        let outcomes = self.gateway.fetch_message_list(group_id).await?;
        let Some(first) = outcomes.first() else {
            return Err(CampaignError::NotFound(format!(
                "El gateway no devolvió mensajes para el group {}",
                group_id
            )));
        };

        let message_text = first.text.clone().unwrap_or_default();
        let message_type = first
            .message_type
            .as_deref()
            .and_then(|t| t.parse::<MessageType>().ok())
            .unwrap_or(MessageType::Lms);

        // Un destinatario repetido en la lista cuenta una sola vez (el primero)
        let mut seen = HashSet::new();
        let outcomes: Vec<MessageOutcome> = outcomes
            .into_iter()
            .filter_map(|mut o| {
                o.recipient = normalize_phone(&o.recipient).unwrap_or(o.recipient);
                (!o.recipient.is_empty() && seen.insert(o.recipient.clone())).then_some(o)
            })
            .collect();
        let recipients: Vec<String> = outcomes.iter().map(|o| o.recipient.clone()).collect();

        let counts = sanitize_counts(counts_from_outcomes(&outcomes));
        let status = match derive_status(counts) {
            StatusDecision::Set(s) => s,
            StatusDecision::KeepPrevious => CampaignStatus::Partial,
        };
        let update = bounded_update(status, counts, recipients.len() as i64);

        let sent_at = outcomes
            .iter()
            .filter_map(|o| o.sent_at)
            .min()
            .unwrap_or_else(Utc::now);

        let new = NewCampaign {
            message_text,
            message_type,
            image_ref: None,
            recipients,
            status,
            scheduled_at: None,
            note: Some(format!("recuperada del group {}", group_id)),
        };
        let record = self
            .store
            .insert_recovered(new, group_id, update, sent_at)
            .await?;

        let writes = log_writes_from_outcomes(&outcomes, sent_at);
        let written = self
            .logs
            .upsert_entries(&record.id, self.gateway.channel(), &writes)
            .await?;

        log::info!(
            "(recover_missing_campaign) group={} -> campaña {} ({}, {} destinatarios, {} logs)",
            group_id,
            record.id,
            record.status,
            record.recipients.len(),
            written
        );
        Ok(record)
    }
}
