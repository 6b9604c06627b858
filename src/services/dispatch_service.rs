//! services/dispatch_service.rs
//! Orquestación del envío: del plan de lotes a registros de campaña, y
//! de un registro 'draft'/'scheduled' al gateway.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::{
    config::campaign_config::CampaignGlobalConfig,
    error::{CampaignError, CampaignResult},
    models::{
        campaign_model::{
            CampaignRecord, CampaignStatus, CreatedBatch, MessageType, NewCampaign,
            PlanCampaignRequest, PlanCampaignResponse,
        },
        gateway_model::OutboundMessage,
        report_model::{DispatchOutcome, RunReport},
    },
    services::{
        asset_dedup_service::AssetDedupService,
        batch_planner::plan_batches,
        campaign_store::CampaignStore,
        gateway_client::GatewayClient,
        recipient_service::{normalize_recipients, RecipientService},
    },
};

#[derive(Clone)]
pub struct DispatchService {
    store: CampaignStore,
    recipient_service: RecipientService,
    asset_service: AssetDedupService,
    gateway: Arc<dyn GatewayClient>,
    max_batch_size: usize,
    default_interval_minutes: i64,
}

impl DispatchService {
    pub fn new(
        store: CampaignStore,
        recipient_service: RecipientService,
        asset_service: AssetDedupService,
        gateway: Arc<dyn GatewayClient>,
        config: &CampaignGlobalConfig,
    ) -> Self {
        Self {
            store,
            recipient_service,
            asset_service,
            gateway,
            max_batch_size: config.max_batch_size,
            default_interval_minutes: config.batch_interval_minutes,
        }
    }

    /// Normaliza destinatarios, arma el plan y crea un registro por lote.
    /// Todo lo inválido se rechaza antes de escribir en la DB.
    pub async fn plan_campaign(
        &self,
        req: PlanCampaignRequest,
    ) -> CampaignResult<PlanCampaignResponse> {
        if req.message_text.trim().is_empty() {
            return Err(CampaignError::invalid_input("message_text vacío"));
        }
        if req.image_ref.is_some() && req.message_type != MessageType::Mms {
            return Err(CampaignError::invalid_input(
                "image_ref solo se permite en mensajes MMS",
            ));
        }

        let batch_size = req.batch_size.unwrap_or(self.max_batch_size as i64);
        if batch_size > self.max_batch_size as i64 {
            return Err(CampaignError::invalid_input(format!(
                "batch_size={} excede el máximo del proveedor ({})",
                batch_size, self.max_batch_size
            )));
        }
        let interval_minutes = req.interval_minutes.unwrap_or(self.default_interval_minutes);
        let interval = Duration::try_minutes(interval_minutes).ok_or_else(|| {
            CampaignError::invalid_input(format!(
                "interval_minutes fuera de rango: {}",
                interval_minutes
            ))
        })?;

        let normalized = normalize_recipients(&req.recipients);
        if !normalized.rejected.is_empty() {
            log::warn!(
                "(plan_campaign) {} números inválidos descartados",
                normalized.rejected.len()
            );
        }
        let (allowed, opted_out) = self
            .recipient_service
            .exclude_opted_out(normalized.accepted)
            .await?;

        let plan = plan_batches(&allowed, batch_size, req.start_at, interval)?;

        let status = if req.require_confirmation {
            CampaignStatus::Draft
        } else {
            CampaignStatus::Scheduled
        };
        let total_batches = plan.len();

        log::info!(
            "(plan_campaign) {} destinatarios en {} lotes de hasta {} (status={})",
            allowed.len(),
            total_batches,
            batch_size,
            status
        );

        let mut batches = Vec::with_capacity(total_batches);
        let mut failed_batches = Vec::new();
        for (k, batch) in plan.into_iter().enumerate() {
            let note = match &req.note {
                Some(prefix) => format!("{} - lote {} de {}", prefix, k + 1, total_batches),
                None => format!("lote {} de {}", k + 1, total_batches),
            };
            let recipient_count = batch.recipients.len();
            let new = NewCampaign {
                message_text: req.message_text.clone(),
                message_type: req.message_type,
                image_ref: req.image_ref.clone(),
                recipients: batch.recipients,
                status,
                scheduled_at: Some(batch.scheduled_at),
                note: Some(note),
            };

            match self.store.create_campaign(new).await {
                Ok(record) => batches.push(CreatedBatch {
                    id: record.id,
                    recipient_count,
                    scheduled_at: batch.scheduled_at,
                    status,
                }),
                Err(e) => {
                    log::error!(
                        "(plan_campaign) No se pudo crear el lote {} de {}: {}",
                        k + 1,
                        total_batches,
                        e
                    );
                    failed_batches.push(format!("lote {}: {}", k + 1, e));
                }
            }
        }

        Ok(PlanCampaignResponse {
            batches,
            failed_batches,
            rejected_recipients: normalized.rejected,
            opted_out,
        })
    }

    /// draft/scheduled -> sending, y recién entonces se envía. Solo quien
    /// toma el registro llama al gateway. Si el gateway rechaza, el registro
    /// queda en 'draft' y el error sube al llamador (sin reintento).
    pub async fn activate_campaign(&self, campaign_id: &str) -> CampaignResult<DispatchOutcome> {
        let campaign = self.store.get_campaign(campaign_id).await?;
        if campaign.archived_at.is_some() {
            return Err(CampaignError::InvalidState(format!(
                "La campaña {} está archivada",
                campaign.id
            )));
        }
        if !campaign.status.is_activatable() {
            return Err(CampaignError::InvalidState(format!(
                "La campaña {} está en '{}' y no se puede activar",
                campaign.id, campaign.status
            )));
        }

        let (message, image_id) = self.prepare_message(&campaign).await?;

        if !self.store.claim_for_sending(&campaign.id).await? {
            return Err(CampaignError::InvalidState(format!(
                "La campaña {} ya fue tomada por otro envío",
                campaign.id
            )));
        }

        log::info!(
            "(activate_campaign) Enviando campaña {} ({} destinatarios, tipo {})",
            campaign.id,
            campaign.recipients.len(),
            message.message_type.as_str()
        );

        let group_id = match self
            .gateway
            .send(&message, &campaign.recipients, image_id.as_deref())
            .await
        {
            Ok(g) => g,
            Err(e) => {
                log::error!(
                    "(activate_campaign) Gateway rechazó la campaña {}: {}. Queda en 'draft'",
                    campaign.id,
                    e
                );
                if let Err(revert_err) = self.store.revert_to_draft(&campaign.id).await {
                    log::error!(
                        "(activate_campaign) No se pudo volver a 'draft' la campaña {}: {}",
                        campaign.id,
                        revert_err
                    );
                }
                return Err(e);
            }
        };

        self.store.attach_group_id(&campaign.id, &group_id).await?;

        log::info!(
            "(activate_campaign) Campaña {} aceptada por el gateway, group={}",
            campaign.id,
            group_id
        );
        Ok(DispatchOutcome {
            campaign_id: campaign.id,
            provider_group_id: Some(group_id),
            recipient_count: campaign.recipients.len(),
            dry_run: false,
        })
    }

    /// MMS sin imagen resoluble se envía como LMS
    async fn prepare_message(
        &self,
        campaign: &CampaignRecord,
    ) -> CampaignResult<(OutboundMessage, Option<String>)> {
        let mut message = OutboundMessage {
            text: campaign.message_text.clone(),
            message_type: campaign.message_type,
        };
        if campaign.message_type != MessageType::Mms {
            return Ok((message, None));
        }

        let image_id = match &campaign.image_ref {
            Some(r) => self.asset_service.resolve_image_id(r).await?,
            None => None,
        };
        if image_id.is_none() {
            log::warn!(
                "(prepare_message) Campaña {} es MMS pero la imagen {:?} no se pudo resolver; se envía como LMS",
                campaign.id,
                campaign.image_ref
            );
            message.message_type = MessageType::Lms;
        }
        Ok((message, image_id))
    }

    /// Activa todos los lotes 'scheduled' vencidos. Con `dry_run` solo
    /// informa qué se enviaría, sin llamar al gateway ni escribir.
    pub async fn dispatch_due(
        &self,
        now: DateTime<Utc>,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> CampaignResult<RunReport<DispatchOutcome>> {
        let due = self.store.list_due_scheduled(now).await?;
        log::info!(
            "(dispatch_due) {} lotes vencidos a las {} (dry_run={})",
            due.len(),
            now,
            dry_run
        );

        let mut report = RunReport::new();
        for campaign in due {
            if cancel.is_cancelled() {
                log::info!("(dispatch_due) Corrida cancelada, se detiene");
                report.cancelled = true;
                break;
            }

            if dry_run {
                report.push_ok(
                    &campaign.id,
                    DispatchOutcome {
                        campaign_id: campaign.id.clone(),
                        provider_group_id: None,
                        recipient_count: campaign.recipients.len(),
                        dry_run: true,
                    },
                );
                continue;
            }

            match self.activate_campaign(&campaign.id).await {
                Ok(outcome) => report.push_ok(&campaign.id, outcome),
                Err(e) => report.push_err(&campaign.id, e.to_string()),
            }
        }
        Ok(report)
    }
}
