//! services/status_reconciler.rs
//! Trae del gateway el estado de un grupo y refina conteos/estado de la
//! campaña. Los conteos nunca retroceden: un snapshot peor que lo
//! guardado se registra en el log y se descarta.

use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{CampaignError, CampaignResult},
    models::{
        campaign_model::{CampaignRecord, CampaignStatus},
        delivery_log_model::DeliveryStatus,
        gateway_model::{GroupCounts, MessageOutcome, OutcomeStatus},
        report_model::{ReconcileAction, ReconcileOutcome, RunReport},
    },
    services::{
        campaign_store::{CampaignStore, CountUpdate},
        delivery_log_service::{DeliveryLogService, DeliveryLogWrite},
        gateway_client::GatewayClient,
        recipient_service::normalize_phone,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusDecision {
    Set(CampaignStatus),
    /// Datos insuficientes: no tocar el estado, marcar para revisión manual
    KeepPrevious,
}

/// Lo que se sabe de un grupo en un momento dado. Puede venir del
/// polling o de cualquier otra fuente (p.ej. un webhook).
#[derive(Debug, Clone, Default)]
pub struct DeliverySnapshot {
    pub counts: GroupCounts,
    /// Vacío si la lista por destinatario no estaba disponible
    pub outcomes: Vec<MessageOutcome>,
}

impl DeliverySnapshot {
    pub fn from_counts(counts: GroupCounts) -> Self {
        DeliverySnapshot {
            counts,
            outcomes: Vec::new(),
        }
    }

    pub fn from_outcomes(outcomes: Vec<MessageOutcome>) -> Self {
        DeliverySnapshot {
            counts: counts_from_outcomes(&outcomes),
            outcomes,
        }
    }

    pub fn has_outcomes(&self) -> bool {
        !self.outcomes.is_empty()
    }
}

/// Tabla de derivación, evaluada en este orden de prioridad.
pub fn derive_status(counts: GroupCounts) -> StatusDecision {
    let GroupCounts {
        total,
        success,
        fail,
    } = counts;

    if counts.sending() > 0 {
        StatusDecision::Set(CampaignStatus::Partial)
    } else if total > 0 && fail == total {
        StatusDecision::Set(CampaignStatus::Failed)
    } else if success > 0 && fail == 0 {
        StatusDecision::Set(CampaignStatus::Sent)
    } else if success > 0 && fail > 0 {
        StatusDecision::Set(CampaignStatus::Partial)
    } else {
        StatusDecision::KeepPrevious
    }
}

/// Si el proveedor reporta más resultados que el total, el total se
/// ajusta hacia arriba; los negativos se tratan como cero.
pub fn sanitize_counts(counts: GroupCounts) -> GroupCounts {
    let success = counts.success.max(0);
    let fail = counts.fail.max(0);
    GroupCounts::new(counts.total.max(success + fail), success, fail)
}

pub fn counts_from_outcomes(outcomes: &[MessageOutcome]) -> GroupCounts {
    let success = outcomes
        .iter()
        .filter(|o| o.status == OutcomeStatus::Delivered)
        .count() as i64;
    let fail = outcomes
        .iter()
        .filter(|o| o.status == OutcomeStatus::Failed)
        .count() as i64;
    GroupCounts::new(outcomes.len() as i64, success, fail)
}

/// Filas de log para cada destinatario listado. Un pendiente ya fue
/// entregado al gateway, así que queda como 'sent' hasta que falle.
pub fn log_writes_from_outcomes(
    outcomes: &[MessageOutcome],
    fallback_sent_at: chrono::DateTime<Utc>,
) -> Vec<DeliveryLogWrite> {
    outcomes
        .iter()
        .filter(|o| !o.recipient.is_empty())
        .map(|o| DeliveryLogWrite {
            recipient_phone: normalize_phone(&o.recipient).unwrap_or_else(|| o.recipient.clone()),
            status: match o.status {
                OutcomeStatus::Failed => DeliveryStatus::Failed,
                OutcomeStatus::Delivered | OutcomeStatus::Pending => DeliveryStatus::Sent,
            },
            sent_at: o.sent_at.unwrap_or(fallback_sent_at),
        })
        .collect()
}

/// Ajusta los conteos a las invariantes del registro:
/// sent_count <= destinatarios y success + fail <= sent_count.
pub fn bounded_update(
    status: CampaignStatus,
    counts: GroupCounts,
    recipient_count: i64,
) -> CountUpdate {
    let mut sent = if counts.total > 0 {
        counts.total
    } else {
        recipient_count
    };
    if recipient_count > 0 {
        sent = sent.min(recipient_count);
    }
    let success = counts.success.min(sent);
    let fail = counts.fail.min(sent - success);

    CountUpdate {
        status,
        sent_count: sent,
        success_count: success,
        fail_count: fail,
    }
}

/// Un snapshot que baja conteos, o que saca de un estado terminal sin
/// aportar más resultados, es peor que lo guardado.
pub fn is_regression(current: &CampaignRecord, update: &CountUpdate) -> bool {
    if update.success_count < current.success_count || update.fail_count < current.fail_count {
        return true;
    }
    let resolved_now = update.success_count + update.fail_count;
    let resolved_before = current.success_count + current.fail_count;
    current.status.is_terminal() && update.status != current.status && resolved_now <= resolved_before
}

#[derive(Clone)]
pub struct StatusReconciler {
    store: CampaignStore,
    logs: DeliveryLogService,
    gateway: Arc<dyn GatewayClient>,
}

impl StatusReconciler {
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

    /// Concilia una campaña ya activada (con provider_group_id)
    pub async fn reconcile_campaign(&self, campaign_id: &str) -> CampaignResult<ReconcileOutcome> {
        let campaign = self.store.get_campaign(campaign_id).await?;
        let group_id = campaign.provider_group_id.clone().ok_or_else(|| {
            CampaignError::InvalidState(format!(
                "La campaña {} no tiene provider_group_id (status={})",
                campaign.id, campaign.status
            ))
        })?;

        let snapshot = self.pull_snapshot(&group_id).await?;
        self.apply_snapshot(&campaign, snapshot).await
    }

    /// Lista por destinatario primero; si viene vacía o falla, conteos del grupo.
    pub async fn pull_snapshot(&self, group_id: &str) -> CampaignResult<DeliverySnapshot> {
        match self.gateway.fetch_message_list(group_id).await {
            Ok(outcomes) if !outcomes.is_empty() => {
                log::info!(
                    "(pull_snapshot) group={} -> {} mensajes en la lista",
                    group_id,
                    outcomes.len()
                );
                return Ok(DeliverySnapshot::from_outcomes(outcomes));
            }
            Ok(_) => {
                log::info!(
                    "(pull_snapshot) group={} lista vacía, se usan conteos del grupo",
                    group_id
                );
            }
            Err(e) => {
                log::warn!(
                    "(pull_snapshot) group={} fallo al listar mensajes: {}. Se usan conteos del grupo",
                    group_id,
                    e
                );
            }
        }

        let counts = self.gateway.fetch_group_counts(group_id).await?;
        Ok(DeliverySnapshot::from_counts(counts))
    }

    /// Aplica un snapshot a la campaña respetando la monotonía de conteos.
    pub async fn apply_snapshot(
        &self,
        campaign: &CampaignRecord,
        snapshot: DeliverySnapshot,
    ) -> CampaignResult<ReconcileOutcome> {
        let counts = sanitize_counts(snapshot.counts);
        let from_list = snapshot.has_outcomes();

        log::info!(
            "(apply_snapshot) campaña={} total={} success={} fail={} sending={} (lista={})",
            campaign.id,
            counts.total,
            counts.success,
            counts.fail,
            counts.sending(),
            from_list
        );

        let mut outcome = ReconcileOutcome {
            campaign_id: campaign.id.clone(),
            action: ReconcileAction::Updated,
            previous_status: campaign.status,
            status: campaign.status,
            sent_count: campaign.sent_count,
            success_count: campaign.success_count,
            fail_count: campaign.fail_count,
            from_message_list: from_list,
            logs_written: 0,
        };

        let new_status = match derive_status(counts) {
            StatusDecision::Set(s) => s,
            StatusDecision::KeepPrevious => {
                let reason = if counts.is_all_zero() {
                    "respuesta en cero"
                } else {
                    "sin entregas ni fallos"
                };
                log::warn!(
                    "(apply_snapshot) campaña={} {} (total={}); se mantiene '{}' y se marca para revisión",
                    campaign.id,
                    reason,
                    counts.total,
                    campaign.status
                );
                self.store.flag_recheck(&campaign.id).await?;
                outcome.action = ReconcileAction::FlaggedForRecheck;
                return Ok(outcome);
            }
        };

        let update = bounded_update(new_status, counts, campaign.recipient_count());
        if is_regression(campaign, &update) {
            log::warn!(
                "(apply_snapshot) campaña={} snapshot peor que lo guardado ({} {}/{} vs {} {}/{}); se ignora",
                campaign.id,
                update.status,
                update.success_count,
                update.fail_count,
                campaign.status,
                campaign.success_count,
                campaign.fail_count
            );
            outcome.action = ReconcileAction::IgnoredRegression;
            return Ok(outcome);
        }

        if !self.store.apply_counts(&campaign.id, update).await? {
            // Otra conciliación dejó conteos mayores entre la lectura y la escritura
            log::warn!(
                "(apply_snapshot) campaña={} conteos ya refinados por otra ejecución; se conserva lo guardado",
                campaign.id
            );
            outcome.action = ReconcileAction::IgnoredRegression;
            return Ok(outcome);
        }

        // Los logs van después del compare-and-set: un snapshot rechazado no los toca
        if from_list {
            let fallback = campaign.sent_at.unwrap_or_else(Utc::now);
            let writes = log_writes_from_outcomes(&snapshot.outcomes, fallback);
            outcome.logs_written = self
                .logs
                .upsert_entries(&campaign.id, self.gateway.channel(), &writes)
                .await?;
        }

        outcome.status = update.status;
        outcome.sent_count = update.sent_count.max(campaign.sent_count);
        outcome.success_count = update.success_count;
        outcome.fail_count = update.fail_count;

        log::info!(
            "(apply_snapshot) campaña={} {} -> {} (success={}, fail={}, sent={})",
            campaign.id,
            campaign.status,
            outcome.status,
            outcome.success_count,
            outcome.fail_count,
            outcome.sent_count
        );
        Ok(outcome)
    }

    /// Campañas que todavía pueden cambiar: enviando, parciales con
    /// pendientes, o marcadas para revisión. Archivar no detiene la conciliación.
    pub async fn list_active(&self) -> CampaignResult<Vec<CampaignRecord>> {
        let candidates = self
            .store
            .list_by_status(
                &[
                    CampaignStatus::Sending,
                    CampaignStatus::Partial,
                    CampaignStatus::Sent,
                    CampaignStatus::Failed,
                ],
                true,
            )
            .await?;

        Ok(candidates
            .into_iter()
            .filter(|c| c.provider_group_id.is_some())
            .filter(|c| {
                c.status == CampaignStatus::Sending
                    || c.needs_recheck
                    || (c.status == CampaignStatus::Partial
                        && c.success_count + c.fail_count < c.sent_count)
            })
            .collect())
    }

    /// Concilia todas las activas; el error de una no corta la corrida.
    pub async fn reconcile_active(
        &self,
        cancel: &CancellationToken,
    ) -> CampaignResult<RunReport<ReconcileOutcome>> {
        let campaigns = self.list_active().await?;
        log::info!(
            "(reconcile_active) {} campañas para conciliar",
            campaigns.len()
        );

        let mut report = RunReport::new();
        for campaign in campaigns {
            if cancel.is_cancelled() {
                log::info!("(reconcile_active) Corrida cancelada, se detiene");
                report.cancelled = true;
                break;
            }
            match self.reconcile_campaign(&campaign.id).await {
                Ok(outcome) => report.push_ok(&campaign.id, outcome),
                Err(e) => {
                    log::error!(
                        "(reconcile_active) Error conciliando campaña {}: {}",
                        campaign.id,
                        e
                    );
                    report.push_err(&campaign.id, e.to_string());
                }
            }
        }
        Ok(report)
    }
}
