//! services/batch_planner.rs
//! Divide una lista de destinatarios en lotes acotados y les asigna
//! horarios escalonados. Función pura, sin efectos secundarios.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::error::{CampaignError, CampaignResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedBatch {
    pub recipients: Vec<String>,
    pub scheduled_at: DateTime<Utc>,
}

/// Parte `recipients` en `ceil(N/B)` lotes de a lo sumo `max_batch_size`,
/// respetando el orden de entrada. El lote k sale en `start + k * interval`,
/// siempre expresado en UTC sin importar el offset de `start`.
pub fn plan_batches<Tz: TimeZone>(
    recipients: &[String],
    max_batch_size: i64,
    start: DateTime<Tz>,
    interval: Duration,
) -> CampaignResult<Vec<PlannedBatch>> {
    if recipients.is_empty() {
        return Err(CampaignError::invalid_input(
            "La lista de destinatarios está vacía",
        ));
    }
    if max_batch_size <= 0 {
        return Err(CampaignError::invalid_input(format!(
            "Tamaño de lote inválido: {}",
            max_batch_size
        )));
    }
    if interval < Duration::zero() {
        return Err(CampaignError::invalid_input(format!(
            "Intervalo negativo entre lotes: {}s",
            interval.num_seconds()
        )));
    }

    let start_utc = start.with_timezone(&Utc);
    let size = max_batch_size as usize;

    let mut plan = Vec::with_capacity(recipients.len().div_ceil(size));
    for (k, chunk) in recipients.chunks(size).enumerate() {
        let offset = interval
            .checked_mul(k as i32)
            .ok_or_else(|| CampaignError::invalid_input("Intervalo fuera de rango"))?;
        let scheduled_at = start_utc
            .checked_add_signed(offset)
            .ok_or_else(|| CampaignError::invalid_input("Horario fuera de rango"))?;
        plan.push(PlannedBatch {
            recipients: chunk.to_vec(),
            scheduled_at,
        });
    }

    Ok(plan)
}
