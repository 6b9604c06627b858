use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

use crate::{
    db::{from_db_time, to_db_time},
    error::CampaignResult,
    models::delivery_log_model::{DeliveryLogEntry, DeliveryStatus},
};

/// Fila a escribir; la clave natural es (campaign_id, recipient_phone)
#[derive(Debug, Clone)]
pub struct DeliveryLogWrite {
    pub recipient_phone: String,
    pub status: DeliveryStatus,
    pub sent_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct DeliveryLogService {
    db_pool: Pool<Sqlite>,
}

impl DeliveryLogService {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        DeliveryLogService { db_pool }
    }

    /// Upsert sobre (campaign_id, recipient_phone): si la fila existe se
    /// actualiza el estado (sin volver de 'failed' a 'sent'), nunca se
    /// duplica. Devuelve filas afectadas.
    pub async fn upsert_entries(
        &self,
        campaign_id: &str,
        channel: &str,
        entries: &[DeliveryLogWrite],
    ) -> CampaignResult<u64> {
        self.write_entries(campaign_id, channel, entries, true).await
    }

    /// Igual que `upsert_entries` pero sin pisar filas existentes:
    /// lo que ya se registró de verdad gana sobre lo sintetizado.
    pub async fn insert_missing_entries(
        &self,
        campaign_id: &str,
        channel: &str,
        entries: &[DeliveryLogWrite],
    ) -> CampaignResult<u64> {
        self.write_entries(campaign_id, channel, entries, false).await
    }

    async fn write_entries(
        &self,
        campaign_id: &str,
        channel: &str,
        entries: &[DeliveryLogWrite],
        update_existing: bool,
    ) -> CampaignResult<u64> {
        if entries.is_empty() {
            return Ok(0);
        }

        let conflict_sql = if update_existing {
            // 'failed' es definitivo: un snapshot viejo con 'sent' no lo pisa
            r#"DO UPDATE SET
                status = CASE WHEN delivery_logs.status = 'failed' THEN 'failed' ELSE excluded.status END,
                channel = excluded.channel"#
        } else {
            "DO NOTHING"
        };
        let sql = format!(
            r#"
            INSERT INTO delivery_logs (id, campaign_id, recipient_phone, status, channel, sent_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(campaign_id, recipient_phone) {conflict_sql}
            "#
        );

        // Todo o nada por campaña
        let mut tx = self.db_pool.begin().await?;
        let mut affected = 0;
        for e in entries {
            let result = sqlx::query(&sql)
                .bind(Uuid::new_v4().to_string())
                .bind(campaign_id)
                .bind(&e.recipient_phone)
                .bind(e.status.as_str())
                .bind(channel)
                .bind(to_db_time(&e.sent_at))
                .execute(&mut *tx)
                .await?;
            affected += result.rows_affected();
        }
        tx.commit().await?;

        Ok(affected)
    }

    pub async fn count_for_campaign(&self, campaign_id: &str) -> CampaignResult<i64> {
        let cnt: i64 =
            sqlx::query("SELECT COUNT(*) AS cnt FROM delivery_logs WHERE campaign_id = ?1")
                .bind(campaign_id)
                .fetch_one(&self.db_pool)
                .await?
                .try_get("cnt")?;
        Ok(cnt)
    }

    pub async fn list_for_campaign(&self, campaign_id: &str) -> CampaignResult<Vec<DeliveryLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, campaign_id, recipient_phone, status, channel, sent_at
            FROM delivery_logs
            WHERE campaign_id = ?1
            ORDER BY recipient_phone
            "#,
        )
        .bind(campaign_id)
        .fetch_all(&self.db_pool)
        .await?;

        let mut result = Vec::with_capacity(rows.len());
        for r in rows {
            let status: String = r.try_get("status")?;
            let sent_at: String = r.try_get("sent_at")?;
            result.push(DeliveryLogEntry {
                id: r.try_get("id")?,
                campaign_id: r.try_get("campaign_id")?,
                recipient_phone: r.try_get("recipient_phone")?,
                status: status.parse()?,
                channel: r.try_get("channel")?,
                sent_at: from_db_time(&sent_at)?,
            });
        }
        Ok(result)
    }
}
