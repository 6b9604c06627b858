use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

use crate::{
    db::{from_db_time, from_db_time_opt, to_db_time},
    error::{CampaignError, CampaignResult},
    models::campaign_model::{
        CampaignRecord, CampaignStatus, ListCampaignsResponse, NewCampaign,
    },
};

const CAMPAIGN_COLUMNS: &str = r#"
    id, message_text, message_type, image_ref, recipients, status,
    scheduled_at, provider_group_id, sent_count, success_count, fail_count,
    note, sent_at, needs_recheck, archived_at, created_at, updated_at
"#;

const MAX_PAGE_SIZE: u64 = 200;

/// Conteos refinados por el reconciliador
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountUpdate {
    pub status: CampaignStatus,
    pub sent_count: i64,
    pub success_count: i64,
    pub fail_count: i64,
}

#[derive(Clone, Debug)]
pub struct CampaignStore {
    db_pool: Pool<Sqlite>,
}

impl CampaignStore {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        CampaignStore { db_pool }
    }

    /// Inserta un lote nuevo (draft o scheduled)
    pub async fn create_campaign(&self, new: NewCampaign) -> CampaignResult<CampaignRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let now_str = to_db_time(&now);
        let recipients_json = serde_json::to_string(&new.recipients)?;
        let scheduled_at = new.scheduled_at.as_ref().map(to_db_time);

        sqlx::query(
            r#"
            INSERT INTO campaigns (
                id, message_text, message_type, image_ref, recipients, status,
                scheduled_at, provider_group_id, sent_count, success_count, fail_count,
                note, sent_at, needs_recheck, archived_at, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, 0, 0, 0, ?8, NULL, 0, NULL, ?9, ?9)
            "#,
        )
        .bind(&id)
        .bind(&new.message_text)
        .bind(new.message_type.as_str())
        .bind(&new.image_ref)
        .bind(recipients_json)
        .bind(new.status.as_str())
        .bind(scheduled_at)
        .bind(&new.note)
        .bind(now_str)
        .execute(&self.db_pool)
        .await?;

        Ok(CampaignRecord {
            id,
            message_text: new.message_text,
            message_type: new.message_type,
            image_ref: new.image_ref,
            recipients: new.recipients,
            status: new.status,
            scheduled_at: new.scheduled_at,
            provider_group_id: None,
            sent_count: 0,
            success_count: 0,
            fail_count: 0,
            note: new.note,
            sent_at: None,
            needs_recheck: false,
            archived_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get_campaign(&self, id: &str) -> CampaignResult<CampaignRecord> {
        let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| CampaignError::NotFound(format!("campaña {}", id)))?;

        row_to_record(&row)
    }

    /// Lista campañas con paginación (más recientes primero)
    pub async fn list_campaigns(
        &self,
        page: u64,
        page_size: u64,
    ) -> CampaignResult<ListCampaignsResponse> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1).saturating_mul(page_size).min(i64::MAX as u64);

        let total: i64 = sqlx::query("SELECT COUNT(*) AS cnt FROM campaigns")
            .fetch_one(&self.db_pool)
            .await?
            .try_get("cnt")?;

        let sql = format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
        );
        let rows = sqlx::query(&sql)
            .bind(page_size as i64)
            .bind(offset as i64)
            .fetch_all(&self.db_pool)
            .await?;

        let items = rows
            .iter()
            .map(row_to_record)
            .collect::<CampaignResult<Vec<_>>>()?;

        Ok(ListCampaignsResponse {
            total: total as u64,
            page,
            page_size,
            items,
        })
    }

    /// Campañas en alguno de los estados dados. Las archivadas solo se
    /// incluyen con `include_archived` (conciliación y recuperación de logs).
    pub async fn list_by_status(
        &self,
        statuses: &[CampaignStatus],
        include_archived: bool,
    ) -> CampaignResult<Vec<CampaignRecord>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (1..=statuses.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let archived_filter = if include_archived {
            ""
        } else {
            "archived_at IS NULL AND "
        };
        let sql = format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns \
             WHERE {archived_filter}status IN ({placeholders}) \
             ORDER BY created_at ASC"
        );

        let mut query = sqlx::query(&sql);
        for s in statuses {
            query = query.bind(s.as_str());
        }
        let rows = query.fetch_all(&self.db_pool).await?;

        rows.iter().map(row_to_record).collect()
    }

    /// Lotes 'scheduled' cuyo horario ya llegó
    pub async fn list_due_scheduled(
        &self,
        now: DateTime<Utc>,
    ) -> CampaignResult<Vec<CampaignRecord>> {
        let scheduled = self
            .list_by_status(&[CampaignStatus::Scheduled], false)
            .await?;
        Ok(scheduled
            .into_iter()
            .filter(|c| c.scheduled_at.map(|t| t <= now).unwrap_or(true))
            .collect())
    }

    pub async fn find_by_group_id(&self, group_id: &str) -> CampaignResult<Option<CampaignRecord>> {
        let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE provider_group_id = ?1");
        let row = sqlx::query(&sql)
            .bind(group_id)
            .fetch_optional(&self.db_pool)
            .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    /// Toma el registro para enviarlo: draft/scheduled -> sending, solo si
    /// sigue vivo. Devuelve false si otro proceso ya lo tomó.
    pub async fn claim_for_sending(&self, id: &str) -> CampaignResult<bool> {
        let now = to_db_time(&Utc::now());
        let result = sqlx::query(
            r#"
            UPDATE campaigns
            SET status = 'sending', updated_at = ?2
            WHERE id = ?1
              AND status IN ('draft', 'scheduled')
              AND archived_at IS NULL
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Guarda el group id que devolvió el gateway para un registro ya tomado
    pub async fn attach_group_id(&self, id: &str, provider_group_id: &str) -> CampaignResult<()> {
        let now = to_db_time(&Utc::now());
        sqlx::query(
            r#"
            UPDATE campaigns
            SET provider_group_id = ?2, updated_at = ?3
            WHERE id = ?1 AND provider_group_id IS NULL
            "#,
        )
        .bind(id)
        .bind(provider_group_id)
        .bind(now)
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }

    /// Rechazo del gateway: el registro tomado vuelve a 'draft'
    pub async fn revert_to_draft(&self, id: &str) -> CampaignResult<()> {
        let now = to_db_time(&Utc::now());
        sqlx::query(
            r#"
            UPDATE campaigns
            SET status = 'draft', updated_at = ?2
            WHERE id = ?1 AND status = 'sending' AND provider_group_id IS NULL
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }

    /// Aplica conteos solo si no retroceden respecto a lo guardado
    /// (compare-and-set). Devuelve false si otra escritura ya dejó
    /// conteos mayores.
    pub async fn apply_counts(&self, id: &str, update: CountUpdate) -> CampaignResult<bool> {
        let now = Utc::now();
        let now_str = to_db_time(&now);
        let sent_at = update.status.is_settled().then(|| now_str.clone());

        let result = sqlx::query(
            r#"
            UPDATE campaigns
            SET status = ?2,
                sent_count = MAX(sent_count, ?3),
                success_count = ?4,
                fail_count = ?5,
                needs_recheck = 0,
                sent_at = COALESCE(sent_at, ?6),
                updated_at = ?7
            WHERE id = ?1
              AND success_count <= ?4
              AND fail_count <= ?5
            "#,
        )
        .bind(id)
        .bind(update.status.as_str())
        .bind(update.sent_count)
        .bind(update.success_count)
        .bind(update.fail_count)
        .bind(sent_at)
        .bind(now_str)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn flag_recheck(&self, id: &str) -> CampaignResult<()> {
        let now = to_db_time(&Utc::now());
        sqlx::query("UPDATE campaigns SET needs_recheck = 1, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(now)
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }

    pub async fn archive_campaign(&self, id: &str) -> CampaignResult<()> {
        let now = to_db_time(&Utc::now());
        let result = sqlx::query(
            "UPDATE campaigns SET archived_at = COALESCE(archived_at, ?2), updated_at = ?2 WHERE id = ?1",
        )
        .bind(id)
        .bind(now)
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CampaignError::NotFound(format!("campaña {}", id)));
        }
        Ok(())
    }

    /// Inserta una campaña reconstruida desde un grupo del proveedor
    /// (ya enviada, con conteos) en un solo INSERT.
    pub async fn insert_recovered(
        &self,
        new: NewCampaign,
        provider_group_id: &str,
        counts: CountUpdate,
        sent_at: DateTime<Utc>,
    ) -> CampaignResult<CampaignRecord> {
        let id = Uuid::new_v4().to_string();
        let now_str = to_db_time(&Utc::now());
        let recipients_json = serde_json::to_string(&new.recipients)?;

        sqlx::query(
            r#"
            INSERT INTO campaigns (
                id, message_text, message_type, image_ref, recipients, status,
                scheduled_at, provider_group_id, sent_count, success_count, fail_count,
                note, sent_at, needs_recheck, archived_at, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8, ?9, ?10, ?11, ?12, 0, NULL, ?12, ?13)
            "#,
        )
        .bind(&id)
        .bind(&new.message_text)
        .bind(new.message_type.as_str())
        .bind(&new.image_ref)
        .bind(recipients_json)
        .bind(counts.status.as_str())
        .bind(provider_group_id)
        .bind(counts.sent_count)
        .bind(counts.success_count)
        .bind(counts.fail_count)
        .bind(&new.note)
        .bind(to_db_time(&sent_at))
        .bind(now_str)
        .execute(&self.db_pool)
        .await?;

        self.get_campaign(&id).await
    }

    /// image_ref de todas las campañas vivas
    pub async fn live_image_refs(&self) -> CampaignResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT image_ref FROM campaigns WHERE archived_at IS NULL AND image_ref IS NOT NULL",
        )
        .fetch_all(&self.db_pool)
        .await?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("image_ref").map_err(CampaignError::from))
            .collect()
    }
}

fn row_to_record(row: &SqliteRow) -> CampaignResult<CampaignRecord> {
    let recipients_json: String = row.try_get("recipients")?;
    let message_type: String = row.try_get("message_type")?;
    let status: String = row.try_get("status")?;
    let needs_recheck: i64 = row.try_get("needs_recheck")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(CampaignRecord {
        id: row.try_get("id")?,
        message_text: row.try_get("message_text")?,
        message_type: message_type.parse()?,
        image_ref: row.try_get("image_ref")?,
        recipients: serde_json::from_str(&recipients_json)?,
        status: status.parse()?,
        scheduled_at: from_db_time_opt(row.try_get("scheduled_at")?)?,
        provider_group_id: row.try_get("provider_group_id")?,
        sent_count: row.try_get("sent_count")?,
        success_count: row.try_get("success_count")?,
        fail_count: row.try_get("fail_count")?,
        note: row.try_get("note")?,
        sent_at: from_db_time_opt(row.try_get("sent_at")?)?,
        needs_recheck: needs_recheck != 0,
        archived_at: from_db_time_opt(row.try_get("archived_at")?)?,
        created_at: from_db_time(&created_at)?,
        updated_at: from_db_time(&updated_at)?,
    })
}
