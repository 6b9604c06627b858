//! tests/common.rs
//! Helpers compartidos: DB en memoria con migraciones y un gateway falso.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use crate::{
    error::{CampaignError, CampaignResult},
    models::{
        campaign_model::{CampaignRecord, CampaignStatus, MessageType, NewCampaign},
        gateway_model::{GroupCounts, MessageOutcome, OutboundMessage},
    },
    services::{
        campaign_store::{CampaignStore, CountUpdate},
        gateway_client::GatewayClient,
    },
};

/// Una sola conexión: con `sqlite::memory:` cada conexión es otra DB
pub async fn test_pool() -> Pool<Sqlite> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("No se pudo abrir SQLite en memoria");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Fallo en migraciones de test");
    pool
}

pub fn phones(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("010{:08}", i)).collect()
}

pub fn new_campaign(recipients: Vec<String>, status: CampaignStatus) -> NewCampaign {
    NewCampaign {
        message_text: "Promo de otoño".to_string(),
        message_type: MessageType::Sms,
        image_ref: None,
        recipients,
        status,
        scheduled_at: None,
        note: None,
    }
}

/// Campaña ya enviada al gateway con el group id dado
pub async fn sending_campaign(
    store: &CampaignStore,
    recipients: Vec<String>,
    group_id: &str,
) -> CampaignRecord {
    let created = store
        .create_campaign(new_campaign(recipients, CampaignStatus::Scheduled))
        .await
        .unwrap();
    assert!(store.claim_for_sending(&created.id).await.unwrap());
    store.attach_group_id(&created.id, group_id).await.unwrap();
    store.get_campaign(&created.id).await.unwrap()
}

/// Campaña en estado final con conteos, sin logs
pub async fn settled_campaign(
    store: &CampaignStore,
    recipients: Vec<String>,
    status: CampaignStatus,
    success: i64,
    fail: i64,
) -> CampaignRecord {
    let n = recipients.len() as i64;
    let group_id = format!("G-{}", uuid::Uuid::new_v4().simple());
    let c = sending_campaign(store, recipients, &group_id).await;
    let update = CountUpdate {
        status,
        sent_count: n,
        success_count: success,
        fail_count: fail,
    };
    assert!(store.apply_counts(&c.id, update).await.unwrap());
    store.get_campaign(&c.id).await.unwrap()
}

#[derive(Debug, Clone)]
pub struct SentBatch {
    pub message: OutboundMessage,
    pub recipients: Vec<String>,
    pub image_ref: Option<String>,
}

/// Gateway programable: respuestas fijas y registro de lo enviado
#[derive(Default)]
pub struct FakeGateway {
    pub reject_sends: Mutex<bool>,
    pub group_counts: Mutex<GroupCounts>,
    pub message_list: Mutex<Vec<MessageOutcome>>,
    pub fail_message_list: Mutex<bool>,
    /// Groups cuyo fetch siempre falla
    pub failing_groups: Mutex<HashSet<String>>,
    pub send_delay_ms: Mutex<u64>,
    pub sent: Mutex<Vec<SentBatch>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_counts(&self, total: i64, success: i64, fail: i64) {
        *self.group_counts.lock().unwrap() = GroupCounts::new(total, success, fail);
    }

    pub fn set_message_list(&self, outcomes: Vec<MessageOutcome>) {
        *self.message_list.lock().unwrap() = outcomes;
    }

    pub fn sent_batches(&self) -> Vec<SentBatch> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_group(&self, group_id: &str) {
        self.failing_groups.lock().unwrap().insert(group_id.to_string());
    }

    fn check_group(&self, group_id: &str) -> CampaignResult<()> {
        if self.failing_groups.lock().unwrap().contains(group_id) {
            return Err(CampaignError::gateway(format!("group {}: 503", group_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl GatewayClient for FakeGateway {
    fn channel(&self) -> &str {
        "fake"
    }

    async fn send(
        &self,
        message: &OutboundMessage,
        recipients: &[String],
        image_ref: Option<&str>,
    ) -> CampaignResult<String> {
        let delay = *self.send_delay_ms.lock().unwrap();
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if *self.reject_sends.lock().unwrap() {
            return Err(CampaignError::gateway("401 Unauthorized"));
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(SentBatch {
            message: message.clone(),
            recipients: recipients.to_vec(),
            image_ref: image_ref.map(str::to_string),
        });
        Ok(format!("G{}", sent.len()))
    }

    async fn fetch_group_counts(&self, provider_group_id: &str) -> CampaignResult<GroupCounts> {
        self.check_group(provider_group_id)?;
        Ok(*self.group_counts.lock().unwrap())
    }

    async fn fetch_message_list(
        &self,
        provider_group_id: &str,
    ) -> CampaignResult<Vec<MessageOutcome>> {
        self.check_group(provider_group_id)?;
        if *self.fail_message_list.lock().unwrap() {
            return Err(CampaignError::gateway("fetch_message_list: timeout"));
        }
        Ok(self.message_list.lock().unwrap().clone())
    }
}

pub fn outcome_at(
    recipient: &str,
    status: crate::models::gateway_model::OutcomeStatus,
    sent_at: Option<DateTime<Utc>>,
) -> MessageOutcome {
    let mut o = MessageOutcome::new(recipient, status);
    o.sent_at = sent_at;
    o
}
