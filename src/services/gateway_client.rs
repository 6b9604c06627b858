//! services/gateway_client.rs
//! Adaptador al gateway SMS/MMS. El núcleo solo depende del trait
//! `GatewayClient`; `SolapiGatewayClient` es la implementación HTTP.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use sha2::Sha256;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

use crate::{
    config::campaign_config::CampaignGlobalConfig,
    error::{CampaignError, CampaignResult},
    models::{
        campaign_model::MessageType,
        gateway_model::{GroupCounts, MessageOutcome, OutboundMessage, OutcomeStatus},
    },
};

/// Máximo de mensajes por página al listar un grupo
const MESSAGE_LIST_LIMIT: usize = 1000;

#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Identificador del canal que queda en delivery_logs
    fn channel(&self) -> &str;

    /// Envía un lote; devuelve el group id del proveedor
    async fn send(
        &self,
        message: &OutboundMessage,
        recipients: &[String],
        image_ref: Option<&str>,
    ) -> CampaignResult<String>;

    /// Conteos del grupo. Pueden venir todos en cero mientras procesa.
    async fn fetch_group_counts(&self, provider_group_id: &str) -> CampaignResult<GroupCounts>;

    /// Resultado por destinatario. Vacío = "no disponible", no "cero destinatarios".
    async fn fetch_message_list(&self, provider_group_id: &str)
        -> CampaignResult<Vec<MessageOutcome>>;
}

#[derive(Clone)]
pub struct SolapiGatewayClient {
    http_client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    sender: String,
    timeout: Duration,
}

impl SolapiGatewayClient {
    pub fn new(config: &CampaignGlobalConfig) -> Self {
        Self {
            http_client: Client::new(),
            base_url: config.gateway_base_url.trim_end_matches('/').to_string(),
            api_key: config.gateway_api_key.clone(),
            api_secret: config.gateway_api_secret.clone(),
            sender: config
                .gateway_sender
                .chars()
                .filter(|c| c.is_ascii_digit())
                .collect(),
            timeout: Duration::from_secs(config.gateway_timeout_secs),
        }
    }

    /// Header `Authorization: HMAC-SHA256 apiKey=..., date=..., salt=..., signature=...`
    /// La firma es HMAC-SHA256(secret, date + salt) en hex. Se genera una
    /// por request (el proveedor rechaza firmas reutilizadas).
    fn auth_header(&self) -> CampaignResult<String> {
        let date = Utc::now().to_rfc3339();
        let salt = Uuid::new_v4().simple().to_string();
        let signature = sign(&self.api_secret, &date, &salt)?;
        Ok(format!(
            "HMAC-SHA256 apiKey={}, date={}, salt={}, signature={}",
            self.api_key, date, salt, signature
        ))
    }

    /// Ejecuta la request con timeout explícito; errores HTTP -> GatewayError
    async fn execute(&self, op: &str, req: RequestBuilder) -> CampaignResult<Value> {
        let req = req.header("Authorization", self.auth_header()?);
        let resp = with_timeout(self.timeout, op, req.send()).await??;

        let status = resp.status();
        if !status.is_success() {
            let body_txt = resp.text().await.unwrap_or_default();
            log::error!(
                "({}) Respuesta NO exitosa del gateway: status={} body='{}'",
                op,
                status,
                body_txt
            );
            return Err(CampaignError::gateway(format!(
                "{}: {} - {}",
                op,
                status,
                extract_error_message(&body_txt)
            )));
        }

        Ok(with_timeout(self.timeout, op, resp.json::<Value>()).await??)
    }
}

#[async_trait]
impl GatewayClient for SolapiGatewayClient {
    fn channel(&self) -> &str {
        "solapi"
    }

    async fn send(
        &self,
        message: &OutboundMessage,
        recipients: &[String],
        image_ref: Option<&str>,
    ) -> CampaignResult<String> {
        if self.api_key.is_empty() || self.api_secret.is_empty() || self.sender.is_empty() {
            return Err(CampaignError::gateway(
                "Credenciales de Solapi no configuradas",
            ));
        }

        let messages: Vec<Value> = recipients
            .iter()
            .map(|to| {
                let mut m = json!({
                    "to": to,
                    "from": self.sender,
                    "text": message.text,
                    "type": message.message_type.as_str(),
                });
                if let (MessageType::Mms, Some(image_id)) = (message.message_type, image_ref) {
                    m["imageId"] = json!(image_id);
                }
                m
            })
            .collect();

        log::info!(
            "(send) Enviando {} mensajes tipo {} al gateway...",
            messages.len(),
            message.message_type.as_str()
        );

        let url = format!("{}/messages/v4/send-many", self.base_url);
        let payload = json!({ "messages": messages, "allowDuplicates": false });
        let body = self
            .execute("send", self.http_client.post(&url).json(&payload))
            .await?;

        body.get("groupId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CampaignError::gateway("Respuesta de send sin groupId"))
    }

    async fn fetch_group_counts(&self, provider_group_id: &str) -> CampaignResult<GroupCounts> {
        let url = format!("{}/messages/v4/groups/{}", self.base_url, provider_group_id);
        let body = self
            .execute("fetch_group_counts", self.http_client.get(&url))
            .await?;
        Ok(parse_group_counts(&body))
    }

    async fn fetch_message_list(
        &self,
        provider_group_id: &str,
    ) -> CampaignResult<Vec<MessageOutcome>> {
        let url = format!("{}/messages/v4/list", self.base_url);
        let limit = MESSAGE_LIST_LIMIT.to_string();
        let req = self
            .http_client
            .get(&url)
            .query(&[("groupId", provider_group_id), ("limit", limit.as_str())]);
        let body = self.execute("fetch_message_list", req).await?;
        Ok(parse_message_list(&body))
    }
}

async fn with_timeout<F, T>(limit: Duration, op: &str, fut: F) -> CampaignResult<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, fut).await.map_err(|_| {
        CampaignError::gateway(format!("{}: timeout después de {}s", op, limit.as_secs()))
    })
}

pub fn sign(secret: &str, date: &str, salt: &str) -> CampaignResult<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| CampaignError::gateway(format!("HMAC init: {}", e)))?;
    mac.update(date.as_bytes());
    mac.update(salt.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn extract_error_message(body_txt: &str) -> String {
    if let Ok(v) = serde_json::from_str::<Value>(body_txt) {
        for key in ["errorMessage", "message", "error"] {
            if let Some(msg) = v.get(key).and_then(Value::as_str) {
                return msg.to_string();
            }
        }
    }
    body_txt.chars().take(200).collect()
}

fn first_number(candidates: &[Option<&Value>]) -> i64 {
    candidates
        .iter()
        .flatten()
        .find_map(|v| v.as_i64())
        .unwrap_or(0)
}

/// El proveedor no es consistente con la forma de la respuesta:
/// los conteos pueden estar en `groupInfo.count`, `count` o en la raíz.
pub fn parse_group_counts(body: &Value) -> GroupCounts {
    let group = body.get("groupInfo").unwrap_or(body);
    let count = group
        .get("count")
        .or_else(|| body.get("count"))
        .unwrap_or(group);

    let total = first_number(&[
        count.get("total"),
        count.get("sentTotal"),
        count.get("totalCount"),
        group.get("totalCount"),
        group.get("total"),
        body.get("total"),
        body.get("totalCount"),
    ]);
    let success = first_number(&[
        count.get("sentSuccess"),
        count.get("successful"),
        count.get("success"),
        count.get("successCount"),
        group.get("successCount"),
        body.get("successCount"),
    ]);
    let fail = first_number(&[
        count.get("sentFailed"),
        count.get("failed"),
        count.get("fail"),
        count.get("failCount"),
        group.get("failCount"),
        body.get("failCount"),
    ]);

    GroupCounts::new(total, success, fail)
}

/// La lista puede venir como arreglo, en `messages`/`list`/`data`,
/// o como objeto `messageList` indexado por id de mensaje.
pub fn parse_message_list(body: &Value) -> Vec<MessageOutcome> {
    let items: Vec<&Value> = if let Some(arr) = body.as_array() {
        arr.iter().collect()
    } else if let Some(arr) = ["messages", "list", "data"]
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_array))
    {
        arr.iter().collect()
    } else if let Some(obj) = body.get("messageList").and_then(Value::as_object) {
        obj.values().collect()
    } else {
        Vec::new()
    };

    items
        .into_iter()
        .filter_map(|m| {
            let to = m.get("to").and_then(Value::as_str)?;
            let status = m.get("status").and_then(Value::as_str);
            let status_code = m
                .get("statusCode")
                .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_i64().map(|n| n.to_string())));
            let sent_at = m
                .get("dateSent")
                .or_else(|| m.get("dateCreated"))
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc));

            // Se guarda tal cual; la normalización (+82, guiones) la hace quien escribe
            let mut outcome = MessageOutcome::new(
                to.trim(),
                OutcomeStatus::classify(status, status_code.as_deref()),
            );
            outcome.status_code = status_code;
            outcome.text = m.get("text").and_then(Value::as_str).map(str::to_string);
            outcome.message_type = m.get("type").and_then(Value::as_str).map(str::to_string);
            outcome.sent_at = sent_at;
            Some(outcome)
        })
        .collect()
}
