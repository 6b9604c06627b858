//! services/recipient_service.rs
//! Normalización de números y filtro de clientes con opt-out.

use sqlx::{Pool, Row, Sqlite};
use std::collections::HashSet;

use crate::error::{CampaignError, CampaignResult};

/// Resultado de normalizar la lista que manda el operador
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedRecipients {
    pub accepted: Vec<String>,
    pub rejected: Vec<String>,
}

/// Deja solo dígitos; `+82 10-...` pasa a `010...`.
/// Devuelve None si no es un celular válido (01X + 7-8 dígitos).
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let mut digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

    if trimmed.starts_with('+') {
        digits = digits.strip_prefix("82").map(|rest| format!("0{}", rest))?;
    }

    let valid_len = digits.len() == 10 || digits.len() == 11;
    if valid_len && digits.starts_with("01") {
        Some(digits)
    } else {
        None
    }
}

/// Normaliza en orden, descartando inválidos y duplicados
/// (se conserva la primera aparición).
pub fn normalize_recipients(raw: &[String]) -> NormalizedRecipients {
    let mut seen = HashSet::new();
    let mut out = NormalizedRecipients::default();

    for r in raw {
        match normalize_phone(r) {
            Some(phone) => {
                if seen.insert(phone.clone()) {
                    out.accepted.push(phone);
                }
            }
            None => out.rejected.push(r.clone()),
        }
    }
    out
}

#[derive(Clone)]
pub struct RecipientService {
    db_pool: Pool<Sqlite>,
}

impl RecipientService {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        RecipientService { db_pool }
    }

    /// Separa los destinatarios con opt-out. Devuelve (permitidos, excluidos).
    pub async fn exclude_opted_out(
        &self,
        recipients: Vec<String>,
    ) -> CampaignResult<(Vec<String>, Vec<String>)> {
        let rows = sqlx::query("SELECT phone FROM customers WHERE opt_out = 1")
            .fetch_all(&self.db_pool)
            .await?;

        let mut blocked = HashSet::new();
        for row in rows {
            let phone: String = row.try_get("phone")?;
            // Los teléfonos de clientes pueden estar guardados con guiones
            if let Some(p) = normalize_phone(&phone) {
                blocked.insert(p);
            }
        }

        if blocked.is_empty() {
            return Ok((recipients, Vec::new()));
        }

        let (excluded, allowed): (Vec<_>, Vec<_>) =
            recipients.into_iter().partition(|p| blocked.contains(p));

        log::info!(
            "(exclude_opted_out) {} destinatarios excluidos por opt-out",
            excluded.len()
        );
        Ok((allowed, excluded))
    }

    pub async fn set_opt_out(&self, phone: &str, opt_out: bool) -> CampaignResult<()> {
        let phone = normalize_phone(phone)
            .ok_or_else(|| CampaignError::invalid_input(format!("teléfono inválido: {}", phone)))?;
        sqlx::query(
            r#"
            INSERT INTO customers (phone, opt_out) VALUES (?1, ?2)
            ON CONFLICT(phone) DO UPDATE SET opt_out = excluded.opt_out
            "#,
        )
        .bind(&phone)
        .bind(opt_out as i64)
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }
}
