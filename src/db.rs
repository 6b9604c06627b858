//! db.rs
//! Conexión a SQLite y helpers de fechas (se guardan como RFC 3339 en UTC).

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;

use crate::error::CampaignResult;

pub async fn setup_database(db_path: &str) -> Result<Pool<Sqlite>> {
    // Crear carpeta contenedora si hace falta
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("No se pudo crear directorio {:?}", parent))?;
        }
    }

    let db_url = format!("sqlite:{}", db_path);
    log::info!("Conectando a SQLite en {}", db_url);

    let options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("No se pudo conectar a la base de datos SQLite.")?;

    Ok(db_pool)
}

pub async fn run_migrations(db_pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(db_pool)
        .await
        .context("Fallo en migraciones")?;
    Ok(())
}

pub fn to_db_time(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn from_db_time(raw: &str) -> CampaignResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

pub fn from_db_time_opt(raw: Option<String>) -> CampaignResult<Option<DateTime<Utc>>> {
    raw.as_deref().map(from_db_time).transpose()
}
