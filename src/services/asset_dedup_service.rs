//! services/asset_dedup_service.rs
//! Imágenes MMS: varias copias guardadas pueden compartir el mismo
//! image_id del proveedor. Aquí se resuelven referencias de campañas y
//! se eliminan las copias que nadie usa.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::{from_db_time, to_db_time},
    error::{CampaignError, CampaignResult},
    models::asset_model::{AssetVariant, DedupReport, IndexReport},
    services::campaign_store::CampaignStore,
};

/// Prefijo de los archivos de imágenes del proveedor en el storage
const PROVIDER_FILE_PREFIX: &str = "solapi-";

/// Origen de las variantes (metadatos + bytes en storage)
#[async_trait]
pub trait AssetSource: Send + Sync {
    async fn list_variants(&self) -> CampaignResult<Vec<AssetVariant>>;

    async fn list_variants_by_image_id(&self, image_id: &str)
        -> CampaignResult<Vec<AssetVariant>>;

    /// Borra el archivo y su fila de metadatos
    async fn delete_variant(&self, variant: &AssetVariant) -> CampaignResult<()>;
}

/// `solapi-<imageId>.jpg` o `solapi-<imageId>-<timestamp>.jpg` -> imageId
pub fn image_id_from_file_name(name: &str) -> Option<String> {
    let rest = name.strip_prefix(PROVIDER_FILE_PREFIX)?;
    let stem = rest.rsplit_once('.').map(|(s, _)| s).unwrap_or(rest);
    let id = stem.split('-').next().unwrap_or_default();
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(id.to_string())
}

/// Decide qué conservar de un grupo (mismo image_id).
/// - Si alguna campaña viva nombra variantes concretas, se conservan
///   exactamente esas.
/// - Si no, se conserva una sola: la canónica más antigua, o la más
///   antigua a secas.
/// Devuelve (conservar, borrar).
pub fn plan_group(
    group: &[AssetVariant],
    live_refs: &HashSet<String>,
) -> (Vec<AssetVariant>, Vec<AssetVariant>) {
    if group.len() <= 1 {
        return (group.to_vec(), Vec::new());
    }

    let (referenced, rest): (Vec<_>, Vec<_>) = group
        .iter()
        .cloned()
        .partition(|v| live_refs.iter().any(|r| v.is_named_by(r)));

    if !referenced.is_empty() {
        return (referenced, rest);
    }

    let mut sorted = group.to_vec();
    sorted.sort_by(|a, b| {
        b.is_canonical_name()
            .cmp(&a.is_canonical_name())
            .then(a.created_at.cmp(&b.created_at))
            .then(a.storage_path.cmp(&b.storage_path))
    });
    let keep = sorted.remove(0);
    (vec![keep], sorted)
}

#[derive(Clone)]
pub struct AssetDedupService {
    source: Arc<dyn AssetSource>,
    store: CampaignStore,
}

impl AssetDedupService {
    pub fn new(source: Arc<dyn AssetSource>, store: CampaignStore) -> Self {
        Self { source, store }
    }

    /// Traduce el image_ref de una campaña al image_id que espera el
    /// gateway. None si la referencia apunta a un archivo desconocido.
    pub async fn resolve_image_id(&self, image_ref: &str) -> CampaignResult<Option<String>> {
        let variants = self.source.list_variants().await?;
        if let Some(v) = variants.iter().find(|v| v.is_named_by(image_ref)) {
            return Ok(Some(v.image_id.clone()));
        }
        if variants.iter().any(|v| v.image_id == image_ref) {
            return Ok(Some(image_ref.to_string()));
        }
        // Un id del proveedor que todavía no tiene copia local
        let looks_like_path = image_ref.contains('/') || image_ref.contains('.');
        if !looks_like_path && !image_ref.is_empty() {
            return Ok(Some(image_ref.to_string()));
        }
        Ok(None)
    }

    /// Deduplica un solo image_id
    pub async fn dedup_image(&self, image_id: &str) -> CampaignResult<DedupReport> {
        let group = self.source.list_variants_by_image_id(image_id).await?;
        let live_refs: HashSet<String> = self.store.live_image_refs().await?.into_iter().collect();
        let mut groups = BTreeMap::new();
        if !group.is_empty() {
            groups.insert(image_id.to_string(), group);
        }
        self.apply_plan(groups, &live_refs).await
    }

    /// Deduplica todos los grupos. Primero arma el plan completo y recién
    /// después borra; el primer error corta la ejecución.
    pub async fn dedup(&self) -> CampaignResult<DedupReport> {
        let variants = self.source.list_variants().await?;
        let live_refs: HashSet<String> = self.store.live_image_refs().await?.into_iter().collect();

        let mut groups: BTreeMap<String, Vec<AssetVariant>> = BTreeMap::new();
        for v in variants {
            groups.entry(v.image_id.clone()).or_default().push(v);
        }
        self.apply_plan(groups, &live_refs).await
    }

    async fn apply_plan(
        &self,
        groups: BTreeMap<String, Vec<AssetVariant>>,
        live_refs: &HashSet<String>,
    ) -> CampaignResult<DedupReport> {
        let mut report = DedupReport {
            groups_scanned: groups.len(),
            ..Default::default()
        };

        let mut to_delete = Vec::new();
        for (image_id, group) in &groups {
            let (keep, delete) = plan_group(group, live_refs);
            if !delete.is_empty() {
                log::info!(
                    "(dedup) image_id={} conserva {} y borra {} variantes",
                    image_id,
                    keep.len(),
                    delete.len()
                );
                report.groups_deduplicated += 1;
            }
            report
                .variants_kept
                .extend(keep.iter().map(|v| v.storage_path.clone()));
            to_delete.extend(delete);
        }

        for variant in &to_delete {
            self.source.delete_variant(variant).await.map_err(|e| {
                log::error!(
                    "(dedup) Fallo borrando {}: {}. Se aborta la deduplicación",
                    variant.storage_path,
                    e
                );
                e
            })?;
            report.variants_deleted.push(variant.storage_path.clone());
        }

        log::info!(
            "(dedup) {} grupos, {} variantes borradas",
            report.groups_scanned,
            report.variants_deleted.len()
        );
        Ok(report)
    }
}

/// Metadatos en SQLite + archivos bajo `storage_root`
#[derive(Clone)]
pub struct SqliteAssetSource {
    db_pool: Pool<Sqlite>,
    storage_root: PathBuf,
}

impl SqliteAssetSource {
    pub fn new(db_pool: Pool<Sqlite>, storage_root: impl Into<PathBuf>) -> Self {
        Self {
            db_pool,
            storage_root: storage_root.into(),
        }
    }

    /// Registra una variante; si el path ya existe no hace nada.
    pub async fn register_variant(
        &self,
        image_id: &str,
        storage_path: &str,
        created_at: DateTime<Utc>,
    ) -> CampaignResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO asset_variants (id, image_id, storage_path, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(storage_path) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(image_id)
        .bind(storage_path)
        .bind(to_db_time(&created_at))
        .execute(&self.db_pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Recorre el storage buscando `solapi-*` y registra lo que falte.
    /// La carpeta `temp/` se ignora.
    pub async fn index_storage(&self) -> CampaignResult<IndexReport> {
        let mut report = IndexReport::default();
        let mut pending = vec![self.storage_root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(e) => e,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(CampaignError::Storage(format!(
                        "No se pudo leer {:?}: {}",
                        dir, e
                    )))
                }
            };

            while let Some(entry) = entries.next_entry().await.map_err(|e| {
                CampaignError::Storage(format!("Error leyendo {:?}: {}", dir, e))
            })? {
                let path = entry.path();
                let relative = self.relative_path(&path);
                let file_type = match entry.file_type().await {
                    Ok(ft) => ft,
                    Err(_) => continue,
                };

                if file_type.is_dir() {
                    if relative != "temp" {
                        pending.push(path);
                    }
                    continue;
                }

                let name = entry.file_name().to_string_lossy().to_string();
                let Some(image_id) = image_id_from_file_name(&name) else {
                    continue;
                };
                report.files_seen += 1;

                let created_at = entry
                    .metadata()
                    .await
                    .ok()
                    .and_then(|m| m.created().or_else(|_| m.modified()).ok())
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(Utc::now);

                if self.register_variant(&image_id, &relative, created_at).await? {
                    report.variants_registered += 1;
                }
            }
        }

        log::info!(
            "(index_storage) {} archivos del proveedor, {} nuevos",
            report.files_seen,
            report.variants_registered
        );
        Ok(report)
    }

    fn relative_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.storage_root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    async fn query_variants(&self, image_id: Option<&str>) -> CampaignResult<Vec<AssetVariant>> {
        let rows = match image_id {
            Some(id) => {
                sqlx::query(
                    "SELECT id, image_id, storage_path, created_at FROM asset_variants WHERE image_id = ?1 ORDER BY created_at",
                )
                .bind(id)
                .fetch_all(&self.db_pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, image_id, storage_path, created_at FROM asset_variants ORDER BY created_at",
                )
                .fetch_all(&self.db_pool)
                .await?
            }
        };

        let mut result = Vec::with_capacity(rows.len());
        for r in rows {
            let created_at: String = r.try_get("created_at")?;
            result.push(AssetVariant {
                id: r.try_get("id")?,
                image_id: r.try_get("image_id")?,
                storage_path: r.try_get("storage_path")?,
                created_at: from_db_time(&created_at)?,
            });
        }
        Ok(result)
    }
}

#[async_trait]
impl AssetSource for SqliteAssetSource {
    async fn list_variants(&self) -> CampaignResult<Vec<AssetVariant>> {
        self.query_variants(None).await
    }

    async fn list_variants_by_image_id(
        &self,
        image_id: &str,
    ) -> CampaignResult<Vec<AssetVariant>> {
        self.query_variants(Some(image_id)).await
    }

    async fn delete_variant(&self, variant: &AssetVariant) -> CampaignResult<()> {
        let path = self.storage_root.join(&variant.storage_path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            // Ya no estaba en storage: solo falta limpiar la fila
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(CampaignError::Storage(format!(
                    "No se pudo borrar {:?}: {}",
                    path, e
                )))
            }
        }

        sqlx::query("DELETE FROM asset_variants WHERE id = ?1")
            .bind(&variant.id)
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }
}
