use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Archivo guardado + image_id asignado por el proveedor.
/// Varias variantes pueden compartir image_id (subidas duplicadas).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetVariant {
    pub id: String,
    pub image_id: String,
    pub storage_path: String, // relativo a la raíz del storage
    pub created_at: DateTime<Utc>,
}

impl AssetVariant {
    pub fn file_name(&self) -> &str {
        self.storage_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.storage_path)
    }

    /// Nombre canónico: `solapi-<imageId>.<ext>` (sin sufijo de timestamp)
    pub fn is_canonical_name(&self) -> bool {
        let name = self.file_name();
        let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
        stem == format!("solapi-{}", self.image_id) || stem == self.image_id
    }

    /// Una referencia de campaña apunta a esta variante concreta
    pub fn is_named_by(&self, image_ref: &str) -> bool {
        image_ref == self.id || image_ref == self.storage_path
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DedupReport {
    pub groups_scanned: usize,
    pub groups_deduplicated: usize,
    pub variants_deleted: Vec<String>,
    pub variants_kept: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub files_seen: usize,
    pub variants_registered: usize,
}
