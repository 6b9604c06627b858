//! tests/asset_dedup_tests.rs
//! Indexado del storage de imágenes y deduplicación por image_id.

#[cfg(test)]
mod tests {
    use actix_rt::test;
    use chrono::{Duration, Utc};
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Arc;

    use crate::models::asset_model::AssetVariant;
    use crate::models::campaign_model::{CampaignStatus, MessageType};
    use crate::services::asset_dedup_service::{
        image_id_from_file_name, plan_group, AssetDedupService, AssetSource, SqliteAssetSource,
    };
    use crate::services::campaign_store::CampaignStore;
    use crate::tests::common::{new_campaign, phones, test_pool};

    fn variant(id: &str, path: &str, age_minutes: i64) -> AssetVariant {
        AssetVariant {
            id: id.to_string(),
            image_id: "IMG01".to_string(),
            storage_path: path.to_string(),
            created_at: Utc::now() - Duration::minutes(age_minutes),
        }
    }

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"jpeg").unwrap();
    }

    #[test]
    async fn test_image_id_from_file_name() {
        assert_eq!(image_id_from_file_name("solapi-ABC123.jpg").as_deref(), Some("ABC123"));
        assert_eq!(
            image_id_from_file_name("solapi-ABC123-1710000000.png").as_deref(),
            Some("ABC123")
        );
        assert_eq!(image_id_from_file_name("banner.jpg"), None);
        assert_eq!(image_id_from_file_name("solapi-.jpg"), None);
    }

    #[test]
    async fn test_plan_prefers_canonical_then_oldest() {
        let group = vec![
            variant("a", "solapi-IMG01-1.jpg", 30),
            variant("b", "solapi-IMG01.jpg", 10),
            variant("c", "solapi-IMG01-2.jpg", 5),
        ];
        let (keep, delete) = plan_group(&group, &HashSet::new());
        assert_eq!(keep.len(), 1);
        assert_eq!(keep[0].id, "b");
        assert_eq!(delete.len(), 2);

        let no_canonical = vec![
            variant("x", "solapi-IMG01-9.jpg", 1),
            variant("y", "solapi-IMG01-8.jpg", 60),
        ];
        let (keep, _) = plan_group(&no_canonical, &HashSet::new());
        assert_eq!(keep[0].id, "y");
    }

    #[test]
    async fn test_referenced_variants_are_never_deleted() {
        let group = vec![
            variant("a", "solapi-IMG01.jpg", 30),
            variant("b", "solapi-IMG01-1.jpg", 20),
            variant("c", "solapi-IMG01-2.jpg", 10),
        ];
        let refs: HashSet<String> = ["solapi-IMG01-1.jpg".to_string(), "c".to_string()]
            .into_iter()
            .collect();
        let (keep, delete) = plan_group(&group, &refs);
        let kept: Vec<_> = keep.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(kept, vec!["b", "c"]);
        assert_eq!(delete.len(), 1);
        assert_eq!(delete[0].id, "a");
    }

    #[test]
    async fn test_dedup_keeps_variant_used_by_live_campaign() {
        let pool = test_pool().await;
        let root = tempfile::tempdir().unwrap();
        let store = CampaignStore::new(pool.clone());
        let source = SqliteAssetSource::new(pool.clone(), root.path());

        touch(root.path(), "2025/03/solapi-IMG01.jpg");
        touch(root.path(), "2025/03/solapi-IMG01-1710000001.jpg");
        touch(root.path(), "2025/04/solapi-IMG01-1710000002.jpg");
        touch(root.path(), "temp/solapi-IMG01-1710000003.jpg");
        touch(root.path(), "2025/03/logo.png");

        let indexed = source.index_storage().await.unwrap();
        assert_eq!(indexed.files_seen, 3);
        assert_eq!(indexed.variants_registered, 3);
        // Reindexar no duplica
        assert_eq!(source.index_storage().await.unwrap().variants_registered, 0);

        let mut mms = new_campaign(phones(1), CampaignStatus::Scheduled);
        mms.message_type = MessageType::Mms;
        mms.image_ref = Some("2025/03/solapi-IMG01-1710000001.jpg".to_string());
        store.create_campaign(mms).await.unwrap();

        let service = AssetDedupService::new(Arc::new(source.clone()), store.clone());
        let report = service.dedup().await.unwrap();
        assert_eq!(report.groups_deduplicated, 1);
        assert_eq!(report.variants_deleted.len(), 2);

        let remaining = source.list_variants().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].storage_path, "2025/03/solapi-IMG01-1710000001.jpg");
        assert!(root.path().join("2025/03/solapi-IMG01-1710000001.jpg").exists());
        assert!(!root.path().join("2025/03/solapi-IMG01.jpg").exists());
        assert!(!root.path().join("2025/04/solapi-IMG01-1710000002.jpg").exists());
        assert!(root.path().join("temp/solapi-IMG01-1710000003.jpg").exists());
    }

    #[test]
    async fn test_archived_campaign_no_longer_protects_variant() {
        let pool = test_pool().await;
        let root = tempfile::tempdir().unwrap();
        let store = CampaignStore::new(pool.clone());
        let source = SqliteAssetSource::new(pool.clone(), root.path());

        touch(root.path(), "solapi-IMG02.jpg");
        touch(root.path(), "solapi-IMG02-1710000001.jpg");
        source.index_storage().await.unwrap();

        let mut mms = new_campaign(phones(1), CampaignStatus::Sent);
        mms.message_type = MessageType::Mms;
        mms.image_ref = Some("solapi-IMG02-1710000001.jpg".to_string());
        let c = store.create_campaign(mms).await.unwrap();
        store.archive_campaign(&c.id).await.unwrap();

        let service = AssetDedupService::new(Arc::new(source.clone()), store);
        let report = service.dedup_image("IMG02").await.unwrap();
        assert_eq!(report.variants_deleted, vec!["solapi-IMG02-1710000001.jpg"]);
        assert_eq!(report.variants_kept, vec!["solapi-IMG02.jpg"]);
    }

    #[test]
    async fn test_resolve_image_id() {
        let pool = test_pool().await;
        let store = CampaignStore::new(pool.clone());
        let source = SqliteAssetSource::new(pool, "/unused");
        source
            .register_variant("IMG03", "a/solapi-IMG03.jpg", Utc::now())
            .await
            .unwrap();
        let service = AssetDedupService::new(Arc::new(source), store);

        assert_eq!(
            service.resolve_image_id("a/solapi-IMG03.jpg").await.unwrap().as_deref(),
            Some("IMG03")
        );
        assert_eq!(
            service.resolve_image_id("IMG03").await.unwrap().as_deref(),
            Some("IMG03")
        );
        // id del proveedor sin copia local
        assert_eq!(
            service.resolve_image_id("ST01FZ").await.unwrap().as_deref(),
            Some("ST01FZ")
        );
        assert_eq!(service.resolve_image_id("a/missing.jpg").await.unwrap(), None);
    }
}
