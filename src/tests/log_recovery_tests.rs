//! tests/log_recovery_tests.rs
//! Reparación de delivery_logs y reconstrucción de campañas desde el gateway.

#[cfg(test)]
mod tests {
    use actix_rt::test;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    use crate::error::CampaignError;
    use crate::models::campaign_model::{CampaignStatus, MessageType};
    use crate::models::delivery_log_model::DeliveryStatus;
    use crate::models::gateway_model::OutcomeStatus;
    use crate::services::campaign_store::CampaignStore;
    use crate::services::delivery_log_service::{DeliveryLogService, DeliveryLogWrite};
    use crate::services::log_recovery_service::LogRecoveryService;
    use crate::tests::common::{
        outcome_at, phones, sending_campaign, settled_campaign, test_pool, FakeGateway,
    };

    async fn setup() -> (CampaignStore, DeliveryLogService, Arc<FakeGateway>, LogRecoveryService) {
        let pool = test_pool().await;
        let store = CampaignStore::new(pool.clone());
        let logs = DeliveryLogService::new(pool);
        let gateway = Arc::new(FakeGateway::new());
        let recovery = LogRecoveryService::new(store.clone(), logs.clone(), gateway.clone());
        (store, logs, gateway, recovery)
    }

    #[test]
    async fn test_sent_campaign_gets_one_row_per_recipient() {
        let (store, logs, _gateway, recovery) = setup().await;
        let c = settled_campaign(&store, phones(3), CampaignStatus::Sent, 3, 0).await;

        let report = recovery.recover_all(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.recovered_total, 3);
        assert_eq!(report.failed, 0);

        let entries = logs.list_for_campaign(&c.id).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.status == DeliveryStatus::Sent));
        assert!(entries.iter().all(|e| Some(e.sent_at) == c.sent_at));
    }

    #[test]
    async fn test_failed_campaign_synthesizes_failed_rows() {
        let (store, logs, _gateway, recovery) = setup().await;
        let c = settled_campaign(&store, phones(2), CampaignStatus::Failed, 0, 2).await;

        recovery.recover_all(&CancellationToken::new()).await.unwrap();
        let entries = logs.list_for_campaign(&c.id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.status == DeliveryStatus::Failed));
    }

    #[test]
    async fn test_second_run_is_a_noop() {
        let (store, logs, _gateway, recovery) = setup().await;
        let c = settled_campaign(&store, phones(4), CampaignStatus::Partial, 3, 1).await;

        let first = recovery.recover_all(&CancellationToken::new()).await.unwrap();
        let count_after_first = logs.count_for_campaign(&c.id).await.unwrap();
        let second = recovery.recover_all(&CancellationToken::new()).await.unwrap();

        assert_eq!(first.recovered_total, 4);
        assert_eq!(second.recovered_total, 0);
        assert!(second.outcomes.iter().all(|o| o.skipped));
        assert_eq!(logs.count_for_campaign(&c.id).await.unwrap(), count_after_first);
    }

    #[test]
    async fn test_partial_logs_are_reported_not_repaired() {
        let (store, logs, _gateway, recovery) = setup().await;
        let recipients = phones(5);
        let c = settled_campaign(&store, recipients.clone(), CampaignStatus::Sent, 5, 0).await;
        let existing: Vec<DeliveryLogWrite> = recipients[..2]
            .iter()
            .map(|p| DeliveryLogWrite {
                recipient_phone: p.clone(),
                status: DeliveryStatus::Sent,
                sent_at: Utc::now(),
            })
            .collect();
        logs.upsert_entries(&c.id, "fake", &existing).await.unwrap();

        let outcome = recovery.recover_campaign(&c).await.unwrap();
        assert_eq!(outcome.gap, Some(3));
        assert_eq!(outcome.recovered_count, 0);
        assert!(!outcome.skipped);
        assert_eq!(logs.count_for_campaign(&c.id).await.unwrap(), 2);
    }

    #[test]
    async fn test_in_flight_campaigns_are_not_touched() {
        let (store, logs, _gateway, recovery) = setup().await;
        let c = sending_campaign(&store, phones(3), "G-live").await;

        let report = recovery.recover_all(&CancellationToken::new()).await.unwrap();
        assert!(report.outcomes.is_empty());
        assert_eq!(logs.count_for_campaign(&c.id).await.unwrap(), 0);
    }

    #[test]
    async fn test_recover_missing_campaign_from_group() {
        let (store, logs, gateway, recovery) = setup().await;
        let sent_at = Utc.with_ymd_and_hms(2025, 3, 10, 4, 0, 0).unwrap();
        let mut list = vec![
            outcome_at("01011112222", OutcomeStatus::Delivered, Some(sent_at)),
            outcome_at("01033334444", OutcomeStatus::Failed, Some(sent_at)),
            outcome_at("01011112222", OutcomeStatus::Delivered, Some(sent_at)),
        ];
        list[0].text = Some("Promo recuperada".to_string());
        list[0].message_type = Some("LMS".to_string());
        gateway.set_message_list(list);

        let record = recovery.recover_missing_campaign("G-orphan").await.unwrap();
        assert_eq!(record.provider_group_id.as_deref(), Some("G-orphan"));
        assert_eq!(record.message_text, "Promo recuperada");
        assert_eq!(record.message_type, MessageType::Lms);
        assert_eq!(record.recipients, vec!["01011112222", "01033334444"]);
        assert_eq!(record.status, CampaignStatus::Partial);
        assert_eq!(record.sent_at, Some(sent_at));
        assert_eq!(logs.count_for_campaign(&record.id).await.unwrap(), 2);

        // Ya vinculado: devuelve el mismo registro sin crear otro
        let again = recovery.recover_missing_campaign("G-orphan").await.unwrap();
        assert_eq!(again.id, record.id);
        assert_eq!(store.list_campaigns(1, 10).await.unwrap().total, 1);
    }

    #[test]
    async fn test_recover_missing_campaign_with_empty_list() {
        let (_store, _logs, _gateway, recovery) = setup().await;
        let err = recovery.recover_missing_campaign("G-none").await.unwrap_err();
        assert!(matches!(err, CampaignError::NotFound(_)));
    }

    #[test]
    async fn test_archived_campaign_still_gets_logs() {
        let (store, logs, _gateway, recovery) = setup().await;
        let c = settled_campaign(&store, phones(3), CampaignStatus::Sent, 3, 0).await;
        store.archive_campaign(&c.id).await.unwrap();

        let report = recovery.recover_all(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.recovered_total, 3);
        assert_eq!(logs.count_for_campaign(&c.id).await.unwrap(), 3);
    }

    #[test]
    async fn test_storage_error_on_one_campaign_does_not_stop_the_run() {
        let pool = test_pool().await;
        let store = CampaignStore::new(pool.clone());
        let logs = DeliveryLogService::new(pool.clone());
        let recovery = LogRecoveryService::new(store.clone(), logs.clone(), Arc::new(FakeGateway::new()));

        let broken = settled_campaign(&store, phones(2), CampaignStatus::Sent, 2, 0).await;
        let healthy = settled_campaign(&store, phones(3), CampaignStatus::Sent, 3, 0).await;

        // Inserción rechazada solo para una campaña
        let trigger = format!(
            "CREATE TRIGGER reject_logs BEFORE INSERT ON delivery_logs \
             WHEN NEW.campaign_id = '{}' BEGIN SELECT RAISE(ABORT, 'disco lleno'); END",
            broken.id
        );
        sqlx::query(&trigger).execute(&pool).await.unwrap();

        let report = recovery.recover_all(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.recovered_total, 3);

        let failed = report
            .outcomes
            .iter()
            .find(|o| o.campaign_id == broken.id)
            .unwrap();
        assert!(failed.error.as_deref().unwrap().contains("disco lleno"));
        assert_eq!(logs.count_for_campaign(&broken.id).await.unwrap(), 0);
        assert_eq!(logs.count_for_campaign(&healthy.id).await.unwrap(), 3);
    }
}
