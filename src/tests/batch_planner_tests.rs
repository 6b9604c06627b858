//! tests/batch_planner_tests.rs
//! Pruebas del planificador de lotes y de la normalización de números.

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};

    use crate::error::CampaignError;
    use crate::services::batch_planner::plan_batches;
    use crate::services::recipient_service::{normalize_phone, normalize_recipients};
    use crate::tests::common::phones;

    fn seoul_13h() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(9 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 3, 10, 13, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_1514_recipients_in_batches_of_200() {
        let recipients = phones(1514);
        let plan = plan_batches(&recipients, 200, seoul_13h(), Duration::minutes(30)).unwrap();

        let sizes: Vec<usize> = plan.iter().map(|b| b.recipients.len()).collect();
        assert_eq!(sizes, vec![200, 200, 200, 200, 200, 200, 200, 114]);

        // 13:00 +09:00 == 04:00 UTC
        let first = Utc.with_ymd_and_hms(2025, 3, 10, 4, 0, 0).unwrap();
        for (k, batch) in plan.iter().enumerate() {
            assert_eq!(batch.scheduled_at, first + Duration::minutes(30 * k as i64));
        }
    }

    #[test]
    fn test_batches_cover_input_in_order() {
        for (n, b) in [(1usize, 1i64), (7, 3), (10, 10), (11, 10), (399, 200), (5, 50)] {
            let recipients = phones(n);
            let plan = plan_batches(&recipients, b, Utc::now(), Duration::minutes(5)).unwrap();

            let flat: Vec<String> = plan.iter().flat_map(|p| p.recipients.clone()).collect();
            assert_eq!(flat, recipients, "N={} B={}", n, b);
            assert!(plan.iter().all(|p| p.recipients.len() as i64 <= b));
            assert_eq!(plan.len(), n.div_ceil(b as usize));
        }
    }

    #[test]
    fn test_scheduled_at_strictly_increasing() {
        let plan = plan_batches(&phones(50), 10, seoul_13h(), Duration::minutes(1)).unwrap();
        for pair in plan.windows(2) {
            assert!(pair[0].scheduled_at < pair[1].scheduled_at);
        }
    }

    #[test]
    fn test_zero_interval_sends_all_at_start() {
        let plan = plan_batches(&phones(30), 10, seoul_13h(), Duration::zero()).unwrap();
        assert_eq!(plan.len(), 3);
        assert!(plan.iter().all(|p| p.scheduled_at == plan[0].scheduled_at));
    }

    #[test]
    fn test_invalid_parameters_are_rejected() {
        let start = Utc::now();
        let interval = Duration::minutes(30);

        let empty: Vec<String> = Vec::new();
        assert!(matches!(
            plan_batches(&empty, 200, start, interval),
            Err(CampaignError::InvalidInput(_))
        ));
        assert!(matches!(
            plan_batches(&phones(3), 0, start, interval),
            Err(CampaignError::InvalidInput(_))
        ));
        assert!(matches!(
            plan_batches(&phones(3), -5, start, interval),
            Err(CampaignError::InvalidInput(_))
        ));
        assert!(matches!(
            plan_batches(&phones(3), 2, start, Duration::minutes(-1)),
            Err(CampaignError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("010-1234-5678").as_deref(), Some("01012345678"));
        assert_eq!(normalize_phone(" 010 1234 5678 ").as_deref(), Some("01012345678"));
        assert_eq!(normalize_phone("+82 10-1234-5678").as_deref(), Some("01012345678"));
        assert_eq!(normalize_phone("011-123-4567").as_deref(), Some("0111234567"));
        assert_eq!(normalize_phone("02-123-4567"), None);
        assert_eq!(normalize_phone("+1 415 555 0100"), None);
        assert_eq!(normalize_phone("010-1234"), None);
        assert_eq!(normalize_phone(""), None);
    }

    #[test]
    fn test_normalize_recipients_keeps_first_occurrence() {
        let raw: Vec<String> = ["010-1111-2222", "bogus", "01033334444", "+82 10 1111 2222"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let out = normalize_recipients(&raw);
        assert_eq!(out.accepted, vec!["01011112222", "01033334444"]);
        assert_eq!(out.rejected, vec!["bogus"]);
    }
}
