//! tests/gateway_parsing_tests.rs
//! Formas de respuesta del proveedor y firma de requests.

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::models::gateway_model::{GroupCounts, OutcomeStatus};
    use crate::services::gateway_client::{parse_group_counts, parse_message_list, sign};

    #[test]
    fn test_group_counts_nested_and_flat() {
        let nested = json!({
            "groupInfo": { "count": { "total": 200, "sentSuccess": 196, "sentFailed": 1 } }
        });
        assert_eq!(parse_group_counts(&nested), GroupCounts::new(200, 196, 1));

        let flat = json!({ "totalCount": 10, "successCount": 7, "failCount": 3 });
        assert_eq!(parse_group_counts(&flat), GroupCounts::new(10, 7, 3));

        assert!(parse_group_counts(&json!({})).is_all_zero());
    }

    #[test]
    fn test_message_list_shapes() {
        let as_map = json!({
            "messageList": {
                "M1": { "to": "010-1111-2222", "statusCode": "4000", "text": "hola", "type": "LMS",
                        "dateSent": "2025-03-10T04:00:00Z" },
                "M2": { "to": "01033334444", "statusCode": "3059" },
                "M3": { "to": "01055556666", "statusCode": "2000" }
            }
        });
        let mut list = parse_message_list(&as_map);
        list.sort_by(|a, b| a.recipient.cmp(&b.recipient));

        assert_eq!(list.len(), 3);
        assert_eq!(list[0].recipient, "010-1111-2222");
        assert_eq!(list[0].status, OutcomeStatus::Delivered);
        assert_eq!(list[0].message_type.as_deref(), Some("LMS"));
        assert!(list[0].sent_at.is_some());
        assert_eq!(list[1].status, OutcomeStatus::Failed);
        assert_eq!(list[2].status, OutcomeStatus::Pending);

        let as_array = json!({ "messages": [ { "to": "01011112222", "status": "FAILED" }, { "status": "x" } ] });
        let list = parse_message_list(&as_array);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].status, OutcomeStatus::Failed);

        assert!(parse_message_list(&json!({ "unexpected": true })).is_empty());
    }

    #[test]
    fn test_classify() {
        assert_eq!(OutcomeStatus::classify(Some("COMPLETE"), None), OutcomeStatus::Delivered);
        assert_eq!(OutcomeStatus::classify(None, Some("4000")), OutcomeStatus::Delivered);
        assert_eq!(OutcomeStatus::classify(Some("SENDING"), None), OutcomeStatus::Pending);
        assert_eq!(OutcomeStatus::classify(None, Some("1000")), OutcomeStatus::Pending);
        assert_eq!(OutcomeStatus::classify(None, Some("3104")), OutcomeStatus::Failed);
        assert_eq!(OutcomeStatus::classify(None, None), OutcomeStatus::Pending);
    }

    #[test]
    fn test_sign_is_hex_hmac_sha256() {
        let a = sign("secret", "2025-03-10T04:00:00Z", "salt1").unwrap();
        let b = sign("secret", "2025-03-10T04:00:00Z", "salt1").unwrap();
        let c = sign("secret", "2025-03-10T04:00:00Z", "salt2").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }
}
