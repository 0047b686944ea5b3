//! Property-based tests for the merge rule and write stamps

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;

use studysync::client::local_db::{next_stamp, StoredEntry};
use studysync::client::offline::reconciliation::decide;
use studysync::client::offline::MergeDecision;
use studysync::client::types::RemoteEntity;

fn at(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).unwrap()
}

proptest! {
    #[test]
    fn test_remote_applies_only_when_strictly_newer(local in 0i64..4_000_000_000_000, offset in -5_000i64..5_000) {
        let entry = StoredEntry { value: json!([]), updated_at: at(local) };
        let remote = RemoteEntity { data: json!([{"id": "x"}]), updated_at: at(local + offset) };

        let decision = decide(Some(&entry), &remote);
        if offset > 0 {
            prop_assert_eq!(decision, MergeDecision::Apply);
        } else {
            prop_assert_eq!(decision, MergeDecision::KeepLocal);
        }
    }

    #[test]
    fn test_missing_local_always_applies(remote in 0i64..4_000_000_000_000) {
        let remote = RemoteEntity { data: json!([]), updated_at: at(remote) };
        prop_assert_eq!(decide(None, &remote), MergeDecision::Apply);
    }

    #[test]
    fn test_write_stamps_strictly_increase(offset in -1_000i64..100_000) {
        // the previous stamp may be ahead of the clock
        let previous = Utc::now() + Duration::milliseconds(offset);
        prop_assert!(next_stamp(Some(previous)) > previous);
    }
}
