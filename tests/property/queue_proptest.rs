//! Property-based tests for the sync queue

use proptest::prelude::*;
use std::collections::HashSet;

use studysync::client::error::ApiError;
use studysync::client::offline::queue::generate_item_id;
use studysync::client::offline::{RetryDecision, RetryPolicy, SyncQueue};
use studysync::client::LocalStore;
use studysync::shared::{EntityType, SyncAction};

fn entity_type() -> impl Strategy<Value = EntityType> {
    prop::sample::select(EntityType::ALL.to_vec())
}

fn action() -> impl Strategy<Value = SyncAction> {
    prop_oneof![
        Just(SyncAction::Create),
        Just(SyncAction::Update),
        Just(SyncAction::Delete),
    ]
}

proptest! {
    #[test]
    fn test_item_ids_unique_within_same_millisecond(entity in entity_type(), action in action(), count in 2usize..64) {
        let at = chrono::Utc::now();
        let ids: HashSet<String> = (0..count).map(|_| generate_item_id(entity, action, at)).collect();
        prop_assert_eq!(ids.len(), count);
        for id in &ids {
            let prefix = format!("{}-{}-{}-", entity, action, at.timestamp_millis());
            prop_assert!(id.starts_with(&prefix));
        }
    }

    #[test]
    fn test_retry_drops_after_exactly_max_attempts(max in 1u32..10) {
        let policy = RetryPolicy::new(max);
        let mut retry_count = 0;
        let mut attempts = 0;
        loop {
            attempts += 1;
            match policy.on_failure(retry_count) {
                RetryDecision::Retry { next_count } => {
                    prop_assert_eq!(next_count, retry_count + 1);
                    retry_count = next_count;
                }
                RetryDecision::Drop { attempts: reported } => {
                    prop_assert_eq!(reported, attempts);
                    break;
                }
            }
        }
        prop_assert_eq!(attempts, max);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Failing items never block later ones, and order is kept
    #[test]
    fn test_drain_keeps_order_of_failed_items(failing in prop::collection::vec(any::<bool>(), 1..12)) {
        let (delivered, remaining) = tokio_test::block_on(async {
            let store = LocalStore::in_memory().await.unwrap();
            let queue = SyncQueue::new(store, RetryPolicy::default());
            queue.load_for(Some("u1")).await.unwrap();

            let mut ids = Vec::new();
            for (i, _) in failing.iter().enumerate() {
                let item = queue
                    .enqueue("u1", EntityType::Tasks, SyncAction::Update, serde_json::json!({"n": i}))
                    .await
                    .unwrap();
                ids.push(item.id);
            }

            let report = queue
                .drain(|item| {
                    let n = item.payload["n"].as_u64().unwrap() as usize;
                    let fail = failing[n];
                    async move {
                        if fail {
                            Err(ApiError::http(503))
                        } else {
                            Ok(())
                        }
                    }
                })
                .await;

            let remaining: Vec<String> = queue.items().await.into_iter().map(|item| item.id).collect();
            let expected: Vec<String> = ids
                .iter()
                .zip(&failing)
                .filter(|(_, fail)| **fail)
                .map(|(id, _)| id.clone())
                .collect();
            assert_eq!(remaining, expected);
            (report.delivered, remaining.len())
        });

        let failures = failing.iter().filter(|fail| **fail).count();
        prop_assert_eq!(delivered, failing.len() - failures);
        prop_assert_eq!(remaining, failures);
    }
}
