//! Commit-to-gateway flows: a gesture edits the cache, commits, and the
//! payload crosses the sync boundary (or waits in the offline queue).

use std::sync::{Arc, Mutex};

use folio_core::{BlockType, Pointer, Segment};
use folio_store::{edit, CacheConfig, RecordCacheStore, Transaction};
use folio_sync::{
    ConnectionState, RecordingGateway, SubmitOutcome, SubscriptionService, SubscriptionSink,
    SyncClient,
};

fn cache() -> Arc<RecordCacheStore> {
    Arc::new(RecordCacheStore::new(CacheConfig::default()))
}

#[tokio::test]
async fn test_gesture_commit_reaches_gateway() {
    let cache = cache();
    let client = SyncClient::new(RecordingGateway::new());
    client.connect().await.unwrap();

    let mut tx = Transaction::begin(cache.clone(), "alice");
    let page = edit::create_block(&mut tx, BlockType::Page).unwrap();
    edit::set_title(&mut tx, &page, &[Segment::plain("Journal")]).unwrap();
    let payload = tx.commit().unwrap();
    let tx_id = payload.id;

    let outcome = client.submit(payload).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Applied(ack) if ack.success));

    let applied = client.gateway().applied();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].id, tx_id);
    assert_eq!(applied[0].user_id, "alice");
    assert_eq!(applied[0].operations.len(), 2);
}

#[tokio::test]
async fn test_offline_edits_survive_until_reconnect() {
    let cache = cache();
    let client = SyncClient::new(RecordingGateway::new());

    // Two offline gestures.
    for title in ["first", "second"] {
        let mut tx = Transaction::begin(cache.clone(), "alice");
        let block = edit::create_block(&mut tx, BlockType::Text).unwrap();
        edit::set_title(&mut tx, &block, &[Segment::plain(title)]).unwrap();
        let outcome = client.submit(tx.commit().unwrap()).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Queued);
    }
    assert_eq!(client.queued_len().await, 2);
    assert_eq!(client.gateway().applied_len(), 0);

    client.connect().await.unwrap();

    assert_eq!(client.connection_state().await, ConnectionState::Connected);
    assert_eq!(client.queued_len().await, 0);
    assert_eq!(client.gateway().applied_len(), 2);
}

#[tokio::test]
async fn test_failed_submit_keeps_local_state() {
    let cache = cache();
    let client = SyncClient::new(RecordingGateway::new());
    client.connect().await.unwrap();

    let mut tx = Transaction::begin(cache.clone(), "alice");
    let block = edit::create_block(&mut tx, BlockType::Text).unwrap();
    let payload = tx.commit().unwrap();

    client.gateway().fail_next();
    assert!(client.submit(payload).await.is_err());

    // No rollback: the optimistic local apply stays.
    assert_eq!(block.block_type(), Some(BlockType::Text));
    assert!(cache.contains(block.pointer(), "alice"));
}

struct VecSink {
    registered: Mutex<Vec<(String, Pointer)>>,
}

impl SubscriptionSink for VecSink {
    fn add_subscription(&self, user_id: &str, pointer: &Pointer) {
        self.registered
            .lock()
            .unwrap()
            .push((user_id.to_string(), pointer.clone()));
    }
}

#[tokio::test]
async fn test_missing_records_register_interest_once() {
    let cache = cache();
    let requests = SubscriptionService::<VecSink>::channel_for(&cache);
    let service = Arc::new(SubscriptionService::new(VecSink {
        registered: Mutex::new(Vec::new()),
    }));

    let worker = {
        let service = service.clone();
        tokio::spawn(async move { service.run(requests).await })
    };

    // Reads of two unknown records, one of them repeatedly.
    cache.get_record(&Pointer::block("a"), "alice", false);
    cache.get_record(&Pointer::block("a"), "alice", false);
    cache.get_record(&Pointer::space("s"), "alice", false);

    tokio::task::yield_now().await;
    drop(cache);
    worker.await.unwrap();

    let registered = service.sink().registered.lock().unwrap().clone();
    assert_eq!(
        registered,
        vec![
            ("alice".to_string(), Pointer::block("a")),
            ("alice".to_string(), Pointer::space("s")),
        ]
    );
}
