//! Aggregation invariants of the concurrent batch pipeline

mod common;

use common::{ids, marketing_message, personal_message, FakeMailbox, MockGmailClient};
use gmail_sweeper::error::GmailError;
use gmail_sweeper::models::{Header, MessageSummary};
use gmail_sweeper::pipeline::BatchClassifyPipeline;
use gmail_sweeper::state::ScanStore;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const SENDERS: [&str; 3] = [
    "\"Shop\" <deals@shop.com>",
    "News <letter@news.io>",
    "promo@mailer.example.org",
];

/// 60 marketing messages over three senders, 30 personal, 10 failing
fn mixed_mailbox(max_delay_ms: u64) -> (Arc<FakeMailbox>, Vec<String>) {
    let mailbox = Arc::new(FakeMailbox::new(max_delay_ms));
    let mut all = Vec::new();

    for (i, id) in ids("mk", 60).into_iter().enumerate() {
        mailbox.add(marketing_message(&id, SENDERS[i % SENDERS.len()]));
        all.push(id);
    }
    for id in ids("pe", 30) {
        mailbox.add(personal_message(&id, "friend@family.org"));
        all.push(id);
    }
    for id in ids("bad", 10) {
        mailbox.add_failing(&id);
        all.push(id);
    }
    (mailbox, all)
}

async fn fresh_store(dir: &TempDir, total: usize) -> Arc<ScanStore> {
    let store = Arc::new(ScanStore::new(dir.path().join("cache.json")));
    store.reset(30, "INBOX").await;
    store.set_total(total).await;
    store
}

#[tokio::test]
async fn test_counts_match_id_lists_after_run() {
    let temp_dir = TempDir::new().unwrap();
    let (mailbox, all) = mixed_mailbox(3);
    let store = fresh_store(&temp_dir, all.len()).await;

    let pipeline = BatchClassifyPipeline::new(mailbox, store.clone(), 25, 8);
    let report = pipeline.run(&all).await.unwrap();

    assert_eq!(report.batches, 4);
    assert_eq!(report.processed, 100);
    assert_eq!(report.marketing, 60);
    assert_eq!(report.failed, 10);

    let state = store.snapshot().await;
    assert!(state.is_consistent());
    assert_eq!(state.done, 100);
    assert_eq!(state.failed, 10);
    assert_eq!(state.stats.len(), 3);
    assert_eq!(state.marketing_messages(), 60);
    for sender in SENDERS {
        assert_eq!(state.stats[sender].count, 20);
        assert_eq!(state.sender_to_ids[sender].len(), 20);
    }
    assert!(!state.stats.contains_key("friend@family.org"));
}

#[tokio::test]
async fn test_sender_details_are_normalized() {
    let temp_dir = TempDir::new().unwrap();
    let (mailbox, all) = mixed_mailbox(0);
    let store = fresh_store(&temp_dir, all.len()).await;

    BatchClassifyPipeline::new(mailbox, store.clone(), 100, 4)
        .run(&all)
        .await
        .unwrap();

    let state = store.snapshot().await;
    let shop = &state.stats["\"Shop\" <deals@shop.com>"];
    assert_eq!(shop.email, "deals@shop.com");
    assert_eq!(shop.domain, "shop.com");

    let plain = &state.stats["promo@mailer.example.org"];
    assert_eq!(plain.email, "promo@mailer.example.org");
    assert_eq!(plain.domain, "mailer.example.org");
}

#[tokio::test]
async fn test_raw_from_values_are_distinct_senders() {
    let temp_dir = TempDir::new().unwrap();
    let mailbox = Arc::new(FakeMailbox::new(0));
    mailbox.add(marketing_message("a", "Shop <deals@shop.com>"));
    mailbox.add(marketing_message("b", "deals@shop.com"));
    let store = fresh_store(&temp_dir, 2).await;

    BatchClassifyPipeline::new(mailbox, store.clone(), 10, 2)
        .run(&["a".to_string(), "b".to_string()])
        .await
        .unwrap();

    let state = store.snapshot().await;
    assert_eq!(state.stats.len(), 2);
    assert_eq!(state.stats["Shop <deals@shop.com>"].email, "deals@shop.com");
    assert_eq!(state.stats["deals@shop.com"].email, "deals@shop.com");
}

#[tokio::test]
async fn test_done_never_decreases_while_running() {
    let temp_dir = TempDir::new().unwrap();
    let (mailbox, all) = mixed_mailbox(5);
    let store = fresh_store(&temp_dir, all.len()).await;

    let pipeline = BatchClassifyPipeline::new(mailbox, store.clone(), 20, 8);
    let run = tokio::spawn(async move { pipeline.run(&all).await });

    let mut observed = Vec::new();
    while !run.is_finished() {
        let state = store.snapshot().await;
        assert!(state.is_consistent());
        observed.push(state.done);
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
    }
    run.await.unwrap().unwrap();
    observed.push(store.snapshot().await.done);

    assert!(observed.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(observed.last(), Some(&100));
}

#[tokio::test]
async fn test_checkpoint_written_after_each_batch() {
    let temp_dir = TempDir::new().unwrap();
    let (mailbox, all) = mixed_mailbox(0);
    let store = fresh_store(&temp_dir, all.len()).await;

    BatchClassifyPipeline::new(mailbox, store.clone(), 30, 4)
        .run(&all)
        .await
        .unwrap();

    let on_disk = ScanStore::new(store.checkpoint_path());
    assert!(on_disk.restore().await.unwrap());
    let restored = on_disk.snapshot().await;
    let current = store.snapshot().await;

    assert_eq!(restored.done, current.done);
    assert_eq!(restored.stats, current.stats);
    assert_eq!(restored.sender_to_ids, current.sender_to_ids);
}

#[tokio::test]
async fn test_restart_resumes_from_last_completed_batch() {
    let temp_dir = TempDir::new().unwrap();
    let mailbox = Arc::new(FakeMailbox::new(2));
    let all = ids("mk", 50);
    for id in &all {
        mailbox.add(marketing_message(id, "Deals <deals@shop.com>"));
    }
    // Batches one and two complete, batch three hangs
    mailbox.stall_metadata_after(20);

    let store = fresh_store(&temp_dir, all.len()).await;
    let pipeline = BatchClassifyPipeline::new(mailbox, store.clone(), 10, 4);
    let to_run = all.clone();
    let run = tokio::spawn(async move { pipeline.run(&to_run).await });

    let path = store.checkpoint_path().to_path_buf();
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let on_disk = ScanStore::new(&path);
            if on_disk.restore().await.unwrap() && on_disk.snapshot().await.done == 20 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("second batch was never checkpointed");

    // The process dies while batch three is in flight
    run.abort();
    let _ = run.await;

    let restored = ScanStore::open(&path).await.unwrap().snapshot().await;
    assert!(!restored.in_progress);
    assert_eq!(restored.done, 20);
    assert_eq!(restored.total, 50);
    assert!(restored.is_consistent());

    let kept: HashSet<&String> = restored.sender_to_ids["Deals <deals@shop.com>"]
        .iter()
        .collect();
    let expected: HashSet<&String> = all[..20].iter().collect();
    assert_eq!(kept, expected);
    assert_eq!(restored.stats["Deals <deals@shop.com>"].count, 20);
}

#[tokio::test]
async fn test_fetch_failures_do_not_abort_batch() {
    let temp_dir = TempDir::new().unwrap();
    let mut mock = MockGmailClient::new();
    mock.expect_get_message_metadata()
        .times(4)
        .returning(|id| {
            if id == "m-1" {
                Err(GmailError::NetworkError("connection reset".to_string()))
            } else {
                Ok(MessageSummary {
                    id: id.to_string(),
                    headers: vec![
                        Header::new("from", "Deals <deals@shop.com>"),
                        Header::new("Precedence", "bulk"),
                    ],
                    snippet: String::new(),
                })
            }
        });

    let store = fresh_store(&temp_dir, 4).await;
    let report = BatchClassifyPipeline::new(Arc::new(mock), store.clone(), 10, 2)
        .run(&ids("m", 4))
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.marketing, 3);

    let state = store.snapshot().await;
    assert_eq!(state.done, 4);
    assert_eq!(state.failed, 1);
    assert_eq!(state.stats["Deals <deals@shop.com>"].count, 3);
    assert!(!state.sender_to_ids["Deals <deals@shop.com>"].contains(&"m-1".to_string()));
}

#[tokio::test]
async fn test_empty_id_list_is_a_no_op() {
    let temp_dir = TempDir::new().unwrap();
    let store = fresh_store(&temp_dir, 0).await;

    let report = BatchClassifyPipeline::new(Arc::new(MockGmailClient::new()), store.clone(), 10, 2)
        .run(&[])
        .await
        .unwrap();

    assert_eq!(report.batches, 0);
    assert_eq!(store.snapshot().await.done, 0);
}
