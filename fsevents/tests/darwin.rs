#![cfg(target_os = "macos")]

use std::path::Path;
use std::time::{Duration, SystemTime};

use fsevents::{
    current_event_id, device_for_path, last_event_id_for_device_before_time, CreateFlags,
    EventBatch, EventFlags, EventKind, EventStream, StreamConfig,
};
use tokio::sync::mpsc::Receiver;

async fn wait_for(rx: &mut Receiver<EventBatch>, name: &str) -> Vec<EventBatch> {
    let mut seen = Vec::new();
    let found = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(batch) = rx.recv().await {
            let hit = batch.iter().any(|r| r.path.ends_with(name));
            seen.push(batch);
            if hit {
                return true;
            }
        }
        false
    })
    .await
    .unwrap_or(false);
    assert!(found, "no event for {name}");
    seen
}

fn config(root: &Path) -> StreamConfig {
    StreamConfig::new([root])
        .with_flags(CreateFlags::FILE_EVENTS | CreateFlags::NO_DEFER)
        .with_channel_capacity(64)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reports_file_creation() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();

    let mut stream = EventStream::new(config(&root));
    stream.start().await.unwrap();
    let mut rx = stream.take_events().unwrap();

    std::fs::write(root.join("created.txt"), b"created").unwrap();
    let batches = wait_for(&mut rx, "created.txt").await;
    stream.stop().await.unwrap();

    let record = batches
        .iter()
        .flat_map(|b| b.iter())
        .find(|r| r.path.ends_with("created.txt"))
        .unwrap();
    assert!(record.flags.contains(EventFlags::ITEM_CREATED));
    assert_eq!(record.kind(), EventKind::Create);
    assert!(stream.last_event_id() >= record.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_picks_up_changes_made_while_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();

    let mut stream = EventStream::new(config(&root));
    stream.start().await.unwrap();
    let mut rx = stream.take_events().unwrap();

    std::fs::write(root.join("before.txt"), b"1").unwrap();
    wait_for(&mut rx, "before.txt").await;
    stream.stop().await.unwrap();
    let cursor = stream.last_event_id();

    std::fs::write(root.join("during.txt"), b"2").unwrap();

    stream.restart().await.unwrap();
    let batches = wait_for(&mut rx, "during.txt").await;
    stream.stop().await.unwrap();

    for record in batches.iter().flat_map(|b| b.iter()) {
        if !record.flags.contains(EventFlags::HISTORY_DONE) {
            assert!(record.id > cursor, "{record:?} replayed at or before {cursor}");
        }
    }
}

#[test]
fn history_queries_agree() {
    let dir = tempfile::tempdir().unwrap();
    let device = device_for_path(dir.path()).unwrap();
    let now = current_event_id();

    assert!(now > 0);
    assert!(last_event_id_for_device_before_time(device, SystemTime::now()) <= now);
}
