//! End-to-end relay runs against a recording sink and a local media host

mod common;

use axum::http::header;
use axum::routing::get;
use axum::Router;
use common::{entry_count, serve, text_item, RecordingSink, Sent, StaticFeed, JPEG};
use feed_relay::bot::{DeliveryRouter, SendMethod};
use feed_relay::item::{Item, MediaKind};
use feed_relay::media::{DirectFetch, MediaAcquirer, TempRoot};
use feed_relay::relay::{Relay, RelayError};
use feed_relay::storage::{read_snapshot, StatePaths};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const MAX_BYTES: u64 = 1024;

fn build_relay(sink: Arc<RecordingSink>, media_root: &Path) -> Relay {
    let client = reqwest::Client::new();
    let acquirer = MediaAcquirer::new(
        vec![Box::new(DirectFetch::new(
            client,
            TempRoot::new(Some(media_root.to_path_buf())),
        ))],
        MAX_BYTES,
    );
    Relay::new(acquirer, DeliveryRouter::new(sink), Duration::ZERO, 100)
}

fn read_seen(paths: &StatePaths) -> Vec<String> {
    let content = std::fs::read_to_string(&paths.seen).expect("seen file");
    serde_json::from_str(&content).expect("seen json")
}

fn texts(sent: &[Sent]) -> Vec<String> {
    sent.iter()
        .filter_map(|s| match s {
            Sent::Text(t) => Some(t.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_text_item_on_cold_start() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let paths = StatePaths::for_source(tmp.path(), "test");
    let sink = Arc::new(RecordingSink::default());
    let relay = build_relay(sink.clone(), &tmp.path().join("media"));

    let feed = StaticFeed::new(vec![Item::new("a")]);
    let report = relay.run(&feed, &paths).await.expect("run");

    assert_eq!(report.delivered, 1);
    assert_eq!(sink.sent().len(), 1);
    assert!(matches!(&sink.sent()[0], Sent::Text(t) if t.contains("<b>N/A</b>")));
    assert_eq!(read_seen(&paths), vec!["a".to_string()]);
    assert_eq!(
        read_snapshot(&paths.snapshot).expect("snapshot"),
        Some(vec![Item::new("a")])
    );
}

#[tokio::test]
async fn test_seen_item_is_not_resent() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let paths = StatePaths::for_source(tmp.path(), "test");
    std::fs::create_dir_all(paths.seen.parent().expect("parent")).expect("mkdir");
    std::fs::write(&paths.seen, "[\"a\"]").expect("seed store");

    let sink = Arc::new(RecordingSink::default());
    let relay = build_relay(sink.clone(), &tmp.path().join("media"));
    let report = relay
        .run(&StaticFeed::new(vec![Item::new("a")]), &paths)
        .await
        .expect("run");

    assert_eq!(report.fresh, 0);
    assert!(sink.sent().is_empty());
    assert_eq!(std::fs::read_to_string(&paths.seen).expect("seen"), "[\"a\"]");
}

#[tokio::test]
async fn test_second_run_sends_nothing() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let paths = StatePaths::for_source(tmp.path(), "test");
    let sink = Arc::new(RecordingSink::default());
    let relay = build_relay(sink.clone(), &tmp.path().join("media"));
    let feed = StaticFeed::new(vec![text_item("x"), text_item("y")]);

    relay.run(&feed, &paths).await.expect("first run");
    let first = read_seen(&paths);
    let report = relay.run(&feed, &paths).await.expect("second run");

    assert_eq!(report.delivered, 0);
    assert_eq!(sink.sent().len(), 2);
    assert_eq!(read_seen(&paths), first);
}

#[tokio::test]
async fn test_delivers_oldest_first() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let paths = StatePaths::for_source(tmp.path(), "test");
    let sink = Arc::new(RecordingSink::default());
    let relay = build_relay(sink.clone(), &tmp.path().join("media"));

    let feed = StaticFeed::new(vec![text_item("new3"), text_item("new2"), text_item("new1")]);
    relay.run(&feed, &paths).await.expect("run");

    let order: Vec<String> = texts(&sink.sent())
        .iter()
        .map(|t| t.lines().next().unwrap_or_default().to_string())
        .collect();
    assert_eq!(order, vec!["<b>new1</b>", "<b>new2</b>", "<b>new3</b>"]);
    assert_eq!(read_seen(&paths), vec!["new1", "new2", "new3"]);
}

#[tokio::test]
async fn test_oversized_media_falls_back_to_text() {
    let addr = serve(Router::new().route(
        "/huge.mp4",
        get(|| async { ([(header::CONTENT_TYPE, "video/mp4")], vec![0u8; 4096]) }),
    ))
    .await;

    let tmp = tempfile::tempdir().expect("tempdir");
    let media_root = tmp.path().join("media");
    let paths = StatePaths::for_source(tmp.path(), "test");
    let sink = Arc::new(RecordingSink::default());
    let relay = build_relay(sink.clone(), &media_root);

    let mut item = text_item("b");
    item.kind = MediaKind::Single;
    item.media_refs = vec![format!("http://{addr}/huge.mp4")];
    let report = relay.run(&StaticFeed::new(vec![item]), &paths).await.expect("run");

    assert_eq!(report.delivered, 1);
    assert_eq!(texts(&sink.sent()).len(), 1);
    assert_eq!(read_seen(&paths), vec!["b".to_string()]);
    assert_eq!(entry_count(&media_root), 0);
}

#[tokio::test]
async fn test_photo_is_uploaded_and_cleaned_up() {
    let addr = serve(Router::new().route(
        "/pic.jpg",
        get(|| async { ([(header::CONTENT_TYPE, "image/jpeg")], JPEG.to_vec()) }),
    ))
    .await;

    let tmp = tempfile::tempdir().expect("tempdir");
    let media_root = tmp.path().join("media");
    let paths = StatePaths::for_source(tmp.path(), "test");
    let sink = Arc::new(RecordingSink::default());
    let relay = build_relay(sink.clone(), &media_root);

    let mut item = text_item("p");
    item.kind = MediaKind::Single;
    item.media_refs = vec![
        format!("http://{addr}/missing.jpg"),
        format!("http://{addr}/pic.jpg"),
    ];
    relay.run(&StaticFeed::new(vec![item]), &paths).await.expect("run");

    assert_eq!(
        sink.sent(),
        vec![Sent::File {
            method: SendMethod::Photo,
            caption: "<b>p</b>\n👤 by <code>N/A</code>\n<code>N/A</code>".to_string(),
            bytes: JPEG.len(),
        }]
    );
    assert_eq!(entry_count(&media_root), 0);
}

#[tokio::test]
async fn test_gallery_sent_as_album() {
    let addr = serve(Router::new().route(
        "/g.jpg",
        get(|| async { ([(header::CONTENT_TYPE, "image/jpeg")], JPEG.to_vec()) }),
    ))
    .await;

    let tmp = tempfile::tempdir().expect("tempdir");
    let paths = StatePaths::for_source(tmp.path(), "test");
    let sink = Arc::new(RecordingSink::default());
    let relay = build_relay(sink.clone(), &tmp.path().join("media"));

    let mut item = text_item("g");
    item.kind = MediaKind::Gallery;
    item.media_refs = (0..3).map(|i| format!("http://{addr}/g.jpg?n={i}")).collect();
    relay.run(&StaticFeed::new(vec![item]), &paths).await.expect("run");

    assert!(matches!(
        sink.sent().as_slice(),
        [Sent::Album { count: 3, caption }] if caption.starts_with("<b>g</b>")
    ));
}

#[tokio::test]
async fn test_failed_delivery_is_not_marked() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let paths = StatePaths::for_source(tmp.path(), "test");
    let sink = Arc::new(RecordingSink::failing());
    let relay = build_relay(sink, &tmp.path().join("media"));

    let report = relay
        .run(&StaticFeed::new(vec![text_item("lost")]), &paths)
        .await
        .expect("run");

    assert_eq!(report.delivered, 0);
    assert_eq!(report.failed, vec!["lost".to_string()]);
    assert!(read_seen(&paths).is_empty());
}

#[tokio::test]
async fn test_feed_failure_stops_the_run() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let paths = StatePaths::for_source(tmp.path(), "test");
    let sink = Arc::new(RecordingSink::default());
    let relay = build_relay(sink.clone(), &tmp.path().join("media"));

    let result = relay.run(&StaticFeed::broken(), &paths).await;
    assert!(matches!(result, Err(RelayError::FeedUnavailable { .. })));
    assert!(sink.sent().is_empty());
    assert!(!paths.snapshot.exists());
}

#[tokio::test]
async fn test_corrupt_store_is_recovered() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let paths = StatePaths::for_source(tmp.path(), "test");
    let state_dir = paths.seen.parent().expect("parent").to_path_buf();
    std::fs::create_dir_all(&state_dir).expect("mkdir");
    std::fs::write(&paths.seen, "[\"a\", ").expect("write corrupt");

    let sink = Arc::new(RecordingSink::default());
    let relay = build_relay(sink.clone(), &tmp.path().join("media"));
    relay
        .run(&StaticFeed::new(vec![text_item("a")]), &paths)
        .await
        .expect("run");

    assert_eq!(sink.sent().len(), 1);
    assert_eq!(read_seen(&paths), vec!["a".to_string()]);
    let preserved = std::fs::read_dir(&state_dir)
        .expect("read dir")
        .filter_map(Result::ok)
        .any(|e| e.file_name().to_string_lossy().starts_with("seen.json.corrupt."));
    assert!(preserved);
}
