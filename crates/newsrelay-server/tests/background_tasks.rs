use axum::{http::header, routing::get, Router};
use newsrelay_db::MemoryEntityStore;
use newsrelay_identity::Secp256k1Signer;
use newsrelay_server::background::{drain_events, seed_feeds, start_poll_task};
use newsrelay_server::bridge::Bridge;
use newsrelay_server::config::FeedSeed;
use newsrelay_server::feed_cache::FeedCache;
use newsrelay_server::feeds::HttpFeedSource;
use newsrelay_server::host::{ChannelHost, RelayHost};
use newsrelay_server::http::{build_http_client, FETCH_TIMEOUT};
use newsrelay_types::{Event, EventKind, Filter};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

const FEED_JSON: &str = r#"{
  "version": "https://jsonfeed.org/version/1.1",
  "title": "JSON Example",
  "home_page_url": "https://json.example.com",
  "items": [
    {
      "id": "1",
      "url": "https://json.example.com/1",
      "title": "Hello",
      "summary": "World",
      "content_text": "World, at length",
      "date_published": "2024-03-01T12:00:00Z"
    }
  ]
}"#;

async fn spawn_origin() -> String {
    let app = Router::new().route(
        "/feed.json",
        get(|| async { ([(header::CONTENT_TYPE, "application/feed+json")], FEED_JSON) }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn test_bridge() -> Arc<Bridge> {
    let http = build_http_client(FETCH_TIMEOUT);
    let feeds = FeedCache::new(
        Arc::new(HttpFeedSource::new(http.clone())),
        NonZeroUsize::new(8).unwrap(),
        Duration::from_secs(60),
    );
    Arc::new(Bridge::new(
        "background-secret",
        http,
        feeds,
        Arc::new(MemoryEntityStore::new()),
        Arc::new(Secp256k1Signer),
    ))
}

#[tokio::test]
async fn seed_feeds_skips_failures() {
    let origin = spawn_origin().await;
    let bridge = test_bridge();

    let seeds = vec![
        FeedSeed {
            url: format!("{origin}/feed.json"),
            name: "JSON".into(),
            ..FeedSeed::default()
        },
        FeedSeed {
            url: format!("{origin}/nothing-here"),
            ..FeedSeed::default()
        },
    ];

    assert_eq!(seed_feeds(Arc::clone(&bridge), seeds).await, 1);
}

#[tokio::test]
async fn poll_task_delivers_after_first_interval() {
    let origin = spawn_origin().await;
    let bridge = test_bridge();
    let reg = bridge
        .register(&format!("{origin}/feed.json"), None)
        .await
        .unwrap();

    let (host, mut rx) = ChannelHost::new(8);
    host.subscribe(
        "s",
        vec![Filter {
            authors: vec![reg.pubkey.clone()],
            kinds: Some(vec![1]),
            ..Filter::default()
        }],
    );
    let host: Arc<dyn RelayHost> = Arc::new(host);

    let task = tokio::spawn(start_poll_task(
        Arc::clone(&bridge),
        host,
        Duration::from_millis(50),
    ));

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("poll should deliver within the timeout")
        .expect("channel open");
    assert_eq!(event.kind, EventKind::TextNote);
    assert_eq!(event.pubkey, reg.pubkey);
    assert_eq!(
        event.content,
        "**Hello**\n\nWorld\n\nhttps://json.example.com/1"
    );

    task.abort();
}

#[tokio::test]
async fn poll_task_with_zero_interval_returns() {
    let (host, _rx) = ChannelHost::new(1);
    let host: Arc<dyn RelayHost> = Arc::new(host);

    tokio::time::timeout(
        Duration::from_secs(1),
        start_poll_task(test_bridge(), host, Duration::ZERO),
    )
    .await
    .expect("disabled task should return immediately");
}

#[tokio::test]
async fn drain_ends_when_senders_are_dropped() {
    let (tx, rx) = tokio::sync::mpsc::channel(4);
    let drain = tokio::spawn(drain_events(rx));

    tx.send(Event::unsigned("pk", 1, EventKind::TextNote, "x"))
        .await
        .unwrap();
    drop(tx);

    tokio::time::timeout(Duration::from_secs(1), drain)
        .await
        .expect("drain should finish")
        .unwrap();
}
