//! Integration tests against a fake upstream served from a local socket.
//!
//! Each fake writes raw HTTP/1.1 so the tests exercise the real client path:
//! connect, status check, chunked body framing, reconnect and shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use postpulse_core::{AggregateService, HubError};
use postpulse_sse::{EventHub, HubConfig, HubState, WindowedCollector};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

// ─── Helpers ──────────────────────────────────────────────────────────────────

const SSE_HEADERS: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\n\r\n";

async fn read_request(stream: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

/// Upstream that answers every request with `500` and counts connections.
async fn failing_upstream() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/stream", listener.local_addr().unwrap());
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&hits);
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            read_request(&mut stream).await;
            let _ = stream
                .write_all(b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
        }
    });

    (url, hits)
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ─── Reconnection ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn gives_up_after_max_plus_one_attempts() {
    let (url, hits) = failing_upstream().await;
    let hub = EventHub::new(HubConfig::new(url).with_max_reconnection_attempts(3)).unwrap();

    let err = hub.listen().await.unwrap_err();

    assert!(matches!(err, HubError::ReconnectionAttemptsExceeded));
    assert_eq!(hits.load(Ordering::SeqCst), 4);
    assert_eq!(hub.state(), HubState::Failed);
    assert_eq!(hub.metrics().reconnections, 3);
}

#[tokio::test]
async fn close_interrupts_backoff_without_reconnecting() {
    let (url, hits) = failing_upstream().await;
    let hub = Arc::new(EventHub::new(HubConfig::new(url).with_max_reconnection_attempts(50)).unwrap());

    let listener = tokio::spawn({
        let hub = Arc::clone(&hub);
        async move { hub.listen().await }
    });

    wait_until("a few reconnects", || hub.metrics().reconnections >= 3).await;
    hub.close();

    let result = tokio::time::timeout(Duration::from_secs(1), listener)
        .await
        .expect("listen did not observe close")
        .unwrap();
    assert!(result.is_ok());

    let seen = hits.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(hits.load(Ordering::SeqCst), seen);
    assert_eq!(hub.state(), HubState::Closed);
}

#[tokio::test]
async fn stable_connections_restore_the_budget() {
    // Every connection streams one event and ends, which counts as a failure.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/stream", listener.local_addr().unwrap());
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            read_request(&mut stream).await;
            let _ = stream.write_all(SSE_HEADERS).await;
            let _ = stream.write_all(b"data: {\"yt\":{\"timestamp\":1}}\n\n").await;
        }
    });

    let mut config = HubConfig::new(url).with_max_reconnection_attempts(1);
    config.reset_attempts_after_ms = Some(0);
    let hub = Arc::new(EventHub::new(config).unwrap());

    let task = tokio::spawn({
        let hub = Arc::clone(&hub);
        async move { hub.listen().await }
    });

    wait_until("four connections", || hits.load(Ordering::SeqCst) >= 4).await;
    assert!(!task.is_finished());

    hub.close();
    assert!(task.await.unwrap().is_ok());
}

// ─── End to end ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn window_aggregates_streamed_events() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/stream", listener.local_addr().unwrap());
    let go = Arc::new(Notify::new());

    let release = Arc::clone(&go);
    tokio::spawn(async move {
        let Ok((mut stream, _)) = listener.accept().await else { return };
        read_request(&mut stream).await;
        stream.write_all(SSE_HEADERS).await.unwrap();
        stream.write_all(b": connected\n\n").await.unwrap();

        release.notified().await;
        stream
            .write_all(b"event: post\ndata: {\"tweet\":{\"likes\":1,\"timestamp\":5}}\n\n")
            .await
            .unwrap();
        // Second event split across writes.
        stream.write_all(b"data: {\"instagram_media\":{\"lik").await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        stream.write_all(b"es\":7,\"comments\":3,\"timestamp\":11}}\r\n\r\n").await.unwrap();

        // Hold the stream open past the window.
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let hub = Arc::new(EventHub::new(HubConfig::new(url)).unwrap());
    let listen = tokio::spawn({
        let hub = Arc::clone(&hub);
        async move { hub.listen().await }
    });
    wait_until("stream connected", || hub.state() == HubState::Streaming).await;

    let service = Arc::new(AggregateService::new(WindowedCollector::new(Arc::clone(&hub))));
    let request = tokio::spawn({
        let service = Arc::clone(&service);
        async move { service.aggregate(Duration::from_millis(1_500), "likes").await }
    });

    wait_until("collector subscribed", || hub.metrics().subscribers == 1).await;
    go.notify_one();

    let aggregation = request.await.unwrap().unwrap();
    assert_eq!(aggregation.total_posts, 2);
    assert_eq!(aggregation.minimum_timestamp, 5);
    assert_eq!(aggregation.maximum_timestamp, 11);
    assert_eq!(aggregation.avg_likes, Some(4));
    assert_eq!(aggregation.avg_comments, None);
    assert_eq!(hub.metrics().subscribers, 0);

    hub.close();
    assert!(listen.await.unwrap().is_ok());
}

#[tokio::test]
async fn concurrent_windows_each_see_every_event() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/stream", listener.local_addr().unwrap());
    let go = Arc::new(Notify::new());

    let release = Arc::clone(&go);
    tokio::spawn(async move {
        let Ok((mut stream, _)) = listener.accept().await else { return };
        read_request(&mut stream).await;
        stream.write_all(SSE_HEADERS).await.unwrap();
        release.notified().await;
        for ts in 1..=3 {
            let line = format!("data: {{\"yt\":{{\"retweets\":{},\"timestamp\":{ts}}}}}\n\n", ts * 2);
            stream.write_all(line.as_bytes()).await.unwrap();
        }
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let hub = Arc::new(EventHub::new(HubConfig::new(url)).unwrap());
    tokio::spawn({
        let hub = Arc::clone(&hub);
        async move { hub.listen().await }
    });
    wait_until("stream connected", || hub.state() == HubState::Streaming).await;

    let collector = WindowedCollector::new(Arc::clone(&hub));
    let windows: Vec<_> = (0..2)
        .map(|_| {
            let collector = collector.clone();
            tokio::spawn(async move { collector.collect_for(Duration::from_millis(800)).await })
        })
        .collect();

    wait_until("both collectors subscribed", || hub.metrics().subscribers == 2).await;
    go.notify_one();

    for window in windows {
        let posts = window.await.unwrap().unwrap();
        let stamps: Vec<i64> = posts.iter().map(|p| p.timestamp).collect();
        assert_eq!(stamps, vec![1, 2, 3]);
    }
    hub.close();
}
