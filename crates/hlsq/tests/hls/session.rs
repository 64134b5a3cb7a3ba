use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use hlsq::{
    filter, CancellationToken, DirCapture, HlsqError, HttpClient, RetryPolicy, Session,
    SegmentCollector,
};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use super::{media_playlist, requests_to, HlsMock};
use crate::{wait_for_segments, FailingConsumer, PanickingConsumer};

#[tokio::test]
async fn close_returns_before_next_poll() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    server
        .mock("/media.m3u8", media_playlist(30, 0, 3, false))
        .await;

    let collector = Arc::new(SegmentCollector::new());
    let session = hlsq::play(
        HttpClient::default(),
        format!("{}/media.m3u8", server.uri()).parse()?,
        filter::all,
        collector.clone(),
    )
    .await?;
    wait_for_segments(&collector, 3).await;

    let started = Instant::now();
    session.close().await?;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(collector.segments().len(), 3);

    Ok(())
}

#[tokio::test]
async fn close_aborts_poll_in_flight() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    server
        .mock_times("/media.m3u8", media_playlist(1, 0, 1, false), 2)
        .await;
    Mock::given(method("GET"))
        .and(path("/media.m3u8"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(media_playlist(1, 0, 1, false))
                .set_delay(Duration::from_secs(12)),
        )
        .mount(&server)
        .await;

    let collector = Arc::new(SegmentCollector::new());
    let session = hlsq::play(
        HttpClient::default(),
        format!("{}/media.m3u8", server.uri()).parse()?,
        filter::all,
        collector.clone(),
    )
    .await?;
    wait_for_segments(&collector, 1).await;
    // the next poll is now stuck on the delayed response
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let started = Instant::now();
    session.close().await?;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(collector.segments().len(), 1);

    Ok(())
}

#[tokio::test]
async fn parent_token_cancels_session() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    server
        .mock("/media.m3u8", media_playlist(30, 0, 1, false))
        .await;

    let parent = CancellationToken::new();
    let collector = Arc::new(SegmentCollector::new());
    let session = Session::builder()
        .cancellation(parent.clone())
        .play(
            format!("{}/media.m3u8", server.uri()).parse()?,
            filter::all,
            collector.clone(),
        )
        .await?;
    wait_for_segments(&collector, 1).await;

    parent.cancel();
    tokio::time::timeout(Duration::from_secs(5), session.wait()).await??;

    Ok(())
}

#[tokio::test]
async fn consumer_error_stops_polling() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    server
        .mock_master("/master.m3u8", &[("media.m3u8", 1000)])
        .await
        .mock("/media.m3u8", media_playlist(1, 0, 2, false))
        .await;

    let consumer = Arc::new(FailingConsumer::default());
    let session = hlsq::play(
        HttpClient::default(),
        format!("{}/master.m3u8", server.uri()).parse()?,
        filter::all,
        consumer.clone(),
    )
    .await?;

    let result = session.wait().await;
    assert!(matches!(result, Err(HlsqError::ConsumerError(_))));
    assert!(consumer.calls() >= 1);

    // the playlist would be due again after one second
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(requests_to(&server, "/media.m3u8").await, 1);

    Ok(())
}

#[tokio::test]
async fn consumer_panic_fails_session() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    server
        .mock("/media.m3u8", media_playlist(1, 0, 2, true))
        .await;

    let session = hlsq::play(
        HttpClient::default(),
        format!("{}/media.m3u8", server.uri()).parse()?,
        filter::all,
        Arc::new(PanickingConsumer),
    )
    .await?;

    let result = tokio::time::timeout(Duration::from_secs(5), session.wait()).await?;
    assert!(matches!(result, Err(HlsqError::TaskPanicked(_))));

    Ok(())
}

#[tokio::test]
async fn failing_pilot_cancels_siblings() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    server
        .mock_master("/master.m3u8", &[("gone.m3u8", 100), ("live.m3u8", 200)])
        .await
        .mock("/live.m3u8", media_playlist(30, 0, 1, false))
        .await;
    Mock::given(method("GET"))
        .and(path("/gone.m3u8"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let collector = Arc::new(SegmentCollector::new());
    let session = Session::builder()
        .retry(RetryPolicy::new(2).with_backoff_unit(Duration::from_millis(10)))
        .play(
            format!("{}/master.m3u8", server.uri()).parse()?,
            filter::all,
            collector.clone(),
        )
        .await?;

    let result = tokio::time::timeout(Duration::from_secs(5), session.wait()).await?;
    match result {
        Err(HlsqError::HttpError(status)) => assert_eq!(status.as_u16(), 404),
        other => panic!("unexpected result: {other:?}"),
    }

    Ok(())
}

#[tokio::test]
async fn unreachable_playlist_fails_play() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = Session::builder()
        .retry(RetryPolicy::new(3).with_backoff_unit(Duration::from_millis(10)))
        .play(
            format!("{}/master.m3u8", server.uri()).parse()?,
            filter::all,
            SegmentCollector::new(),
        )
        .await;

    assert!(matches!(result, Err(HlsqError::HttpError(_))));
    assert_eq!(requests_to(&server, "/master.m3u8").await, 3);

    Ok(())
}

#[tokio::test]
async fn capture_keeps_raw_playlists() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    server
        .mock_master("/master.m3u8", &[("media.m3u8", 1000)])
        .await
        .mock("/media.m3u8", media_playlist(2, 0, 1, true))
        .await;

    let dir = tempfile::tempdir()?;
    let session = Session::builder()
        .capture(DirCapture::new(dir.path())?)
        .play(
            format!("{}/master.m3u8", server.uri()).parse()?,
            filter::all,
            SegmentCollector::new(),
        )
        .await?;
    session.wait().await?;

    let master = std::fs::read_to_string(dir.path().join("master.m3u8"))?;
    assert!(master.contains("media.m3u8"));

    let media: Vec<_> = std::fs::read_dir(dir.path())?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("0-"))
        .collect();
    assert_eq!(media.len(), 1);

    Ok(())
}
