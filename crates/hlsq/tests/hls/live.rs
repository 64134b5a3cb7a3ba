use std::sync::Arc;

use hlsq::{filter, HlsqError, HttpClient, SegmentCollector};
use url::Url;
use wiremock::MockServer;

use super::{media_playlist, requests_to, HlsMock};

fn ids(collector: &SegmentCollector) -> Vec<(u64, u64)> {
    collector
        .segments()
        .sorted()
        .iter()
        .map(|s| (s.discontinuity_sequence, s.sequence))
        .collect()
}

#[tokio::test]
async fn overlapping_listings_dispatch_once() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    server
        .mock_master("/master.m3u8", &[("media.m3u8", 1000)])
        .await
        .mock_times("/media.m3u8", media_playlist(1, 5, 4, false), 1)
        .await
        .mock("/media.m3u8", media_playlist(1, 6, 4, true))
        .await;

    let collector = Arc::new(SegmentCollector::new());
    let session = hlsq::play(
        HttpClient::default(),
        format!("{}/master.m3u8", server.uri()).parse()?,
        filter::max_bandwidth,
        collector.clone(),
    )
    .await?;
    session.wait().await?;

    assert_eq!(ids(&collector), vec![(0, 5), (0, 6), (0, 7), (0, 8), (0, 9)]);
    assert_eq!(requests_to(&server, "/media.m3u8").await, 2);

    let media_url: Url = format!("{}/media.m3u8", server.uri()).parse()?;
    for segment in collector.segments().iter() {
        assert_eq!(segment.playlist, media_url);
        assert_eq!(segment.uri(), format!("segment{}.ts", segment.sequence));
    }

    Ok(())
}

#[tokio::test]
async fn discontinuity_starts_new_epoch() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    server
        .mock(
            "/media.m3u8",
            "#EXTM3U
#EXT-X-TARGETDURATION:4
#EXT-X-MEDIA-SEQUENCE:10
#EXT-X-DISCONTINUITY-SEQUENCE:2
#EXTINF:4.000,
a.ts
#EXTINF:4.000,
b.ts
#EXT-X-DISCONTINUITY
#EXTINF:4.000,
c.ts
#EXTINF:4.000,
d.ts
#EXT-X-ENDLIST
",
        )
        .await;

    let collector = Arc::new(SegmentCollector::new());
    let session = hlsq::play(
        HttpClient::default(),
        format!("{}/media.m3u8", server.uri()).parse()?,
        filter::all,
        collector.clone(),
    )
    .await?;
    session.wait().await?;

    assert_eq!(ids(&collector), vec![(2, 10), (2, 11), (3, 0), (3, 1)]);
    let uris: Vec<_> = collector
        .segments()
        .sorted()
        .iter()
        .map(|s| s.uri())
        .collect();
    assert_eq!(uris, vec!["a.ts", "b.ts", "c.ts", "d.ts"]);

    Ok(())
}

#[tokio::test]
async fn key_and_map_carry_forward() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    server
        .mock(
            "/media.m3u8",
            r#"#EXTM3U
#EXT-X-TARGETDURATION:4
#EXT-X-VERSION:6
#EXT-X-MAP:URI="init.mp4"
#EXT-X-KEY:METHOD=AES-128,URI="key1.bin"
#EXTINF:4.000,
a.m4s
#EXTINF:4.000,
b.m4s
#EXT-X-KEY:METHOD=NONE
#EXTINF:4.000,
c.m4s
#EXT-X-ENDLIST
"#,
        )
        .await;

    let collector = Arc::new(SegmentCollector::new());
    let session = hlsq::play(
        HttpClient::default(),
        format!("{}/media.m3u8", server.uri()).parse()?,
        filter::all,
        collector.clone(),
    )
    .await?;
    session.wait().await?;

    let segments = collector.segments().sorted();
    assert_eq!(segments.len(), 3);
    assert_eq!(segments[0].key_uri().as_deref(), Some("key1.bin"));
    assert_eq!(segments[1].key_uri().as_deref(), Some("key1.bin"));
    assert_eq!(
        segments[1].key_url()?.map(|u| u.to_string()),
        Some(format!("{}/key1.bin", server.uri()))
    );
    assert!(segments[2].key_uri().is_none());
    for segment in segments.iter() {
        let map = segment.media().map.clone();
        assert_eq!(map.map(|m| m.uri).as_deref(), Some("init.mp4"));
    }

    Ok(())
}

#[tokio::test]
async fn nested_master_playlist_is_rejected() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    server
        .mock_master("/master.m3u8", &[("nested.m3u8", 1000)])
        .await
        .mock_master("/nested.m3u8", &[("media.m3u8", 1000)])
        .await;

    let collector = Arc::new(SegmentCollector::new());
    let session = hlsq::play(
        HttpClient::default(),
        format!("{}/master.m3u8", server.uri()).parse()?,
        filter::all,
        collector.clone(),
    )
    .await?;

    let result = session.wait().await;
    assert!(matches!(
        result,
        Err(HlsqError::UnexpectedPlaylist("master playlist"))
    ));
    assert!(collector.segments().is_empty());

    Ok(())
}

#[tokio::test]
async fn malformed_media_playlist_fails() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    server
        .mock_master("/master.m3u8", &[("media.m3u8", 1000)])
        .await
        .mock("/media.m3u8", "<html>gateway timeout</html>")
        .await;

    let session = hlsq::play(
        HttpClient::default(),
        format!("{}/master.m3u8", server.uri()).parse()?,
        filter::all,
        SegmentCollector::new(),
    )
    .await?;

    assert!(matches!(
        session.wait().await,
        Err(HlsqError::M3u8ParseError(_))
    ));
    // parse errors are never retried
    assert_eq!(requests_to(&server, "/media.m3u8").await, 1);

    Ok(())
}
