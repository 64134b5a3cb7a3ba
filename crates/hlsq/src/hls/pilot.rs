use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use m3u8_rs::{Key, KeyMethod, Map, MediaPlaylist};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    capture::{self, DebugCapture},
    consumer::SegmentConsumer,
    error::{HlsqError, HlsqResult},
    fetch::{get_bytes_with_retry, RetryPolicy},
    hls::{decode, segment::Segment, Playlist},
    util::{group::TaskGroup, http::HttpClient},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SegmentKey {
    playlist: Url,
    discontinuity_sequence: u64,
    sequence: u64,
}

/// Identifiers of every segment a pilot has dispatched.
#[derive(Default)]
struct SeenSet(Mutex<HashSet<SegmentKey>>);

impl SeenSet {
    /// Returns `true` if the key was not present before.
    fn insert(&self, key: SegmentKey) -> bool {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key)
    }
}

/// Identifier counters seeded from a playlist's media and discontinuity
/// sequence numbers.
struct Numbering {
    discontinuity_sequence: u64,
    sequence: u64,
}

impl Numbering {
    fn new(playlist: &MediaPlaylist) -> Self {
        Self {
            discontinuity_sequence: playlist.discontinuity_sequence,
            sequence: playlist.media_sequence,
        }
    }

    /// Returns `(discontinuity_sequence, sequence)` of the next entry.
    fn next(&mut self, discontinuity: bool) -> (u64, u64) {
        // the marker belongs to the segment it precedes
        if discontinuity {
            self.discontinuity_sequence = self.discontinuity_sequence.wrapping_add(1);
            self.sequence = 0;
        }
        let current = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        (self.discontinuity_sequence, current)
    }
}

/// Follows one media playlist until it ends, fails or is cancelled.
pub(crate) struct Pilot<C> {
    pub index: usize,
    pub url: Url,
    pub client: HttpClient,
    pub retry: RetryPolicy,
    pub capture: Option<Arc<dyn DebugCapture>>,
    pub consumer: Arc<C>,
}

impl<C> Pilot<C>
where
    C: SegmentConsumer + Send + Sync + 'static,
{
    pub async fn run(self, token: CancellationToken) -> HlsqResult<()> {
        let group = TaskGroup::new(token);
        let seen = SeenSet::default();
        let mut wait = Duration::ZERO;

        loop {
            if group.is_cancelled() {
                // a recorded error wins over the bare cancellation
                group.wait().await?;
                log::info!("Pilot for {} cancelled.", self.url);
                return Err(HlsqError::Cancelled);
            }

            if !wait.is_zero() {
                tokio::select! {
                    _ = group.cancelled() => continue,
                    _ = tokio::time::sleep(wait) => {}
                }
            }

            log::debug!("Fetching media playlist {} ({wait:?} waited)", self.url);
            let playlist = match self.fetch_playlist(group.token()).await {
                Ok(playlist) => playlist,
                Err(e) => {
                    if !e.is_cancelled() {
                        log::error!("Failed to load media playlist {}: {e}", self.url);
                    }
                    group.fail(e);
                    continue;
                }
            };

            let dispatched = self.dispatch(&playlist, &seen, &group);
            if dispatched > 0 {
                log::info!("{dispatched} new segments found in {}", self.url);
            }

            if playlist.end_list {
                log::info!("Media playlist {} ended, waiting for consumers.", self.url);
                let result = group.wait().await;
                if let Err(e) = &result {
                    log::error!("Pilot for {} failed: {e}", self.url);
                }
                return result;
            }

            wait = Duration::from_secs(playlist.target_duration);
        }
    }

    async fn fetch_playlist(&self, token: &CancellationToken) -> HlsqResult<MediaPlaylist> {
        let body = get_bytes_with_retry(&self.client, &self.url, &self.retry, token).await?;

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        capture::tee(
            self.capture.as_deref(),
            &format!("{}-{timestamp}.m3u8", self.index),
            &body,
        );

        match decode(&body)? {
            Playlist::Media(playlist) => Ok(playlist),
            Playlist::Master(_) => Err(HlsqError::UnexpectedPlaylist("master playlist")),
        }
    }

    /// Spawns a consumer call for every segment not seen before and returns
    /// how many were spawned.
    fn dispatch(&self, playlist: &MediaPlaylist, seen: &SeenSet, group: &TaskGroup) -> usize {
        let mut numbering = Numbering::new(playlist);
        let mut key: Option<Key> = None;
        let mut map: Option<Map> = None;
        let mut dispatched = 0;

        for media in playlist.segments.iter() {
            let (discontinuity_sequence, current) = numbering.next(media.discontinuity);

            if let Some(k) = &media.key {
                key = (k.method != KeyMethod::None).then(|| k.clone());
            }
            if let Some(m) = &media.map {
                map = Some(m.clone());
            }

            let is_new = seen.insert(SegmentKey {
                playlist: self.url.clone(),
                discontinuity_sequence,
                sequence: current,
            });
            if !is_new {
                continue;
            }

            let mut media = media.clone();
            media.key = key.clone();
            media.map = map.clone();
            let segment = Arc::new(Segment::new(
                media,
                current,
                discontinuity_sequence,
                self.url.clone(),
            ));

            log::debug!(
                "Dispatching segment {discontinuity_sequence}/{current} of {}",
                self.url
            );
            let consumer = self.consumer.clone();
            let token = group.token().clone();
            group.spawn_abortable(async move { consumer.receive(segment, token).await });
            dispatched += 1;
        }

        dispatched
    }
}
