use std::{
    collections::HashMap,
    num::NonZeroU32,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use hlsq::{
    fetch::get_with_retry, CancellationToken, HlsqError, HlsqResult, HttpClient, RetryPolicy,
    Segment, SegmentConsumer, SegmentList,
};
use reqwest::Url;
use tokio::{
    io::AsyncWriteExt,
    sync::{OnceCell, Semaphore},
};

const SEGMENT_DIR: &str = "segments";

/// Stores every segment under `<dest>/segments` and keeps `<dest>/play.m3u8`
/// pointing at the local copies.
pub struct FsHandler {
    client: HttpClient,
    dest: PathBuf,
    retry: RetryPolicy,
    permits: Semaphore,

    /// Set once the file behind the URL is completely written.
    downloads: Mutex<HashMap<Url, Arc<OnceCell<()>>>>,
    resources: Mutex<HashMap<Url, String>>,
    segments: tokio::sync::Mutex<SegmentList>,
}

impl FsHandler {
    pub async fn new(
        client: HttpClient,
        dest: impl Into<PathBuf>,
        threads: NonZeroU32,
        retry: RetryPolicy,
    ) -> HlsqResult<Self> {
        let dest = dest.into();
        tokio::fs::create_dir_all(dest.join(SEGMENT_DIR)).await?;

        Ok(Self {
            client,
            dest,
            retry,
            permits: Semaphore::new(threads.get() as usize),
            downloads: Mutex::new(HashMap::new()),
            resources: Mutex::new(HashMap::new()),
            segments: tokio::sync::Mutex::new(SegmentList::new()),
        })
    }

    /// Writes the final playlist, marked as ended.
    pub async fn finish(&self) -> HlsqResult<()> {
        log::info!("Saving VOD playlist.");
        let segments = self.segments.lock().await;
        self.write_playlist(&segments, true).await
    }

    /// Local path shared by every segment referencing `url`, such as a key or
    /// an initialization section.
    fn resource_path(&self, prefix: &str, url: &Url) -> String {
        let mut resources = self
            .resources
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let next = resources.len();
        resources
            .entry(url.clone())
            .or_insert_with(|| {
                format!("{SEGMENT_DIR}/{prefix}{next}{}", extension(url, ".bin"))
            })
            .clone()
    }

    /// Downloads `url` to `path` once. Concurrent callers for the same URL
    /// wait for the first download, a failed download is attempted again by
    /// the next caller.
    async fn save_url_to(
        &self,
        url: &Url,
        path: &str,
        token: &CancellationToken,
    ) -> HlsqResult<()> {
        let cell = self
            .downloads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(url.clone())
            .or_default()
            .clone();
        if cell.initialized() {
            log::debug!("Skip {path}, already downloaded.");
            return Ok(());
        }

        cell.get_or_try_init(|| self.download(url, path, token)).await?;
        Ok(())
    }

    async fn download(&self, url: &Url, path: &str, token: &CancellationToken) -> HlsqResult<()> {
        log::debug!("Waiting for a download slot for {path}");
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| HlsqError::Cancelled)?;

        let mut response = get_with_retry(&self.client, url, &self.retry, token).await?;
        if response.status().as_u16() > 399 {
            return Err(HlsqError::HttpError(response.status()));
        }

        let mut file = tokio::fs::File::create(self.dest.join(path)).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        log::info!("Saved {path}");
        Ok(())
    }

    /// Pushes `segment` and rewrites the live playlist, unless another segment
    /// arrives within half of this segment's duration.
    async fn persist_with_debounce(&self, segment: Arc<Segment>) -> HlsqResult<()> {
        let debounce =
            Duration::try_from_secs_f32(segment.duration() / 2.0).unwrap_or_default();
        let pushed = {
            let mut segments = self.segments.lock().await;
            segments.push(segment);
            segments.len()
        };

        if !debounce.is_zero() {
            tokio::time::sleep(debounce).await;
        }

        let segments = self.segments.lock().await;
        if segments.len() != pushed {
            return Ok(());
        }
        log::debug!("Saving live play.m3u8");
        self.write_playlist(&segments, false).await
    }

    async fn write_playlist(&self, segments: &SegmentList, closed: bool) -> HlsqResult<()> {
        let body = segments.sorted().to_m3u8(closed)?;
        tokio::fs::write(self.dest.join("play.m3u8"), body).await?;
        Ok(())
    }
}

impl SegmentConsumer for FsHandler {
    async fn receive(&self, segment: Arc<Segment>, token: CancellationToken) -> HlsqResult<()> {
        let url = segment.url()?;
        let segment_path = format!(
            "{SEGMENT_DIR}/{}_{}{}",
            segment.discontinuity_sequence,
            segment.sequence,
            extension(&url, ".ts")
        );
        segment.set_uri(segment_path.clone());

        if let Some(key_url) = segment.key_url()? {
            let key_path = self.resource_path("key", &key_url);
            segment.set_key_uri(key_path.clone());
            self.save_url_to(&key_url, &key_path, &token).await?;
        }

        let map_uri = segment.media().map.as_ref().map(|m| m.uri.clone());
        if let Some(map_uri) = map_uri {
            let map_url = segment.playlist.join(&map_uri)?;
            let map_path = self.resource_path("init", &map_url);
            if let Some(map) = segment.media().map.as_mut() {
                map.uri = map_path.clone();
            }
            self.save_url_to(&map_url, &map_path, &token).await?;
        }

        self.save_url_to(&url, &segment_path, &token).await?;

        self.persist_with_debounce(segment).await
    }
}

fn extension(url: &Url, default: &str) -> String {
    Path::new(url.path())
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_else(|| default.to_string())
}
