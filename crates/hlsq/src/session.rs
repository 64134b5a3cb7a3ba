use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    capture::{self, DebugCapture},
    consumer::SegmentConsumer,
    error::{HlsqError, HlsqResult},
    fetch::{get_bytes_with_retry, RetryPolicy},
    hls::{decode, pilot::Pilot, select_variants, Variant},
    util::{group::TaskGroup, http::HttpClient},
};

/// Running pilots of one played stream.
pub struct Session {
    group: TaskGroup,
    variants: Vec<Url>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Media playlists followed by this session.
    pub fn variants(&self) -> &[Url] {
        &self.variants
    }

    /// Token cancelling every pilot of this session when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.group.token().clone()
    }

    /// Asks every pilot to stop without waiting for them.
    pub fn cancel(&self) {
        self.group.cancel();
    }

    /// Waits until every pilot has stopped.
    ///
    /// Returns the first pilot failure. Which one is reported when several
    /// pilots fail at the same moment is unspecified. A session that was
    /// cancelled without any failure returns `Ok(())`.
    pub async fn wait(self) -> HlsqResult<()> {
        match self.group.wait().await {
            Err(HlsqError::Cancelled) => Ok(()),
            result => result,
        }
    }

    /// Cancels the session, then waits like [`Session::wait`].
    pub async fn close(self) -> HlsqResult<()> {
        self.cancel();
        self.wait().await
    }
}

pub struct SessionBuilder {
    client: Option<HttpClient>,
    retry: RetryPolicy,
    capture: Option<Arc<dyn DebugCapture>>,
    token: Option<CancellationToken>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            client: None,
            retry: RetryPolicy::default(),
            capture: None,
            token: None,
        }
    }

    pub fn client(mut self, client: HttpClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Copies every fetched playlist body into `capture`.
    pub fn capture(mut self, capture: impl DebugCapture + 'static) -> Self {
        self.capture = Some(Arc::new(capture));
        self
    }

    /// Makes the session a child of `token`: cancelling it cancels the session.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Loads `url`, selects the media playlists to follow and starts one pilot
    /// for each of them. Returns as soon as the pilots are started.
    pub async fn play<F, C>(self, url: Url, filter: F, consumer: C) -> HlsqResult<Session>
    where
        F: FnOnce(Vec<Variant>) -> Vec<Variant>,
        C: SegmentConsumer + Send + Sync + 'static,
    {
        let client = self.client.unwrap_or_default();
        let token = match self.token {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };

        log::info!("Start fetching playlist {url}");
        let body = get_bytes_with_retry(&client, &url, &self.retry, &token).await?;
        capture::tee(self.capture.as_deref(), "master.m3u8", &body);

        let playlist = decode(&body)?;
        log::debug!("Decoded {} from {url}", playlist.kind());
        let variants = select_variants(&url, playlist, filter)?;
        for variant in variants.iter() {
            log::info!("Using variant: {variant}");
        }

        let group = TaskGroup::new(token);
        let consumer = Arc::new(consumer);
        for (index, variant) in variants.iter().enumerate() {
            let pilot = Pilot {
                index,
                url: variant.clone(),
                client: client.clone(),
                retry: self.retry.clone(),
                capture: self.capture.clone(),
                consumer: consumer.clone(),
            };
            group.spawn(pilot.run(group.token().child_token()));
        }

        Ok(Session { group, variants })
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Plays `url` with the default retry policy and no capture sink.
pub async fn play<F, C>(client: HttpClient, url: Url, filter: F, consumer: C) -> HlsqResult<Session>
where
    F: FnOnce(Vec<Variant>) -> Vec<Variant>,
    C: SegmentConsumer + Send + Sync + 'static,
{
    SessionBuilder::new()
        .client(client)
        .play(url, filter, consumer)
        .await
}
