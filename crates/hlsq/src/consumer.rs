use std::{
    future::Future,
    sync::{Arc, Mutex},
};

use tokio_util::sync::CancellationToken;

use crate::{
    error::HlsqResult,
    hls::segment::{Segment, SegmentList},
};

/// Receives every newly discovered segment exactly once.
///
/// Calls run concurrently and in no particular order. Consumers that need
/// ordered output should accumulate and sort by [`Segment`]'s ordering. An
/// error stops the pilot that discovered the segment, and with it the session.
///
/// The consumer may rewrite the segment's URI and key reference through
/// [`Segment::set_uri`] and [`Segment::set_key_uri`]. `token` fires when the
/// owning pilot stops, the pending future is dropped right after.
pub trait SegmentConsumer {
    fn receive(
        &self,
        segment: Arc<Segment>,
        token: CancellationToken,
    ) -> impl Future<Output = HlsqResult<()>> + Send;
}

impl<T> SegmentConsumer for Arc<T>
where
    T: SegmentConsumer + Send + Sync,
{
    fn receive(
        &self,
        segment: Arc<Segment>,
        token: CancellationToken,
    ) -> impl Future<Output = HlsqResult<()>> + Send {
        T::receive(self, segment, token)
    }
}

/// Keeps every received segment in memory.
#[derive(Default)]
pub struct SegmentCollector {
    segments: Mutex<SegmentList>,
}

impl SegmentCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Segments received so far, in arrival order.
    pub fn segments(&self) -> SegmentList {
        self.segments
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl SegmentConsumer for SegmentCollector {
    async fn receive(&self, segment: Arc<Segment>, _token: CancellationToken) -> HlsqResult<()> {
        self.segments
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(segment);
        Ok(())
    }
}
