use std::{
    cmp::Ordering,
    ops::Deref,
    sync::{Arc, Mutex, MutexGuard},
};

use m3u8_rs::{MediaPlaylist, MediaSegment};
use url::Url;

use crate::error::HlsqResult;

/// A media segment handed to a consumer.
///
/// The identifiers are fixed when the segment is discovered. The playlist
/// attributes live behind a lock so a consumer may rewrite the URI or key
/// reference in place; anyone holding the same `Arc<Segment>` observes the
/// change.
#[derive(Debug)]
pub struct Segment {
    /// Position inside the current discontinuity epoch, reset to 0 by every
    /// discontinuity marker
    pub sequence: u64,
    pub discontinuity_sequence: u64,
    /// Media playlist this segment was listed in
    pub playlist: Url,

    media: Mutex<MediaSegment>,
}

impl Segment {
    pub fn new(
        media: MediaSegment,
        sequence: u64,
        discontinuity_sequence: u64,
        playlist: Url,
    ) -> Self {
        Self {
            sequence,
            discontinuity_sequence,
            playlist,
            media: Mutex::new(media),
        }
    }

    /// Locks the playlist attributes of this segment.
    pub fn media(&self) -> MutexGuard<'_, MediaSegment> {
        self.media
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn uri(&self) -> String {
        self.media().uri.clone()
    }

    pub fn set_uri(&self, uri: impl Into<String>) {
        self.media().uri = uri.into();
    }

    /// The segment URI resolved against its playlist.
    pub fn url(&self) -> HlsqResult<Url> {
        Ok(self.playlist.join(&self.media().uri)?)
    }

    pub fn key_uri(&self) -> Option<String> {
        self.media().key.as_ref().and_then(|key| key.uri.clone())
    }

    /// Replaces the key URI. Does nothing for a segment without a key.
    pub fn set_key_uri(&self, uri: impl Into<String>) {
        if let Some(key) = self.media().key.as_mut() {
            key.uri = Some(uri.into());
        }
    }

    /// The key URI resolved against the playlist.
    pub fn key_url(&self) -> HlsqResult<Option<Url>> {
        match self.key_uri() {
            Some(uri) => Ok(Some(self.playlist.join(&uri)?)),
            None => Ok(None),
        }
    }

    pub fn duration(&self) -> f32 {
        self.media().duration
    }

    pub fn to_media_segment(&self) -> MediaSegment {
        self.media().clone()
    }
}

impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Segment {}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        self.discontinuity_sequence
            .cmp(&other.discontinuity_sequence)
            .then(self.sequence.cmp(&other.sequence))
            .then_with(|| self.playlist.as_str().cmp(other.playlist.as_str()))
    }
}

/// Segments accumulated by a consumer, kept in arrival order.
#[derive(Debug, Default, Clone)]
pub struct SegmentList(Vec<Arc<Segment>>);

impl SegmentList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: Arc<Segment>) {
        self.0.push(segment);
    }

    /// Returns a copy ordered by discontinuity sequence, then sequence.
    pub fn sorted(&self) -> SegmentList {
        let mut sorted = self.0.clone();
        sorted.sort();
        SegmentList(sorted)
    }

    pub fn to_playlist(&self, closed: bool) -> MediaPlaylist {
        let target_duration = self
            .0
            .iter()
            .map(|s| s.duration().ceil() as u64)
            .max()
            .unwrap_or(0);

        MediaPlaylist {
            version: Some(3),
            target_duration,
            end_list: closed,
            segments: self.0.iter().map(|s| s.to_media_segment()).collect(),
            ..Default::default()
        }
    }

    /// Serializes the list, in its current order, as a media playlist.
    pub fn to_m3u8(&self, closed: bool) -> HlsqResult<String> {
        let mut output = Vec::new();
        self.to_playlist(closed).write_to(&mut output)?;
        Ok(String::from_utf8_lossy(&output).into_owned())
    }
}

impl Deref for SegmentList {
    type Target = [Arc<Segment>];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromIterator<Arc<Segment>> for SegmentList {
    fn from_iter<I: IntoIterator<Item = Arc<Segment>>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for SegmentList {
    type Item = Arc<Segment>;
    type IntoIter = std::vec::IntoIter<Arc<Segment>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
