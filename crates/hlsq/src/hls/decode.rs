use m3u8_rs::{MasterPlaylist, MediaPlaylist};

use crate::error::{HlsqError, HlsqResult};

/// A decoded playlist. The kind is decided here once and matched on by
/// everything downstream.
#[derive(Debug, Clone)]
pub enum Playlist {
    Master(MasterPlaylist),
    Media(MediaPlaylist),
}

impl Playlist {
    pub fn kind(&self) -> &'static str {
        match self {
            Playlist::Master(_) => "master playlist",
            Playlist::Media(_) => "media playlist",
        }
    }
}

pub fn decode(body: &[u8]) -> HlsqResult<Playlist> {
    let body = strip_blank_lines(body);
    match m3u8_rs::parse_playlist_res(&body) {
        Ok(m3u8_rs::Playlist::MasterPlaylist(pl)) => Ok(Playlist::Master(pl)),
        Ok(m3u8_rs::Playlist::MediaPlaylist(pl)) => Ok(Playlist::Media(pl)),
        Err(e) => Err(HlsqError::M3u8ParseError(e.to_string())),
    }
}

// RFC 8216 says blank lines are ignored, but the parser treats them as
// segment boundaries. Drop them before decoding.
fn strip_blank_lines(body: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(body.len());
    for line in body.split(|b| *b == b'\n') {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        result.extend_from_slice(line);
        result.push(b'\n');
    }
    result
}
