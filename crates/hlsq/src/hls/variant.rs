use url::Url;

use super::{Playlist, Variant};
use crate::error::{HlsqError, HlsqResult};

/// Resolves the media playlists to follow.
///
/// A media playlist stands for itself. For a master playlist the variants are
/// passed to `filter` in listed order and the chosen ones are resolved against
/// `base`, keeping the order `filter` returned.
pub fn select_variants<F>(base: &Url, playlist: Playlist, filter: F) -> HlsqResult<Vec<Url>>
where
    F: FnOnce(Vec<Variant>) -> Vec<Variant>,
{
    let master = match playlist {
        Playlist::Media(_) => {
            log::debug!("Media playlist was given directly, using it as the only variant.");
            return Ok(vec![base.clone()]);
        }
        Playlist::Master(master) => master,
    };

    for variant in master.variants.iter() {
        log::debug!(
            "Variant found: {uri}; Bandwidth: {bandwidth}",
            uri = variant.uri,
            bandwidth = variant.bandwidth
        );
    }

    let selected = filter(master.variants);
    if selected.is_empty() {
        return Err(HlsqError::NoVariantSelected);
    }

    selected
        .iter()
        .map(|variant| Ok(base.join(&variant.uri)?))
        .collect()
}
