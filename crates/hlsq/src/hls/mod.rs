mod decode;
pub mod filter;
pub(crate) mod pilot;
pub mod segment;
mod variant;

pub use decode::{decode, Playlist};
pub use variant::select_variants;

/// One rendition listed by a master playlist.
pub type Variant = m3u8_rs::VariantStream;
