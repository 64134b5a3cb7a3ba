//! ┌──────────────┐  variants   ┌─────────┐  new segments  ┌─────────────────┐
//! │              ├─────────────► Pilot 1 ├────────────────► Receive (task)  │
//! │   Session    │             └─────────┘                └─────────────────┘
//! │  (master /   │             ┌─────────┐                ┌─────────────────┐
//! │   media)     ├─────────────► Pilot N ├────────────────► Receive (task)  │
//! └──────────────┘             └─────────┘                └─────────────────┘
//!
//! Each pilot polls one media playlist, keeps the identifiers of every
//! segment it has seen and spawns one consumer call per new segment.

pub mod capture;
pub mod consumer;
pub mod error;
pub mod fetch;
pub mod hls;
pub mod session;
mod util;

pub use capture::{DebugCapture, DirCapture};
pub use consumer::{SegmentCollector, SegmentConsumer};
pub use error::{HlsqError, HlsqResult};
pub use fetch::RetryPolicy;
pub use hls::{
    filter,
    segment::{Segment, SegmentList},
    Variant,
};
pub use m3u8_rs;
pub use session::{play, Session, SessionBuilder};
pub use tokio_util::sync::CancellationToken;
pub use util::http::HttpClient;
