use thiserror::Error;

#[derive(Error, Debug)]
pub enum HlsqError {
    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error("Invalid m3u8 file: {0}")]
    M3u8ParseError(String),

    #[error("unexpected playlist: {0}")]
    UnexpectedPlaylist(&'static str),

    #[error("no variants selected")]
    NoVariantSelected,

    #[error("consumer error: {0}")]
    ConsumerError(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("task panicked: {0}")]
    TaskPanicked(#[source] tokio::task::JoinError),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),
}

impl HlsqError {
    /// Wraps an arbitrary error raised by a segment consumer.
    pub fn consumer<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::ConsumerError(error.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type HlsqResult<T> = Result<T, HlsqError>;
