/// Core error type for the engine and the message-record boundary.
///
/// Engine failures (`InvalidSearchTerm`, `EncodingMismatch`) and codec
/// failures (`UnsupportedSpanKind`, `MalformedSpan`) are typed so callers can
/// decide per message whether to skip, drop a span, or retry with other terms.
/// Zero matches is not an error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("search term must not be empty")]
    InvalidSearchTerm,

    #[error("unsupported span kind: {0}")]
    UnsupportedSpanKind(String),

    #[error("malformed span: {0}")]
    MalformedSpan(String),

    #[error("boundary at UTF-16 offset {offset} splits a surrogate pair")]
    EncodingMismatch { offset: usize },

    #[error("message not found: {0}")]
    MessageNotFound(i64),

    #[error("channel not found in archive: {0}")]
    ChannelNotFound(String),

    #[error("no channel selected and the archive has no active or single channel")]
    NoChannelSelected,

    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
