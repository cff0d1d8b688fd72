/// Core error type.
///
/// Adapter crates map their specific errors into this type so the worker
/// runtime can tell apart the few kinds it reacts to (auth failure, closed
/// event stream, format rejection) from everything else, which is only logged.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    /// The platform refused the bot token (or could not confirm it) at startup.
    #[error("auth error: {0}")]
    Auth(String),

    /// The inbound event stream of a worker ended.
    #[error("event stream closed")]
    StreamClosed,

    /// The platform could not parse the strict-dialect markup of a send.
    #[error("format rejected: {0}")]
    FormatRejected(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid object key: {key}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn is_format_rejection(&self) -> bool {
        matches!(self, Error::FormatRejected(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
