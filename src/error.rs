use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong between the upstream leaderboard and the store.
#[derive(Debug, Error)]
pub enum Error {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("{url} answered HTTP {status}")]
    Http { url: String, status: u16 },

    #[error("malformed leaderboard document: {0}")]
    Parse(String),

    #[error("storage failure: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("[{mode}] initialization failed")]
    Initialize {
        mode: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    pub fn storage(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Storage(err.into())
    }

    /// Network-level failures are worth another attempt; nothing else is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport { .. } | Error::Http { .. })
    }

    /// Errors that must stop the process rather than skip a region.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Initialize { .. })
    }
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Error::Storage(Box::new(err))
    }
}
