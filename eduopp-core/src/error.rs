use thiserror::Error;

/// Domain error surfaced by the service layer. Channel delivery failures are
/// never represented here: they are flattened to a boolean at the channel
/// boundary and must not propagate through the dispatcher's fan-out loop.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
