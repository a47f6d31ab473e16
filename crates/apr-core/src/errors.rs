/// Core error type for the relay.
///
/// Pipeline stages never return this: they degrade to a fallback value instead.
/// It surfaces from startup (configuration) and from the messaging port, where
/// the delivery queue logs it and moves on.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
