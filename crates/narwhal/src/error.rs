#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("layout engine is no longer running")]
    EngineStopped,
    #[error("failed to spawn the layout worker thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("invalid engine configuration: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
