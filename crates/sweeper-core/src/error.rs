use thiserror::Error;

#[derive(Debug, Error)]
pub enum SweeperError {
    /// The config file or an env override could not be parsed or validated.
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SweeperError>;
