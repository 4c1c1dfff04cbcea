use thiserror::Error;

#[derive(Error, Debug)]
pub enum NasaError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("NASA API returned an invalid response, may be down temporarily: {0}")]
    UpstreamInvalid(String),
    #[error("Configuration error: {0}")]
    ConfigInvalid(String),
    #[error("Wallpaper error: {0}")]
    SinkFailure(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl NasaError {
    /// Whether trying the same operation again can succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, NasaError::ConfigInvalid(_) | NasaError::InvalidInput(_))
    }
}

impl From<serde_json::Error> for NasaError {
    fn from(e: serde_json::Error) -> Self {
        NasaError::Parse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NasaError>;
