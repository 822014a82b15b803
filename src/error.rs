use thiserror::Error;

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Failures talking to the upstream API.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("{url} {status} {content_type} {body:?}")]
    Api {
        url: String,
        status: u16,
        content_type: String,
        body: String,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Auth error: {0}")]
    Auth(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(err.to_string())
    }
}
