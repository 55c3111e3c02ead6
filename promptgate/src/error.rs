// promptgate/src/error.rs

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("embedding backend error: {0}")]
    Embedding(String),

    #[error("llm judge error: {0}")]
    Judge(String),

    #[error("baseline corpus error: {0}")]
    Baseline(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
