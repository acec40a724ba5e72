use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("Unicode escape error: {0}")]
    Decode(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, PreviewError>;
