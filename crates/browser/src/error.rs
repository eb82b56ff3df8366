//! Error types for resource loading and frame pipelines

use thiserror::Error;
use url::Url;

pub type Result<T> = std::result::Result<T, LoadError>;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Status {status} from {url} does not produce a document")]
    Status { status: u16, url: Url },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Load cancelled")]
    Cancelled,

    #[error("Document body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("Document construction failed: {0}")]
    Parse(#[from] dom::DomError),

    #[error("Parser worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

#[derive(Error, Debug)]
pub enum FrameLoadError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Frame has no owner document or resource loader")]
    Unavailable,
}
