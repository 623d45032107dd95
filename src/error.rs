//! Error types shared by the library.

use thiserror::Error;

/// A cache read or write that did not go through. Never fatal to a session.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// A failure of the external text-generation service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("API key not found")]
    MissingCredential,

    #[error("A request for {0} is already in progress")]
    Busy(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    Unexpected(String),
}

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid data URL: {0}")]
    DataUrl(String),

    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Embedded image error: {0}")]
    Image(#[from] SignatureError),

    #[error("typst is not installed")]
    TypstMissing,

    #[error("typst compile failed: {0}")]
    Compile(String),
}
