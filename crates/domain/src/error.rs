/// Shared error type used across all fedifetcher crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("rate limited by {server}")]
    RateLimited { server: String },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("parse: {0}")]
    Parse(String),

    #[error("database: {0}")]
    Database(String),

    #[error("config: {0}")]
    Config(String),

    #[error("lock: {0}")]
    Lock(String),

    #[error("unsupported on this backend: {0}")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
