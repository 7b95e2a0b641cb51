use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeoError {
    #[error("unsupported geometry encoding")]
    Unsupported,

    #[error("out of memory")]
    Memory,

    #[error("invalid geometry input")]
    Input,

    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),
}

pub type Result<T> = std::result::Result<T, GeoError>;
