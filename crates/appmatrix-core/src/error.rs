use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid entity type: {0}")]
    InvalidEntityType(String),

    #[error("Invalid relationship type: {0}")]
    InvalidRelationshipType(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
