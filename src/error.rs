use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, RecError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Product,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::User => write!(f, "user"),
            EntityKind::Product => write!(f, "product"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RecError {
    #[error("insufficient training data: {rows} usable interactions, {required} required")]
    InsufficientData { rows: usize, required: usize },

    #[error("unknown {kind}: {id}")]
    UnknownEntity { kind: EntityKind, id: Uuid },

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("computation failed: {0}")]
    Computation(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("event transport error: {0}")]
    Event(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RecError {
    pub fn unknown_user(id: Uuid) -> Self {
        RecError::UnknownEntity {
            kind: EntityKind::User,
            id,
        }
    }

    pub fn unknown_product(id: Uuid) -> Self {
        RecError::UnknownEntity {
            kind: EntityKind::Product,
            id,
        }
    }

    /// Cold-start conditions: the caller falls back to another method
    /// instead of failing the request.
    pub fn is_cold_start(&self) -> bool {
        matches!(self, RecError::UnknownEntity { .. })
    }

    /// Advisory failures degrade to direct computation and are never
    /// surfaced to the end caller.
    pub fn is_advisory(&self) -> bool {
        matches!(self, RecError::CacheUnavailable(_))
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, RecError::InvalidRequest(_))
    }
}

impl From<redis::RedisError> for RecError {
    fn from(err: redis::RedisError) -> Self {
        RecError::CacheUnavailable(err.to_string())
    }
}

impl From<rdkafka::error::KafkaError> for RecError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        RecError::Event(err.to_string())
    }
}
