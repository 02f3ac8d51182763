use crate::store::StoreError;
use thiserror::Error;
use uuid::Uuid;

pub type LoyaltyResult<T> = Result<T, LoyaltyError>;

/// Errors from sales, manual adjustments, and catalog management.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoyaltyError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("insufficient points: removing {requested}, balance {available}")]
    InsufficientPoints { requested: u64, available: u64 },

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl LoyaltyError {
    pub fn code(&self) -> &'static str {
        match self {
            LoyaltyError::NotFound { .. } => "not_found",
            LoyaltyError::InvalidInput(_) => "invalid_input",
            LoyaltyError::InsufficientPoints { .. } => "insufficient_points",
            LoyaltyError::InvalidTransition(_) => "invalid_transition",
            LoyaltyError::Store(_) => "store_error",
        }
    }
}

impl From<StoreError> for LoyaltyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => LoyaltyError::NotFound { entity, id },
            other => LoyaltyError::Store(other),
        }
    }
}
