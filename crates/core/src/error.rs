use thiserror::Error;

pub type OmnilyResult<T> = Result<T, OmnilyError>;

#[derive(Error, Debug)]
pub enum OmnilyError {
    #[error("Configuration error: {0}")]
    Config(String),
}
