use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AutoIsfError {
    #[error("non-finite value computed for {0}")]
    NonFinite(&'static str),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("replay cancelled")]
    Cancelled,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing glucose status")]
    MissingGlucose,
    #[error("missing profile")]
    MissingProfile,
    #[error("missing IOB timeline")]
    MissingIob,
    #[error("IOB timeline is empty")]
    EmptyIob,
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
