use thiserror::Error;

/// Engine failure taxonomy.
///
/// Collaborator traits return `anyhow::Result`; their failures are folded
/// into `Storage` at the boundary. The other variants carry domain meaning
/// and are never downgraded to a default or an empty result.
#[derive(Error, Debug)]
pub enum PalateError {
  #[error("invalid fingerprint: {message}")]
  Validation { message: String },

  #[error("scoring oracle failure: {message}")]
  ScoringOracle { message: String },

  #[error("{what} not found")]
  NotFound { what: String },

  #[error("cannot build a fingerprint without preferences or enjoyed venues")]
  InsufficientData,

  #[error(transparent)]
  Storage(#[from] anyhow::Error),
}

impl PalateError {
  pub fn validation(message: impl Into<String>) -> Self {
    Self::Validation { message: message.into() }
  }

  pub fn oracle(message: impl Into<String>) -> Self {
    Self::ScoringOracle { message: message.into() }
  }

  pub fn not_found(what: impl Into<String>) -> Self {
    Self::NotFound { what: what.into() }
  }
}

pub type Result<T> = std::result::Result<T, PalateError>;
