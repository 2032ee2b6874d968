//! Error types, one enum per concern.

use std::time::Duration;

/// Bad or missing environment configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {0} must be set")]
    MissingEnvVar(String),

    #[error("{key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Store failures. Messages carry the operation name.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("database unavailable: {0}")]
    Pool(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("stored record is malformed: {0}")]
    Serialization(String),
}

/// Chat-completion backend failures.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("{provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("{provider} returned an unexpected response: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("{provider} did not answer within {timeout:?}")]
    Timeout { provider: String, timeout: Duration },
}

/// Identity provider errors.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Identity provider request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response from identity provider: {0}")]
    InvalidResponse(String),
}

/// Itinerary e-mail errors.
#[derive(Debug, thiserror::Error)]
pub enum MailerError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("SMTP send failed: {0}")]
    Send(String),
}

/// Failures surfaced by the questionnaire flow.
///
/// Every variant is recoverable: the draft and the current step are left
/// untouched when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuestionnaireError {
    #[error("Please complete all required fields before continuing")]
    ValidationIncomplete { step: u8 },

    #[error("Please sign in to save your preferences.")]
    NotAuthenticated,

    #[error("Failed to save preferences: {0}")]
    PersistenceFailure(String),

    #[error("Failed to generate recommendations: {0}")]
    GenerationFailure(String),

    #[error("A submission is already in progress")]
    SubmissionInFlight,

    #[error("This questionnaire has already been submitted")]
    AlreadySubmitted,
}
