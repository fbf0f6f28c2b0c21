//! Error types for the registry service
//!
//! Infrastructure failures travel through `anyhow` via [`RegistryError`];
//! user input problems are [`Rejection`]s whose `Display` output is the exact
//! reply sent back to the user.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for infrastructure failures
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("AMQP connection failed: {message}")]
    AmqpConnectionFailed { message: String },

    #[error("Invalid transport message: {reason}")]
    InvalidMessage { reason: String },

    #[error("Persistence operation '{operation}' failed: {message}")]
    PersistenceFailed { operation: String, message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl RegistryError {
    pub fn persistence(operation: &str, message: impl Into<String>) -> Self {
        RegistryError::PersistenceFailed {
            operation: operation.to_string(),
            message: message.into(),
        }
    }
}

/// Validation failure of a user command, rendered verbatim as the reply
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("-{flag} *flag expects {expected} as second parameter, given non*")]
    MissingFlagOperand {
        flag: &'static str,
        expected: &'static str,
    },

    #[error("{0} *is no valid role*")]
    InvalidSearchRole(String),

    #[error("-sr *flag expects a number between* 0 *and* 5000*, given* {0}")]
    InvalidSearchSr(String),

    #[error("-range *flag expects a number, given* {0}")]
    InvalidRange(String),

    #[error("-delete *and* -notify *are exclusive.\nYou may not use both*")]
    ExclusiveFlags,

    #[error("*Unknown flag:* {0}")]
    UnknownFlag(String),

    #[error("*Expected a number [0-5000]:* {0}")]
    InvalidProfileSr(String),

    #[error("*Unknown role:* {0}")]
    UnknownProfileRole(String),

    #[error("!{command} *expects a value, given non*")]
    MissingProfileValue { command: &'static str },

    #[error("*Unknown command:* {0}")]
    UnknownCommand(String),
}
