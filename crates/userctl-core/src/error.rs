//! Error types for directory operations.
//!
//! Every failure surfaced by the session, provisioning and query layers maps onto one variant
//! of [`Error`], so the command surface can print a single diagnostic and exit.

use thiserror::Error;

/// Main error type for userctl operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The transport to the directory server could not be established
    #[error("Connection error: {0}")]
    Connection(String),

    /// The directory rejected the bind credentials
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A search matched nothing, or a referenced entry is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// The entry to be created is already present
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// A precondition of the operation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Malformed operation tag, identifier or other argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The directory server rejected a request
    #[error("Directory error (code {code}): {message}")]
    Directory {
        /// LDAP result code returned by the server (0 when the failure was client side)
        code: u32,
        /// Diagnostic message
        message: String,
    },

    /// The password-modify operation failed, leaving stored password forms untouched
    #[error("Password could not be changed: {0}")]
    PasswordSync(String),

    /// Operation timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Report serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Specialized result type for userctl operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::Auth(_) => "AUTH_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::Directory { .. } => "DIRECTORY_ERROR",
            Self::PasswordSync(_) => "PASSWORD_SYNC_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Returns true if this error points at infrastructure rather than at the request.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::Config(_)
                | Self::Directory { .. }
                | Self::PasswordSync(_)
                | Self::Timeout(_)
        )
    }

    /// Builds a [`Error::Directory`] for a failure detected before reaching the server.
    #[must_use]
    pub fn directory(message: impl Into<String>) -> Self {
        Self::Directory {
            code: 0,
            message: message.into(),
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::Config(format!("invalid directory URL: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::Connection("test".to_string()).error_code(),
            "CONNECTION_ERROR"
        );
        assert_eq!(Error::Auth("test".to_string()).error_code(), "AUTH_ERROR");
        assert_eq!(
            Error::NotFound("test".to_string()).error_code(),
            "NOT_FOUND"
        );
        assert_eq!(
            Error::AlreadyExists("test".to_string()).error_code(),
            "ALREADY_EXISTS"
        );
        assert_eq!(
            Error::Validation("test".to_string()).error_code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            Error::InvalidArgument("test".to_string()).error_code(),
            "INVALID_ARGUMENT"
        );
        assert_eq!(Error::directory("test").error_code(), "DIRECTORY_ERROR");
        assert_eq!(
            Error::PasswordSync("test".to_string()).error_code(),
            "PASSWORD_SYNC_ERROR"
        );
        assert_eq!(Error::Timeout("test".to_string()).error_code(), "TIMEOUT");
        assert_eq!(
            Error::Config("test".to_string()).error_code(),
            "CONFIG_ERROR"
        );
        assert_eq!(
            Error::Serialization("test".to_string()).error_code(),
            "SERIALIZATION_ERROR"
        );
    }

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("uid=alice".to_string());
        assert_eq!(err.to_string(), "Not found: uid=alice");

        let err = Error::Directory {
            code: 50,
            message: "insufficient access".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Directory error (code 50): insufficient access"
        );
    }

    #[test]
    fn test_should_log() {
        assert!(Error::Connection("test".to_string()).should_log());
        assert!(Error::directory("test").should_log());
        assert!(Error::PasswordSync("test".to_string()).should_log());

        assert!(!Error::NotFound("test".to_string()).should_log());
        assert!(!Error::Validation("test".to_string()).should_log());
    }

    #[test]
    fn test_from_url_parse_error() {
        let err = url::Url::parse("not a url").unwrap_err();
        let converted: Error = err.into();
        assert!(matches!(converted, Error::Config(_)));
    }

    #[test]
    fn test_from_serde_json_error() {
        let err = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let converted: Error = err.into();
        assert!(matches!(converted, Error::Serialization(_)));
    }
}
