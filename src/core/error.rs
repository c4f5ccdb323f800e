use thiserror::Error;

/// Postgres error code for an insufficient-privilege / row-level security rejection.
pub const POLICY_VIOLATION_CODE: &str = "42501";
/// Postgres error code for a unique constraint violation.
pub const UNIQUE_VIOLATION_CODE: &str = "23505";
/// Postgres error code for an undefined table.
pub const UNDEFINED_TABLE_CODE: &str = "42P01";
/// Error code used when a single-row request matched zero or many rows.
pub const NOT_SINGLE_CODE: &str = "PGRST116";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid entity type '{0}'")]
    InvalidEntityType(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Constraint violation: {message}")]
    ConstraintViolation { code: String, message: String },

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Session not ready after {attempts} attempt(s)")]
    SessionNotReady { attempts: u32 },

    #[error("Expected a single row, query returned {0}")]
    NotSingle(usize),

    #[error("Backend error [{code}]: {message}")]
    Backend {
        code: String,
        message: String,
        details: Option<String>,
    },

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, RepoError>;

impl RepoError {
    /// Classifies a raw failure reported by a storage backend.
    ///
    /// Row-level security rejections become [`RepoError::PolicyViolation`] so the
    /// client can recognise an authorization race; unique violations become
    /// [`RepoError::ConstraintViolation`]. Everything else is kept verbatim.
    pub fn from_backend(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Option<String>,
    ) -> Self {
        let code = code.into();
        let message = message.into();
        let lower = message.to_lowercase();

        if code == POLICY_VIOLATION_CODE
            || lower.contains("row-level security")
            || (lower.contains("violates") && lower.contains("policy"))
        {
            return Self::PolicyViolation(message);
        }

        if code == UNIQUE_VIOLATION_CODE || lower.contains("duplicate key") {
            return Self::ConstraintViolation {
                code: UNIQUE_VIOLATION_CODE.to_string(),
                message,
            };
        }

        Self::Backend {
            code,
            message,
            details,
        }
    }

    /// Stable machine-readable code surfaced through the result envelope.
    pub fn code(&self) -> &str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidEntityType(_) => "INVALID_ENTITY_TYPE",
            Self::TableNotFound(_) => UNDEFINED_TABLE_CODE,
            Self::ConstraintViolation { code, .. } => code,
            Self::PolicyViolation(_) => POLICY_VIOLATION_CODE,
            Self::SessionNotReady { .. } => "SESSION_NOT_READY",
            Self::NotSingle(_) => NOT_SINGLE_CODE,
            Self::Backend { code, .. } => code,
            Self::Transform(_) => "TRANSFORM_ERROR",
            Self::LockError(_) => "LOCK_ERROR",
        }
    }

    /// Human-readable message without the variant prefix.
    ///
    /// Backend-originated errors keep the backend's own message untouched.
    pub fn message(&self) -> String {
        match self {
            Self::ConstraintViolation { message, .. } | Self::Backend { message, .. } => {
                message.clone()
            }
            Self::PolicyViolation(message) => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn details(&self) -> Option<&str> {
        match self {
            Self::Backend { details, .. } => details.as_deref(),
            _ => None,
        }
    }

    /// True for the authorization-race error class that triggers a session retry.
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, Self::PolicyViolation(_))
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { code, .. } if code == UNIQUE_VIOLATION_CODE)
    }

    /// Validation failures are raised before any request leaves the process.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidEntityType(_))
    }
}

impl<T> From<std::sync::PoisonError<T>> for RepoError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(err: serde_json::Error) -> Self {
        Self::Transform(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_row_level_security_message() {
        let err = RepoError::from_backend(
            "PGRST301",
            "new row violates row-level security policy for table \"tags\"",
            None,
        );
        assert!(err.is_policy_violation());
        assert_eq!(err.code(), POLICY_VIOLATION_CODE);
    }

    #[test]
    fn classifies_policy_code() {
        let err = RepoError::from_backend(POLICY_VIOLATION_CODE, "permission denied", None);
        assert!(err.is_policy_violation());
    }

    #[test]
    fn classifies_duplicate_key() {
        let err = RepoError::from_backend(
            "XX000",
            "duplicate key value violates unique constraint \"tags_name_key\"",
            None,
        );
        assert!(err.is_unique_violation());
        assert_eq!(err.code(), UNIQUE_VIOLATION_CODE);
    }

    #[test]
    fn keeps_unknown_backend_errors_verbatim() {
        let err = RepoError::from_backend("22P02", "invalid input syntax", Some("col id".into()));
        assert_eq!(err.code(), "22P02");
        assert_eq!(err.message(), "invalid input syntax");
        assert_eq!(err.details(), Some("col id"));
        assert!(!err.is_policy_violation());
    }
}
