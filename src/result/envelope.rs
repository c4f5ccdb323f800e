use crate::core::RepoError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Typed, inspectable failure carried by an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl From<&RepoError> for ErrorInfo {
    fn from(err: &RepoError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.message(),
            details: err.details().map(str::to_string),
        }
    }
}

impl From<RepoError> for ErrorInfo {
    fn from(err: RepoError) -> Self {
        Self::from(&err)
    }
}

/// Uniform result of every public entity operation.
///
/// `data` and `error` are mutually exclusive: a success may carry no data
/// (e.g. a lookup that found nothing), a failure never carries data.
/// Serializes to `{ "data": .., "error": .., "status": "success" | "error" }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope<T> {
    data: Option<T>,
    error: Option<ErrorInfo>,
    status: Status,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            status: Status::Success,
        }
    }

    /// Successful result without a payload (not-found-is-success).
    pub fn empty() -> Self {
        Self {
            data: None,
            error: None,
            status: Status::Success,
        }
    }

    pub fn failure(error: impl Into<ErrorInfo>) -> Self {
        Self {
            data: None,
            error: Some(error.into()),
            status: Status::Error,
        }
    }

    pub fn from_optional(result: crate::core::Result<Option<T>>) -> Self {
        match result {
            Ok(Some(data)) => Self::success(data),
            Ok(None) => Self::empty(),
            Err(err) => Self::failure(err),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == Status::Error
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }

    pub fn into_data(self) -> Option<T> {
        self.data
    }

    /// Splits the envelope into a std `Result` for `?`-style call sites.
    pub fn into_result(self) -> std::result::Result<Option<T>, ErrorInfo> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data),
        }
    }

    pub fn map<U, F>(self, f: F) -> Envelope<U>
    where
        F: FnOnce(T) -> U,
    {
        Envelope {
            data: self.data.map(f),
            error: self.error,
            status: self.status,
        }
    }
}

impl<T> From<crate::core::Result<T>> for Envelope<T> {
    fn from(result: crate::core::Result<T>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(err) => Self::failure(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_and_error_are_exclusive() {
        let ok = Envelope::success(3);
        assert!(ok.is_success());
        assert!(ok.error().is_none());

        let failed: Envelope<i32> = Envelope::failure(RepoError::Validation("bad".into()));
        assert!(failed.is_error());
        assert!(failed.data().is_none());
        assert_eq!(failed.error().map(|e| e.code.as_str()), Some("VALIDATION_ERROR"));
    }

    #[test]
    fn serializes_wire_shape() {
        let empty: Envelope<String> = Envelope::empty();
        assert_eq!(
            serde_json::to_value(&empty).unwrap(),
            json!({ "data": null, "error": null, "status": "success" })
        );

        let failed: Envelope<String> = Envelope::failure(
            ErrorInfo::new("23505", "duplicate key").with_details("Key (name)=(x)"),
        );
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({
                "data": null,
                "error": { "code": "23505", "message": "duplicate key", "details": "Key (name)=(x)" },
                "status": "error"
            })
        );
    }
}
