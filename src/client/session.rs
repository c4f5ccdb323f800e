use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Authenticated session as reported by a backend handle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Session {
    /// Subject identity (user id) the session belongs to.
    pub subject: Option<String>,
    pub access_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(subject: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            access_token: Some(access_token.into()),
            expires_at: None,
        }
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// A session is usable once it has a subject, an access token, and has not expired.
    pub fn is_ready(&self) -> bool {
        let has_subject = self.subject.as_deref().is_some_and(|s| !s.is_empty());
        let has_token = self.access_token.as_deref().is_some_and(|t| !t.is_empty());
        let live = self.expires_at.is_none_or(|at| at > Utc::now());
        has_subject && has_token && live
    }
}

/// Polling budget for session readiness checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub max_attempts: u32,
    /// Fixed delay between consecutive polls.
    pub delay: Duration,
}

impl ReadinessPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Shorter budget used for the single wait after an authorization race.
    pub fn retry_default() -> Self {
        Self::new(3, Duration::from_millis(50))
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn readiness_requires_subject_and_token() {
        assert!(Session::new("user-1", "token").is_ready());
        assert!(!Session::default().is_ready());
        assert!(
            !Session {
                subject: Some("user-1".into()),
                access_token: Some(String::new()),
                expires_at: None,
            }
            .is_ready()
        );
    }

    #[test]
    fn expired_session_is_not_ready() {
        let expired = Session::new("user-1", "token").expires_at(Utc::now() - ChronoDuration::seconds(5));
        assert!(!expired.is_ready());
    }

    #[test]
    fn policy_never_allows_zero_attempts() {
        assert_eq!(ReadinessPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
