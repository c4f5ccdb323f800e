pub mod config;
pub mod resolver;
pub mod session;

pub use config::{ClientConfig, ClientMode};
pub use resolver::ClientResolver;
pub use session::{ReadinessPolicy, Session};

use crate::backend::Backend;
use crate::core::{RepoError, Result, Row};
use crate::query::{QueryRequest, ReadOnlyRepository, Repository};
use log::{debug, warn};
use std::fmt;
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

struct ClientInner {
    backend: Arc<dyn Backend>,
    mode: ClientMode,
    readiness: ReadinessPolicy,
    retry_readiness: ReadinessPolicy,
}

/// Backend handle plus the session orchestration that guards it.
///
/// In production mode requests go straight to the backend. In test mode every
/// mutating request first waits for a ready session, and a request rejected by
/// a row-level security policy gets exactly one more readiness wait and one
/// retry.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub fn new(backend: Arc<dyn Backend>, config: &ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                backend,
                mode: config.mode,
                readiness: config.readiness,
                retry_readiness: config.retry_readiness,
            }),
        }
    }

    /// Client that executes directly, without session polling or retry.
    pub fn production(backend: Arc<dyn Backend>) -> Self {
        Self::new(backend, &ClientConfig::new().mode(ClientMode::Production))
    }

    /// Client with test-mode orchestration and default budgets.
    pub fn test(backend: Arc<dyn Backend>) -> Self {
        Self::new(backend, &ClientConfig::new().mode(ClientMode::Test))
    }

    pub fn mode(&self) -> ClientMode {
        self.inner.mode
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    pub fn readiness(&self) -> ReadinessPolicy {
        self.inner.readiness
    }

    pub fn retry_readiness(&self) -> ReadinessPolicy {
        self.inner.retry_readiness
    }

    /// Query builder for `table` on this client.
    pub fn from_table(&self, table: impl Into<String>) -> Repository {
        Repository::new(self.clone(), table)
    }

    /// Read-only query builder for a view or other projected source.
    pub fn from_view(&self, source: impl Into<String>) -> ReadOnlyRepository {
        ReadOnlyRepository::new(self.clone(), source)
    }

    /// Polls the backend until it reports a ready session.
    ///
    /// Fails with [`RepoError::SessionNotReady`] once `policy.max_attempts`
    /// polls have been spent. A failing session lookup counts as a not-ready poll.
    pub async fn wait_for_session(&self, policy: &ReadinessPolicy) -> Result<Session> {
        let attempts = policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.inner.backend.current_session().await {
                Ok(Some(session)) if session.is_ready() => {
                    if attempt > 1 {
                        debug!("session ready after {attempt} poll(s)");
                    }
                    return Ok(session);
                }
                Ok(_) => debug!("session not ready (poll {attempt}/{attempts})"),
                Err(err) => debug!("session lookup failed (poll {attempt}/{attempts}): {err}"),
            }

            if attempt < attempts {
                tokio::time::sleep(policy.delay).await;
            }
        }

        Err(RepoError::SessionNotReady { attempts })
    }

    /// Sends a built request to the backend, applying test-mode orchestration.
    pub async fn dispatch(&self, request: QueryRequest) -> Result<Vec<Row>> {
        let span = info_span!(
            "client.dispatch",
            table = %request.table(),
            kind = %request.kind(),
            mode = %self.inner.mode
        );

        async move {
            if !self.inner.mode.is_test() || !request.is_mutation() {
                return self.inner.backend.execute(&request).await;
            }

            self.wait_for_session(&self.inner.readiness).await?;

            match self.inner.backend.execute(&request).await {
                Err(err) if err.is_policy_violation() => {
                    event!(Level::WARN, error = %err, "policy violation, retrying once after session wait");
                    if let Err(wait_err) = self.wait_for_session(&self.inner.retry_readiness).await {
                        warn!("session did not recover before retry: {wait_err}");
                        return Err(err);
                    }
                    self.inner.backend.execute(&request).await
                }
                other => other,
            }
        }
        .instrument(span)
        .await
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("backend", &self.inner.backend.name())
            .field("mode", &self.inner.mode)
            .finish()
    }
}
