pub mod memory;

pub use memory::{BackendSnapshot, BackendStats, Fault, InMemoryBackend, TableSchema};

use crate::client::Session;
use crate::core::{Result, Row};
use crate::query::QueryRequest;
use async_trait::async_trait;

/// Storage boundary: the only capability the data-access layer needs from a
/// relational backend.
///
/// Implementations must be safe for concurrent use by independent calls. A
/// failed request should be reported through [`crate::RepoError::from_backend`]
/// so row-level security rejections are recognisable.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Executes one request and returns the affected rows (see [`QueryRequest`]).
    async fn execute(&self, request: &QueryRequest) -> Result<Vec<Row>>;

    /// Session currently attached to this handle, if any.
    async fn current_session(&self) -> Result<Option<Session>>;
}
