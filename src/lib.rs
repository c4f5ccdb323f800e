// ============================================================================
// entitykit Library
// ============================================================================

//! Generic entity data access with polymorphic tag assignment.
//!
//! ```
//! use entitykit::{Client, EntityConfig, EntityOperations, InMemoryBackend, TableSchema};
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Event {
//!     #[serde(skip_serializing_if = "Option::is_none")]
//!     id: Option<String>,
//!     name: String,
//! }
//!
//! # tokio_test::block_on(async {
//! let backend = Arc::new(InMemoryBackend::with_tables([TableSchema::new("events")]));
//! let events: EntityOperations<Event> =
//!     EntityOperations::new(Client::production(backend), EntityConfig::new("events"));
//!
//! let created = events.create(&Event { id: None, name: "Meetup".into() }).await;
//! let id = created.into_data().and_then(|event| event.id).unwrap();
//! assert!(events.get_by_id(id).await.is_success());
//! # });
//! ```

pub mod backend;
pub mod cache;
pub mod client;
pub mod core;
pub mod factory;
pub mod query;
pub mod result;
pub mod tags;

// Re-export main types for convenience
pub use backend::{Backend, BackendSnapshot, BackendStats, Fault, InMemoryBackend, TableSchema};
pub use cache::{CacheInvalidator, CacheKey, InvalidationSink, SelectionCache};
pub use client::{Client, ClientConfig, ClientMode, ClientResolver, ReadinessPolicy, Session};
pub use core::{RepoError, Result, Row};
pub use factory::{
    BatchOutcome, BatchUpdateItem, BatchUpdateMode, EntityConfig, EntityOperations, ListParams,
    RepositorySource, ViewConfig, ViewOperations, create_entity_operations,
    create_view_operations,
};
pub use query::{Filter, Projection, ReadOnlyRepository, Repository, SortDirection};
pub use result::{Envelope, ErrorInfo, Status};
pub use tags::{EntityType, EntityTypeSet, NewTag, Tag, TagAssignment, TagPatch, TagService};
