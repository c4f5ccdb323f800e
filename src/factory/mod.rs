//! Generic entity operations built from a table configuration.

pub mod batch;
pub mod config;
pub mod operations;
pub mod params;
pub mod source;
pub mod view;

pub use batch::{BatchFailure, BatchOutcome, BatchUpdateItem, BatchUpdateMode};
pub use config::{EntityConfig, RequestTransform, ResponseTransform};
pub use operations::{DELETED_AT, EntityOperations, UPDATED_AT};
pub use params::{ListParams, SEARCH_FIELD, contains_pattern, escape_like};
pub use source::{RepositoryFactory, RepositorySource};
pub use view::{ViewConfig, ViewOperations};

/// Builds the full operation set for one entity table.
pub fn create_entity_operations<T, C, U>(
    source: impl Into<RepositorySource>,
    config: EntityConfig<T, C, U>,
) -> EntityOperations<T, C, U> {
    EntityOperations::new(source, config)
}

/// Builds read-only operations for a view.
pub fn create_view_operations<T>(
    source: impl Into<RepositorySource>,
    config: ViewConfig<T>,
) -> ViewOperations<T> {
    ViewOperations::new(source, config)
}
