//! Selection-tag caching and its invalidation contract.

pub mod invalidator;
pub mod key;
pub mod selection;

pub use invalidator::{CacheInvalidator, InvalidationSink};
pub use key::{CacheKey, SELECTION_TAGS_PREFIX};
pub use selection::SelectionCache;
