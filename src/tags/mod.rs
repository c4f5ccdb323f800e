//! Polymorphic tag assignment with a derived entity-type index.

pub mod entity_type;
pub mod model;
pub mod schema;
pub mod service;

pub use entity_type::{EntityType, EntityTypeSet};
pub use model::{EntityTypeTag, IndexReport, NewTag, Tag, TagAssignment, TagPatch};
pub use schema::{ENTITY_TYPE_TAGS_TABLE, TAG_ASSIGNMENTS_TABLE, TAGS_TABLE, table_schemas};
pub use service::TagService;
