use crate::backend::TableSchema;

pub const TAGS_TABLE: &str = "tags";
pub const TAG_ASSIGNMENTS_TABLE: &str = "tag_assignments";
pub const ENTITY_TYPE_TAGS_TABLE: &str = "entity_type_tags";

/// Tables the tag subsystem expects, with their unique constraints.
pub fn table_schemas() -> Vec<TableSchema> {
    vec![
        TableSchema::new(TAGS_TABLE).unique(&["name"]),
        TableSchema::new(TAG_ASSIGNMENTS_TABLE).unique(&["tag_id", "target_id", "target_type"]),
        TableSchema::new(ENTITY_TYPE_TAGS_TABLE)
            .unique(&["tag_id", "entity_type"])
            .without_timestamps(),
    ]
}
