use crate::core::{RepoError, Result, Row, into_row};
use crate::query::Projection;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

pub type ResponseTransform<T> = Arc<dyn Fn(Row) -> Result<T> + Send + Sync>;
pub type RequestTransform<I> = Arc<dyn Fn(&I) -> Result<Row> + Send + Sync>;

fn serde_response<T: DeserializeOwned>(row: Row) -> Result<T> {
    Ok(serde_json::from_value(serde_json::Value::Object(row))?)
}

fn serde_request<I: Serialize>(input: &I) -> Result<Row> {
    into_row(serde_json::to_value(input)?)
}

/// Describes one storage table and how its rows map to domain values.
///
/// `T` is the domain type read back, `C` the create payload and `U` the
/// update payload. The configuration is frozen once handed to
/// [`EntityOperations`](super::EntityOperations).
pub struct EntityConfig<T, C = T, U = C> {
    pub table: String,

    /// Primary key column
    pub id_field: String,

    /// Projection used for reads and for re-selecting written rows
    pub default_select: Projection,

    /// Sort column when the caller gives none
    pub default_order_by: String,

    /// Delete by stamping `deleted_at` instead of removing the row
    pub soft_delete: bool,

    transform_response: ResponseTransform<T>,
    transform_create: RequestTransform<C>,
    transform_update: RequestTransform<U>,
}

impl<T, C, U> EntityConfig<T, C, U>
where
    T: DeserializeOwned + 'static,
    C: Serialize + 'static,
    U: Serialize + 'static,
{
    /// Configuration with serde-based transforms and conventional defaults
    /// (`id`, `*`, `created_at`, hard delete).
    pub fn new(table: impl Into<String>) -> Self {
        Self::with_transforms(
            table,
            serde_response::<T>,
            serde_request::<C>,
            serde_request::<U>,
        )
    }
}

impl<T, C, U> EntityConfig<T, C, U> {
    /// Configuration with explicit transforms, for types without serde support.
    pub fn with_transforms<R, Q, P>(table: impl Into<String>, response: R, create: Q, update: P) -> Self
    where
        R: Fn(Row) -> Result<T> + Send + Sync + 'static,
        Q: Fn(&C) -> Result<Row> + Send + Sync + 'static,
        P: Fn(&U) -> Result<Row> + Send + Sync + 'static,
    {
        Self {
            table: table.into(),
            id_field: "id".to_string(),
            default_select: Projection::All,
            default_order_by: "created_at".to_string(),
            soft_delete: false,
            transform_response: Arc::new(response),
            transform_create: Arc::new(create),
            transform_update: Arc::new(update),
        }
    }

    /// Set the primary key column
    pub fn id_field(mut self, column: impl Into<String>) -> Self {
        self.id_field = column.into();
        self
    }

    /// Set the default projection
    pub fn default_select(mut self, projection: impl Into<Projection>) -> Self {
        self.default_select = projection.into();
        self
    }

    /// Set the default sort column
    pub fn default_order_by(mut self, column: impl Into<String>) -> Self {
        self.default_order_by = column.into();
        self
    }

    /// Enable or disable soft delete
    pub fn soft_delete(mut self, enabled: bool) -> Self {
        self.soft_delete = enabled;
        self
    }

    pub fn transform_response<F>(mut self, transform: F) -> Self
    where
        F: Fn(Row) -> Result<T> + Send + Sync + 'static,
    {
        self.transform_response = Arc::new(transform);
        self
    }

    pub fn transform_create<F>(mut self, transform: F) -> Self
    where
        F: Fn(&C) -> Result<Row> + Send + Sync + 'static,
    {
        self.transform_create = Arc::new(transform);
        self
    }

    pub fn transform_update<F>(mut self, transform: F) -> Self
    where
        F: Fn(&U) -> Result<Row> + Send + Sync + 'static,
    {
        self.transform_update = Arc::new(transform);
        self
    }

    pub(crate) fn to_domain(&self, row: Row) -> Result<T> {
        (self.transform_response)(row)
    }

    pub(crate) fn to_domain_all(&self, rows: Vec<Row>) -> Result<Vec<T>> {
        rows.into_iter().map(|row| self.to_domain(row)).collect()
    }

    pub(crate) fn create_row(&self, input: &C) -> Result<Row> {
        (self.transform_create)(input)
    }

    pub(crate) fn update_row(&self, input: &U) -> Result<Row> {
        let row = (self.transform_update)(input)?;
        if row.is_empty() {
            return Err(RepoError::Validation(format!(
                "update for '{}' has no columns to change",
                self.table
            )));
        }
        Ok(row)
    }
}

impl<T, C, U> fmt::Debug for EntityConfig<T, C, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityConfig")
            .field("table", &self.table)
            .field("id_field", &self.id_field)
            .field("default_select", &self.default_select)
            .field("default_order_by", &self.default_order_by)
            .field("soft_delete", &self.soft_delete)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::row_from;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Person {
        id: Option<String>,
        name: String,
    }

    #[derive(Serialize)]
    struct PersonPatch {
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    }

    #[test]
    fn serde_transforms_round_trip() {
        let config: EntityConfig<Person, Person, PersonPatch> = EntityConfig::new("people");
        let row = config
            .create_row(&Person {
                id: None,
                name: "Ada".into(),
            })
            .unwrap();
        assert_eq!(row.get("name"), Some(&json!("Ada")));

        let person = config
            .to_domain(row_from([("id", json!("p1")), ("name", json!("Ada"))]))
            .unwrap();
        assert_eq!(person.id.as_deref(), Some("p1"));
    }

    #[test]
    fn empty_patch_is_rejected() {
        let config: EntityConfig<Person, Person, PersonPatch> = EntityConfig::new("people");
        let err = config.update_row(&PersonPatch { name: None }).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn custom_response_transform_wins() {
        let config: EntityConfig<String, Person, PersonPatch> = EntityConfig::new("people")
            .transform_response(|row| {
                row.get("name")
                    .and_then(|v| v.as_str())
                    .map(str::to_uppercase)
                    .ok_or_else(|| RepoError::Transform("missing name".into()))
            });
        let name = config
            .to_domain(row_from([("name", json!("ada"))]))
            .unwrap();
        assert_eq!(name, "ADA");
    }
}
