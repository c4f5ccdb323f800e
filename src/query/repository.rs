use super::builder::{DeleteQuery, InsertQuery, SelectQuery, Unfiltered, UpdateQuery};
use super::filter::Projection;
use super::request::OnConflict;
use crate::client::Client;
use crate::core::Row;

/// Query-builder entry point bound to one table.
///
/// A repository holds no result data. It is cheap to clone and safe to share
/// between operations, because every builder it hands out owns its own state.
#[derive(Clone)]
pub struct Repository {
    client: Client,
    table: String,
}

impl Repository {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Same table, different backend handle. The chaining surface is unchanged.
    pub fn with_client(&self, client: Client) -> Self {
        Self {
            client,
            table: self.table.clone(),
        }
    }

    /// Same backend handle, different table.
    pub fn for_table(&self, table: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            table: table.into(),
        }
    }

    pub fn select(&self, projection: impl Into<Projection>) -> SelectQuery {
        SelectQuery::new(self.client.clone(), self.table.clone(), projection.into())
    }

    pub fn insert(&self, rows: Vec<Row>) -> InsertQuery {
        InsertQuery::new(self.client.clone(), self.table.clone(), rows)
    }

    /// Insert that silently skips rows conflicting on `on_conflict`.
    pub fn upsert(&self, rows: Vec<Row>, on_conflict: &[&str]) -> InsertQuery {
        self.insert(rows).on_conflict(OnConflict {
            columns: on_conflict.iter().map(|column| column.to_string()).collect(),
            ignore_duplicates: true,
        })
    }

    /// Insert that merges conflicting rows into the existing row.
    pub fn upsert_merge(&self, rows: Vec<Row>, on_conflict: &[&str]) -> InsertQuery {
        self.insert(rows).on_conflict(OnConflict {
            columns: on_conflict.iter().map(|column| column.to_string()).collect(),
            ignore_duplicates: false,
        })
    }

    pub fn update(&self, patch: Row) -> UpdateQuery<Unfiltered> {
        UpdateQuery::new(self.client.clone(), self.table.clone(), patch)
    }

    pub fn delete(&self) -> DeleteQuery<Unfiltered> {
        DeleteQuery::new(self.client.clone(), self.table.clone())
    }

    pub fn read_only(&self) -> ReadOnlyRepository {
        ReadOnlyRepository {
            inner: self.clone(),
        }
    }
}

/// Repository over a read-only data source such as a join-backed view.
///
/// Only `select` is exposed; writes cannot be expressed through this type.
#[derive(Clone)]
pub struct ReadOnlyRepository {
    inner: Repository,
}

impl ReadOnlyRepository {
    pub fn new(client: Client, source: impl Into<String>) -> Self {
        Self {
            inner: Repository::new(client, source),
        }
    }

    pub fn source(&self) -> &str {
        self.inner.table()
    }

    pub fn client(&self) -> &Client {
        self.inner.client()
    }

    pub fn with_client(&self, client: Client) -> Self {
        Self {
            inner: self.inner.with_client(client),
        }
    }

    pub fn for_source(&self, source: impl Into<String>) -> Self {
        Self {
            inner: self.inner.for_table(source),
        }
    }

    pub fn select(&self, projection: impl Into<Projection>) -> SelectQuery {
        self.inner.select(projection)
    }
}

impl From<Repository> for ReadOnlyRepository {
    fn from(repository: Repository) -> Self {
        repository.read_only()
    }
}
