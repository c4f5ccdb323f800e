//! Typestate request builders.
//!
//! Every builder method consumes its stage and returns the next one, so a
//! stage can only be branched from by cloning it first; nothing is mutated
//! behind a shared reference. Updates and deletes start out [`Unfiltered`] and
//! only become executable once a filter moves them to [`Filtered`], which rules
//! out whole-table writes at compile time.

use super::filter::{Filter, OrderBy, Projection, Range, SortDirection};
use super::request::{
    DeleteRequest, InsertRequest, OnConflict, QueryRequest, SelectRequest, UpdateRequest,
};
use crate::client::Client;
use crate::core::{RepoError, Result, Row};
use serde_json::Value;
use std::marker::PhantomData;

/// Marker: no filter applied yet.
#[derive(Debug, Clone, Copy)]
pub struct Unfiltered;

/// Marker: at least one filter applied.
#[derive(Debug, Clone, Copy)]
pub struct Filtered;

fn expect_single(rows: Vec<Row>) -> Result<Row> {
    let count = rows.len();
    let mut rows = rows.into_iter();
    match (rows.next(), count) {
        (Some(row), 1) => Ok(row),
        _ => Err(RepoError::NotSingle(count)),
    }
}

fn expect_maybe_single(rows: Vec<Row>) -> Result<Option<Row>> {
    match rows.len() {
        0 => Ok(None),
        1 => Ok(rows.into_iter().next()),
        count => Err(RepoError::NotSingle(count)),
    }
}

#[derive(Clone)]
pub struct SelectQuery {
    client: Client,
    request: SelectRequest,
}

impl SelectQuery {
    pub(crate) fn new(client: Client, table: String, projection: Projection) -> Self {
        Self {
            client,
            request: SelectRequest {
                table,
                projection,
                filters: Vec::new(),
                order: Vec::new(),
                range: None,
            },
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.request.filters.push(filter);
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(column, value))
    }

    pub fn in_<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.filter(Filter::in_list(column, values))
    }

    pub fn ilike(self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.filter(Filter::ilike(column, pattern))
    }

    /// Matches rows where any of `columns` is LIKE `pattern`, ignoring case.
    pub fn or_ilike<I, C>(self, columns: I, pattern: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.filter(Filter::AnyILike {
            columns: columns.into_iter().map(Into::into).collect(),
            pattern: pattern.into(),
        })
    }

    pub fn is_null(self, column: impl Into<String>) -> Self {
        self.filter(Filter::is_null(column))
    }

    /// Adds a sort key. Keys apply in the order they were added.
    pub fn order(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.request.order.push(OrderBy::new(column, direction));
        self
    }

    /// Restricts the result to the inclusive window `[from, to]`; nothing is
    /// returned when `to < from`.
    pub fn range(mut self, from: usize, to: usize) -> Self {
        self.request.range = Some(Range::new(from, to));
        self
    }

    /// Caps the result at `count` rows, keeping any window start already set.
    pub fn limit(mut self, count: usize) -> Self {
        let from = self.request.range.map(|range| range.from).unwrap_or(0);
        self.request.range = Some(Range::starting_at(from, count));
        self
    }

    pub fn request(&self) -> &SelectRequest {
        &self.request
    }

    pub fn into_request(self) -> QueryRequest {
        QueryRequest::Select(self.request)
    }

    /// Runs the query and returns every matching row.
    pub async fn execute(self) -> Result<Vec<Row>> {
        self.client.dispatch(QueryRequest::Select(self.request)).await
    }

    /// Runs the query and requires exactly one row.
    pub async fn single(self) -> Result<Row> {
        expect_single(self.execute().await?)
    }

    /// Runs the query and returns `None` when no row matched.
    ///
    /// Zero rows is not an error; more than one row is.
    pub async fn maybe_single(self) -> Result<Option<Row>> {
        expect_maybe_single(self.execute().await?)
    }
}

/// Write whose affected rows are projected back to the caller.
#[derive(Clone)]
pub struct Returning {
    client: Client,
    request: QueryRequest,
}

impl Returning {
    pub fn request(&self) -> &QueryRequest {
        &self.request
    }

    pub async fn execute(self) -> Result<Vec<Row>> {
        self.client.dispatch(self.request).await
    }

    pub async fn single(self) -> Result<Row> {
        expect_single(self.execute().await?)
    }

    pub async fn maybe_single(self) -> Result<Option<Row>> {
        expect_maybe_single(self.execute().await?)
    }
}

#[derive(Clone)]
pub struct InsertQuery {
    client: Client,
    request: InsertRequest,
}

impl InsertQuery {
    pub(crate) fn new(client: Client, table: String, rows: Vec<Row>) -> Self {
        Self {
            client,
            request: InsertRequest {
                table,
                rows,
                on_conflict: None,
                returning: None,
            },
        }
    }

    pub(crate) fn on_conflict(mut self, on_conflict: OnConflict) -> Self {
        self.request.on_conflict = Some(on_conflict);
        self
    }

    pub fn select(mut self, projection: impl Into<Projection>) -> Returning {
        self.request.returning = Some(projection.into());
        Returning {
            client: self.client,
            request: QueryRequest::Insert(self.request),
        }
    }

    pub fn into_request(self) -> QueryRequest {
        QueryRequest::Insert(self.request)
    }

    /// Runs the insert and returns the number of rows written.
    pub async fn execute(self) -> Result<usize> {
        let rows = self.client.dispatch(QueryRequest::Insert(self.request)).await?;
        Ok(rows.len())
    }
}

#[derive(Clone)]
pub struct UpdateQuery<S = Unfiltered> {
    client: Client,
    request: UpdateRequest,
    _state: PhantomData<S>,
}

impl UpdateQuery<Unfiltered> {
    pub(crate) fn new(client: Client, table: String, patch: Row) -> Self {
        Self {
            client,
            request: UpdateRequest {
                table,
                patch,
                filters: Vec::new(),
                returning: None,
            },
            _state: PhantomData,
        }
    }
}

impl<S> UpdateQuery<S> {
    pub fn filter(mut self, filter: Filter) -> UpdateQuery<Filtered> {
        self.request.filters.push(filter);
        UpdateQuery {
            client: self.client,
            request: self.request,
            _state: PhantomData,
        }
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> UpdateQuery<Filtered> {
        self.filter(Filter::eq(column, value))
    }

    pub fn in_<I, V>(self, column: impl Into<String>, values: I) -> UpdateQuery<Filtered>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.filter(Filter::in_list(column, values))
    }

    pub fn is_null(self, column: impl Into<String>) -> UpdateQuery<Filtered> {
        self.filter(Filter::is_null(column))
    }
}

impl UpdateQuery<Filtered> {
    pub fn select(mut self, projection: impl Into<Projection>) -> Returning {
        self.request.returning = Some(projection.into());
        Returning {
            client: self.client,
            request: QueryRequest::Update(self.request),
        }
    }

    pub fn into_request(self) -> QueryRequest {
        QueryRequest::Update(self.request)
    }

    /// Runs the update and returns the number of rows changed.
    pub async fn execute(self) -> Result<usize> {
        let rows = self.client.dispatch(QueryRequest::Update(self.request)).await?;
        Ok(rows.len())
    }
}

#[derive(Clone)]
pub struct DeleteQuery<S = Unfiltered> {
    client: Client,
    request: DeleteRequest,
    _state: PhantomData<S>,
}

impl DeleteQuery<Unfiltered> {
    pub(crate) fn new(client: Client, table: String) -> Self {
        Self {
            client,
            request: DeleteRequest {
                table,
                filters: Vec::new(),
                returning: None,
            },
            _state: PhantomData,
        }
    }
}

impl<S> DeleteQuery<S> {
    pub fn filter(mut self, filter: Filter) -> DeleteQuery<Filtered> {
        self.request.filters.push(filter);
        DeleteQuery {
            client: self.client,
            request: self.request,
            _state: PhantomData,
        }
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> DeleteQuery<Filtered> {
        self.filter(Filter::eq(column, value))
    }

    pub fn in_<I, V>(self, column: impl Into<String>, values: I) -> DeleteQuery<Filtered>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.filter(Filter::in_list(column, values))
    }
}

impl DeleteQuery<Filtered> {
    pub fn select(mut self, projection: impl Into<Projection>) -> Returning {
        self.request.returning = Some(projection.into());
        Returning {
            client: self.client,
            request: QueryRequest::Delete(self.request),
        }
    }

    pub fn into_request(self) -> QueryRequest {
        QueryRequest::Delete(self.request)
    }

    /// Runs the delete and returns the number of rows removed.
    pub async fn execute(self) -> Result<usize> {
        let rows = self.client.dispatch(QueryRequest::Delete(self.request)).await?;
        Ok(rows.len())
    }
}
