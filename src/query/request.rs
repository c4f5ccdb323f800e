use super::filter::{Filter, OrderBy, Projection, Range};
use crate::core::Row;
use std::fmt;

/// Conflict target for upserts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnConflict {
    pub columns: Vec<String>,
    /// Skip conflicting rows instead of merging them into the existing row.
    pub ignore_duplicates: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectRequest {
    pub table: String,
    pub projection: Projection,
    pub filters: Vec<Filter>,
    pub order: Vec<OrderBy>,
    pub range: Option<Range>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertRequest {
    pub table: String,
    pub rows: Vec<Row>,
    pub on_conflict: Option<OnConflict>,
    pub returning: Option<Projection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub table: String,
    pub patch: Row,
    pub filters: Vec<Filter>,
    pub returning: Option<Projection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRequest {
    pub table: String,
    pub filters: Vec<Filter>,
    pub returning: Option<Projection>,
}

/// An executable request produced by the builders.
///
/// A backend answers every request with the affected rows: the selected rows
/// for reads, and for writes the written rows projected through `returning`
/// (or one empty row per affected row when nothing is returned).
#[derive(Debug, Clone, PartialEq)]
pub enum QueryRequest {
    Select(SelectRequest),
    Insert(InsertRequest),
    Update(UpdateRequest),
    Delete(DeleteRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{label}")
    }
}

impl QueryRequest {
    pub fn table(&self) -> &str {
        match self {
            Self::Select(req) => &req.table,
            Self::Insert(req) => &req.table,
            Self::Update(req) => &req.table,
            Self::Delete(req) => &req.table,
        }
    }

    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Select(_) => RequestKind::Select,
            Self::Insert(_) => RequestKind::Insert,
            Self::Update(_) => RequestKind::Update,
            Self::Delete(_) => RequestKind::Delete,
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Select(_))
    }

    pub fn filters(&self) -> &[Filter] {
        match self {
            Self::Select(req) => &req.filters,
            Self::Update(req) => &req.filters,
            Self::Delete(req) => &req.filters,
            Self::Insert(_) => &[],
        }
    }
}
