pub mod builder;
pub mod filter;
pub mod repository;
pub mod request;

pub use builder::{DeleteQuery, Filtered, InsertQuery, Returning, SelectQuery, Unfiltered, UpdateQuery};
pub use filter::{Filter, OrderBy, Projection, Range, SortDirection};
pub use repository::{ReadOnlyRepository, Repository};
pub use request::{
    DeleteRequest, InsertRequest, OnConflict, QueryRequest, RequestKind, SelectRequest,
    UpdateRequest,
};
