pub mod error;
pub mod types;
pub mod value;

pub use error::{RepoError, Result};
pub use types::{Row, into_row, now_timestamp, row_from};
pub use value::{compare_values, values_equal};
