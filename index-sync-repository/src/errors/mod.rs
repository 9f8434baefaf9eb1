//! Error types for the index sync repository.

mod search_error;

pub use search_error::SearchError;
