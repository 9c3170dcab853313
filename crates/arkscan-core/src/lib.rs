pub mod error;
pub mod feed;
pub mod index;
pub mod ingest;
pub mod query;
pub mod store;
#[cfg(test)]
pub mod test_util;
pub mod types;

pub use error::{FeedError, IngestError, QueryError, StorageError};
pub use ingest::{Event, Outcome, Processor, ReplayPolicy};
pub use query::QueryService;
