//! Storage layer

pub mod memory;
pub mod postgres;
pub mod traits;

pub use memory::InMemoryDocumentStore;
pub use postgres::PostgresDocumentStore;
pub use traits::{DocumentStore, RecordWrite};
