//! Storage configuration.

pub mod schema;

pub use schema::StorageConfig;
