//! In-memory DynamoDB emulator
//!
//! [`DynamoDBStorage`] is the engine: a table catalog, an item store with
//! per-item revisions, query/scan, update expressions and batch operations.
//! [`server::router`] puts the DynamoDB JSON protocol in front of it.

pub mod batch;
pub mod config;
pub mod expression;
pub mod filter;
pub mod handlers;
pub mod server;
pub mod storage;
pub mod value;

#[cfg(test)]
mod expression_tests;

pub use config::DynamoDBConfig;
pub use storage::{DynamoDBError, DynamoDBStorage, WriteCondition};
pub use value::{AttributeValue, Item, Number};
