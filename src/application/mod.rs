//! Application services layer.

pub mod catalog;
pub mod error;
pub mod ingest;
pub mod pagination;
pub mod repos;
