//! mediadex: a media-asset catalog with a read-through cache in front of Postgres.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
