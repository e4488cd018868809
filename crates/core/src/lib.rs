//! Functional core of the catalog repository layer.
//!
//! Everything in this crate is free of I/O: entity definitions and their
//! validation rules, query criteria with canonical hashing, cache key
//! construction, glob matching, category tree algorithms, the error taxonomy,
//! and the collaborator traits (`Cache`, `StorageEngine`) that the shell crate
//! implements.

pub mod cache;
pub mod catalog;
pub mod hierarchy;
pub mod query;
pub mod storage;
