//! # UserAPI Shared Library
//!
//! Domain types and services used by the UserAPI server.
//!
//! ## Module Organization
//!
//! - `models`: the `User` record and its capability traits
//! - `auth`: password hashing, credential extraction, composite authentication
//! - `store`: identity stores (PostgreSQL, in-memory)
//! - `ratelimit`: per-identity token buckets and allowance stores (Redis, in-memory)
//! - `db`: PostgreSQL connection pool
//! - `error`: store error type

pub mod auth;
pub mod db;
pub mod error;
pub mod models;
pub mod ratelimit;
pub mod store;

/// Current version of the UserAPI shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
