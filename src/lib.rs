//! pagedb: a single-file paged relational database.
//!
//! Layers, bottom up: `storage::pager` (page lists in one file),
//! `storage::catalog` / `storage::tuple` (blob codecs), `storage::Database`
//! (tables, row cursors, nested-loop join), `executor::evaluator` (predicate
//! trees), then `parser`/`planner`/`executor` and the pgwire `server`.

pub mod config;
pub mod error;
pub mod executor;
mod handler;
pub mod parser;
pub mod planner;
pub mod server;
pub mod statement;
pub mod storage;
pub mod types;

pub use error::{Error, Result};
