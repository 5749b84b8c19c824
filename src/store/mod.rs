// src/store/mod.rs
// Embedded SQLite storage layer (spec.md §3, §4.1). Grounded on
// `mira-server/src/db/{pool,project}.rs`'s run()/interact() split and
// sync-function-per-operation style.

pub mod belief;
pub mod chunk;
pub mod episode;
pub mod meta;
pub mod pool;
pub mod project;
pub mod row;
pub mod schema;
pub mod types;

pub use pool::DatabasePool;
