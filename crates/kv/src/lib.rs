//! Key-value backend for chainql
//!
//! Runs chains over an ordered byte-keyed store without a query language:
//! - store: the `OrderedStore` trait and the in-memory `MemoryStore`
//! - subspace: per-table key prefixes (primary, index, metadata)
//! - pipeline: stream queues to test/transform stages plus a post-pass
//! - index: secondary indexes kept in step with every write
//! - table: `KvTable`, `KvSelection`, `KvSingleSelection`
//! - database: `KvDatabase` and table administration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod database;
pub mod index;
pub mod pipeline;
pub mod store;
pub mod subspace;
pub mod table;

pub use database::KvDatabase;
pub use index::IndexList;
pub use pipeline::Pipeline;
pub use store::{BatchOp, MemoryStore, OrderedStore};
pub use subspace::Subspace;
pub use table::{KvSelection, KvSingleSelection, KvTable};
