//! hostpool-state — inventory store for the resource pool.
//!
//! Backed by [redb](https://docs.rs/redb), persists host records and the
//! append-only status-change log.
//!
//! # Architecture
//!
//! Host records are JSON-serialized into redb's `&[u8]` value columns,
//! keyed by `bk_host_id`. A separate index table enforces uniqueness of
//! `(cloud_zone_id, ip)`. Log entries are keyed by a global sequence
//! number allocated inside the writing transaction, so log order equals
//! commit order; secondary index tables give prefix scans by host, time,
//! and reason.
//!
//! redb admits one write transaction at a time. Every status transition
//! is a read-check-write inside a single write transaction, which makes
//! the conditional update (`WHERE status = from AND id IN (…)`) atomic
//! across concurrent callers.
//!
//! The `InventoryStore` is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and can be shared across async tasks.

pub mod error;
pub mod query;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use query::{Bounds, DiskRequirement, HostFilter};
pub use store::{InventoryStore, StatusUpdate, epoch_secs};
pub use types::*;
