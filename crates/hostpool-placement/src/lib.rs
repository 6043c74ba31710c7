//! hostpool placement — candidate filter, priority scorer, affinity picker.
//!
//! This crate turns a match request into an ordered host selection. It
//! does NOT hold or commit hosts (that's `hostpool-matcher`). It reads a
//! snapshot of `Unused` hosts, scores them, and picks exactly `count`
//! hosts under one of four affinity modes.
//!
//! # Components
//!
//! - **`request`** — Wire request and its validated [`Criteria`]
//! - **`filter`** — Hard predicates against the inventory
//! - **`scorer`** — Additive integer priority and per-subzone sums
//! - **`picker`** — RANDOM / SAME_SUBZONE / SAME_SUBZONE_CROSS_SWITCH / CROSS_SUBZONE
//! - **`convert`** — Host record → picker candidate

pub mod convert;
pub mod error;
pub mod filter;
pub mod picker;
pub mod request;
pub mod scorer;

pub use convert::host_to_candidate;
pub use error::{PlacementError, PlacementResult};
pub use filter::find_candidates;
pub use picker::{Candidate, Selection, pick};
pub use request::{AffinityMode, Criteria, MatchRequest, ResourceSpec, StorageSpec};
pub use scorer::{PRIORITY_P_MAX, PoolStats, ScoreBreakdown, ScoredPool, score_host, score_pool};
