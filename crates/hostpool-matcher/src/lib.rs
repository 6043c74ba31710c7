//! hostpool-matcher — end-to-end host matching with reservation.
//!
//! Runs a match request through the placement pipeline and holds the
//! result through the reservation gate:
//!
//! ```text
//! MatchRequest
//!   └── Criteria ── filter (InventoryStore) ── scorer ── picker
//!                                                          │
//!                       ReservationGate::preselect ◀───────┘
//!                          │   Unused → Preselected (all or nothing)
//!                          ▼
//!                      Reservation ── commit(Used | Unused)
//!                          └── dropped uncommitted → release
//! ```
//!
//! The only shared state is the inventory; each match owns its picker
//! state. Contending reservations are ordered by the store's write
//! transactions, and the loser sees `ReservationLost`.

pub mod error;
pub mod matcher;
pub mod reservation;

pub use error::{MatchError, MatchResult};
pub use matcher::{MatchOutcome, Matcher};
pub use reservation::{FinalStatus, Reservation, ReservationGate};
