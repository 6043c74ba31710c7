//! Reservation gate — atomic hold and release of selected hosts.
//!
//! `preselect` moves every selected host `Unused → Preselected` in one
//! store transaction or not at all. The returned [`Reservation`] is the
//! caller's handle on the hold: committing it moves the hosts to `Used`
//! or back to `Unused`; dropping it uncommitted releases them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use hostpool_state::{ChangeReason, HostId, InventoryStore, StatusUpdate, Transition};
use tracing::{debug, info, warn};

use crate::error::{MatchError, MatchResult};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

fn new_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let n = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    format!("rsv-{nanos:x}-{n}")
}

/// Where held hosts end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalStatus {
    Used,
    Unused,
}

impl FinalStatus {
    fn transition(self) -> Transition {
        match self {
            FinalStatus::Used => Transition::Confirm,
            FinalStatus::Unused => Transition::Release,
        }
    }
}

/// Gate over the inventory's conditional status updates.
#[derive(Clone)]
pub struct ReservationGate {
    store: InventoryStore,
}

impl ReservationGate {
    pub fn new(store: InventoryStore) -> Self {
        Self { store }
    }

    /// Hold every host in `ids`, or none of them.
    ///
    /// Fails with `ReservationLost` if any host has left `Unused` since it
    /// was selected; in that case nothing is held and nothing is logged.
    pub fn preselect(&self, ids: &[HostId], operator: &str) -> MatchResult<Reservation> {
        let token = new_token();
        let update = StatusUpdate::new(ids.to_vec(), Transition::Preselect, ChangeReason::Reservation)
            .reservation(token.clone())
            .detail(format!("preselected by {token}"))
            .operator(operator);
        let held = self.store.batch_update_status_all_or_none(&update)?;
        if held != ids.len() {
            warn!(%token, wanted = ids.len(), held, "reservation lost");
            return Err(MatchError::ReservationLost {
                wanted: ids.len(),
                held,
            });
        }
        info!(%token, hosts = ?ids, "hosts preselected");
        Ok(Reservation {
            gate: self.clone(),
            token,
            ids: ids.to_vec(),
            operator: operator.to_string(),
            done: false,
        })
    }

    /// Move the hosts held by `token` among `ids` to `status`.
    ///
    /// `Used` moves every host or none of them, otherwise `ReservationLost`.
    /// `Unused` is idempotent: hosts already released are skipped.
    pub fn commit(
        &self,
        token: &str,
        ids: &[HostId],
        status: FinalStatus,
        operator: &str,
    ) -> MatchResult<usize> {
        let update = StatusUpdate::new(ids.to_vec(), status.transition(), ChangeReason::Reservation)
            .reservation(token)
            .detail(format!("{token} committed as {status:?}"))
            .operator(operator);
        let moved = match status {
            FinalStatus::Used => self.store.batch_update_status_all_or_none(&update)?,
            FinalStatus::Unused => self.store.batch_update_status(&update)?,
        };
        if status == FinalStatus::Used && moved != ids.len() {
            warn!(%token, wanted = ids.len(), moved, "commit lost hosts");
            return Err(MatchError::ReservationLost {
                wanted: ids.len(),
                held: moved,
            });
        }
        debug!(%token, ?status, moved, "reservation committed");
        Ok(moved)
    }

    /// Commit whatever `token` currently holds. Used by callers that only
    /// kept the reservation id between calls.
    pub fn commit_held(&self, token: &str, status: FinalStatus, operator: &str) -> MatchResult<Vec<HostId>> {
        let ids = self.store.find_by_reservation(token)?;
        if ids.is_empty() {
            return match status {
                FinalStatus::Unused => Ok(ids),
                FinalStatus::Used => Err(MatchError::UnknownReservation(token.to_string())),
            };
        }
        self.commit(token, &ids, status, operator)?;
        Ok(ids)
    }
}

/// A live hold on a set of hosts.
///
/// Dropping it without calling [`commit`](Self::commit) or
/// [`detach`](Self::detach) releases every host back to `Unused`.
pub struct Reservation {
    gate: ReservationGate,
    token: String,
    ids: Vec<HostId>,
    operator: String,
    done: bool,
}

impl Reservation {
    pub fn id(&self) -> &str {
        &self.token
    }

    pub fn hosts(&self) -> &[HostId] {
        &self.ids
    }

    /// On failure the handle is dropped uncommitted, releasing whatever it
    /// still holds.
    pub fn commit(mut self, status: FinalStatus) -> MatchResult<usize> {
        let moved = self.gate.commit(&self.token, &self.ids, status, &self.operator)?;
        self.done = true;
        Ok(moved)
    }

    /// Keep the hold past this handle's lifetime and return its token.
    /// The hosts stay `Preselected` until committed through the gate.
    pub fn detach(mut self) -> String {
        self.done = true;
        std::mem::take(&mut self.token)
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        match self
            .gate
            .commit(&self.token, &self.ids, FinalStatus::Unused, &self.operator)
        {
            Ok(released) => info!(token = %self.token, released, "reservation dropped, hosts released"),
            Err(e) => warn!(token = %self.token, error = %e, "failed to release dropped reservation"),
        }
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("token", &self.token)
            .field("ids", &self.ids)
            .field("done", &self.done)
            .finish()
    }
}
