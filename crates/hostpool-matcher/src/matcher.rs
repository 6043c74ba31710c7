//! Matcher — runs a request through filter, scorer, picker, and gate.

use std::collections::HashMap;

use hostpool_placement::{
    AffinityMode, Criteria, MatchRequest, Selection, find_candidates, pick, score_pool,
};
use hostpool_state::{HostId, HostRecord, InventoryStore, epoch_secs};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::MatchResult;
use crate::reservation::{FinalStatus, Reservation, ReservationGate};

const DEFAULT_OPERATOR: &str = "hostpool";

/// Result of a completed match call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchOutcome {
    pub selected: Vec<HostId>,
    pub diagnostics: Vec<String>,
    /// Token of the open hold; `None` when the match was committed.
    pub reservation_id: Option<String>,
}

/// Matches requests against one inventory.
#[derive(Clone)]
pub struct Matcher {
    store: InventoryStore,
    gate: ReservationGate,
}

impl Matcher {
    pub fn new(store: InventoryStore) -> Self {
        let gate = ReservationGate::new(store.clone());
        Self { store, gate }
    }

    pub fn gate(&self) -> &ReservationGate {
        &self.gate
    }

    /// Filter, score, and pick without holding anything.
    ///
    /// `now` (unix seconds) feeds the age term, so the same snapshot and
    /// `now` always give the same selection.
    pub fn plan(&self, req: &MatchRequest, now: u64) -> MatchResult<Selection> {
        let criteria = Criteria::from_request(req)?;
        let hosts = find_candidates(&self.store, &criteria)?;

        let mut target = criteria.count;
        let mut notes = Vec::new();
        if !criteria.strict {
            let limit = placeable(&hosts, criteria.mode);
            if limit < target {
                notes.push(format!(
                    "best effort: {limit} of {target} requested hosts can be placed under {}",
                    criteria.mode
                ));
                target = limit;
            }
        }

        let pool = score_pool(&hosts, &criteria, now);
        let mut selection = pick(pool, target, criteria.mode)?;
        notes.append(&mut selection.diagnostics);
        selection.diagnostics = notes;
        debug!(selected = ?selection.selected, mode = %criteria.mode, "match planned");
        Ok(selection)
    }

    /// Plan and hold the selection.
    pub fn reserve(&self, req: &MatchRequest) -> MatchResult<(Selection, Reservation)> {
        let selection = self.plan(req, epoch_secs())?;
        let operator = req.operator.as_deref().unwrap_or(DEFAULT_OPERATOR);
        let reservation = self.gate.preselect(&selection.selected, operator)?;
        Ok((selection, reservation))
    }

    /// Full match call. With `commit` set, the hosts end up `Used`;
    /// otherwise they stay `Preselected` under the returned reservation id.
    pub fn match_hosts(&self, req: &MatchRequest) -> MatchResult<MatchOutcome> {
        let (selection, reservation) = self.reserve(req)?;
        let reservation_id = if req.commit {
            reservation.commit(FinalStatus::Used)?;
            None
        } else {
            Some(reservation.detach())
        };
        info!(
            selected = ?selection.selected,
            reservation = reservation_id.as_deref().unwrap_or("committed"),
            "hosts matched"
        );
        Ok(MatchOutcome {
            selected: selection.selected,
            diagnostics: selection.diagnostics,
            reservation_id,
        })
    }

    /// Move every host held by `reservation_id` to `Used`.
    pub fn commit(&self, reservation_id: &str, operator: &str) -> MatchResult<Vec<HostId>> {
        self.gate.commit_held(reservation_id, FinalStatus::Used, operator)
    }

    /// Return every host held by `reservation_id` to `Unused`. Idempotent.
    pub fn release(&self, reservation_id: &str, operator: &str) -> MatchResult<Vec<HostId>> {
        self.gate.commit_held(reservation_id, FinalStatus::Unused, operator)
    }
}

/// Upper bound on how many of `hosts` one pick under `mode` can return.
fn placeable(hosts: &[HostRecord], mode: AffinityMode) -> usize {
    let mut per_subzone: HashMap<&str, usize> = HashMap::new();
    for host in hosts {
        *per_subzone.entry(host.sub_zone.as_str()).or_default() += 1;
    }
    match mode {
        AffinityMode::Random => hosts.len(),
        AffinityMode::SameSubzone | AffinityMode::SameSubzoneCrossSwitch => {
            per_subzone.values().copied().max().unwrap_or(0)
        }
        AffinityMode::CrossSubzone { .. } => per_subzone.len(),
    }
}
