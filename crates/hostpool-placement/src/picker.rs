//! Affinity picker — the matcher proper.
//!
//! Given a scored pool, select exactly `count` hosts under one of four
//! modes:
//!
//! ```text
//! RANDOM                     one bucket, pop best until count
//! SAME_SUBZONE               best subzone with ≥ count hosts, pop best
//! SAME_SUBZONE_CROSS_SWITCH  as above, skipping shared racks / switches
//! CROSS_SUBZONE              one host per subzone in rotation
//! ```
//!
//! Candidates live in per-subzone max-heaps ordered by score, then by
//! ascending host id. Heaps are consumed destructively; a run never
//! touches the inventory.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashSet};

use hostpool_state::HostId;
use serde::Serialize;
use tracing::debug;

use crate::error::{PlacementError, PlacementResult};
use crate::request::AffinityMode;
use crate::scorer::{PRIORITY_P_MAX, ScoredPool};

/// A scored host as the picker sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub host_id: HostId,
    pub subzone: String,
    pub rack_id: String,
    pub switch_ids: BTreeSet<String>,
    pub score: u64,
}

/// Heap entry: highest score first, then lowest host id.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Ranked(Candidate);

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .score
            .cmp(&other.0.score)
            .then_with(|| other.0.host_id.cmp(&self.0.host_id))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

type Bucket = BinaryHeap<Ranked>;

/// The picker's answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub selected: Vec<HostId>,
    pub diagnostics: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    NoSwitch,
    RackTaken,
    SwitchTaken,
}

impl Rejection {
    fn describe(&self) -> &'static str {
        match self {
            Rejection::NoSwitch => "no switch ids",
            Rejection::RackTaken => "rack already picked",
            Rejection::SwitchTaken => "switch already picked",
        }
    }
}

/// Per-run picker state. Never shared between runs.
struct PickState {
    target: usize,
    cross_switch: bool,
    selected: Vec<HostId>,
    racks: HashSet<String>,
    switches: HashSet<String>,
    visited: Vec<String>,
    picks: BTreeMap<String, usize>,
    diagnostics: Vec<String>,
    rejections: usize,
}

impl PickState {
    fn new(target: usize, cross_switch: bool) -> Self {
        Self {
            target,
            cross_switch,
            selected: Vec::with_capacity(target),
            racks: HashSet::new(),
            switches: HashSet::new(),
            visited: Vec::new(),
            picks: BTreeMap::new(),
            diagnostics: Vec::new(),
            rejections: 0,
        }
    }

    /// Start a fresh attempt. Diagnostics and rejection counts carry over.
    fn reset(&mut self) {
        self.selected.clear();
        self.racks.clear();
        self.switches.clear();
        self.picks.clear();
    }

    fn is_done(&self) -> bool {
        self.selected.len() >= self.target
    }

    fn note(&mut self, message: String) {
        debug!(%message, "picker");
        self.diagnostics.push(message);
    }

    fn check(&self, c: &Candidate) -> Result<(), Rejection> {
        if !self.cross_switch {
            return Ok(());
        }
        if c.switch_ids.is_empty() {
            return Err(Rejection::NoSwitch);
        }
        if !c.rack_id.is_empty() && self.racks.contains(&c.rack_id) {
            return Err(Rejection::RackTaken);
        }
        if c.switch_ids.iter().any(|s| self.switches.contains(s)) {
            return Err(Rejection::SwitchTaken);
        }
        Ok(())
    }

    fn take(&mut self, c: Candidate) {
        if !c.rack_id.is_empty() {
            self.racks.insert(c.rack_id.clone());
        }
        self.switches.extend(c.switch_ids.iter().cloned());
        *self.picks.entry(c.subzone.clone()).or_default() += 1;
        self.selected.push(c.host_id);
        self.note(format!(
            "picked host {} from subzone {} (score {})",
            c.host_id, c.subzone, c.score
        ));
    }

    /// Pop until an admissible candidate is found and take it. Rejected
    /// candidates are dropped for the rest of the run.
    fn take_best(&mut self, bucket: &mut Bucket) -> bool {
        while let Some(Ranked(c)) = bucket.pop() {
            match self.check(&c) {
                Ok(()) => {
                    self.take(c);
                    return true;
                }
                Err(why) => {
                    self.rejections += 1;
                    self.note(format!("skipped host {}: {}", c.host_id, why.describe()));
                }
            }
        }
        false
    }

    fn finish(mut self) -> Selection {
        let spread: Vec<String> = self
            .picks
            .iter()
            .map(|(subzone, n)| format!("{subzone}={n}"))
            .collect();
        self.note(format!("picks per subzone: {}", spread.join(", ")));
        Selection {
            selected: self.selected,
            diagnostics: self.diagnostics,
        }
    }

    fn fail(self, detail: String) -> PlacementError {
        if self.rejections > 0 {
            PlacementError::CrossSwitchExhausted(detail)
        } else {
            PlacementError::AffinityUnsatisfied(detail)
        }
    }
}

/// Select exactly `count` hosts from `pool` under `mode`.
pub fn pick(pool: ScoredPool, count: usize, mode: AffinityMode) -> PlacementResult<Selection> {
    if count == 0 {
        return Err(PlacementError::Validation("count must be at least 1".to_string()));
    }
    debug!(candidates = pool.len(), count, %mode, "picking hosts");
    match mode {
        AffinityMode::Random => pick_random(pool, count),
        AffinityMode::SameSubzone => pick_same_subzone(pool, count, false),
        AffinityMode::SameSubzoneCrossSwitch => pick_same_subzone(pool, count, true),
        AffinityMode::CrossSubzone { cross_switch } => pick_cross_subzone(pool, count, cross_switch),
    }
}

fn pick_random(pool: ScoredPool, count: usize) -> PlacementResult<Selection> {
    let mut state = PickState::new(count, false);
    let mut bucket: Bucket = pool.candidates.into_iter().map(Ranked).collect();
    while !state.is_done() && state.take_best(&mut bucket) {}
    if state.is_done() {
        return Ok(state.finish());
    }
    let detail = format!("only {} of {count} hosts available", state.selected.len());
    Err(state.fail(detail))
}

fn pick_same_subzone(pool: ScoredPool, count: usize, cross_switch: bool) -> PlacementResult<Selection> {
    let order = order_by_size_then_sum(&pool);
    let considered = order.len();
    let mut buckets = into_buckets(pool.candidates);
    let mut state = PickState::new(count, cross_switch);

    for subzone in order {
        let Some(mut bucket) = buckets.remove(&subzone) else {
            continue;
        };
        if bucket.len() < count {
            state.note(format!(
                "unsatisfied({subzone}): {} candidates for {count} hosts",
                bucket.len()
            ));
            continue;
        }
        state.reset();
        state.visited.push(subzone.clone());
        while !state.is_done() && state.take_best(&mut bucket) {}
        if state.is_done() {
            return Ok(state.finish());
        }
        state.note(format!(
            "unsatisfied({subzone}): exhausted after {} of {count} hosts",
            state.selected.len()
        ));
    }

    let detail = format!(
        "no subzone can supply {count} hosts ({considered} considered, {} large enough)",
        state.visited.len()
    );
    Err(state.fail(detail))
}

fn pick_cross_subzone(pool: ScoredPool, count: usize, cross_switch: bool) -> PlacementResult<Selection> {
    let by_sum = order_by_sum(&pool);
    let by_size = order_by_size_then_sum(&pool);
    let buckets = into_buckets(pool.candidates);
    let mut state = PickState::new(count, cross_switch);

    if rotate(&mut state, &by_sum, buckets.clone()) {
        return Ok(state.finish());
    }
    if by_size != by_sum {
        state.note("rotation by priority sum exhausted; retrying by subzone size".to_string());
        if rotate(&mut state, &by_size, buckets) {
            return Ok(state.finish());
        }
    }

    let detail = format!(
        "{} subzones cannot supply {count} hosts one per subzone",
        by_sum.len()
    );
    Err(state.fail(detail))
}

/// Take at most one host from each subzone in `order`.
fn rotate(state: &mut PickState, order: &[String], mut buckets: BTreeMap<String, Bucket>) -> bool {
    state.reset();
    for subzone in order {
        if state.is_done() {
            break;
        }
        let Some(bucket) = buckets.get_mut(subzone) else {
            continue;
        };
        state.visited.push(subzone.clone());
        if !state.take_best(bucket) {
            state.note(format!("subzone {subzone}: no admissible host"));
        }
    }
    state.is_done()
}

fn into_buckets(candidates: Vec<Candidate>) -> BTreeMap<String, Bucket> {
    let mut buckets: BTreeMap<String, Bucket> = BTreeMap::new();
    for c in candidates {
        buckets.entry(c.subzone.clone()).or_default().push(Ranked(c));
    }
    buckets
}

fn subzone_sizes(pool: &ScoredPool) -> BTreeMap<&str, u64> {
    let mut sizes: BTreeMap<&str, u64> = BTreeMap::new();
    for c in &pool.candidates {
        *sizes.entry(c.subzone.as_str()).or_default() += 1;
    }
    sizes
}

/// Subzones by `|bucket| × PRIORITY_P_MAX + sum` descending, then by name.
fn order_by_size_then_sum(pool: &ScoredPool) -> Vec<String> {
    let sizes = subzone_sizes(pool);
    let mut keyed: Vec<(u64, &str)> = sizes
        .into_iter()
        .map(|(subzone, n)| {
            let sum = pool.subzone_sums.get(subzone).copied().unwrap_or(0);
            (n.saturating_mul(PRIORITY_P_MAX).saturating_add(sum), subzone)
        })
        .collect();
    keyed.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    keyed.into_iter().map(|(_, s)| s.to_string()).collect()
}

/// Subzones by priority sum descending, then by name.
fn order_by_sum(pool: &ScoredPool) -> Vec<String> {
    let sizes = subzone_sizes(pool);
    let mut keyed: Vec<(u64, &str)> = sizes
        .into_keys()
        .map(|subzone| (pool.subzone_sums.get(subzone).copied().unwrap_or(0), subzone))
        .collect();
    keyed.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    keyed.into_iter().map(|(_, s)| s.to_string()).collect()
}
