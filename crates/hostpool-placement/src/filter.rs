//! Candidate filter — hard constraints against the inventory.

use hostpool_state::{HostRecord, InventoryStore};
use tracing::debug;

use crate::error::{PlacementError, PlacementResult};
use crate::request::Criteria;

/// Every `Unused` host matching all predicates of `criteria`.
///
/// Fails with `NoCandidates` on an empty result, and with
/// `TooFewCandidates` when a strict request matches fewer than `count`.
pub fn find_candidates(
    store: &InventoryStore,
    criteria: &Criteria,
) -> PlacementResult<Vec<HostRecord>> {
    let hosts = store.find_by_filter(&criteria.filter)?;
    debug!(
        candidates = hosts.len(),
        wanted = criteria.count,
        mode = %criteria.mode,
        "candidate filter applied"
    );
    check_pool_size(hosts.len(), criteria)?;
    Ok(hosts)
}

fn check_pool_size(found: usize, criteria: &Criteria) -> PlacementResult<()> {
    if found == 0 {
        return Err(PlacementError::NoCandidates);
    }
    if found < criteria.count && criteria.strict {
        return Err(PlacementError::TooFewCandidates {
            found,
            wanted: criteria.count,
        });
    }
    Ok(())
}
