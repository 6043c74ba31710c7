//! Type conversions between inventory records and picker candidates.

use hostpool_state::HostRecord;

use crate::picker::Candidate;

/// Convert a [`HostRecord`] plus its score into a picker [`Candidate`].
///
/// Only the topology the picker needs is copied; the candidate owns it
/// by value so a pick run holds no references into the inventory.
pub fn host_to_candidate(host: &HostRecord, score: u64) -> Candidate {
    Candidate {
        host_id: host.bk_host_id,
        subzone: host.sub_zone.clone(),
        rack_id: host.rack_id.trim().to_string(),
        switch_ids: host.switch_ids(),
        score,
    }
}
