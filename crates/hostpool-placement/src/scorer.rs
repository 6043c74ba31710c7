//! Priority scoring for match candidates.
//!
//! Each candidate gets an additive integer score built from fixed weight
//! tiers; larger is preferred:
//!
//! | Tier        | Weight | Signal                                             |
//! |-------------|--------|----------------------------------------------------|
//! | P0          | 100000 | host business == requested business                |
//! | P1          | 10000  | disk-slot count == requested slot count            |
//! | P2          | 100    | device class in requested set                      |
//! | P2          | 100    | device class == most common class in the pool      |
//! | P2-weighted | ≤100   | mean of `requested / actual` disk size × P2         |
//! | P2          | 100    | resource-type tag == requested tag                 |
//! | P2-tuned    | ≤100   | redis requests: `cpu_min / cpu` × P2               |
//! | age         | ≤50    | host age in hours, capped at one year              |
//! | affinity    | P2 × n | same-subzone modes: n other hosts sharing a switch |
//!
//! Scores are a pure function of the candidate pool, the criteria, and
//! the `now` timestamp passed in, so a snapshot always scores the same.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use hostpool_state::{HostId, HostRecord};
use serde::Serialize;
use tracing::trace;

use crate::convert::host_to_candidate;
use crate::picker::Candidate;
use crate::request::Criteria;

pub const P0: u64 = 100_000;
pub const P1: u64 = 10_000;
pub const P2: u64 = 100;
pub const AGE_MAX: u64 = 50;
pub const AGE_CAP_HOURS: u64 = 365 * 24;

/// Subzone weighting constant: a subzone's size always outranks its
/// priority sum when ordering subzones.
pub const PRIORITY_P_MAX: u64 = 100_000_000;

/// Individual score components, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoreBreakdown {
    pub dedicated_biz: u64,
    pub disk_slots: u64,
    pub device_class: u64,
    pub common_device_class: u64,
    pub disk_fit: u64,
    pub resource_type: u64,
    pub redis_cpu: u64,
    pub age: u64,
    pub switch_affinity: u64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u64 {
        self.dedicated_biz
            + self.disk_slots
            + self.device_class
            + self.common_device_class
            + self.disk_fit
            + self.resource_type
            + self.redis_cpu
            + self.age
            + self.switch_affinity
    }
}

/// Pool-wide facts some tiers depend on.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Most common device class; ties go to the lexically smallest.
    pub common_device_class: Option<String>,
    /// For each host, how many other pool hosts share at least one switch.
    pub switch_neighbours: HashMap<HostId, usize>,
}

impl PoolStats {
    pub fn from_hosts(hosts: &[HostRecord]) -> Self {
        let mut class_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for host in hosts {
            *class_counts.entry(host.device_class.as_str()).or_default() += 1;
        }
        let mut common: Option<(&str, usize)> = None;
        for (class, n) in class_counts {
            if common.is_none_or(|(_, best)| n > best) {
                common = Some((class, n));
            }
        }

        let mut by_switch: HashMap<String, Vec<HostId>> = HashMap::new();
        for host in hosts {
            for switch in host.switch_ids() {
                by_switch.entry(switch).or_default().push(host.bk_host_id);
            }
        }
        let switch_neighbours = hosts
            .iter()
            .map(|host| {
                let neighbours: BTreeSet<HostId> = host
                    .switch_ids()
                    .iter()
                    .filter_map(|s| by_switch.get(s))
                    .flatten()
                    .copied()
                    .filter(|&id| id != host.bk_host_id)
                    .collect();
                (host.bk_host_id, neighbours.len())
            })
            .collect();

        Self {
            common_device_class: common.map(|(class, _)| class.to_string()),
            switch_neighbours,
        }
    }
}

/// Candidates with scores, plus the per-subzone score sums the picker
/// uses to order subzones.
#[derive(Debug, Clone, Default)]
pub struct ScoredPool {
    pub candidates: Vec<Candidate>,
    pub subzone_sums: BTreeMap<String, u64>,
}

impl ScoredPool {
    pub fn from_candidates(candidates: Vec<Candidate>) -> Self {
        let mut subzone_sums: BTreeMap<String, u64> = BTreeMap::new();
        for c in &candidates {
            *subzone_sums.entry(c.subzone.clone()).or_default() += c.score;
        }
        Self {
            candidates,
            subzone_sums,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Score one host against the criteria.
pub fn score_host(host: &HostRecord, criteria: &Criteria, pool: &PoolStats, now: u64) -> ScoreBreakdown {
    let mut score = ScoreBreakdown::default();

    if criteria.dedicated_biz == Some(host.dedicated_biz) {
        score.dedicated_biz = P0;
    }

    let slots = criteria.disk_slots();
    if slots > 0 && host.disk_slot_count() == slots {
        score.disk_slots = P1;
    }

    if criteria.filter.device_classes.contains(&host.device_class) {
        score.device_class = P2;
    }
    if pool.common_device_class.as_deref() == Some(host.device_class.as_str()) {
        score.common_device_class = P2;
    }

    if slots > 0 {
        let total: u64 = criteria
            .filter
            .disks
            .iter()
            .filter_map(|req| req.satisfied_by(host).map(|disk| (req.min_size, disk.size)))
            .map(|(wanted, actual)| if actual == 0 { P2 } else { P2 * wanted / actual })
            .sum();
        score.disk_fit = total / slots as u64;
    }

    if let Some(ref tag) = criteria.resource_type {
        if host.rs_type == *tag {
            score.resource_type = P2;
        }
    }

    if criteria.is_redis() {
        let cpu = u64::from(host.cpu_num);
        let cpu_min = criteria.filter.cpu.min.unwrap_or(0);
        if cpu > 0 && cpu >= cpu_min {
            score.redis_cpu = P2 * cpu_min / cpu;
        }
    }

    let age_hours = now.saturating_sub(host.created_at) / 3600;
    score.age = age_hours.min(AGE_CAP_HOURS) * AGE_MAX / AGE_CAP_HOURS;

    if criteria.mode.is_same_subzone() {
        let n = pool.switch_neighbours.get(&host.bk_host_id).copied().unwrap_or(0);
        score.switch_affinity = P2 * n as u64;
    }

    score
}

/// Score every host and build the per-subzone sums.
pub fn score_pool(hosts: &[HostRecord], criteria: &Criteria, now: u64) -> ScoredPool {
    let stats = PoolStats::from_hosts(hosts);
    let candidates = hosts
        .iter()
        .map(|host| {
            let breakdown = score_host(host, criteria, &stats, now);
            let total = breakdown.total();
            trace!(host_id = host.bk_host_id, score = total, ?breakdown, "host scored");
            host_to_candidate(host, total)
        })
        .collect();
    ScoredPool::from_candidates(candidates)
}
