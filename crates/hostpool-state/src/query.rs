//! Predicate queries over host records.
//!
//! A [`HostFilter`] is the store-side form of a request's hard
//! constraints. Every populated field is a predicate; a host matches only
//! if it satisfies all of them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::*;

/// Inclusive numeric bounds. A missing side is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    #[serde(default)]
    pub min: Option<u64>,
    #[serde(default)]
    pub max: Option<u64>,
}

impl Bounds {
    pub fn new(min: Option<u64>, max: Option<u64>) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: u64) -> bool {
        self.min.is_none_or(|m| value >= m) && self.max.is_none_or(|m| value <= m)
    }

    /// `false` when both sides are set and `min > max`.
    pub fn is_valid(&self) -> bool {
        match (self.min, self.max) {
            (Some(lo), Some(hi)) => lo <= hi,
            _ => true,
        }
    }
}

/// A disk a host must have at a given mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskRequirement {
    pub mount_point: String,
    /// Minimum size in GB.
    pub min_size: u64,
    /// `None` accepts any disk type.
    pub disk_type: Option<DiskType>,
}

impl DiskRequirement {
    /// The disk at this mount point, if it satisfies the requirement.
    pub fn satisfied_by<'a>(&self, host: &'a HostRecord) -> Option<&'a DiskInfo> {
        let disk = host.storage_device.get(&self.mount_point)?;
        if disk.size < self.min_size {
            return None;
        }
        match self.disk_type {
            Some(t) if t != disk.disk_type => None,
            _ => Some(disk),
        }
    }
}

/// Hard predicates over host records.
#[derive(Debug, Clone, Default)]
pub struct HostFilter {
    pub status: Option<HostStatus>,
    pub device_classes: BTreeSet<String>,
    pub cpu: Bounds,
    /// Memory bounds in MB.
    pub mem: Bounds,
    pub disks: Vec<DiskRequirement>,
    pub os_type: Option<OsType>,
    /// Prefix of the host's OS version.
    pub os_version: Option<String>,
    pub cities: BTreeSet<String>,
    pub subzones: BTreeSet<String>,
    /// `Some(b)`: host is dedicated to `b` or public. `Some(0)`: public only.
    pub dedicated_biz: Option<u64>,
    /// `Some(t)`: host carries tag `t` or is public. `Some("")`: public only.
    pub resource_type: Option<String>,
    pub labels_include: BTreeSet<String>,
    pub labels_exclude: BTreeSet<String>,
    pub exclude_ids: BTreeSet<HostId>,
}

impl HostFilter {
    /// Filter that only checks status.
    pub fn with_status(status: HostStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn matches(&self, host: &HostRecord) -> bool {
        if self.status.is_some_and(|s| s != host.status) {
            return false;
        }
        if self.exclude_ids.contains(&host.bk_host_id) {
            return false;
        }
        if !self.device_classes.is_empty() && !self.device_classes.contains(&host.device_class) {
            return false;
        }
        if !self.cpu.contains(u64::from(host.cpu_num)) || !self.mem.contains(host.dram_cap) {
            return false;
        }
        if !self.disks.iter().all(|d| d.satisfied_by(host).is_some()) {
            return false;
        }
        if self.os_type.is_some_and(|t| t != host.os_type) {
            return false;
        }
        if let Some(ref prefix) = self.os_version {
            if !host.os_version.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if !self.cities.is_empty() && !self.cities.contains(&host.city) {
            return false;
        }
        if !self.subzones.is_empty() && !self.subzones.contains(&host.sub_zone) {
            return false;
        }
        if let Some(biz) = self.dedicated_biz {
            if !(host.is_public_biz() || host.dedicated_biz == biz) {
                return false;
            }
        }
        if let Some(ref tag) = self.resource_type {
            if !(host.is_public_resource_type() || (!tag.is_empty() && host.rs_type == *tag)) {
                return false;
            }
        }
        if !self.labels_include.is_subset(&host.labels) {
            return false;
        }
        if !self.labels_exclude.is_disjoint(&host.labels) {
            return false;
        }
        true
    }
}
