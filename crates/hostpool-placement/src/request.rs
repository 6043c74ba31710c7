//! Match request wire format and validation.
//!
//! [`MatchRequest`] is what callers send. [`Criteria::from_request`]
//! validates it once and produces everything the filter, scorer, and
//! picker need, so later stages never re-check raw input.

use std::collections::BTreeSet;

use hostpool_state::{Bounds, DiskRequirement, DiskType, HostFilter, HostId, HostStatus, OsType};
use serde::{Deserialize, Serialize};

use crate::error::{PlacementError, PlacementResult};

/// CPU / memory bounds of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    #[serde(default)]
    pub cpu: Bounds,
    /// Memory in MB.
    #[serde(default)]
    pub mem: Bounds,
}

/// One per-mount-point disk requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSpec {
    pub mount_point: String,
    /// Minimum size in GB.
    pub min_size: u64,
    /// `None`, empty, or `ALL` accept any disk type.
    #[serde(default)]
    pub disk_type: Option<String>,
}

fn default_strict() -> bool {
    true
}

/// A structured resource request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRequest {
    pub count: i64,
    /// One of `RANDOM`, `SAME_SUBZONE`, `SAME_SUBZONE_CROSS_SWITCH`,
    /// `CROSS_SUBZONE`. Absent means `RANDOM`.
    #[serde(default)]
    pub affinity: Option<String>,
    /// Honored only with `CROSS_SUBZONE`.
    #[serde(default)]
    pub cross_switch: bool,
    #[serde(default)]
    pub dedicated_biz_id: Option<u64>,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub device_classes: Vec<String>,
    #[serde(default)]
    pub spec: ResourceSpec,
    #[serde(default)]
    pub storage_specs: Vec<StorageSpec>,
    #[serde(default)]
    pub city: Vec<String>,
    #[serde(default)]
    pub subzones: Vec<String>,
    #[serde(default)]
    pub os_type: Option<String>,
    /// Prefix of the host OS version.
    #[serde(default)]
    pub os_version: Option<String>,
    #[serde(default)]
    pub labels_include: Vec<String>,
    #[serde(default)]
    pub labels_exclude: Vec<String>,
    #[serde(default)]
    pub exclude_host_ids: Vec<HostId>,
    /// Fail with `TOO_FEW_CANDIDATES` when fewer than `count` hosts match.
    /// When false, the match proceeds best-effort with the hosts that do.
    #[serde(default = "default_strict")]
    pub strict: bool,
    #[serde(default)]
    pub operator: Option<String>,
    /// Commit the selection as `Used` in the same call.
    #[serde(default)]
    pub commit: bool,
}

impl MatchRequest {
    /// A minimal request for `count` hosts in `RANDOM` mode.
    pub fn new(count: i64) -> Self {
        Self {
            count,
            affinity: None,
            cross_switch: false,
            dedicated_biz_id: None,
            resource_type: None,
            device_classes: Vec::new(),
            spec: ResourceSpec::default(),
            storage_specs: Vec::new(),
            city: Vec::new(),
            subzones: Vec::new(),
            os_type: None,
            os_version: None,
            labels_include: Vec::new(),
            labels_exclude: Vec::new(),
            exclude_host_ids: Vec::new(),
            strict: true,
            operator: None,
            commit: false,
        }
    }
}

/// Topological constraint on the selected set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffinityMode {
    Random,
    SameSubzone,
    SameSubzoneCrossSwitch,
    CrossSubzone { cross_switch: bool },
}

impl AffinityMode {
    /// Parse the wire form. `cross_switch` only affects `CROSS_SUBZONE`.
    pub fn parse(affinity: &str, cross_switch: bool) -> Option<Self> {
        match affinity.trim().to_ascii_uppercase().as_str() {
            "" | "RANDOM" | "NONE" => Some(AffinityMode::Random),
            "SAME_SUBZONE" => Some(AffinityMode::SameSubzone),
            "SAME_SUBZONE_CROSS_SWITCH" => Some(AffinityMode::SameSubzoneCrossSwitch),
            "CROSS_SUBZONE" => Some(AffinityMode::CrossSubzone { cross_switch }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AffinityMode::Random => "RANDOM",
            AffinityMode::SameSubzone => "SAME_SUBZONE",
            AffinityMode::SameSubzoneCrossSwitch => "SAME_SUBZONE_CROSS_SWITCH",
            AffinityMode::CrossSubzone { .. } => "CROSS_SUBZONE",
        }
    }

    /// Whether every selected host must share one subzone.
    pub fn is_same_subzone(&self) -> bool {
        matches!(self, AffinityMode::SameSubzone | AffinityMode::SameSubzoneCrossSwitch)
    }

    /// Whether the rack/switch exclusion rule applies.
    pub fn is_cross_switch(&self) -> bool {
        matches!(
            self,
            AffinityMode::SameSubzoneCrossSwitch | AffinityMode::CrossSubzone { cross_switch: true }
        )
    }
}

impl std::fmt::Display for AffinityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AffinityMode::CrossSubzone { cross_switch: true } => f.write_str("CROSS_SUBZONE+cross_switch"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// A validated request.
#[derive(Debug, Clone)]
pub struct Criteria {
    pub count: usize,
    pub mode: AffinityMode,
    pub strict: bool,
    /// Business id the caller asked for, if any (scored at P0).
    pub dedicated_biz: Option<u64>,
    /// Resource-type tag the caller asked for, if any (non-empty).
    pub resource_type: Option<String>,
    /// Store-side predicates, always restricted to `Unused`.
    pub filter: HostFilter,
}

impl Criteria {
    pub fn from_request(req: &MatchRequest) -> PlacementResult<Self> {
        if req.count <= 0 {
            return Err(PlacementError::Validation(format!(
                "count must be at least 1, got {}",
                req.count
            )));
        }
        let count = usize::try_from(req.count)
            .map_err(|_| PlacementError::Validation(format!("count {} is too large", req.count)))?;

        let affinity = req.affinity.as_deref().unwrap_or("");
        let mode = AffinityMode::parse(affinity, req.cross_switch)
            .ok_or_else(|| PlacementError::Validation(format!("unknown affinity '{affinity}'")))?;

        if !req.spec.cpu.is_valid() {
            return Err(PlacementError::Validation("cpu min exceeds max".to_string()));
        }
        if !req.spec.mem.is_valid() {
            return Err(PlacementError::Validation("mem min exceeds max".to_string()));
        }

        let mut disks = Vec::with_capacity(req.storage_specs.len());
        let mut mounts = BTreeSet::new();
        for spec in &req.storage_specs {
            let mount_point = spec.mount_point.trim();
            if mount_point.is_empty() {
                return Err(PlacementError::Validation(
                    "storage spec has an empty mount point".to_string(),
                ));
            }
            if !mounts.insert(mount_point.to_string()) {
                return Err(PlacementError::Validation(format!(
                    "mount point {mount_point} listed twice"
                )));
            }
            disks.push(DiskRequirement {
                mount_point: mount_point.to_string(),
                min_size: spec.min_size,
                disk_type: parse_disk_type(spec.disk_type.as_deref()),
            });
        }

        let os_type = match req.os_type.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                OsType::parse(raw)
                    .ok_or_else(|| PlacementError::Validation(format!("unknown os type '{raw}'")))?,
            ),
        };

        let resource_type = req
            .resource_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let filter = HostFilter {
            status: Some(HostStatus::Unused),
            device_classes: non_empty_set(&req.device_classes),
            cpu: req.spec.cpu,
            mem: req.spec.mem,
            disks,
            os_type,
            os_version: req
                .os_version
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            cities: non_empty_set(&req.city),
            subzones: non_empty_set(&req.subzones),
            dedicated_biz: Some(req.dedicated_biz_id.unwrap_or(hostpool_state::PUBLIC_BIZ)),
            resource_type: Some(resource_type.clone().unwrap_or_default()),
            labels_include: non_empty_set(&req.labels_include),
            labels_exclude: non_empty_set(&req.labels_exclude),
            exclude_ids: req.exclude_host_ids.iter().copied().collect(),
        };

        Ok(Self {
            count,
            mode,
            strict: req.strict,
            dedicated_biz: req.dedicated_biz_id,
            resource_type,
            filter,
        })
    }

    /// Number of disk slots the request describes.
    pub fn disk_slots(&self) -> usize {
        self.filter.disks.len()
    }

    /// Whether the request is tuned for redis hosts.
    pub fn is_redis(&self) -> bool {
        self.resource_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("redis"))
    }
}

fn parse_disk_type(raw: Option<&str>) -> Option<DiskType> {
    match raw.map(str::trim) {
        None | Some("") => None,
        Some(t) if t.eq_ignore_ascii_case("ALL") => None,
        Some(t) => Some(DiskType::normalize(t)),
    }
}

fn non_empty_set(values: &[String]) -> BTreeSet<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}
