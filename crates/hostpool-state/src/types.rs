//! Domain types for the inventory store.
//!
//! These types represent persisted host records and status-change log
//! entries. All types are serializable to/from JSON for storage in redb
//! tables.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Unique identifier of a host in the external catalog (`bk_host_id`).
pub type HostId = u64;

/// Dedicated-business id of the public pool.
pub const PUBLIC_BIZ: u64 = 0;

/// Resource-type tag of the public pool. An empty tag is also public.
pub const PUBLIC_RESOURCE_TYPE: &str = "PUBLIC";

// ── Status ─────────────────────────────────────────────────────────

/// Lifecycle status of a host in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HostStatus {
    Unused,
    Preselected,
    Used,
    UsedByOther,
    FaultHazard,
}

impl HostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostStatus::Unused => "Unused",
            HostStatus::Preselected => "Preselected",
            HostStatus::Used => "Used",
            HostStatus::UsedByOther => "UsedByOther",
            HostStatus::FaultHazard => "FaultHazard",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Unused" => Some(HostStatus::Unused),
            "Preselected" => Some(HostStatus::Preselected),
            "Used" => Some(HostStatus::Used),
            "UsedByOther" => Some(HostStatus::UsedByOther),
            "FaultHazard" => Some(HostStatus::FaultHazard),
            _ => None,
        }
    }
}

impl std::fmt::Display for HostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of legal status transitions.
///
/// ```text
/// Unused ──Preselect──▶ Preselected ──Confirm──▶ Used
///   │                        └──────Release────▶ Unused
///   ├──MarkUsedByOther──▶ UsedByOther
///   └──MarkFaultHazard──▶ FaultHazard
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Preselect,
    Confirm,
    Release,
    MarkUsedByOther,
    MarkFaultHazard,
}

impl Transition {
    pub fn source(&self) -> HostStatus {
        match self {
            Transition::Confirm | Transition::Release => HostStatus::Preselected,
            Transition::Preselect | Transition::MarkUsedByOther | Transition::MarkFaultHazard => {
                HostStatus::Unused
            }
        }
    }

    pub fn target(&self) -> HostStatus {
        match self {
            Transition::Preselect => HostStatus::Preselected,
            Transition::Confirm => HostStatus::Used,
            Transition::Release => HostStatus::Unused,
            Transition::MarkUsedByOther => HostStatus::UsedByOther,
            Transition::MarkFaultHazard => HostStatus::FaultHazard,
        }
    }

    /// Look up the transition for a `from → to` pair, if it is legal.
    pub fn between(from: HostStatus, to: HostStatus) -> Option<Self> {
        [
            Transition::Preselect,
            Transition::Confirm,
            Transition::Release,
            Transition::MarkUsedByOther,
            Transition::MarkFaultHazard,
        ]
        .into_iter()
        .find(|t| t.source() == from && t.target() == to)
    }

    /// Whether this transition ends a reservation hold.
    pub fn ends_hold(&self) -> bool {
        matches!(self, Transition::Confirm | Transition::Release)
    }
}

/// Agent liveness as reported by the host catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Alive,
    Abnormal,
    #[default]
    Unknown,
}

// ── Host ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OsType {
    Linux,
    Windows,
}

impl OsType {
    /// Parse either the catalog's numeric code or a name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "linux" => Some(OsType::Linux),
            "2" | "windows" => Some(OsType::Windows),
            _ => None,
        }
    }
}

/// Disk media type. Anything the loader does not recognize becomes `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiskType {
    Ssd,
    Hdd,
    Unknown,
}

impl DiskType {
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SSD" | "NVME" | "CLOUD_SSD" | "CLOUD_HSSD" => DiskType::Ssd,
            "HDD" | "SATA" | "SAS" | "CLOUD_BASIC" | "CLOUD_PREMIUM" => DiskType::Hdd,
            _ => DiskType::Unknown,
        }
    }
}

/// One disk attached at a mount point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskInfo {
    pub disk_id: String,
    /// Size in GB.
    pub size: u64,
    pub disk_type: DiskType,
}

/// A machine in the pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRecord {
    pub bk_host_id: HostId,
    pub ip: String,
    pub bk_cloud_id: u64,
    pub asset_id: String,

    pub cpu_num: u32,
    /// Memory in MB.
    pub dram_cap: u64,
    /// Total disk in MB.
    pub storage_cap: u64,
    /// Mount point → disk.
    #[serde(default)]
    pub storage_device: BTreeMap<String, DiskInfo>,

    pub city: String,
    pub sub_zone: String,
    pub rack_id: String,
    /// Comma-joined switch ids the NICs attach to.
    pub net_device_id: String,
    pub device_class: String,

    pub os_type: OsType,
    pub os_bit: String,
    pub os_version: String,
    pub os_name: String,

    pub dedicated_biz: u64,
    pub rs_type: String,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    pub operator: String,

    pub status: HostStatus,
    #[serde(default)]
    pub agent_status: AgentStatus,
    /// Token of the reservation holding this host while `Preselected`.
    #[serde(default)]
    pub reservation_id: Option<String>,
    /// Unix timestamp (seconds) when this record was created.
    pub created_at: u64,
    /// Unix timestamp (seconds) of the last change.
    pub updated_at: u64,
}

impl HostRecord {
    /// Build the key for the `(cloud_zone_id, ip)` unique index.
    pub fn addr_key(&self) -> String {
        addr_key(self.bk_cloud_id, &self.ip)
    }

    /// Switch ids parsed from `net_device_id`. Empty segments are dropped.
    pub fn switch_ids(&self) -> BTreeSet<String> {
        self.net_device_id
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn disk_slot_count(&self) -> usize {
        self.storage_device.len()
    }

    pub fn is_public_biz(&self) -> bool {
        self.dedicated_biz == PUBLIC_BIZ
    }

    pub fn is_public_resource_type(&self) -> bool {
        self.rs_type.is_empty() || self.rs_type.eq_ignore_ascii_case(PUBLIC_RESOURCE_TYPE)
    }
}

/// Build the `(cloud_zone_id, ip)` index key.
pub fn addr_key(bk_cloud_id: u64, ip: &str) -> String {
    format!("{bk_cloud_id}:{ip}")
}

// ── Status-change log ──────────────────────────────────────────────

/// Why a status transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    CcModuleNotAllow,
    HostNotFoundInCc,
    AgentStatusAbnormal,
    ManualUpdate,
    SystemError,
    /// Preselect / confirm / release performed by the reservation gate.
    Reservation,
}

impl ChangeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeReason::CcModuleNotAllow => "cc_module_not_allow",
            ChangeReason::HostNotFoundInCc => "host_not_found_in_cc",
            ChangeReason::AgentStatusAbnormal => "agent_status_abnormal",
            ChangeReason::ManualUpdate => "manual_update",
            ChangeReason::SystemError => "system_error",
            ChangeReason::Reservation => "reservation",
        }
    }
}

/// One append-only status-change log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Global sequence number, assigned by the store at append time.
    #[serde(default)]
    pub seq: u64,
    pub host_id: HostId,
    pub ip: String,
    pub from: HostStatus,
    pub to: HostStatus,
    pub reason: ChangeReason,
    pub detail: String,
    /// Snapshot of whatever the writer considered relevant (usually the
    /// host record before the change).
    #[serde(default)]
    pub context: serde_json::Value,
    pub operator: String,
    /// Unix timestamp (seconds).
    pub created_at: u64,
}

impl StatusChange {
    /// Key for the by-host index.
    pub fn host_index_key(&self) -> String {
        format!("{:020}:{:020}", self.host_id, self.seq)
    }

    /// Key for the by-time index.
    pub fn time_index_key(&self) -> String {
        format!("{:020}:{:020}", self.created_at, self.seq)
    }

    /// Key for the by-reason index.
    pub fn reason_index_key(&self) -> String {
        format!("{}:{:020}", self.reason.as_str(), self.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_is_closed() {
        use HostStatus::*;
        assert_eq!(Transition::between(Unused, Preselected), Some(Transition::Preselect));
        assert_eq!(Transition::between(Preselected, Used), Some(Transition::Confirm));
        assert_eq!(Transition::between(Preselected, Unused), Some(Transition::Release));
        assert_eq!(Transition::between(Unused, UsedByOther), Some(Transition::MarkUsedByOther));
        assert_eq!(Transition::between(Unused, FaultHazard), Some(Transition::MarkFaultHazard));

        assert_eq!(Transition::between(Unused, Used), None);
        assert_eq!(Transition::between(Used, Unused), None);
        assert_eq!(Transition::between(FaultHazard, Unused), None);
        assert_eq!(Transition::between(Preselected, FaultHazard), None);
    }

    #[test]
    fn status_parse_round_trips() {
        for s in [
            HostStatus::Unused,
            HostStatus::Preselected,
            HostStatus::Used,
            HostStatus::UsedByOther,
            HostStatus::FaultHazard,
        ] {
            assert_eq!(HostStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(HostStatus::parse("Gone"), None);
    }

    #[test]
    fn disk_type_normalizes_unknown() {
        assert_eq!(DiskType::normalize("ssd"), DiskType::Ssd);
        assert_eq!(DiskType::normalize("CLOUD_PREMIUM"), DiskType::Hdd);
        assert_eq!(DiskType::normalize("tape"), DiskType::Unknown);
        assert_eq!(DiskType::normalize(""), DiskType::Unknown);
    }

    #[test]
    fn os_type_accepts_codes_and_names() {
        assert_eq!(OsType::parse("1"), Some(OsType::Linux));
        assert_eq!(OsType::parse("Windows"), Some(OsType::Windows));
        assert_eq!(OsType::parse("aix"), None);
    }

    #[test]
    fn change_reason_serde_matches_as_str() {
        let json = serde_json::to_string(&ChangeReason::HostNotFoundInCc).unwrap();
        assert_eq!(json, "\"host_not_found_in_cc\"");
        assert_eq!(ChangeReason::CcModuleNotAllow.as_str(), "cc_module_not_allow");
    }

    #[test]
    fn labels_deserialize_deduplicated_and_default_empty() {
        let json = serde_json::json!({
            "bk_host_id": 1, "ip": "10.0.0.1", "bk_cloud_id": 0, "asset_id": "a",
            "cpu_num": 4, "dram_cap": 8192, "storage_cap": 0,
            "city": "sz", "sub_zone": "sz-1", "rack_id": "r1", "net_device_id": "",
            "device_class": "S5", "os_type": "Linux", "os_bit": "64", "os_version": "7.9",
            "os_name": "centos", "dedicated_biz": 0, "rs_type": "", "operator": "op",
            "status": "Unused", "created_at": 1, "updated_at": 1
        });
        let host: HostRecord = serde_json::from_value(json.clone()).unwrap();
        assert!(host.labels.is_empty());
        assert_eq!(serde_json::to_value(&host).unwrap()["labels"], serde_json::json!([]));

        let mut with_labels = json;
        with_labels["labels"] = serde_json::json!(["b", "a", "b"]);
        let host: HostRecord = serde_json::from_value(with_labels).unwrap();
        assert_eq!(serde_json::to_value(&host).unwrap()["labels"], serde_json::json!(["a", "b"]));
    }

    #[test]
    fn switch_ids_skip_empty_segments() {
        let json = serde_json::json!({
            "bk_host_id": 1, "ip": "10.0.0.1", "bk_cloud_id": 0, "asset_id": "a",
            "cpu_num": 4, "dram_cap": 8192, "storage_cap": 0,
            "city": "sz", "sub_zone": "sz-1", "rack_id": "r1", "net_device_id": "s1, ,s2,",
            "device_class": "S5", "os_type": "Linux", "os_bit": "64", "os_version": "7.9",
            "os_name": "centos", "dedicated_biz": 0, "rs_type": "", "operator": "op",
            "status": "Unused", "created_at": 1, "updated_at": 1
        });
        let host: HostRecord = serde_json::from_value(json).unwrap();
        let ids: Vec<String> = host.switch_ids().into_iter().collect();
        assert_eq!(ids, vec!["s1".to_string(), "s2".to_string()]);
    }
}
