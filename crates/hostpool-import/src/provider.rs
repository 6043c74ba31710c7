//! External catalog provider traits.
//!
//! Providers answer for a batch of hosts at a time. Hosts a provider does
//! not know are simply absent from its answer; only transport and decode
//! failures are errors.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use hostpool_state::{AgentStatus, HostId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed future returned by every provider call.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("timed out")]
    Timeout,
}

/// A host as described by the CMDB.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogHost {
    pub bk_host_id: HostId,
    pub ip: String,
    pub bk_cloud_id: u64,
    pub asset_id: String,
    pub cpu_num: u32,
    /// Memory in MB.
    pub dram_cap: u64,
    /// Total disk in MB.
    pub storage_cap: u64,
    pub city: String,
    pub sub_zone: String,
    pub rack_id: String,
    pub net_device_id: String,
    pub device_class: String,
    /// Numeric code or name, e.g. `"1"` or `"linux"`.
    pub os_type: String,
    pub os_bit: String,
    pub os_version: String,
    pub os_name: String,
    pub agent_status: AgentStatus,
    /// Whether the CMDB still places the host in the resource pool module.
    pub in_pool_module: bool,
}

/// One disk as reported by the job executor or the cloud API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDisk {
    pub mount_point: String,
    #[serde(default)]
    pub disk_id: String,
    /// Size in GB.
    pub size: u64,
    #[serde(default)]
    pub disk_type: String,
}

/// VM details from the cloud API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudVm {
    /// Memory in MB, when the cloud reports it.
    pub mem: Option<u64>,
    pub disks: Vec<RawDisk>,
}

/// The CMDB.
pub trait HostCatalog: Send + Sync {
    /// Describe the hosts among `ids` that the catalog knows.
    fn lookup<'a>(&'a self, ids: &'a [HostId]) -> ProviderFuture<'a, Vec<CatalogHost>>;
}

/// The job executor, which reads mount points off the machines.
pub trait DiskLayoutProvider: Send + Sync {
    fn disk_layout<'a>(
        &'a self,
        hosts: &'a [CatalogHost],
    ) -> ProviderFuture<'a, HashMap<HostId, Vec<RawDisk>>>;
}

/// The cloud API, for VMs whose disks and memory the CMDB under-reports.
pub trait CloudDiskProvider: Send + Sync {
    fn vm_info<'a>(&'a self, hosts: &'a [CatalogHost]) -> ProviderFuture<'a, HashMap<HostId, CloudVm>>;
}
