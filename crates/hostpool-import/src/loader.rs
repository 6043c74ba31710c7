//! Host loader — validate, query, merge, insert.
//!
//! ```text
//! ImportRequest
//!   ├── validate: IPs parse, no duplicates in the request or the inventory
//!   └── per batch of host ids:
//!         HostCatalog::lookup ─────────▶ found / not_found
//!         DiskLayoutProvider::disk_layout (found)
//!         CloudDiskProvider::vm_info (found, optional)
//!         merge → HostRecord { status: Unused }
//! InventoryStore::insert_hosts (all records, one transaction)
//! ```
//!
//! Every external call is retried with a fixed delay; a batch that keeps
//! failing aborts the import before anything is written.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use hostpool_core::PoolConfig;
use hostpool_state::{
    DiskInfo, DiskType, HostId, HostRecord, HostStatus, InventoryStore, OsType, addr_key,
    epoch_secs,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ImportError, ImportResult};
use crate::http::{HttpCatalog, HttpCloudDisks, HttpDiskLayout};
use crate::provider::{
    CatalogHost, CloudDiskProvider, CloudVm, DiskLayoutProvider, HostCatalog, ProviderError, RawDisk,
};

const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_OPERATOR: &str = "hostpool";

// ── Request / outcome ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportHost {
    pub ip: String,
    pub host_id: HostId,
    #[serde(default)]
    pub cloud_zone_id: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportRequest {
    pub hosts: Vec<ImportHost>,
    pub dedicated_biz_id: u64,
    pub resource_type: String,
    pub labels: Vec<String>,
    pub operator: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub accepted: Vec<HostId>,
    pub not_found: Vec<HostId>,
}

// ── Retry ──────────────────────────────────────────────────────────

/// Fixed-delay retry for external calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &PoolConfig) -> Self {
        Self {
            max_attempts: config.import.max_attempts,
            delay: config.import_retry_delay(),
        }
    }

    async fn run<T, F, Fut>(&self, source_name: &'static str, mut call: F) -> ImportResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt < attempts => {
                    warn!(source = source_name, attempt, error = %error, "external call failed, retrying");
                    tokio::time::sleep(self.delay).await;
                }
                Err(error) => {
                    return Err(ImportError::ExternalCatalog {
                        source_name,
                        attempts: attempt,
                        error,
                    });
                }
            }
        }
    }
}

// ── Loader ─────────────────────────────────────────────────────────

/// Imports hosts from the external catalogs into the inventory.
#[derive(Clone)]
pub struct HostLoader {
    store: InventoryStore,
    catalog: Arc<dyn HostCatalog>,
    disks: Arc<dyn DiskLayoutProvider>,
    cloud: Option<Arc<dyn CloudDiskProvider>>,
    batch_size: usize,
    retry: RetryPolicy,
}

impl HostLoader {
    pub fn new(
        store: InventoryStore,
        catalog: Arc<dyn HostCatalog>,
        disks: Arc<dyn DiskLayoutProvider>,
    ) -> Self {
        Self {
            store,
            catalog,
            disks,
            cloud: None,
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::default(),
        }
    }

    /// Build a loader over the HTTP clients named in `[catalog]`.
    /// Returns `None` unless both the CMDB and job executor addresses are set.
    pub fn from_config(store: InventoryStore, config: &PoolConfig) -> Option<Self> {
        let timeout = config.catalog_timeout();
        let cmdb = config.catalog.cmdb_addr.as_deref()?;
        let job = config.catalog.job_addr.as_deref()?;
        let mut loader = Self::new(
            store,
            Arc::new(HttpCatalog::new(cmdb, timeout)),
            Arc::new(HttpDiskLayout::new(job, timeout)),
        )
        .with_batch_size(config.import.batch_size)
        .with_retry(RetryPolicy::from_config(config));
        if let Some(cloud) = config.catalog.cloud_addr.as_deref() {
            loader = loader.with_cloud(Arc::new(HttpCloudDisks::new(cloud, timeout)));
        }
        Some(loader)
    }

    pub fn with_cloud(mut self, cloud: Arc<dyn CloudDiskProvider>) -> Self {
        self.cloud = Some(cloud);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run one import. Nothing is written unless every batch succeeds.
    pub async fn import(&self, req: &ImportRequest) -> ImportResult<ImportOutcome> {
        self.validate(req)?;

        let ids: Vec<HostId> = req.hosts.iter().map(|h| h.host_id).collect();
        let mut records = Vec::with_capacity(ids.len());
        let mut not_found = Vec::new();

        for batch in ids.chunks(self.batch_size) {
            let wanted: HashSet<HostId> = batch.iter().copied().collect();
            let found: Vec<CatalogHost> = self
                .retry
                .run("host catalog", || self.catalog.lookup(batch))
                .await?
                .into_iter()
                .filter(|h| wanted.contains(&h.bk_host_id))
                .collect();

            let known: HashSet<HostId> = found.iter().map(|h| h.bk_host_id).collect();
            not_found.extend(batch.iter().filter(|id| !known.contains(id)));
            if found.is_empty() {
                continue;
            }

            let mut layouts = self
                .retry
                .run("disk layout", || self.disks.disk_layout(&found))
                .await?;
            let mut vms = match &self.cloud {
                Some(cloud) => self.retry.run("cloud api", || cloud.vm_info(&found)).await?,
                None => HashMap::new(),
            };
            debug!(batch = batch.len(), found = found.len(), "catalog batch loaded");

            for host in found {
                let id = host.bk_host_id;
                let disks = layouts.remove(&id).unwrap_or_default();
                records.push(merge(host, disks, vms.remove(&id), req));
            }
        }

        self.store.insert_hosts(&records)?;
        let accepted: Vec<HostId> = records.iter().map(|r| r.bk_host_id).collect();
        info!(
            accepted = accepted.len(),
            not_found = not_found.len(),
            biz = req.dedicated_biz_id,
            "hosts imported"
        );
        Ok(ImportOutcome {
            accepted,
            not_found,
        })
    }

    fn validate(&self, req: &ImportRequest) -> ImportResult<()> {
        if req.hosts.is_empty() {
            return Err(ImportError::Validation("no hosts to import".to_string()));
        }

        let mut ids = HashSet::new();
        let mut addrs = HashSet::new();
        for host in &req.hosts {
            if host.host_id == 0 {
                return Err(ImportError::Validation(format!(
                    "host {} has no host id",
                    host.ip
                )));
            }
            if host.ip.trim().parse::<IpAddr>().is_err() {
                return Err(ImportError::Validation(format!(
                    "host {} has invalid ip {:?}",
                    host.host_id, host.ip
                )));
            }
            if !ids.insert(host.host_id) {
                return Err(ImportError::Duplicate(format!(
                    "host id {} appears twice in the request",
                    host.host_id
                )));
            }
            if !addrs.insert(addr_key(host.cloud_zone_id, host.ip.trim())) {
                return Err(ImportError::Duplicate(format!(
                    "{}:{} appears twice in the request",
                    host.cloud_zone_id, host.ip
                )));
            }
        }

        for host in &req.hosts {
            if self.store.get_host(host.host_id)?.is_some() {
                return Err(ImportError::Duplicate(format!(
                    "host id {} is already in the pool",
                    host.host_id
                )));
            }
            if self
                .store
                .get_host_by_addr(host.cloud_zone_id, host.ip.trim())?
                .is_some()
            {
                return Err(ImportError::Duplicate(format!(
                    "{}:{} is already in the pool",
                    host.cloud_zone_id, host.ip
                )));
            }
        }
        Ok(())
    }
}

// ── Normalization ──────────────────────────────────────────────────

fn merge(host: CatalogHost, disks: Vec<RawDisk>, vm: Option<CloudVm>, req: &ImportRequest) -> HostRecord {
    let mut storage_device = storage_layout(disks);
    let mut dram_cap = host.dram_cap;
    if let Some(vm) = vm {
        // Cloud answers win for VMs.
        storage_device.extend(storage_layout(vm.disks));
        if let Some(mem) = vm.mem {
            dram_cap = mem;
        }
    }
    let storage_cap = if host.storage_cap > 0 {
        host.storage_cap
    } else {
        storage_device.values().map(|d| d.size * 1024).sum()
    };

    let os_type = normalize_os(&host);
    let labels: BTreeSet<String> = req
        .labels
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    let operator = if req.operator.trim().is_empty() {
        DEFAULT_OPERATOR.to_string()
    } else {
        req.operator.trim().to_string()
    };
    let now = epoch_secs();

    HostRecord {
        bk_host_id: host.bk_host_id,
        ip: host.ip.trim().to_string(),
        bk_cloud_id: host.bk_cloud_id,
        asset_id: host.asset_id,
        cpu_num: host.cpu_num,
        dram_cap,
        storage_cap,
        storage_device,
        city: host.city,
        sub_zone: host.sub_zone,
        rack_id: host.rack_id.trim().to_string(),
        net_device_id: host.net_device_id,
        device_class: host.device_class,
        os_type,
        os_bit: host.os_bit,
        os_version: host.os_version,
        os_name: host.os_name,
        dedicated_biz: req.dedicated_biz_id,
        rs_type: req.resource_type.trim().to_string(),
        labels,
        operator,
        status: HostStatus::Unused,
        agent_status: host.agent_status,
        reservation_id: None,
        created_at: now,
        updated_at: now,
    }
}

fn storage_layout(disks: Vec<RawDisk>) -> BTreeMap<String, DiskInfo> {
    disks
        .into_iter()
        .filter(|d| !d.mount_point.trim().is_empty())
        .map(|d| {
            (
                d.mount_point.trim().to_string(),
                DiskInfo {
                    disk_id: d.disk_id,
                    size: d.size,
                    disk_type: DiskType::normalize(&d.disk_type),
                },
            )
        })
        .collect()
}

fn normalize_os(host: &CatalogHost) -> OsType {
    if let Some(os) = OsType::parse(&host.os_type) {
        return os;
    }
    if host.os_name.to_ascii_lowercase().contains("windows") {
        return OsType::Windows;
    }
    debug!(host_id = host.bk_host_id, os_type = %host.os_type, "unrecognized os type, assuming linux");
    OsType::Linux
}
