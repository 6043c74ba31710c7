//! Status sync loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hostpool_core::PoolConfig;
use hostpool_import::{CatalogHost, HostCatalog};
use hostpool_state::{
    AgentStatus, ChangeReason, HostId, HostRecord, HostStatus, InventoryStore, StatusUpdate,
    Transition,
};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::SyncResult;

const BATCH_SIZE: usize = 100;

/// Counts from one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub checked: usize,
    pub marked_fault: usize,
    pub marked_used_by_other: usize,
    /// Hosts that left `Unused` before their update landed.
    pub skipped: usize,
    /// Catalog batches or per-host updates that failed.
    pub failures: usize,
}

/// Reclassifies idle hosts against the CMDB.
#[derive(Clone)]
pub struct StatusSync {
    store: InventoryStore,
    catalog: Arc<dyn HostCatalog>,
    operator: String,
    batch_size: usize,
}

impl StatusSync {
    pub fn new(store: InventoryStore, catalog: Arc<dyn HostCatalog>, operator: impl Into<String>) -> Self {
        Self {
            store,
            catalog,
            operator: operator.into(),
            batch_size: BATCH_SIZE,
        }
    }

    pub fn from_config(store: InventoryStore, catalog: Arc<dyn HostCatalog>, config: &PoolConfig) -> Self {
        Self::new(store, catalog, config.sync.operator.clone()).with_batch_size(config.import.batch_size)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Check every `Unused` host once.
    ///
    /// A failed catalog batch or host update is logged and counted; the
    /// sweep carries on with the rest.
    pub async fn sweep(&self) -> SyncResult<SyncReport> {
        let hosts = self.store.find_by_status(HostStatus::Unused)?;
        let mut report = SyncReport::default();

        for batch in hosts.chunks(self.batch_size) {
            let ids: Vec<HostId> = batch.iter().map(|h| h.bk_host_id).collect();
            let known: HashMap<HostId, CatalogHost> = match self.catalog.lookup(&ids).await {
                Ok(found) => found.into_iter().map(|h| (h.bk_host_id, h)).collect(),
                Err(e) => {
                    warn!(error = %e, batch = ids.len(), "catalog lookup failed, skipping batch");
                    report.failures += 1;
                    continue;
                }
            };

            for host in batch {
                report.checked += 1;
                let Some((transition, reason, detail)) = classify(host, known.get(&host.bk_host_id)) else {
                    continue;
                };
                let update = StatusUpdate::new(vec![host.bk_host_id], transition, reason)
                    .detail(detail)
                    .operator(self.operator.as_str());
                match self.store.batch_update_status(&update) {
                    Ok(0) => {
                        debug!(host_id = host.bk_host_id, "host left unused during sync");
                        report.skipped += 1;
                    }
                    Ok(_) => {
                        info!(host_id = host.bk_host_id, ip = %host.ip, reason = reason.as_str(), "host reclassified");
                        match transition {
                            Transition::MarkUsedByOther => report.marked_used_by_other += 1,
                            _ => report.marked_fault += 1,
                        }
                    }
                    Err(e) => {
                        error!(host_id = host.bk_host_id, error = %e, "failed to reclassify host");
                        report.failures += 1;
                    }
                }
            }
        }

        debug!(?report, "sync sweep finished");
        Ok(report)
    }

    /// Sweep every `interval` until `shutdown` fires.
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "status sync started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "status sync sweep failed");
                    }
                }
                _ = shutdown.changed() => {
                    debug!("status sync shutting down");
                    break;
                }
            }
        }
    }
}

/// Decide whether an idle host must leave the pool, given the CMDB's view.
fn classify(
    host: &HostRecord,
    found: Option<&CatalogHost>,
) -> Option<(Transition, ChangeReason, String)> {
    let Some(found) = found else {
        return Some((
            Transition::MarkFaultHazard,
            ChangeReason::HostNotFoundInCc,
            format!("{} not found in cmdb", host.ip),
        ));
    };
    if found.agent_status == AgentStatus::Abnormal {
        return Some((
            Transition::MarkFaultHazard,
            ChangeReason::AgentStatusAbnormal,
            format!("{} agent abnormal", host.ip),
        ));
    }
    if !found.in_pool_module {
        return Some((
            Transition::MarkUsedByOther,
            ChangeReason::CcModuleNotAllow,
            format!("{} moved out of the resource pool module", host.ip),
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostpool_import::{ProviderError, ProviderFuture};
    use hostpool_state::OsType;
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeCatalog {
        hosts: HashMap<HostId, CatalogHost>,
        down: AtomicBool,
    }

    impl FakeCatalog {
        fn new(entries: Vec<CatalogHost>) -> Self {
            Self {
                hosts: entries.into_iter().map(|h| (h.bk_host_id, h)).collect(),
                down: AtomicBool::new(false),
            }
        }
    }

    impl HostCatalog for FakeCatalog {
        fn lookup<'a>(&'a self, ids: &'a [HostId]) -> ProviderFuture<'a, Vec<CatalogHost>> {
            Box::pin(async move {
                if self.down.load(Ordering::SeqCst) {
                    return Err(ProviderError::Timeout);
                }
                Ok(ids.iter().filter_map(|id| self.hosts.get(id).cloned()).collect())
            })
        }
    }

    fn record(id: HostId, status: HostStatus) -> HostRecord {
        HostRecord {
            bk_host_id: id,
            ip: format!("10.5.0.{id}"),
            bk_cloud_id: 0,
            asset_id: String::new(),
            cpu_num: 8,
            dram_cap: 16384,
            storage_cap: 0,
            storage_device: BTreeMap::new(),
            city: "shenzhen".to_string(),
            sub_zone: "sz-1".to_string(),
            rack_id: String::new(),
            net_device_id: String::new(),
            device_class: "S5".to_string(),
            os_type: OsType::Linux,
            os_bit: String::new(),
            os_version: String::new(),
            os_name: String::new(),
            dedicated_biz: 0,
            rs_type: String::new(),
            labels: BTreeSet::new(),
            operator: "admin".to_string(),
            status,
            agent_status: AgentStatus::Alive,
            reservation_id: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn seen(id: HostId, agent_status: AgentStatus, in_pool_module: bool) -> CatalogHost {
        CatalogHost {
            bk_host_id: id,
            ip: format!("10.5.0.{id}"),
            agent_status,
            in_pool_module,
            ..Default::default()
        }
    }

    fn fixture() -> (InventoryStore, Arc<FakeCatalog>) {
        let store = InventoryStore::open_in_memory().unwrap();
        store
            .insert_hosts(&[
                record(1, HostStatus::Unused),
                record(2, HostStatus::Unused),
                record(3, HostStatus::Unused),
                record(4, HostStatus::Unused),
                record(5, HostStatus::Used),
            ])
            .unwrap();
        let catalog = Arc::new(FakeCatalog::new(vec![
            seen(1, AgentStatus::Alive, true),
            seen(3, AgentStatus::Abnormal, true),
            seen(4, AgentStatus::Alive, false),
        ]));
        (store, catalog)
    }

    fn status_of(store: &InventoryStore, id: HostId) -> HostStatus {
        store.get_host(id).unwrap().unwrap().status
    }

    #[tokio::test]
    async fn sweep_reclassifies_idle_hosts() {
        let (store, catalog) = fixture();
        let sync = StatusSync::new(store.clone(), catalog, "sync-bot");

        let report = sync.sweep().await.unwrap();
        assert_eq!(report.checked, 4);
        assert_eq!(report.marked_fault, 2);
        assert_eq!(report.marked_used_by_other, 1);

        assert_eq!(status_of(&store, 1), HostStatus::Unused);
        assert_eq!(status_of(&store, 2), HostStatus::FaultHazard);
        assert_eq!(status_of(&store, 3), HostStatus::FaultHazard);
        assert_eq!(status_of(&store, 4), HostStatus::UsedByOther);
        assert_eq!(status_of(&store, 5), HostStatus::Used);

        let missing = &store.find_status_change_history(2, 1).unwrap()[0];
        assert_eq!(missing.reason, ChangeReason::HostNotFoundInCc);
        assert_eq!(missing.operator, "sync-bot");
        let abnormal = &store.find_status_change_history(3, 1).unwrap()[0];
        assert_eq!(abnormal.reason, ChangeReason::AgentStatusAbnormal);
        let moved = &store.find_status_change_history(4, 1).unwrap()[0];
        assert_eq!(moved.reason, ChangeReason::CcModuleNotAllow);
        assert!(store.find_status_change_history(5, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_sweep_is_quiet() {
        let (store, catalog) = fixture();
        let sync = StatusSync::new(store, catalog, "sync-bot");
        sync.sweep().await.unwrap();

        let report = sync.sweep().await.unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report, SyncReport { checked: 1, ..Default::default() });
    }

    #[tokio::test]
    async fn catalog_outage_changes_nothing() {
        let (store, catalog) = fixture();
        catalog.down.store(true, Ordering::SeqCst);
        let sync = StatusSync::new(store.clone(), catalog, "sync-bot").with_batch_size(2);

        let report = sync.sweep().await.unwrap();
        assert_eq!(report.failures, 2);
        assert_eq!(report.checked, 0);
        assert_eq!(store.find_by_status(HostStatus::Unused).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn run_sweeps_until_shutdown() {
        let (store, catalog) = fixture();
        let sync = StatusSync::new(store.clone(), catalog, "sync-bot");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(sync.run(Duration::from_millis(10), shutdown_rx));
        for _ in 0..100 {
            if status_of(&store, 4) == HostStatus::UsedByOther {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status_of(&store, 4), HostStatus::UsedByOther);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sync loop did not stop")
            .unwrap();
    }

    #[test]
    fn healthy_host_stays() {
        let host = record(1, HostStatus::Unused);
        assert!(classify(&host, Some(&seen(1, AgentStatus::Alive, true))).is_none());
        assert!(classify(&host, Some(&seen(1, AgentStatus::Unknown, true))).is_none());
    }
}
