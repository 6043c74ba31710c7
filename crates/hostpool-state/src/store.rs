//! InventoryStore — redb-backed persistence for the host pool.
//!
//! Provides typed operations over host records and the status-change log.
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::{StateError, StateResult};
use crate::query::HostFilter;
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// A conditional status update over a set of hosts.
///
/// Only rows currently in `transition.source()` are touched. Transitions
/// that end a hold touch only rows held by the `reservation` token; without
/// a token they touch nothing.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub ids: Vec<HostId>,
    pub transition: Transition,
    pub reservation: Option<String>,
    pub reason: ChangeReason,
    pub detail: String,
    pub operator: String,
}

impl StatusUpdate {
    pub fn new(ids: Vec<HostId>, transition: Transition, reason: ChangeReason) -> Self {
        Self {
            ids,
            transition,
            reservation: None,
            reason,
            detail: String::new(),
            operator: String::new(),
        }
    }

    pub fn reservation(mut self, token: impl Into<String>) -> Self {
        self.reservation = Some(token.into());
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = operator.into();
        self
    }
}

/// Thread-safe inventory store backed by redb.
#[derive(Clone)]
pub struct InventoryStore {
    db: Arc<Database>,
}

impl InventoryStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "inventory store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory inventory store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(HOSTS).map_err(map_err!(Table))?;
        txn.open_table(HOST_ADDRS).map_err(map_err!(Table))?;
        txn.open_table(STATUS_LOG).map_err(map_err!(Table))?;
        txn.open_table(STATUS_LOG_BY_HOST).map_err(map_err!(Table))?;
        txn.open_table(STATUS_LOG_BY_TIME).map_err(map_err!(Table))?;
        txn.open_table(STATUS_LOG_BY_REASON).map_err(map_err!(Table))?;
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Hosts ──────────────────────────────────────────────────────

    /// Insert a new host. Fails with `Duplicate` if the id or the
    /// `(cloud_zone_id, ip)` pair is already present.
    pub fn insert_host(&self, host: &HostRecord) -> StateResult<()> {
        self.insert_hosts(std::slice::from_ref(host))
    }

    /// Insert a batch of hosts in one transaction. Either every host is
    /// written or none is.
    pub fn insert_hosts(&self, hosts: &[HostRecord]) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let result = Self::insert_in(&txn, hosts);
        if let Err(e) = result {
            txn.abort().map_err(map_err!(Transaction))?;
            return Err(e);
        }
        txn.commit().map_err(map_err!(Transaction))?;
        info!(
            target: "audit",
            count = hosts.len(),
            ids = ?hosts.iter().map(|h| h.bk_host_id).collect::<Vec<_>>(),
            "hosts inserted"
        );
        Ok(())
    }

    fn insert_in(txn: &WriteTransaction, hosts: &[HostRecord]) -> StateResult<()> {
        let mut table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
        let mut addrs = txn.open_table(HOST_ADDRS).map_err(map_err!(Table))?;
        for host in hosts {
            let key = host.addr_key();
            if table.get(host.bk_host_id).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::Duplicate(format!("host id {}", host.bk_host_id)));
            }
            if addrs.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::Duplicate(format!("address {key}")));
            }
            let value = encode(host)?;
            table
                .insert(host.bk_host_id, value.as_slice())
                .map_err(map_err!(Write))?;
            addrs
                .insert(key.as_str(), host.bk_host_id)
                .map_err(map_err!(Write))?;
        }
        Ok(())
    }

    /// Replace an existing host record. `updated_at` is stamped by the store.
    pub fn update_host(&self, host: &HostRecord) -> StateResult<HostRecord> {
        let mut updated = host.clone();
        updated.updated_at = epoch_secs();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
            let mut addrs = txn.open_table(HOST_ADDRS).map_err(map_err!(Table))?;

            let previous: HostRecord = match table.get(host.bk_host_id).map_err(map_err!(Read))? {
                Some(guard) => decode(guard.value())?,
                None => return Err(StateError::NotFound(format!("host {}", host.bk_host_id))),
            };

            let old_key = previous.addr_key();
            let new_key = updated.addr_key();
            if old_key != new_key {
                if let Some(owner) = addrs.get(new_key.as_str()).map_err(map_err!(Read))? {
                    if owner.value() != host.bk_host_id {
                        return Err(StateError::Duplicate(format!("address {new_key}")));
                    }
                }
                addrs.remove(old_key.as_str()).map_err(map_err!(Write))?;
                addrs
                    .insert(new_key.as_str(), host.bk_host_id)
                    .map_err(map_err!(Write))?;
            }

            let value = encode(&updated)?;
            table
                .insert(host.bk_host_id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        info!(target: "audit", host_id = host.bk_host_id, "host updated");
        Ok(updated)
    }

    pub fn get_host(&self, id: HostId) -> StateResult<Option<HostRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Look up a host by `(cloud_zone_id, ip)`.
    pub fn get_host_by_addr(&self, bk_cloud_id: u64, ip: &str) -> StateResult<Option<HostRecord>> {
        let key = addr_key(bk_cloud_id, ip);
        let id = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let addrs = txn.open_table(HOST_ADDRS).map_err(map_err!(Table))?;
            match addrs.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => guard.value(),
                None => return Ok(None),
            }
        };
        self.get_host(id)
    }

    /// All hosts in id order.
    pub fn list_hosts(&self) -> StateResult<Vec<HostRecord>> {
        self.find_by_filter(&HostFilter::default())
    }

    /// Delete a host and its address index entry. Returns true if it
    /// existed. Log entries are kept.
    pub fn delete_host(&self, id: HostId) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
            let mut addrs = txn.open_table(HOST_ADDRS).map_err(map_err!(Table))?;
            let removed: Option<HostRecord> = match table.remove(id).map_err(map_err!(Write))? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            if let Some(ref host) = removed {
                addrs
                    .remove(host.addr_key().as_str())
                    .map_err(map_err!(Write))?;
            }
            existed = removed.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        info!(target: "audit", host_id = id, existed, "host deleted");
        Ok(existed)
    }

    /// Hosts with the given ids, in the order given. Unknown ids are skipped.
    pub fn find_by_ids(&self, ids: &[HostId]) -> StateResult<Vec<HostRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
        let mut results = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(guard) = table.get(id).map_err(map_err!(Read))? {
                results.push(decode(guard.value())?);
            }
        }
        Ok(results)
    }

    pub fn find_by_status(&self, status: HostStatus) -> StateResult<Vec<HostRecord>> {
        self.find_by_filter(&HostFilter::with_status(status))
    }

    /// Every host matching all predicates of `filter`, in id order.
    pub fn find_by_filter(&self, filter: &HostFilter) -> StateResult<Vec<HostRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let host: HostRecord = decode(value.value())?;
            if filter.matches(&host) {
                results.push(host);
            }
        }
        Ok(results)
    }

    /// Ids of the hosts currently held by a reservation token.
    pub fn find_by_reservation(&self, token: &str) -> StateResult<Vec<HostId>> {
        let held = self.find_by_filter(&HostFilter::with_status(HostStatus::Preselected))?;
        Ok(held
            .into_iter()
            .filter(|h| h.reservation_id.as_deref() == Some(token))
            .map(|h| h.bk_host_id)
            .collect())
    }

    // ── Status transitions ─────────────────────────────────────────

    /// Apply `update` to every listed host still in the transition's source
    /// status. Hosts in any other status are left alone. Returns the number
    /// of rows changed; each changed row gets a log entry in the same
    /// transaction.
    pub fn batch_update_status(&self, update: &StatusUpdate) -> StateResult<usize> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let affected = Self::update_in(&txn, update)?;
        txn.commit().map_err(map_err!(Transaction))?;
        audit_update(update, affected);
        Ok(affected)
    }

    /// Like [`batch_update_status`](Self::batch_update_status), but commits
    /// only if every listed host was changed. On a short count the
    /// transaction is aborted and the (short) count is returned.
    pub fn batch_update_status_all_or_none(&self, update: &StatusUpdate) -> StateResult<usize> {
        let wanted = update.ids.iter().collect::<HashSet<_>>().len();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let affected = Self::update_in(&txn, update)?;
        if affected != wanted {
            txn.abort().map_err(map_err!(Transaction))?;
            debug!(
                transition = ?update.transition,
                wanted,
                affected,
                "all-or-none status update aborted"
            );
            return Ok(affected);
        }
        txn.commit().map_err(map_err!(Transaction))?;
        audit_update(update, affected);
        Ok(affected)
    }

    fn update_in(txn: &WriteTransaction, update: &StatusUpdate) -> StateResult<usize> {
        let now = epoch_secs();
        let from = update.transition.source();
        let to = update.transition.target();
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        {
            let mut table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
            for &id in &update.ids {
                if !seen.insert(id) {
                    continue;
                }
                let before: HostRecord = match table.get(id).map_err(map_err!(Read))? {
                    Some(guard) => decode(guard.value())?,
                    None => continue,
                };
                if before.status != from {
                    continue;
                }
                if update.transition.ends_hold() && before.reservation_id != update.reservation {
                    continue;
                }

                let mut after = before.clone();
                after.status = to;
                after.updated_at = now;
                after.reservation_id = match update.transition {
                    Transition::Preselect => update.reservation.clone(),
                    _ => None,
                };
                let value = encode(&after)?;
                table.insert(id, value.as_slice()).map_err(map_err!(Write))?;

                entries.push(StatusChange {
                    seq: 0,
                    host_id: id,
                    ip: before.ip.clone(),
                    from,
                    to,
                    reason: update.reason,
                    detail: update.detail.clone(),
                    context: serde_json::to_value(&before).map_err(map_err!(Serialize))?,
                    operator: update.operator.clone(),
                    created_at: now,
                });
            }
        }
        let affected = entries.len();
        append_log(txn, &mut entries)?;
        Ok(affected)
    }

    // ── Status-change log ──────────────────────────────────────────

    /// Append one log entry. The returned entry carries its sequence number.
    pub fn log_status_change(&self, entry: StatusChange) -> StateResult<StatusChange> {
        let mut entries = self.batch_log_status_change(vec![entry])?;
        entries
            .pop()
            .ok_or_else(|| StateError::Write("log append returned no entry".to_string()))
    }

    /// Append several log entries in one transaction, in the order given.
    pub fn batch_log_status_change(
        &self,
        mut entries: Vec<StatusChange>,
    ) -> StateResult<Vec<StatusChange>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        append_log(&txn, &mut entries)?;
        txn.commit().map_err(map_err!(Transaction))?;
        info!(target: "audit", count = entries.len(), "status changes logged");
        Ok(entries)
    }

    /// Most recent log entries for a host, newest first.
    pub fn find_status_change_history(
        &self,
        host_id: HostId,
        limit: usize,
    ) -> StateResult<Vec<StatusChange>> {
        let lo = format!("{host_id:020}:");
        let hi = format!("{host_id:020};");
        self.scan_index(STATUS_LOG_BY_HOST, &lo, &hi, true, limit)
    }

    /// Most recent log entries with the given reason, newest first.
    pub fn find_status_changes_by_reason(
        &self,
        reason: ChangeReason,
        limit: usize,
    ) -> StateResult<Vec<StatusChange>> {
        let lo = format!("{}:", reason.as_str());
        let hi = format!("{};", reason.as_str());
        self.scan_index(STATUS_LOG_BY_REASON, &lo, &hi, true, limit)
    }

    /// Log entries created in `[from, to]` (unix seconds), oldest first.
    pub fn list_status_changes_between(&self, from: u64, to: u64) -> StateResult<Vec<StatusChange>> {
        if from > to {
            return Ok(Vec::new());
        }
        let lo = format!("{from:020}:");
        let hi = format!("{to:020};");
        self.scan_index(STATUS_LOG_BY_TIME, &lo, &hi, false, usize::MAX)
    }

    fn scan_index(
        &self,
        index: TableDefinition<'static, &'static str, u64>,
        lo: &str,
        hi: &str,
        newest_first: bool,
        limit: usize,
    ) -> StateResult<Vec<StatusChange>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let index = txn.open_table(index).map_err(map_err!(Table))?;
        let log = txn.open_table(STATUS_LOG).map_err(map_err!(Table))?;

        let range = index.range(lo..hi).map_err(map_err!(Read))?;
        let seqs: Vec<u64> = if newest_first {
            range
                .rev()
                .take(limit)
                .map(|entry| entry.map(|(_, seq)| seq.value()))
                .collect::<Result<_, _>>()
                .map_err(map_err!(Read))?
        } else {
            range
                .take(limit)
                .map(|entry| entry.map(|(_, seq)| seq.value()))
                .collect::<Result<_, _>>()
                .map_err(map_err!(Read))?
        };

        let mut results = Vec::with_capacity(seqs.len());
        for seq in seqs {
            if let Some(guard) = log.get(seq).map_err(map_err!(Read))? {
                results.push(decode(guard.value())?);
            }
        }
        Ok(results)
    }
}

/// Assign sequence numbers and write entries plus their index rows.
fn append_log(txn: &WriteTransaction, entries: &mut [StatusChange]) -> StateResult<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
    let mut log = txn.open_table(STATUS_LOG).map_err(map_err!(Table))?;
    let mut by_host = txn.open_table(STATUS_LOG_BY_HOST).map_err(map_err!(Table))?;
    let mut by_time = txn.open_table(STATUS_LOG_BY_TIME).map_err(map_err!(Table))?;
    let mut by_reason = txn
        .open_table(STATUS_LOG_BY_REASON)
        .map_err(map_err!(Table))?;

    let mut seq = meta
        .get(STATUS_LOG_SEQ)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0);

    for entry in entries.iter_mut() {
        seq += 1;
        entry.seq = seq;
        let value = encode(entry)?;
        log.insert(seq, value.as_slice()).map_err(map_err!(Write))?;
        by_host
            .insert(entry.host_index_key().as_str(), seq)
            .map_err(map_err!(Write))?;
        by_time
            .insert(entry.time_index_key().as_str(), seq)
            .map_err(map_err!(Write))?;
        by_reason
            .insert(entry.reason_index_key().as_str(), seq)
            .map_err(map_err!(Write))?;
    }
    meta.insert(STATUS_LOG_SEQ, seq).map_err(map_err!(Write))?;
    Ok(())
}

fn audit_update(update: &StatusUpdate, affected: usize) {
    info!(
        target: "audit",
        transition = ?update.transition,
        reason = update.reason.as_str(),
        operator = %update.operator,
        reservation = update.reservation.as_deref().unwrap_or(""),
        requested = update.ids.len(),
        affected,
        "host status updated"
    );
}

fn encode<T: Serialize>(value: &T) -> StateResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(map_err!(Serialize))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

/// Current unix time in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn test_host(id: HostId, ip: &str) -> HostRecord {
        let mut storage_device = BTreeMap::new();
        storage_device.insert(
            "/data".to_string(),
            DiskInfo {
                disk_id: "d1".to_string(),
                size: 500,
                disk_type: DiskType::Ssd,
            },
        );
        HostRecord {
            bk_host_id: id,
            ip: ip.to_string(),
            bk_cloud_id: 0,
            asset_id: format!("asset-{id}"),
            cpu_num: 8,
            dram_cap: 16384,
            storage_cap: 512000,
            storage_device,
            city: "shenzhen".to_string(),
            sub_zone: "sz-1".to_string(),
            rack_id: format!("r{id}"),
            net_device_id: format!("sw{id}"),
            device_class: "S5.LARGE".to_string(),
            os_type: OsType::Linux,
            os_bit: "64-bit".to_string(),
            os_version: "7.9".to_string(),
            os_name: "centos".to_string(),
            dedicated_biz: 0,
            rs_type: String::new(),
            labels: BTreeSet::new(),
            operator: "admin".to_string(),
            status: HostStatus::Unused,
            agent_status: AgentStatus::Alive,
            reservation_id: None,
            created_at: 1000,
            updated_at: 1000,
        }
    }

    fn seeded(n: u64) -> InventoryStore {
        let store = InventoryStore::open_in_memory().unwrap();
        let hosts: Vec<_> = (1..=n)
            .map(|id| test_host(id, &format!("10.0.0.{id}")))
            .collect();
        store.insert_hosts(&hosts).unwrap();
        store
    }

    fn log_entry(host_id: HostId, reason: ChangeReason, created_at: u64) -> StatusChange {
        StatusChange {
            seq: 0,
            host_id,
            ip: format!("10.0.0.{host_id}"),
            from: HostStatus::Unused,
            to: HostStatus::FaultHazard,
            reason,
            detail: String::new(),
            context: serde_json::Value::Null,
            operator: "tester".to_string(),
            created_at,
        }
    }

    // ── Host CRUD ──────────────────────────────────────────────────

    #[test]
    fn insert_and_find_by_ids_round_trip() {
        let store = InventoryStore::open_in_memory().unwrap();
        let host = test_host(7, "10.0.0.7");
        store.insert_host(&host).unwrap();

        let found = store.find_by_ids(&[7]).unwrap();
        assert_eq!(found, vec![host]);
    }

    #[test]
    fn find_by_ids_keeps_order_and_skips_unknown() {
        let store = seeded(3);
        let found = store.find_by_ids(&[3, 99, 1]).unwrap();
        let ids: Vec<_> = found.iter().map(|h| h.bk_host_id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let store = seeded(1);
        let err = store.insert_host(&test_host(1, "10.9.9.9")).unwrap_err();
        assert!(matches!(err, StateError::Duplicate(_)));
    }

    #[test]
    fn duplicate_address_is_rejected() {
        let store = seeded(1);
        let err = store.insert_host(&test_host(2, "10.0.0.1")).unwrap_err();
        assert!(matches!(err, StateError::Duplicate(_)));

        // Same IP in another cloud zone is fine.
        let mut other_zone = test_host(2, "10.0.0.1");
        other_zone.bk_cloud_id = 3;
        store.insert_host(&other_zone).unwrap();
    }

    #[test]
    fn insert_hosts_is_atomic() {
        let store = seeded(1);
        let batch = vec![test_host(2, "10.0.0.2"), test_host(3, "10.0.0.1")];
        assert!(store.insert_hosts(&batch).is_err());
        assert!(store.get_host(2).unwrap().is_none());
        assert_eq!(store.list_hosts().unwrap().len(), 1);
    }

    #[test]
    fn update_host_moves_address_index() {
        let store = seeded(2);
        let mut host = store.get_host(1).unwrap().unwrap();
        host.ip = "10.1.1.1".to_string();
        host.labels.insert("ssd".to_string());
        store.update_host(&host).unwrap();

        assert!(store.get_host_by_addr(0, "10.0.0.1").unwrap().is_none());
        let moved = store.get_host_by_addr(0, "10.1.1.1").unwrap().unwrap();
        assert!(moved.labels.contains("ssd"));

        host.ip = "10.0.0.2".to_string();
        assert!(matches!(store.update_host(&host), Err(StateError::Duplicate(_))));
    }

    #[test]
    fn update_missing_host_is_not_found() {
        let store = InventoryStore::open_in_memory().unwrap();
        let err = store.update_host(&test_host(5, "10.0.0.5")).unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    #[test]
    fn delete_host_frees_address() {
        let store = seeded(1);
        assert!(store.delete_host(1).unwrap());
        assert!(!store.delete_host(1).unwrap());
        store.insert_host(&test_host(9, "10.0.0.1")).unwrap();
    }

    #[test]
    fn find_by_status_filters() {
        let store = seeded(3);
        let update = StatusUpdate::new(vec![2], Transition::MarkFaultHazard, ChangeReason::ManualUpdate);
        assert_eq!(store.batch_update_status(&update).unwrap(), 1);

        let unused: Vec<_> = store
            .find_by_status(HostStatus::Unused)
            .unwrap()
            .into_iter()
            .map(|h| h.bk_host_id)
            .collect();
        assert_eq!(unused, vec![1, 3]);
        assert_eq!(store.find_by_status(HostStatus::FaultHazard).unwrap().len(), 1);
    }

    // ── Conditional updates ────────────────────────────────────────

    #[test]
    fn conditional_update_skips_other_statuses() {
        let store = seeded(3);
        let mark = StatusUpdate::new(vec![1], Transition::MarkUsedByOther, ChangeReason::CcModuleNotAllow);
        store.batch_update_status(&mark).unwrap();

        let preselect = StatusUpdate::new(vec![1, 2, 3], Transition::Preselect, ChangeReason::Reservation)
            .reservation("rsv-1");
        assert_eq!(store.batch_update_status(&preselect).unwrap(), 2);

        let host = store.get_host(2).unwrap().unwrap();
        assert_eq!(host.status, HostStatus::Preselected);
        assert_eq!(host.reservation_id.as_deref(), Some("rsv-1"));
        assert_eq!(store.get_host(1).unwrap().unwrap().status, HostStatus::UsedByOther);
    }

    #[test]
    fn all_or_none_aborts_on_short_count() {
        let store = seeded(3);
        let mark = StatusUpdate::new(vec![3], Transition::MarkFaultHazard, ChangeReason::AgentStatusAbnormal);
        store.batch_update_status(&mark).unwrap();
        let log_before = store.list_status_changes_between(0, u64::MAX).unwrap().len();

        let preselect = StatusUpdate::new(vec![1, 2, 3], Transition::Preselect, ChangeReason::Reservation)
            .reservation("rsv-x");
        assert_eq!(store.batch_update_status_all_or_none(&preselect).unwrap(), 2);

        // Nothing was held and nothing was logged.
        assert_eq!(store.find_by_status(HostStatus::Unused).unwrap().len(), 2);
        assert!(store.find_by_reservation("rsv-x").unwrap().is_empty());
        assert_eq!(
            store.list_status_changes_between(0, u64::MAX).unwrap().len(),
            log_before
        );
    }

    #[test]
    fn all_or_none_ignores_repeated_ids() {
        let store = seeded(2);
        let preselect = StatusUpdate::new(vec![1, 2, 1], Transition::Preselect, ChangeReason::Reservation)
            .reservation("rsv-d");
        assert_eq!(store.batch_update_status_all_or_none(&preselect).unwrap(), 2);
        assert_eq!(store.find_by_reservation("rsv-d").unwrap(), vec![1, 2]);
    }

    #[test]
    fn release_requires_matching_token() {
        let store = seeded(2);
        let preselect = StatusUpdate::new(vec![1, 2], Transition::Preselect, ChangeReason::Reservation)
            .reservation("mine");
        store.batch_update_status(&preselect).unwrap();

        let wrong = StatusUpdate::new(vec![1, 2], Transition::Release, ChangeReason::Reservation)
            .reservation("theirs");
        assert_eq!(store.batch_update_status(&wrong).unwrap(), 0);

        let right = StatusUpdate::new(vec![1, 2], Transition::Release, ChangeReason::Reservation)
            .reservation("mine");
        assert_eq!(store.batch_update_status(&right).unwrap(), 2);
        let host = store.get_host(1).unwrap().unwrap();
        assert_eq!(host.status, HostStatus::Unused);
        assert!(host.reservation_id.is_none());

        // Releasing again is a no-op.
        assert_eq!(store.batch_update_status(&right).unwrap(), 0);
    }

    #[test]
    fn ending_a_hold_without_its_token_changes_nothing() {
        let store = seeded(2);
        let preselect = StatusUpdate::new(vec![1, 2], Transition::Preselect, ChangeReason::Reservation)
            .reservation("held");
        store.batch_update_status(&preselect).unwrap();

        let release = StatusUpdate::new(vec![1], Transition::Release, ChangeReason::ManualUpdate);
        assert_eq!(store.batch_update_status(&release).unwrap(), 0);
        let confirm = StatusUpdate::new(vec![2], Transition::Confirm, ChangeReason::ManualUpdate);
        assert_eq!(store.batch_update_status(&confirm).unwrap(), 0);

        assert_eq!(store.find_by_reservation("held").unwrap(), vec![1, 2]);
        assert_eq!(store.find_by_status(HostStatus::Preselected).unwrap().len(), 2);
    }

    #[test]
    fn every_transition_is_logged_with_prior_snapshot() {
        let store = seeded(1);
        let preselect = StatusUpdate::new(vec![1], Transition::Preselect, ChangeReason::Reservation)
            .reservation("r")
            .operator("alice");
        store.batch_update_status(&preselect).unwrap();
        let confirm = StatusUpdate::new(vec![1], Transition::Confirm, ChangeReason::Reservation)
            .reservation("r")
            .operator("alice");
        store.batch_update_status(&confirm).unwrap();

        let history = store.find_status_change_history(1, 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].to, HostStatus::Used);
        assert_eq!(history[0].from, HostStatus::Preselected);
        assert_eq!(history[0].context["status"], "Preselected");
        assert_eq!(history[1].to, HostStatus::Preselected);
        assert_eq!(history[0].operator, "alice");
        assert!(history[0].seq > history[1].seq);
    }

    // ── Log ────────────────────────────────────────────────────────

    #[test]
    fn log_then_history_of_one_returns_it() {
        let store = seeded(1);
        let logged = store
            .log_status_change(log_entry(1, ChangeReason::HostNotFoundInCc, 500))
            .unwrap();
        assert!(logged.seq > 0);

        let history = store.find_status_change_history(1, 1).unwrap();
        assert_eq!(history, vec![logged]);
    }

    #[test]
    fn history_is_per_host_and_limited() {
        let store = InventoryStore::open_in_memory().unwrap();
        let entries = vec![
            log_entry(1, ChangeReason::ManualUpdate, 10),
            log_entry(2, ChangeReason::ManualUpdate, 11),
            log_entry(1, ChangeReason::SystemError, 12),
            log_entry(1, ChangeReason::ManualUpdate, 13),
        ];
        let logged = store.batch_log_status_change(entries).unwrap();
        let seqs: Vec<_> = logged.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);

        let history = store.find_status_change_history(1, 2).unwrap();
        let created: Vec<_> = history.iter().map(|e| e.created_at).collect();
        assert_eq!(created, vec![13, 12]);
        assert!(store.find_status_change_history(3, 10).unwrap().is_empty());
    }

    #[test]
    fn log_queries_by_reason_and_time() {
        let store = InventoryStore::open_in_memory().unwrap();
        store
            .batch_log_status_change(vec![
                log_entry(1, ChangeReason::AgentStatusAbnormal, 100),
                log_entry(2, ChangeReason::CcModuleNotAllow, 200),
                log_entry(3, ChangeReason::AgentStatusAbnormal, 300),
            ])
            .unwrap();

        let abnormal = store
            .find_status_changes_by_reason(ChangeReason::AgentStatusAbnormal, 10)
            .unwrap();
        let ids: Vec<_> = abnormal.iter().map(|e| e.host_id).collect();
        assert_eq!(ids, vec![3, 1]);

        let window = store.list_status_changes_between(150, 300).unwrap();
        let ids: Vec<_> = window.iter().map(|e| e.host_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert!(store.list_status_changes_between(300, 100).unwrap().is_empty());
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("inventory.redb");

        {
            let store = InventoryStore::open(&db_path).unwrap();
            store.insert_host(&test_host(1, "10.0.0.1")).unwrap();
            store
                .log_status_change(log_entry(1, ChangeReason::ManualUpdate, 10))
                .unwrap();
        }

        let store = InventoryStore::open(&db_path).unwrap();
        assert!(store.get_host(1).unwrap().is_some());
        let next = store
            .log_status_change(log_entry(1, ChangeReason::ManualUpdate, 11))
            .unwrap();
        assert_eq!(next.seq, 2);
    }

    #[test]
    fn empty_store_operations() {
        let store = InventoryStore::open_in_memory().unwrap();
        assert!(store.list_hosts().unwrap().is_empty());
        assert!(store.find_by_ids(&[1, 2]).unwrap().is_empty());
        assert!(store.find_status_change_history(1, 5).unwrap().is_empty());
        assert!(!store.delete_host(1).unwrap());
        let update = StatusUpdate::new(vec![1], Transition::Confirm, ChangeReason::Reservation);
        assert_eq!(store.batch_update_status(&update).unwrap(), 0);
    }
}
