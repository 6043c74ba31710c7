//! redb table definitions for the inventory store.
//!
//! Record tables use `u64` keys and `&[u8]` values (JSON-serialized domain
//! types). Index tables map a composite `&str` key to the record key;
//! numeric components are zero-padded to 20 digits so lexical order equals
//! numeric order.

use redb::TableDefinition;

/// Host records keyed by `bk_host_id`.
pub const HOSTS: TableDefinition<u64, &[u8]> = TableDefinition::new("host_records");

/// Unique `(cloud_zone_id, ip)` index keyed by `{cloud_zone_id}:{ip}`.
pub const HOST_ADDRS: TableDefinition<&str, u64> = TableDefinition::new("host_addr_index");

/// Status-change log entries keyed by sequence number.
pub const STATUS_LOG: TableDefinition<u64, &[u8]> = TableDefinition::new("status_change_log");

/// Log index keyed by `{host_id:020}:{seq:020}`.
pub const STATUS_LOG_BY_HOST: TableDefinition<&str, u64> =
    TableDefinition::new("status_log_by_host");

/// Log index keyed by `{created_at:020}:{seq:020}`.
pub const STATUS_LOG_BY_TIME: TableDefinition<&str, u64> =
    TableDefinition::new("status_log_by_time");

/// Log index keyed by `{reason}:{seq:020}`.
pub const STATUS_LOG_BY_REASON: TableDefinition<&str, u64> =
    TableDefinition::new("status_log_by_reason");

/// Counters keyed by name.
pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Name of the status-log sequence counter in [`META`].
pub const STATUS_LOG_SEQ: &str = "status_log_seq";
