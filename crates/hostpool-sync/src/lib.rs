//! hostpool-sync — background status sync.
//!
//! Periodically checks every `Unused` host against the CMDB and moves the
//! ones that can no longer be handed out:
//!
//! | CMDB says                     | New status    | Reason                  |
//! |-------------------------------|---------------|-------------------------|
//! | host unknown                  | `FaultHazard` | `host_not_found_in_cc`  |
//! | agent abnormal                | `FaultHazard` | `agent_status_abnormal` |
//! | host left the pool module     | `UsedByOther` | `cc_module_not_allow`   |
//!
//! Updates are conditional on the host still being `Unused`, so a sweep
//! never disturbs a host a match has preselected in the meantime.

pub mod error;
pub mod sync;

pub use error::{SyncError, SyncResult};
pub use sync::{StatusSync, SyncReport};
