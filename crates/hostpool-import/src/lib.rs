//! hostpool-import — the host descriptor loader.
//!
//! Imports machines into the inventory from three external sources:
//!
//! - [`HostCatalog`] (CMDB): identity, capacity, topology, OS, agent state
//! - [`DiskLayoutProvider`] (job executor): mount points and disks
//! - [`CloudDiskProvider`] (cloud API, optional): VM disks and memory
//!
//! Each source is a trait so the daemon can plug in the HTTP-JSON clients
//! in [`http`] and tests can plug in fakes. The [`HostLoader`] validates the
//! request, queries the sources in batches with retry, merges and
//! normalizes the answers, and inserts the hosts as `Unused` in one atomic
//! batch.

pub mod error;
pub mod http;
pub mod loader;
pub mod provider;

pub use error::{ImportError, ImportResult};
pub use http::{HttpCatalog, HttpCloudDisks, HttpDiskLayout};
pub use loader::{HostLoader, ImportHost, ImportOutcome, ImportRequest, RetryPolicy};
pub use provider::{
    CatalogHost, CloudDiskProvider, CloudVm, DiskLayoutProvider, HostCatalog, ProviderError,
    ProviderFuture, RawDisk,
};
