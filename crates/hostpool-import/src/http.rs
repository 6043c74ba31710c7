//! HTTP-JSON provider clients.
//!
//! Each client POSTs a JSON body to a fixed path on its catalog address
//! and decodes a JSON answer. One connection per call, bounded by the
//! configured timeout.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hostpool_state::HostId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::provider::{
    CatalogHost, CloudDiskProvider, CloudVm, DiskLayoutProvider, HostCatalog, ProviderError,
    ProviderFuture, RawDisk,
};

const USER_AGENT: &str = "hostpool-import/0.1";

/// POST `body` as JSON to `http://{addr}{path}` and decode the answer.
/// The request line carries only `path`; `addr` goes in the `Host` header.
async fn post_json<B, R>(addr: &str, path: &str, body: &B, timeout: Duration) -> Result<R, ProviderError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let uri = format!("http://{addr}{path}");
    let payload =
        serde_json::to_vec(body).map_err(|e| ProviderError::Decode(format!("encode: {e}")))?;

    let exchange = async {
        let stream = tokio::net::TcpStream::connect(addr)
            .await
            .map_err(|e| ProviderError::Connect(e.to_string()))?;
        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ProviderError::Connect(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "catalog connection closed with error");
            }
        });

        let req = http::Request::builder()
            .method(http::Method::POST)
            .uri(path)
            .header(http::header::HOST, addr)
            .header(http::header::CONTENT_TYPE, "application/json")
            .header(http::header::USER_AGENT, USER_AGENT)
            .body(Full::new(Bytes::from(payload)))
            .map_err(|e| ProviderError::Connect(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ProviderError::Connect(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            debug!(%status, %uri, "catalog returned non-2xx");
            return Err(ProviderError::Status(status.as_u16()));
        }
        let bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ProviderError::Connect(e.to_string()))?
            .to_bytes();
        serde_json::from_slice(&bytes).map_err(|e| ProviderError::Decode(e.to_string()))
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => result,
        Err(_) => {
            debug!(%uri, "catalog call timed out");
            Err(ProviderError::Timeout)
        }
    }
}

#[derive(Serialize)]
struct HostRef<'a> {
    bk_host_id: HostId,
    ip: &'a str,
    bk_cloud_id: u64,
}

fn host_refs(hosts: &[CatalogHost]) -> Vec<HostRef<'_>> {
    hosts
        .iter()
        .map(|h| HostRef {
            bk_host_id: h.bk_host_id,
            ip: &h.ip,
            bk_cloud_id: h.bk_cloud_id,
        })
        .collect()
}

// ── CMDB ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct LookupRequest<'a> {
    bk_host_ids: &'a [HostId],
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    hosts: Vec<CatalogHost>,
}

/// CMDB client: `POST /api/v1/hosts/query`.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    addr: String,
    timeout: Duration,
}

impl HttpCatalog {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }
}

impl HostCatalog for HttpCatalog {
    fn lookup<'a>(&'a self, ids: &'a [HostId]) -> ProviderFuture<'a, Vec<CatalogHost>> {
        Box::pin(async move {
            let resp: LookupResponse = post_json(
                &self.addr,
                "/api/v1/hosts/query",
                &LookupRequest { bk_host_ids: ids },
                self.timeout,
            )
            .await?;
            Ok(resp.hosts)
        })
    }
}

// ── Job executor ───────────────────────────────────────────────────

#[derive(Serialize)]
struct HostsRequest<'a> {
    hosts: Vec<HostRef<'a>>,
}

#[derive(Deserialize)]
struct LayoutResponse {
    #[serde(default)]
    layouts: HashMap<HostId, Vec<RawDisk>>,
}

/// Job executor client: `POST /api/v1/disks/query`.
#[derive(Debug, Clone)]
pub struct HttpDiskLayout {
    addr: String,
    timeout: Duration,
}

impl HttpDiskLayout {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }
}

impl DiskLayoutProvider for HttpDiskLayout {
    fn disk_layout<'a>(
        &'a self,
        hosts: &'a [CatalogHost],
    ) -> ProviderFuture<'a, HashMap<HostId, Vec<RawDisk>>> {
        Box::pin(async move {
            let resp: LayoutResponse = post_json(
                &self.addr,
                "/api/v1/disks/query",
                &HostsRequest {
                    hosts: host_refs(hosts),
                },
                self.timeout,
            )
            .await?;
            Ok(resp.layouts)
        })
    }
}

// ── Cloud API ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct VmResponse {
    #[serde(default)]
    vms: HashMap<HostId, CloudVm>,
}

/// Cloud API client: `POST /api/v1/vms/query`.
#[derive(Debug, Clone)]
pub struct HttpCloudDisks {
    addr: String,
    timeout: Duration,
}

impl HttpCloudDisks {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }
}

impl CloudDiskProvider for HttpCloudDisks {
    fn vm_info<'a>(&'a self, hosts: &'a [CatalogHost]) -> ProviderFuture<'a, HashMap<HostId, CloudVm>> {
        Box::pin(async move {
            let resp: VmResponse = post_json(
                &self.addr,
                "/api/v1/vms/query",
                &HostsRequest {
                    hosts: host_refs(hosts),
                },
                self.timeout,
            )
            .await?;
            Ok(resp.vms)
        })
    }
}
