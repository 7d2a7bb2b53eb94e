//! DNS registration: an Infoblox WAPI client, a dry-run client, and the
//! registrar that drives either one record at a time.

use anyhow::{bail, Context};
use cluster_assistant_sdk::{
    async_trait, CollaboratorResult, DnsClient, DnsRecordResult, NodeAllocation, StageError,
    ZoneRef,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::InfobloxSettings;
use crate::llm::truncate;

#[derive(Debug, Error)]
pub enum DnsError {
    #[error("DNS appliance request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("DNS appliance returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected response from DNS appliance: {0}")]
    UnexpectedResponse(String),
}

// ============================================================================
// Infoblox
// ============================================================================

/// Error body returned by WAPI on failures
#[derive(Debug, Deserialize)]
struct WapiError {
    #[serde(default)]
    text: Option<String>,
    #[serde(rename = "Error", default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ZoneAuthEntry {
    #[serde(rename = "_ref")]
    reference: String,
}

/// Client for the Infoblox WAPI REST interface
pub struct InfobloxClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    view: String,
}

impl InfobloxClient {
    pub fn new(settings: &InfobloxSettings, timeout: Duration) -> anyhow::Result<Self> {
        let Some(host) = settings.host.as_deref() else {
            bail!("INFOBLOX_HOST is not configured");
        };
        let host = host.trim_end_matches('/');
        let origin = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(!settings.verify_tls)
            .build()
            .context("Failed to build HTTP client for Infoblox")?;

        Ok(Self {
            client,
            base_url: format!("{}/wapi/{}", origin, settings.api_version),
            username: settings.username.clone(),
            password: settings.password.clone(),
            view: settings.dns_view.clone(),
        })
    }

    fn url(&self, object: &str) -> String {
        format!("{}/{}", self.base_url, object)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, DnsError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<WapiError>(&body)
            .ok()
            .and_then(|e| e.text.or(e.error))
            .unwrap_or_else(|| truncate(body.trim(), 300));
        Err(DnsError::Status {
            status: status.as_u16(),
            message,
        })
    }

    /// POST an object and return the `_ref` WAPI answers with
    async fn create_object(&self, object: &str, body: serde_json::Value) -> Result<String, DnsError> {
        let response = self
            .client
            .post(self.url(object))
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await?;
        let response = Self::check(response).await?;
        let reference: serde_json::Value = response.json().await?;
        reference
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DnsError::UnexpectedResponse(reference.to_string()))
    }

    async fn find_zone(&self, name: &str) -> Result<Option<String>, DnsError> {
        let response = self
            .client
            .get(self.url("zone_auth"))
            .basic_auth(&self.username, Some(&self.password))
            .query(&[("fqdn", name), ("view", self.view.as_str())])
            .send()
            .await?;
        let zones: Vec<ZoneAuthEntry> = Self::check(response).await?.json().await?;
        Ok(zones.into_iter().next().map(|zone| zone.reference))
    }
}

#[async_trait]
impl DnsClient for InfobloxClient {
    fn describe(&self) -> String {
        format!("infoblox {} (view {})", self.base_url, self.view)
    }

    async fn create_record(&self, fqdn: &str, ip: IpAddr) -> CollaboratorResult<String> {
        let (object, body) = match ip {
            IpAddr::V4(v4) => (
                "record:a",
                json!({ "name": fqdn, "ipv4addr": v4.to_string(), "view": self.view }),
            ),
            IpAddr::V6(v6) => (
                "record:aaaa",
                json!({ "name": fqdn, "ipv6addr": v6.to_string(), "view": self.view }),
            ),
        };
        let reference = self.create_object(object, body).await?;
        debug!(fqdn, %ip, reference = %reference, "Created DNS record");
        Ok(reference)
    }

    async fn ensure_zone(&self, name: &str) -> CollaboratorResult<ZoneRef> {
        if let Some(reference) = self.find_zone(name).await? {
            return Ok(ZoneRef {
                name: name.to_string(),
                reference,
                created: false,
            });
        }
        let reference = self
            .create_object("zone_auth", json!({ "fqdn": name, "view": self.view }))
            .await?;
        Ok(ZoneRef {
            name: name.to_string(),
            reference,
            created: true,
        })
    }
}

// ============================================================================
// Dry run
// ============================================================================

/// Accepts every request and hands back synthetic references
#[derive(Debug, Default)]
pub struct DryRunDnsClient {
    next_id: AtomicU64,
    zones: Mutex<HashSet<String>>,
}

impl DryRunDnsClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DnsClient for DryRunDnsClient {
    fn describe(&self) -> String {
        "dry-run (no DNS changes are made)".to_string()
    }

    async fn create_record(&self, fqdn: &str, ip: IpAddr) -> CollaboratorResult<String> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let object = if ip.is_ipv4() { "record:a" } else { "record:aaaa" };
        Ok(format!("{}/dryrun-{}:{}/default", object, id, fqdn))
    }

    async fn ensure_zone(&self, name: &str) -> CollaboratorResult<ZoneRef> {
        let created = self.zones.lock().await.insert(name.to_ascii_lowercase());
        Ok(ZoneRef {
            name: name.to_string(),
            reference: format!("zone_auth/dryrun:{}/default", name),
            created,
        })
    }
}

// ============================================================================
// Registrar
// ============================================================================

/// Turns allocations (or one ad-hoc pair) into DNS records
#[derive(Clone)]
pub struct Registrar {
    client: Arc<dyn DnsClient>,
}

impl Registrar {
    pub fn new(client: Arc<dyn DnsClient>) -> Self {
        Self { client }
    }

    pub fn describe(&self) -> String {
        self.client.describe()
    }

    /// Make sure `zone` exists, then create one record per allocation, in order.
    ///
    /// Only a zone failure fails the call. Individual record failures are
    /// reported in the returned list.
    pub async fn register_cluster(
        &self,
        zone: &str,
        allocations: &[NodeAllocation],
    ) -> Result<Vec<DnsRecordResult>, StageError> {
        let zone_ref = self
            .client
            .ensure_zone(zone)
            .await
            .map_err(|e| StageError::Registrar(format!("zone {}: {}", zone, e)))?;
        info!(zone, created = zone_ref.created, "DNS zone ready");

        let mut records = Vec::with_capacity(allocations.len());
        for allocation in allocations {
            records.push(
                self.register_single(&allocation.fqdn, &allocation.allocated_ip)
                    .await,
            );
        }
        Ok(records)
    }

    /// Create a single record. Never fails; failures come back as a `failed` result.
    pub async fn register_single(&self, fqdn: &str, ip: &str) -> DnsRecordResult {
        let address: IpAddr = match ip.trim().parse() {
            Ok(address) => address,
            Err(_) => {
                warn!(fqdn, ip, "Refusing to register an invalid IP address");
                return DnsRecordResult::failed(fqdn, ip, format!("invalid IP address '{}'", ip));
            }
        };

        match self.client.create_record(fqdn, address).await {
            Ok(reference) => DnsRecordResult::created(fqdn, ip, reference),
            Err(e) => {
                warn!(fqdn, ip, error = %e, "DNS record creation failed");
                DnsRecordResult::failed(fqdn, ip, e.to_string())
            }
        }
    }
}

/// The partial-failure summary for a batch, if any record failed
pub fn partial_failure(records: &[DnsRecordResult]) -> Option<StageError> {
    let failed = records.iter().filter(|r| !r.is_created()).count();
    (failed > 0).then(|| StageError::RegistrarPartialFailure {
        failed,
        total: records.len(),
    })
}
