//! Narrow interfaces to everything outside the core.
//!
//! The orchestrator only ever holds these as `Arc<dyn Trait>`; concrete HTTP
//! clients live in the `cluster-assistant` crate and tests substitute stubs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::{Classification, ParsedSheet, StageError};

/// Result type for raw collaborator calls
pub type CollaboratorResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Text-in, text-out language model
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Short identifier for logs and health output
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> CollaboratorResult<String>;
}

/// Maps free text onto an intent plus extracted fields.
///
/// Implementations must not fail: any problem with the underlying
/// collaborator degrades to [`Classification::degraded`].
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Classification;
}

/// Retrieves the raw tabular content behind a sheet reference
#[async_trait]
pub trait SheetFetcher: Send + Sync {
    async fn fetch(&self, reference: &str) -> Result<String, StageError>;
}

/// Turns raw tabular content into structured node data
#[async_trait]
pub trait SheetParser: Send + Sync {
    async fn parse(&self, content: &str) -> Result<ParsedSheet, StageError>;
}

/// An authoritative zone on the DNS appliance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRef {
    pub name: String,
    pub reference: String,
    /// False when the zone already existed
    pub created: bool,
}

/// DNS appliance operations used by the registrar
#[async_trait]
pub trait DnsClient: Send + Sync {
    /// Short description for logs and health output
    fn describe(&self) -> String;

    /// Create an address record and return the appliance's reference for it
    async fn create_record(&self, fqdn: &str, ip: IpAddr) -> CollaboratorResult<String>;

    /// Discover the zone or create it when missing
    async fn ensure_zone(&self, name: &str) -> CollaboratorResult<ZoneRef>;
}
