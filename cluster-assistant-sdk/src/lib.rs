//! Shared state model and collaborator seams for the cluster assistant.
//!
//! A [`WorkflowState`] is created once per chat request, threaded through every
//! stage of the orchestrator and discarded after the reply has been produced.
//! The collaborator traits in [`collaborators`] are the only places where the
//! core talks to the outside world (language model, spreadsheet host, DNS
//! appliance), so the control flow can be driven with stubs in tests.

pub mod collaborators;
pub mod console;
pub mod error;

// Re-export async trait for convenience
pub use async_trait::async_trait;

pub use collaborators::{
    CollaboratorResult, DnsClient, IntentClassifier, LanguageModel, SheetFetcher, SheetParser,
    ZoneRef,
};
pub use error::StageError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Intent
// ============================================================================

/// What the user asked for, as decided by the classifier stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    CreateCluster,
    CreateDnsRecord,
    ParseSheets,
    AllocateIps,
    GeneralChat,
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::CreateCluster,
        Intent::CreateDnsRecord,
        Intent::ParseSheets,
        Intent::AllocateIps,
        Intent::GeneralChat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::CreateCluster => "CREATE_CLUSTER",
            Intent::CreateDnsRecord => "CREATE_DNS_RECORD",
            Intent::ParseSheets => "PARSE_SHEETS",
            Intent::AllocateIps => "ALLOCATE_IPS",
            Intent::GeneralChat => "GENERAL_CHAT",
        }
    }

    /// Map a free-form label (as returned by a language model) onto an intent.
    ///
    /// Matching ignores case, surrounding whitespace and `-`/space separators.
    /// Anything unrecognised is general chat.
    pub fn from_label(label: &str) -> Intent {
        let normalized = label.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Intent::ALL
            .into_iter()
            .find(|intent| intent.as_str() == normalized)
            .unwrap_or(Intent::GeneralChat)
    }

    /// Intents whose outcome is recorded as an operation in persistent storage
    pub fn mutates_infrastructure(&self) -> bool {
        matches!(
            self,
            Intent::CreateCluster | Intent::CreateDnsRecord | Intent::AllocateIps
        )
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Stages and progress
// ============================================================================

/// Nodes of the orchestrator graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    IntentRecognition,
    SheetsParsing,
    IpAllocation,
    DnsCreation,
    ResponseFormatter,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::IntentRecognition,
        Stage::SheetsParsing,
        Stage::IpAllocation,
        Stage::DnsCreation,
        Stage::ResponseFormatter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::IntentRecognition => "intent_recognition",
            Stage::SheetsParsing => "sheets_parsing",
            Stage::IpAllocation => "ip_allocation",
            Stage::DnsCreation => "dns_creation",
            Stage::ResponseFormatter => "response_formatter",
        }
    }

    /// Human readable name used in console output
    pub fn label(&self) -> &'static str {
        match self {
            Stage::IntentRecognition => "Intent Recognition",
            Stage::SheetsParsing => "Sheets Parsing",
            Stage::IpAllocation => "IP Allocation",
            Stage::DnsCreation => "DNS Creation",
            Stage::ResponseFormatter => "Response Formatter",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Started,
    Completed,
    Failed,
}

impl ProgressStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressStatus::Started)
    }
}

/// One entry of the progress trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub stage_name: Stage,
    pub status: ProgressStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Source of progress timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock in UTC
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ============================================================================
// Stage payloads
// ============================================================================

/// Structured node data extracted from a spreadsheet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedSheet {
    #[serde(default)]
    pub fqdn: Option<String>,
    #[serde(default)]
    pub subnet: Option<String>,
    /// Console IPs in sheet order
    #[serde(default)]
    pub node_ips: Vec<String>,
    /// Parallel to `node_ips`; empty unless every node has a name
    #[serde(default)]
    pub node_names: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Master,
    Worker,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Master => "master",
            NodeRole::Worker => "worker",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node's place in the cluster and the address it was given
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAllocation {
    pub role: NodeRole,
    /// Zero-based and contiguous within `role`
    pub ordinal: usize,
    pub hostname: String,
    pub fqdn: String,
    pub console_ip: String,
    pub allocated_ip: String,
    pub subnet: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Created,
    Failed,
}

/// Outcome of a single create-record call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsRecordResult {
    pub fqdn: String,
    pub ip: String,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Reference returned by the DNS appliance for a created record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_ref: Option<String>,
}

impl DnsRecordResult {
    pub fn created(fqdn: impl Into<String>, ip: impl Into<String>, record_ref: String) -> Self {
        Self {
            fqdn: fqdn.into(),
            ip: ip.into(),
            status: RecordStatus::Created,
            error: None,
            record_ref: Some(record_ref),
        }
    }

    pub fn failed(fqdn: impl Into<String>, ip: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            fqdn: fqdn.into(),
            ip: ip.into(),
            status: RecordStatus::Failed,
            error: Some(error.into()),
            record_ref: None,
        }
    }

    pub fn is_created(&self) -> bool {
        self.status == RecordStatus::Created
    }
}

/// Result of classifying one user message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    #[serde(default)]
    pub sheets_reference: Option<String>,
    #[serde(default)]
    pub fqdn: Option<String>,
    #[serde(default)]
    pub single_ip: Option<String>,
    #[serde(default)]
    pub subnet: Option<String>,
    /// In `[0, 1]`
    pub confidence: f32,
    /// Set when the classifier fell back to general chat
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
}

impl Classification {
    pub const DEGRADED_CONFIDENCE: f32 = 0.5;

    pub fn new(intent: Intent, confidence: f32) -> Self {
        Self {
            intent,
            sheets_reference: None,
            fqdn: None,
            single_ip: None,
            subnet: None,
            confidence: confidence.clamp(0.0, 1.0),
            degraded_reason: None,
        }
    }

    /// The fallback used whenever the classifier collaborator misbehaves
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            degraded_reason: Some(reason.into()),
            ..Self::new(Intent::GeneralChat, Self::DEGRADED_CONFIDENCE)
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded_reason.is_some()
    }
}

/// One table row; column order is preserved
pub type TableRow = serde_json::Map<String, serde_json::Value>;

/// Human readable rendering of a finished workflow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormattedResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<Vec<TableRow>>,
}

// ============================================================================
// Workflow state
// ============================================================================

/// The single record threaded through every stage of one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub id: Uuid,
    pub user_input: String,
    pub intent: Option<Intent>,
    pub sheets_reference: Option<String>,
    pub fqdn: Option<String>,
    pub single_ip: Option<String>,
    pub subnet: Option<String>,
    pub parsed_sheet: Option<ParsedSheet>,
    pub allocations: Vec<NodeAllocation>,
    pub dns_records: Vec<DnsRecordResult>,
    /// Last stage that ran; diagnostics only
    pub current_stage: Option<Stage>,
    progress_trail: Vec<ProgressEntry>,
    pub error: Option<String>,
    pub response: Option<FormattedResponse>,
}

impl WorkflowState {
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_input: user_input.into(),
            intent: None,
            sheets_reference: None,
            fqdn: None,
            single_ip: None,
            subnet: None,
            parsed_sheet: None,
            allocations: Vec::new(),
            dns_records: Vec::new(),
            current_stage: None,
            progress_trail: Vec::new(),
            error: None,
            response: None,
        }
    }

    /// Intent used for routing; an unset intent routes like general chat
    pub fn resolved_intent(&self) -> Intent {
        self.intent.unwrap_or(Intent::GeneralChat)
    }

    /// Copy the classifier's output onto the state.
    ///
    /// The intent may only be set once per request.
    pub fn apply_classification(&mut self, classification: &Classification) -> Result<(), StageError> {
        if let Some(existing) = self.intent {
            return Err(StageError::Internal {
                stage: Stage::IntentRecognition.to_string(),
                message: format!("intent already set to {}", existing),
            });
        }
        self.intent = Some(classification.intent);
        self.sheets_reference = classification.sheets_reference.clone();
        self.fqdn = classification.fqdn.clone();
        self.single_ip = classification.single_ip.clone();
        self.subnet = classification.subnet.clone();
        Ok(())
    }

    /// Record a stage failure. The first failure wins.
    pub fn fail(&mut self, error: &StageError) {
        if self.error.is_none() {
            self.error = Some(error.to_string());
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Append to the progress trail. This is the only writer of the trail.
    pub fn record(
        &mut self,
        stage: Stage,
        status: ProgressStatus,
        message: impl Into<String>,
        details: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) {
        self.progress_trail.push(ProgressEntry {
            stage_name: stage,
            status,
            message: message.into(),
            timestamp,
            details,
        });
        self.current_stage = Some(stage);
    }

    pub fn progress_trail(&self) -> &[ProgressEntry] {
        &self.progress_trail
    }

    /// Stages in the order they were entered
    pub fn visited_stages(&self) -> Vec<Stage> {
        self.progress_trail
            .iter()
            .filter(|entry| entry.status == ProgressStatus::Started)
            .map(|entry| entry.stage_name)
            .collect()
    }
}

// ============================================================================
// Request / response surface
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub id: Uuid,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<Vec<TableRow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_trail: Option<Vec<ProgressEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
    pub timestamp: DateTime<Utc>,
}
