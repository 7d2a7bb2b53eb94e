//! Stage bodies.
//!
//! Each stage mutates the state it is handed and reports either a short
//! outcome for the progress trail or the [`StageError`] that stopped it. The
//! orchestrator owns the trail; stages never write to it.

use cluster_assistant_sdk::{
    Intent, IntentClassifier, SheetFetcher, SheetParser, StageError, WorkflowState,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::allocator;
use crate::dns::{partial_failure, Registrar};
use crate::formatter::format_response;

/// What a successful stage reports back
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub message: String,
    pub details: Value,
}

impl StageOutcome {
    pub fn new(message: impl Into<String>, details: Value) -> Self {
        Self {
            message: message.into(),
            details,
        }
    }
}

pub async fn recognize_intent(
    classifier: &dyn IntentClassifier,
    state: &mut WorkflowState,
) -> Result<StageOutcome, StageError> {
    let classification = classifier.classify(&state.user_input).await;
    state.apply_classification(&classification)?;

    let mut details = json!({
        "intent": classification.intent,
        "confidence": classification.confidence,
    });
    if let Some(reason) = &classification.degraded_reason {
        let degraded = StageError::ClassificationDegraded(reason.clone());
        warn!(error = %degraded, "Continuing as general chat");
        details["degraded"] = Value::String(degraded.to_string());
    }

    Ok(StageOutcome::new(
        format!("Intent recognized: {}", classification.intent),
        details,
    ))
}

pub async fn parse_sheets(
    fetcher: &dyn SheetFetcher,
    parser: &dyn SheetParser,
    state: &mut WorkflowState,
) -> Result<StageOutcome, StageError> {
    let reference = state
        .sheets_reference
        .clone()
        .ok_or_else(|| StageError::MissingPrecondition("No Google Sheets URL provided".to_string()))?;

    let content = fetcher.fetch(&reference).await?;
    let sheet = parser.parse(&content).await?;
    if sheet.node_ips.is_empty() {
        return Err(StageError::Parse("no node IPs found".to_string()));
    }

    // Values found in the sheet take precedence over ones from the message.
    if let Some(fqdn) = &sheet.fqdn {
        state.fqdn = Some(fqdn.clone());
    }
    if let Some(subnet) = &sheet.subnet {
        state.subnet = Some(subnet.clone());
    }

    let outcome = StageOutcome::new(
        format!("Parsed {} node(s) from sheet", sheet.node_ips.len()),
        json!({
            "node_count": sheet.node_ips.len(),
            "fqdn": state.fqdn,
            "subnet": state.subnet,
        }),
    );
    state.parsed_sheet = Some(sheet);
    Ok(outcome)
}

pub fn allocate_ips(state: &mut WorkflowState) -> Result<StageOutcome, StageError> {
    let sheet = state
        .parsed_sheet
        .as_ref()
        .ok_or_else(|| StageError::MissingPrecondition("Missing sheet data".to_string()))?;
    let subnet = state.subnet.as_deref().ok_or_else(|| {
        StageError::MissingPrecondition("No subnet provided for IP allocation".to_string())
    })?;
    let fqdn = state.fqdn.as_deref().ok_or_else(|| {
        StageError::MissingPrecondition("No cluster FQDN provided for IP allocation".to_string())
    })?;
    if sheet.node_ips.is_empty() {
        return Err(StageError::MissingPrecondition(
            "No node IPs found in sheet data".to_string(),
        ));
    }

    let allocations = allocator::allocate(&sheet.node_ips, subnet, fqdn)?;
    let masters = allocations
        .iter()
        .filter(|a| a.role == cluster_assistant_sdk::NodeRole::Master)
        .count();
    let outcome = StageOutcome::new(
        format!("Allocated {} address(es) from {}", allocations.len(), subnet),
        json!({
            "subnet": subnet,
            "masters": masters,
            "workers": allocations.len() - masters,
        }),
    );
    state.allocations = allocations;
    Ok(outcome)
}

pub async fn create_dns_records(
    registrar: &Registrar,
    state: &mut WorkflowState,
) -> Result<StageOutcome, StageError> {
    if state.resolved_intent() == Intent::CreateDnsRecord {
        let (Some(fqdn), Some(ip)) = (state.fqdn.clone(), state.single_ip.clone()) else {
            return Err(StageError::MissingPrecondition(
                "Missing FQDN or IP address for DNS record".to_string(),
            ));
        };
        let record = registrar.register_single(&fqdn, &ip).await;
        state.dns_records = vec![record];
    } else {
        if state.allocations.is_empty() {
            return Err(StageError::MissingPrecondition(
                "No IP allocations to register".to_string(),
            ));
        }
        let zone = state.fqdn.clone().ok_or_else(|| {
            StageError::MissingPrecondition("No cluster FQDN for the DNS zone".to_string())
        })?;
        state.dns_records = registrar.register_cluster(&zone, &state.allocations).await?;
    }

    let total = state.dns_records.len();
    let created = state.dns_records.iter().filter(|r| r.is_created()).count();
    let mut details = json!({ "created": created, "failed": total - created });

    if let Some(partial) = partial_failure(&state.dns_records) {
        warn!(error = %partial, "Some DNS records were not created");
        details["partial_failure"] = Value::String(partial.to_string());
    } else {
        info!(created, "DNS records created");
    }

    Ok(StageOutcome::new(
        format!("Created {} of {} DNS record(s)", created, total),
        details,
    ))
}

/// Always succeeds
pub fn format(state: &mut WorkflowState) -> StageOutcome {
    let response = format_response(state);
    let details = json!({
        "has_table": response.table.is_some(),
        "error": state.error.is_some(),
    });
    state.response = Some(response);
    StageOutcome::new("Response formatted", details)
}
