//! End-to-end runs through the orchestrator with stub collaborators

use super::common::*;
use cluster_assistant_sdk::{
    Classification, Intent, ParsedSheet, ProgressEntry, ProgressStatus, Stage, StageError,
    WorkflowState,
};
use serde_json::Value;
use std::net::IpAddr;
use std::sync::Arc;

fn entries_for(state: &WorkflowState, stage: Stage) -> Vec<&ProgressEntry> {
    state
        .progress_trail()
        .iter()
        .filter(|e| e.stage_name == stage)
        .collect()
}

fn terminal(state: &WorkflowState, stage: Stage) -> &ProgressEntry {
    entries_for(state, stage)
        .into_iter()
        .find(|e| e.status.is_terminal())
        .unwrap_or_else(|| panic!("no terminal entry for {}", stage))
}

fn cell<'a>(row: &'a cluster_assistant_sdk::TableRow, column: &str) -> &'a str {
    row.get(column).and_then(Value::as_str).unwrap_or_default()
}

// ============================================================================
// Happy paths
// ============================================================================

#[tokio::test]
async fn test_create_cluster_end_to_end() {
    let h = harness(
        cluster_request("ocp.example.com", "10.0.0.0/16"),
        Ok(sheet_with(5)),
    );
    let state = h.orchestrator.run("create a cluster from my sheet").await;

    assert!(state.error.is_none());
    assert_eq!(h.fetcher.call_count(), 1);
    assert_eq!(h.dns.zones(), vec!["ocp.example.com".to_string()]);

    let created = h.dns.created();
    assert_eq!(created.len(), 5);
    assert_eq!(created[0].0, "master-00.ocp.example.com");
    assert_eq!(created[0].1, "10.0.0.1".parse::<IpAddr>().unwrap());
    assert_eq!(created[4].0, "worker-01.ocp.example.com");
    assert_eq!(created[4].1, "10.0.0.5".parse::<IpAddr>().unwrap());

    let response = state.response.as_ref().unwrap();
    assert!(response.message.contains("DNS Records Created: 5"));
    assert!(!response.message.contains("DNS Records Failed"));

    let table = response.table.as_ref().unwrap();
    assert_eq!(table.len(), 5);
    assert_eq!(cell(&table[0], "Node Type"), "MASTER");
    assert_eq!(cell(&table[3], "Node Type"), "WORKER");
    assert_eq!(cell(&table[2], "Allocated IP"), "10.0.0.3");
    assert_eq!(cell(&table[2], "Console IP"), "192.168.100.12");
    assert!(table.iter().all(|row| cell(row, "Status") == "✅ Created"));

    let columns: Vec<&String> = table[0].keys().collect();
    assert_eq!(
        columns,
        vec!["Node Type", "Hostname", "FQDN", "Console IP", "Allocated IP", "Status"]
    );
}

#[tokio::test]
async fn test_console_ips_keep_sheet_order() {
    let sheet = ParsedSheet {
        fqdn: None,
        subnet: None,
        node_ips: ["10.8.8.8", "10.8.8.9", "10.8.8.10", "10.8.8.11", "10.8.8.12"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        node_names: vec![],
    };
    let h = harness(cluster_request("cluster.example.com", "10.0.0.0/16"), Ok(sheet));
    let state = h.orchestrator.run("create a cluster").await;

    let summary: Vec<(String, &str, &str)> = state
        .allocations
        .iter()
        .map(|a| (a.hostname.clone(), a.console_ip.as_str(), a.allocated_ip.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("master-00".to_string(), "10.8.8.8", "10.0.0.1"),
            ("master-01".to_string(), "10.8.8.9", "10.0.0.2"),
            ("master-02".to_string(), "10.8.8.10", "10.0.0.3"),
            ("worker-00".to_string(), "10.8.8.11", "10.0.0.4"),
            ("worker-01".to_string(), "10.8.8.12", "10.0.0.5"),
        ]
    );
}

#[tokio::test]
async fn test_sheet_values_override_message() {
    let mut sheet = sheet_with(3);
    sheet.fqdn = Some("sheet.example.com".to_string());
    sheet.subnet = Some("10.9.0.0/24".to_string());

    let h = harness(cluster_request("typed.example.com", "10.0.0.0/16"), Ok(sheet));
    let state = h.orchestrator.run("create a cluster").await;

    assert!(state.error.is_none());
    assert_eq!(state.fqdn.as_deref(), Some("sheet.example.com"));
    assert_eq!(state.allocations[0].allocated_ip, "10.9.0.1");
    assert_eq!(state.allocations[0].fqdn, "master-00.sheet.example.com");
    assert_eq!(h.dns.zones(), vec!["sheet.example.com".to_string()]);
}

#[tokio::test]
async fn test_allocate_ips_does_not_touch_dns() {
    let mut classification = cluster_request("alloc.example.com", "172.16.5.0/24");
    classification.intent = Intent::AllocateIps;

    let h = harness(classification, Ok(sheet_with(4)));
    let state = h.orchestrator.run("allocate ips").await;

    assert_eq!(state.allocations.len(), 4);
    assert!(h.dns.created().is_empty());
    assert!(entries_for(&state, Stage::DnsCreation).is_empty());

    let response = state.response.unwrap();
    assert!(response.message.starts_with("🔢 IP Allocation completed!"));
    let table = response.table.unwrap();
    assert!(table.iter().all(|row| !row.contains_key("Status")));
}

#[tokio::test]
async fn test_parse_sheets_lists_console_ips() {
    let mut classification = Classification::new(Intent::ParseSheets, 0.9);
    classification.sheets_reference = Some(SHEET_URL.to_string());

    let h = harness(classification, Ok(sheet_with(2)));
    let state = h.orchestrator.run("parse my sheet").await;

    let message = state.response.unwrap().message;
    assert!(message.contains("• FQDN: Not found"));
    assert!(message.contains("• Node IPs: 2 found"));
    assert!(message.contains("1. 192.168.100.10 (Node1)"));
}

#[tokio::test]
async fn test_single_dns_record() {
    let classification = Classification {
        fqdn: Some("test.example.com".to_string()),
        single_ip: Some("1.2.3.4".to_string()),
        ..Classification::new(Intent::CreateDnsRecord, 0.9)
    };
    let h = harness(classification, Ok(sheet_with(1)));
    let state = h.orchestrator.run("create dns record test.example.com 1.2.3.4").await;

    assert_eq!(state.dns_records.len(), 1);
    assert!(state.dns_records[0].is_created());
    assert_eq!(
        h.dns.created(),
        vec![("test.example.com".to_string(), "1.2.3.4".parse().unwrap())]
    );
    assert!(h.dns.zones().is_empty());
    assert_eq!(h.fetcher.call_count(), 0);
    assert!(entries_for(&state, Stage::SheetsParsing).is_empty());
    assert!(entries_for(&state, Stage::IpAllocation).is_empty());

    let message = state.response.unwrap().message;
    assert_eq!(
        message,
        "✅ DNS record created successfully!\nFQDN: test.example.com\nIP: 1.2.3.4"
    );
}

#[tokio::test]
async fn test_progress_uses_injected_clock() {
    let h = harness(Classification::new(Intent::GeneralChat, 0.9), Ok(sheet_with(1)));
    let state = h.orchestrator.run("hi").await;

    let expected = fixed_clock().0;
    assert!(state.progress_trail().iter().all(|e| e.timestamp == expected));
    assert_eq!(
        terminal(&state, Stage::IntentRecognition).message,
        "Intent recognized: GENERAL_CHAT"
    );
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_malformed_subnet_fails_allocation() {
    let h = harness(
        cluster_request("ocp.example.com", "not-a-subnet"),
        Ok(sheet_with(3)),
    );
    let state = h.orchestrator.run("create a cluster").await;

    let failed = terminal(&state, Stage::IpAllocation);
    assert_eq!(failed.status, ProgressStatus::Failed);
    assert_eq!(failed.details["error_kind"], "subnet_error");

    let error = state.error.as_deref().unwrap();
    assert!(error.starts_with("invalid subnet 'not-a-subnet'"));

    let skipped = terminal(&state, Stage::DnsCreation);
    assert_eq!(skipped.status, ProgressStatus::Completed);
    assert_eq!(skipped.details["skipped"], true);
    assert!(h.dns.created().is_empty());
    assert!(h.dns.zones().is_empty());

    let response = state.response.as_ref().unwrap();
    assert_eq!(response.message, format!("❌ Error: {}", error));
    assert!(response.table.is_none());
    assert_eq!(
        terminal(&state, Stage::ResponseFormatter).status,
        ProgressStatus::Completed
    );
}

#[tokio::test]
async fn test_subnet_too_small() {
    let h = harness(
        cluster_request("ocp.example.com", "10.0.0.0/30"),
        Ok(sheet_with(4)),
    );
    let state = h.orchestrator.run("create a cluster").await;

    assert_eq!(
        terminal(&state, Stage::IpAllocation).details["error_kind"],
        "allocation_error"
    );
    assert!(state.allocations.is_empty());
    assert!(state.dns_records.is_empty());
}

#[tokio::test]
async fn test_sheet_without_node_ips() {
    let mut sheet = sheet_with(0);
    sheet.fqdn = Some("empty.example.com".to_string());

    let h = harness(cluster_request("ocp.example.com", "10.0.0.0/24"), Ok(sheet));
    let state = h.orchestrator.run("create a cluster").await;

    assert_eq!(
        state.error.as_deref(),
        Some("failed to parse spreadsheet: no node IPs found")
    );
    assert_eq!(
        terminal(&state, Stage::SheetsParsing).status,
        ProgressStatus::Failed
    );
    assert_eq!(terminal(&state, Stage::IpAllocation).details["skipped"], true);
    assert!(state.parsed_sheet.is_none());
}

#[tokio::test]
async fn test_fetch_error_surfaces() {
    let h = harness(
        cluster_request("ocp.example.com", "10.0.0.0/24"),
        Err(StageError::Fetch("HTTP 404".to_string())),
    );
    let state = h.orchestrator.run("create a cluster").await;

    assert_eq!(
        state.error.as_deref(),
        Some("failed to fetch spreadsheet: HTTP 404")
    );
    assert_eq!(
        state.visited_stages(),
        vec![
            Stage::IntentRecognition,
            Stage::SheetsParsing,
            Stage::IpAllocation,
            Stage::DnsCreation,
            Stage::ResponseFormatter,
        ]
    );
}

#[tokio::test]
async fn test_missing_sheet_reference() {
    let h = harness(Classification::new(Intent::ParseSheets, 0.9), Ok(sheet_with(1)));
    let state = h.orchestrator.run("parse a sheet").await;

    assert_eq!(state.error.as_deref(), Some("No Google Sheets URL provided"));
    assert_eq!(h.fetcher.call_count(), 0);
}

#[tokio::test]
async fn test_single_record_needs_fqdn_and_ip() {
    let classification = Classification {
        fqdn: Some("lonely.example.com".to_string()),
        ..Classification::new(Intent::CreateDnsRecord, 0.9)
    };
    let h = harness(classification, Ok(sheet_with(1)));
    let state = h.orchestrator.run("create a dns record").await;

    assert_eq!(
        state.error.as_deref(),
        Some("Missing FQDN or IP address for DNS record")
    );
    assert!(h.dns.created().is_empty());
}

#[tokio::test]
async fn test_panicking_stage_is_contained() {
    let h = harness_with(
        cluster_request("ocp.example.com", "10.0.0.0/24"),
        Arc::new(PanickingParser),
        RecordingDns::default(),
    );
    let state = h.orchestrator.run("create a cluster").await;

    let failed = terminal(&state, Stage::SheetsParsing);
    assert_eq!(failed.status, ProgressStatus::Failed);
    assert_eq!(failed.details["error_kind"], "internal_error");
    assert!(state.error.as_deref().unwrap().contains("parser exploded"));

    assert_eq!(terminal(&state, Stage::DnsCreation).details["skipped"], true);
    assert!(state.response.unwrap().message.starts_with("❌ Error:"));
}

#[tokio::test]
async fn test_partial_dns_failure_is_not_fatal() {
    let h = harness_with(
        cluster_request("ocp.example.com", "10.0.0.0/24"),
        Arc::new(StubParser(Ok(sheet_with(4)))),
        RecordingDns::failing(&["worker-00.ocp.example.com"]),
    );
    let state = h.orchestrator.run("create a cluster").await;

    assert!(state.error.is_none());
    assert_eq!(state.dns_records.len(), 4);
    assert_eq!(h.dns.created().len(), 3);

    let dns = terminal(&state, Stage::DnsCreation);
    assert_eq!(dns.status, ProgressStatus::Completed);
    assert_eq!(dns.details["created"], 3);
    assert_eq!(
        dns.details["partial_failure"],
        "1 of 4 DNS records could not be created"
    );

    let response = state.response.unwrap();
    assert!(response.message.contains("DNS Records Created: 3"));
    assert!(response.message.contains("DNS Records Failed: 1"));
    let table = response.table.unwrap();
    assert_eq!(
        cell(&table[3], "Status"),
        "❌ Failed: appliance rejected worker-00.ocp.example.com"
    );
    assert_eq!(cell(&table[0], "Status"), "✅ Created");
}

#[tokio::test]
async fn test_degraded_classification_becomes_help() {
    let h = harness(Classification::degraded("model timed out"), Ok(sheet_with(1)));
    let state = h.orchestrator.run("create a cluster please").await;

    assert!(state.error.is_none());
    assert_eq!(state.intent, Some(Intent::GeneralChat));

    let recognized = terminal(&state, Stage::IntentRecognition);
    assert_eq!(recognized.details["confidence"], 0.5);
    assert!(recognized.details["degraded"]
        .as_str()
        .unwrap()
        .contains("model timed out"));
    assert_eq!(
        state.visited_stages(),
        vec![Stage::IntentRecognition, Stage::ResponseFormatter]
    );
}
