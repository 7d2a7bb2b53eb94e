//! Final rendering of a workflow into a chat reply.

use cluster_assistant_sdk::{
    DnsRecordResult, FormattedResponse, Intent, NodeAllocation, RecordStatus, TableRow,
    WorkflowState,
};
use serde_json::Value;
use std::fmt::Write;

pub const HELP_MESSAGE: &str = r#"👋 Hello! I'm your OpenShift Cluster Management Assistant.

I can help you with:

🚀 Create OpenShift Cluster:
"Hey, I want to build new openshift cluster, details are at google sheet <link>"

🔧 Create DNS Record:
"Hey, can you create a DNS A record for IP 1.2.3.4 and FQDN is abc.com"

📋 Parse Google Sheets:
"Hey, can you parse google sheet at <link> and provide FQDN and subnet and list console IPs of the nodes"

🔢 Allocate IPs:
"Hey, allocate IPs for all the nodes listed in google sheet <link> with the subnet"

Just type your request and I'll help you manage your OpenShift infrastructure!"#;

pub fn help_message() -> FormattedResponse {
    FormattedResponse {
        message: HELP_MESSAGE.to_string(),
        table: None,
    }
}

/// Render the final state. Pure: reads the state, never changes it.
pub fn format_response(state: &WorkflowState) -> FormattedResponse {
    if let Some(error) = &state.error {
        return FormattedResponse {
            message: format!("❌ Error: {}", error),
            table: None,
        };
    }

    match state.intent {
        Some(Intent::CreateCluster) => cluster_response(state),
        Some(Intent::AllocateIps) => allocation_response(state),
        Some(Intent::ParseSheets) => sheet_response(state),
        Some(Intent::CreateDnsRecord) => single_record_response(state),
        Some(Intent::GeneralChat) | None => help_message(),
    }
}

fn or_unknown(value: Option<&str>) -> &str {
    value.unwrap_or("Not found")
}

fn cluster_response(state: &WorkflowState) -> FormattedResponse {
    let created = state.dns_records.iter().filter(|r| r.is_created()).count();
    let failed = state.dns_records.len() - created;

    let mut message = String::from("✅ OpenShift cluster setup completed!\n\n");
    message.push_str("📋 Cluster Details:\n");
    let _ = writeln!(message, "• FQDN: {}", or_unknown(state.fqdn.as_deref()));
    let _ = writeln!(message, "• Subnet: {}", or_unknown(state.subnet.as_deref()));
    let _ = writeln!(message, "• Total Nodes: {}", state.allocations.len());
    let _ = writeln!(message, "• DNS Records Created: {}", created);
    if failed > 0 {
        let _ = writeln!(message, "• DNS Records Failed: {} (see Status column)", failed);
    }
    message.push_str("\n📊 Node Details (see table below):");

    let rows = state
        .allocations
        .iter()
        .map(|allocation| {
            let mut row = allocation_row(allocation);
            let status = record_status(&state.dns_records, &allocation.fqdn);
            row.insert("Status".to_string(), Value::String(status));
            row
        })
        .collect();

    FormattedResponse {
        message,
        table: Some(rows),
    }
}

fn allocation_response(state: &WorkflowState) -> FormattedResponse {
    let mut message = String::from("🔢 IP Allocation completed!\n\n");
    message.push_str("📋 Allocation Details:\n");
    let _ = writeln!(message, "• FQDN: {}", or_unknown(state.fqdn.as_deref()));
    let _ = writeln!(message, "• Subnet: {}", or_unknown(state.subnet.as_deref()));
    let _ = writeln!(message, "• Total Nodes: {}", state.allocations.len());
    message.push_str("\n📊 IP Allocation Table (see below):");

    FormattedResponse {
        message,
        table: Some(state.allocations.iter().map(allocation_row).collect()),
    }
}

fn sheet_response(state: &WorkflowState) -> FormattedResponse {
    let mut message = String::from("📋 Google Sheets Analysis:\n\n");
    if let Some(sheet) = &state.parsed_sheet {
        let _ = writeln!(message, "• FQDN: {}", or_unknown(sheet.fqdn.as_deref()));
        let _ = writeln!(message, "• Subnet: {}", or_unknown(sheet.subnet.as_deref()));
        let _ = writeln!(message, "• Node IPs: {} found\n", sheet.node_ips.len());
        message.push_str("📊 Console IPs:");
        for (i, ip) in sheet.node_ips.iter().enumerate() {
            let _ = write!(message, "\n  {}. {}", i + 1, ip);
            if let Some(name) = sheet.node_names.get(i) {
                let _ = write!(message, " ({})", name);
            }
        }
    } else {
        message.push_str("No sheet data was returned.");
    }

    FormattedResponse {
        message,
        table: None,
    }
}

fn single_record_response(state: &WorkflowState) -> FormattedResponse {
    let message = match state.dns_records.first() {
        Some(record) if record.is_created() => format!(
            "✅ DNS record created successfully!\nFQDN: {}\nIP: {}",
            record.fqdn, record.ip
        ),
        Some(record) => format!(
            "⚠️ DNS record could not be created.\nFQDN: {}\nIP: {}\nReason: {}",
            record.fqdn,
            record.ip,
            record.error.as_deref().unwrap_or("unknown")
        ),
        None => "No DNS record was created.".to_string(),
    };

    FormattedResponse {
        message,
        table: None,
    }
}

fn allocation_row(allocation: &NodeAllocation) -> TableRow {
    let mut row = TableRow::new();
    let mut put = |key: &str, value: String| {
        row.insert(key.to_string(), Value::String(value));
    };
    put("Node Type", allocation.role.as_str().to_ascii_uppercase());
    put("Hostname", allocation.hostname.clone());
    put("FQDN", allocation.fqdn.clone());
    put("Console IP", allocation.console_ip.clone());
    put("Allocated IP", allocation.allocated_ip.clone());
    row
}

fn record_status(records: &[DnsRecordResult], fqdn: &str) -> String {
    match records.iter().find(|r| r.fqdn == fqdn) {
        Some(record) => match record.status {
            RecordStatus::Created => "✅ Created".to_string(),
            RecordStatus::Failed => format!(
                "❌ Failed: {}",
                record.error.as_deref().unwrap_or("unknown error")
            ),
        },
        None => "⏭ Not registered".to_string(),
    }
}

/// Plain-text table for terminal output. Columns follow the first row.
pub fn render_table(rows: &[TableRow]) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };
    let columns: Vec<&String> = first.keys().collect();

    let cell = |row: &TableRow, column: &str| -> String {
        match row.get(column) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    };

    let widths: Vec<usize> = columns
        .iter()
        .map(|column| {
            rows.iter()
                .map(|row| cell(row, column).chars().count())
                .chain(std::iter::once(column.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |values: Vec<String>| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(value, width)| {
                let pad = width.saturating_sub(value.chars().count());
                format!("{}{}", value, " ".repeat(pad))
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    out.push_str(&line(columns.iter().map(|c| c.to_string()).collect()));
    out.push('\n');
    out.push_str(&line(widths.iter().map(|w| "-".repeat(*w)).collect()));
    for row in rows {
        out.push('\n');
        out.push_str(&line(columns.iter().map(|c| cell(row, c)).collect()));
    }
    out
}
