//! Spreadsheet retrieval and parsing.
//!
//! Fetching resolves a sheet reference to a CSV export and retries once on an
//! alternate export URL when the first answer is not tabular. Two parsers turn
//! the CSV into a [`ParsedSheet`]: a language-model assisted one and a
//! deterministic column reader.

use anyhow::Context;
use cluster_assistant_sdk::{
    async_trait, LanguageModel, ParsedSheet, SheetFetcher, SheetParser, StageError,
};
use serde::Deserialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::llm::{parse_json_object, truncate};

const USER_AGENT: &str = concat!("cluster-assistant/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Reference resolution
// ============================================================================

/// Where the content behind a sheet reference lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSource {
    Remote {
        primary: String,
        alternate: Option<String>,
    },
    File(PathBuf),
}

/// Resolve a user supplied reference.
///
/// Google Sheets links become CSV export URLs (with an alternate export form
/// to retry on). Other http(s) URLs are fetched as-is. `file://` URLs and
/// bare paths are read from disk.
pub fn resolve_reference(reference: &str) -> Result<SheetSource, StageError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(StageError::Fetch("empty sheet reference".to_string()));
    }

    let url = match Url::parse(reference) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            return Ok(SheetSource::File(PathBuf::from(reference)))
        }
        Err(e) => {
            return Err(StageError::Fetch(format!(
                "invalid sheet reference '{}': {}",
                reference, e
            )))
        }
    };

    match url.scheme() {
        "file" => url
            .to_file_path()
            .map(SheetSource::File)
            .map_err(|_| StageError::Fetch(format!("invalid file reference '{}'", reference))),
        "http" | "https" => Ok(match google_sheet_id(&url) {
            Some(id) => {
                let gid = google_sheet_gid(&url);
                SheetSource::Remote {
                    primary: format!(
                        "https://docs.google.com/spreadsheets/d/{id}/export?format=csv&gid={gid}"
                    ),
                    alternate: Some(format!(
                        "https://docs.google.com/spreadsheets/d/{id}/export?format=csv&id={id}&gid={gid}"
                    )),
                }
            }
            None => SheetSource::Remote {
                primary: url.to_string(),
                alternate: None,
            },
        }),
        other => Err(StageError::Fetch(format!(
            "unsupported sheet reference scheme '{}'",
            other
        ))),
    }
}

fn google_sheet_id(url: &Url) -> Option<String> {
    if url.host_str()? != "docs.google.com" {
        return None;
    }
    let segments: Vec<&str> = url.path_segments()?.collect();
    let d = segments.iter().position(|s| *s == "d")?;
    if d == 0 || segments[d - 1] != "spreadsheets" {
        return None;
    }
    segments
        .get(d + 1)
        .filter(|id| !id.is_empty())
        .map(|id| id.to_string())
}

/// Sheet tab id from `?gid=` or `#gid=`, defaulting to the first tab
fn google_sheet_gid(url: &Url) -> String {
    let from_query = url
        .query_pairs()
        .find(|(key, _)| key == "gid")
        .map(|(_, value)| value.into_owned());
    let from_fragment = || {
        url.fragment()
            .and_then(|f| f.split('&').find_map(|kv| kv.strip_prefix("gid=")))
            .map(str::to_string)
    };

    from_query
        .or_else(from_fragment)
        .filter(|gid| !gid.is_empty() && gid.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or_else(|| "0".to_string())
}

// ============================================================================
// Fetching
// ============================================================================

/// Decide whether an HTTP answer carries tabular content
pub fn classify_page(status: u16, body: &str) -> Result<(), String> {
    if !(200..300).contains(&status) {
        return Err(format!("HTTP {}", status));
    }
    let trimmed = body.trim_start();
    if trimmed.is_empty() {
        return Err("empty response".to_string());
    }
    if trimmed.starts_with('<') {
        return Err("received an HTML page instead of CSV (is the sheet shared?)".to_string());
    }
    Ok(())
}

/// Fetch `primary`, falling back once to `alternate` on any failure.
///
/// `get` performs one GET and yields `(status, body)` or a transport error.
pub async fn fetch_with_fallback<F, Fut>(
    primary: &str,
    alternate: Option<&str>,
    get: F,
) -> Result<String, StageError>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<(u16, String), String>>,
{
    let attempt = |url: &str| {
        let response = get(url.to_string());
        async move {
            let (status, body) = response.await?;
            classify_page(status, &body).map(|_| body)
        }
    };

    let first_error = match attempt(primary).await {
        Ok(body) => return Ok(body),
        Err(e) => e,
    };

    let Some(alternate) = alternate else {
        return Err(StageError::Fetch(format!("{}: {}", primary, first_error)));
    };

    warn!(url = primary, error = %first_error, "Sheet export failed, retrying alternate URL");
    match attempt(alternate).await {
        Ok(body) => Ok(body),
        Err(second_error) => Err(StageError::Fetch(format!(
            "{}: {}; {}: {}",
            primary, first_error, alternate, second_error
        ))),
    }
}

pub struct HttpSheetFetcher {
    client: reqwest::Client,
}

impl HttpSheetFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client for sheet fetching")?;
        Ok(Self { client })
    }

    async fn get(&self, url: String) -> Result<(u16, String), String> {
        debug!(url = %url, "Fetching sheet");
        let response = self.client.get(&url).send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| e.to_string())?;
        Ok((status, body))
    }
}

#[async_trait]
impl SheetFetcher for HttpSheetFetcher {
    async fn fetch(&self, reference: &str) -> Result<String, StageError> {
        match resolve_reference(reference)? {
            SheetSource::Remote { primary, alternate } => {
                let content =
                    fetch_with_fallback(&primary, alternate.as_deref(), |url| self.get(url)).await?;
                info!(url = %primary, bytes = content.len(), "Fetched sheet");
                Ok(content)
            }
            SheetSource::File(path) => {
                let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                    StageError::Fetch(format!("{}: {}", path.display(), e))
                })?;
                if content.trim().is_empty() {
                    return Err(StageError::Fetch(format!("{}: file is empty", path.display())));
                }
                Ok(content)
            }
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct RawSheet {
    #[serde(default)]
    fqdn: Option<String>,
    #[serde(default)]
    subnet: Option<String>,
    #[serde(default)]
    node_ips: Option<Vec<String>>,
    #[serde(default)]
    node_names: Option<Vec<String>>,
}

impl From<RawSheet> for ParsedSheet {
    fn from(raw: RawSheet) -> Self {
        let mut names = raw.node_names.unwrap_or_default().into_iter();
        let mut node_ips = Vec::new();
        let mut node_names = Vec::new();

        // Names pair with IPs by position, so blanks are dropped pairwise.
        for ip in raw.node_ips.unwrap_or_default() {
            let name = names.next().and_then(|name| non_empty(Some(name)));
            if let Some(ip) = non_empty(Some(ip)) {
                node_ips.push(ip);
                node_names.push(name);
            }
        }

        ParsedSheet {
            fqdn: non_empty(raw.fqdn),
            subnet: non_empty(raw.subnet),
            node_ips,
            node_names: aligned_names(node_names),
        }
    }
}

/// Names for every node, or none at all when any node is unnamed
fn aligned_names(names: Vec<Option<String>>) -> Vec<String> {
    names.into_iter().collect::<Option<Vec<_>>>().unwrap_or_default()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null") && v != "Not found")
}

pub fn sheet_prompt(content: &str) -> String {
    format!(
        r#"Parse the following Google Sheets CSV content and extract cluster information.

CSV Content:
{content}

Extract:
1. FQDN - the domain for the cluster
2. Subnet - network subnet in CIDR format (e.g. 10.0.0.0/16)
3. Node Console IPs - IP addresses of the cluster nodes, in sheet order
4. Node Names - names of the nodes if available

Return a JSON object:
{{
    "fqdn": "cluster.example.com",
    "subnet": "10.0.0.0/16",
    "node_ips": ["10.8.8.8", "10.8.8.9", "10.8.8.10"],
    "node_names": ["node1", "node2", "node3"]
}}

Only return valid JSON, no additional text."#
    )
}

/// Language-model assisted extraction
pub struct LlmSheetParser {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl LlmSheetParser {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }
}

#[async_trait]
impl SheetParser for LlmSheetParser {
    async fn parse(&self, content: &str) -> Result<ParsedSheet, StageError> {
        let prompt = sheet_prompt(content);
        let response = tokio::time::timeout(self.timeout, self.model.generate(&prompt))
            .await
            .map_err(|_| {
                StageError::Parse(format!(
                    "no response from {} within {:?}",
                    self.model.name(),
                    self.timeout
                ))
            })?
            .map_err(|e| StageError::Parse(e.to_string()))?;

        debug!(response = %truncate(&response, 200), "Sheet parser response");
        let raw: RawSheet = parse_json_object(&response).map_err(StageError::Parse)?;
        Ok(raw.into())
    }
}

/// Deterministic CSV reader.
///
/// Two layouts are understood. Wide: one header row with `FQDN`, `Subnet` and
/// `Node1..NodeN` columns, values on the next row. Long: one node per row with
/// an IP column (`Console IP`, `IP`, `IP Address`, `Node IP`) and optionally a
/// name column (`Name`, `Hostname`, `Node Name`, `Node`), with `FQDN` and
/// `Subnet` taken from the first row that fills them.
#[derive(Debug, Default)]
pub struct TabularSheetParser;

const FQDN_COLUMNS: &[&str] = &["fqdn", "domain", "clusterfqdn", "clusterdomain"];
const SUBNET_COLUMNS: &[&str] = &["subnet", "cidr", "network"];
const IP_COLUMNS: &[&str] = &["consoleip", "ip", "ipaddress", "nodeip", "nodeconsoleip"];
const NAME_COLUMNS: &[&str] = &["name", "hostname", "nodename", "node"];

fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn is_numbered_node_column(header: &str) -> bool {
    header
        .strip_prefix("node")
        .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

fn find_column(headers: &[String], names: &[&str]) -> Option<usize> {
    headers.iter().position(|h| names.contains(&h.as_str()))
}

fn cell(record: &csv::StringRecord, index: Option<usize>) -> Option<String> {
    index
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl TabularSheetParser {
    pub fn parse_content(&self, content: &str) -> Result<ParsedSheet, StageError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.trim_start_matches('\u{feff}').as_bytes());

        let raw_headers = reader
            .headers()
            .map_err(|e| StageError::Parse(format!("unreadable header row: {}", e)))?
            .clone();
        let headers: Vec<String> = raw_headers.iter().map(normalize_header).collect();

        let records = reader
            .records()
            .enumerate()
            .map(|(idx, record)| {
                record.map_err(|e| StageError::Parse(format!("unreadable row {}: {}", idx + 2, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let fqdn_col = find_column(&headers, FQDN_COLUMNS);
        let subnet_col = find_column(&headers, SUBNET_COLUMNS);
        let first_filled = |col: Option<usize>| records.iter().find_map(|r| cell(r, col));

        let node_columns: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| is_numbered_node_column(h))
            .map(|(i, _)| i)
            .collect();

        let mut sheet = ParsedSheet {
            fqdn: first_filled(fqdn_col),
            subnet: first_filled(subnet_col),
            ..ParsedSheet::default()
        };

        if !node_columns.is_empty() {
            let row = records
                .iter()
                .find(|r| node_columns.iter().any(|&i| cell(r, Some(i)).is_some()));
            if let Some(row) = row {
                for &i in &node_columns {
                    if let Some(ip) = cell(row, Some(i)) {
                        sheet.node_ips.push(ip);
                        sheet.node_names.push(raw_headers[i].trim().to_string());
                    }
                }
            }
            return Ok(sheet);
        }

        let Some(ip_col) = find_column(&headers, IP_COLUMNS) else {
            return Err(StageError::Parse(format!(
                "no node IP columns in header: {}",
                raw_headers.iter().collect::<Vec<_>>().join(", ")
            )));
        };
        let name_col = find_column(&headers, NAME_COLUMNS);

        let mut names = Vec::new();
        for record in &records {
            if let Some(ip) = cell(record, Some(ip_col)) {
                sheet.node_ips.push(ip);
                names.push(cell(record, name_col));
            }
        }
        sheet.node_names = aligned_names(names);
        Ok(sheet)
    }
}

#[async_trait]
impl SheetParser for TabularSheetParser {
    async fn parse(&self, content: &str) -> Result<ParsedSheet, StageError> {
        self.parse_content(content)
    }
}
