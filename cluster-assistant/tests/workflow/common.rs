//! Stub collaborators and fixtures shared by the workflow tests

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use cluster_assistant::workflow::{Collaborators, Orchestrator};
use cluster_assistant_sdk::{
    async_trait, Classification, Clock, CollaboratorResult, DnsClient, Intent, IntentClassifier,
    ParsedSheet, SheetFetcher, SheetParser, StageError, ZoneRef,
};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const SHEET_URL: &str = "https://docs.google.com/spreadsheets/d/abc123/edit#gid=0";

/// Always returns the same classification
pub struct StubClassifier(pub Classification);

#[async_trait]
impl IntentClassifier for StubClassifier {
    async fn classify(&self, _text: &str) -> Classification {
        self.0.clone()
    }
}

/// Returns fixed content and counts calls
#[derive(Default)]
pub struct StubFetcher {
    pub calls: AtomicUsize,
}

impl StubFetcher {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SheetFetcher for StubFetcher {
    async fn fetch(&self, _reference: &str) -> Result<String, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("FQDN,Subnet,Node1\n,,192.168.100.10".to_string())
    }
}

/// Returns a fixed parse result
pub struct StubParser(pub Result<ParsedSheet, StageError>);

#[async_trait]
impl SheetParser for StubParser {
    async fn parse(&self, _content: &str) -> Result<ParsedSheet, StageError> {
        self.0.clone()
    }
}

pub struct PanickingParser;

#[async_trait]
impl SheetParser for PanickingParser {
    async fn parse(&self, _content: &str) -> Result<ParsedSheet, StageError> {
        panic!("parser exploded")
    }
}

/// Records every DNS call; fails records whose FQDN is in `failing`
#[derive(Default)]
pub struct RecordingDns {
    pub records: Mutex<Vec<(String, IpAddr)>>,
    pub zones: Mutex<Vec<String>>,
    pub failing: Vec<String>,
}

impl RecordingDns {
    pub fn failing(fqdns: &[&str]) -> Self {
        Self {
            failing: fqdns.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn created(&self) -> Vec<(String, IpAddr)> {
        self.records.lock().unwrap().clone()
    }

    pub fn zones(&self) -> Vec<String> {
        self.zones.lock().unwrap().clone()
    }
}

#[async_trait]
impl DnsClient for RecordingDns {
    fn describe(&self) -> String {
        "recording stub".to_string()
    }

    async fn create_record(&self, fqdn: &str, ip: IpAddr) -> CollaboratorResult<String> {
        if self.failing.iter().any(|f| f == fqdn) {
            return Err(format!("appliance rejected {}", fqdn).into());
        }
        self.records.lock().unwrap().push((fqdn.to_string(), ip));
        Ok(format!("record:a/stub:{}/default", fqdn))
    }

    async fn ensure_zone(&self, name: &str) -> CollaboratorResult<ZoneRef> {
        self.zones.lock().unwrap().push(name.to_string());
        Ok(ZoneRef {
            name: name.to_string(),
            reference: format!("zone_auth/stub:{}/default", name),
            created: true,
        })
    }
}

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()))
}

/// `count` console IPs in sheet order
pub fn console_ips(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("192.168.100.{}", 10 + i)).collect()
}

pub fn sheet_with(count: usize) -> ParsedSheet {
    ParsedSheet {
        fqdn: None,
        subnet: None,
        node_ips: console_ips(count),
        node_names: (1..=count).map(|i| format!("Node{}", i)).collect(),
    }
}

pub fn cluster_request(fqdn: &str, subnet: &str) -> Classification {
    Classification {
        sheets_reference: Some(SHEET_URL.to_string()),
        fqdn: Some(fqdn.to_string()),
        subnet: Some(subnet.to_string()),
        ..Classification::new(Intent::CreateCluster, 0.95)
    }
}

/// Everything a test needs to inspect after a run
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub fetcher: Arc<StubFetcher>,
    pub dns: Arc<RecordingDns>,
}

pub fn harness_with(
    classification: Classification,
    parser: Arc<dyn SheetParser>,
    dns: RecordingDns,
) -> Harness {
    let fetcher = Arc::new(StubFetcher::default());
    let dns = Arc::new(dns);
    let orchestrator = Orchestrator::new(Collaborators {
        classifier: Arc::new(StubClassifier(classification)),
        fetcher: fetcher.clone(),
        parser,
        dns: dns.clone(),
    })
    .with_clock(fixed_clock());

    Harness {
        orchestrator,
        fetcher,
        dns,
    }
}

pub fn harness(classification: Classification, sheet: Result<ParsedSheet, StageError>) -> Harness {
    harness_with(
        classification,
        Arc::new(StubParser(sheet)),
        RecordingDns::default(),
    )
}
