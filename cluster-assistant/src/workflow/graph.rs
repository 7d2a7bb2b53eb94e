//! The orchestrator's transition table.
//!
//! ```text
//! intent_recognition ──┬─> sheets_parsing ──┬─> ip_allocation ──┬─> dns_creation ──> response_formatter
//!                      ├─> dns_creation     └─> formatter       └─> formatter
//!                      └─> response_formatter
//! ```
//!
//! Routing looks at the intent only. A failed stage does not change the route;
//! downstream stages see the error and skip their work instead.

use cluster_assistant_sdk::{Intent, Stage};

/// Where control goes after a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Next(Stage),
    End,
}

pub const INITIAL_STAGE: Stage = Stage::IntentRecognition;

/// `(current stage, intent) -> next`
pub fn route(stage: Stage, intent: Intent) -> Route {
    use Intent::*;
    use Stage::*;

    match (stage, intent) {
        (IntentRecognition, CreateCluster | ParseSheets | AllocateIps) => Route::Next(SheetsParsing),
        (IntentRecognition, CreateDnsRecord) => Route::Next(DnsCreation),
        (IntentRecognition, GeneralChat) => Route::Next(ResponseFormatter),

        (SheetsParsing, CreateCluster | AllocateIps) => Route::Next(IpAllocation),
        (SheetsParsing, _) => Route::Next(ResponseFormatter),

        (IpAllocation, CreateCluster) => Route::Next(DnsCreation),
        (IpAllocation, _) => Route::Next(ResponseFormatter),

        (DnsCreation, _) => Route::Next(ResponseFormatter),

        (ResponseFormatter, _) => Route::End,
    }
}

/// Every stage reachable in one step from `stage`, under any intent
pub fn successors(stage: Stage) -> Vec<Stage> {
    let mut next = Vec::new();
    for intent in Intent::ALL {
        if let Route::Next(target) = route(stage, intent) {
            if !next.contains(&target) {
                next.push(target);
            }
        }
    }
    next
}

/// The full stage sequence a request with `intent` walks through
pub fn path_for(intent: Intent) -> Vec<Stage> {
    let mut path = vec![INITIAL_STAGE];
    let mut current = INITIAL_STAGE;
    // The graph is acyclic, so no walk is longer than the stage count.
    while path.len() <= Stage::ALL.len() {
        match route(current, intent) {
            Route::Next(next) => {
                path.push(next);
                current = next;
            }
            Route::End => break,
        }
    }
    path
}
