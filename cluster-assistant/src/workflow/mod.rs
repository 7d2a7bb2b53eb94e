//! Workflow orchestration.
//!
//! The orchestrator walks one [`WorkflowState`] from intent recognition to the
//! response formatter along the routes in [`graph`]. Every stage it enters
//! gets exactly one `started` entry and then exactly one `completed` or
//! `failed` entry on the progress trail. Nothing a stage does, including
//! panicking, stops the walk before the formatter has run.
//!
//! ## Module Structure
//!
//! - `graph` - Transition table and path helpers
//! - `stages` - Stage bodies

pub mod graph;
pub mod stages;

use cluster_assistant_sdk::{
    Clock, DnsClient, FormattedResponse, IntentClassifier, ProgressStatus, SheetFetcher,
    SheetParser, Stage, StageError, SystemClock, WorkflowState,
};
use futures::FutureExt;
use serde_json::{json, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::dns::Registrar;
use graph::{route, Route, INITIAL_STAGE};
use stages::StageOutcome;

/// Everything the stages talk to
#[derive(Clone)]
pub struct Collaborators {
    pub classifier: Arc<dyn IntentClassifier>,
    pub fetcher: Arc<dyn SheetFetcher>,
    pub parser: Arc<dyn SheetParser>,
    pub dns: Arc<dyn DnsClient>,
}

pub struct Orchestrator {
    classifier: Arc<dyn IntentClassifier>,
    fetcher: Arc<dyn SheetFetcher>,
    parser: Arc<dyn SheetParser>,
    registrar: Registrar,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            classifier: collaborators.classifier,
            fetcher: collaborators.fetcher,
            parser: collaborators.parser,
            registrar: Registrar::new(collaborators.dns),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock that stamps progress entries
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registrar(&self) -> &Registrar {
        &self.registrar
    }

    /// Process one request from start to finish
    pub async fn run(&self, user_input: impl Into<String>) -> WorkflowState {
        let mut state = WorkflowState::new(user_input);
        info!(request = %state.id, "Workflow started");

        let mut stage = INITIAL_STAGE;
        for _ in 0..Stage::ALL.len() {
            self.execute(stage, &mut state).await;
            match route(stage, state.resolved_intent()) {
                Route::Next(next) => stage = next,
                Route::End => break,
            }
        }

        if state.response.is_none() {
            // Only reachable if the formatter itself panicked.
            state.response = Some(FormattedResponse {
                message: format!(
                    "❌ Error: {}",
                    state.error.as_deref().unwrap_or("response could not be formatted")
                ),
                table: None,
            });
        }

        info!(
            request = %state.id,
            intent = %state.resolved_intent(),
            failed = state.is_failed(),
            "Workflow finished"
        );
        state
    }

    /// Run one stage with its progress bookkeeping
    async fn execute(&self, stage: Stage, state: &mut WorkflowState) {
        state.record(
            stage,
            ProgressStatus::Started,
            start_message(stage),
            Value::Null,
            self.clock.now(),
        );

        if state.is_failed() && stage != Stage::ResponseFormatter {
            debug!(stage = %stage, "Skipping stage after earlier failure");
            state.record(
                stage,
                ProgressStatus::Completed,
                "Skipped after an earlier failure",
                json!({ "skipped": true }),
                self.clock.now(),
            );
            return;
        }

        let result = AssertUnwindSafe(self.dispatch(stage, state))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                error!(stage = %stage, "Stage panicked");
                Err(StageError::Internal {
                    stage: stage.to_string(),
                    message: panic_message(panic.as_ref()),
                })
            });

        match result {
            Ok(outcome) => {
                info!(stage = %stage, intent = %state.resolved_intent(), "{}", outcome.message);
                state.record(
                    stage,
                    ProgressStatus::Completed,
                    outcome.message,
                    outcome.details,
                    self.clock.now(),
                );
            }
            Err(err) => {
                warn!(stage = %stage, kind = err.kind(), error = %err, "Stage failed");
                state.fail(&err);
                state.record(
                    stage,
                    ProgressStatus::Failed,
                    format!("Error: {}", err),
                    json!({ "error_kind": err.kind() }),
                    self.clock.now(),
                );
            }
        }
    }

    async fn dispatch(
        &self,
        stage: Stage,
        state: &mut WorkflowState,
    ) -> Result<StageOutcome, StageError> {
        match stage {
            Stage::IntentRecognition => {
                stages::recognize_intent(self.classifier.as_ref(), state).await
            }
            Stage::SheetsParsing => {
                stages::parse_sheets(self.fetcher.as_ref(), self.parser.as_ref(), state).await
            }
            Stage::IpAllocation => stages::allocate_ips(state),
            Stage::DnsCreation => stages::create_dns_records(&self.registrar, state).await,
            Stage::ResponseFormatter => Ok(stages::format(state)),
        }
    }
}

fn start_message(stage: Stage) -> &'static str {
    match stage {
        Stage::IntentRecognition => "Analyzing user input to determine intent...",
        Stage::SheetsParsing => "Fetching and parsing spreadsheet...",
        Stage::IpAllocation => "Allocating IP addresses from subnet...",
        Stage::DnsCreation => "Creating DNS records...",
        Stage::ResponseFormatter => "Formatting response...",
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "stage panicked".to_string()
    }
}
