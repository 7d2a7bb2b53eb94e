//! Request/response entry point.
//!
//! [`ChatService::handle`] takes one chat message, runs it through the
//! orchestrator and returns the reply. Persistence is best effort: a storage
//! failure is logged and the reply goes out unchanged.

use anyhow::{bail, Result};
use cluster_assistant_sdk::{
    ChatReply, ChatRequest, Clock, DnsClient, IntentClassifier, LanguageModel, SheetParser,
    SystemClock, WorkflowState,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::classifier::{LlmIntentClassifier, UnavailableClassifier};
use crate::config::{Settings, SheetParserKind};
use crate::database::{Database, Sender, StoredMessage, StoredOperation};
use crate::dns::{DryRunDnsClient, InfobloxClient};
use crate::formatter::help_message;
use crate::llm::GeminiClient;
use crate::sheets::{HttpSheetFetcher, LlmSheetParser, TabularSheetParser};
use crate::workflow::{Collaborators, Orchestrator};

/// Wire up real collaborators from settings
pub fn build_collaborators(settings: &Settings) -> Result<Collaborators> {
    let model: Option<Arc<dyn LanguageModel>> = if settings.has_llm() {
        Some(Arc::new(GeminiClient::from_settings(settings)?))
    } else {
        None
    };

    let classifier: Arc<dyn IntentClassifier> = match &model {
        Some(model) => Arc::new(LlmIntentClassifier::new(
            model.clone(),
            settings.llm_timeout(),
        )),
        None => {
            warn!("GOOGLE_GEMINI_API_KEY is not set; every request will be treated as general chat");
            Arc::new(UnavailableClassifier)
        }
    };

    let parser: Arc<dyn SheetParser> = match (settings.effective_sheet_parser(), &model) {
        (SheetParserKind::Llm, Some(model)) => {
            Arc::new(LlmSheetParser::new(model.clone(), settings.llm_timeout()))
        }
        (SheetParserKind::Llm, None) => {
            bail!("SHEET_PARSER=llm requires GOOGLE_GEMINI_API_KEY")
        }
        (SheetParserKind::Tabular, _) => Arc::new(TabularSheetParser),
    };

    let dns: Arc<dyn DnsClient> = if settings.dns_dry_run() {
        Arc::new(DryRunDnsClient::new())
    } else {
        Arc::new(InfobloxClient::new(&settings.infoblox, settings.http_timeout())?)
    };

    Ok(Collaborators {
        classifier,
        fetcher: Arc::new(HttpSheetFetcher::new(settings.http_timeout())?),
        parser,
        dns,
    })
}

/// Configuration and collaborator status
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub language_model: String,
    pub sheet_parser: SheetParserKind,
    pub dns: String,
    pub persistence: String,
    pub operations_recorded: Option<usize>,
}

pub struct ChatService {
    orchestrator: Orchestrator,
    store: Option<Arc<Mutex<Database>>>,
    clock: Arc<dyn Clock>,
}

impl ChatService {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            store: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_store(mut self, database: Database) -> Self {
        self.store = Some(Arc::new(Mutex::new(database)));
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the service from settings, opening the database unless `persist` is false
    pub fn from_settings(settings: &Settings, persist: bool) -> Result<Self> {
        let orchestrator = Orchestrator::new(build_collaborators(settings)?);
        let service = Self::new(orchestrator);
        if !persist {
            return Ok(service);
        }
        let path = settings.database_path();
        info!(path = %path.display(), "Opening database");
        Ok(service.with_store(Database::open(&path)?))
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Answer one chat message
    pub async fn handle(&self, request: ChatRequest) -> ChatReply {
        self.persist("user message", |db| {
            db.insert_chat_message(&StoredMessage::user(&request.message, self.clock.now()))
        })
        .await;

        let reply = if request.message.trim().is_empty() {
            let help = help_message();
            ChatReply {
                id: uuid::Uuid::new_v4(),
                message: help.message,
                table: None,
                progress_trail: None,
                current_stage: None,
                timestamp: self.clock.now(),
            }
        } else {
            let state = self.orchestrator.run(request.message.as_str()).await;
            if state.resolved_intent().mutates_infrastructure() {
                let operation = StoredOperation::from_state(&state, self.clock.now());
                self.persist("operation", |db| db.insert_operation(&operation))
                    .await;
            }
            self.reply_from_state(state)
        };

        self.persist("assistant reply", |db| {
            db.insert_chat_message(&StoredMessage {
                id: reply.id,
                sender: Sender::Assistant,
                message: reply.message.clone(),
                table: reply.table.clone(),
                timestamp: reply.timestamp,
            })
        })
        .await;

        reply
    }

    fn reply_from_state(&self, state: WorkflowState) -> ChatReply {
        let response = state.response.clone().unwrap_or_default();
        let message = if response.message.is_empty() {
            "Response generated successfully".to_string()
        } else {
            response.message
        };

        ChatReply {
            id: state.id,
            message,
            table: response.table,
            progress_trail: Some(state.progress_trail().to_vec()),
            current_stage: state.current_stage.map(|stage| stage.to_string()),
            timestamp: self.clock.now(),
        }
    }

    async fn persist<F>(&self, what: &str, write: F)
    where
        F: FnOnce(&Database) -> Result<()>,
    {
        let Some(store) = &self.store else {
            return;
        };
        let db = store.lock().await;
        if let Err(e) = write(&*db) {
            warn!(error = %e, "Failed to persist {}", what);
        }
    }

    /// Recent chat messages, oldest first. Empty when persistence is off.
    pub async fn history(&self, limit: usize) -> Result<Vec<StoredMessage>> {
        match &self.store {
            Some(store) => store.lock().await.recent_messages(limit),
            None => Ok(Vec::new()),
        }
    }

    /// Recent operations, newest first. Empty when persistence is off.
    pub async fn operations(&self, limit: usize) -> Result<Vec<StoredOperation>> {
        match &self.store {
            Some(store) => store.lock().await.recent_operations(limit),
            None => Ok(Vec::new()),
        }
    }

    pub async fn health(&self, settings: &Settings) -> HealthReport {
        let operations_recorded = match &self.store {
            Some(store) => store.lock().await.count_operations().ok(),
            None => None,
        };

        HealthReport {
            status: "healthy",
            language_model: if settings.has_llm() {
                settings.gemini_model.clone()
            } else {
                "not configured".to_string()
            },
            sheet_parser: settings.effective_sheet_parser(),
            dns: self.orchestrator.registrar().describe(),
            persistence: if self.store.is_some() {
                settings.database_path().display().to_string()
            } else {
                "disabled".to_string()
            },
            operations_recorded,
        }
    }
}
