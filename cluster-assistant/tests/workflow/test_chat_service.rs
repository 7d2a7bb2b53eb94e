//! Chat service: replies, persistence and health

use super::common::*;
use cluster_assistant::config::Settings;
use cluster_assistant::database::{Database, OperationStatus, Sender};
use cluster_assistant::ChatService;
use cluster_assistant_sdk::{ChatRequest, Classification, Intent, Stage};
use tempfile::TempDir;

fn service(classification: Classification, nodes: usize) -> ChatService {
    let h = harness(classification, Ok(sheet_with(nodes)));
    ChatService::new(h.orchestrator)
        .with_store(in_memory_db())
        .with_clock(fixed_clock())
}

fn in_memory_db() -> Database {
    let db = Database::new_in_memory().unwrap();
    db.initialize_schema().unwrap();
    db
}

#[tokio::test]
async fn test_blank_message_gets_help() {
    let service = service(Classification::new(Intent::CreateCluster, 0.9), 3);
    let reply = service.handle(ChatRequest::new("   ")).await;

    assert!(reply.message.contains("OpenShift Cluster Management Assistant"));
    assert!(reply.progress_trail.is_none());
    assert!(reply.current_stage.is_none());
    assert!(service.operations(10).await.unwrap().is_empty());

    let history = service.history(10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].sender, Sender::User);
    assert_eq!(history[1].sender, Sender::Assistant);
}

#[tokio::test]
async fn test_cluster_request_is_recorded() {
    let service = service(cluster_request("ocp.example.com", "10.0.0.0/24"), 4);
    let reply = service.handle(ChatRequest::new("create a cluster")).await;

    assert_eq!(reply.current_stage.as_deref(), Some("response_formatter"));
    assert_eq!(reply.table.as_ref().map(Vec::len), Some(4));
    let trail = reply.progress_trail.as_ref().unwrap();
    assert_eq!(trail.first().unwrap().stage_name, Stage::IntentRecognition);
    assert_eq!(trail.len(), 10);

    let operations = service.operations(10).await.unwrap();
    assert_eq!(operations.len(), 1);
    assert_eq!(operations[0].intent, Intent::CreateCluster);
    assert_eq!(operations[0].status, OperationStatus::Success);
    assert_eq!(operations[0].id, reply.id);
    assert_eq!(operations[0].state.allocations.len(), 4);

    let history = service.history(10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].message, "create a cluster");
    assert_eq!(history[1].message, reply.message);
    assert_eq!(history[1].table, reply.table);
}

#[tokio::test]
async fn test_failed_operation_is_recorded_as_failed() {
    let service = service(cluster_request("ocp.example.com", "not-a-subnet"), 2);
    let reply = service.handle(ChatRequest::new("create a cluster")).await;

    assert!(reply.message.starts_with("❌ Error:"));
    let operations = service.operations(10).await.unwrap();
    assert_eq!(operations[0].status, OperationStatus::Failed);
}

#[tokio::test]
async fn test_general_chat_is_not_an_operation() {
    let service = service(Classification::new(Intent::GeneralChat, 0.9), 1);
    service.handle(ChatRequest::new("hello")).await;
    service.handle(ChatRequest::new("what can you do")).await;

    assert!(service.operations(10).await.unwrap().is_empty());
    assert_eq!(service.history(10).await.unwrap().len(), 4);
    assert_eq!(service.history(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_without_store() {
    let h = harness(Classification::new(Intent::GeneralChat, 0.9), Ok(sheet_with(1)));
    let service = ChatService::new(h.orchestrator);
    let reply = service.handle(ChatRequest::new("hello")).await;

    assert!(!reply.message.is_empty());
    assert!(service.history(10).await.unwrap().is_empty());
    assert!(service.operations(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_from_default_settings() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("assistant.db");
    let settings = Settings {
        database_path: Some(db_path.clone()),
        ..Settings::default()
    };

    let service = ChatService::from_settings(&settings, true).unwrap();

    // Without a language model every request is answered with help.
    let reply = service
        .handle(ChatRequest::new("create a cluster from my sheet"))
        .await;
    assert!(reply.message.contains("OpenShift"));

    let health = service.health(&settings).await;
    assert_eq!(health.status, "healthy");
    assert_eq!(health.language_model, "not configured");
    assert!(health.dns.starts_with("dry-run"));
    assert_eq!(health.operations_recorded, Some(0));
    drop(service);

    let db = Database::open(&db_path).unwrap();
    let messages = db.recent_messages(10).unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].message, "create a cluster from my sheet");
}

#[tokio::test]
async fn test_llm_parser_requires_key() {
    let settings = Settings {
        sheet_parser: Some(cluster_assistant::config::SheetParserKind::Llm),
        ..Settings::default()
    };
    assert!(ChatService::from_settings(&settings, false).is_err());
}
