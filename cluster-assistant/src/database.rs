//! SQLite storage for chat history and infrastructure operations.
//!
//! Everything here is append-only. The orchestrator never reads it; it exists
//! so the CLI can show what was asked and what was changed across runs.
//!
//! # Database Schema
//!
//! 1. **chat_messages** - every user message and assistant reply, with the
//!    reply's table as JSON
//! 2. **operations** - one row per request whose intent mutates
//!    infrastructure, with the final workflow state as JSON
//! 3. **schema_version** - database schema version for migrations

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use cluster_assistant_sdk::{Intent, TableRow, WorkflowState};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

const SCHEMA_VERSION: i32 = 1;

pub struct Database {
    conn: Connection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(Sender::User),
            "assistant" => Ok(Sender::Assistant),
            _ => Err(anyhow!("Unknown message sender: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub sender: Sender,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<Vec<TableRow>>,
    pub timestamp: DateTime<Utc>,
}

impl StoredMessage {
    pub fn user(message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: Sender::User,
            message: message.into(),
            table: None,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Success,
    Failed,
}

impl OperationStatus {
    fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Success => "success",
            OperationStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(OperationStatus::Success),
            "failed" => Ok(OperationStatus::Failed),
            _ => Err(anyhow!("Unknown operation status: {}", s)),
        }
    }
}

/// Snapshot of one infrastructure-changing request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOperation {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub intent: Intent,
    pub user_input: String,
    pub status: OperationStatus,
    pub state: WorkflowState,
}

impl StoredOperation {
    pub fn from_state(state: &WorkflowState, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: state.id,
            timestamp,
            intent: state.resolved_intent(),
            user_input: state.user_input.clone(),
            status: if state.is_failed() {
                OperationStatus::Failed
            } else {
                OperationStatus::Success
            },
            state: state.clone(),
        }
    }
}

impl Database {
    /// Open (or create) the database at `path`
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // WAL lets the CLI read history while another process writes
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self { conn })
    }

    pub fn new_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Open the database at `path` and bring its schema up to date
    pub fn open(path: &Path) -> Result<Self> {
        let db = Self::new(path)?;
        db.initialize_schema()?;
        Ok(db)
    }

    pub fn initialize_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS chat_messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                sender TEXT NOT NULL,
                message TEXT NOT NULL,
                table_json TEXT,
                timestamp TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chat_messages_timestamp
            ON chat_messages(timestamp DESC);

            CREATE TABLE IF NOT EXISTS operations (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                timestamp TEXT NOT NULL,
                intent TEXT NOT NULL,
                user_input TEXT NOT NULL,
                status TEXT NOT NULL,
                state_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_operations_timestamp
            ON operations(timestamp DESC);

            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;

        Ok(())
    }

    pub fn get_schema_version(&self) -> Result<i32> {
        let version: i32 =
            self.conn
                .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
        Ok(version)
    }

    pub fn insert_chat_message(&self, message: &StoredMessage) -> Result<()> {
        let table_json = message
            .table
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn.execute(
            r#"
            INSERT INTO chat_messages (id, sender, message, table_json, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                message.id.to_string(),
                message.sender.as_str(),
                message.message,
                table_json,
                stored_timestamp(&message.timestamp),
            ],
        )?;

        Ok(())
    }

    /// Most recent `limit` messages, oldest first
    pub fn recent_messages(&self, limit: usize) -> Result<Vec<StoredMessage>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, sender, message, table_json, timestamp
            FROM chat_messages
            ORDER BY timestamp DESC, seq DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt
            .query_map([limit], read_message_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut messages = rows.into_iter().collect::<Result<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    pub fn insert_operation(&self, operation: &StoredOperation) -> Result<()> {
        let state_json = serde_json::to_string(&operation.state)?;

        self.conn.execute(
            r#"
            INSERT INTO operations (id, timestamp, intent, user_input, status, state_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                operation.id.to_string(),
                stored_timestamp(&operation.timestamp),
                operation.intent.as_str(),
                operation.user_input,
                operation.status.as_str(),
                state_json,
            ],
        )?;

        Ok(())
    }

    /// Most recent `limit` operations, newest first
    pub fn recent_operations(&self, limit: usize) -> Result<Vec<StoredOperation>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, timestamp, intent, user_input, status, state_json
            FROM operations
            ORDER BY timestamp DESC, seq DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt
            .query_map([limit], read_operation_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().collect()
    }

    pub fn count_operations(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM operations", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Fixed-width form so text ordering matches time ordering
fn stored_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid timestamp in database: {}", value))?
        .with_timezone(&Utc))
}

/// Column reads can fail in SQLite terms; decoding failures are reported separately
fn read_message_row(row: &Row) -> rusqlite::Result<Result<StoredMessage>> {
    let id: String = row.get(0)?;
    let sender: String = row.get(1)?;
    let message: String = row.get(2)?;
    let table_json: Option<String> = row.get(3)?;
    let timestamp: String = row.get(4)?;

    Ok((|| -> Result<StoredMessage> {
        Ok(StoredMessage {
            id: Uuid::parse_str(&id)?,
            sender: Sender::parse(&sender)?,
            message,
            table: table_json
                .map(|json| serde_json::from_str(&json))
                .transpose()?,
            timestamp: parse_timestamp(&timestamp)?,
        })
    })())
}

fn read_operation_row(row: &Row) -> rusqlite::Result<Result<StoredOperation>> {
    let id: String = row.get(0)?;
    let timestamp: String = row.get(1)?;
    let intent: String = row.get(2)?;
    let user_input: String = row.get(3)?;
    let status: String = row.get(4)?;
    let state_json: String = row.get(5)?;

    Ok((|| -> Result<StoredOperation> {
        Ok(StoredOperation {
            id: Uuid::parse_str(&id)?,
            timestamp: parse_timestamp(&timestamp)?,
            intent: Intent::from_label(&intent),
            user_input,
            status: OperationStatus::parse(&status)?,
            state: serde_json::from_str(&state_json)
                .context("Invalid workflow state snapshot")?,
        })
    })())
}
