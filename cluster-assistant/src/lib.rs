//! Cluster provisioning assistant.
//!
//! Turns chat messages into cluster-provisioning actions: classify the intent,
//! read node data from a spreadsheet, allocate addresses from a subnet and
//! register DNS records, then report back with a message and a table.

// IP allocation
pub mod allocator;

// Intent classification
pub mod classifier;

// Settings
pub mod config;

// Chat history and operation storage
pub mod database;

// DNS clients and registrar
pub mod dns;

// Reply rendering
pub mod formatter;

// Language model client
pub mod llm;

// Sheet fetching and parsing
pub mod sheets;

// Orchestrator
pub mod workflow;

// Request/response entry point
pub mod chat;

pub use chat::{ChatService, HealthReport};
pub use workflow::{Collaborators, Orchestrator};
