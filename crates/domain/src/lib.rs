//! Shared domain types for the AXE engine.
//!
//! Everything the other crates agree on lives here: the error taxonomy,
//! the configuration tree, parsed operations and their results, transcript
//! entries, agent identity, the XP curve, provider stream events, and
//! structured trace events.

pub mod agent;
pub mod config;
pub mod error;
pub mod operation;
pub mod stream;
pub mod trace;
pub mod xp;

pub use agent::{Agent, AgentStatus};
pub use error::{Error, Result};
pub use operation::{EntryKind, Operation, OperationResult, OperationStatus, TranscriptEntry};
