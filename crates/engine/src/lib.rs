//! The AXE agent-execution engine.
//!
//! Construction order (no cycles, no globals):
//! Store → Registry → Transcript → Supervisor(Registry, Transcript) →
//! SessionScheduler(Registry, Transcript, Supervisor, Runner, Parser,
//! Provider, Summarizer).  The [`session::SessionBuilder`] wires it all.

pub mod cancel;
pub mod control;
pub mod mailbox;
pub mod rate_limit;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod supervisor;
pub mod transcript;

pub use cancel::CancelToken;
pub use registry::AgentRegistry;
pub use scheduler::{SessionScheduler, SessionSummary};
pub use session::SessionBuilder;
pub use supervisor::Supervisor;
pub use transcript::Transcript;
