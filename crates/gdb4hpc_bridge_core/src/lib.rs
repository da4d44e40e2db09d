//! gdb4hpc Bridge Core
//!
//! An async library that drives the gdb4hpc parallel debugger over its
//! machine interface. It parses MI records, correlates tokenized commands
//! with their results, and keeps per-rank views of threads, stacks,
//! variables and breakpoints for every process set of a running job.

pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod focus;
pub mod mi;
pub mod ops;
pub mod overlay;
pub mod ranges;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use channel::{CommandChannel, Resolution, Submission};
pub use config::BridgeConfig;
pub use dispatcher::{EventDispatcher, RunState};
pub use error::BridgeError;
pub use events::{DebugEvent, EventSink, OutputCategory, RankId, StopReason};
pub use focus::Focus;
pub use overlay::{EntryKind, OverlayKey, OverlayStore};
pub use ranges::{Rank, RangeSet};
pub use session::{DebugSession, SpawnedSession};
pub use transport::Transport;

/// Result type alias using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;
