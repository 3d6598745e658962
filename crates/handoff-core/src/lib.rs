//! Handoff Core - proximity file handoff state machine
//!
//! A sender advertises, a receiver discovers it, the two negotiate a link and
//! the file is streamed across. On success the sender relays the same file by
//! discovering the next peer.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod progress;
pub mod role;
pub mod sink;
pub mod transport;
pub mod session;
pub mod driver;

// Re-export commonly used types
pub use config::{DeviceInfo, HandoffConfig};
pub use endpoint::{AttemptOutcome, ConnectionAttempt, Endpoint};
pub use error::{FailureReason, HandoffError};
pub use progress::TransferProgress;
pub use role::Role;
pub use sink::{ActionKind, PendingAction, StatusNotifier, StatusSink, StatusUpdate};
pub use transport::{
    ConnectionInfo, ConnectionStatus, IncomingPayload, PayloadTransferUpdate, Strategy,
    TransferStatus, TransportAdapter, TransportError, TransportEvent, TransportEvents,
};
pub use session::{Session, SessionState};
pub use driver::{drive, spawn_drive};
