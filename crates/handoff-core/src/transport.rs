//! Transport adapter seam.
//!
//! The proximity transport is a collaborator, not part of the core. Its
//! callback surface is delivered as [`TransportEvent`]s on an unbounded
//! channel; [`crate::driver::drive`] applies them to the session in order.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use storage::PayloadFile;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::endpoint::Endpoint;

/// Status code for a successful connection.
pub const STATUS_OK: i32 = 0;
/// Status code for a generic transport error.
pub const STATUS_ERROR: i32 = 13;
/// Status code for a connection declined by one or both sides.
pub const STATUS_CONNECTION_REJECTED: i32 = 8004;

/// Topology for advertise/discover. Both roles must use the same one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Symmetric, one active link at a time.
    PointToPoint,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::PointToPoint => "p2p_point_to_point",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("a link is already active")]
    LinkBusy,

    #[error("{0}")]
    Failed(String),
}

impl TransportError {
    /// Message passed through to the status text.
    pub fn message(&self) -> String {
        match self {
            TransportError::Unavailable(msg) | TransportError::Failed(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub endpoint_name: String,
    pub is_incoming: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Ok,
    Rejected,
    Error { message: Option<String> },
    Unknown { code: i32 },
}

impl ConnectionStatus {
    pub fn from_code(code: i32, message: Option<String>) -> Self {
        match code {
            STATUS_OK => ConnectionStatus::Ok,
            STATUS_CONNECTION_REJECTED => ConnectionStatus::Rejected,
            STATUS_ERROR => ConnectionStatus::Error { message },
            code => ConnectionStatus::Unknown { code },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    InProgress,
    Success,
    Failure,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadTransferUpdate {
    pub payload_id: i64,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    pub status: TransferStatus,
}

/// A payload arriving from the peer. The transport writes it to `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingPayload {
    pub payload_id: i64,
    pub name: String,
    pub total_bytes: u64,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    EndpointFound { endpoint: Endpoint },
    EndpointLost { endpoint_id: String },
    ConnectionInitiated { endpoint: Endpoint, info: ConnectionInfo },
    ConnectionResult { endpoint_id: String, status: ConnectionStatus },
    Disconnected { endpoint_id: String },
    PayloadReceived { endpoint_id: String, payload: IncomingPayload },
    PayloadTransferUpdate { endpoint_id: String, update: PayloadTransferUpdate },
}

/// Handle the transport uses to report events. Cheap to clone; sending
/// never blocks.
#[derive(Clone, Debug)]
pub struct TransportEvents {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportEvents {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: TransportEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("transport event dropped, session gone");
        }
    }
}

/// The proximity networking primitive.
///
/// `reject_connection` and locally initiated `disconnect_from_endpoint` do not
/// produce events on the local side.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    async fn start_advertising(
        &self,
        name: &str,
        service_id: &str,
        strategy: Strategy,
        events: TransportEvents,
    ) -> Result<(), TransportError>;

    async fn start_discovery(
        &self,
        service_id: &str,
        strategy: Strategy,
        events: TransportEvents,
    ) -> Result<(), TransportError>;

    async fn stop_advertising(&self);

    async fn stop_discovery(&self);

    async fn request_connection(
        &self,
        name: &str,
        endpoint_id: &str,
        events: TransportEvents,
    ) -> Result<(), TransportError>;

    async fn accept_connection(
        &self,
        endpoint_id: &str,
        events: TransportEvents,
    ) -> Result<(), TransportError>;

    async fn reject_connection(&self, endpoint_id: &str) -> Result<(), TransportError>;

    /// Queue `payload` for sending and return its payload id. Progress is
    /// reported through `PayloadTransferUpdate` events.
    async fn send_payload(&self, endpoint_id: &str, payload: PayloadFile)
        -> Result<i64, TransportError>;

    async fn disconnect_from_endpoint(&self, endpoint_id: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ConnectionStatus::from_code(0, None), ConnectionStatus::Ok);
        assert_eq!(ConnectionStatus::from_code(8004, None), ConnectionStatus::Rejected);
        assert_eq!(
            ConnectionStatus::from_code(13, Some("boom".into())),
            ConnectionStatus::Error { message: Some("boom".into()) }
        );
        assert_eq!(
            ConnectionStatus::from_code(8007, None),
            ConnectionStatus::Unknown { code: 8007 }
        );
    }

    #[tokio::test]
    async fn test_events_keep_order() {
        let (events, mut rx) = TransportEvents::channel();
        events.emit(TransportEvent::EndpointLost { endpoint_id: "A".into() });
        events.emit(TransportEvent::Disconnected { endpoint_id: "B".into() });

        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::EndpointLost { endpoint_id: "A".into() })
        );
        assert_eq!(
            rx.recv().await,
            Some(TransportEvent::Disconnected { endpoint_id: "B".into() })
        );
    }
}
