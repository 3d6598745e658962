//! Peer session state machine.
//!
//! One session owns one handoff: advertising or discovery, connection
//! negotiation, payload streaming and, for a chaining sender, the pivot back
//! into discovery for the next peer. All mutation happens under one mutex, so
//! transport events and user actions arriving from different tasks are applied
//! one at a time. Status updates go out through a [`StatusNotifier`] and never
//! block.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use storage::Storage;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::config::HandoffConfig;
use crate::endpoint::{AttemptOutcome, ConnectionAttempt, Endpoint};
use crate::error::{FailureReason, HandoffError};
use crate::progress::TransferProgress;
use crate::role::Role;
use crate::sink::{ActionKind, PendingAction, StatusNotifier};
use crate::transport::{
    ConnectionInfo, ConnectionStatus, IncomingPayload, PayloadTransferUpdate, TransferStatus,
    TransportAdapter, TransportEvent, TransportEvents,
};

const SEARCHING: &str = "Searching connection...";
const SENDING_REQUEST: &str = "Sending request...";
const SENDING_FILE: &str = "Sending file...";
const RECEIVING_FILE: &str = "Receiving file...";
const CONNECTION_LOST: &str = "Connection Lost";
const DONE: &str = "Done";
const UNKNOWN_ERROR: &str = "Unknown error";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Advertising,
    /// Scanning for advertisers. `handed_off` is the peer whose transfer
    /// just completed when a sender chains; its teardown is expected.
    Discovering { handed_off: Option<String> },
    Connecting { endpoint: Endpoint },
    Connected { endpoint: Endpoint },
    Transferring { endpoint: Endpoint },
    /// Terminal success. The link to `endpoint` is closing gracefully.
    Completed { endpoint: Endpoint },
    Failed { reason: FailureReason },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Advertising => "advertising",
            SessionState::Discovering { .. } => "discovering",
            SessionState::Connecting { .. } => "connecting",
            SessionState::Connected { .. } => "connected",
            SessionState::Transferring { .. } => "transferring",
            SessionState::Completed { .. } => "completed",
            SessionState::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed { .. } | SessionState::Failed { .. })
    }

    /// The peer of the current link, if any.
    pub fn peer(&self) -> Option<&Endpoint> {
        match self {
            SessionState::Connecting { endpoint }
            | SessionState::Connected { endpoint }
            | SessionState::Transferring { endpoint } => Some(endpoint),
            _ => None,
        }
    }

    /// Whether a disconnect from `endpoint_id` is the expected teardown of a
    /// completed transfer.
    fn closed_gracefully(&self, endpoint_id: &str) -> bool {
        match self {
            SessionState::Completed { endpoint } => endpoint.id == endpoint_id,
            SessionState::Discovering { handed_off: Some(id) } => id == endpoint_id,
            _ => false,
        }
    }
}

struct SessionInner {
    state: SessionState,
    role: Option<Role>,
    file: Option<PathBuf>,
    local_name: String,
    attempt: Option<ConnectionAttempt>,
    progress: Option<TransferProgress>,
    discovered: HashMap<String, Endpoint>,
    offered: Option<String>,
    advertising: bool,
    discovering: bool,
    last_status: Option<String>,
    received_file: Option<PathBuf>,
}

impl SessionInner {
    fn role(&self) -> Role {
        self.role.unwrap_or(Role::Receiver)
    }
}

pub struct Session {
    config: HandoffConfig,
    transport: Arc<dyn TransportAdapter>,
    storage: Arc<dyn Storage>,
    notifier: StatusNotifier,
    events: TransportEvents,
    inner: Mutex<SessionInner>,
}

fn invalid(action: &'static str, state: &SessionState) -> HandoffError {
    HandoffError::InvalidStateTransition {
        action,
        state: state.name(),
    }
}

impl Session {
    /// Create an idle session. The returned receiver carries the transport's
    /// events; hand it to [`crate::driver::drive`].
    pub fn new(
        config: HandoffConfig,
        transport: Arc<dyn TransportAdapter>,
        storage: Arc<dyn Storage>,
        notifier: StatusNotifier,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, rx) = TransportEvents::channel();
        let local_name = config.endpoint_name();

        let session = Self {
            config,
            transport,
            storage,
            notifier,
            events,
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                role: None,
                file: None,
                local_name,
                attempt: None,
                progress: None,
                discovered: HashMap::new(),
                offered: None,
                advertising: false,
                discovering: false,
                last_status: None,
                received_file: None,
            }),
        };

        (Arc::new(session), rx)
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state.clone()
    }

    pub async fn is_finished(&self) -> bool {
        self.inner.lock().await.state.is_terminal()
    }

    pub async fn role(&self) -> Option<Role> {
        self.inner.lock().await.role
    }

    pub async fn progress(&self) -> Option<TransferProgress> {
        self.inner.lock().await.progress
    }

    pub async fn attempt(&self) -> Option<ConnectionAttempt> {
        self.inner.lock().await.attempt.clone()
    }

    pub async fn last_status(&self) -> Option<String> {
        self.inner.lock().await.last_status.clone()
    }

    /// Where the last incoming payload was written.
    pub async fn received_file(&self) -> Option<PathBuf> {
        self.inner.lock().await.received_file.clone()
    }

    /// Begin advertising (sender) or discovery (receiver).
    ///
    /// Allowed from Idle, and from Failed to reuse the session. On transport
    /// failure the session stays Idle and the call may be retried.
    pub async fn start(
        &self,
        role: Role,
        file: Option<PathBuf>,
        endpoint_name_hint: Option<&str>,
    ) -> Result<(), HandoffError> {
        let mut inner = self.inner.lock().await;
        match &inner.state {
            SessionState::Idle | SessionState::Failed { .. } => {}
            other => return Err(invalid("start", other)),
        }
        if role.owns_payload() && file.is_none() {
            return Err(HandoffError::FileUnavailable);
        }

        inner.role = Some(role);
        inner.file = file;
        inner.local_name = endpoint_name_hint
            .map(str::to_string)
            .unwrap_or_else(|| self.config.endpoint_name());
        inner.attempt = None;
        inner.progress = None;
        inner.discovered.clear();
        inner.offered = None;
        inner.received_file = None;

        self.notifier.busy(true);
        self.notifier.hide_action();
        self.status(&mut inner, SEARCHING);

        let result = if role.advertises() {
            self.transport
                .start_advertising(
                    &inner.local_name,
                    &self.config.service_id,
                    self.config.strategy,
                    self.events.clone(),
                )
                .await
        } else {
            self.transport
                .start_discovery(&self.config.service_id, self.config.strategy, self.events.clone())
                .await
        };

        match result {
            Ok(()) => {
                if role.advertises() {
                    inner.advertising = true;
                    inner.state = SessionState::Advertising;
                } else {
                    inner.discovering = true;
                    inner.state = SessionState::Discovering { handed_off: None };
                }
                info!("Session started as {} ({})", role.as_str(), inner.local_name);
                Ok(())
            }
            Err(e) => {
                let msg = e.message();
                warn!("Could not start {}: {}", role.as_str(), msg);
                self.notifier.busy(false);
                self.status(&mut inner, msg.clone());
                inner.state = SessionState::Idle;
                Err(HandoffError::TransportUnavailable(msg))
            }
        }
    }

    /// Apply one transport event.
    pub async fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::EndpointFound { endpoint } => self.on_endpoint_found(endpoint).await,
            TransportEvent::EndpointLost { endpoint_id } => self.on_endpoint_lost(&endpoint_id).await,
            TransportEvent::ConnectionInitiated { endpoint, info } => {
                self.on_connection_initiated(endpoint, info).await
            }
            TransportEvent::ConnectionResult { endpoint_id, status } => {
                self.on_connection_result(&endpoint_id, status).await
            }
            TransportEvent::Disconnected { endpoint_id } => self.on_disconnected(&endpoint_id).await,
            TransportEvent::PayloadReceived { endpoint_id, payload } => {
                self.on_payload_received(&endpoint_id, payload).await
            }
            TransportEvent::PayloadTransferUpdate { endpoint_id, update } => {
                self.on_transfer_update(&endpoint_id, update).await
            }
        }
    }

    pub async fn on_endpoint_found(&self, endpoint: Endpoint) {
        let mut inner = self.inner.lock().await;
        if !matches!(inner.state, SessionState::Discovering { .. }) {
            debug!("Ignoring found endpoint {} while {}", endpoint, inner.state.name());
            return;
        }

        info!("Endpoint found: {}", endpoint);
        inner.discovered.insert(endpoint.id.clone(), endpoint.clone());
        inner.offered = Some(endpoint.id.clone());

        self.notifier.busy(false);
        self.status(&mut inner, endpoint.display_name());
        self.notifier.offer(PendingAction::request(endpoint));
    }

    pub async fn on_endpoint_lost(&self, endpoint_id: &str) {
        let mut inner = self.inner.lock().await;
        inner.discovered.remove(endpoint_id);

        if matches!(inner.state, SessionState::Discovering { .. })
            && inner.offered.as_deref() == Some(endpoint_id)
        {
            info!("Endpoint lost: {}", endpoint_id);
            inner.offered = None;
            self.notifier.hide_action();
            self.status(&mut inner, CONNECTION_LOST);
        }
    }

    pub async fn on_connection_initiated(&self, endpoint: Endpoint, info: ConnectionInfo) {
        let mut inner = self.inner.lock().await;
        match &inner.state {
            SessionState::Advertising => {}
            SessionState::Connecting { endpoint: current } if current.id == endpoint.id => {
                debug!("Connection with {} initiated by our own request", endpoint);
                return;
            }
            other => {
                warn!("Rejecting {}: session is {}", endpoint, other.name());
                self.reject_quietly(&endpoint.id).await;
                return;
            }
        }

        if let Some(attempt) = &inner.attempt {
            if !attempt.is_for(&endpoint.id) {
                warn!(
                    "Rejecting {}: request from {} still pending",
                    endpoint, attempt.endpoint
                );
                self.reject_quietly(&endpoint.id).await;
                return;
            }
        }

        info!(
            "Connection initiated by {} ({})",
            endpoint,
            if info.is_incoming { "incoming" } else { "outgoing" }
        );
        inner.attempt = Some(ConnectionAttempt::pending(endpoint.clone()));
        inner.offered = Some(endpoint.id.clone());

        self.notifier.busy(false);
        self.status(&mut inner, info.endpoint_name.as_str());
        self.notifier.offer(PendingAction::accept(endpoint));
    }

    /// Accept the pending inbound request from `endpoint_id`.
    pub async fn accept_connection(&self, endpoint_id: &str) -> Result<(), HandoffError> {
        let mut inner = self.inner.lock().await;
        match &inner.state {
            SessionState::Connecting { endpoint } if endpoint.id == endpoint_id => return Ok(()),
            SessionState::Advertising => {}
            other => return Err(invalid("accept connection", other)),
        }

        let endpoint = match &inner.attempt {
            Some(attempt) if attempt.is_for(endpoint_id) && attempt.outcome == AttemptOutcome::Pending => {
                attempt.endpoint.clone()
            }
            _ => return Err(invalid("accept a connection nobody requested", &inner.state)),
        };

        inner.offered = None;
        self.notifier.hide_action();

        match self.transport.accept_connection(endpoint_id, self.events.clone()).await {
            Ok(()) => {
                info!("Accepted connection from {}", endpoint);
                inner.state = SessionState::Connecting { endpoint };
                Ok(())
            }
            Err(e) => {
                let msg = e.message();
                self.fail(&mut inner, FailureReason::ConnectionError(msg.clone())).await;
                Err(HandoffError::ConnectionError(msg))
            }
        }
    }

    /// Ask the discovered advertiser `endpoint_id` for a connection.
    pub async fn request_connection(&self, endpoint_id: &str) -> Result<(), HandoffError> {
        let mut inner = self.inner.lock().await;
        match &inner.state {
            SessionState::Connecting { endpoint } if endpoint.id == endpoint_id => return Ok(()),
            SessionState::Discovering { .. } => {}
            other => return Err(invalid("request connection", other)),
        }

        let endpoint = inner
            .discovered
            .get(endpoint_id)
            .cloned()
            .ok_or_else(|| invalid("request an undiscovered endpoint", &inner.state))?;

        inner.attempt = Some(ConnectionAttempt::pending(endpoint.clone()));
        inner.offered = None;
        self.notifier.hide_action();
        self.notifier.busy(true);
        self.status(&mut inner, SENDING_REQUEST);

        let name = inner.local_name.clone();
        match self
            .transport
            .request_connection(&name, endpoint_id, self.events.clone())
            .await
        {
            Ok(()) => {
                info!("Requested connection to {}", endpoint);
                inner.state = SessionState::Connecting { endpoint };
                Ok(())
            }
            Err(e) => {
                let msg = e.message();
                self.fail(&mut inner, FailureReason::ConnectionError(msg.clone())).await;
                Err(HandoffError::ConnectionError(msg))
            }
        }
    }

    /// Decline the pending inbound request and keep advertising.
    pub async fn reject_connection(&self, endpoint_id: &str) -> Result<(), HandoffError> {
        let mut inner = self.inner.lock().await;
        let pending = matches!(inner.state, SessionState::Advertising)
            && inner
                .attempt
                .as_ref()
                .is_some_and(|a| a.is_for(endpoint_id) && a.outcome == AttemptOutcome::Pending);
        if !pending {
            return Err(invalid("reject connection", &inner.state));
        }

        self.reject_quietly(endpoint_id).await;
        info!("Rejected connection from {}", endpoint_id);

        inner.attempt = None;
        inner.offered = None;
        self.notifier.hide_action();
        self.notifier.busy(true);
        self.status(&mut inner, SEARCHING);
        Ok(())
    }

    /// Run the action a status sink offered.
    pub async fn perform(&self, action: PendingAction) -> Result<(), HandoffError> {
        match action.kind {
            ActionKind::Accept => self.accept_connection(&action.endpoint.id).await,
            ActionKind::Request => self.request_connection(&action.endpoint.id).await,
        }
    }

    pub async fn on_connection_result(&self, endpoint_id: &str, status: ConnectionStatus) {
        let mut inner = self.inner.lock().await;
        match &inner.state {
            SessionState::Advertising
            | SessionState::Discovering { .. }
            | SessionState::Connecting { .. } => {}
            other => {
                debug!("Ignoring connection result from {} while {}", endpoint_id, other.name());
                return;
            }
        }
        if let Some(attempt) = &inner.attempt {
            if !attempt.is_for(endpoint_id) {
                warn!(
                    "Ignoring connection result from {} while negotiating with {}",
                    endpoint_id, attempt.endpoint
                );
                return;
            }
        }

        match status {
            ConnectionStatus::Ok => {
                let endpoint = inner
                    .attempt
                    .as_ref()
                    .map(|a| a.endpoint.clone())
                    .or_else(|| inner.discovered.get(endpoint_id).cloned())
                    .unwrap_or_else(|| Endpoint::new(endpoint_id, ""));

                inner.attempt = Some(ConnectionAttempt {
                    endpoint: endpoint.clone(),
                    outcome: AttemptOutcome::Accepted,
                });
                inner.offered = None;
                self.notifier.hide_action();

                // One link at a time: stop looking for other peers.
                self.stop_searching(&mut inner).await;
                inner.state = SessionState::Connected { endpoint: endpoint.clone() };
                info!("Connected to {}", endpoint);

                if inner.role().owns_payload() {
                    self.begin_send(&mut inner, endpoint).await;
                } else {
                    self.notifier.busy(true);
                    self.status(&mut inner, RECEIVING_FILE);
                }
            }
            ConnectionStatus::Rejected => {
                if let Some(attempt) = inner.attempt.as_mut() {
                    attempt.outcome = AttemptOutcome::Rejected;
                }
                self.fail(&mut inner, FailureReason::ConnectionRejected).await;
            }
            ConnectionStatus::Error { message } => {
                if let Some(attempt) = inner.attempt.as_mut() {
                    attempt.outcome = AttemptOutcome::Errored;
                }
                let msg = message.unwrap_or_else(|| UNKNOWN_ERROR.to_string());
                self.fail(&mut inner, FailureReason::ConnectionError(msg)).await;
            }
            ConnectionStatus::Unknown { code } => {
                warn!("Unknown connection status code {} from {}", code, endpoint_id);
                if let Some(attempt) = inner.attempt.as_mut() {
                    attempt.outcome = AttemptOutcome::Errored;
                }
                self.fail(&mut inner, FailureReason::ConnectionError(UNKNOWN_ERROR.to_string()))
                    .await;
            }
        }
    }

    pub async fn on_payload_received(&self, endpoint_id: &str, payload: IncomingPayload) {
        let mut inner = self.inner.lock().await;
        let endpoint = match &inner.state {
            SessionState::Connected { endpoint } if endpoint.id == endpoint_id => endpoint.clone(),
            other => {
                debug!("Ignoring payload {} while {}", payload.payload_id, other.name());
                return;
            }
        };

        let progress = TransferProgress::new(Some(payload.payload_id), payload.total_bytes);
        if self.enter_transferring(&mut inner, endpoint, progress) {
            info!("Receiving {} into {}", payload.name, payload.path.display());
            inner.received_file = Some(payload.path);
        }
    }

    pub async fn on_transfer_update(&self, endpoint_id: &str, update: PayloadTransferUpdate) {
        let mut inner = self.inner.lock().await;
        // A receiver may see the first update before PayloadReceived.
        let (endpoint, first_update) = match &inner.state {
            SessionState::Transferring { endpoint } if endpoint.id == endpoint_id => {
                (endpoint.clone(), false)
            }
            SessionState::Connected { endpoint }
                if endpoint.id == endpoint_id && !inner.role().owns_payload() =>
            {
                (endpoint.clone(), true)
            }
            other => {
                debug!("Ignoring transfer update from {} while {}", endpoint_id, other.name());
                return;
            }
        };
        if first_update {
            let progress = TransferProgress::new(Some(update.payload_id), update.total_bytes);
            if !self.enter_transferring(&mut inner, endpoint.clone(), progress) {
                return;
            }
        }

        if let Some(current) = inner.progress.and_then(|p| p.payload_id) {
            if current != update.payload_id {
                debug!("Ignoring update for payload {} (active {})", update.payload_id, current);
                return;
            }
        }

        match update.status {
            TransferStatus::InProgress => {
                let verb = inner.role().progress_verb();
                let progress = inner
                    .progress
                    .get_or_insert_with(|| TransferProgress::new(Some(update.payload_id), update.total_bytes));
                if !progress.advance(update.bytes_transferred, update.total_bytes) {
                    warn!(
                        "Progress went backwards ({} < {}), ignored",
                        update.bytes_transferred, progress.bytes_transferred
                    );
                    return;
                }
                let text = format!(
                    "{}: {} KB / Total: {} KB",
                    verb,
                    progress.transferred_kb(),
                    progress.total_kb()
                );
                self.status(&mut inner, text);
            }
            TransferStatus::Success => {
                if let Some(progress) = inner.progress.as_mut() {
                    progress.advance(update.total_bytes.max(update.bytes_transferred), update.total_bytes);
                }
                self.complete(&mut inner, endpoint).await;
            }
            TransferStatus::Failure | TransferStatus::Canceled => {
                warn!("Transfer with {} ended with {:?}", endpoint, update.status);
                self.fail(&mut inner, FailureReason::TransferFailed).await;
            }
        }
    }

    pub async fn on_disconnected(&self, endpoint_id: &str) {
        let mut inner = self.inner.lock().await;
        if inner.state.closed_gracefully(endpoint_id) {
            debug!("Link to {} closed after a completed transfer", endpoint_id);
            return;
        }
        if matches!(
            inner.state,
            SessionState::Idle | SessionState::Failed { .. } | SessionState::Completed { .. }
        ) {
            debug!("Ignoring disconnect from {} while {}", endpoint_id, inner.state.name());
            return;
        }

        let current_peer = inner
            .state
            .peer()
            .or(inner.attempt.as_ref().map(|a| &a.endpoint))
            .is_some_and(|e| e.id == endpoint_id);
        if !current_peer {
            debug!("Ignoring disconnect from {}: not the current peer", endpoint_id);
            return;
        }

        warn!("Connection to {} dropped while {}", endpoint_id, inner.state.name());
        self.fail(&mut inner, FailureReason::Disconnected).await;
    }

    /// Called by the driver when a phase saw no event for too long.
    pub async fn on_timeout(&self) {
        let mut inner = self.inner.lock().await;
        if matches!(inner.state, SessionState::Idle) || inner.state.is_terminal() {
            return;
        }
        warn!("Session timed out while {}", inner.state.name());
        self.fail(&mut inner, FailureReason::TimedOut).await;
    }

    /// Tear the session down: stop advertising/discovery and drop the file.
    /// A transfer already running is left to finish or fail on its own.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        self.stop_searching(&mut inner).await;
        inner.file = None;

        if matches!(
            inner.state,
            SessionState::Advertising | SessionState::Discovering { .. }
        ) {
            inner.state = SessionState::Idle;
            inner.attempt = None;
            inner.offered = None;
            self.notifier.hide_action();
            self.notifier.busy(false);
        }
        info!("Session shut down ({})", inner.state.name());
    }

    async fn begin_send(&self, inner: &mut SessionInner, endpoint: Endpoint) {
        let Some(path) = inner.file.clone() else {
            self.fail(inner, FailureReason::FileUnavailable).await;
            return;
        };

        self.notifier.busy(true);
        self.status(inner, SENDING_FILE);

        let payload = match self.storage.open_payload(&path).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!("{:#}", e);
                self.fail(inner, FailureReason::FileUnavailable).await;
                return;
            }
        };
        let total = payload.size;
        let name = payload.name.clone();

        match self.transport.send_payload(&endpoint.id, payload).await {
            Ok(payload_id) => {
                let progress = TransferProgress::new(Some(payload_id), total);
                if self.enter_transferring(inner, endpoint.clone(), progress) {
                    info!("Sending {} ({} bytes) to {}", name, total, endpoint);
                }
            }
            Err(e) => {
                let msg = match e.message() {
                    m if m.is_empty() => UNKNOWN_ERROR.to_string(),
                    m => m,
                };
                self.fail(inner, FailureReason::ConnectionError(msg)).await;
            }
        }
    }

    /// Connected → Transferring, only over an accepted attempt. Starts a
    /// fresh progress record.
    fn enter_transferring(
        &self,
        inner: &mut SessionInner,
        endpoint: Endpoint,
        progress: TransferProgress,
    ) -> bool {
        let accepted = matches!(inner.state, SessionState::Connected { .. })
            && inner
                .attempt
                .as_ref()
                .is_some_and(|a| a.is_for(&endpoint.id) && a.outcome == AttemptOutcome::Accepted);
        if !accepted {
            warn!("Refusing to transfer with {} while {}", endpoint, inner.state.name());
            return false;
        }

        inner.progress = Some(progress);
        inner.state = SessionState::Transferring { endpoint };
        true
    }

    async fn complete(&self, inner: &mut SessionInner, endpoint: Endpoint) {
        info!("Transfer with {} complete", endpoint);
        self.notifier.busy(false);
        self.notifier.hide_action();
        self.status(inner, DONE);

        inner.attempt = None;
        inner.state = SessionState::Completed { endpoint: endpoint.clone() };
        self.stop_searching(inner).await;

        let role = inner.role();
        if role.owns_payload() {
            self.transport.disconnect_from_endpoint(&endpoint.id).await;
        }
        if !role.chains(self.config.chain_after_send) {
            return;
        }

        match self
            .transport
            .start_discovery(&self.config.service_id, self.config.strategy, self.events.clone())
            .await
        {
            Ok(()) => {
                info!("Relaying: discovering the next peer");
                inner.discovering = true;
                inner.discovered.clear();
                inner.state = SessionState::Discovering {
                    handed_off: Some(endpoint.id),
                };
            }
            Err(e) => {
                self.fail(inner, FailureReason::TransportUnavailable(e.message())).await;
            }
        }
    }

    async fn fail(&self, inner: &mut SessionInner, reason: FailureReason) {
        info!("Session failed while {}: {}", inner.state.name(), reason);

        // Close the live link unless the peer already dropped it.
        let linked = inner
            .state
            .peer()
            .or(inner.attempt.as_ref().map(|a| &a.endpoint))
            .map(|e| e.id.clone());
        if let Some(endpoint_id) = linked {
            if reason != FailureReason::Disconnected {
                self.transport.disconnect_from_endpoint(&endpoint_id).await;
            }
        }

        inner.attempt = None;
        inner.progress = None;
        inner.offered = None;
        self.stop_searching(inner).await;

        self.notifier.busy(false);
        self.notifier.hide_action();
        self.status(inner, reason.to_string());
        inner.state = SessionState::Failed { reason };
    }

    async fn stop_searching(&self, inner: &mut SessionInner) {
        if inner.advertising {
            self.transport.stop_advertising().await;
            inner.advertising = false;
        }
        if inner.discovering {
            self.transport.stop_discovery().await;
            inner.discovering = false;
        }
    }

    async fn reject_quietly(&self, endpoint_id: &str) {
        if let Err(e) = self.transport.reject_connection(endpoint_id).await {
            warn!("Could not reject {}: {}", endpoint_id, e);
        }
    }

    fn status(&self, inner: &mut SessionInner, text: impl Into<String>) {
        let text = text.into();
        inner.last_status = Some(text.clone());
        self.notifier.text(text);
    }
}
