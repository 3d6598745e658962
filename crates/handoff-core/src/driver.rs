//! Event pump between a transport and a session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::session::{Session, SessionState};
use crate::transport::TransportEvent;

/// Apply transport events to `session` in arrival order until it reaches
/// Completed or Failed, returning that state.
///
/// With `phase_timeout` set, a phase that sees no event for that long fails
/// the session with a timeout. Without it a silent transport parks the
/// session indefinitely. Returns the current state if the event channel
/// closes.
pub async fn drive(
    session: &Session,
    events: &mut mpsc::UnboundedReceiver<TransportEvent>,
    phase_timeout: Option<Duration>,
) -> SessionState {
    loop {
        let next = match phase_timeout {
            Some(limit) => match tokio::time::timeout(limit, events.recv()).await {
                Ok(next) => next,
                Err(_) => {
                    session.on_timeout().await;
                    if session.is_finished().await {
                        return session.state().await;
                    }
                    continue;
                }
            },
            None => events.recv().await,
        };

        let Some(event) = next else {
            debug!("Transport event channel closed");
            return session.state().await;
        };
        session.handle_event(event).await;

        if session.is_finished().await {
            return session.state().await;
        }
    }
}

/// Run [`drive`] on its own task.
///
/// Callers that also serve user input select on the handle, so a handler
/// holding the session lock never stalls their loop.
pub fn spawn_drive(
    session: Arc<Session>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    phase_timeout: Option<Duration>,
) -> JoinHandle<SessionState> {
    tokio::spawn(async move { drive(&session, &mut events, phase_timeout).await })
}
