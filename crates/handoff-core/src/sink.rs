//! Status sink seam. The core never renders; it only posts updates.

use tokio::sync::mpsc;

use crate::endpoint::Endpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Accept an inbound request (advertising side).
    Accept,
    /// Ask a discovered advertiser for a connection (discovering side).
    Request,
}

/// The action a UI offers to the user. Performing it is
/// `Session::perform(action)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub kind: ActionKind,
    pub endpoint: Endpoint,
}

impl PendingAction {
    pub fn accept(endpoint: Endpoint) -> Self {
        Self { kind: ActionKind::Accept, endpoint }
    }

    pub fn request(endpoint: Endpoint) -> Self {
        Self { kind: ActionKind::Request, endpoint }
    }
}

/// Receives human-readable state and transfer-ready signals.
pub trait StatusSink: Send + 'static {
    fn set_status_text(&mut self, text: &str);
    fn set_action_visible(&mut self, visible: bool);
    fn set_action_handler(&mut self, action: PendingAction);
    fn set_busy_indicator_visible(&mut self, visible: bool);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Text(String),
    ActionVisible(bool),
    Action(PendingAction),
    BusyIndicatorVisible(bool),
}

impl StatusUpdate {
    pub fn apply<S: StatusSink + ?Sized>(self, sink: &mut S) {
        match self {
            StatusUpdate::Text(text) => sink.set_status_text(&text),
            StatusUpdate::ActionVisible(visible) => sink.set_action_visible(visible),
            StatusUpdate::Action(action) => sink.set_action_handler(action),
            StatusUpdate::BusyIndicatorVisible(visible) => sink.set_busy_indicator_visible(visible),
        }
    }
}

/// Fire-and-forget channel to a status sink.
#[derive(Clone, Debug)]
pub struct StatusNotifier {
    tx: mpsc::UnboundedSender<StatusUpdate>,
}

impl StatusNotifier {
    /// A notifier plus the raw update stream, for callers that render
    /// updates themselves.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StatusUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Forward updates to `sink` from a spawned task.
    pub fn spawn<S: StatusSink>(mut sink: S) -> Self {
        let (notifier, mut rx) = Self::channel();
        tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                update.apply(&mut sink);
            }
        });
        notifier
    }

    pub fn post(&self, update: StatusUpdate) {
        if self.tx.send(update).is_err() {
            tracing::trace!("status sink gone, update dropped");
        }
    }

    pub fn text(&self, text: impl Into<String>) {
        self.post(StatusUpdate::Text(text.into()));
    }

    pub fn busy(&self, visible: bool) {
        self.post(StatusUpdate::BusyIndicatorVisible(visible));
    }

    /// Offer `action` and show the action button.
    pub fn offer(&self, action: PendingAction) {
        self.post(StatusUpdate::Action(action));
        self.post(StatusUpdate::ActionVisible(true));
    }

    pub fn hide_action(&self) {
        self.post(StatusUpdate::ActionVisible(false));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl StatusSink for Recorder {
        fn set_status_text(&mut self, text: &str) {
            self.0.lock().unwrap().push(format!("text:{}", text));
        }
        fn set_action_visible(&mut self, visible: bool) {
            self.0.lock().unwrap().push(format!("action:{}", visible));
        }
        fn set_action_handler(&mut self, action: PendingAction) {
            self.0.lock().unwrap().push(format!("handler:{}", action.endpoint.id));
        }
        fn set_busy_indicator_visible(&mut self, visible: bool) {
            self.0.lock().unwrap().push(format!("busy:{}", visible));
        }
    }

    #[tokio::test]
    async fn test_spawned_sink_receives_updates_in_order() {
        let recorder = Recorder::default();
        let notifier = StatusNotifier::spawn(recorder.clone());

        notifier.busy(true);
        notifier.text("Searching connection...");
        notifier.offer(PendingAction::accept(Endpoint::new("AB12", "Pixel: 7a")));

        for _ in 0..50 {
            if recorder.0.lock().unwrap().len() == 4 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![
                "busy:true".to_string(),
                "text:Searching connection...".to_string(),
                "handler:AB12".to_string(),
                "action:true".to_string(),
            ]
        );
    }
}
