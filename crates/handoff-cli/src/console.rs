use std::io::Write;

use handoff_core::{PendingAction, StatusSink};
use tokio::sync::mpsc::UnboundedSender;

/// Prints session status to the terminal and hands offered actions to the
/// command loop.
pub struct ConsoleSink {
    actions: UnboundedSender<PendingAction>,
    pending: Option<PendingAction>,
    last: String,
    inline: bool,
}

impl ConsoleSink {
    pub fn new(actions: UnboundedSender<PendingAction>) -> Self {
        Self {
            actions,
            pending: None,
            last: String::new(),
            inline: false,
        }
    }
}

/// Progress lines are redrawn in place.
fn is_progress(text: &str) -> bool {
    text.contains(" KB / Total: ")
}

impl StatusSink for ConsoleSink {
    fn set_status_text(&mut self, text: &str) {
        if text == self.last {
            return;
        }
        self.last = text.to_string();

        if is_progress(text) {
            print!("\r  {}", text);
            std::io::stdout().flush().ok();
            self.inline = true;
        } else {
            if self.inline {
                println!();
                self.inline = false;
            }
            println!("→ {}", text);
        }
    }

    fn set_action_visible(&mut self, visible: bool) {
        if !visible {
            self.pending = None;
            return;
        }
        if let Some(action) = self.pending.clone() {
            if self.actions.send(action).is_err() {
                tracing::debug!("Command loop gone, action dropped");
            }
        }
    }

    fn set_action_handler(&mut self, action: PendingAction) {
        self.pending = Some(action);
    }

    fn set_busy_indicator_visible(&mut self, visible: bool) {
        tracing::trace!("busy: {}", visible);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handoff_core::Endpoint;
    use tokio::sync::mpsc;

    #[test]
    fn test_visible_action_is_forwarded_once_offered() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sink = ConsoleSink::new(tx);

        sink.set_action_visible(true);
        assert!(rx.try_recv().is_err());

        let action = PendingAction::request(Endpoint::new("3F2A", "Pixel: 7a"));
        sink.set_action_handler(action.clone());
        sink.set_action_visible(true);
        assert_eq!(rx.try_recv().ok(), Some(action));

        sink.set_action_visible(false);
        sink.set_action_visible(true);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_progress_detection() {
        assert!(is_progress("Sent: 64 KB / Total: 4096 KB"));
        assert!(is_progress("Received: 0 KB / Total: 1 KB"));
        assert!(!is_progress("Sending file..."));
    }
}
