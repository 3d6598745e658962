use serde::{Deserialize, Serialize};

/// Which side of the handoff a session plays. Both roles share one state
/// machine; they differ in who advertises and who owns the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Advertises, accepts on demand, sends the bound file, then relays it.
    Sender,
    /// Discovers, requests on demand, receives. Never relays.
    Receiver,
}

impl Role {
    pub fn advertises(&self) -> bool {
        matches!(self, Role::Sender)
    }

    pub fn owns_payload(&self) -> bool {
        matches!(self, Role::Sender)
    }

    /// Whether a successful transfer leads into discovery of the next peer.
    pub fn chains(&self, chain_after_send: bool) -> bool {
        match self {
            Role::Sender => chain_after_send,
            Role::Receiver => false,
        }
    }

    /// Verb used in progress lines.
    pub fn progress_verb(&self) -> &'static str {
        match self {
            Role::Sender => "Sent",
            Role::Receiver => "Received",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Sender => "sender",
            Role::Receiver => "receiver",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_sender_chains() {
        assert!(Role::Sender.chains(true));
        assert!(!Role::Sender.chains(false));
        assert!(!Role::Receiver.chains(true));
    }
}
