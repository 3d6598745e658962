use std::fmt;
use serde::{Deserialize, Serialize};

/// A discovered or connected peer. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    pub name: String,
}

impl Endpoint {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Name shown to the user; falls back to the id when the peer sent none.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Pending,
    Accepted,
    Rejected,
    Errored,
}

/// One connection negotiation with a peer, from initiation to its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionAttempt {
    pub endpoint: Endpoint,
    pub outcome: AttemptOutcome,
}

impl ConnectionAttempt {
    pub fn pending(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            outcome: AttemptOutcome::Pending,
        }
    }

    pub fn is_for(&self, endpoint_id: &str) -> bool {
        self.endpoint.id == endpoint_id
    }
}
