//! mDNS announce/browse helpers used to advertise and discover handoff peers.

pub mod announce;
pub mod discover;
pub mod model;
pub mod net;

/// Service type every handoff peer registers under.
pub const SERVICE_TYPE: &str = "_handoff._tcp.local.";

pub(crate) fn ensure_dot(s: &str) -> String {
    if s.ends_with('.') {
        s.to_string()
    } else {
        format!("{}.", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_dot() {
        assert_eq!(ensure_dot("_handoff._tcp.local"), "_handoff._tcp.local.");
        assert_eq!(ensure_dot(SERVICE_TYPE), SERVICE_TYPE);
    }
}
