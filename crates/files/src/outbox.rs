//! Per-identity alert outbox.

use crate::record::Identity;
use std::collections::HashMap;

/// Append-only notification lists. Reads never consume messages.
#[derive(Debug, Clone, Default)]
pub struct AlertOutbox {
    alerts: HashMap<Identity, Vec<String>>,
}

impl AlertOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, owner: &Identity, message: impl Into<String>) {
        self.alerts
            .entry(owner.clone())
            .or_default()
            .push(message.into());
    }

    /// Full current list for the identity, oldest first.
    pub fn peek(&self, owner: &Identity) -> Vec<String> {
        self.alerts.get(owner).cloned().unwrap_or_default()
    }

    pub fn len(&self, owner: &Identity) -> usize {
        self.alerts.get(owner).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_preserves_order_and_peek_is_non_destructive() {
        let mut outbox = AlertOutbox::new();
        let alice = Identity::new("alice").unwrap();

        outbox.append(&alice, "first");
        outbox.append(&alice, "second".to_string());

        assert_eq!(outbox.peek(&alice), vec!["first", "second"]);
        assert_eq!(outbox.peek(&alice), vec!["first", "second"]);
        assert_eq!(outbox.len(&alice), 2);
    }

    #[test]
    fn unknown_identity_has_empty_outbox() {
        let outbox = AlertOutbox::new();
        let nobody = Identity::new("nobody").unwrap();
        assert!(outbox.peek(&nobody).is_empty());
        assert_eq!(outbox.len(&nobody), 0);
    }

    #[test]
    fn outboxes_are_isolated() {
        let mut outbox = AlertOutbox::new();
        let alice = Identity::new("alice").unwrap();
        let bob = Identity::new("bob").unwrap();

        outbox.append(&alice, "for alice");
        assert!(outbox.peek(&bob).is_empty());
    }
}
