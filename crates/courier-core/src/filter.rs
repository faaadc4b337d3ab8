//! Sender allow-list matching.
//!
//! Allow-list entries are either numeric platform IDs or handles
//! (an optional leading `@` is stripped). An empty list matches everyone.

use crate::message::SenderRef;

/// One parsed allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderId {
    Numeric(i64),
    Handle(String),
}

/// Parse a raw allow-list entry into an ID or a handle.
pub fn parse_sender(raw: &str) -> SenderId {
    let trimmed = raw.trim();
    match trimmed.parse::<i64>() {
        Ok(id) => SenderId::Numeric(id),
        Err(_) => SenderId::Handle(trimmed.trim_start_matches('@').to_string()),
    }
}

/// Parse a whole configured allow-list, skipping blank entries.
pub fn parse_senders(raw: &[String]) -> Vec<SenderId> {
    raw.iter()
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_sender(s))
        .collect()
}

/// Whether a sender matches the allow-list. Empty list = match everyone.
pub fn sender_matches(sender: &SenderRef, allowed: &[SenderId]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    for entry in allowed {
        match entry {
            SenderId::Numeric(id) => {
                if sender.id == Some(*id) {
                    return true;
                }
            }
            SenderId::Handle(handle) => {
                if sender.username.as_deref() == Some(handle.as_str()) {
                    return true;
                }
            }
        }
    }
    false
}
