//! Message records: the append-only audit log and the outbound queue.
//!
//! Inbound idempotency hangs entirely on the `external_id` uniqueness
//! constraint of the audit log. Scheduled messages transition
//! `pending -> sent | error` exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced a message in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Patient,
    System,
    Staff,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::Patient => "patient",
            Sender::System => "system",
            Sender::Staff => "staff",
        }
    }
}

/// An entry in the append-only message audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub sender: Sender,
    pub text: String,
    /// External delivery id for inbound messages. Unique when present;
    /// the sole deduplication mechanism for inbound events.
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn inbound(patient_id: Uuid, text: &str, external_id: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            sender: Sender::Patient,
            text: text.to_string(),
            external_id: external_id.map(|s| s.to_string()),
            created_at: Utc::now(),
        }
    }

    pub fn outbound(patient_id: Uuid, text: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            sender: Sender::System,
            text: text.to_string(),
            external_id: None,
            created_at: Utc::now(),
        }
    }
}

/// Delivery status of a scheduled message. One-way: `pending` is the
/// only state the dispatcher ever picks up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledStatus {
    Pending,
    Sent,
    Error,
}

/// What created a scheduled message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSource {
    /// Protocol cadence (weekly content, check-in prompts).
    Protocol,
    /// Missed-check-in reminder.
    Reminder,
    /// Gamification notification (badge unlock, level up).
    Gamification,
    /// Ad-hoc system message.
    System,
}

impl MessageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageSource::Protocol => "protocol",
            MessageSource::Reminder => "reminder",
            MessageSource::Gamification => "gamification",
            MessageSource::System => "system",
        }
    }
}

/// A queued outbound message awaiting dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub id: Uuid,
    pub patient_id: Uuid,
    /// Destination phone number.
    pub destination: String,
    pub content: String,
    pub send_at: DateTime<Utc>,
    pub status: ScheduledStatus,
    pub source: MessageSource,
    /// Populated when status becomes `error`.
    pub error_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledMessage {
    pub fn new(
        patient_id: Uuid,
        destination: &str,
        content: &str,
        send_at: DateTime<Utc>,
        source: MessageSource,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            destination: destination.to_string(),
            content: content.to_string(),
            send_at,
            status: ScheduledStatus::Pending,
            source,
            error_reason: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_carries_external_id() {
        let patient_id = Uuid::new_v4();
        let msg = Message::inbound(patient_id, "hello", Some("SID123"));
        assert_eq!(msg.sender, Sender::Patient);
        assert_eq!(msg.external_id.as_deref(), Some("SID123"));
    }

    #[test]
    fn outbound_has_no_external_id() {
        let msg = Message::outbound(Uuid::new_v4(), "reminder");
        assert_eq!(msg.sender, Sender::System);
        assert!(msg.external_id.is_none());
    }

    #[test]
    fn scheduled_message_starts_pending() {
        let msg = ScheduledMessage::new(
            Uuid::new_v4(),
            "+5511999990000",
            "weekly content",
            Utc::now(),
            MessageSource::Protocol,
        );
        assert_eq!(msg.status, ScheduledStatus::Pending);
        assert!(msg.error_reason.is_none());
    }
}
