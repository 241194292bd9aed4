//! Protocol assignments.
//!
//! A protocol is a scheduled multi-week engagement sequence. The
//! engine only needs the per-patient assignment: the designated
//! weigh-day, an optional weight target, and whether the assignment is
//! active (which drives missed-check-in reminders).

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{MessageSource, ScheduledMessage};

/// One patient's assignment to a protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolAssignment {
    pub id: Uuid,
    pub patient_id: Uuid,
    /// Catalog id of the protocol; content lives outside this engine.
    pub protocol_id: String,
    /// Day of week the check-in includes the weight step.
    pub weigh_day: Weekday,
    pub weight_target: Option<f64>,
    pub active: bool,
    pub started_at: DateTime<Utc>,
}

impl ProtocolAssignment {
    pub fn new(
        patient_id: Uuid,
        protocol_id: &str,
        weigh_day: Weekday,
        weight_target: Option<f64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            protocol_id: protocol_id.to_string(),
            weigh_day,
            weight_target,
            active: true,
            started_at: Utc::now(),
        }
    }
}

/// Kickoff cadence queued when an assignment is created: an immediate
/// welcome plus a one-week nudge. Week-by-week protocol content comes
/// from the catalog service and is queued the same way.
pub fn kickoff_cadence(protocol_id: &str) -> Vec<(chrono::Duration, String)> {
    vec![
        (
            chrono::Duration::zero(),
            format!("Your {protocol_id} protocol starts today. I'll check in with you every day!"),
        ),
        (
            chrono::Duration::days(7),
            "One week in! Keep those daily check-ins coming.".to_string(),
        ),
    ]
}

/// Queue a protocol's outbound cadence for one patient.
///
/// Each `(offset, content)` pair becomes one pending scheduled message
/// relative to `start`.
pub fn schedule_protocol_messages(
    assignment: &ProtocolAssignment,
    destination: &str,
    start: DateTime<Utc>,
    cadence: &[(chrono::Duration, String)],
) -> Vec<ScheduledMessage> {
    cadence
        .iter()
        .map(|(offset, content)| {
            ScheduledMessage::new(
                assignment.patient_id,
                destination,
                content,
                start + *offset,
                MessageSource::Protocol,
            )
        })
        .collect()
}
