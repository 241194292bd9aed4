//! Scheduled-message dispatcher.
//!
//! Periodic sweep over the outbound queue: retire stale messages,
//! deliver what is due, and queue missed-check-in reminders. The
//! sweep is non-reentrant; an overlapping invocation returns an empty
//! report instead of double-sending.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::message::{Message, MessageSource, ScheduledMessage};
use crate::patient::PatientStatus;
use crate::services::OutboundSender;
use crate::storage::Store;

/// Maximum messages delivered per sweep.
pub const DISPATCH_BATCH_LIMIT: u32 = 50;

/// Pending messages older than this are retired, never sent.
pub const PENDING_MAX_AGE_DAYS: i64 = 7;

/// Destination prefixes that mark internal seed accounts. Matching
/// messages are marked failed without touching the gateway.
pub const SEED_PREFIXES: &[&str] = &["+0000", "seed:"];

pub const REMINDER_TEXT: &str =
    "We missed your check-in today! Reply whenever you're ready and we'll pick it up. 💙";

/// Outcome of one dispatch sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchReport {
    pub sent: u32,
    /// Delivery failures; the messages stay pending for retry.
    pub failed: u32,
    /// Pending messages retired for exceeding the age cap.
    pub expired: usize,
    /// Seed-destination messages marked failed without sending.
    pub skipped_seed: u32,
}

pub struct MessageDispatcher<'a> {
    store: &'a Store,
    sender: &'a dyn OutboundSender,
    batch_limit: u32,
    max_age: Duration,
    seed_prefixes: Vec<String>,
    running: AtomicBool,
}

impl<'a> MessageDispatcher<'a> {
    pub fn new(store: &'a Store, sender: &'a dyn OutboundSender) -> Self {
        Self {
            store,
            sender,
            batch_limit: DISPATCH_BATCH_LIMIT,
            max_age: Duration::days(PENDING_MAX_AGE_DAYS),
            seed_prefixes: SEED_PREFIXES.iter().map(|s| s.to_string()).collect(),
            running: AtomicBool::new(false),
        }
    }

    pub fn with_limits(mut self, batch_limit: u32, max_age_days: i64) -> Self {
        self.batch_limit = batch_limit;
        self.max_age = Duration::days(max_age_days);
        self
    }

    pub fn with_seed_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.seed_prefixes = prefixes;
        self
    }

    fn is_seed(&self, destination: &str) -> bool {
        self.seed_prefixes.iter().any(|p| destination.starts_with(p.as_str()))
    }

    /// Run one sweep: expire, then deliver due messages oldest first.
    pub fn dispatch_due(&self, now: DateTime<Utc>) -> Result<DispatchReport> {
        if self.running.swap(true, Ordering::SeqCst) {
            info!("dispatch sweep already running; skipping");
            return Ok(DispatchReport::default());
        }
        let result = self.dispatch_inner(now);
        self.running.store(false, Ordering::SeqCst);
        result
    }

    fn dispatch_inner(&self, now: DateTime<Utc>) -> Result<DispatchReport> {
        let mut report = DispatchReport {
            expired: self.store.expire_pending_before(now - self.max_age)?,
            ..Default::default()
        };
        if report.expired > 0 {
            info!(count = report.expired, "retired stale pending messages");
        }

        for message in self.store.due_pending(now, self.batch_limit)? {
            if self.is_seed(&message.destination) {
                self.store
                    .mark_scheduled_error(message.id, "seed destination")?;
                report.skipped_seed += 1;
                continue;
            }
            match self.sender.send(&message.destination, &message.content) {
                Ok(()) => {
                    // First write wins; a concurrent sweep that beat us
                    // to the transition already audited this message.
                    if self.store.mark_scheduled_sent(message.id)? {
                        self.store
                            .insert_message(&Message::outbound(message.patient_id, &message.content))?;
                        report.sent += 1;
                    }
                }
                Err(e) => {
                    warn!(error = %e, id = %message.id, "delivery failed; message stays pending");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Queue a missed-check-in reminder for every active patient on a
    /// protocol who was prompted in the last 24 hours but neither
    /// finished today's check-in nor wrote back since the prompt. One
    /// failure never blocks the other patients.
    pub fn queue_missed_checkin_reminders(
        &self,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> Result<u32> {
        let mut queued = 0;
        for assignment in self.store.list_active_assignments()? {
            match self.remind_one(assignment.patient_id, now, today) {
                Ok(true) => queued += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, patient = %assignment.patient_id, "reminder sweep failed for patient");
                }
            }
        }
        Ok(queued)
    }

    fn remind_one(&self, patient_id: uuid::Uuid, now: DateTime<Utc>, today: NaiveDate) -> Result<bool> {
        let Some(patient) = self.store.patient_by_id(patient_id)? else {
            return Ok(false);
        };
        if patient.status != PatientStatus::Active || !patient.plan.has_checkins() {
            return Ok(false);
        }
        if let Some(checkin) = self.store.checkin_for_day(patient_id, today)? {
            if checkin.is_complete() {
                return Ok(false);
            }
        }
        let day_ago = now - Duration::hours(24);
        // Only nudge patients we actually prompted in the window.
        let Some(prompted_at) = self.store.last_gamification_sent(patient_id, day_ago)? else {
            return Ok(false);
        };
        if self.store.has_inbound_since(patient_id, prompted_at)? {
            return Ok(false);
        }
        if self.store.reminder_queued_since(patient_id, day_ago)? {
            return Ok(false);
        }
        self.store.insert_scheduled(&ScheduledMessage::new(
            patient_id,
            &patient.phone,
            REMINDER_TEXT,
            now,
            MessageSource::Reminder,
        ))?;
        Ok(true)
    }
}
