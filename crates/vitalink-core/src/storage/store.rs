//! SQLite-backed record store.
//!
//! Single source of truth for every component: patients, the message
//! audit log, check-in state, the outbound queue, community events,
//! weight entries, weekly history, protocol assignments, and
//! escalations. No component keeps state in memory across invocations;
//! concurrent handlers synchronize through the constraints here
//! (UNIQUE external_id for inbound idempotency, conditional UPDATEs
//! for first-writer-wins transitions).

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::data_dir;
use crate::badges::CommunityKind;
use crate::checkin::{CheckinAnswers, CheckinState, CheckinStep};
use crate::error::StoreError;
use crate::message::{Message, MessageSource, ScheduledMessage, ScheduledStatus, Sender};
use crate::patient::{GamificationState, Patient, PatientStatus, Perspective, PlanTier};
use crate::protocol::ProtocolAssignment;
use crate::stats::{CommunityStats, PerspectiveStats};

// === Helper Functions ===

/// Parse plan tier from database string
fn parse_plan(plan_str: &str) -> PlanTier {
    match plan_str {
        "premium" => PlanTier::Premium,
        "vip" => PlanTier::Vip,
        _ => PlanTier::Freemium,
    }
}

/// Format plan tier for database storage
fn format_plan(plan: PlanTier) -> &'static str {
    match plan {
        PlanTier::Freemium => "freemium",
        PlanTier::Premium => "premium",
        PlanTier::Vip => "vip",
    }
}

/// Parse patient status from database string
fn parse_status(status_str: &str) -> PatientStatus {
    match status_str {
        "active" => PatientStatus::Active,
        _ => PatientStatus::Pending,
    }
}

/// Format patient status for database storage
fn format_status(status: PatientStatus) -> &'static str {
    match status {
        PatientStatus::Pending => "pending",
        PatientStatus::Active => "active",
    }
}

/// Parse message sender from database string
fn parse_sender(sender_str: &str) -> Sender {
    match sender_str {
        "system" => Sender::System,
        "staff" => Sender::Staff,
        _ => Sender::Patient,
    }
}

/// Parse scheduled message status from database string
fn parse_scheduled_status(status_str: &str) -> ScheduledStatus {
    match status_str {
        "sent" => ScheduledStatus::Sent,
        "error" => ScheduledStatus::Error,
        _ => ScheduledStatus::Pending,
    }
}

/// Format scheduled message status for database storage
fn format_scheduled_status(status: ScheduledStatus) -> &'static str {
    match status {
        ScheduledStatus::Pending => "pending",
        ScheduledStatus::Sent => "sent",
        ScheduledStatus::Error => "error",
    }
}

/// Parse message source from database string
fn parse_source(source_str: &str) -> MessageSource {
    match source_str {
        "protocol" => MessageSource::Protocol,
        "reminder" => MessageSource::Reminder,
        "gamification" => MessageSource::Gamification,
        _ => MessageSource::System,
    }
}

/// Parse community event kind from database string
fn parse_community_kind(kind_str: &str) -> CommunityKind {
    match kind_str {
        "reaction" => CommunityKind::Reaction,
        _ => CommunityKind::Comment,
    }
}

/// Parse check-in step from database string
fn parse_step(step_str: &str) -> CheckinStep {
    match step_str {
        "hydration" => CheckinStep::Hydration,
        "meal_breakfast" => CheckinStep::MealBreakfast,
        "meal_lunch" => CheckinStep::MealLunch,
        "meal_dinner" => CheckinStep::MealDinner,
        "snacks" => CheckinStep::Snacks,
        "activity" => CheckinStep::Activity,
        "wellbeing" => CheckinStep::Wellbeing,
        "weight" => CheckinStep::Weight,
        _ => CheckinStep::Complete,
    }
}

/// Parse weekday from database string
fn parse_weekday(day_str: &str) -> Weekday {
    match day_str {
        "tue" => Weekday::Tue,
        "wed" => Weekday::Wed,
        "thu" => Weekday::Thu,
        "fri" => Weekday::Fri,
        "sat" => Weekday::Sat,
        "sun" => Weekday::Sun,
        _ => Weekday::Mon,
    }
}

/// Format weekday for database storage
fn format_weekday(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

/// Parse perspective from database string
fn parse_perspective(p_str: &str) -> Perspective {
    match p_str {
        "nutrition" => Perspective::Nutrition,
        "movement" => Perspective::Movement,
        "hydration" => Perspective::Hydration,
        "wellbeing" => Perspective::Wellbeing,
        _ => Perspective::Discipline,
    }
}

/// Parse datetime from RFC3339 string with fallback to current time
fn parse_datetime_fallback(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Parse a stored calendar date (`%Y-%m-%d`)
fn parse_date(date_str: &str, column: &'static str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| StoreError::CorruptColumn {
        column,
        message: e.to_string(),
    })
}

fn decode_json<T: serde::de::DeserializeOwned>(
    raw: &str,
    column: &'static str,
) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::CorruptColumn {
        column,
        message: e.to_string(),
    })
}

/// Build a ScheduledMessage from a database row
fn row_to_scheduled(row: &rusqlite::Row) -> Result<ScheduledMessage, rusqlite::Error> {
    let id: String = row.get(0)?;
    let patient_id: String = row.get(1)?;
    let send_at: String = row.get(4)?;
    let status: String = row.get(5)?;
    let source: String = row.get(6)?;
    let created_at: String = row.get(8)?;
    Ok(ScheduledMessage {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        patient_id: Uuid::parse_str(&patient_id).unwrap_or_default(),
        destination: row.get(2)?,
        content: row.get(3)?,
        send_at: parse_datetime_fallback(&send_at),
        status: parse_scheduled_status(&status),
        source: parse_source(&source),
        error_reason: row.get(7)?,
        created_at: parse_datetime_fallback(&created_at),
    })
}

/// Build a Message from a database row
fn row_to_message(row: &rusqlite::Row) -> Result<Message, rusqlite::Error> {
    let id: String = row.get(0)?;
    let patient_id: String = row.get(1)?;
    let sender: String = row.get(2)?;
    let created_at: String = row.get(5)?;
    Ok(Message {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        patient_id: Uuid::parse_str(&patient_id).unwrap_or_default(),
        sender: parse_sender(&sender),
        text: row.get(3)?,
        external_id: row.get(4)?,
        created_at: parse_datetime_fallback(&created_at),
    })
}

/// SQLite record store shared by every engine component.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open the store at `~/.config/vitalink/vitalink.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let path = data_dir()?.join("vitalink.db");
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory store (for tests).
    #[cfg(test)]
    pub fn open_memory() -> Result<Self, Box<dyn std::error::Error>> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS patients (
                id            TEXT PRIMARY KEY,
                phone         TEXT NOT NULL UNIQUE,
                display_name  TEXT NOT NULL,
                plan          TEXT NOT NULL,
                status        TEXT NOT NULL,
                gamification  TEXT NOT NULL,
                created_at    TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id          TEXT PRIMARY KEY,
                patient_id  TEXT NOT NULL,
                sender      TEXT NOT NULL,
                text        TEXT NOT NULL,
                external_id TEXT UNIQUE,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS checkins (
                id            TEXT PRIMARY KEY,
                patient_id    TEXT NOT NULL,
                date          TEXT NOT NULL,
                step          TEXT NOT NULL,
                sequence      TEXT NOT NULL,
                data          TEXT NOT NULL,
                completed_at  TEXT,
                points_earned INTEGER,
                UNIQUE(patient_id, date)
            );

            CREATE TABLE IF NOT EXISTS checkin_history (
                id           TEXT PRIMARY KEY,
                patient_id   TEXT NOT NULL,
                date         TEXT NOT NULL,
                points       INTEGER NOT NULL,
                perfect      INTEGER NOT NULL,
                perspectives TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS scheduled_messages (
                id           TEXT PRIMARY KEY,
                patient_id   TEXT NOT NULL,
                destination  TEXT NOT NULL,
                content      TEXT NOT NULL,
                send_at      TEXT NOT NULL,
                status       TEXT NOT NULL,
                source       TEXT NOT NULL,
                error_reason TEXT,
                created_at   TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS community_events (
                id         TEXT PRIMARY KEY,
                patient_id TEXT NOT NULL,
                kind       TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS weight_entries (
                id         TEXT PRIMARY KEY,
                patient_id TEXT NOT NULL,
                date       TEXT NOT NULL,
                weight_kg  REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS weekly_history (
                id         TEXT PRIMARY KEY,
                patient_id TEXT NOT NULL,
                week_start TEXT NOT NULL,
                perfect    INTEGER NOT NULL,
                UNIQUE(patient_id, week_start)
            );

            CREATE TABLE IF NOT EXISTS protocol_assignments (
                id            TEXT PRIMARY KEY,
                patient_id    TEXT NOT NULL,
                protocol_id   TEXT NOT NULL,
                weigh_day     TEXT NOT NULL,
                weight_target REAL,
                active        INTEGER NOT NULL,
                started_at    TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS escalations (
                id           TEXT PRIMARY KEY,
                patient_id   TEXT NOT NULL,
                message_text TEXT NOT NULL,
                acknowledged INTEGER NOT NULL DEFAULT 0,
                created_at   TEXT NOT NULL
            );

            -- Create indexes for common query patterns
            CREATE INDEX IF NOT EXISTS idx_messages_patient ON messages(patient_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_scheduled_status_send_at ON scheduled_messages(status, send_at);
            CREATE INDEX IF NOT EXISTS idx_checkins_patient_date ON checkins(patient_id, date);
            CREATE INDEX IF NOT EXISTS idx_community_patient ON community_events(patient_id);",
        )?;
        Ok(())
    }

    // ── Patients ─────────────────────────────────────────────────────

    pub fn insert_patient(&self, patient: &Patient) -> Result<(), StoreError> {
        let gamification = serde_json::to_string(&patient.gamification)
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO patients (id, phone, display_name, plan, status, gamification, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                patient.id.to_string(),
                patient.phone,
                patient.display_name,
                format_plan(patient.plan),
                format_status(patient.status),
                gamification,
                patient.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Persist mutable patient fields (status and gamification state).
    pub fn update_patient(&self, patient: &Patient) -> Result<(), StoreError> {
        let gamification = serde_json::to_string(&patient.gamification)
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        self.conn.execute(
            "UPDATE patients SET display_name = ?2, plan = ?3, status = ?4, gamification = ?5
             WHERE id = ?1",
            params![
                patient.id.to_string(),
                patient.display_name,
                format_plan(patient.plan),
                format_status(patient.status),
                gamification,
            ],
        )?;
        Ok(())
    }

    fn row_to_patient(row: &rusqlite::Row) -> Result<(Patient, String), rusqlite::Error> {
        let id: String = row.get(0)?;
        let plan: String = row.get(3)?;
        let status: String = row.get(4)?;
        let gamification_raw: String = row.get(5)?;
        let created_at: String = row.get(6)?;
        let patient = Patient {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            phone: row.get(1)?,
            display_name: row.get(2)?,
            plan: parse_plan(&plan),
            status: parse_status(&status),
            // Replaced after JSON decode below.
            gamification: GamificationState::new(Utc::now().date_naive()),
            created_at: parse_datetime_fallback(&created_at),
        };
        Ok((patient, gamification_raw))
    }

    fn finish_patient(pair: (Patient, String)) -> Result<Patient, StoreError> {
        let (mut patient, raw) = pair;
        patient.gamification = decode_json(&raw, "patients.gamification")?;
        Ok(patient)
    }

    pub fn patient_by_phone(&self, phone: &str) -> Result<Option<Patient>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, phone, display_name, plan, status, gamification, created_at
             FROM patients WHERE phone = ?1",
        )?;
        let row = stmt
            .query_row(params![phone], Self::row_to_patient)
            .optional()?;
        row.map(Self::finish_patient).transpose()
    }

    pub fn patient_by_id(&self, id: Uuid) -> Result<Option<Patient>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, phone, display_name, plan, status, gamification, created_at
             FROM patients WHERE id = ?1",
        )?;
        let row = stmt
            .query_row(params![id.to_string()], Self::row_to_patient)
            .optional()?;
        row.map(Self::finish_patient).transpose()
    }

    pub fn list_patients(&self) -> Result<Vec<Patient>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, phone, display_name, plan, status, gamification, created_at
             FROM patients ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], Self::row_to_patient)?;
        let mut patients = Vec::new();
        for row in rows {
            patients.push(Self::finish_patient(row?)?);
        }
        Ok(patients)
    }

    // ── Message audit log ────────────────────────────────────────────

    /// Append a message to the audit log.
    ///
    /// Returns `Ok(false)` when the message's `external_id` already
    /// exists -- the caller treats that delivery as already handled.
    pub fn insert_message(&self, message: &Message) -> Result<bool, StoreError> {
        let result = self.conn.execute(
            "INSERT INTO messages (id, patient_id, sender, text, external_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id.to_string(),
                message.patient_id.to_string(),
                message.sender.as_str(),
                message.text,
                message.external_id,
                message.created_at.to_rfc3339(),
            ],
        );
        match result {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn messages_for_patient(
        &self,
        patient_id: Uuid,
        limit: u32,
    ) -> Result<Vec<Message>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, patient_id, sender, text, external_id, created_at
             FROM messages WHERE patient_id = ?1
             ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![patient_id.to_string(), limit], row_to_message)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Whether the patient sent anything after `since`.
    pub fn has_inbound_since(
        &self,
        patient_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages
             WHERE patient_id = ?1 AND sender = 'patient' AND created_at > ?2",
            params![patient_id.to_string(), since.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    #[cfg(test)]
    pub fn count_messages(&self, patient_id: Uuid) -> Result<u32, StoreError> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE patient_id = ?1",
            params![patient_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ── Check-ins ────────────────────────────────────────────────────

    pub fn insert_checkin(&self, checkin: &CheckinState) -> Result<(), StoreError> {
        let sequence = serde_json::to_string(&checkin.sequence)
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        let data = serde_json::to_string(&checkin.data)
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO checkins (id, patient_id, date, step, sequence, data, completed_at, points_earned)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                checkin.id.to_string(),
                checkin.patient_id.to_string(),
                checkin.date.format("%Y-%m-%d").to_string(),
                checkin.step.as_str(),
                sequence,
                data,
                checkin.completed_at.map(|t| t.to_rfc3339()),
                checkin.points_earned,
            ],
        )?;
        Ok(())
    }

    fn row_to_checkin(row: &rusqlite::Row) -> Result<(CheckinState, String, String), rusqlite::Error> {
        let id: String = row.get(0)?;
        let patient_id: String = row.get(1)?;
        let date: String = row.get(2)?;
        let step: String = row.get(3)?;
        let sequence_raw: String = row.get(4)?;
        let data_raw: String = row.get(5)?;
        let completed_at: Option<String> = row.get(6)?;
        let checkin = CheckinState {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            patient_id: Uuid::parse_str(&patient_id).unwrap_or_default(),
            date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .unwrap_or_else(|_| Utc::now().date_naive()),
            step: parse_step(&step),
            sequence: Vec::new(),
            data: CheckinAnswers::default(),
            completed_at: completed_at.as_deref().map(parse_datetime_fallback),
            points_earned: row.get(7)?,
        };
        Ok((checkin, sequence_raw, data_raw))
    }

    fn finish_checkin(
        triple: (CheckinState, String, String),
    ) -> Result<CheckinState, StoreError> {
        let (mut checkin, sequence_raw, data_raw) = triple;
        checkin.sequence = decode_json(&sequence_raw, "checkins.sequence")?;
        checkin.data = decode_json(&data_raw, "checkins.data")?;
        Ok(checkin)
    }

    /// The patient's check-in for `date`, completed or not.
    pub fn checkin_for_day(
        &self,
        patient_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<CheckinState>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, patient_id, date, step, sequence, data, completed_at, points_earned
             FROM checkins WHERE patient_id = ?1 AND date = ?2",
        )?;
        let row = stmt
            .query_row(
                params![patient_id.to_string(), date.format("%Y-%m-%d").to_string()],
                Self::row_to_checkin,
            )
            .optional()?;
        row.map(Self::finish_checkin).transpose()
    }

    /// The patient's non-completed check-in for `date`, if any.
    pub fn active_checkin(
        &self,
        patient_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<CheckinState>, StoreError> {
        Ok(self
            .checkin_for_day(patient_id, date)?
            .filter(|c| !c.is_complete()))
    }

    /// Conditionally persist a step transition.
    ///
    /// The UPDATE only applies while the stored step still equals
    /// `expected_step`; returns `false` when another writer advanced
    /// first (the caller drops its reply).
    pub fn advance_checkin(
        &self,
        checkin: &CheckinState,
        expected_step: CheckinStep,
    ) -> Result<bool, StoreError> {
        let data = serde_json::to_string(&checkin.data)
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        let affected = self.conn.execute(
            "UPDATE checkins SET step = ?2, data = ?3, completed_at = ?4, points_earned = ?5
             WHERE id = ?1 AND step = ?6",
            params![
                checkin.id.to_string(),
                checkin.step.as_str(),
                data,
                checkin.completed_at.map(|t| t.to_rfc3339()),
                checkin.points_earned,
                expected_step.as_str(),
            ],
        )?;
        Ok(affected == 1)
    }

    /// Append a completed check-in to the history used by the stats
    /// aggregator.
    pub fn insert_checkin_history(
        &self,
        patient_id: Uuid,
        date: NaiveDate,
        points: u32,
        perfect: bool,
        perspectives: &[Perspective],
    ) -> Result<(), StoreError> {
        let names: Vec<&str> = perspectives.iter().map(|p| p.as_str()).collect();
        let perspectives_json = serde_json::to_string(&names)
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO checkin_history (id, patient_id, date, points, perfect, perspectives)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                Uuid::new_v4().to_string(),
                patient_id.to_string(),
                date.format("%Y-%m-%d").to_string(),
                points,
                perfect as i32,
                perspectives_json,
            ],
        )?;
        Ok(())
    }

    /// Recent completed check-ins, newest first.
    pub fn checkin_history(
        &self,
        patient_id: Uuid,
        limit: u32,
    ) -> Result<Vec<(NaiveDate, u32, bool)>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT date, points, perfect FROM checkin_history
             WHERE patient_id = ?1 ORDER BY date DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![patient_id.to_string(), limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, i32>(2)?,
            ))
        })?;
        let mut history = Vec::new();
        for row in rows {
            let (date, points, perfect) = row?;
            history.push((parse_date(&date, "checkin_history.date")?, points, perfect != 0));
        }
        Ok(history)
    }

    /// Per-perspective check-in counters for the stats snapshot.
    pub fn perspective_counters(
        &self,
        patient_id: Uuid,
    ) -> Result<BTreeMap<Perspective, PerspectiveStats>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT perspectives, perfect FROM checkin_history WHERE patient_id = ?1",
        )?;
        let rows = stmt.query_map(params![patient_id.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i32>(1)?))
        })?;

        let mut counters: BTreeMap<Perspective, PerspectiveStats> = BTreeMap::new();
        for row in rows {
            let (perspectives_json, perfect) = row?;
            let names: Vec<String> = decode_json(&perspectives_json, "checkin_history.perspectives")?;
            for name in names {
                let entry = counters.entry(parse_perspective(&name)).or_default();
                entry.checkins += 1;
                if perfect != 0 {
                    entry.perfect_checkins += 1;
                }
            }
        }
        Ok(counters)
    }

    // ── Scheduled messages ───────────────────────────────────────────

    pub fn insert_scheduled(&self, message: &ScheduledMessage) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO scheduled_messages
             (id, patient_id, destination, content, send_at, status, source, error_reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                message.id.to_string(),
                message.patient_id.to_string(),
                message.destination,
                message.content,
                message.send_at.to_rfc3339(),
                format_scheduled_status(message.status),
                message.source.as_str(),
                message.error_reason,
                message.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Pending messages due at or before `now`, oldest first, bounded.
    pub fn due_pending(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ScheduledMessage>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, patient_id, destination, content, send_at, status, source, error_reason, created_at
             FROM scheduled_messages
             WHERE status = 'pending' AND send_at <= ?1
             ORDER BY send_at LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![now.to_rfc3339(), limit], row_to_scheduled)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Transition `pending -> sent`. First write wins: returns `false`
    /// when the message was no longer pending.
    pub fn mark_scheduled_sent(&self, id: Uuid) -> Result<bool, StoreError> {
        let affected = self.conn.execute(
            "UPDATE scheduled_messages SET status = 'sent' WHERE id = ?1 AND status = 'pending'",
            params![id.to_string()],
        )?;
        Ok(affected == 1)
    }

    /// Transition `pending -> error` with a reason.
    pub fn mark_scheduled_error(&self, id: Uuid, reason: &str) -> Result<bool, StoreError> {
        let affected = self.conn.execute(
            "UPDATE scheduled_messages SET status = 'error', error_reason = ?2
             WHERE id = ?1 AND status = 'pending'",
            params![id.to_string(), reason],
        )?;
        Ok(affected == 1)
    }

    /// Mark every pending message due before `cutoff` as expired.
    /// Returns the number of messages retired.
    pub fn expire_pending_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let affected = self.conn.execute(
            "UPDATE scheduled_messages SET status = 'error', error_reason = 'expired'
             WHERE status = 'pending' AND send_at < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(affected)
    }

    pub fn scheduled_by_id(&self, id: Uuid) -> Result<Option<ScheduledMessage>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, patient_id, destination, content, send_at, status, source, error_reason, created_at
             FROM scheduled_messages WHERE id = ?1",
        )?;
        stmt.query_row(params![id.to_string()], row_to_scheduled)
            .optional()
            .map_err(Into::into)
    }

    /// Latest sent gamification-tagged message for a patient at or
    /// after `since`.
    pub fn last_gamification_sent(
        &self,
        patient_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row: Option<String> = self
            .conn
            .query_row(
                "SELECT MAX(send_at) FROM scheduled_messages
                 WHERE patient_id = ?1 AND source = 'gamification'
                   AND status = 'sent' AND send_at >= ?2",
                params![patient_id.to_string(), since.to_rfc3339()],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(row.as_deref().map(parse_datetime_fallback))
    }

    /// Whether a reminder was queued for this patient after `since`.
    /// Keeps the reminder sweep from stacking duplicates.
    pub fn reminder_queued_since(
        &self,
        patient_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM scheduled_messages
             WHERE patient_id = ?1 AND source = 'reminder' AND created_at > ?2",
            params![patient_id.to_string(), since.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ── Community, weight, weekly history ────────────────────────────

    pub fn record_community_event(
        &self,
        patient_id: Uuid,
        kind: CommunityKind,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO community_events (id, patient_id, kind, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                Uuid::new_v4().to_string(),
                patient_id.to_string(),
                kind.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn community_counters(&self, patient_id: Uuid) -> Result<CommunityStats, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT kind, COUNT(*) FROM community_events WHERE patient_id = ?1 GROUP BY kind",
        )?;
        let rows = stmt.query_map(params![patient_id.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;

        let mut stats = CommunityStats::default();
        for row in rows {
            let (kind, count) = row?;
            match parse_community_kind(&kind) {
                CommunityKind::Comment => stats.comments += count,
                CommunityKind::Reaction => stats.reactions += count,
            }
        }
        Ok(stats)
    }

    pub fn insert_weight(
        &self,
        patient_id: Uuid,
        date: NaiveDate,
        weight_kg: f64,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO weight_entries (id, patient_id, date, weight_kg)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                Uuid::new_v4().to_string(),
                patient_id.to_string(),
                date.format("%Y-%m-%d").to_string(),
                weight_kg,
            ],
        )?;
        Ok(())
    }

    pub fn latest_weight(&self, patient_id: Uuid) -> Result<Option<f64>, StoreError> {
        self.conn
            .query_row(
                "SELECT weight_kg FROM weight_entries
                 WHERE patient_id = ?1 ORDER BY date DESC LIMIT 1",
                params![patient_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Record whether a completed week was perfect. Idempotent per
    /// (patient, week).
    pub fn record_week(
        &self,
        patient_id: Uuid,
        week_start: NaiveDate,
        perfect: bool,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO weekly_history (id, patient_id, week_start, perfect)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                Uuid::new_v4().to_string(),
                patient_id.to_string(),
                week_start.format("%Y-%m-%d").to_string(),
                perfect as i32,
            ],
        )?;
        Ok(())
    }

    pub fn perfect_week_count(&self, patient_id: Uuid) -> Result<u32, StoreError> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM weekly_history WHERE patient_id = ?1 AND perfect = 1",
            params![patient_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ── Protocol assignments ─────────────────────────────────────────

    pub fn insert_assignment(&self, assignment: &ProtocolAssignment) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO protocol_assignments
             (id, patient_id, protocol_id, weigh_day, weight_target, active, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                assignment.id.to_string(),
                assignment.patient_id.to_string(),
                assignment.protocol_id,
                format_weekday(assignment.weigh_day),
                assignment.weight_target,
                assignment.active as i32,
                assignment.started_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn row_to_assignment(row: &rusqlite::Row) -> Result<ProtocolAssignment, rusqlite::Error> {
        let id: String = row.get(0)?;
        let patient_id: String = row.get(1)?;
        let weigh_day: String = row.get(3)?;
        let active: i32 = row.get(5)?;
        let started_at: String = row.get(6)?;
        Ok(ProtocolAssignment {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            patient_id: Uuid::parse_str(&patient_id).unwrap_or_default(),
            protocol_id: row.get(2)?,
            weigh_day: parse_weekday(&weigh_day),
            weight_target: row.get(4)?,
            active: active != 0,
            started_at: parse_datetime_fallback(&started_at),
        })
    }

    pub fn active_protocol_assignment(
        &self,
        patient_id: Uuid,
    ) -> Result<Option<ProtocolAssignment>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, patient_id, protocol_id, weigh_day, weight_target, active, started_at
             FROM protocol_assignments
             WHERE patient_id = ?1 AND active = 1
             ORDER BY started_at DESC LIMIT 1",
        )?;
        stmt.query_row(params![patient_id.to_string()], Self::row_to_assignment)
            .optional()
            .map_err(Into::into)
    }

    pub fn list_active_assignments(&self) -> Result<Vec<ProtocolAssignment>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, patient_id, protocol_id, weigh_day, weight_target, active, started_at
             FROM protocol_assignments WHERE active = 1",
        )?;
        let rows = stmt.query_map([], Self::row_to_assignment)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Escalations ──────────────────────────────────────────────────

    pub fn insert_escalation(&self, patient_id: Uuid, text: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO escalations (id, patient_id, message_text, acknowledged, created_at)
             VALUES (?1, ?2, ?3, 0, ?4)",
            params![
                Uuid::new_v4().to_string(),
                patient_id.to_string(),
                text,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn open_escalation_count(&self) -> Result<u32, StoreError> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM escalations WHERE acknowledged = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
