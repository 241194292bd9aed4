//! Top-level engagement engine.
//!
//! One `handle_inbound` call per delivered message. The engine wires
//! the audit log, the intent router, the check-in state machine, and
//! the gamification ledger together, with the store as the only
//! shared state. Every path resolves to a `HandleOutcome` value; no
//! error escapes to the delivery webhook.

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::badges::CommunityKind;
use crate::checkin::CheckinState;
use crate::error::{EngineError, Result};
use crate::gamification::{ActionResult, GamificationLedger};
use crate::message::Message;
use crate::patient::{Patient, Perspective};
use crate::router::{self, RouteAction, EMERGENCY_REPLY, SOCIAL_ACK};
use crate::services::{ClassifyContext, NlpService, OutboundSender};
use crate::storage::Store;

/// Sent to unknown numbers instead of failing the delivery.
pub const REGISTRATION_PROMPT: &str =
    "Hi! I don't have this number on file yet. Please ask your clinic to set up your account.";

/// Fallback conversational reply when the model is unavailable.
pub const CONVERSE_FALLBACK: &str =
    "I'm having a little trouble answering right now. I'll get back to you shortly!";

/// Weigh-day used when a patient has no protocol assignment.
pub const DEFAULT_WEIGH_DAY: Weekday = Weekday::Fri;

/// Discipline credit for one community interaction.
pub const COMMUNITY_POINTS: u32 = 5;

/// Resolution of one inbound delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleOutcome {
    pub success: bool,
    /// Route taken, when the message reached dispatch.
    pub action: Option<RouteAction>,
    /// Reply sent back to the patient, if any.
    pub reply: Option<String>,
    pub error: Option<String>,
}

impl HandleOutcome {
    fn ok(action: Option<RouteAction>, reply: Option<String>) -> Self {
        Self {
            success: true,
            action,
            reply,
            error: None,
        }
    }
}

/// Request-triggered engine: one instance per process, no mutable
/// state of its own.
pub struct EngagementEngine<'a> {
    store: &'a Store,
    nlp: &'a dyn NlpService,
    sender: &'a dyn OutboundSender,
}

impl<'a> EngagementEngine<'a> {
    pub fn new(store: &'a Store, nlp: &'a dyn NlpService, sender: &'a dyn OutboundSender) -> Self {
        Self { store, nlp, sender }
    }

    /// Handle one inbound delivery. Never returns an error: failures
    /// are folded into the outcome.
    pub fn handle_inbound(
        &self,
        from_phone: &str,
        text: &str,
        external_id: Option<&str>,
        today: NaiveDate,
    ) -> HandleOutcome {
        match self.handle_inner(from_phone, text, external_id, today) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, from = from_phone, "inbound handling failed");
                HandleOutcome {
                    success: false,
                    action: None,
                    reply: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    fn handle_inner(
        &self,
        from_phone: &str,
        text: &str,
        external_id: Option<&str>,
        today: NaiveDate,
    ) -> Result<HandleOutcome> {
        // Unknown contact: registration prompt, resolved as success.
        let Some(patient) = self.store.patient_by_phone(from_phone)? else {
            self.try_send(from_phone, REGISTRATION_PROMPT);
            return Ok(HandleOutcome::ok(None, Some(REGISTRATION_PROMPT.to_string())));
        };

        // Audit log before anything else; the external id constraint
        // is the sole dedupe for redelivered webhooks.
        let inbound = Message::inbound(patient.id, text, external_id);
        if !self.store.insert_message(&inbound)? {
            info!(external_id = ?external_id, "duplicate delivery ignored");
            return Ok(HandleOutcome::ok(None, None));
        }

        let active_checkin = self.store.active_checkin(patient.id, today)?;
        let context = ClassifyContext {
            has_active_checkin: active_checkin.is_some(),
            checkin_title: active_checkin.as_ref().map(|c| c.step.as_str().to_string()),
        };
        let classification = router::classify_with_fallback(self.nlp, text, &context);
        let action = router::route(&classification, active_checkin.is_some());

        match action {
            RouteAction::Escalate => {
                self.store.insert_escalation(patient.id, text)?;
                warn!(patient = %patient.id, "emergency escalation recorded");
                self.send_and_log(&patient, EMERGENCY_REPLY)?;
                Ok(HandleOutcome::ok(Some(action), Some(EMERGENCY_REPLY.to_string())))
            }
            RouteAction::SocialAck => {
                self.send_and_log(&patient, SOCIAL_ACK)?;
                Ok(HandleOutcome::ok(Some(action), Some(SOCIAL_ACK.to_string())))
            }
            RouteAction::AdvanceCheckin => {
                // Guarded by the router: active_checkin is present.
                let checkin = active_checkin.ok_or_else(|| EngineError::NotFound {
                    entity: "checkin",
                    key: patient.id.to_string(),
                })?;
                self.advance_checkin(&patient, checkin, text, today)
            }
            RouteAction::Converse => {
                let reply = match self.nlp.generate_reply(text, &patient.display_name) {
                    Ok(reply) => reply,
                    Err(e) => {
                        warn!(error = %e, "reply generation failed; using fallback");
                        CONVERSE_FALLBACK.to_string()
                    }
                };
                self.send_and_log(&patient, &reply)?;
                Ok(HandleOutcome::ok(Some(action), Some(reply)))
            }
        }
    }

    /// Feed a reply into the active check-in and persist the step
    /// transition conditionally (first writer wins on races).
    fn advance_checkin(
        &self,
        patient: &Patient,
        mut checkin: CheckinState,
        text: &str,
        today: NaiveDate,
    ) -> Result<HandleOutcome> {
        let expected = checkin.step;
        match checkin.advance(text) {
            Err(validation) => {
                // Invalid reply: step untouched, error-qualified
                // re-prompt of the same question.
                info!(step = expected.as_str(), error = %validation, "invalid check-in reply");
                let reprompt = expected.reprompt();
                self.send_and_log(patient, &reprompt)?;
                Ok(HandleOutcome::ok(Some(RouteAction::AdvanceCheckin), Some(reprompt)))
            }
            Ok(_next) => {
                if !self.store.advance_checkin(&checkin, expected)? {
                    // Another reply advanced this step first; drop ours.
                    info!(patient = %patient.id, "concurrent check-in advance lost; reply ignored");
                    return Ok(HandleOutcome::ok(Some(RouteAction::AdvanceCheckin), None));
                }

                if checkin.is_complete() {
                    self.finish_checkin(patient, &checkin, today)
                } else {
                    let prompt = checkin.step.prompt().to_string();
                    self.send_and_log(patient, &prompt)?;
                    Ok(HandleOutcome::ok(Some(RouteAction::AdvanceCheckin), Some(prompt)))
                }
            }
        }
    }

    /// Completion: persist history, record weight, credit the ledger
    /// once per answered perspective, and summarize for the patient.
    fn finish_checkin(
        &self,
        patient: &Patient,
        checkin: &CheckinState,
        today: NaiveDate,
    ) -> Result<HandleOutcome> {
        let score = checkin.score();
        let perspectives: Vec<Perspective> =
            score.perspective_deltas.iter().map(|(p, _)| *p).collect();
        self.store.insert_checkin_history(
            patient.id,
            checkin.date,
            score.total_points,
            score.perfect,
            &perspectives,
        )?;

        if let Some(weight) = checkin.data.weight_kg {
            self.store.insert_weight(patient.id, checkin.date, weight)?;
        }

        let ledger = GamificationLedger::new(self.store);
        let mut earned = 0;
        let mut new_badges: Vec<String> = Vec::new();
        let mut level_note: Option<String> = None;
        for (perspective, points) in &score.perspective_deltas {
            let result = ledger.apply_action(patient.id, *perspective, *points, today)?;
            earned += result.points_earned;
            new_badges.extend(result.new_badges);
            if let Some(name) = result.new_level {
                level_note = Some(name);
            }
        }

        // Quote what the ledger actually credited: the raw step score
        // counts the uncredited weight answer and misses the streak and
        // weekly-goal bonuses.
        let mut summary = format!("Check-in complete! You earned {earned} points today.");
        if let Some(name) = level_note {
            summary.push_str(&format!(" You've reached {name}!"));
        }
        if !new_badges.is_empty() {
            summary.push_str(&format!(" New badges: {}.", new_badges.join(", ")));
        }
        self.send_and_log(patient, &summary)?;
        Ok(HandleOutcome::ok(Some(RouteAction::AdvanceCheckin), Some(summary)))
    }

    /// Start today's check-in for a patient: one per calendar day,
    /// premium tiers only. Sends the first step's prompt.
    pub fn start_checkin(&self, patient_id: Uuid, today: NaiveDate) -> Result<CheckinState> {
        let patient = self
            .store
            .patient_by_id(patient_id)?
            .ok_or_else(|| EngineError::NotFound {
                entity: "patient",
                key: patient_id.to_string(),
            })?;

        if !patient.plan.has_checkins() {
            return Err(EngineError::Validation(
                crate::error::ValidationError::InvalidValue {
                    field: "plan",
                    message: "freemium patients do not receive check-ins".to_string(),
                },
            ));
        }

        if self.store.checkin_for_day(patient_id, today)?.is_some() {
            return Err(EngineError::Validation(
                crate::error::ValidationError::InvalidValue {
                    field: "checkin",
                    message: "a check-in already exists for today".to_string(),
                },
            ));
        }

        let weigh_day = self
            .store
            .active_protocol_assignment(patient_id)?
            .map(|a| a.weigh_day)
            .unwrap_or(DEFAULT_WEIGH_DAY);
        let checkin = CheckinState::start(patient_id, patient.plan, weigh_day, today);
        self.store.insert_checkin(&checkin)?;
        self.send_and_log(&patient, checkin.step.prompt())?;
        Ok(checkin)
    }

    /// Record a community interaction and credit discipline.
    pub fn record_community_activity(
        &self,
        patient_id: Uuid,
        kind: CommunityKind,
        today: NaiveDate,
    ) -> Result<ActionResult> {
        self.store.record_community_event(patient_id, kind)?;
        GamificationLedger::new(self.store).apply_action(
            patient_id,
            Perspective::Discipline,
            COMMUNITY_POINTS,
            today,
        )
    }

    /// Send a reply and append it to the audit log. Best-effort: a
    /// delivery failure is logged, not propagated.
    fn send_and_log(&self, patient: &Patient, text: &str) -> Result<()> {
        match self.sender.send(&patient.phone, text) {
            Ok(()) => {
                self.store.insert_message(&Message::outbound(patient.id, text))?;
            }
            Err(e) => {
                warn!(error = %e, patient = %patient.id, "reply delivery failed");
            }
        }
        Ok(())
    }

    fn try_send(&self, destination: &str, text: &str) {
        if let Err(e) = self.sender.send(destination, text) {
            warn!(error = %e, destination, "delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::patient::PlanTier;
    use crate::services::{Classification, Intent};
    use std::sync::Mutex;

    /// Scripted classifier: always returns the configured intent.
    struct FakeNlp {
        intent: Option<Intent>,
        reply: Option<String>,
    }

    impl FakeNlp {
        fn with_intent(intent: Intent) -> Self {
            Self {
                intent: Some(intent),
                reply: Some("model reply".to_string()),
            }
        }

        fn failing() -> Self {
            Self {
                intent: None,
                reply: None,
            }
        }
    }

    impl NlpService for FakeNlp {
        fn classify(
            &self,
            _text: &str,
            _context: &ClassifyContext,
        ) -> Result<Classification, EngineError> {
            match self.intent {
                Some(intent) => Ok(Classification {
                    intent,
                    confidence: 0.92,
                    reason: "scripted".to_string(),
                }),
                None => Err(EngineError::Downstream {
                    service: "nlp",
                    message: "down".to_string(),
                }),
            }
        }

        fn generate_reply(&self, _text: &str, _name: &str) -> Result<String, EngineError> {
            self.reply.clone().ok_or(EngineError::Downstream {
                service: "nlp",
                message: "down".to_string(),
            })
        }
    }

    /// Records every send; optionally fails them all.
    struct RecordingSender {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl RecordingSender {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn sent_texts(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
        }
    }

    impl OutboundSender for RecordingSender {
        fn send(&self, destination: &str, text: &str) -> Result<(), EngineError> {
            if self.fail {
                return Err(EngineError::Downstream {
                    service: "delivery",
                    message: "gateway down".to_string(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push((destination.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 24).unwrap()
    }

    fn seed(store: &Store) -> Patient {
        let mut patient = Patient::new("+5511977770000", "Clara", PlanTier::Premium, today());
        patient.status = crate::patient::PatientStatus::Active;
        store.insert_patient(&patient).unwrap();
        patient
    }

    #[test]
    fn test_unknown_number_gets_registration_prompt() {
        let store = Store::open_memory().unwrap();
        let nlp = FakeNlp::with_intent(Intent::Question);
        let sender = RecordingSender::new();
        let engine = EngagementEngine::new(&store, &nlp, &sender);

        let outcome = engine.handle_inbound("+550000000000", "hi", Some("SID1"), today());
        assert!(outcome.success);
        assert_eq!(outcome.reply.as_deref(), Some(REGISTRATION_PROMPT));
        assert_eq!(sender.sent_texts(), vec![REGISTRATION_PROMPT.to_string()]);
    }

    #[test]
    fn test_duplicate_delivery_is_ignored() {
        // Scenario D: same external id delivered twice.
        let store = Store::open_memory().unwrap();
        let patient = seed(&store);
        let nlp = FakeNlp::with_intent(Intent::Question);
        let sender = RecordingSender::new();
        let engine = EngagementEngine::new(&store, &nlp, &sender);

        let first = engine.handle_inbound(&patient.phone, "hello", Some("SID123"), today());
        assert!(first.success);
        assert!(first.reply.is_some());
        let rows_after_first = store.count_messages(patient.id).unwrap();

        let second = engine.handle_inbound(&patient.phone, "hello", Some("SID123"), today());
        assert!(second.success);
        assert!(second.reply.is_none());
        assert_eq!(store.count_messages(patient.id).unwrap(), rows_after_first);
    }

    #[test]
    fn test_emergency_escalates_even_with_active_checkin() {
        let store = Store::open_memory().unwrap();
        let patient = seed(&store);
        let nlp = FakeNlp::with_intent(Intent::Emergency);
        let sender = RecordingSender::new();
        let engine = EngagementEngine::new(&store, &nlp, &sender);

        engine.start_checkin(patient.id, today()).unwrap();
        let outcome =
            engine.handle_inbound(&patient.phone, "chest pain, help", Some("SID2"), today());
        assert_eq!(outcome.action, Some(RouteAction::Escalate));
        assert_eq!(store.open_escalation_count().unwrap(), 1);
        // Check-in untouched.
        let checkin = store.active_checkin(patient.id, today()).unwrap().unwrap();
        assert_eq!(checkin.step, crate::checkin::CheckinStep::Hydration);
    }

    #[test]
    fn test_social_gets_canned_ack() {
        let store = Store::open_memory().unwrap();
        let patient = seed(&store);
        let nlp = FakeNlp::with_intent(Intent::Social);
        let sender = RecordingSender::new();
        let engine = EngagementEngine::new(&store, &nlp, &sender);

        let outcome = engine.handle_inbound(&patient.phone, "bom dia!", Some("SID3"), today());
        assert_eq!(outcome.action, Some(RouteAction::SocialAck));
        assert_eq!(outcome.reply.as_deref(), Some(SOCIAL_ACK));
    }

    #[test]
    fn test_checkin_response_without_active_checkin_converses() {
        let store = Store::open_memory().unwrap();
        let patient = seed(&store);
        let nlp = FakeNlp::with_intent(Intent::CheckinResponse);
        let sender = RecordingSender::new();
        let engine = EngagementEngine::new(&store, &nlp, &sender);

        let outcome = engine.handle_inbound(&patient.phone, "A", Some("SID4"), today());
        assert_eq!(outcome.action, Some(RouteAction::Converse));
    }

    #[test]
    fn test_invalid_checkin_reply_reprompts_without_advancing() {
        // Scenario C: "talvez" at hydration.
        let store = Store::open_memory().unwrap();
        let patient = seed(&store);
        let nlp = FakeNlp::with_intent(Intent::CheckinResponse);
        let sender = RecordingSender::new();
        let engine = EngagementEngine::new(&store, &nlp, &sender);

        engine.start_checkin(patient.id, today()).unwrap();
        let outcome = engine.handle_inbound(&patient.phone, "talvez", Some("SID5"), today());
        assert!(outcome.success);
        assert!(outcome.reply.unwrap().contains("didn't catch that"));

        let checkin = store.active_checkin(patient.id, today()).unwrap().unwrap();
        assert_eq!(checkin.step, crate::checkin::CheckinStep::Hydration);
        assert!(checkin.points_earned.is_none());
    }

    #[test]
    fn test_full_checkin_flow_credits_ledger() {
        let store = Store::open_memory().unwrap();
        let patient = seed(&store);
        let nlp = FakeNlp::with_intent(Intent::CheckinResponse);
        let sender = RecordingSender::new();
        let engine = EngagementEngine::new(&store, &nlp, &sender);

        engine.start_checkin(patient.id, today()).unwrap();
        let mut sid = 10;
        for reply in ["A", "A", "A", "A", "A", "5"] {
            sid += 1;
            let outcome =
                engine.handle_inbound(&patient.phone, reply, Some(&format!("SID{sid}")), today());
            assert!(outcome.success);
        }

        let loaded = store.patient_by_id(patient.id).unwrap().unwrap();
        assert!(loaded.gamification.total_points > 0);
        assert_eq!(loaded.gamification.streak.current_streak, 1);
        let history = store.checkin_history(patient.id, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].2, "all-A check-in is perfect");
        assert!(sender
            .sent_texts()
            .iter()
            .any(|t| t.contains("Check-in complete")));
    }

    #[test]
    fn test_completion_summary_reports_ledger_credit() {
        // Weigh-day flow: the weight answer is stored but never
        // credited, and the nutrition weekly-goal bonus lands on top.
        // The summary must quote the ledger delta, not the step score.
        let store = Store::open_memory().unwrap();
        let patient = seed(&store);
        store
            .insert_assignment(&crate::protocol::ProtocolAssignment::new(
                patient.id,
                "reset-12w",
                Weekday::Mon,
                Some(80.0),
            ))
            .unwrap();
        let nlp = FakeNlp::with_intent(Intent::CheckinResponse);
        let sender = RecordingSender::new();
        let engine = EngagementEngine::new(&store, &nlp, &sender);

        engine.start_checkin(patient.id, today()).unwrap();
        let mut sid = 20;
        for reply in ["A", "A", "A", "A", "A", "5", "80.5"] {
            sid += 1;
            let outcome =
                engine.handle_inbound(&patient.phone, reply, Some(&format!("SID{sid}")), today());
            assert!(outcome.success);
        }

        let loaded = store.patient_by_id(patient.id).unwrap().unwrap();
        let expected = format!("You earned {} points today", loaded.gamification.total_points);
        assert!(
            sender.sent_texts().iter().any(|t| t.contains(&expected)),
            "summary should quote the credited total"
        );
    }

    #[test]
    fn test_classifier_outage_still_replies() {
        let store = Store::open_memory().unwrap();
        let patient = seed(&store);
        let nlp = FakeNlp::failing();
        let sender = RecordingSender::new();
        let engine = EngagementEngine::new(&store, &nlp, &sender);

        let outcome = engine.handle_inbound(&patient.phone, "anything", Some("SID6"), today());
        assert!(outcome.success);
        assert_eq!(outcome.action, Some(RouteAction::Converse));
        assert_eq!(outcome.reply.as_deref(), Some(CONVERSE_FALLBACK));
    }

    #[test]
    fn test_send_failure_does_not_fail_handling() {
        let store = Store::open_memory().unwrap();
        let patient = seed(&store);
        let nlp = FakeNlp::with_intent(Intent::Social);
        let sender = RecordingSender {
            sent: Mutex::new(Vec::new()),
            fail: true,
        };
        let engine = EngagementEngine::new(&store, &nlp, &sender);

        let outcome = engine.handle_inbound(&patient.phone, "oi", Some("SID7"), today());
        assert!(outcome.success);
    }

    #[test]
    fn test_freemium_cannot_start_checkin() {
        let store = Store::open_memory().unwrap();
        let patient = Patient::new("+5511966660000", "Duda", PlanTier::Freemium, today());
        store.insert_patient(&patient).unwrap();
        let nlp = FakeNlp::with_intent(Intent::Question);
        let sender = RecordingSender::new();
        let engine = EngagementEngine::new(&store, &nlp, &sender);

        let err = engine.start_checkin(patient.id, today()).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_one_checkin_per_day() {
        let store = Store::open_memory().unwrap();
        let patient = seed(&store);
        let nlp = FakeNlp::with_intent(Intent::Question);
        let sender = RecordingSender::new();
        let engine = EngagementEngine::new(&store, &nlp, &sender);

        engine.start_checkin(patient.id, today()).unwrap();
        assert!(engine.start_checkin(patient.id, today()).is_err());
    }

    #[test]
    fn test_community_activity_credits_discipline() {
        let store = Store::open_memory().unwrap();
        let patient = seed(&store);
        let nlp = FakeNlp::with_intent(Intent::Question);
        let sender = RecordingSender::new();
        let engine = EngagementEngine::new(&store, &nlp, &sender);

        let result = engine
            .record_community_activity(patient.id, CommunityKind::Comment, today())
            .unwrap();
        assert_eq!(result.points_earned, COMMUNITY_POINTS);
        let counters = store.community_counters(patient.id).unwrap();
        assert_eq!(counters.comments, 1);
    }
}
