//! Message intent routing policy.
//!
//! The semantic work lives in the external classifier; this module
//! owns only the precedence and dispatch rules. Classification
//! failures fail open into `question` so the patient always gets a
//! conversational reply rather than silence.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::services::{Classification, ClassifyContext, Intent, NlpService};

/// Confidence assigned when the classifier is unavailable.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Canned acknowledgment for social messages. Sent without touching
/// the conversational model.
pub const SOCIAL_ACK: &str = "Thanks for the message! I'm here whenever you need me. 💙";

/// Canned first reply for an emergency escalation.
pub const EMERGENCY_REPLY: &str =
    "I've alerted our care team and someone will contact you right away. \
     If this is a medical emergency, please call your local emergency number now.";

/// Where a classified message gets dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteAction {
    /// Alert staff and send the emergency acknowledgment.
    Escalate,
    /// Send the canned social acknowledgment; skip the AI entirely.
    SocialAck,
    /// Feed the reply to the active check-in state machine.
    AdvanceCheckin,
    /// General conversation handling.
    Converse,
}

/// Classify with the fail-open default.
///
/// A classifier outage must not silence the patient: the message is
/// routed as a `question` at the fallback confidence, with the reason
/// logged.
pub fn classify_with_fallback(
    nlp: &dyn NlpService,
    text: &str,
    context: &ClassifyContext,
) -> Classification {
    match nlp.classify(text, context) {
        Ok(classification) => classification,
        Err(e) => {
            warn!(error = %e, "classifier unavailable; defaulting to question intent");
            Classification {
                intent: Intent::Question,
                confidence: FALLBACK_CONFIDENCE,
                reason: format!("classifier unavailable: {e}"),
            }
        }
    }
}

/// Apply the precedence policy to a classified message.
///
/// Emergencies escalate even mid-check-in; social messages
/// short-circuit; a check-in response only counts while a check-in is
/// actually active, otherwise it is treated as a question.
pub fn route(classification: &Classification, has_active_checkin: bool) -> RouteAction {
    match classification.intent {
        Intent::Emergency => RouteAction::Escalate,
        Intent::Social => RouteAction::SocialAck,
        Intent::CheckinResponse if has_active_checkin => RouteAction::AdvanceCheckin,
        Intent::CheckinResponse | Intent::Question | Intent::OffTopic => RouteAction::Converse,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    struct FailingNlp;

    impl NlpService for FailingNlp {
        fn classify(
            &self,
            _text: &str,
            _context: &ClassifyContext,
        ) -> Result<Classification, EngineError> {
            Err(EngineError::Downstream {
                service: "nlp",
                message: "connection refused".to_string(),
            })
        }

        fn generate_reply(&self, _text: &str, _name: &str) -> Result<String, EngineError> {
            Err(EngineError::Downstream {
                service: "nlp",
                message: "connection refused".to_string(),
            })
        }
    }

    fn classified(intent: Intent) -> Classification {
        Classification {
            intent,
            confidence: 0.9,
            reason: "test".to_string(),
        }
    }

    #[test]
    fn test_classifier_failure_fails_open() {
        let classification =
            classify_with_fallback(&FailingNlp, "any text", &ClassifyContext::default());
        assert_eq!(classification.intent, Intent::Question);
        assert_eq!(classification.confidence, FALLBACK_CONFIDENCE);
        assert!(classification.reason.contains("unavailable"));
    }

    #[test]
    fn test_emergency_beats_active_checkin() {
        assert_eq!(route(&classified(Intent::Emergency), true), RouteAction::Escalate);
        assert_eq!(route(&classified(Intent::Emergency), false), RouteAction::Escalate);
    }

    #[test]
    fn test_social_short_circuits() {
        assert_eq!(route(&classified(Intent::Social), true), RouteAction::SocialAck);
    }

    #[test]
    fn test_checkin_response_requires_active_checkin() {
        assert_eq!(
            route(&classified(Intent::CheckinResponse), true),
            RouteAction::AdvanceCheckin
        );
        // No active check-in: treated as a question.
        assert_eq!(
            route(&classified(Intent::CheckinResponse), false),
            RouteAction::Converse
        );
    }

    #[test]
    fn test_everything_else_converses() {
        assert_eq!(route(&classified(Intent::Question), false), RouteAction::Converse);
        assert_eq!(route(&classified(Intent::OffTopic), true), RouteAction::Converse);
    }
}
