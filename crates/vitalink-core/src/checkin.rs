//! Daily check-in state machine.
//!
//! One check-in per patient per calendar day, for premium tiers only.
//! The ordered step list is computed once at start from the plan tier
//! and the protocol's weigh-day, so the machine's alphabet is fixed
//! per instance. Invalid replies never advance the step -- the caller
//! re-prompts and the persisted step stays put.

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::patient::{Perspective, PlanTier};

/// Ordered steps of the daily check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckinStep {
    Hydration,
    MealBreakfast,
    MealLunch,
    MealDinner,
    Snacks,
    Activity,
    Wellbeing,
    Weight,
    Complete,
}

impl CheckinStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckinStep::Hydration => "hydration",
            CheckinStep::MealBreakfast => "meal_breakfast",
            CheckinStep::MealLunch => "meal_lunch",
            CheckinStep::MealDinner => "meal_dinner",
            CheckinStep::Snacks => "snacks",
            CheckinStep::Activity => "activity",
            CheckinStep::Wellbeing => "wellbeing",
            CheckinStep::Weight => "weight",
            CheckinStep::Complete => "complete",
        }
    }

    /// The question sent to the patient for this step.
    pub fn prompt(&self) -> &'static str {
        match self {
            CheckinStep::Hydration => {
                "How much water did you drink today?\nA) 2L or more\nB) 1-2L\nC) Less than 1L"
            }
            CheckinStep::MealBreakfast => {
                "How was breakfast?\nA) Followed the plan\nB) Mostly on plan\nC) Off plan"
            }
            CheckinStep::MealLunch => {
                "How was lunch?\nA) Followed the plan\nB) Mostly on plan\nC) Off plan"
            }
            CheckinStep::MealDinner => {
                "How was dinner?\nA) Followed the plan\nB) Mostly on plan\nC) Off plan"
            }
            CheckinStep::Snacks => {
                "Any snacks between meals?\nA) None or planned only\nB) One unplanned\nC) Several unplanned"
            }
            CheckinStep::Activity => {
                "Did you move your body today?\nA) Full workout\nB) Light activity\nC) Rest day"
            }
            CheckinStep::Wellbeing => "How are you feeling today, from 1 (low) to 5 (great)?",
            CheckinStep::Weight => "It's weigh-in day! What's your weight this morning (kg)?",
            CheckinStep::Complete => "All done for today. Great work!",
        }
    }

    /// Error-qualified re-prompt for an invalid reply.
    pub fn reprompt(&self) -> String {
        format!(
            "Sorry, I didn't catch that. {}",
            self.prompt()
        )
    }
}

/// A letter-choice answer. A scores highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
    A,
    B,
    C,
}

impl Choice {
    pub fn points(&self) -> u32 {
        match self {
            Choice::A => 10,
            Choice::B => 5,
            Choice::C => 2,
        }
    }

    /// Parse a patient reply into a choice. Accepts a bare letter with
    /// optional punctuation ("a", "B)", "c."), nothing looser.
    pub fn parse(reply: &str) -> Option<Choice> {
        let cleaned: String = reply
            .trim()
            .trim_end_matches([')', '.', ':'])
            .to_lowercase();
        match cleaned.as_str() {
            "a" => Some(Choice::A),
            "b" => Some(Choice::B),
            "c" => Some(Choice::C),
            _ => None,
        }
    }
}

/// Points for a valid wellbeing rating.
pub const WELLBEING_POINTS: u32 = 5;
/// Points for a recorded weight entry.
pub const WEIGHT_POINTS: u32 = 10;
/// Accepted weight range in kilograms.
pub const WEIGHT_RANGE_KG: (f64, f64) = (20.0, 400.0);

/// Accumulated answers for one check-in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckinAnswers {
    pub hydration: Option<Choice>,
    pub breakfast: Option<Choice>,
    pub lunch: Option<Choice>,
    pub dinner: Option<Choice>,
    pub snacks: Option<Choice>,
    pub activity: Option<Choice>,
    /// 1..=5 self-reported rating.
    pub wellbeing: Option<u8>,
    pub weight_kg: Option<f64>,
}

impl CheckinAnswers {
    /// All letter answers present so far are "A".
    pub fn is_perfect(&self) -> bool {
        let letters = [
            self.hydration,
            self.breakfast,
            self.lunch,
            self.dinner,
            self.snacks,
            self.activity,
        ];
        let answered: Vec<Choice> = letters.into_iter().flatten().collect();
        !answered.is_empty() && answered.iter().all(|c| *c == Choice::A)
    }
}

/// Compute the ordered step list for a check-in started `today`.
///
/// Snacks tracking is a VIP extra; the weight step appears only on the
/// protocol's designated weigh-day. The list always ends in
/// `Complete`.
pub fn step_sequence(plan: PlanTier, weigh_day: Weekday, today: NaiveDate) -> Vec<CheckinStep> {
    use chrono::Datelike;

    let mut steps = vec![
        CheckinStep::Hydration,
        CheckinStep::MealBreakfast,
        CheckinStep::MealLunch,
        CheckinStep::MealDinner,
    ];
    if plan == PlanTier::Vip {
        steps.push(CheckinStep::Snacks);
    }
    steps.push(CheckinStep::Activity);
    steps.push(CheckinStep::Wellbeing);
    if today.weekday() == weigh_day {
        steps.push(CheckinStep::Weight);
    }
    steps.push(CheckinStep::Complete);
    steps
}

/// Per-perspective point deltas produced by a completed check-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinScore {
    pub total_points: u32,
    /// One delta per answered perspective category.
    pub perspective_deltas: Vec<(Perspective, u32)>,
    /// Every letter answer was "A".
    pub perfect: bool,
}

/// One patient's check-in for one calendar day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinState {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub step: CheckinStep,
    /// Fixed alphabet for this instance, computed at start.
    pub sequence: Vec<CheckinStep>,
    pub data: CheckinAnswers,
    pub completed_at: Option<DateTime<Utc>>,
    pub points_earned: Option<u32>,
}

impl CheckinState {
    /// Create a check-in at the initial step.
    pub fn start(patient_id: Uuid, plan: PlanTier, weigh_day: Weekday, today: NaiveDate) -> Self {
        let sequence = step_sequence(plan, weigh_day, today);
        let step = sequence[0];
        Self {
            id: Uuid::new_v4(),
            patient_id,
            date: today,
            step,
            sequence,
            data: CheckinAnswers::default(),
            completed_at: None,
            points_earned: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.step == CheckinStep::Complete
    }

    /// Step following `step` in this instance's sequence.
    fn next_step(&self, step: CheckinStep) -> CheckinStep {
        self.sequence
            .iter()
            .position(|s| *s == step)
            .and_then(|i| self.sequence.get(i + 1))
            .copied()
            .unwrap_or(CheckinStep::Complete)
    }

    /// Validate `reply` against the current step and advance.
    ///
    /// On validation failure the state is untouched and the caller
    /// should send `step.reprompt()`. At most one step advances per
    /// valid reply.
    pub fn advance(&mut self, reply: &str) -> Result<CheckinStep, ValidationError> {
        let step = self.step;
        match step {
            CheckinStep::Hydration => self.data.hydration = Some(Self::parse_choice(step, reply)?),
            CheckinStep::MealBreakfast => {
                self.data.breakfast = Some(Self::parse_choice(step, reply)?)
            }
            CheckinStep::MealLunch => self.data.lunch = Some(Self::parse_choice(step, reply)?),
            CheckinStep::MealDinner => self.data.dinner = Some(Self::parse_choice(step, reply)?),
            CheckinStep::Snacks => self.data.snacks = Some(Self::parse_choice(step, reply)?),
            CheckinStep::Activity => self.data.activity = Some(Self::parse_choice(step, reply)?),
            CheckinStep::Wellbeing => self.data.wellbeing = Some(parse_rating(reply)?),
            CheckinStep::Weight => self.data.weight_kg = Some(parse_weight(reply)?),
            CheckinStep::Complete => {
                return Err(ValidationError::InvalidValue {
                    field: "step",
                    message: "check-in already complete".to_string(),
                })
            }
        }

        self.step = self.next_step(step);
        if self.step == CheckinStep::Complete {
            let score = self.score();
            self.points_earned = Some(score.total_points);
            self.completed_at = Some(Utc::now());
        }
        Ok(self.step)
    }

    fn parse_choice(step: CheckinStep, reply: &str) -> Result<Choice, ValidationError> {
        Choice::parse(reply).ok_or_else(|| ValidationError::InvalidAnswer {
            step: step.as_str().to_string(),
            reply: reply.to_string(),
            expected: "a letter A, B or C",
        })
    }

    /// Score the collected answers. Partial answer sheets grant
    /// partial perspective credit; stricter adherence scores higher.
    pub fn score(&self) -> CheckinScore {
        let mut deltas: Vec<(Perspective, u32)> = Vec::new();

        if let Some(c) = self.data.hydration {
            deltas.push((Perspective::Hydration, c.points()));
        }

        let nutrition: u32 = [self.data.breakfast, self.data.lunch, self.data.dinner, self.data.snacks]
            .into_iter()
            .flatten()
            .map(|c| c.points())
            .sum();
        if nutrition > 0 {
            deltas.push((Perspective::Nutrition, nutrition));
        }

        if let Some(c) = self.data.activity {
            deltas.push((Perspective::Movement, c.points()));
        }

        if self.data.wellbeing.is_some() {
            deltas.push((Perspective::Wellbeing, WELLBEING_POINTS));
        }

        let weight_points = if self.data.weight_kg.is_some() {
            WEIGHT_POINTS
        } else {
            0
        };

        let total_points = deltas.iter().map(|(_, p)| p).sum::<u32>() + weight_points;

        CheckinScore {
            total_points,
            perspective_deltas: deltas,
            perfect: self.data.is_perfect(),
        }
    }
}

/// Parse a 1..=5 wellbeing rating.
fn parse_rating(reply: &str) -> Result<u8, ValidationError> {
    let value: u8 = reply.trim().parse().map_err(|_| ValidationError::InvalidAnswer {
        step: CheckinStep::Wellbeing.as_str().to_string(),
        reply: reply.to_string(),
        expected: "a number from 1 to 5",
    })?;
    if !(1..=5).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field: "wellbeing",
            value: value as f64,
            min: 1.0,
            max: 5.0,
        });
    }
    Ok(value)
}

/// Parse a weight in kilograms. Accepts a decimal comma.
fn parse_weight(reply: &str) -> Result<f64, ValidationError> {
    let cleaned = reply.trim().trim_end_matches("kg").trim().replace(',', ".");
    let value: f64 = cleaned.parse().map_err(|_| ValidationError::InvalidAnswer {
        step: CheckinStep::Weight.as_str().to_string(),
        reply: reply.to_string(),
        expected: "a weight in kg, e.g. 82.5",
    })?;
    let (min, max) = WEIGHT_RANGE_KG;
    if !(min..=max).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field: "weight_kg",
            value,
            min,
            max,
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monday() -> NaiveDate {
        // 2026-08-24 is a Monday.
        NaiveDate::from_ymd_opt(2026, 8, 24).unwrap()
    }

    fn premium_checkin() -> CheckinState {
        // Weigh-day Friday, started Monday: no weight step.
        CheckinState::start(Uuid::new_v4(), PlanTier::Premium, Weekday::Fri, monday())
    }

    #[test]
    fn test_premium_sequence_skips_snacks() {
        let seq = step_sequence(PlanTier::Premium, Weekday::Fri, monday());
        assert!(!seq.contains(&CheckinStep::Snacks));
        assert!(!seq.contains(&CheckinStep::Weight));
        assert_eq!(*seq.last().unwrap(), CheckinStep::Complete);
    }

    #[test]
    fn test_vip_sequence_includes_snacks() {
        let seq = step_sequence(PlanTier::Vip, Weekday::Fri, monday());
        assert!(seq.contains(&CheckinStep::Snacks));
    }

    #[test]
    fn test_weigh_day_adds_weight_step() {
        let seq = step_sequence(PlanTier::Premium, Weekday::Mon, monday());
        assert!(seq.contains(&CheckinStep::Weight));
        // Weight sits between wellbeing and complete.
        let widx = seq.iter().position(|s| *s == CheckinStep::Weight).unwrap();
        assert_eq!(seq[widx - 1], CheckinStep::Wellbeing);
        assert_eq!(seq[widx + 1], CheckinStep::Complete);
    }

    #[test]
    fn test_invalid_reply_does_not_advance() {
        // Scenario C: unparseable reply at hydration.
        let mut checkin = premium_checkin();
        assert_eq!(checkin.step, CheckinStep::Hydration);
        let err = checkin.advance("talvez");
        assert!(err.is_err());
        assert_eq!(checkin.step, CheckinStep::Hydration);
        assert!(checkin.points_earned.is_none());
    }

    #[test]
    fn test_valid_replies_walk_the_sequence() {
        let mut checkin = premium_checkin();
        assert_eq!(checkin.advance("A").unwrap(), CheckinStep::MealBreakfast);
        assert_eq!(checkin.advance("b").unwrap(), CheckinStep::MealLunch);
        assert_eq!(checkin.advance("A)").unwrap(), CheckinStep::MealDinner);
        assert_eq!(checkin.advance("c").unwrap(), CheckinStep::Activity);
        assert_eq!(checkin.advance("a").unwrap(), CheckinStep::Wellbeing);
        assert_eq!(checkin.advance("4").unwrap(), CheckinStep::Complete);
        assert!(checkin.is_complete());
        assert!(checkin.completed_at.is_some());
        // 10 + 5 + 10 + 2 (letters) + 10 (activity A) + 5 (wellbeing)
        assert_eq!(checkin.points_earned, Some(42));
    }

    #[test]
    fn test_step_only_moves_forward() {
        let mut checkin = premium_checkin();
        let mut seen = vec![checkin.step];
        for reply in ["A", "nope", "B", "B", "maybe", "C", "A", "9", "3"] {
            let _ = checkin.advance(reply);
            seen.push(checkin.step);
        }
        // Positions in the sequence never decrease.
        let pos = |s: CheckinStep| checkin.sequence.iter().position(|x| *x == s).unwrap();
        for pair in seen.windows(2) {
            assert!(pos(pair[1]) >= pos(pair[0]));
        }
    }

    #[test]
    fn test_advance_after_complete_is_rejected() {
        let mut checkin = premium_checkin();
        for reply in ["A", "A", "A", "A", "A", "5"] {
            checkin.advance(reply).unwrap();
        }
        assert!(checkin.is_complete());
        assert!(checkin.advance("A").is_err());
    }

    #[test]
    fn test_score_perspective_deltas() {
        let mut checkin = premium_checkin();
        for reply in ["A", "A", "B", "A", "B", "5"] {
            checkin.advance(reply).unwrap();
        }
        let score = checkin.score();
        let get = |p: Perspective| {
            score
                .perspective_deltas
                .iter()
                .find(|(k, _)| *k == p)
                .map(|(_, v)| *v)
        };
        assert_eq!(get(Perspective::Hydration), Some(10));
        assert_eq!(get(Perspective::Nutrition), Some(25)); // A + B + A
        assert_eq!(get(Perspective::Movement), Some(5));
        assert_eq!(get(Perspective::Wellbeing), Some(WELLBEING_POINTS));
        assert_eq!(get(Perspective::Discipline), None);
        assert!(!score.perfect);
    }

    #[test]
    fn test_all_a_is_perfect() {
        let mut checkin = premium_checkin();
        for reply in ["A", "A", "A", "A", "A", "5"] {
            checkin.advance(reply).unwrap();
        }
        assert!(checkin.score().perfect);
    }

    #[test]
    fn test_weight_parsing() {
        let mut checkin =
            CheckinState::start(Uuid::new_v4(), PlanTier::Premium, Weekday::Mon, monday());
        for reply in ["A", "A", "A", "A", "A", "5"] {
            checkin.advance(reply).unwrap();
        }
        assert_eq!(checkin.step, CheckinStep::Weight);
        // Decimal comma accepted; nonsense rejected.
        assert!(checkin.advance("heavy").is_err());
        assert_eq!(checkin.step, CheckinStep::Weight);
        assert!(checkin.advance("1000").is_err());
        checkin.advance("82,5").unwrap();
        assert_eq!(checkin.data.weight_kg, Some(82.5));
        assert!(checkin.is_complete());
    }

    #[test]
    fn test_partial_completion_partial_credit() {
        let mut checkin = premium_checkin();
        checkin.advance("A").unwrap(); // hydration only
        let score = checkin.score();
        assert_eq!(score.perspective_deltas.len(), 1);
        assert_eq!(score.total_points, 10);
    }
}
