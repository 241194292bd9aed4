//! Read projections: the gamification summary, badge progress, and
//! check-in history views surfaced to staff and to the patient app.
//! Pure reads, no state transitions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::badges::{self, CATALOG};
use crate::error::{EngineError, Result};
use crate::patient::{level_name, PlanTier, WeeklyGoal, LEVELS};
use crate::stats::StatsAggregator;
use crate::storage::Store;

/// Snapshot of a patient's gamification standing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamificationSummary {
    pub display_name: String,
    pub plan: PlanTier,
    pub total_points: u32,
    pub level: u32,
    pub level_name: String,
    /// Points still needed for the next level, `None` at the top.
    pub points_to_next_level: Option<u32>,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub streak_freezes: u8,
    pub badge_count: usize,
    pub badges: Vec<String>,
    /// Per-perspective weekly goal progress, keyed by perspective name.
    pub weekly_goals: Vec<(String, WeeklyGoal)>,
    pub latest_weight: Option<f64>,
    pub weight_target: Option<f64>,
}

/// Progress toward one badge, locked or unlocked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeProgress {
    pub id: String,
    pub name: String,
    pub unlocked: bool,
    pub current: u32,
    pub target: u32,
}

/// One completed check-in in the history view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinHistoryEntry {
    pub date: NaiveDate,
    pub points: u32,
    pub perfect: bool,
}

pub struct SummaryService<'a> {
    store: &'a Store,
}

impl<'a> SummaryService<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    fn load(&self, patient_id: Uuid) -> Result<crate::patient::Patient> {
        self.store
            .patient_by_id(patient_id)?
            .ok_or_else(|| EngineError::NotFound {
                entity: "patient",
                key: patient_id.to_string(),
            })
    }

    pub fn gamification_summary(&self, patient_id: Uuid) -> Result<GamificationSummary> {
        let patient = self.load(patient_id)?;
        let g = &patient.gamification;

        let points_to_next_level = LEVELS
            .get(g.level as usize)
            .map(|(threshold, _)| threshold.saturating_sub(g.total_points));

        let weight_target = self
            .store
            .active_protocol_assignment(patient_id)?
            .and_then(|a| a.weight_target);

        Ok(GamificationSummary {
            display_name: patient.display_name.clone(),
            plan: patient.plan,
            total_points: g.total_points,
            level: g.level,
            level_name: level_name(g.level).to_string(),
            points_to_next_level,
            current_streak: g.streak.current_streak,
            longest_streak: g.streak.longest_streak,
            streak_freezes: g.streak.streak_freezes,
            badge_count: g.badges.len(),
            badges: g.badges.clone(),
            weekly_goals: g
                .weekly
                .goals
                .iter()
                .map(|(p, goal)| (p.as_str().to_string(), goal.clone()))
                .collect(),
            latest_weight: self.store.latest_weight(patient_id)?,
            weight_target,
        })
    }

    /// Progress toward every catalog badge, unlocked ones shown full.
    pub fn badge_progress(&self, patient_id: Uuid) -> Result<Vec<BadgeProgress>> {
        let patient = self.load(patient_id)?;
        let stats = StatsAggregator::new(self.store).snapshot(&patient)?;

        Ok(CATALOG
            .iter()
            .map(|badge| {
                let unlocked = patient.gamification.has_badge(badge.id);
                let (current, target) = badges::criteria_progress(&badge.criteria, &stats);
                BadgeProgress {
                    id: badge.id.to_string(),
                    name: badge.name.to_string(),
                    unlocked,
                    current: if unlocked { target } else { current },
                    target,
                }
            })
            .collect())
    }

    pub fn checkin_history(
        &self,
        patient_id: Uuid,
        limit: u32,
    ) -> Result<Vec<CheckinHistoryEntry>> {
        Ok(self
            .store
            .checkin_history(patient_id, limit)?
            .into_iter()
            .map(|(date, points, perfect)| CheckinHistoryEntry {
                date,
                points,
                perfect,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patient::{Patient, Perspective};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 24).unwrap()
    }

    fn seed(store: &Store, points: u32) -> Patient {
        let mut patient = Patient::new("+5511922220000", "Rafa", PlanTier::Vip, today());
        patient.gamification.total_points = points;
        patient.gamification.level = crate::patient::level_for_points(points);
        store.insert_patient(&patient).unwrap();
        patient
    }

    #[test]
    fn test_summary_reports_points_to_next_level() {
        let store = Store::open_memory().unwrap();
        let patient = seed(&store, 120);

        let summary = SummaryService::new(&store)
            .gamification_summary(patient.id)
            .unwrap();
        assert_eq!(summary.level, 2);
        assert_eq!(summary.level_name, "Bronze");
        // Silver opens at 300 points.
        assert_eq!(summary.points_to_next_level, Some(180));
    }

    #[test]
    fn test_top_level_has_no_next() {
        let store = Store::open_memory().unwrap();
        let patient = seed(&store, 5000);

        let summary = SummaryService::new(&store)
            .gamification_summary(patient.id)
            .unwrap();
        assert_eq!(summary.level_name, "Diamond");
        assert_eq!(summary.points_to_next_level, None);
    }

    #[test]
    fn test_badge_progress_counts_toward_locked_badges() {
        let store = Store::open_memory().unwrap();
        let mut patient = seed(&store, 0);
        patient.gamification.streak.current_streak = 4;
        store.update_patient(&patient).unwrap();

        let progress = SummaryService::new(&store).badge_progress(patient.id).unwrap();
        let streak_7 = progress.iter().find(|p| p.id == "streak_7").unwrap();
        assert!(!streak_7.unlocked);
        assert_eq!(streak_7.current, 4);
        assert_eq!(streak_7.target, 7);
    }

    #[test]
    fn test_unlocked_badge_shows_full_progress() {
        let store = Store::open_memory().unwrap();
        let mut patient = seed(&store, 0);
        patient.gamification.badges.push("streak_7".to_string());
        store.update_patient(&patient).unwrap();

        let progress = SummaryService::new(&store).badge_progress(patient.id).unwrap();
        let streak_7 = progress.iter().find(|p| p.id == "streak_7").unwrap();
        assert!(streak_7.unlocked);
        assert_eq!(streak_7.current, streak_7.target);
    }

    #[test]
    fn test_checkin_history_projection() {
        let store = Store::open_memory().unwrap();
        let patient = seed(&store, 0);
        store
            .insert_checkin_history(patient.id, today(), 42, true, &[Perspective::Nutrition])
            .unwrap();

        let history = SummaryService::new(&store)
            .checkin_history(patient.id, 10)
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].points, 42);
        assert!(history[0].perfect);
    }

    #[test]
    fn test_unknown_patient_is_not_found() {
        let store = Store::open_memory().unwrap();
        let err = SummaryService::new(&store)
            .gamification_summary(Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }
}
