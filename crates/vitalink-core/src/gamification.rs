//! Gamification ledger.
//!
//! `apply_action` is the single write path for points: it updates the
//! streak, adds the point delta, advances weekly perspective progress
//! (with a one-shot completion bonus), recomputes the level, and runs
//! the badge rule engine against a fresh stats snapshot. Weekly
//! progress resets lazily on the first action that touches a stale
//! week; the finished week is snapshotted into history first.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::badges;
use crate::error::{EngineError, Result};
use crate::message::{MessageSource, ScheduledMessage};
use crate::patient::{level_for_points, level_name, week_start, Perspective, WeeklyProgress};
use crate::stats::StatsAggregator;
use crate::storage::Store;
use crate::streak::{self, StreakOutcome, StreakUpdate};

/// Bonus awarded the first time a perspective's weekly goal is met.
pub const WEEKLY_GOAL_BONUS: u32 = 50;

/// Outcome of one ledger action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    /// Total points credited by this action, bonuses included.
    pub points_earned: u32,
    /// Level name when the action caused a level-up.
    pub new_level: Option<String>,
    pub leveled_up: bool,
    pub weekly_goal_completed: bool,
    /// Badge ids newly unlocked by this action.
    pub new_badges: Vec<String>,
    pub streak: StreakUpdate,
}

/// Applies engagement actions to a patient's gamification state.
pub struct GamificationLedger<'a> {
    store: &'a Store,
}

impl<'a> GamificationLedger<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Credit `points` to `perspective` for activity on `today`.
    pub fn apply_action(
        &self,
        patient_id: Uuid,
        perspective: Perspective,
        points: u32,
        today: NaiveDate,
    ) -> Result<ActionResult> {
        let mut patient = self
            .store
            .patient_by_id(patient_id)?
            .ok_or_else(|| EngineError::NotFound {
                entity: "patient",
                key: patient_id.to_string(),
            })?;

        // Streak first: it is idempotent for same-day repeats, so a
        // check-in that credits four perspectives only advances once.
        let streak_update = streak::update_streak(&patient.gamification.streak, today);
        streak_update.apply_to(&mut patient.gamification.streak, today);
        if streak_update.outcome == StreakOutcome::Frozen {
            info!(
                patient = %patient_id,
                freezes_left = streak_update.streak_freezes,
                "streak freeze consumed"
            );
        }

        // Lazy weekly rollover.
        self.rollover_week_if_stale(&mut patient, today)?;

        let old_level = patient.gamification.level;

        let mut earned = points + streak_update.bonus_points;
        patient.gamification.total_points += earned;

        // Weekly perspective progress with a one-shot completion bonus.
        let mut weekly_goal_completed = false;
        if let Some(goal) = patient.gamification.weekly.goals.get_mut(&perspective) {
            goal.current += points;
            if !goal.is_complete && goal.current >= goal.goal {
                goal.is_complete = true;
                weekly_goal_completed = true;
            }
        }
        if weekly_goal_completed {
            patient.gamification.total_points += WEEKLY_GOAL_BONUS;
            earned += WEEKLY_GOAL_BONUS;
        }

        // Level recompute from the new total.
        let new_level = level_for_points(patient.gamification.total_points);
        patient.gamification.level = new_level;
        let leveled_up = new_level > old_level;

        self.store.update_patient(&patient)?;

        // Badge pass over a fresh snapshot; union into the badge set.
        let snapshot = StatsAggregator::new(self.store).snapshot(&patient)?;
        let new_badges = badges::evaluate(&patient.gamification.badges, &snapshot);
        if !new_badges.is_empty() {
            for badge_id in &new_badges {
                if !patient.gamification.has_badge(badge_id) {
                    patient.gamification.badges.push(badge_id.clone());
                }
            }
            self.store.update_patient(&patient)?;
            self.schedule_badge_notifications(&patient.phone, patient_id, &new_badges)?;
        }

        if leveled_up {
            let name = level_name(new_level);
            self.store.insert_scheduled(&ScheduledMessage::new(
                patient_id,
                &patient.phone,
                &format!("Level up! You've reached {name}."),
                Utc::now(),
                MessageSource::Gamification,
            ))?;
        }

        Ok(ActionResult {
            success: true,
            points_earned: earned,
            new_level: leveled_up.then(|| level_name(new_level).to_string()),
            leveled_up,
            weekly_goal_completed,
            new_badges,
            streak: streak_update,
        })
    }

    /// Monthly maintenance invoked by an external scheduler: restore
    /// streak freezes to the maximum.
    pub fn reset_monthly_freezes(&self, patient_id: Uuid) -> Result<()> {
        let mut patient = self
            .store
            .patient_by_id(patient_id)?
            .ok_or_else(|| EngineError::NotFound {
                entity: "patient",
                key: patient_id.to_string(),
            })?;
        streak::reset_monthly_freezes(&mut patient.gamification.streak);
        self.store.update_patient(&patient)?;
        Ok(())
    }

    /// Reset weekly progress when `today` belongs to a newer week than
    /// the stored one, snapshotting the finished week first.
    fn rollover_week_if_stale(
        &self,
        patient: &mut crate::patient::Patient,
        today: NaiveDate,
    ) -> Result<()> {
        let current_week = week_start(today);
        let weekly = &patient.gamification.weekly;
        if weekly.week_start == current_week {
            return Ok(());
        }

        self.store
            .record_week(patient.id, weekly.week_start, weekly.is_perfect())?;

        let goals = weekly.goals.clone();
        let mut fresh = WeeklyProgress::for_week(today, 0);
        for (perspective, goal) in goals {
            if let Some(g) = fresh.goals.get_mut(&perspective) {
                g.goal = goal.goal;
            }
        }
        patient.gamification.weekly = fresh;
        Ok(())
    }

    fn schedule_badge_notifications(
        &self,
        phone: &str,
        patient_id: Uuid,
        badge_ids: &[String],
    ) -> Result<()> {
        for badge_id in badge_ids {
            let name = badges::badge_by_id(badge_id)
                .map(|b| b.name)
                .unwrap_or(badge_id.as_str());
            self.store.insert_scheduled(&ScheduledMessage::new(
                patient_id,
                phone,
                &format!("New badge unlocked: {name}!"),
                Utc::now(),
                MessageSource::Gamification,
            ))?;
        }
        Ok(())
    }
}
