//! Day-over-day streak ledger.
//!
//! Pure decision table over the calendar-day gap since the last
//! activity. Freezes absorb exactly one missed day; a larger gap or an
//! exhausted freeze pool resets the streak. Milestone bonuses are paid
//! only on the day the milestone is crossed, never retroactively.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::patient::{StreakState, MAX_STREAK_FREEZES};

/// Bonus points at fixed streak milestones (streak length, points).
pub const STREAK_MILESTONES: &[(u32, u32)] = &[(7, 100), (14, 250), (30, 500), (60, 1000)];

/// What the streak update decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakOutcome {
    /// Repeat activity on the same calendar day; no double increment.
    Unchanged,
    /// Consecutive day; streak grew by one.
    Incremented,
    /// One missed day absorbed by a freeze; streak preserved.
    Frozen,
    /// Streak broken; restarted at one.
    Reset,
}

/// Result of applying one day of activity to a streak.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreakUpdate {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub streak_freezes: u8,
    pub freezes_used_this_month: u8,
    /// Milestone bonus earned by this update, if any.
    pub bonus_points: u32,
    pub outcome: StreakOutcome,
}

impl StreakUpdate {
    /// Fold this update back into a streak state.
    pub fn apply_to(&self, state: &mut StreakState, today: NaiveDate) {
        state.current_streak = self.current_streak;
        state.longest_streak = self.longest_streak;
        state.streak_freezes = self.streak_freezes;
        state.freezes_used_this_month = self.freezes_used_this_month;
        state.last_activity_date = Some(today);
    }
}

/// Apply one day of qualifying activity to `state`.
///
/// Decision table over `days_since_last_activity`:
/// 0 -> unchanged, 1 -> incremented, 2 with a freeze -> frozen,
/// 2 without -> reset, >2 -> reset. First-ever activity starts a
/// streak of one.
pub fn update_streak(state: &StreakState, today: NaiveDate) -> StreakUpdate {
    let days_since = state
        .last_activity_date
        .map(|last| (today - last).num_days());

    let (current, freezes, used_this_month, outcome) = match days_since {
        // First-ever activity.
        None => (1, state.streak_freezes, state.freezes_used_this_month, StreakOutcome::Incremented),
        Some(0) => (
            state.current_streak,
            state.streak_freezes,
            state.freezes_used_this_month,
            StreakOutcome::Unchanged,
        ),
        Some(1) => (
            state.current_streak + 1,
            state.streak_freezes,
            state.freezes_used_this_month,
            StreakOutcome::Incremented,
        ),
        Some(2) if state.streak_freezes >= 1 => (
            state.current_streak,
            state.streak_freezes - 1,
            state.freezes_used_this_month + 1,
            StreakOutcome::Frozen,
        ),
        // Gap of two without a freeze, or anything longer.
        Some(_) => (
            1,
            state.streak_freezes,
            state.freezes_used_this_month,
            StreakOutcome::Reset,
        ),
    };

    let longest = state.longest_streak.max(current);

    // Milestone bonus only when the streak grew onto the milestone.
    let bonus_points = if outcome == StreakOutcome::Incremented {
        STREAK_MILESTONES
            .iter()
            .find(|(days, _)| *days == current)
            .map(|(_, points)| *points)
            .unwrap_or(0)
    } else {
        0
    };

    StreakUpdate {
        current_streak: current,
        longest_streak: longest,
        streak_freezes: freezes,
        freezes_used_this_month: used_this_month,
        bonus_points,
        outcome,
    }
}

/// Monthly reset invoked by an external scheduler: restore the freeze
/// pool to the maximum and zero the monthly counter.
pub fn reset_monthly_freezes(state: &mut StreakState) {
    state.streak_freezes = MAX_STREAK_FREEZES;
    state.freezes_used_this_month = 0;
}
