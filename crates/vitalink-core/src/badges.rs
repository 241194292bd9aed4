//! Badge catalog and unlock rule engine.
//!
//! The catalog is static reference data; `evaluate` is a pure function
//! of the unlocked set and a statistics snapshot. Criteria carry typed
//! discriminators (no id parsing), and perspective badges state
//! explicitly whether they count perfect check-ins or all check-ins.

use serde::{Deserialize, Serialize};

use crate::patient::Perspective;
use crate::stats::StatsSnapshot;

/// Which community counter a community badge reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunityKind {
    Comment,
    Reaction,
}

impl CommunityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommunityKind::Comment => "comment",
            CommunityKind::Reaction => "reaction",
        }
    }
}

/// Hardcoded special-criteria badges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialKind {
    /// At least four completed weeks where every perspective met its goal.
    PerfectFourWeeks,
    /// Latest recorded weight at or below the protocol target.
    WeightGoalReached,
}

/// Unlock criteria for a badge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BadgeCriteria {
    Streak { days: u32 },
    Points { total: u32 },
    Level { level: u32 },
    Perspective {
        key: Perspective,
        checkins: u32,
        /// When set, compare against perfect check-ins instead of the
        /// raw count. Per-badge, not a generic rule.
        perfect: bool,
    },
    Community { kind: CommunityKind, count: u32 },
    Special { kind: SpecialKind },
}

/// A badge in the static catalog.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BadgeDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub criteria: BadgeCriteria,
}

/// Static badge catalog. Read-only reference data.
pub const CATALOG: &[BadgeDefinition] = &[
    BadgeDefinition {
        id: "streak_7",
        name: "One Week Strong",
        criteria: BadgeCriteria::Streak { days: 7 },
    },
    BadgeDefinition {
        id: "streak_30",
        name: "Monthly Momentum",
        criteria: BadgeCriteria::Streak { days: 30 },
    },
    BadgeDefinition {
        id: "streak_60",
        name: "Habit Locked In",
        criteria: BadgeCriteria::Streak { days: 60 },
    },
    BadgeDefinition {
        id: "points_500",
        name: "Point Collector",
        criteria: BadgeCriteria::Points { total: 500 },
    },
    BadgeDefinition {
        id: "points_1000",
        name: "Point Hoarder",
        criteria: BadgeCriteria::Points { total: 1000 },
    },
    BadgeDefinition {
        id: "points_5000",
        name: "Point Legend",
        criteria: BadgeCriteria::Points { total: 5000 },
    },
    BadgeDefinition {
        id: "level_3",
        name: "Silver Tier",
        criteria: BadgeCriteria::Level { level: 3 },
    },
    BadgeDefinition {
        id: "level_5",
        name: "Platinum Tier",
        criteria: BadgeCriteria::Level { level: 5 },
    },
    BadgeDefinition {
        id: "nutrition_10",
        name: "Mindful Eater",
        criteria: BadgeCriteria::Perspective {
            key: Perspective::Nutrition,
            checkins: 10,
            perfect: false,
        },
    },
    BadgeDefinition {
        id: "nutrition_perfect_20",
        name: "Clean Plate Club",
        criteria: BadgeCriteria::Perspective {
            key: Perspective::Nutrition,
            checkins: 20,
            perfect: true,
        },
    },
    BadgeDefinition {
        id: "hydration_10",
        name: "Well Watered",
        criteria: BadgeCriteria::Perspective {
            key: Perspective::Hydration,
            checkins: 10,
            perfect: false,
        },
    },
    BadgeDefinition {
        id: "movement_10",
        name: "Body in Motion",
        criteria: BadgeCriteria::Perspective {
            key: Perspective::Movement,
            checkins: 10,
            perfect: false,
        },
    },
    BadgeDefinition {
        id: "wellbeing_10",
        name: "Inner Balance",
        criteria: BadgeCriteria::Perspective {
            key: Perspective::Wellbeing,
            checkins: 10,
            perfect: false,
        },
    },
    BadgeDefinition {
        id: "community_comment_10",
        name: "Conversation Starter",
        criteria: BadgeCriteria::Community {
            kind: CommunityKind::Comment,
            count: 10,
        },
    },
    BadgeDefinition {
        id: "community_reaction_25",
        name: "Cheerleader",
        criteria: BadgeCriteria::Community {
            kind: CommunityKind::Reaction,
            count: 25,
        },
    },
    BadgeDefinition {
        id: "perfect_4_weeks",
        name: "Perfect Month",
        criteria: BadgeCriteria::Special {
            kind: SpecialKind::PerfectFourWeeks,
        },
    },
    BadgeDefinition {
        id: "weight_goal_reached",
        name: "Goal Weight",
        criteria: BadgeCriteria::Special {
            kind: SpecialKind::WeightGoalReached,
        },
    },
];

/// Look up a badge definition by id.
pub fn badge_by_id(id: &str) -> Option<&'static BadgeDefinition> {
    CATALOG.iter().find(|b| b.id == id)
}

/// Whether one criteria is satisfied by a snapshot.
fn criteria_met(criteria: &BadgeCriteria, stats: &StatsSnapshot) -> bool {
    match criteria {
        BadgeCriteria::Streak { days } => stats.streak.current >= *days,
        BadgeCriteria::Points { total } => stats.points.total >= *total,
        BadgeCriteria::Level { level } => stats.level.current >= *level,
        BadgeCriteria::Perspective {
            key,
            checkins,
            perfect,
        } => {
            let p = stats.perspectives.get(key).copied().unwrap_or_default();
            let have = if *perfect { p.perfect_checkins } else { p.checkins };
            have >= *checkins
        }
        BadgeCriteria::Community { kind, count } => {
            let have = match kind {
                CommunityKind::Comment => stats.community.comments,
                CommunityKind::Reaction => stats.community.reactions,
            };
            have >= *count
        }
        BadgeCriteria::Special { kind } => match kind {
            SpecialKind::PerfectFourWeeks => stats.perfect_weeks >= 4,
            SpecialKind::WeightGoalReached => match (stats.latest_weight, stats.weight_target) {
                (Some(weight), Some(target)) => weight <= target,
                _ => false,
            },
        },
    }
}

/// Evaluate the catalog against a snapshot. Pure: skips ids already in
/// `unlocked` and returns every newly qualifying badge id in one pass.
pub fn evaluate(unlocked: &[String], stats: &StatsSnapshot) -> Vec<String> {
    CATALOG
        .iter()
        .filter(|badge| !unlocked.iter().any(|u| u == badge.id))
        .filter(|badge| criteria_met(&badge.criteria, stats))
        .map(|badge| badge.id.to_string())
        .collect()
}

/// Progress toward a criteria as `(current, required)`. Special
/// criteria report 0/1 or 1/1.
pub fn criteria_progress(criteria: &BadgeCriteria, stats: &StatsSnapshot) -> (u32, u32) {
    match criteria {
        BadgeCriteria::Streak { days } => (stats.streak.current.min(*days), *days),
        BadgeCriteria::Points { total } => (stats.points.total.min(*total), *total),
        BadgeCriteria::Level { level } => (stats.level.current.min(*level), *level),
        BadgeCriteria::Perspective {
            key,
            checkins,
            perfect,
        } => {
            let p = stats.perspectives.get(key).copied().unwrap_or_default();
            let have = if *perfect { p.perfect_checkins } else { p.checkins };
            (have.min(*checkins), *checkins)
        }
        BadgeCriteria::Community { kind, count } => {
            let have = match kind {
                CommunityKind::Comment => stats.community.comments,
                CommunityKind::Reaction => stats.community.reactions,
            };
            (have.min(*count), *count)
        }
        BadgeCriteria::Special { kind } => {
            let met = criteria_met(&BadgeCriteria::Special { kind: *kind }, stats);
            (met as u32, 1)
        }
    }
}
