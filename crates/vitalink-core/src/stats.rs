//! Flat statistics snapshot over patient history.
//!
//! The aggregator reads the store (check-in history, community events,
//! weekly history, weight entries) plus the embedded gamification
//! state and produces the snapshot the badge rule engine evaluates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::patient::{Patient, Perspective};
use crate::storage::Store;

/// Streak figures in a snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StreakStats {
    pub current: u32,
    pub longest: u32,
}

/// Point figures in a snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PointStats {
    pub total: u32,
}

/// Level figures in a snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LevelStats {
    pub current: u32,
}

/// Per-perspective check-in counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PerspectiveStats {
    /// Check-ins that credited this perspective at all.
    pub checkins: u32,
    /// Check-ins that credited this perspective with a perfect
    /// (all-"A") answer sheet.
    pub perfect_checkins: u32,
}

/// Community activity counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CommunityStats {
    pub comments: u32,
    pub reactions: u32,
}

/// Flat statistics snapshot consumed by the badge rule engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub streak: StreakStats,
    pub points: PointStats,
    pub level: LevelStats,
    pub perspectives: BTreeMap<Perspective, PerspectiveStats>,
    pub community: CommunityStats,
    /// Completed weeks in which every perspective met its goal.
    pub perfect_weeks: u32,
    /// Most recent recorded weight, if any.
    pub latest_weight: Option<f64>,
    /// Protocol weight target, if assigned.
    pub weight_target: Option<f64>,
}

/// Builds a [`StatsSnapshot`] for one patient from the store.
pub struct StatsAggregator<'a> {
    store: &'a Store,
}

impl<'a> StatsAggregator<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Aggregate the patient's history into a flat snapshot.
    pub fn snapshot(&self, patient: &Patient) -> Result<StatsSnapshot> {
        let g = &patient.gamification;

        let perspectives = self.store.perspective_counters(patient.id)?;
        let community = self.store.community_counters(patient.id)?;
        let perfect_weeks = self.store.perfect_week_count(patient.id)?;
        let latest_weight = self.store.latest_weight(patient.id)?;
        let weight_target = self
            .store
            .active_protocol_assignment(patient.id)?
            .and_then(|a| a.weight_target);

        Ok(StatsSnapshot {
            streak: StreakStats {
                current: g.streak.current_streak,
                longest: g.streak.longest_streak,
            },
            points: PointStats {
                total: g.total_points,
            },
            level: LevelStats { current: g.level },
            perspectives,
            community,
            perfect_weeks,
            latest_weight,
            weight_target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patient::PlanTier;
    use chrono::NaiveDate;

    #[test]
    fn snapshot_reflects_gamification_state() {
        let store = Store::open_memory().unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        let mut patient = Patient::new("+5511999990000", "Ana", PlanTier::Premium, today);
        patient.gamification.total_points = 420;
        patient.gamification.level = 3;
        patient.gamification.streak.current_streak = 9;
        patient.gamification.streak.longest_streak = 12;
        store.insert_patient(&patient).unwrap();

        let snapshot = StatsAggregator::new(&store).snapshot(&patient).unwrap();
        assert_eq!(snapshot.points.total, 420);
        assert_eq!(snapshot.level.current, 3);
        assert_eq!(snapshot.streak.current, 9);
        assert_eq!(snapshot.streak.longest, 12);
        assert_eq!(snapshot.perfect_weeks, 0);
        assert!(snapshot.latest_weight.is_none());
    }

    #[test]
    fn snapshot_counts_community_events() {
        let store = Store::open_memory().unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        let patient = Patient::new("+5511999990001", "Bruno", PlanTier::Premium, today);
        store.insert_patient(&patient).unwrap();

        store.record_community_event(patient.id, crate::badges::CommunityKind::Comment).unwrap();
        store.record_community_event(patient.id, crate::badges::CommunityKind::Comment).unwrap();
        store.record_community_event(patient.id, crate::badges::CommunityKind::Reaction).unwrap();

        let snapshot = StatsAggregator::new(&store).snapshot(&patient).unwrap();
        assert_eq!(snapshot.community.comments, 2);
        assert_eq!(snapshot.community.reactions, 1);
    }
}
