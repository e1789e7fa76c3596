//! Tracked activities, weekly winner metrics and rank tiers.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Bound applied to activities the catalog does not know about.
pub const DEFAULT_SCORE_BOUND: f64 = 200_000.0;

/// One tracked daily activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Activity {
    pub id: String,
    pub label: String,
    pub unit: String,
    /// Value that counts as 100% for a single day.
    pub daily_target: f64,
    /// Value that counts as 100% for a whole week.
    pub week_target: f64,
    /// Largest accepted single-day value.
    pub max: f64,
}

impl Activity {
    fn new(id: &str, label: &str, unit: &str, daily_target: f64, week_target: f64, max: f64) -> Self {
        Self {
            id: id.to_owned(),
            label: label.to_owned(),
            unit: unit.to_owned(),
            daily_target,
            week_target,
            max,
        }
    }
}

/// Metric used to pick weekly winners; any candidate activity feeds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WinnerMetric {
    pub id: String,
    pub label: String,
    /// Activity ids summed into this metric, in preference order.
    pub candidate_ids: Vec<String>,
}

impl WinnerMetric {
    fn new(id: &str, label: &str, candidates: &[&str]) -> Self {
        Self {
            id: id.to_owned(),
            label: label.to_owned(),
            candidate_ids: candidates.iter().map(|id| (*id).to_owned()).collect(),
        }
    }

    pub fn tracks(&self, activity: &str) -> bool {
        self.candidate_ids.iter().any(|candidate| candidate == activity)
    }
}

/// Activities and winner metrics the tracker scores against.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityCatalog {
    activities: Vec<Activity>,
    winner_metrics: Vec<WinnerMetric>,
}

impl ActivityCatalog {
    pub fn new(activities: Vec<Activity>, winner_metrics: Vec<WinnerMetric>) -> Self {
        Self {
            activities,
            winner_metrics,
        }
    }

    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    pub fn winner_metrics(&self) -> &[WinnerMetric] {
        &self.winner_metrics
    }

    pub fn get(&self, id: &str) -> Option<&Activity> {
        self.activities.iter().find(|activity| activity.id == id)
    }

    /// Upper bound for a single score of `activity`.
    pub fn bound(&self, activity: &str) -> f64 {
        self.get(activity)
            .map_or(DEFAULT_SCORE_BOUND, |activity| activity.max)
    }
}

impl Default for ActivityCatalog {
    fn default() -> Self {
        Self {
            activities: vec![
                Activity::new("steps", "STEPS", "steps", 10_000.0, 70_000.0, 200_000.0),
                Activity::new("workouts", "WORKOUTS", "sessions", 1.0, 5.0, 100.0),
                Activity::new("sleep", "SLEEP", "hours", 8.0, 56.0, 24.0),
                Activity::new("hydration", "WATER", "liters", 3.0, 21.0, 30.0),
                Activity::new("streak", "STREAK", "days", 1.0, 7.0, 7.0),
            ],
            winner_metrics: vec![
                WinnerMetric::new("weight", "WEIGHT", &["weight", "steps"]),
                WinnerMetric::new(
                    "exerciseQuantity",
                    "EXERCISE QUANTITY",
                    &["exerciseQuantity", "exercise", "workouts"],
                ),
            ],
        }
    }
}

/// Display band reached by a composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankTier {
    pub name: &'static str,
    pub abbr: &'static str,
    /// Lowest composite score that earns this tier.
    pub min: u32,
}

const fn tier(name: &'static str, abbr: &'static str, min: u32) -> RankTier {
    RankTier { name, abbr, min }
}

/// Tiers in ascending order of their threshold.
pub const RANK_TIERS: [RankTier; 18] = [
    tier("SILVER I", "S1", 0),
    tier("SILVER II", "S2", 10),
    tier("SILVER III", "S3", 20),
    tier("SILVER IV", "S4", 30),
    tier("SILVER ELITE", "SE", 40),
    tier("SILVER ELITE M", "SEM", 50),
    tier("GOLD NOVA I", "GN1", 55),
    tier("GOLD NOVA II", "GN2", 60),
    tier("GOLD NOVA III", "GN3", 65),
    tier("GOLD NOVA MASTER", "GNM", 70),
    tier("MASTER GUARDIAN", "MG1", 75),
    tier("MASTER GUARDIAN II", "MG2", 80),
    tier("MG ELITE", "MGE", 85),
    tier("DMG", "DMG", 88),
    tier("LEGENDARY EAGLE", "LE", 91),
    tier("LEGENDARY EAGLE M", "LEM", 94),
    tier("SUPREME", "SMFC", 97),
    tier("GLOBAL ELITE", "GE", 99),
];

/// Highest tier whose threshold `score` reaches.
pub fn rank_for(score: u32) -> RankTier {
    RANK_TIERS
        .iter()
        .rev()
        .find(|tier| score >= tier.min)
        .copied()
        .unwrap_or(RANK_TIERS[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_activities_use_the_default_bound() {
        let catalog = ActivityCatalog::default();
        assert_eq!(catalog.bound("sleep"), 24.0);
        assert_eq!(catalog.bound("streak"), 7.0);
        assert_eq!(catalog.bound("yoga"), DEFAULT_SCORE_BOUND);
    }

    #[test]
    fn rank_thresholds_are_inclusive() {
        assert_eq!(rank_for(0).abbr, "S1");
        assert_eq!(rank_for(54).abbr, "SEM");
        assert_eq!(rank_for(55).abbr, "GN1");
        assert_eq!(rank_for(100).abbr, "GE");
    }
}
