//! DTOs for the derived scoreboard views.

use serde::{Deserialize, Serialize};
use time::Date;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    dao::models::format_date,
    dto::{local_today, validation::validate_date},
    state::aggregation::{
        ActivityStanding, DayOutcome, DayResult, HeadToHead, LeadEntry, MetricWinners, Mvp,
        PlayerStanding, WeeklyWinners,
    },
};

/// Which week to aggregate.
#[derive(Debug, Default, Deserialize, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct LeaderboardQuery {
    /// Weeks relative to the reference date (0 = current, -1 = previous).
    #[validate(range(min = -520, max = 52))]
    #[serde(default)]
    pub week_offset: Option<i64>,
    /// Reference date (`YYYY-MM-DD`); defaults to today.
    #[validate(custom(function = validate_date))]
    #[serde(default)]
    pub date: Option<String>,
}

impl LeaderboardQuery {
    /// Reference date, falling back to today for a missing or unparsable value.
    pub fn reference_date(&self) -> Date {
        self.date
            .as_deref()
            .and_then(crate::dao::models::parse_date)
            .unwrap_or_else(local_today)
    }

    pub fn offset(&self) -> i64 {
        self.week_offset.unwrap_or(0)
    }
}

/// One activity in a player's weekly standing.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActivityStandingDto {
    pub activity_id: String,
    pub total: f64,
    /// Share of the weekly target, capped at 100.
    pub percentage: u32,
}

impl From<ActivityStanding> for ActivityStandingDto {
    fn from(value: ActivityStanding) -> Self {
        Self {
            activity_id: value.activity_id,
            total: value.total,
            percentage: value.percentage,
        }
    }
}

/// A ranked player.
#[derive(Debug, Serialize, ToSchema)]
pub struct StandingDto {
    pub player: String,
    pub composite: u32,
    pub rank: String,
    pub rank_abbr: String,
    pub activities: Vec<ActivityStandingDto>,
}

impl From<PlayerStanding> for StandingDto {
    fn from(value: PlayerStanding) -> Self {
        Self {
            player: value.player,
            composite: value.composite,
            rank: value.tier.name.to_owned(),
            rank_abbr: value.tier.abbr.to_owned(),
            activities: value.activities.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MvpDto {
    pub player: String,
    pub activity_id: String,
    pub percentage: u32,
    pub total: f64,
}

impl From<Mvp> for MvpDto {
    fn from(value: Mvp) -> Self {
        Self {
            player: value.player,
            activity_id: value.activity_id,
            percentage: value.percentage,
            total: value.total,
        }
    }
}

/// A player strictly ahead of everyone else on one activity.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeadDto {
    pub activity_id: String,
    pub label: String,
    pub leader: String,
    pub runner_up: String,
    pub margin: f64,
}

impl From<LeadEntry> for LeadDto {
    fn from(value: LeadEntry) -> Self {
        Self {
            activity_id: value.activity_id,
            label: value.label,
            leader: value.leader,
            runner_up: value.runner_up,
            margin: value.margin,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HeadToHeadDto {
    pub rival: String,
    pub player_composite: u32,
    pub rival_composite: u32,
    pub winning: bool,
    pub activities_won: usize,
    pub activities_total: usize,
}

impl From<HeadToHead> for HeadToHeadDto {
    fn from(value: HeadToHead) -> Self {
        Self {
            rival: value.rival,
            player_composite: value.player_composite,
            rival_composite: value.rival_composite,
            winning: value.winning,
            activities_won: value.activities_won,
            activities_total: value.activities_total,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DayOutcomeDto {
    Upcoming,
    Win,
    Loss,
    Idle,
}

impl From<DayOutcome> for DayOutcomeDto {
    fn from(value: DayOutcome) -> Self {
        match value {
            DayOutcome::Upcoming => DayOutcomeDto::Upcoming,
            DayOutcome::Win => DayOutcomeDto::Win,
            DayOutcome::Loss => DayOutcomeDto::Loss,
            DayOutcome::Idle => DayOutcomeDto::Idle,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DayResultDto {
    pub date: String,
    pub average: f64,
    pub outcome: DayOutcomeDto,
}

impl From<DayResult> for DayResultDto {
    fn from(value: DayResult) -> Self {
        Self {
            date: format_date(value.date),
            average: value.average,
            outcome: value.outcome.into(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MetricWinnersDto {
    pub metric_id: String,
    pub label: String,
    /// Empty when nobody contributed a positive value.
    pub winners: Vec<String>,
    pub top_value: f64,
    pub source_id: Option<String>,
}

impl From<MetricWinners> for MetricWinnersDto {
    fn from(value: MetricWinners) -> Self {
        Self {
            metric_id: value.metric_id,
            label: value.label,
            winners: value.winners,
            top_value: value.top_value,
            source_id: value.source_id,
        }
    }
}

/// Winners of one Monday-aligned week.
#[derive(Debug, Serialize, ToSchema)]
pub struct WeeklyWinnersDto {
    pub week_start: String,
    pub week_end: String,
    pub metrics: Vec<MetricWinnersDto>,
}

impl From<WeeklyWinners> for WeeklyWinnersDto {
    fn from(value: WeeklyWinners) -> Self {
        let week_end = value.week_start.saturating_add(time::Duration::days(6));
        Self {
            week_start: format_date(value.week_start),
            week_end: format_date(week_end),
            metrics: value.metrics.into_iter().map(Into::into).collect(),
        }
    }
}

/// Everything the scoreboard shows for one week.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardResponse {
    /// The seven dates of the week, Monday first.
    pub dates: Vec<String>,
    pub standings: Vec<StandingDto>,
    pub mvp: Option<MvpDto>,
    pub lead_feed: Vec<LeadDto>,
    /// Present when the caller has claimed a profile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,
    /// The caller's profile against every rival.
    pub head_to_head: Vec<HeadToHeadDto>,
    /// The caller's day-by-day results.
    pub round_history: Vec<DayResultDto>,
    /// Winners of this week, if any entry was recorded.
    pub weekly_winners: Option<WeeklyWinnersDto>,
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    #[test]
    fn query_defaults_to_the_current_week() {
        let query = LeaderboardQuery::default();
        assert_eq!(query.offset(), 0);

        let pinned = LeaderboardQuery {
            week_offset: Some(-1),
            date: Some("2024-01-10".into()),
        };
        assert_eq!(pinned.reference_date(), date!(2024 - 01 - 10));
        assert!(pinned.validate().is_ok());

        let out_of_range = LeaderboardQuery {
            week_offset: Some(1000),
            date: None,
        };
        assert!(out_of_range.validate().is_err());
    }

    #[test]
    fn week_range_is_inclusive() {
        let dto = WeeklyWinnersDto::from(WeeklyWinners {
            week_start: date!(2024 - 01 - 01),
            metrics: Vec::new(),
        });
        assert_eq!(dto.week_start, "2024-01-01");
        assert_eq!(dto.week_end, "2024-01-07");
    }
}
