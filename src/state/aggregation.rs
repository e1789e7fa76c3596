//! Weekly totals, percentages, rankings and winners derived from the score map.
//!
//! Everything here is a pure function of the canonical state and the activity
//! catalog; callers recompute on demand.

use std::collections::{BTreeMap, HashMap};

use time::{Date, Duration};

use crate::{
    dao::models::{CanonicalState, ScoreKey, ScoreMap},
    state::catalog::{Activity, ActivityCatalog, RankTier, rank_for},
};

/// Daily average (in percent) that counts a day as won.
pub const DAY_WIN_THRESHOLD: f64 = 60.0;
/// Longest lead feed returned.
pub const LEAD_FEED_LIMIT: usize = 5;

/// Monday of the week containing `date`.
pub fn week_start(date: Date) -> Date {
    let back = i64::from(date.weekday().number_days_from_monday());
    date.saturating_sub(Duration::days(back))
}

/// The seven dates of the week containing `reference`, shifted by `offset` weeks.
pub fn week_dates(reference: Date, offset: i64) -> [Date; 7] {
    let monday = week_start(reference).saturating_add(Duration::weeks(offset));
    std::array::from_fn(|day| monday.saturating_add(Duration::days(day as i64)))
}

fn score_on(scores: &ScoreMap, date: Date, player: &str, activity: &str) -> Option<f64> {
    scores
        .get(&ScoreKey::new(date, player, activity).to_string())
        .copied()
}

/// Sum of `player`'s `activity` values over `dates`.
pub fn week_total(scores: &ScoreMap, dates: &[Date], player: &str, activity: &str) -> f64 {
    dates
        .iter()
        .filter_map(|date| score_on(scores, *date, player, activity))
        .sum()
}

/// `min(100, round(value / target * 100))`; a non-positive target scores 0.
pub fn percentage(value: f64, target: f64) -> u32 {
    if target <= 0.0 || !value.is_finite() || value <= 0.0 {
        return 0;
    }
    (value / target * 100.0).round().min(100.0) as u32
}

/// Rounded mean of capped percentages; 0 when there is nothing to average.
pub fn composite(percentages: &[u32]) -> u32 {
    if percentages.is_empty() {
        return 0;
    }
    let sum: u32 = percentages.iter().sum();
    (f64::from(sum) / percentages.len() as f64).round() as u32
}

/// One activity's weekly figures for a player.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityStanding {
    pub activity_id: String,
    pub total: f64,
    pub percentage: u32,
}

/// A player's weekly standing.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStanding {
    pub player: String,
    pub composite: u32,
    pub tier: RankTier,
    pub activities: Vec<ActivityStanding>,
}

impl PlayerStanding {
    fn total_for(&self, activity: &str) -> f64 {
        self.activities
            .iter()
            .find(|standing| standing.activity_id == activity)
            .map_or(0.0, |standing| standing.total)
    }
}

fn standing(scores: &ScoreMap, catalog: &ActivityCatalog, dates: &[Date], player: &str) -> PlayerStanding {
    let activities: Vec<_> = catalog
        .activities()
        .iter()
        .map(|activity| {
            let total = week_total(scores, dates, player, &activity.id);
            ActivityStanding {
                activity_id: activity.id.clone(),
                total,
                percentage: percentage(total, activity.week_target),
            }
        })
        .collect();
    let percentages: Vec<_> = activities.iter().map(|a| a.percentage).collect();
    let composite = composite(&percentages);

    PlayerStanding {
        player: player.to_owned(),
        composite,
        tier: rank_for(composite),
        activities,
    }
}

/// Roster ordered by composite score, best first; ties keep roster order.
pub fn rankings(state: &CanonicalState, catalog: &ActivityCatalog, dates: &[Date]) -> Vec<PlayerStanding> {
    let mut standings: Vec<_> = state
        .players
        .iter()
        .map(|player| standing(&state.scores, catalog, dates, player))
        .collect();
    standings.sort_by(|a, b| b.composite.cmp(&a.composite));
    standings
}

/// Top-ranked player and their best activity of the week.
#[derive(Debug, Clone, PartialEq)]
pub struct Mvp {
    pub player: String,
    pub activity_id: String,
    pub percentage: u32,
    pub total: f64,
}

/// The leader of `standings` with the first activity reaching their best percentage.
pub fn mvp(standings: &[PlayerStanding]) -> Option<Mvp> {
    let leader = standings.first()?;
    let best = leader
        .activities
        .iter()
        .fold(None::<&ActivityStanding>, |best, candidate| match best {
            Some(best) if best.percentage >= candidate.percentage => Some(best),
            _ => Some(candidate),
        })?;
    Some(Mvp {
        player: leader.player.clone(),
        activity_id: best.activity_id.clone(),
        percentage: best.percentage,
        total: best.total,
    })
}

/// An activity where one player is strictly ahead of everyone else.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadEntry {
    pub activity_id: String,
    pub label: String,
    pub leader: String,
    pub runner_up: String,
    pub margin: f64,
}

/// Per activity, the leader over the runner-up when strictly ahead.
pub fn lead_feed(state: &CanonicalState, catalog: &ActivityCatalog, dates: &[Date]) -> Vec<LeadEntry> {
    if state.players.len() < 2 {
        return Vec::new();
    }

    catalog
        .activities()
        .iter()
        .filter_map(|activity| lead_for(state, activity, dates))
        .take(LEAD_FEED_LIMIT)
        .collect()
}

fn lead_for(state: &CanonicalState, activity: &Activity, dates: &[Date]) -> Option<LeadEntry> {
    let mut totals: Vec<_> = state
        .players
        .iter()
        .map(|player| (player, week_total(&state.scores, dates, player, &activity.id)))
        .collect();
    totals.sort_by(|a, b| b.1.total_cmp(&a.1));

    let (leader, top) = totals.first()?;
    let (runner_up, second) = totals.get(1)?;
    (*top > 0.0 && top > second).then(|| LeadEntry {
        activity_id: activity.id.clone(),
        label: activity.label.clone(),
        leader: (*leader).clone(),
        runner_up: (*runner_up).clone(),
        margin: top - second,
    })
}

/// How `player` compares to one rival this week.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadToHead {
    pub rival: String,
    pub player_composite: u32,
    pub rival_composite: u32,
    /// Ties count as winning.
    pub winning: bool,
    pub activities_won: usize,
    pub activities_total: usize,
}

/// `player` against every other ranked player.
pub fn head_to_head(standings: &[PlayerStanding], player: &str) -> Vec<HeadToHead> {
    let Some(me) = standings.iter().find(|standing| standing.player == player) else {
        return Vec::new();
    };

    standings
        .iter()
        .filter(|rival| rival.player != player)
        .map(|rival| {
            let activities_won = me
                .activities
                .iter()
                .filter(|mine| mine.total > rival.total_for(&mine.activity_id))
                .count();
            HeadToHead {
                rival: rival.player.clone(),
                player_composite: me.composite,
                rival_composite: rival.composite,
                winning: me.composite >= rival.composite,
                activities_won,
                activities_total: me.activities.len(),
            }
        })
        .collect()
}

/// Outcome of a single day in the round history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayOutcome {
    Upcoming,
    Win,
    Loss,
    Idle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayResult {
    pub date: Date,
    /// Mean of the capped daily percentages, 0 for future days.
    pub average: f64,
    pub outcome: DayOutcome,
}

/// Day-by-day results of `player` over `dates`, relative to `today`.
pub fn round_history(
    scores: &ScoreMap,
    catalog: &ActivityCatalog,
    player: &str,
    dates: &[Date],
    today: Date,
) -> Vec<DayResult> {
    let activities = catalog.activities();
    dates
        .iter()
        .map(|date| {
            if *date > today || activities.is_empty() {
                return DayResult {
                    date: *date,
                    average: 0.0,
                    outcome: DayOutcome::Upcoming,
                };
            }
            let total: u32 = activities
                .iter()
                .map(|activity| {
                    score_on(scores, *date, player, &activity.id)
                        .map_or(0, |value| percentage(value, activity.daily_target))
                })
                .sum();
            let average = f64::from(total) / activities.len() as f64;
            let outcome = if average >= DAY_WIN_THRESHOLD {
                DayOutcome::Win
            } else if average > 0.0 {
                DayOutcome::Loss
            } else {
                DayOutcome::Idle
            };
            DayResult {
                date: *date,
                average,
                outcome,
            }
        })
        .collect()
}

/// Winners of one metric in one week.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricWinners {
    pub metric_id: String,
    pub label: String,
    /// Players tied at the top, sorted; empty when nobody contributed.
    pub winners: Vec<String>,
    pub top_value: f64,
    /// First candidate activity that contributed to this metric.
    pub source_id: Option<String>,
}

/// Winners of every metric for the week starting on `week_start`.
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyWinners {
    pub week_start: Date,
    pub metrics: Vec<MetricWinners>,
}

#[derive(Default)]
struct WeekTally {
    /// metric id -> player -> total
    by_player: HashMap<String, BTreeMap<String, f64>>,
    /// metric id -> activity ids that contributed
    sources: HashMap<String, Vec<String>>,
}

/// Winners per metric for every week with at least one valid entry, newest first.
pub fn weekly_winner_history(scores: &ScoreMap, catalog: &ActivityCatalog) -> Vec<WeeklyWinners> {
    let mut weeks: BTreeMap<Date, WeekTally> = BTreeMap::new();

    for (raw_key, value) in scores {
        let Some(key) = ScoreKey::parse(raw_key) else {
            continue;
        };
        if !value.is_finite() || *value < 0.0 {
            continue;
        }
        let tally = weeks.entry(week_start(key.date)).or_default();
        if *value == 0.0 {
            continue;
        }

        for metric in catalog
            .winner_metrics()
            .iter()
            .filter(|metric| metric.tracks(&key.activity))
        {
            *tally
                .by_player
                .entry(metric.id.clone())
                .or_default()
                .entry(key.player.clone())
                .or_default() += value;
            let sources = tally.sources.entry(metric.id.clone()).or_default();
            if !sources.contains(&key.activity) {
                sources.push(key.activity.clone());
            }
        }
    }

    weeks
        .into_iter()
        .rev()
        .map(|(week_start, tally)| WeeklyWinners {
            week_start,
            metrics: catalog
                .winner_metrics()
                .iter()
                .map(|metric| {
                    let totals = tally.by_player.get(&metric.id);
                    let top_value = totals
                        .into_iter()
                        .flat_map(|totals| totals.values())
                        .fold(0.0_f64, |top, value| top.max(*value));
                    let winners = match totals {
                        Some(totals) if top_value > 0.0 => totals
                            .iter()
                            .filter(|(_, total)| **total == top_value)
                            .map(|(player, _)| player.clone())
                            .collect(),
                        _ => Vec::new(),
                    };
                    let source_id = tally.sources.get(&metric.id).and_then(|sources| {
                        metric
                            .candidate_ids
                            .iter()
                            .find(|candidate| sources.contains(candidate))
                            .cloned()
                    });
                    MetricWinners {
                        metric_id: metric.id.clone(),
                        label: metric.label.clone(),
                        winners,
                        top_value,
                        source_id,
                    }
                })
                .collect(),
        })
        .collect()
}

/// Entry of `history` for the week containing `date`.
pub fn weekly_winners_for(history: &[WeeklyWinners], date: Date) -> Option<&WeeklyWinners> {
    let start = week_start(date);
    history.iter().find(|week| week.week_start == start)
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    fn state(entries: &[(&str, &str, &str, f64)]) -> CanonicalState {
        let mut state = CanonicalState::default();
        for (date, player, activity, value) in entries {
            state.players.insert((*player).to_owned());
            state
                .scores
                .insert(format!("{date}::{player}::{activity}"), *value);
        }
        state
    }

    #[test]
    fn weeks_are_monday_aligned() {
        // 2024-01-07 is a Sunday.
        assert_eq!(week_start(date!(2024 - 01 - 07)), date!(2024 - 01 - 01));
        assert_eq!(week_start(date!(2024 - 01 - 01)), date!(2024 - 01 - 01));

        let dates = week_dates(date!(2024 - 01 - 10), -1);
        assert_eq!(dates[0], date!(2024 - 01 - 01));
        assert_eq!(dates[6], date!(2024 - 01 - 07));
    }

    #[test]
    fn weekly_total_and_capped_percentage() {
        let state = state(&[
            ("2024-01-01", "AA", "steps", 4000.0),
            ("2024-01-02", "AA", "steps", 6000.0),
            ("2024-01-08", "AA", "steps", 99999.0),
        ]);
        let dates = week_dates(date!(2024 - 01 - 03), 0);

        let total = week_total(&state.scores, &dates, "AA", "steps");
        assert_eq!(total, 10_000.0);
        assert_eq!(percentage(total, 70_000.0), 14);
        assert_eq!(percentage(10.0, 5.0), 100);
        assert_eq!(percentage(1.0, 0.0), 0);
    }

    #[test]
    fn composite_rounds_the_mean() {
        assert_eq!(composite(&[100, 0, 50, 25, 0]), 35);
        assert_eq!(composite(&[1, 2]), 2);
        assert_eq!(composite(&[]), 0);
    }

    #[test]
    fn rankings_sort_by_composite_and_keep_roster_order_on_ties() {
        let mut state = state(&[
            ("2024-01-01", "AA", "workouts", 1.0),
            ("2024-01-01", "BB", "workouts", 5.0),
        ]);
        state.players.insert("CC".into());
        state.players.insert("DD".into());
        let dates = week_dates(date!(2024 - 01 - 01), 0);

        let standings = rankings(&state, &ActivityCatalog::default(), &dates);
        let order: Vec<_> = standings.iter().map(|s| s.player.as_str()).collect();
        assert_eq!(order, vec!["BB", "AA", "CC", "DD"]);
        assert_eq!(standings[0].composite, 20);
        assert_eq!(standings[0].tier.abbr, "S3");

        let best = mvp(&standings).unwrap();
        assert_eq!(best.player, "BB");
        assert_eq!(best.activity_id, "workouts");
        assert_eq!(best.percentage, 100);
    }

    #[test]
    fn lead_feed_requires_a_strict_lead() {
        let state = state(&[
            ("2024-01-01", "AA", "steps", 5000.0),
            ("2024-01-01", "BB", "steps", 3000.0),
            ("2024-01-01", "AA", "sleep", 7.0),
            ("2024-01-01", "BB", "sleep", 7.0),
        ]);
        let dates = week_dates(date!(2024 - 01 - 01), 0);

        let feed = lead_feed(&state, &ActivityCatalog::default(), &dates);
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].leader, "AA");
        assert_eq!(feed[0].runner_up, "BB");
        assert_eq!(feed[0].margin, 2000.0);
    }

    #[test]
    fn head_to_head_counts_activities_won() {
        let state = state(&[
            ("2024-01-01", "AA", "steps", 5000.0),
            ("2024-01-01", "BB", "sleep", 8.0),
            ("2024-01-01", "BB", "hydration", 3.0),
        ]);
        let dates = week_dates(date!(2024 - 01 - 01), 0);
        let standings = rankings(&state, &ActivityCatalog::default(), &dates);

        let duel = head_to_head(&standings, "AA");
        assert_eq!(duel.len(), 1);
        assert_eq!(duel[0].rival, "BB");
        assert_eq!(duel[0].activities_won, 1);
        assert_eq!(duel[0].activities_total, 5);
        assert!(!duel[0].winning);
    }

    #[test]
    fn round_history_marks_wins_losses_and_upcoming_days() {
        let state = state(&[
            ("2024-01-01", "AA", "steps", 10000.0),
            ("2024-01-01", "AA", "workouts", 1.0),
            ("2024-01-01", "AA", "sleep", 8.0),
            ("2024-01-02", "AA", "sleep", 4.0),
        ]);
        let dates = week_dates(date!(2024 - 01 - 01), 0);

        let days = round_history(
            &state.scores,
            &ActivityCatalog::default(),
            "AA",
            &dates,
            date!(2024 - 01 - 03),
        );
        assert_eq!(days[0].outcome, DayOutcome::Win);
        assert_eq!(days[0].average, 60.0);
        assert_eq!(days[1].outcome, DayOutcome::Loss);
        assert_eq!(days[2].outcome, DayOutcome::Idle);
        assert_eq!(days[3].outcome, DayOutcome::Upcoming);
    }

    #[test]
    fn weekly_winner_ties_are_sorted() {
        let state = state(&[
            ("2024-01-02", "ZED", "steps", 5000.0),
            ("2024-01-03", "AMY", "steps", 2000.0),
            ("2024-01-04", "AMY", "steps", 3000.0),
            ("2024-01-02", "BOB", "workouts", 1.0),
        ]);

        let history = weekly_winner_history(&state.scores, &ActivityCatalog::default());
        assert_eq!(history.len(), 1);
        let week = &history[0];
        assert_eq!(week.week_start, date!(2024 - 01 - 01));

        let weight = &week.metrics[0];
        assert_eq!(weight.winners, vec!["AMY", "ZED"]);
        assert_eq!(weight.top_value, 5000.0);
        assert_eq!(weight.source_id.as_deref(), Some("steps"));

        let exercise = &week.metrics[1];
        assert_eq!(exercise.winners, vec!["BOB"]);
        assert_eq!(exercise.source_id.as_deref(), Some("workouts"));
    }

    #[test]
    fn zero_week_has_no_winner_and_history_is_newest_first() {
        let state = state(&[
            ("2024-01-02", "AA", "steps", 0.0),
            ("2024-01-09", "AA", "steps", 100.0),
            ("garbage", "AA", "steps", 100.0),
        ]);

        let history = weekly_winner_history(&state.scores, &ActivityCatalog::default());
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].week_start, date!(2024 - 01 - 08));

        let zero_week = weekly_winners_for(&history, date!(2024 - 01 - 05)).unwrap();
        assert!(zero_week.metrics[0].winners.is_empty());
        assert_eq!(zero_week.metrics[0].top_value, 0.0);
        assert_eq!(zero_week.metrics[0].source_id, None);
    }
}
