//! Read-side views computed from the cached state on every request.

use crate::{
    dto::{
        leaderboard::{LeaderboardQuery, LeaderboardResponse, WeeklyWinnersDto},
        local_today,
    },
    dao::models::format_date,
    state::{
        SharedState,
        aggregation::{
            head_to_head, lead_feed, mvp, rankings, round_history, week_dates,
            weekly_winner_history, weekly_winners_for,
        },
    },
};

/// Rankings, MVP, lead feed and the caller's own views for one week.
pub async fn leaderboard(state: &SharedState, query: &LeaderboardQuery) -> LeaderboardResponse {
    let engine = state.engine();
    let view = engine.view().await;
    let catalog = &engine.settings().catalog;
    let dates = week_dates(query.reference_date(), query.offset());

    let standings = rankings(&view.state, catalog, &dates);
    let player = view.active_player().map(str::to_owned);
    let duels = player
        .as_deref()
        .map(|player| head_to_head(&standings, player))
        .unwrap_or_default();
    let history = player
        .as_deref()
        .map(|player| round_history(&view.state.scores, catalog, player, &dates, local_today()))
        .unwrap_or_default();
    let winners = weekly_winner_history(&view.state.scores, catalog);
    let this_week = weekly_winners_for(&winners, dates[0]).cloned();

    LeaderboardResponse {
        dates: dates.iter().copied().map(format_date).collect(),
        mvp: mvp(&standings).map(Into::into),
        lead_feed: lead_feed(&view.state, catalog, &dates)
            .into_iter()
            .map(Into::into)
            .collect(),
        standings: standings.into_iter().map(Into::into).collect(),
        player,
        head_to_head: duels.into_iter().map(Into::into).collect(),
        round_history: history.into_iter().map(Into::into).collect(),
        weekly_winners: this_week.map(Into::into),
    }
}

/// Winners of every recorded week, newest first.
pub async fn weekly_winners(state: &SharedState) -> Vec<WeeklyWinnersDto> {
    let engine = state.engine();
    let view = engine.view().await;
    weekly_winner_history(&view.state.scores, &engine.settings().catalog)
        .into_iter()
        .map(Into::into)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::{
        dao::{identity::Identity, remote_store::memory::MemoryStore},
        state::{
            AppState,
            sync_engine::{EngineSettings, SyncEngine},
        },
    };

    async fn seeded_state() -> SharedState {
        let store = MemoryStore::with_document(json!({
            "operatives": ["AA", "BB"],
            "scores": {
                "2024-01-01::AA::steps": 4000,
                "2024-01-02::AA::steps": 6000,
                "2024-01-02::BB::steps": 3000,
                "2024-01-09::BB::workouts": 2
            },
            "userBindings": { "u1": "AA" }
        }));
        let engine = SyncEngine::new(Arc::new(store), EngineSettings::default());
        engine
            .sign_in(Some(Identity::new("u1", None)))
            .await
            .unwrap();
        AppState::new(engine, None)
    }

    #[tokio::test]
    async fn leaderboard_ranks_the_requested_week() {
        let state = seeded_state().await;
        let query = LeaderboardQuery {
            week_offset: Some(0),
            date: Some("2024-01-03".into()),
        };

        let board = leaderboard(&state, &query).await;

        assert_eq!(board.dates.first().map(String::as_str), Some("2024-01-01"));
        assert_eq!(board.standings[0].player, "AA");
        assert_eq!(board.standings[0].activities[0].total, 10_000.0);
        assert_eq!(board.player.as_deref(), Some("AA"));
        assert_eq!(board.head_to_head.len(), 1);
        assert_eq!(board.round_history.len(), 7);
        assert_eq!(board.lead_feed[0].leader, "AA");

        let winners = board.weekly_winners.unwrap();
        assert_eq!(winners.metrics[0].winners, vec!["AA"]);
    }

    #[tokio::test]
    async fn history_lists_newest_week_first() {
        let state = seeded_state().await;

        let history = weekly_winners(&state).await;

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].week_start, "2024-01-08");
        assert_eq!(history[0].metrics[1].winners, vec!["BB"]);
    }
}
