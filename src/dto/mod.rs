use time::{Date, OffsetDateTime};

pub mod health;
pub mod leaderboard;
pub mod players;
pub mod scores;
pub mod session;
pub mod sse;
pub mod state;
pub mod validation;

/// Calendar date used as "today" when a request does not pin one.
pub(crate) fn local_today() -> Date {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date()
}
