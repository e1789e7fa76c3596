use std::time::Duration;

use super::error::{SupabaseDaoError, SupabaseResult};

const DEFAULT_TABLE: &str = "competition";
const DEFAULT_ROW_ID: &str = "main";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2_000);

/// Runtime configuration describing how to reach the Supabase project.
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://<ref>.supabase.co`.
    pub url: String,
    /// Public anon key sent as `apikey` on every call.
    pub anon_key: String,
    /// Table holding the tracker row.
    pub table: String,
    /// Primary key of the single managed row.
    pub row_id: String,
    /// Whether to listen on the Realtime channel. When off, or while the
    /// channel is down, the row is polled instead.
    pub realtime: bool,
    /// How often the row revision is checked while polling.
    pub poll_interval: Duration,
}

impl SupabaseConfig {
    /// Construct a configuration using the default table and row, with Realtime on.
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            table: DEFAULT_TABLE.to_owned(),
            row_id: DEFAULT_ROW_ID.to_owned(),
            realtime: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Use another table.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Manage another row.
    pub fn with_row_id(mut self, row_id: impl Into<String>) -> Self {
        self.row_id = row_id.into();
        self
    }

    /// Change the polling cadence.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Turn the Realtime channel on or off.
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Build a configuration by reading the expected environment variables.
    pub fn from_env() -> SupabaseResult<Self> {
        let url = std::env::var("SUPABASE_URL")
            .map_err(|_| SupabaseDaoError::MissingEnvVar { var: "SUPABASE_URL" })?;
        let anon_key = std::env::var("SUPABASE_ANON_KEY").map_err(|_| {
            SupabaseDaoError::MissingEnvVar {
                var: "SUPABASE_ANON_KEY",
            }
        })?;

        let mut config = Self::new(url, anon_key);
        if let Some(table) = non_empty_var("SUPABASE_TABLE") {
            config = config.with_table(table);
        }
        if let Some(row_id) = non_empty_var("SUPABASE_ROW_ID") {
            config = config.with_row_id(row_id);
        }
        if let Some(raw) = non_empty_var("SUPABASE_POLL_MS") {
            let millis = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|millis| *millis > 0)
                .ok_or(SupabaseDaoError::InvalidPollInterval { value: raw })?;
            config = config.with_poll_interval(Duration::from_millis(millis));
        }
        if let Some(raw) = non_empty_var("SUPABASE_REALTIME") {
            let realtime = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" => true,
                "0" | "false" | "off" => false,
                _ => return Err(SupabaseDaoError::InvalidRealtimeFlag { value: raw }),
            };
            config = config.with_realtime(realtime);
        }

        Ok(config)
    }

    fn base(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// PostgREST endpoint of the tracker table.
    pub(super) fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base(), self.table)
    }

    /// PostgREST root, used as a reachability probe.
    pub(super) fn rest_root(&self) -> String {
        format!("{}/rest/v1/", self.base())
    }

    /// GoTrue sign-up endpoint; an empty body yields an anonymous user.
    pub(super) fn signup_url(&self) -> String {
        format!("{}/auth/v1/signup", self.base())
    }

    /// GoTrue endpoint returning the user a bearer token belongs to.
    pub(super) fn user_url(&self) -> String {
        format!("{}/auth/v1/user", self.base())
    }

    /// GoTrue endpoint renewing an access token.
    pub(super) fn token_url(&self) -> String {
        format!("{}/auth/v1/token", self.base())
    }

    /// Realtime websocket endpoint, on the project host with a `ws` scheme.
    pub(super) fn realtime_url(&self) -> String {
        let base = self.base();
        let socket_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_owned()
        };
        format!(
            "{socket_base}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            self.anon_key
        )
    }
}

fn non_empty_var(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_derived_from_the_project_url() {
        let config = SupabaseConfig::new("https://ref.supabase.co/", "anon").with_table("scores");
        assert_eq!(config.table_url(), "https://ref.supabase.co/rest/v1/scores");
        assert_eq!(config.rest_root(), "https://ref.supabase.co/rest/v1/");
        assert_eq!(config.signup_url(), "https://ref.supabase.co/auth/v1/signup");
        assert_eq!(config.user_url(), "https://ref.supabase.co/auth/v1/user");
        assert_eq!(config.row_id, "main");
        assert!(config.realtime);
    }

    #[test]
    fn realtime_url_switches_to_the_websocket_scheme() {
        let hosted = SupabaseConfig::new("https://ref.supabase.co", "anon");
        assert_eq!(
            hosted.realtime_url(),
            "wss://ref.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
        let local = SupabaseConfig::new("http://127.0.0.1:54321/", "anon");
        assert_eq!(
            local.realtime_url(),
            "ws://127.0.0.1:54321/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
    }
}
