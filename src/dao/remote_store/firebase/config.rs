use super::error::{FirebaseDaoError, FirebaseResult};

const DEFAULT_PATH: &str = "competition";

/// Runtime configuration describing how to reach a Firebase Realtime Database.
#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    /// Database root, e.g. `https://<project>-default-rtdb.firebaseio.com`.
    pub database_url: String,
    /// Tree path holding the tracker document.
    pub path: String,
    /// Web API key used for anonymous sign-in through the Identity Toolkit.
    pub api_key: Option<String>,
}

impl FirebaseConfig {
    /// Construct a configuration from an explicit database URL, using the default path.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            path: DEFAULT_PATH.to_owned(),
            api_key: None,
        }
    }

    /// Point the store at a different tree path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Attach the web API key needed for anonymous sign-in.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Build a configuration by reading the expected environment variables.
    pub fn from_env() -> FirebaseResult<Self> {
        let database_url =
            std::env::var("FIREBASE_DATABASE_URL").map_err(|_| FirebaseDaoError::MissingEnvVar {
                var: "FIREBASE_DATABASE_URL",
            })?;

        let mut config = Self::new(database_url);
        if let Some(path) = std::env::var("FIREBASE_PATH")
            .ok()
            .filter(|path| !path.trim().is_empty())
        {
            config = config.with_path(path);
        }
        if let Ok(api_key) = std::env::var("FIREBASE_API_KEY") {
            config = config.with_api_key(api_key);
        }

        Ok(config)
    }

    /// REST endpoint of the tracker document.
    pub(super) fn document_url(&self) -> String {
        format!(
            "{}/{}.json",
            self.database_url.trim_end_matches('/'),
            self.path.trim_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_url_tolerates_stray_slashes() {
        let config = FirebaseConfig::new("https://demo.firebaseio.com/").with_path("/rooms/alpha/");
        assert_eq!(
            config.document_url(),
            "https://demo.firebaseio.com/rooms/alpha.json"
        );
    }
}
