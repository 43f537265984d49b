use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Where the hosted backend lives and which of its resources belong to the
/// app. Loaded from `SNAPNEST_*` environment variables by the binary.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct BackendConfig {
    pub endpoint: Url,
    pub project_id: String,
    pub database_id: String,
    pub user_collection_id: String,
    pub post_collection_id: String,
    pub saves_collection_id: String,
    pub storage_id: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl BackendConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
