//! Service configuration for the CloudNotes client.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::SyncPeriod;
use crate::util::{is_http_url, normalize_text_option};

/// Connection settings for the remote notes service.
///
/// The password is not serialized; clients keep it in their platform
/// credential store and inject it at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base url of the server, e.g. `https://cloud.example.org`.
    pub server_url: String,
    /// Account name on the server.
    pub username: String,
    /// Account password.
    #[serde(skip)]
    pub password: String,
    /// Automatic synchronization period.
    #[serde(skip)]
    pub sync_period: SyncPeriod,
}

impl ServiceConfig {
    /// Build a validated configuration.
    ///
    /// The server url must include `http://` or `https://`; the username
    /// must not be empty. Automatic synchronization starts disabled.
    pub fn new(
        server_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let server_url = normalize_text_option(Some(server_url.into()))
            .filter(|url| is_http_url(url))
            .map(|url| url.trim_end_matches('/').to_string())
            .ok_or_else(|| {
                Error::InvalidConfiguration(
                    "server url must include http:// or https://".to_string(),
                )
            })?;
        let username = normalize_text_option(Some(username.into())).ok_or_else(|| {
            Error::InvalidConfiguration("username must not be empty".to_string())
        })?;

        Ok(Self {
            server_url,
            username,
            password: password.into(),
            sync_period: SyncPeriod::Manual,
        })
    }

    /// Select the automatic synchronization period.
    #[must_use]
    pub const fn with_sync_period(mut self, sync_period: SyncPeriod) -> Self {
        self.sync_period = sync_period;
        self
    }
}
