//! Configuration model.
//!
//! Parsing is pure (`&str` in, [`Config`] out); reading the file and
//! picking its path belong to the runtime.

use serde::Deserialize;

use crate::types::NowcastError;

/// Default artwork upload endpoint (anonymous multipart POST).
pub const DEFAULT_ARTWORK_ENDPOINT: &str = "https://catbox.moe/user/api.php";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Application identifier used in the presence handshake.
    #[serde(default)]
    pub discord_client_id: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Static large-image asset shown when no artwork URL is available.
    #[serde(default = "default_asset_key")]
    pub asset_key: String,
    /// Attach a listen-along join secret to updates.
    #[serde(default = "default_true")]
    pub enable_invites: bool,
    #[serde(default)]
    pub artwork: ArtworkConfig,
    /// Omit the whole table to disable the fallback source.
    #[serde(default)]
    pub spotify: Option<SpotifyConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtworkConfig {
    #[serde(default = "default_true")]
    pub upload: bool,
    #[serde(default = "default_artwork_endpoint")]
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Long-lived refresh token provisioned out of band; access tokens
    /// are minted from it at runtime.
    pub refresh_token: String,
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_asset_key() -> String {
    "nowcast".to_string()
}

fn default_artwork_endpoint() -> String {
    DEFAULT_ARTWORK_ENDPOINT.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_client_id: String::new(),
            poll_interval_ms: default_poll_interval_ms(),
            asset_key: default_asset_key(),
            enable_invites: true,
            artwork: ArtworkConfig::default(),
            spotify: None,
        }
    }
}

impl Default for ArtworkConfig {
    fn default() -> Self {
        Self {
            upload: true,
            endpoint: default_artwork_endpoint(),
        }
    }
}

impl Config {
    /// Parse a TOML string into a Config.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Checks that must hold before the host loop may start.
    pub fn validate(&self) -> Result<(), NowcastError> {
        if self.discord_client_id.trim().is_empty() {
            return Err(NowcastError::InvalidConfig(
                "discord_client_id is not set".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(NowcastError::InvalidConfig(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(spotify) = &self.spotify {
            if spotify.client_id.trim().is_empty()
                || spotify.client_secret.trim().is_empty()
                || spotify.refresh_token.trim().is_empty()
            {
                return Err(NowcastError::InvalidConfig(
                    "spotify table needs client_id, client_secret and refresh_token".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────
