//! Spotify Web API client: refresh-token auth, now-playing reads,
//! cover download, search, and remote playback.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::json;

use nowcast_core::config::SpotifyConfig;

use crate::error::SpotifyError;
use crate::matching::TitleNormalizer;
use crate::models::{AlbumRef, CurrentlyPlaying, SearchResponse, TokenResponse, TrackItem};

/// Remote playback starts this far ahead of the host's reported
/// position, absorbing search and transport latency.
pub const LATENCY_OFFSET_MS: u64 = 1500;

const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";
const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const COVER_TIMEOUT: Duration = Duration::from_secs(5);
/// Refresh this long before the token actually expires.
const TOKEN_EXPIRY_MARGIN: u64 = 60;

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct SpotifyClient {
    cfg: SpotifyConfig,
    api_base: String,
    token_url: String,
    http: Mutex<Option<reqwest::blocking::Client>>,
    token: Mutex<Option<CachedToken>>,
    cover_memo: Mutex<Option<(String, Option<Vec<u8>>)>>,
    normalizer: TitleNormalizer,
}

impl SpotifyClient {
    pub fn new(cfg: SpotifyConfig) -> Result<Self, SpotifyError> {
        Ok(Self {
            cfg,
            api_base: DEFAULT_API_BASE.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            http: Mutex::new(None),
            token: Mutex::new(None),
            cover_memo: Mutex::new(None),
            normalizer: TitleNormalizer::new()?,
        })
    }

    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    #[must_use]
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Whether a usable access token can be minted right now.
    pub fn authorized(&self) -> bool {
        self.access_token().is_ok()
    }

    /// Current or freshly refreshed access token.
    pub fn access_token(&self) -> Result<String, SpotifyError> {
        if let Some(token) = self.token.lock().as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let resp = self
            .http()?
            .post(&self.token_url)
            .basic_auth(&self.cfg.client_id, Some(&self.cfg.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.cfg.refresh_token.as_str()),
            ])
            .send()?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().unwrap_or_default();
            return Err(SpotifyError::Auth(format!(
                "HTTP {status}: {}",
                body.trim()
            )));
        }
        let token: TokenResponse = resp.json()?;
        let expires_at = Instant::now()
            + Duration::from_secs(token.expires_in.saturating_sub(TOKEN_EXPIRY_MARGIN));
        let value = token.access_token.clone();
        *self.token.lock() = Some(CachedToken {
            value: token.access_token,
            expires_at,
        });
        Ok(value)
    }

    /// What the user's player is doing right now. `Ok(None)` is the
    /// API's 204 "nothing playing" answer.
    pub fn currently_playing(&self) -> Result<Option<CurrentlyPlaying>, SpotifyError> {
        let token = self.access_token()?;
        let resp = self
            .http()?
            .get(format!("{}/me/player/currently-playing", self.api_base))
            .bearer_auth(&token)
            .send()?;
        match resp.status().as_u16() {
            204 => Ok(None),
            200 => Ok(Some(resp.json()?)),
            status => Err(self.api_error(status, resp)),
        }
    }

    pub fn search_tracks(&self, query: &str, limit: u32) -> Result<Vec<TrackItem>, SpotifyError> {
        let token = self.access_token()?;
        let limit = limit.to_string();
        let resp = self
            .http()?
            .get(format!("{}/search", self.api_base))
            .bearer_auth(&token)
            .query(&[("q", query), ("type", "track"), ("limit", limit.as_str())])
            .send()?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            return Err(self.api_error(status, resp));
        }
        let parsed: SearchResponse = resp.json()?;
        Ok(parsed.tracks.items)
    }

    /// Start playback of one track URI on the user's active device.
    pub fn start_playback(&self, uri: &str, position_ms: u64) -> Result<(), SpotifyError> {
        let token = self.access_token()?;
        let resp = self
            .http()?
            .put(format!("{}/me/player/play", self.api_base))
            .bearer_auth(&token)
            .json(&json!({ "uris": [uri], "position_ms": position_ms }))
            .send()?;
        if resp.status().is_success() {
            return Ok(());
        }
        match resp.status().as_u16() {
            404 => Err(SpotifyError::NoActiveDevice),
            403 => Err(SpotifyError::PremiumRequired),
            status @ (502 | 503) => Err(SpotifyError::Server(status)),
            status => Err(self.api_error(status, resp)),
        }
    }

    /// Find the best catalog match for a track and start playing it at
    /// the host's position plus [`LATENCY_OFFSET_MS`]. Returns the
    /// matched track name.
    pub fn search_and_play(
        &self,
        track: &str,
        artist: &str,
        position_ms: u64,
    ) -> Result<String, SpotifyError> {
        let matched = self
            .find_track(track, artist)?
            .ok_or_else(|| SpotifyError::NoMatch {
                track: track.to_string(),
            })?;
        self.start_playback(&matched.uri, position_ms + LATENCY_OFFSET_MS)?;
        Ok(matched.name)
    }

    /// Structured query first, then a normalized plain-text fallback.
    fn find_track(&self, track: &str, artist: &str) -> Result<Option<TrackItem>, SpotifyError> {
        let mut structured = format!("track:{track}");
        if !artist.is_empty() {
            structured.push_str(" artist:");
            structured.push_str(artist);
        }
        let items = self.search_tracks(&structured, 5)?;
        if let Some(found) = self.normalizer.fuzzy_pick(&items, track, artist) {
            return Ok(Some(found.clone()));
        }

        let plain = format!(
            "{} {}",
            self.normalizer.normalize(track),
            self.normalizer.normalize(artist)
        );
        let plain = plain.trim();
        if plain.is_empty() {
            return Ok(None);
        }
        let items = self.search_tracks(plain, 10)?;
        if let Some(found) = self.normalizer.fuzzy_pick(&items, track, artist) {
            return Ok(Some(found.clone()));
        }

        // Last resort: accept the top result when one normalized title
        // is a prefix of the other, even if the artist differs.
        let track_norm = self.normalizer.normalize(track);
        if let Some(top) = items.first() {
            let top_norm = self.normalizer.normalize(&top.name);
            if !track_norm.is_empty()
                && !top_norm.is_empty()
                && (track_norm.starts_with(&top_norm) || top_norm.starts_with(&track_norm))
            {
                return Ok(Some(top.clone()));
            }
        }
        Ok(None)
    }

    /// Album cover bytes, memoized per album id so an unchanged track
    /// costs no IO on later polls. Download faults resolve to `None`
    /// and are not retried until the album changes.
    pub fn fetch_cover(&self, album: &AlbumRef) -> Option<Vec<u8>> {
        let album_id = album.id.as_deref().unwrap_or("");
        if !album_id.is_empty() {
            if let Some((memo_id, bytes)) = self.cover_memo.lock().as_ref() {
                if memo_id == album_id {
                    return bytes.clone();
                }
            }
        }

        let bytes = album
            .images
            .first()
            .map(|img| img.url.as_str())
            .filter(|url| !url.is_empty())
            .and_then(|url| self.download_cover(url).ok());
        if !album_id.is_empty() {
            *self.cover_memo.lock() = Some((album_id.to_string(), bytes.clone()));
        }
        bytes
    }

    fn download_cover(&self, url: &str) -> Result<Vec<u8>, SpotifyError> {
        let body = self
            .http()?
            .get(url)
            .timeout(COVER_TIMEOUT)
            .send()?
            .error_for_status()?
            .bytes()?;
        Ok(body.to_vec())
    }

    fn api_error(&self, status: u16, resp: reqwest::blocking::Response) -> SpotifyError {
        // A rejected token will not fix itself before expiry; drop it
        // so the next call refreshes.
        if status == 401 {
            *self.token.lock() = None;
        }
        SpotifyError::Api {
            status,
            body: resp.text().unwrap_or_default(),
        }
    }

    fn http(&self) -> Result<reqwest::blocking::Client, SpotifyError> {
        let mut slot = self.http.lock();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()?;
        *slot = Some(client.clone());
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn test_cfg() -> SpotifyConfig {
        SpotifyConfig {
            client_id: "cid".to_string(),
            client_secret: "shh".to_string(),
            refresh_token: "refresh".to_string(),
        }
    }

    fn client_for(server: &mockito::ServerGuard) -> SpotifyClient {
        SpotifyClient::new(test_cfg())
            .expect("client")
            .with_api_base(server.url())
            .with_token_url(format!("{}/api/token", server.url()))
    }

    fn mock_token(server: &mut mockito::ServerGuard) -> mockito::Mock {
        server
            .mock("POST", "/api/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "refresh".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "tok", "expires_in": 3600}"#)
            .expect(1)
            .create()
    }

    #[test]
    fn token_is_refreshed_once_and_cached() {
        let mut server = mockito::Server::new();
        let token_mock = mock_token(&mut server);
        let np_mock = server
            .mock("GET", "/me/player/currently-playing")
            .match_header("authorization", "Bearer tok")
            .with_status(204)
            .expect(2)
            .create();

        let client = client_for(&server);
        assert!(client.currently_playing().expect("first").is_none());
        assert!(client.currently_playing().expect("second").is_none());

        token_mock.assert();
        np_mock.assert();
    }

    #[test]
    fn rejected_refresh_token_is_auth_error() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/api/token")
            .with_status(400)
            .with_body(r#"{"error": "invalid_grant"}"#)
            .create();

        let client = client_for(&server);
        let err = client.access_token().unwrap_err();
        assert!(matches!(err, SpotifyError::Auth(_)));
        assert!(err.to_string().contains("400"));
        assert!(!client.authorized());
    }

    #[test]
    fn currently_playing_parses_track() {
        let mut server = mockito::Server::new();
        mock_token(&mut server);
        server
            .mock("GET", "/me/player/currently-playing")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"is_playing": true, "progress_ms": 1000,
                    "item": {"name": "Song A", "uri": "spotify:track:1",
                             "artists": [{"name": "Artist X"}]}}"#,
            )
            .create();

        let client = client_for(&server);
        let current = client.currently_playing().expect("ok").expect("playing");
        assert!(current.is_playing);
        assert_eq!(current.item.expect("item").name, "Song A");
    }

    #[test]
    fn api_fault_clears_cached_token() {
        let mut server = mockito::Server::new();
        let token_mock = server
            .mock("POST", "/api/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "tok", "expires_in": 3600}"#)
            .expect(2)
            .create();
        server
            .mock("GET", "/me/player/currently-playing")
            .with_status(401)
            .with_body(r#"{"error": {"status": 401}}"#)
            .expect(2)
            .create();

        let client = client_for(&server);
        assert!(client.currently_playing().is_err());
        // Token was dropped, so the second call refreshes again.
        assert!(client.currently_playing().is_err());
        token_mock.assert();
    }

    #[test]
    fn search_and_play_structured_match() {
        let mut server = mockito::Server::new();
        mock_token(&mut server);
        server
            .mock("GET", "/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "track:Song A artist:Artist X".into()),
                Matcher::UrlEncoded("type".into(), "track".into()),
                Matcher::UrlEncoded("limit".into(), "5".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"tracks": {"items": [
                    {"name": "Song A", "uri": "spotify:track:1",
                     "artists": [{"name": "Artist X"}]}]}}"#,
            )
            .create();
        let play_mock = server
            .mock("PUT", "/me/player/play")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "uris": ["spotify:track:1"],
                "position_ms": 31_500,
            })))
            .with_status(204)
            .create();

        let client = client_for(&server);
        let name = client
            .search_and_play("Song A", "Artist X", 30_000)
            .expect("played");
        assert_eq!(name, "Song A");
        play_mock.assert();
    }

    #[test]
    fn search_falls_back_to_plain_prefix_accept() {
        let mut server = mockito::Server::new();
        mock_token(&mut server);
        // Structured search finds nothing usable.
        server
            .mock("GET", "/search")
            .match_query(Matcher::UrlEncoded("limit".into(), "5".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"tracks": {"items": []}}"#)
            .create();
        // Plain search's top result has the right title, wrong artist.
        server
            .mock("GET", "/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "song a artist x".into()),
                Matcher::UrlEncoded("limit".into(), "10".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"tracks": {"items": [
                    {"name": "Song A", "uri": "spotify:track:2",
                     "artists": [{"name": "Cover Band"}]}]}}"#,
            )
            .create();
        let play_mock = server
            .mock("PUT", "/me/player/play")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "uris": ["spotify:track:2"],
            })))
            .with_status(204)
            .create();

        let client = client_for(&server);
        let name = client
            .search_and_play("Song A", "Artist X", 0)
            .expect("played");
        assert_eq!(name, "Song A");
        play_mock.assert();
    }

    #[test]
    fn no_results_is_no_match() {
        let mut server = mockito::Server::new();
        mock_token(&mut server);
        server
            .mock("GET", "/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"tracks": {"items": []}}"#)
            .expect(2)
            .create();

        let client = client_for(&server);
        let err = client.search_and_play("Song A", "Artist X", 0).unwrap_err();
        assert!(matches!(err, SpotifyError::NoMatch { .. }));
    }

    #[test]
    fn playback_status_mapping() {
        for (status, check) in [
            (404, SpotifyError::NoActiveDevice),
            (403, SpotifyError::PremiumRequired),
            (503, SpotifyError::Server(503)),
        ] {
            let mut server = mockito::Server::new();
            mock_token(&mut server);
            server
                .mock("PUT", "/me/player/play")
                .with_status(status)
                .create();

            let client = client_for(&server);
            let err = client.start_playback("spotify:track:1", 0).unwrap_err();
            assert_eq!(
                std::mem::discriminant(&err),
                std::mem::discriminant(&check),
                "status {status} maps to {check:?}"
            );
        }
    }

    #[test]
    fn cover_fetch_is_memoized_per_album() {
        let mut server = mockito::Server::new();
        let cover_mock = server
            .mock("GET", "/cover.jpg")
            .with_status(200)
            .with_body("jpeg bytes")
            .expect(1)
            .create();

        let client = client_for(&server);
        let album = AlbumRef {
            id: Some("alb1".to_string()),
            name: "Album Z".to_string(),
            images: vec![crate::models::ImageRef {
                url: format!("{}/cover.jpg", server.url()),
            }],
        };
        assert_eq!(client.fetch_cover(&album), Some(b"jpeg bytes".to_vec()));
        assert_eq!(client.fetch_cover(&album), Some(b"jpeg bytes".to_vec()));
        cover_mock.assert();
    }

    #[test]
    fn cover_fetch_without_images_is_none() {
        let server = mockito::Server::new();
        let client = client_for(&server);
        let album = AlbumRef {
            id: Some("alb2".to_string()),
            ..AlbumRef::default()
        };
        assert_eq!(client.fetch_cover(&album), None);
    }
}
