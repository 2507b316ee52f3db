//! PlayerMetadata, the playerctl format string, and its parser.

use crate::error::MprisError;
use crate::runner::PlayerCommandRunner;

/// Tab-delimited format string for `playerctl metadata --format`.
/// `mpris:length` and `position` are in microseconds.
pub const NOW_PLAYING_FORMAT: &str =
    "{{status}}\t{{title}}\t{{artist}}\t{{album}}\t{{mpris:length}}\t{{mpris:artUrl}}\t{{position}}";

/// One metadata read from the active player, units normalized to
/// milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlayerMetadata {
    pub status: String,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration_ms: Option<u64>,
    pub art_url: Option<String>,
    pub position_ms: Option<u64>,
}

impl PlayerMetadata {
    pub fn is_playing(&self) -> bool {
        self.status == "Playing"
    }
}

/// Run `playerctl metadata` and parse the output. Returns `Ok(None)`
/// when no player is registered on the bus.
pub fn fetch_metadata(
    runner: &impl PlayerCommandRunner,
) -> Result<Option<PlayerMetadata>, MprisError> {
    match runner.run(&["metadata", "--format", NOW_PLAYING_FORMAT]) {
        Ok(output) => parse_metadata(&output),
        Err(MprisError::NoPlayer) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Parse one line of `playerctl metadata --format` output. Blank output
/// means the player exposes no metadata yet.
pub fn parse_metadata(output: &str) -> Result<Option<PlayerMetadata>, MprisError> {
    let line = match output.lines().find(|l| !l.trim().is_empty()) {
        Some(line) => line,
        None => return Ok(None),
    };

    let parts: Vec<&str> = line.split('\t').collect();
    if parts.len() < 3 {
        return Err(MprisError::Parse(format!(
            "expected at least 3 tab-separated fields, got {}",
            parts.len()
        )));
    }

    Ok(Some(PlayerMetadata {
        status: parts[0].trim().to_string(),
        title: parts[1].trim().to_string(),
        artist: parts[2].trim().to_string(),
        album: non_empty(parts.get(3)),
        duration_ms: parse_us_field(parts.get(4)),
        art_url: non_empty(parts.get(5)),
        position_ms: parse_us_field(parts.get(6)),
    }))
}

fn non_empty(part: Option<&&str>) -> Option<String> {
    part.map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn parse_us_field(part: Option<&&str>) -> Option<u64> {
    part.and_then(|s| s.trim().parse::<u64>().ok())
        .map(|us| us / 1_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_line() {
        let line = "Playing\tSong A\tArtist X\tAlbum Z\t203000000\tfile:///tmp/cover.jpg\t42000000";
        let meta = parse_metadata(line).expect("parse").expect("metadata");
        assert_eq!(meta.status, "Playing");
        assert!(meta.is_playing());
        assert_eq!(meta.title, "Song A");
        assert_eq!(meta.artist, "Artist X");
        assert_eq!(meta.album.as_deref(), Some("Album Z"));
        assert_eq!(meta.duration_ms, Some(203_000));
        assert_eq!(meta.art_url.as_deref(), Some("file:///tmp/cover.jpg"));
        assert_eq!(meta.position_ms, Some(42_000));
    }

    #[test]
    fn parse_paused_line() {
        let line = "Paused\tSong A\tArtist X\t\t\t\t";
        let meta = parse_metadata(line).expect("parse").expect("metadata");
        assert!(!meta.is_playing());
        assert_eq!(meta.album, None);
        assert_eq!(meta.duration_ms, None);
        assert_eq!(meta.art_url, None);
        assert_eq!(meta.position_ms, None);
    }

    #[test]
    fn parse_blank_output_is_none() {
        assert_eq!(parse_metadata("").expect("parse"), None);
        assert_eq!(parse_metadata("\n  \n").expect("parse"), None);
    }

    #[test]
    fn parse_too_few_fields_error() {
        let result = parse_metadata("Playing\tSong A");
        assert!(result.is_err());
    }

    #[test]
    fn parse_invalid_duration_defaults_to_none() {
        let line = "Playing\tSong A\tArtist X\tAlbum Z\tXX\t\tYY";
        let meta = parse_metadata(line).expect("parse").expect("metadata");
        assert_eq!(meta.duration_ms, None);
        assert_eq!(meta.position_ms, None);
    }

    #[test]
    fn title_with_spaces_survives() {
        let line = "Playing\tmy long song title\tsome artist\t\t\t\t";
        let meta = parse_metadata(line).expect("parse").expect("metadata");
        assert_eq!(meta.title, "my long song title");
        assert_eq!(meta.artist, "some artist");
    }

    #[test]
    fn mock_runner_fetch() {
        struct MockRunner;
        impl PlayerCommandRunner for MockRunner {
            fn run(&self, args: &[&str]) -> Result<String, MprisError> {
                assert!(args.contains(&"metadata"));
                Ok("Playing\tSong A\tArtist X\t\t\t\t\n".to_string())
            }
        }
        let meta = fetch_metadata(&MockRunner).expect("fetch").expect("metadata");
        assert_eq!(meta.title, "Song A");
    }

    #[test]
    fn mock_runner_no_player_is_none() {
        struct NoPlayerRunner;
        impl PlayerCommandRunner for NoPlayerRunner {
            fn run(&self, _args: &[&str]) -> Result<String, MprisError> {
                Err(MprisError::NoPlayer)
            }
        }
        assert_eq!(fetch_metadata(&NoPlayerRunner).expect("fetch"), None);
    }

    #[test]
    fn mock_runner_fault_propagates() {
        struct FaultRunner;
        impl PlayerCommandRunner for FaultRunner {
            fn run(&self, _args: &[&str]) -> Result<String, MprisError> {
                Err(MprisError::CommandFailed("exit code 1: dbus timeout".into()))
            }
        }
        assert!(fetch_metadata(&FaultRunner).is_err());
    }
}
