//! PlayerCommandRunner trait and PlayerctlExecutor (sync subprocess wrapper).

use crate::error::MprisError;

/// playerctl prints this on stderr when no MPRIS player is registered.
const NO_PLAYERS_MARKER: &str = "No players found";

/// Trait for executing playerctl commands. Enables mock injection for
/// testing.
pub trait PlayerCommandRunner: Send + Sync {
    fn run(&self, args: &[&str]) -> Result<String, MprisError>;
}

impl<T: PlayerCommandRunner + ?Sized> PlayerCommandRunner for &T {
    fn run(&self, args: &[&str]) -> Result<String, MprisError> {
        (**self).run(args)
    }
}

/// Real playerctl executor using `std::process::Command`.
pub struct PlayerctlExecutor {
    playerctl_bin: String,
    player: Option<String>,
}

impl PlayerctlExecutor {
    pub fn new(playerctl_bin: impl Into<String>) -> Self {
        Self {
            playerctl_bin: playerctl_bin.into(),
            player: None,
        }
    }

    /// Pin the probe to one named player instead of playerctl's own
    /// most-recently-active selection.
    #[must_use]
    pub fn with_player(mut self, name: impl Into<String>) -> Self {
        self.player = Some(name.into());
        self
    }
}

impl Default for PlayerctlExecutor {
    fn default() -> Self {
        Self::new("playerctl")
    }
}

impl PlayerCommandRunner for PlayerctlExecutor {
    fn run(&self, args: &[&str]) -> Result<String, MprisError> {
        let mut cmd = std::process::Command::new(&self.playerctl_bin);
        if let Some(ref player) = self.player {
            cmd.args(["--player", player]);
        }
        cmd.args(args);
        let output = cmd.output().map_err(MprisError::Io)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains(NO_PLAYERS_MARKER) {
                return Err(MprisError::NoPlayer);
            }
            return Err(MprisError::CommandFailed(format!(
                "exit code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_executor() {
        let exec = PlayerctlExecutor::default();
        assert_eq!(exec.playerctl_bin, "playerctl");
        assert!(exec.player.is_none());
    }

    #[test]
    fn with_player() {
        let exec = PlayerctlExecutor::default().with_player("spotify");
        assert_eq!(exec.player, Some("spotify".to_string()));
    }

    #[test]
    fn blanket_ref_impl() {
        struct Mock;
        impl PlayerCommandRunner for Mock {
            fn run(&self, _args: &[&str]) -> Result<String, MprisError> {
                Ok("ok".to_string())
            }
        }
        let mock = Mock;
        let r: &Mock = &mock;
        assert_eq!(r.run(&[]).expect("ok"), "ok");
    }
}
