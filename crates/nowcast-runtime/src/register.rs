//! URI scheme registration.
//!
//! `nowcast --register-uri` writes a hidden desktop entry routing
//! `x-scheme-handler/nowcast` invocations to `nowcast open %u`, then
//! asks xdg-mime to make it the default handler. Content generation is
//! pure; only the apply step touches the filesystem.

use std::path::{Path, PathBuf};

use nowcast_core::link::SYNC_SCHEME;

/// Desktop entry file name; xdg-mime refers to the handler by it.
pub const HANDLER_FILE: &str = "nowcast-handler.desktop";

/// Desktop entry content routing scheme invocations to `<exec> open %u`.
/// `exec` should be an absolute path so the handler works without a
/// shell environment.
pub fn desktop_entry(exec: &str) -> String {
    format!(
        "[Desktop Entry]\n\
         Type=Application\n\
         Name=Nowcast Link Handler\n\
         Comment=Joins a shared now-playing track\n\
         Exec={} open %u\n\
         Terminal=false\n\
         NoDisplay=true\n\
         MimeType=x-scheme-handler/{SYNC_SCHEME};\n",
        exec_quote(exec)
    )
}

/// Quote an Exec path per the desktop-entry rules: double quotes when
/// the path carries whitespace or reserved characters.
fn exec_quote(path: &str) -> String {
    const RESERVED: &str = "\"'\\<>~|&;$*?#()`";
    if path
        .chars()
        .any(|c| c.is_whitespace() || RESERVED.contains(c))
    {
        format!("\"{}\"", path.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        path.to_string()
    }
}

/// Per-user applications directory (XDG data dir, `~/.local` fallback).
pub fn applications_dir() -> anyhow::Result<PathBuf> {
    if let Ok(dir) = std::env::var("XDG_DATA_HOME") {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir).join("applications"));
        }
    }
    let home = std::env::var("HOME")
        .map_err(|_| anyhow::anyhow!("HOME not set; cannot resolve the applications directory"))?;
    Ok(PathBuf::from(home).join(".local/share/applications"))
}

/// Write `content` to `path` unless it already matches. Returns whether
/// the file was (re)written.
pub fn write_if_changed(path: &Path, content: &str) -> std::io::Result<bool> {
    if let Ok(existing) = std::fs::read_to_string(path) {
        if existing == content {
            return Ok(false);
        }
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(true)
}

/// Register this binary as the scheme handler. Idempotent: rerunning
/// rewrites nothing when the entry already matches.
pub fn register_uri_scheme() -> anyhow::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    let path = applications_dir()?.join(HANDLER_FILE);
    write_if_changed(&path, &desktop_entry(&exe.to_string_lossy()))?;
    set_default_handler()?;
    Ok(path)
}

fn set_default_handler() -> anyhow::Result<()> {
    let output = std::process::Command::new("xdg-mime")
        .args([
            "default",
            HANDLER_FILE,
            &format!("x-scheme-handler/{SYNC_SCHEME}"),
        ])
        .output()
        .map_err(|e| anyhow::anyhow!("cannot run xdg-mime: {e}"))?;
    if !output.status.success() {
        anyhow::bail!(
            "xdg-mime default failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}
