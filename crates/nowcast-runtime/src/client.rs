//! UDS JSON-RPC client for CLI subcommands.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::host::StatusSnapshot;

pub(crate) async fn rpc_call(socket_path: &str, method: &str) -> anyhow::Result<serde_json::Value> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot connect to host at {socket_path}: {e}"))?;

    let (reader, mut writer) = stream.into_split();

    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": {},
        "id": 1,
    });
    let mut req = serde_json::to_string(&request)?;
    req.push('\n');
    writer.write_all(req.as_bytes()).await?;
    writer.shutdown().await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let response: serde_json::Value = serde_json::from_str(line.trim())?;

    if let Some(error) = response.get("error") {
        anyhow::bail!("RPC error: {error}");
    }

    Ok(response["result"].clone())
}

/// `nowcast status`: query the running host and render its state.
pub async fn cmd_status(socket_path: &str) -> anyhow::Result<()> {
    let result = rpc_call(socket_path, "status").await?;
    let status: StatusSnapshot = serde_json::from_value(result)?;
    print!("{}", format_status(&status));
    Ok(())
}

/// `nowcast pause|resume|clear|stop`: fire one control method.
pub async fn cmd_control(socket_path: &str, method: &str) -> anyhow::Result<()> {
    rpc_call(socket_path, method).await?;
    let confirmation = match method {
        "pause" => "publishing paused",
        "resume" => "publishing resumed",
        "clear" => "presence cleared",
        "stop" => "host stopping",
        other => other,
    };
    println!("{confirmation}");
    Ok(())
}

/// Pure formatting logic for status output, separated for testability.
pub(crate) fn format_status(status: &StatusSnapshot) -> String {
    let mut lines = Vec::new();

    lines.push(format!("phase:     {}", status.phase.as_str()));
    lines.push(format!(
        "connected: {}",
        if status.connected { "yes" } else { "no" }
    ));

    match (status.title.as_deref(), status.artist.as_deref()) {
        (Some(title), Some(artist)) => {
            let source = status.source.map_or_else(String::new, |s| format!(" [{s}]"));
            lines.push(format!("track:     {title} by {artist}{source}"));
        }
        _ => lines.push("track:     none".to_string()),
    }

    if let Some(at) = status.published_at {
        lines.push(format!("published: {}", at.format("%Y-%m-%d %H:%M:%S UTC")));
    }

    lines.push(format!("artwork:   {} cached", status.artwork_cache_len));

    if status.last_probe_failures.is_empty() {
        lines.push("probes:    ok".to_string());
    } else {
        for failure in &status.last_probe_failures {
            lines.push(format!("probe:     {failure}"));
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
