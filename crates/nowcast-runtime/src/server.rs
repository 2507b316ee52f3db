//! UDS JSON-RPC control server: minimal hand-rolled implementation.
//! Connection-per-request, newline-delimited JSON; every method maps
//! to one [`HostCommand`] on the host queue.

use std::path::Path;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};

use crate::host::HostCommand;

/// Bind the control socket. The host binds before it connects to the
/// presence gateway, so a second `nowcast host` fails immediately.
///
/// A socket file that still accepts connections means another host is
/// alive; one that refuses is stale and gets replaced.
pub async fn bind(socket_path: &str) -> anyhow::Result<UnixListener> {
    let path = Path::new(socket_path);
    let socket_dir = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path: {socket_path}"))?;

    std::fs::create_dir_all(socket_dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;
    }

    if path.exists() {
        if UnixStream::connect(socket_path).await.is_err() {
            std::fs::remove_file(socket_path)?;
            tracing::info!("removed stale socket at {socket_path}");
        } else {
            anyhow::bail!("another host is already running at {socket_path}");
        }
    }

    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("control socket listening on {socket_path}");
    Ok(listener)
}

/// Accept control clients until the task is aborted.
pub async fn serve(listener: UnixListener, commands: mpsc::Sender<HostCommand>) -> anyhow::Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let commands = commands.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, commands).await {
                tracing::debug!("control connection error: {e}");
            }
        });
    }
}

async fn handle_connection(
    stream: UnixStream,
    commands: mpsc::Sender<HostCommand>,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let request: serde_json::Value = serde_json::from_str(line.trim())?;
    let method = request["method"].as_str().unwrap_or("");
    let id = request["id"].clone();

    let response = match dispatch(method, &commands).await {
        Ok(result) => serde_json::json!({
            "jsonrpc": "2.0",
            "result": result,
            "id": id,
        }),
        Err(error) => serde_json::json!({
            "jsonrpc": "2.0",
            "error": error,
            "id": id,
        }),
    };
    let mut resp = serde_json::to_string(&response)?;
    resp.push('\n');
    writer.write_all(resp.as_bytes()).await?;

    Ok(())
}

/// Translate a method name into a host command. `status` waits for the
/// host's reply; the rest are acknowledged as soon as they are queued.
async fn dispatch(
    method: &str,
    commands: &mpsc::Sender<HostCommand>,
) -> Result<serde_json::Value, serde_json::Value> {
    let command = match method {
        "status" => {
            let (reply_tx, reply_rx) = oneshot::channel();
            commands
                .send(HostCommand::Status(reply_tx))
                .await
                .map_err(|_| host_gone())?;
            let status = reply_rx.await.map_err(|_| host_gone())?;
            return serde_json::to_value(status)
                .map_err(|e| rpc_error(-32603, format!("internal error: {e}")));
        }
        "pause" => HostCommand::Pause,
        "resume" => HostCommand::Resume,
        "clear" => HostCommand::Clear,
        "stop" => HostCommand::Stop,
        other => return Err(rpc_error(-32601, format!("method not found: {other}"))),
    };

    commands.send(command).await.map_err(|_| host_gone())?;
    Ok(serde_json::json!({ "ok": true }))
}

fn rpc_error(code: i64, message: impl Into<String>) -> serde_json::Value {
    serde_json::json!({ "code": code, "message": message.into() })
}

fn host_gone() -> serde_json::Value {
    rpc_error(-32000, "host is shutting down")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StatusSnapshot;
    use nowcast_core::{PresencePhase, SourceId};

    async fn start_server() -> (tempfile::TempDir, String, mpsc::Receiver<HostCommand>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket_path = dir
            .path()
            .join("nowcastd.sock")
            .to_string_lossy()
            .into_owned();
        let (tx, rx) = mpsc::channel(8);
        let listener = bind(&socket_path).await.expect("bind");
        tokio::spawn(serve(listener, tx));
        (dir, socket_path, rx)
    }

    async fn raw_call(socket_path: &str, request: &str) -> serde_json::Value {
        let stream = UnixStream::connect(socket_path).await.expect("connect");
        let (reader, mut writer) = stream.into_split();
        writer.write_all(request.as_bytes()).await.expect("write");
        writer.write_all(b"\n").await.expect("write newline");
        writer.shutdown().await.expect("shutdown");

        let mut line = String::new();
        BufReader::new(reader)
            .read_line(&mut line)
            .await
            .expect("read response");
        serde_json::from_str(line.trim()).expect("parse response")
    }

    #[tokio::test]
    async fn status_round_trip() {
        let (_dir, socket_path, mut rx) = start_server().await;
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                if let HostCommand::Status(reply) = command {
                    let _ = reply.send(StatusSnapshot {
                        phase: PresencePhase::Active,
                        connected: true,
                        title: Some("Song A".into()),
                        artist: Some("Artist X".into()),
                        source: Some(SourceId::Mpris),
                        published_at: None,
                        artwork_cache_len: 2,
                        last_probe_failures: Vec::new(),
                    });
                }
            }
        });

        let resp = raw_call(
            &socket_path,
            r#"{"jsonrpc":"2.0","id":1,"method":"status","params":{}}"#,
        )
        .await;
        assert_eq!(resp["id"], 1);
        assert_eq!(resp["result"]["phase"], "active");
        assert_eq!(resp["result"]["connected"], true);
        assert_eq!(resp["result"]["title"], "Song A");
        assert_eq!(resp["result"]["source"], "mpris");
        assert_eq!(resp["result"]["artwork_cache_len"], 2);
    }

    #[tokio::test]
    async fn control_methods_land_on_the_queue() {
        let (_dir, socket_path, mut rx) = start_server().await;

        let resp = raw_call(&socket_path, r#"{"jsonrpc":"2.0","id":2,"method":"pause"}"#).await;
        assert_eq!(resp["result"]["ok"], true);
        assert!(matches!(rx.recv().await, Some(HostCommand::Pause)));

        let resp = raw_call(&socket_path, r#"{"jsonrpc":"2.0","id":3,"method":"stop"}"#).await;
        assert_eq!(resp["result"]["ok"], true);
        assert!(matches!(rx.recv().await, Some(HostCommand::Stop)));
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let (_dir, socket_path, _rx) = start_server().await;

        let resp = raw_call(&socket_path, r#"{"jsonrpc":"2.0","id":4,"method":"dance"}"#).await;
        assert_eq!(resp["error"]["code"], -32601);
        assert!(
            resp["error"]["message"]
                .as_str()
                .expect("message")
                .contains("dance")
        );
        assert!(resp.get("result").is_none());
    }

    #[tokio::test]
    async fn bind_refuses_a_live_socket() {
        let (_dir, socket_path, _rx) = start_server().await;

        let err = bind(&socket_path).await.expect_err("second bind must fail");
        assert!(err.to_string().contains("already running"));
    }

    #[tokio::test]
    async fn bind_replaces_a_dead_socket() {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket_path = dir
            .path()
            .join("nowcastd.sock")
            .to_string_lossy()
            .into_owned();

        // A dropped listener leaves its socket file behind.
        let stale = UnixListener::bind(&socket_path).expect("first bind");
        drop(stale);
        assert!(Path::new(&socket_path).exists());

        bind(&socket_path).await.expect("rebinds over the stale file");
    }

    #[tokio::test]
    async fn bind_sets_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let socket_dir = dir.path().join("nowcast");
        let socket_path = socket_dir
            .join("nowcastd.sock")
            .to_string_lossy()
            .into_owned();

        let _listener = bind(&socket_path).await.expect("bind");

        let dir_mode = std::fs::metadata(&socket_dir)
            .expect("dir metadata")
            .permissions()
            .mode();
        assert_eq!(dir_mode & 0o777, 0o700);

        let socket_mode = std::fs::metadata(&socket_path)
            .expect("socket metadata")
            .permissions()
            .mode();
        assert_eq!(socket_mode & 0o777, 0o600);
    }
}
