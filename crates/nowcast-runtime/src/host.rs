//! The presence host loop.
//!
//! One mpsc queue, one consumer: timer ticks, control commands, join
//! events, and shutdown all arrive as [`HostCommand`]s and are applied
//! strictly in order, so a control command never lands in the middle
//! of a tick and ticks never overlap. Blocking IO (source probes,
//! artwork upload, presence writes) runs on the blocking pool while
//! the loop awaits the result.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use nowcast_artwork::{ArtworkPublisher, ArtworkUploader, CatboxUploader, cache_key_for};
use nowcast_core::{
    Config, PresenceAction, PresencePhase, PresenceUpdate, PublishedState, SourceId,
    TrackSnapshot, TrackSource, arbitrate, build_presence_update, parse_sync_link, plan,
};
use nowcast_presence::{DiscordPresence, JoinListener, PresenceClient, PresenceError};
use nowcast_source_mpris::MprisSource;
use nowcast_source_spotify::{SpotifyClient, SpotifySource};

use crate::open::{self, LinkOutcome, PlaybackTarget, SpotifyTarget};
use crate::server;

/// Initial connect budget. Exhausting it is fatal: without a session
/// there is nothing for the host to do.
const STARTUP_CONNECT_ATTEMPTS: u32 = 3;
const STARTUP_CONNECT_DELAY: Duration = Duration::from_secs(2);

/// Queue depth leaves headroom for control commands while a tick is in
/// flight; a tick that does not fit is dropped, never accumulated.
const COMMAND_QUEUE_DEPTH: usize = 16;

// ─── Commands ─────────────────────────────────────────────────────

/// Everything the host loop reacts to.
pub enum HostCommand {
    /// Poll sources and reconcile the remote presence.
    Tick,
    /// Suspend remote mutation; sources keep polling.
    Pause,
    /// Resume remote mutation.
    Resume,
    /// Clear the published presence now.
    Clear,
    /// Report host state back to a control client.
    Status(oneshot::Sender<StatusSnapshot>),
    /// Join secret accepted by the local user.
    Join(String),
    /// Shut the host down.
    Stop,
}

/// Host state as reported to `nowcast status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub phase: PresencePhase,
    pub connected: bool,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub source: Option<SourceId>,
    pub published_at: Option<DateTime<Utc>>,
    pub artwork_cache_len: usize,
    /// Probe faults recorded on the most recent tick.
    pub last_probe_failures: Vec<String>,
}

/// One remote mutation, retried at most once after a reconnect.
#[derive(Clone)]
enum RemoteOp {
    Update(PresenceUpdate),
    Clear,
}

fn needs_reconnect(e: &PresenceError) -> bool {
    matches!(e, PresenceError::NotConnected) || e.is_transport_fault()
}

fn task_fault(e: tokio::task::JoinError) -> PresenceError {
    PresenceError::Io(std::io::Error::other(e))
}

// ─── Host ─────────────────────────────────────────────────────────

pub struct Host<P, U> {
    presence: Arc<P>,
    publisher: Arc<ArtworkPublisher<U>>,
    sources: Arc<Vec<Box<dyn TrackSource>>>,
    playback: Option<Arc<dyn PlaybackTarget>>,
    asset_key: String,
    invites: bool,
    upload: bool,
    state: PublishedState,
    paused: bool,
    published_at: Option<DateTime<Utc>>,
    last_failures: Vec<String>,
}

impl<P, U> Host<P, U>
where
    P: PresenceClient + 'static,
    U: ArtworkUploader + 'static,
{
    pub fn new(
        presence: P,
        publisher: ArtworkPublisher<U>,
        sources: Vec<Box<dyn TrackSource>>,
        cfg: &Config,
    ) -> Self {
        Self {
            presence: Arc::new(presence),
            publisher: Arc::new(publisher),
            sources: Arc::new(sources),
            playback: None,
            asset_key: cfg.asset_key.clone(),
            invites: cfg.enable_invites,
            upload: cfg.artwork.upload,
            state: PublishedState::default(),
            paused: false,
            published_at: None,
            last_failures: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_playback(mut self, playback: Arc<dyn PlaybackTarget>) -> Self {
        self.playback = Some(playback);
        self
    }

    /// Initial connect with a small retry budget.
    pub async fn connect_startup(
        &mut self,
        attempts: u32,
        delay: Duration,
    ) -> Result<(), PresenceError> {
        let mut last_err = PresenceError::NotConnected;
        for attempt in 1..=attempts {
            match self.call_connect().await {
                Ok(()) => {
                    self.state.connected = true;
                    tracing::info!("presence session established");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("presence connect attempt {attempt}/{attempts} failed: {e}");
                    last_err = e;
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        Err(last_err)
    }

    /// Consume commands until `Stop` or until every sender is gone,
    /// then tear down. Every exit path funnels through the teardown.
    pub async fn run(mut self, mut commands: mpsc::Receiver<HostCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                HostCommand::Tick => {
                    if let Err(e) = self.tick().await {
                        tracing::warn!("tick failed: {e}");
                    }
                }
                HostCommand::Pause => {
                    if !self.paused {
                        tracing::info!("publishing paused");
                    }
                    self.paused = true;
                }
                HostCommand::Resume => {
                    if self.paused {
                        tracing::info!("publishing resumed");
                    }
                    self.paused = false;
                }
                HostCommand::Clear => {
                    if let Err(e) = self.clear_now().await {
                        tracing::warn!("clear failed: {e}");
                    }
                }
                HostCommand::Status(reply) => {
                    let _ = reply.send(self.status());
                }
                HostCommand::Join(secret) => self.handle_join(&secret).await,
                HostCommand::Stop => break,
            }
        }
        self.teardown().await;
    }

    /// One tick: arbitrate sources, plan, execute. Published state is
    /// only advanced after a confirmed remote call, so a failed tick
    /// replays the same transition on the next one.
    pub async fn tick(&mut self) -> anyhow::Result<()> {
        let sources = Arc::clone(&self.sources);
        let outcome = tokio::task::spawn_blocking(move || arbitrate(&sources)).await?;
        for failure in &outcome.failures {
            tracing::warn!("{failure}");
        }
        self.last_failures = outcome.failures.iter().map(ToString::to_string).collect();

        match plan(&self.state, self.paused, outcome.snapshot.as_ref()) {
            PresenceAction::Noop => {}
            PresenceAction::Clear => {
                if self.send(RemoteOp::Clear).await.is_ok() {
                    self.note_cleared();
                }
            }
            PresenceAction::Publish(snapshot) => {
                let (artwork_url, cache_key) = self.resolve_artwork(&snapshot).await;
                let update = build_presence_update(
                    &snapshot,
                    artwork_url.as_deref(),
                    &self.asset_key,
                    self.invites,
                    Utc::now().timestamp().max(0) as u64,
                );
                if self.send(RemoteOp::Update(update)).await.is_ok() {
                    self.note_published(snapshot, artwork_url, cache_key);
                }
            }
        }
        Ok(())
    }

    /// Explicit user clear. The next tick may republish if something is
    /// still playing; pause first to make it stick.
    async fn clear_now(&mut self) -> Result<(), PresenceError> {
        if self.state.last_snapshot.is_none() {
            tracing::debug!("clear requested with nothing published");
            return Ok(());
        }
        self.send(RemoteOp::Clear).await?;
        self.note_cleared();
        Ok(())
    }

    /// Resolve a join secret handed over by the event listener.
    async fn handle_join(&self, secret: &str) {
        let link = match parse_sync_link(secret) {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!("ignoring join secret: {e}");
                return;
            }
        };
        tracing::info!("resolving listen-along join for {:?}", link.track);

        let playback = self.playback.clone();
        let result = tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
            match open::resolve_sync_link(playback.as_deref(), &link) {
                LinkOutcome::Playing(matched) => Ok(format!("now playing {matched:?}")),
                LinkOutcome::WebSearch(url) => {
                    open::open_in_browser(&url)?;
                    Ok(format!("opened web search {url}"))
                }
            }
        })
        .await;

        match result {
            Ok(Ok(message)) => tracing::info!("listen-along: {message}"),
            Ok(Err(e)) => tracing::warn!("listen-along fallback failed: {e}"),
            Err(e) => tracing::warn!("listen-along task failed: {e}"),
        }
    }

    /// Artwork URL for a snapshot about to be published. Upload faults
    /// degrade to no artwork; the static asset key takes over.
    async fn resolve_artwork(&self, snapshot: &TrackSnapshot) -> (Option<String>, Option<String>) {
        if !self.upload {
            return (None, None);
        }
        let Some(bytes) = snapshot.artwork_bytes.clone() else {
            return (None, None);
        };
        let key = cache_key_for(snapshot);
        let publisher = Arc::clone(&self.publisher);
        let task_key = key.clone();
        match tokio::task::spawn_blocking(move || publisher.publish(&task_key, &bytes)).await {
            Ok(Ok(url)) => (Some(url), Some(key)),
            Ok(Err(e)) => {
                tracing::warn!("artwork upload failed, publishing without artwork: {e}");
                (None, None)
            }
            Err(e) => {
                tracing::warn!("artwork upload task failed: {e}");
                (None, None)
            }
        }
    }

    /// Issue one remote mutation. On a dropped session: exactly one
    /// reconnect, then exactly one retry; a second failure ends remote
    /// traffic for this tick and marks the session disconnected.
    async fn send(&mut self, op: RemoteOp) -> Result<(), PresenceError> {
        match self.call(op.clone()).await {
            Ok(()) => {
                self.state.connected = true;
                Ok(())
            }
            Err(e) if needs_reconnect(&e) => {
                tracing::debug!("presence call failed ({e}), reconnecting once");
                if let Err(e) = self.call_connect().await {
                    self.state.connected = false;
                    tracing::warn!("presence reconnect failed: {e}");
                    return Err(e);
                }
                match self.call(op).await {
                    Ok(()) => {
                        self.state.connected = true;
                        Ok(())
                    }
                    Err(e) => {
                        self.state.connected = false;
                        tracing::warn!("presence call failed after reconnect: {e}");
                        Err(e)
                    }
                }
            }
            Err(e) => {
                // Framed error reply: the session itself is still up.
                tracing::warn!("presence call rejected: {e}");
                Err(e)
            }
        }
    }

    async fn call(&self, op: RemoteOp) -> Result<(), PresenceError> {
        let presence = Arc::clone(&self.presence);
        tokio::task::spawn_blocking(move || match op {
            RemoteOp::Update(update) => presence.update(&update),
            RemoteOp::Clear => presence.clear(),
        })
        .await
        .map_err(task_fault)?
    }

    async fn call_connect(&self) -> Result<(), PresenceError> {
        let presence = Arc::clone(&self.presence);
        tokio::task::spawn_blocking(move || presence.connect())
            .await
            .map_err(task_fault)?
    }

    fn note_published(
        &mut self,
        snapshot: TrackSnapshot,
        artwork_url: Option<String>,
        cache_key: Option<String>,
    ) {
        tracing::info!(
            "presence updated: {} by {} [{}]",
            snapshot.title,
            snapshot.artist,
            snapshot.source
        );
        self.state.last_snapshot = Some(snapshot);
        self.state.artwork_url = artwork_url;
        self.state.artwork_cache_key = cache_key;
        self.published_at = Some(Utc::now());
    }

    fn note_cleared(&mut self) {
        tracing::info!("presence cleared");
        self.state.last_snapshot = None;
        self.state.artwork_url = None;
        self.state.artwork_cache_key = None;
        self.published_at = None;
    }

    fn status(&self) -> StatusSnapshot {
        let last = self.state.last_snapshot.as_ref();
        StatusSnapshot {
            phase: self.state.phase(self.paused),
            connected: self.state.connected,
            title: last.map(|s| s.title.clone()),
            artist: last.map(|s| s.artist.clone()),
            source: last.map(|s| s.source),
            published_at: self.published_at,
            artwork_cache_len: self.publisher.cache_len(),
            last_probe_failures: self.last_failures.clone(),
        }
    }

    /// Shutdown sequence: clear a published presence, then drop the
    /// session, so no stale track lingers after the process exits.
    async fn teardown(&mut self) {
        if self.state.last_snapshot.is_some() {
            match self.send(RemoteOp::Clear).await {
                Ok(()) => self.note_cleared(),
                Err(e) => tracing::warn!("presence clear on shutdown failed: {e}"),
            }
        }
        let presence = Arc::clone(&self.presence);
        let _ = tokio::task::spawn_blocking(move || presence.disconnect()).await;
        self.state.connected = false;
        tracing::info!("presence session closed");
    }
}

// ─── Composition ──────────────────────────────────────────────────

/// Build the real host from config and run it to completion.
pub async fn run_host(cfg: Config, socket_path: &str) -> anyhow::Result<()> {
    // Bind the control socket first so a second host fails fast.
    let listener = server::bind(socket_path).await?;

    let mut sources: Vec<Box<dyn TrackSource>> = vec![Box::new(MprisSource::default())];
    let spotify_client = match &cfg.spotify {
        Some(spotify_cfg) => Some(Arc::new(SpotifyClient::new(spotify_cfg.clone())?)),
        None => None,
    };
    if let Some(client) = &spotify_client {
        sources.push(Box::new(SpotifySource::new(Arc::clone(client))));
    }

    let presence = DiscordPresence::new(cfg.discord_client_id.clone());
    let publisher = ArtworkPublisher::new(CatboxUploader::new(cfg.artwork.endpoint.clone()));
    let mut host = Host::new(presence, publisher, sources, &cfg);
    if let Some(client) = spotify_client {
        host = host.with_playback(Arc::new(SpotifyTarget::new(client)));
    }

    if let Err(e) = host
        .connect_startup(STARTUP_CONNECT_ATTEMPTS, STARTUP_CONNECT_DELAY)
        .await
    {
        let _ = std::fs::remove_file(socket_path);
        anyhow::bail!("cannot establish a presence session: {e}");
    }

    let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);

    let server_handle = tokio::spawn(server::serve(listener, tx.clone()));

    // Join events arrive on their own IPC connection and feed the same
    // queue as everything else. Pointless without invites.
    let join_listener = if cfg.enable_invites {
        let listener = Arc::new(JoinListener::new(cfg.discord_client_id.clone()));
        let worker = Arc::clone(&listener);
        let join_tx = tx.clone();
        let handle = tokio::task::spawn_blocking(move || {
            worker.run(move |secret| {
                if join_tx.blocking_send(HostCommand::Join(secret)).is_err() {
                    tracing::debug!("host queue closed, dropping join event");
                }
            });
        });
        Some((listener, handle))
    } else {
        None
    };

    let tick_tx = tx.clone();
    let poll_interval = Duration::from_millis(cfg.poll_interval_ms);
    let timer_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match tick_tx.try_send(HostCommand::Tick) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => tracing::debug!("tick skipped, host busy"),
                Err(TrySendError::Closed(_)) => break,
            }
        }
    });

    let signal_tx = tx.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = signal_tx.send(HostCommand::Stop).await;
    });
    drop(tx);

    tracing::info!(
        "host running: poll interval {}ms, control socket {socket_path}",
        cfg.poll_interval_ms
    );
    host.run(rx).await;

    timer_handle.abort();
    server_handle.abort();
    if let Some((listener, handle)) = join_listener {
        listener.stop();
        let _ = handle.await;
    }
    let _ = std::fs::remove_file(socket_path);
    tracing::info!("host stopped");
    Ok(())
}

/// Resolve when the process receives ctrl-c or SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        tracing::info!("received ctrl-c, shutting down");
    }
}

/// `nowcast --clear`: one-shot connect, clear, disconnect. Repairs a
/// presence left behind by a crashed host.
pub async fn clear_once(cfg: &Config) -> anyhow::Result<()> {
    let presence = Arc::new(DiscordPresence::new(cfg.discord_client_id.clone()));
    tokio::task::spawn_blocking(move || -> Result<(), PresenceError> {
        presence.connect()?;
        presence.clear()?;
        presence.disconnect();
        Ok(())
    })
    .await??;
    println!("presence cleared");
    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────
