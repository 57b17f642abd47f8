//! Tokio runtime wiring.
//!
//! A single task owns the [`Console`] and feeds it inputs from every source in
//! arrival order: socket events, request replies, timer expiries, operator
//! commands and signals.

use crate::commands::Command;
use crate::config::AppConfig;
use crate::console::{Console, ConsoleOptions, Flow, Input};
use crate::error::AppResult;
use desk_api::{ApiReply, ApiResult, CredentialStore, HttpRequestLayer};
use desk_core::{Scheduler, Timer};
use desk_ws::{TaggedSocketEvent, WsConnector};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::time::{delay_queue, DelayQueue};
use tracing::{debug, info, warn};

/// Operator command queue depth.
const COMMAND_CHANNEL_SIZE: usize = 32;

/// Slack on top of the request timeout when waiting for the final save reply,
/// so a timed-out request still reports back.
const SAVE_REPLY_GRACE: Duration = Duration::from_millis(250);

// ============================================================================
// Scheduler
// ============================================================================

/// Production scheduler backed by a `DelayQueue`, one entry per timer kind.
pub struct TokioScheduler {
    queue: DelayQueue<Timer>,
    keys: HashMap<Timer, delay_queue::Key>,
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self {
            queue: DelayQueue::new(),
            keys: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Wait for the next expiry. Returns `None` immediately when nothing is
    /// armed.
    pub async fn next_expired(&mut self) -> Option<Timer> {
        let expired = self.queue.next().await?;
        let timer = expired.into_inner();
        self.keys.remove(&timer);
        Some(timer)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, timer: Timer, delay: Duration) {
        match self.keys.get(&timer) {
            Some(key) => self.queue.reset(key, delay),
            None => {
                let key = self.queue.insert(timer, delay);
                self.keys.insert(timer, key);
            }
        }
        debug!(timer = timer.as_str(), delay_ms = delay.as_millis() as u64, "Timer armed");
    }

    fn cancel(&mut self, timer: Timer) {
        if let Some(key) = self.keys.remove(&timer) {
            self.queue.remove(&key);
        }
    }

    fn is_pending(&self, timer: Timer) -> bool {
        self.keys.contains_key(&timer)
    }
}

// ============================================================================
// Main loop
// ============================================================================

/// Build the console against the real engine and run until quit or Ctrl-C.
///
/// `config_path` is re-read on SIGHUP.
pub async fn run(config: AppConfig, config_path: Option<PathBuf>) -> AppResult<()> {
    let (connector, mut socket_rx) = WsConnector::with_channel(config.link.connect_timeout());
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ApiReply>();
    let credentials = CredentialStore::new(config.api.access_key.clone());
    if !credentials.is_authenticated() {
        warn!("No access key configured, requests are sent unauthenticated");
    }
    let api = HttpRequestLayer::new(
        &config.server_url,
        config.api.timeout(),
        credentials,
        reply_tx,
    )?;

    let mut console = Console::new(ConsoleOptions::from(&config), connector, Box::new(api));
    let mut sched = TokioScheduler::new();
    let mut commands = spawn_stdin_reader();
    let mut hangup = Hangup::new()?;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    console.start(&mut sched);
    info!(server_url = %config.server_url, "Console running, type `help` for commands");

    loop {
        let flow = tokio::select! {
            _ = &mut ctrl_c => {
                info!("Ctrl-C received, shutting down");
                Flow::Shutdown
            }
            Some(()) = hangup.recv() => {
                info!("SIGHUP received, reloading");
                reload(&mut console, config_path.as_deref(), &mut sched);
                Flow::Continue
            }
            Some((id, event)) = socket_rx.recv() => {
                console.handle(Input::Socket(id, event), &mut sched)
            }
            Some(reply) = reply_rx.recv() => {
                console.handle(Input::Api(reply), &mut sched)
            }
            Some(timer) = sched.next_expired(), if !sched.is_empty() => {
                console.handle(Input::Timer(timer), &mut sched)
            }
            Some(line) = commands.recv() => {
                match line.parse::<Command>() {
                    Ok(command) => console.handle(Input::Command(command), &mut sched),
                    Err(e) => Flow::Output(e.to_string()),
                }
            }
        };

        match flow {
            Flow::Continue => {}
            Flow::Output(text) => println!("{}", text.trim_end()),
            Flow::Shutdown => break,
        }
    }

    if console.shutdown(&mut sched) {
        let limit = config.api.timeout() + SAVE_REPLY_GRACE;
        match await_settings_saved(&mut reply_rx, limit).await {
            Some(result) => {
                match &result {
                    Ok(()) => info!("Pending settings save confirmed"),
                    Err(e) => warn!(error = %e, "Pending settings save failed"),
                }
                console.handle(Input::Api(ApiReply::SettingsSaved(result)), &mut sched);
            }
            None => warn!(
                limit_ms = limit.as_millis() as u64,
                "No reply to pending settings save before exit"
            ),
        }
    }
    drain_socket_events(&mut socket_rx).await;
    Ok(())
}

/// Wait up to `limit` for a `SettingsSaved` reply. Other replies are dropped.
/// Returns `None` on timeout or when the reply channel closes.
async fn await_settings_saved(
    reply_rx: &mut mpsc::UnboundedReceiver<ApiReply>,
    limit: Duration,
) -> Option<ApiResult<()>> {
    let wait = async {
        while let Some(reply) = reply_rx.recv().await {
            match reply {
                ApiReply::SettingsSaved(result) => return Some(result),
                other => debug!(kind = other.kind(), "Reply dropped during shutdown"),
            }
        }
        None
    };
    tokio::time::timeout(limit, wait).await.ok().flatten()
}

/// Re-read the config file and re-create the link. A bad file keeps the
/// current link settings.
fn reload(
    console: &mut Console<WsConnector>,
    path: Option<&std::path::Path>,
    sched: &mut TokioScheduler,
) {
    match AppConfig::load(path) {
        Ok(config) => console.reload(Some(&config), sched),
        Err(e) => {
            warn!(error = %e, "Config reload failed, keeping current link settings");
            console.reload(None, sched);
        }
    }
}

/// Give socket tasks a moment to send their close frames.
async fn drain_socket_events(socket_rx: &mut mpsc::Receiver<TaggedSocketEvent>) {
    let deadline = tokio::time::sleep(Duration::from_millis(500));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = socket_rx.recv() => match event {
                Some((id, event)) => debug!(socket = %id, kind = event.kind(), "Socket event after shutdown"),
                None => break,
            },
        }
    }
}

/// Forward stdin lines to the console task. The channel closes with stdin.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("stdin closed, operator commands disabled");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    });
    rx
}

// ============================================================================
// Signals
// ============================================================================

#[cfg(unix)]
struct Hangup(tokio::signal::unix::Signal);

#[cfg(unix)]
impl Hangup {
    fn new() -> AppResult<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self(signal(SignalKind::hangup())?))
    }

    async fn recv(&mut self) -> Option<()> {
        self.0.recv().await
    }
}

#[cfg(not(unix))]
struct Hangup;

#[cfg(not(unix))]
impl Hangup {
    fn new() -> AppResult<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> Option<()> {
        std::future::pending().await
    }
}
