//! Console orchestrator.
//!
//! Owns every mirror and component and applies inputs one at a time, each to
//! completion. Nothing in here awaits: socket events, timer expiries, request
//! replies and operator commands all arrive as [`Input`] values, so the same
//! code runs under the tokio runtime and under the simulated clock in tests.

use crate::commands::{Command, HELP};
use crate::config::AppConfig;
use crate::dispatcher::{DispatchError, TaskDispatcher, BUSY_WARNING};
use crate::view;
use desk_api::{ApiReply, RequestLayer, ServiceStatus};
use desk_core::{ConnectionState, LogEntry, ProgressUpdate, Scheduler, Timer};
use desk_settings::{SettingsSynchronizer, DEFAULT_DEBOUNCE};
use desk_state::{status, Mirrors};
use desk_telemetry::Metrics;
use desk_ws::{
    ConnectionConfig, ConnectionManager, Connector, EventRouter, FrameSink, LinkEvent,
    LinkRegistry, PositionClosed, RouteOutcome, SocketEvent, SocketId, StatusPush, ENGINE_LINK,
};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Message shown when the engine rejects the access key.
pub const CREDENTIAL_REJECTED: &str = "Access key rejected by the engine, it has been cleared.";

/// One unit of work for the console.
#[derive(Debug)]
pub enum Input {
    Socket(SocketId, SocketEvent),
    Timer(Timer),
    Api(ApiReply),
    Command(Command),
}

/// What the caller should do after an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Text for the operator.
    Output(String),
    Shutdown,
}

/// Console construction options.
#[derive(Debug, Clone)]
pub struct ConsoleOptions {
    pub link: ConnectionConfig,
    pub progress_linger: Duration,
    pub settings_debounce: Duration,
    pub log_capacity: usize,
}

impl Default for ConsoleOptions {
    fn default() -> Self {
        Self {
            link: ConnectionConfig::default(),
            progress_linger: desk_state::progress::DEFAULT_LINGER,
            settings_debounce: DEFAULT_DEBOUNCE,
            log_capacity: desk_state::logbook::DEFAULT_CAPACITY,
        }
    }
}

impl From<&AppConfig> for ConsoleOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            link: config.connection_config(),
            progress_linger: config.progress.linger(),
            settings_debounce: config.settings.debounce(),
            log_capacity: config.logbook.capacity,
        }
    }
}

/// The operator console.
pub struct Console<C: Connector + Clone> {
    options: ConsoleOptions,
    connector: C,
    links: LinkRegistry<C>,
    router: EventRouter,
    mirrors: Mirrors,
    settings: SettingsSynchronizer,
    dispatcher: TaskDispatcher,
    api: Box<dyn RequestLayer>,
}

impl<C: Connector + Clone> Console<C> {
    pub fn new(options: ConsoleOptions, connector: C, api: Box<dyn RequestLayer>) -> Self {
        let mirrors = Mirrors::new(options.progress_linger, options.log_capacity);
        let settings = SettingsSynchronizer::new(options.settings_debounce);
        Self {
            options,
            connector,
            links: LinkRegistry::new(),
            router: EventRouter::new(),
            mirrors,
            settings,
            dispatcher: TaskDispatcher::new(),
            api,
        }
    }

    pub fn mirrors(&self) -> &Mirrors {
        &self.mirrors
    }

    pub fn settings(&self) -> &SettingsSynchronizer {
        &self.settings
    }

    pub fn dispatcher(&self) -> &TaskDispatcher {
        &self.dispatcher
    }

    pub fn links(&self) -> &LinkRegistry<C> {
        &self.links
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Engine link state; disconnected when no link exists.
    pub fn link_state(&self) -> ConnectionState {
        self.links
            .get(ENGINE_LINK)
            .map(ConnectionManager::state)
            .unwrap_or(ConnectionState::Disconnected)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open the engine link and pull status, settings and positions.
    pub fn start(&mut self, sched: &mut dyn Scheduler) {
        info!(url = %self.options.link.url, "Starting console");
        self.attach(sched);
        self.settings.fetch(self.api.as_ref(), sched);
        self.resync();
    }

    /// Re-create the engine link and pull engine state again. Settings and
    /// their pending edits are kept.
    pub fn reload(&mut self, config: Option<&AppConfig>, sched: &mut dyn Scheduler) {
        if let Some(config) = config {
            self.options.link = config.connection_config();
        }
        info!(url = %self.options.link.url, "Reloading engine link");
        let manager = ConnectionManager::new(self.options.link.clone(), self.connector.clone());
        self.links.replace(ENGINE_LINK, sched, manager).connect(sched);
        Metrics::link_disconnected();
        self.mirrors.status.link_down();
        self.resync();
    }

    /// Flush a pending settings save and tear every link down.
    ///
    /// Returns whether a save request went out, in which case the caller
    /// should wait for its `SettingsSaved` reply before exiting.
    pub fn shutdown(&mut self, sched: &mut dyn Scheduler) -> bool {
        let mut save_sent = false;
        if sched.is_pending(Timer::SettingsSave) {
            match self.settings.save_now(self.api.as_ref(), sched) {
                Ok(()) => {
                    Metrics::settings_save("sent");
                    save_sent = true;
                }
                Err(e) => warn!(error = %e, "Pending settings save dropped"),
            }
        }
        self.links.teardown_all(sched);
        Metrics::link_disconnected();
        info!(save_sent, "Console stopped");
        save_sent
    }

    fn attach(&mut self, sched: &mut dyn Scheduler) {
        let config = self.options.link.clone();
        let connector = self.connector.clone();
        self.links
            .get_or_create(ENGINE_LINK, move || ConnectionManager::new(config, connector))
            .connect(sched);
    }

    fn resync(&mut self) {
        self.api.fetch_status();
        self.refresh_positions();
    }

    fn refresh_positions(&mut self) {
        self.mirrors.positions.begin_fetch();
        self.api.fetch_positions();
    }

    // ========================================================================
    // Input handling
    // ========================================================================

    /// Apply one input.
    pub fn handle(&mut self, input: Input, sched: &mut dyn Scheduler) -> Flow {
        match input {
            Input::Socket(id, event) => {
                self.on_socket(id, event, sched);
                Flow::Continue
            }
            Input::Timer(timer) => {
                self.on_timer(timer, sched);
                Flow::Continue
            }
            Input::Api(reply) => {
                self.on_reply(reply, sched);
                Flow::Continue
            }
            Input::Command(command) => self.on_command(command, sched),
        }
    }

    fn on_socket(&mut self, id: SocketId, event: SocketEvent, sched: &mut dyn Scheduler) {
        let Some(link) = self.links.get_mut(ENGINE_LINK) else {
            debug!(socket = %id, "Socket event without an engine link");
            return;
        };
        if let Some(event) = link.handle_socket_event(sched, id, event) {
            self.on_link_event(event, sched);
        }
    }

    fn on_timer(&mut self, timer: Timer, sched: &mut dyn Scheduler) {
        match timer {
            Timer::Heartbeat | Timer::Liveness | Timer::Reconnect => {
                let Some(link) = self.links.get_mut(ENGINE_LINK) else {
                    return;
                };
                let event = link.handle_timer(sched, timer);
                if timer == Timer::Heartbeat && event.is_none() && link.is_open() {
                    Metrics::heartbeat_sent();
                }
                if let Some(event) = event {
                    self.on_link_event(event, sched);
                }
            }
            Timer::ProgressHide => self.mirrors.on_timer(sched, timer),
            Timer::SettingsSave => {
                match self.settings.on_timer(self.api.as_ref(), sched, timer) {
                    Ok(()) => Metrics::settings_save("sent"),
                    Err(e) => debug!(error = %e, "Debounced save skipped"),
                }
            }
        }
    }

    fn on_link_event(&mut self, event: LinkEvent, sched: &mut dyn Scheduler) {
        match event {
            LinkEvent::Connected => {
                Metrics::link_connected();
                self.mirrors.status.link_up();
            }
            LinkEvent::Disconnected(reason) => {
                Metrics::link_disconnected();
                Metrics::link_reconnect(reason.label());
                self.mirrors.status.link_down();
            }
            LinkEvent::Frame(text) => {
                let mut targets = Targets {
                    mirrors: &mut self.mirrors,
                    api: self.api.as_ref(),
                    sched,
                };
                let outcome = self.router.route(&text, &mut targets);
                Metrics::frame(outcome.label());
                if matches!(outcome, RouteOutcome::Malformed(_)) {
                    Metrics::frame_dropped();
                }
            }
        }
    }

    fn on_reply(&mut self, reply: ApiReply, sched: &mut dyn Scheduler) {
        let kind = reply.kind();
        match reply {
            ApiReply::Positions(Ok(positions)) => {
                Metrics::api_reply(kind, true);
                self.mirrors.positions.replace_all(positions);
            }
            ApiReply::Positions(Err(e)) => {
                Metrics::api_reply(kind, false);
                warn!(error = %e, "Position pull failed, keeping current list");
                self.mirrors.positions.fetch_failed();
            }
            ApiReply::Settings(result) => {
                Metrics::api_reply(kind, result.is_ok());
                if let Some(entry) = self.settings.on_loaded(result) {
                    self.mirrors.log.push(entry);
                }
            }
            ApiReply::SettingsSaved(result) => {
                Metrics::api_reply(kind, result.is_ok());
                Metrics::settings_save(if result.is_ok() { "ok" } else { "error" });
                let entry = self.settings.on_saved(result);
                self.mirrors.log.push(entry);
            }
            ApiReply::TaskSubmitted { request_id, result } => {
                Metrics::api_reply(kind, result.is_ok());
                self.dispatcher
                    .on_submitted(&request_id, result, &mut self.mirrors, sched);
            }
            ApiReply::StopRequested(result) => {
                Metrics::api_reply(kind, result.is_ok());
                self.dispatcher.on_stop_requested(result, &mut self.mirrors);
            }
            ApiReply::Status(Ok(status)) => {
                Metrics::api_reply(kind, true);
                self.apply_service_status(status, sched);
            }
            ApiReply::Status(Err(e)) => {
                Metrics::api_reply(kind, false);
                warn!(error = %e, "Status pull failed");
            }
            ApiReply::CredentialRejected { status } => {
                Metrics::api_reply(kind, false);
                warn!(status, "Access key rejected");
                self.mirrors.log.push(LogEntry::error(CREDENTIAL_REJECTED));
            }
        }
    }

    /// Startup resynchronization from `GET /api/status`.
    fn apply_service_status(&mut self, service: ServiceStatus, sched: &mut dyn Scheduler) {
        let message = service.message.unwrap_or_else(|| {
            if service.is_running {
                "Running".to_string()
            } else {
                status::READY.to_string()
            }
        });
        info!(running = service.is_running, %message, "Engine status pulled");
        self.mirrors
            .set_status(message, Some(service.is_running), sched);
        if service.is_running {
            if let Some(progress) = service.progress {
                self.mirrors.update_progress(progress, sched);
            }
        }
    }

    // ========================================================================
    // Operator commands
    // ========================================================================

    fn on_command(&mut self, command: Command, sched: &mut dyn Scheduler) -> Flow {
        let api = self.api.as_ref();
        match command {
            Command::Help => Flow::Output(HELP.to_string()),
            Command::Status => Flow::Output(view::status(&self.mirrors, self.link_state())),
            Command::Positions => Flow::Output(view::positions(&self.mirrors.positions)),
            Command::Log(limit) => Flow::Output(view::log(self.mirrors.log.entries(), limit)),
            Command::Settings => match self
                .settings
                .snapshot()
                .to_map()
                .map_err(|e| e.to_string())
                .and_then(|map| serde_json::to_string_pretty(&map).map_err(|e| e.to_string()))
            {
                Ok(text) => Flow::Output(text),
                Err(e) => Flow::Output(format!("Cannot render settings: {e}")),
            },
            Command::Metrics => match Metrics::render() {
                Ok(text) => Flow::Output(text),
                Err(e) => Flow::Output(format!("Cannot render metrics: {e}")),
            },
            Command::Refresh => {
                self.refresh_positions();
                Flow::Continue
            }
            Command::Reload => {
                self.settings.fetch(api, sched);
                Flow::Continue
            }
            Command::Reconnect => {
                self.reload(None, sched);
                Flow::Continue
            }
            Command::Select(symbol) => {
                if self.mirrors.positions.select(&symbol) {
                    Flow::Continue
                } else {
                    Flow::Output(format!("No open position {symbol}"))
                }
            }
            Command::Deselect(symbol) => {
                self.mirrors.positions.deselect(&symbol);
                Flow::Continue
            }
            Command::Toggle(symbol) => {
                let selected = self.mirrors.positions.toggle(&symbol);
                Flow::Output(format!(
                    "{symbol} {}",
                    if selected { "selected" } else { "not selected" }
                ))
            }
            Command::ClearSelection => {
                self.mirrors.positions.clear_selection();
                Flow::Continue
            }
            Command::Open => {
                let snapshot = self.settings.snapshot().clone();
                let result = self
                    .dispatcher
                    .open_positions(&snapshot, &mut self.mirrors, api, sched);
                launched(result)
            }
            Command::SyncSltp => {
                let snapshot = self.settings.snapshot().clone();
                let result = self
                    .dispatcher
                    .sync_sltp(&snapshot, &mut self.mirrors, api, sched);
                launched(result)
            }
            Command::Close { full_symbol, ratio } => launched(self.dispatcher.close_position(
                &full_symbol,
                ratio,
                &mut self.mirrors,
                api,
                sched,
            )),
            Command::CloseSide { side, ratio } => launched(self.dispatcher.close_by_side(
                side,
                ratio,
                &mut self.mirrors,
                api,
                sched,
            )),
            Command::CloseSelected { ratio } => launched(self.dispatcher.close_selected(
                ratio,
                &mut self.mirrors,
                api,
                sched,
            )),
            Command::Stop => {
                if self.dispatcher.stop(&mut self.mirrors, api) {
                    Flow::Continue
                } else {
                    Flow::Output("Nothing to stop.".to_string())
                }
            }
            Command::Set { key, value } => {
                match self.settings.snapshot().with_field(&key, value) {
                    Ok(next) => {
                        if self.settings.update(|s| *s = next, sched) {
                            Flow::Continue
                        } else {
                            Flow::Output("Settings not loaded, edit kept locally.".to_string())
                        }
                    }
                    Err(e) => Flow::Output(e.to_string()),
                }
            }
            Command::Coins { long, short } => {
                if self.settings.set_coin_lists(long, short, sched) {
                    Flow::Continue
                } else {
                    Flow::Output("Settings not loaded, edit kept locally.".to_string())
                }
            }
            Command::Save => match self.settings.save_now(api, sched) {
                Ok(()) => {
                    Metrics::settings_save("sent");
                    Flow::Continue
                }
                Err(e) => Flow::Output(e.to_string()),
            },
            Command::Quit => Flow::Shutdown,
        }
    }
}

fn launched(result: Result<String, DispatchError>) -> Flow {
    match result {
        Ok(request_id) => Flow::Output(format!("Submitted ({request_id})")),
        Err(DispatchError::AlreadyRunning) => Flow::Output(BUSY_WARNING.to_string()),
        Err(e) => Flow::Output(e.to_string()),
    }
}

/// Routing targets for one inbound frame.
struct Targets<'a> {
    mirrors: &'a mut Mirrors,
    api: &'a dyn RequestLayer,
    sched: &'a mut dyn Scheduler,
}

impl FrameSink for Targets<'_> {
    fn append_log(&mut self, entry: LogEntry) {
        self.mirrors.log.push(entry);
    }

    fn status_changed(&mut self, status: StatusPush) {
        self.mirrors
            .set_status(status.message, status.is_running, self.sched);
    }

    fn progress_updated(&mut self, update: ProgressUpdate) {
        self.mirrors.update_progress(update, self.sched);
    }

    fn position_closed(&mut self, patch: PositionClosed) {
        let outcome = self.mirrors.positions.apply_close(
            &patch.full_symbol,
            patch.ratio,
            patch.event_id.as_deref(),
        );
        Metrics::position_patch(outcome.as_str());
    }

    fn refresh_positions(&mut self) {
        self.mirrors.positions.begin_fetch();
        self.api.fetch_positions();
    }
}
