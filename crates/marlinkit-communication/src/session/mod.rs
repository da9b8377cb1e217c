//! Connection sessions
//!
//! A [`Session`] owns one printer link. While attached, a single background
//! task polls the transport, decodes telemetry, tracks busy/idle state and
//! print progress, and publishes everything on the session's [`EventBus`].
//!
//! Writes and uploads share the transport with the poll task through one
//! async mutex, so bytes from two conversations never interleave. The poll
//! task skips its tick while an upload holds the link; lines the upload
//! reads that are not acknowledgements are fed back through the same
//! telemetry path.

mod busy;
mod manager;

pub use busy::{BusyTracker, DEFAULT_BUSY_DEBOUNCE};
pub use manager::SessionManager;

use crate::communication::{drain_lines, ConnectionParams, Transport};
use crate::firmware::marlin::telemetry::{decode_line, is_busy_marker};
use crate::firmware::marlin::upload::{
    clean_source, target_file_name, CancelFlag, LineUploader, UploadConfig, UploadObserver,
    UploadSummary,
};
use crate::firmware::marlin::{BedLevelCapture, Command, FirmwareCapabilities};
use crate::progress::{JobTracker, PrintJobState};
use chrono::Utc;
use marlinkit_core::{
    CommunicationEvent, ConnectionError, ConnectionEvent, DetachReason, Error, ErrorEvent,
    EventBus, EventBusConfig, EventFilter, LinkEvent, Result, SessionEvent, SubscriptionId,
    TelemetryFact, UploadError, UploadEvent, UploadProgress,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

/// Default poll tick
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runtime configuration for a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// How often the transport is checked for input
    pub poll_interval: Duration,
    /// Quiet time after the last busy marker before the link is idle
    pub busy_debounce: Duration,
    /// Ask the firmware to report temperatures every n seconds (`M155`)
    pub temperature_report_interval: Option<u32>,
    /// Ask the firmware to report SD progress every n seconds (`M27 S`)
    pub sd_status_interval: Option<u32>,
    /// Send `M115` right after the port opens
    pub query_capabilities_on_attach: bool,
    /// Capacity of the async event channel
    pub event_capacity: usize,
    /// Upload protocol tuning
    pub upload: UploadConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            busy_debounce: DEFAULT_BUSY_DEBOUNCE,
            temperature_report_interval: None,
            sd_status_interval: None,
            query_capabilities_on_attach: true,
            event_capacity: 1024,
            upload: UploadConfig::default(),
        }
    }
}

/// Commands written right after the port opens
fn attach_sequence(config: &SessionConfig) -> Vec<Command> {
    let mut commands = Vec::new();
    if config.query_capabilities_on_attach {
        commands.push(Command::firmware_info());
    }
    if let Some(interval) = config.temperature_report_interval {
        commands.push(Command::temperature_auto_report(interval));
    }
    if let Some(interval) = config.sd_status_interval {
        commands.push(Command::sd_status_auto_report(interval));
    }
    commands
}

/// Unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Observable link state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    /// No open link
    Detached,
    /// Attached and accepting input
    Idle,
    /// Attached, firmware reported busy within the debounce window
    Busy,
}

/// Handle used to cancel the upload running on a session
#[derive(Debug, Clone)]
pub struct UploadHandle {
    slot: Arc<Mutex<Option<CancelFlag>>>,
}

impl UploadHandle {
    /// Request cancellation. Returns false when no upload is running.
    pub fn cancel(&self) -> bool {
        match self.slot.lock().as_ref() {
            Some(flag) => {
                flag.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether an upload is running
    pub fn is_running(&self) -> bool {
        self.slot.lock().is_some()
    }
}

/// Clears the active-upload slot when the upload ends or is dropped
struct UploadSlotGuard<'a>(&'a Mutex<Option<CancelFlag>>);

impl Drop for UploadSlotGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

/// Holds the transport for an upload and sends `M29` if the upload future
/// is dropped before the uploader could
struct StopWriteGuard {
    transport: Option<OwnedMutexGuard<Box<dyn Transport>>>,
    armed: bool,
}

impl StopWriteGuard {
    fn transport(&mut self) -> Option<&mut (dyn Transport + 'static)> {
        self.transport.as_deref_mut().map(|t| t.as_mut())
    }
}

impl Drop for StopWriteGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Some(mut transport) = self.transport.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::warn!("Upload dropped mid-transfer, sending stop-write");
                runtime.spawn(async move {
                    let stop = Command::stop_sd_write().encode();
                    if let Err(e) = transport.write_line(&stop).await {
                        tracing::error!("Failed to send stop-write: {}", e);
                    }
                });
            }
            Err(_) => tracing::error!("Upload dropped outside a runtime, stop-write not sent"),
        }
    }
}

/// Mutable per-session state, touched only under the state lock
struct SessionState {
    attached: bool,
    line_buffer: String,
    busy: BusyTracker,
    bed_level: BedLevelCapture,
    jobs: JobTracker,
    capabilities: FirmwareCapabilities,
    last_error: Option<String>,
}

impl SessionState {
    fn new(busy_debounce: Duration) -> Self {
        Self {
            attached: false,
            line_buffer: String::new(),
            busy: BusyTracker::new(busy_debounce),
            bed_level: BedLevelCapture::new(),
            jobs: JobTracker::new(),
            capabilities: FirmwareCapabilities::new(),
            last_error: None,
        }
    }

    /// Route one received line through busy tracking, bed-level capture,
    /// decoding and job tracking
    fn ingest_line(&mut self, line: &str, now: Instant, out: &mut Vec<SessionEvent>) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        out.push(SessionEvent::Communication(CommunicationEvent::LineReceived {
            line: line.to_string(),
        }));

        if is_busy_marker(line) {
            if self.busy.observe(now) {
                tracing::debug!("Printer busy");
                out.push(SessionEvent::Link(LinkEvent::Busy));
            }
            return;
        }

        if let Some(grid) = self.bed_level.feed_line(line) {
            out.push(SessionEvent::Telemetry(TelemetryFact::BedLevelGrid(grid)));
        }

        let stamp = Utc::now();
        for fact in decode_line(line) {
            self.capabilities.apply(&fact);
            let print_events = self.jobs.observe(&fact, stamp);
            out.push(SessionEvent::Telemetry(fact));
            out.extend(print_events.into_iter().map(SessionEvent::Print));
        }
    }
}

/// State shared between the session handle and its poll task
struct Shared {
    port: String,
    transport: Arc<AsyncMutex<Box<dyn Transport>>>,
    state: Mutex<SessionState>,
    events: EventBus,
    shutdown: Mutex<Option<mpsc::Sender<()>>>,
}

impl Shared {
    fn publish(&self, event: SessionEvent) {
        let _ = self.events.publish(event);
    }

    fn publish_all(&self, events: Vec<SessionEvent>) {
        for event in events {
            self.publish(event);
        }
    }

    /// Feed raw bytes; partial lines wait for the next chunk
    fn ingest_text(&self, text: &str) {
        let now = Instant::now();
        let mut out = Vec::new();
        {
            let mut state = self.state.lock();
            state.line_buffer.push_str(text);
            for line in drain_lines(&mut state.line_buffer) {
                state.ingest_line(&line, now, &mut out);
            }
        }
        self.publish_all(out);
    }

    fn ingest_line(&self, line: &str) {
        let mut out = Vec::new();
        self.state.lock().ingest_line(line, Instant::now(), &mut out);
        self.publish_all(out);
    }

    fn expire_busy(&self) {
        let idle = self.state.lock().busy.expire(Instant::now());
        if idle {
            tracing::debug!("Printer idle");
            self.publish(SessionEvent::Link(LinkEvent::Idle));
        }
    }

    fn report(&self, code: &str, error: &Error) {
        tracing::warn!("{} on {}: {}", code, self.port, error);
        self.state.lock().last_error = Some(error.to_string());
        self.publish(SessionEvent::Error(ErrorEvent::from_error(code, error)));
    }

    /// Mark the link broken and stop polling.
    ///
    /// Returns true if this call performed the detach.
    fn fail_link(&self, error: &Error) -> bool {
        let detached = {
            let mut state = self.state.lock();
            state.last_error = Some(error.to_string());
            state.busy.reset();
            std::mem::replace(&mut state.attached, false)
        };
        if !detached {
            return false;
        }

        tracing::error!("Link {} failed: {}", self.port, error);
        self.publish(SessionEvent::Error(ErrorEvent::from_error(
            "TRANSPORT_FAILED",
            error,
        )));
        self.publish(SessionEvent::Connection(ConnectionEvent::Detached {
            port: self.port.clone(),
            reason: DetachReason::TransportFailed(error.to_string()),
        }));

        let shutdown = self.shutdown.lock().take();
        if let Some(tx) = shutdown {
            let _ = tx.try_send(());
        }
        true
    }
}

/// Forwards upload callbacks onto the session's event bus
struct SessionUploadObserver<'a> {
    shared: &'a Shared,
}

impl UploadObserver for SessionUploadObserver<'_> {
    fn on_line_sent(&mut self, line: &str) {
        self.shared
            .publish(SessionEvent::Communication(CommunicationEvent::LineSent {
                line: line.to_string(),
            }));
    }

    fn on_unsolicited(&mut self, line: &str) {
        self.shared.ingest_line(line);
    }

    fn on_progress(&mut self, progress: &UploadProgress) {
        self.shared
            .publish(SessionEvent::Upload(UploadEvent::Progress(progress.clone())));
    }

    fn on_resend(&mut self, line: usize) {
        self.shared
            .publish(SessionEvent::Upload(UploadEvent::ResendRequested { line }));
    }

    fn on_line_failed(&mut self, line: usize, attempts: u32) {
        self.shared
            .publish(SessionEvent::Upload(UploadEvent::LineFailed { line, attempts }));
    }
}

/// One printer link
pub struct Session {
    id: SessionId,
    params: ConnectionParams,
    config: SessionConfig,
    shared: Arc<Shared>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    upload_slot: Arc<Mutex<Option<CancelFlag>>>,
}

impl Session {
    /// Create a detached session over `transport`
    pub fn new(
        transport: Box<dyn Transport>,
        params: ConnectionParams,
        config: SessionConfig,
    ) -> Self {
        let events = EventBus::with_config(EventBusConfig {
            channel_capacity: config.event_capacity,
        });
        let shared = Arc::new(Shared {
            port: params.port.clone(),
            transport: Arc::new(AsyncMutex::new(transport)),
            state: Mutex::new(SessionState::new(config.busy_debounce)),
            events,
            shutdown: Mutex::new(None),
        });

        Self {
            id: SessionId::new(),
            params,
            config,
            shared,
            poll_task: Mutex::new(None),
            upload_slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Session identifier
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Port this session talks to
    pub fn port(&self) -> &str {
        &self.params.port
    }

    /// Connection parameters
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether the link is open and polled
    pub fn is_attached(&self) -> bool {
        self.shared.state.lock().attached
    }

    /// Whether the firmware is within its busy window
    pub fn is_busy(&self) -> bool {
        self.shared.state.lock().busy.is_busy()
    }

    /// Current link state
    pub fn link_state(&self) -> LinkState {
        let state = self.shared.state.lock();
        match (state.attached, state.busy.is_busy()) {
            (false, _) => LinkState::Detached,
            (true, true) => LinkState::Busy,
            (true, false) => LinkState::Idle,
        }
    }

    /// Snapshot of the current or last print job
    pub fn job(&self) -> Option<PrintJobState> {
        self.shared.state.lock().jobs.job().cloned()
    }

    /// Capabilities reported so far
    pub fn capabilities(&self) -> FirmwareCapabilities {
        self.shared.state.lock().capabilities.clone()
    }

    /// Message of the most recent error
    pub fn last_error(&self) -> Option<String> {
        self.shared.state.lock().last_error.clone()
    }

    /// This session's event bus
    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    /// Register a handler; it runs on the publishing task, in emission order
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(SessionEvent) + Send + Sync + 'static,
    {
        self.shared.events.subscribe(filter, handler)
    }

    /// Remove a handler
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.events.unsubscribe(id)
    }

    /// Receiver for async consumption
    pub fn receiver(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.receiver()
    }

    /// Handle for cancelling uploads on this session
    pub fn upload_handle(&self) -> UploadHandle {
        UploadHandle {
            slot: self.upload_slot.clone(),
        }
    }

    /// Open the link, run the attach sequence and start polling
    pub async fn connect(&self) -> Result<()> {
        if self.is_attached() {
            return Err(ConnectionError::AlreadyAttached {
                port: self.params.port.clone(),
            }
            .into());
        }
        self.params.validate()?;

        tracing::info!(
            "Attaching to {} at {} baud",
            self.params.port,
            self.params.baud_rate
        );

        let mut transport = self.shared.transport.lock().await;
        if let Err(e) = transport.open(&self.params).await {
            tracing::error!("Failed to open {}: {}", self.params.port, e);
            return Err(e.into());
        }

        let mut sent = Vec::new();
        for command in attach_sequence(&self.config) {
            let line = command.encode();
            if let Err(e) = transport.write_line(&line).await {
                tracing::error!("Attach sequence failed on {}: {}", self.params.port, e);
                transport.close().await;
                return Err(e.into());
            }
            sent.push(line);
        }
        drop(transport);

        {
            let mut state = self.shared.state.lock();
            state.attached = true;
            state.last_error = None;
            state.line_buffer.clear();
            state.busy.reset();
            state.bed_level.reset();
        }

        self.shared
            .publish(SessionEvent::Connection(ConnectionEvent::Attached {
                port: self.params.port.clone(),
                baud_rate: self.params.baud_rate,
            }));
        for line in sent {
            self.shared
                .publish(SessionEvent::Communication(CommunicationEvent::LineSent { line }));
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        *self.shared.shutdown.lock() = Some(shutdown_tx);
        let handle = tokio::spawn(run_poll_loop(
            self.shared.clone(),
            self.config.poll_interval,
            shutdown_rx,
        ));
        *self.poll_task.lock() = Some(handle);

        tracing::info!("Session {} attached to {}", self.id, self.params.port);
        Ok(())
    }

    /// Stop polling, cancel any upload and close the link
    pub async fn disconnect(&self) -> Result<()> {
        let was_attached = {
            let mut state = self.shared.state.lock();
            state.busy.reset();
            std::mem::replace(&mut state.attached, false)
        };

        if let Some(flag) = self.upload_slot.lock().as_ref() {
            flag.cancel();
        }

        let shutdown = self.shared.shutdown.lock().take();
        if let Some(tx) = shutdown {
            let _ = tx.try_send(());
        }
        let task = self.poll_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!("Poll task for {} ended abnormally: {}", self.params.port, e);
            }
        }

        self.shared.transport.lock().await.close().await;

        if was_attached {
            tracing::info!("Session {} detached from {}", self.id, self.params.port);
            self.shared
                .publish(SessionEvent::Connection(ConnectionEvent::Detached {
                    port: self.params.port.clone(),
                    reason: DetachReason::UserRequested,
                }));
        }
        Ok(())
    }

    fn ensure_attached(&self) -> Result<()> {
        if self.is_attached() {
            Ok(())
        } else {
            Err(ConnectionError::NotConnected.into())
        }
    }

    /// Encode and write a command
    pub async fn send_command(&self, command: &Command) -> Result<()> {
        self.send_raw(&command.encode()).await
    }

    /// Write a pre-rendered line
    pub async fn send_raw(&self, line: &str) -> Result<()> {
        self.ensure_attached()?;

        let mut transport = self.shared.transport.lock().await;
        match transport.write_line(line).await {
            Ok(()) => {
                drop(transport);
                tracing::debug!(">> {}", line);
                self.shared
                    .publish(SessionEvent::Communication(CommunicationEvent::LineSent {
                        line: line.to_string(),
                    }));
                Ok(())
            }
            Err(e) => {
                let error = Error::from(e);
                if error.is_link_fatal() {
                    transport.close().await;
                    drop(transport);
                    self.shared.fail_link(&error);
                } else {
                    drop(transport);
                    self.shared.report("WRITE_FAILED", &error);
                }
                Err(error)
            }
        }
    }

    /// Upload a G-code file from disk to the printer's SD card
    pub async fn upload_file(&self, path: impl AsRef<Path>) -> Result<UploadSummary> {
        let path = path.as_ref();
        let source = match tokio::fs::read_to_string(path).await {
            Ok(source) => source,
            Err(e) => {
                let upload_error = if e.kind() == std::io::ErrorKind::NotFound {
                    UploadError::FileNotFound {
                        path: path.display().to_string(),
                    }
                } else {
                    UploadError::ReadFailed {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    }
                };
                let error = Error::from(upload_error);
                tracing::error!("Upload aborted: {}", error);
                self.shared.report("UPLOAD_SOURCE", &error);
                return Err(error);
            }
        };

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload");
        self.upload_text(name, &source).await
    }

    /// Upload G-code text to the printer's SD card as `name`.
    ///
    /// The source is cleaned of comments and blank lines first; the target
    /// file gets the configured extension.
    pub async fn upload_text(&self, name: &str, source: &str) -> Result<UploadSummary> {
        self.ensure_attached()?;

        let cancel = CancelFlag::new();
        {
            let mut slot = self.upload_slot.lock();
            if slot.is_some() {
                return Err(UploadError::AlreadyRunning.into());
            }
            *slot = Some(cancel.clone());
        }
        let _slot = UploadSlotGuard(&self.upload_slot);

        let lines = clean_source(source);
        let file_name = target_file_name(name, &self.config.upload.file_extension);
        self.shared
            .publish(SessionEvent::Upload(UploadEvent::Started {
                file_name: file_name.clone(),
                total_lines: lines.len(),
            }));

        let mut guard = StopWriteGuard {
            transport: Some(self.shared.transport.clone().lock_owned().await),
            armed: true,
        };
        let Some(transport) = guard.transport() else {
            return Err(Error::other("transport unavailable"));
        };

        let mut observer = SessionUploadObserver {
            shared: &self.shared,
        };
        let result = LineUploader::new(transport, &self.config.upload, &mut observer, cancel)
            .run(&file_name, &lines)
            .await;
        guard.armed = false;

        match result {
            Ok(summary) => {
                self.shared
                    .publish(SessionEvent::Upload(UploadEvent::Finished {
                        file_name: summary.file_name.clone(),
                        lines: summary.lines,
                        resends: summary.resends,
                        failed_lines: summary.failed_lines.len(),
                        elapsed: summary.elapsed,
                    }));
                Ok(summary)
            }
            Err(error) => {
                self.shared
                    .publish(SessionEvent::Upload(UploadEvent::Aborted {
                        file_name,
                        reason: error.to_string(),
                    }));
                if error.is_link_fatal() {
                    if let Some(transport) = guard.transport() {
                        transport.close().await;
                    }
                    drop(guard);
                    self.shared.fail_link(&error);
                } else {
                    drop(guard);
                    self.shared.report("UPLOAD_FAILED", &error);
                }
                Err(error)
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(task) = self.poll_task.get_mut().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("port", &self.params.port)
            .field("state", &self.link_state())
            .finish()
    }
}

async fn wait_for_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// Read whatever the link has buffered and route it.
///
/// A tick is skipped while an upload holds the transport.
async fn poll_once(shared: &Shared) -> Result<()> {
    let chunk = {
        let Ok(mut transport) = shared.transport.try_lock() else {
            return Ok(());
        };
        if !transport.is_readable()? {
            return Ok(());
        }
        transport.read_available().await?
    };
    if !chunk.is_empty() {
        shared.ingest_text(&chunk);
    }
    Ok(())
}

async fn run_poll_loop(
    shared: Arc<Shared>,
    interval: Duration,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::debug!("Poll loop started for {}", shared.port);

    loop {
        let busy_deadline = shared.state.lock().busy.deadline();
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                if let Err(error) = poll_once(&shared).await {
                    if error.is_link_fatal() {
                        shared.transport.lock().await.close().await;
                        shared.fail_link(&error);
                        break;
                    }
                    shared.report("POLL_FAILED", &error);
                }
            }
            _ = wait_for_deadline(busy_deadline) => shared.expire_busy(),
        }
    }

    tracing::debug!("Poll loop stopped for {}", shared.port);
}
