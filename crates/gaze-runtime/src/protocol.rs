//! Protocol orchestrator: the session state machine.
//!
//! One worker drives IDLE → STANDBY → RUNNING → SAVING, assembles per-task
//! resources (persistence group, writer sink, task sink) and hands task
//! plugins to the render thread. All cross-thread traffic goes through the
//! command queue, the graphics shared surface and the broadcast hub; nothing
//! here may block the renderer for more than a frame.
//!
//! Ordering the rest of the system relies on:
//! - `TASK_END(i)` is broadcast after task i's sink is removed and before any
//!   resource of task i+1 is created.
//! - `TASK_START(i)` is broadcast after the task sink is installed and before
//!   the plugin reaches the render thread's mailbox, hence before its first
//!   frame.
//! - Task plugin `init`/`reset`/`shutdown` run on the render thread via the
//!   mailbox hand-off.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use gaze_core::messages::{
    Command, CurrentTaskPayload, ProtocolEvent, ProtocolEventMessage, ProtocolRequest,
    RuntimeState,
};
use gaze_core::{GazeError, GazeResult};
use gaze_storage::{SampleWriter, SessionFile, SessionMetadata, TaskGroup};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::broadcast::BroadcastHub;
use crate::graphics::GraphicsShared;
use crate::pipeline::PipelineRuntime;
use crate::plugin::Plugin;
use crate::registry::PluginRegistry;

/// Tick while a task is rendering; roughly render-rate granularity.
const RUNNING_TICK: Duration = Duration::from_millis(16);
/// Tick while idle or on standby.
const IDLE_TICK: Duration = Duration::from_millis(50);

/// Where session files go and how deep the writer queue is.
#[derive(Debug, Clone)]
pub struct PersistenceSettings {
    pub data_dir: PathBuf,
    pub writer_queue_capacity: usize,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            data_dir: std::env::temp_dir(),
            writer_queue_capacity: 8192,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrchState {
    Idle = 0,
    Standby = 1,
    Running = 2,
    Saving = 3,
}

impl OrchState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => OrchState::Standby,
            2 => OrchState::Running,
            3 => OrchState::Saving,
            _ => OrchState::Idle,
        }
    }
}

enum LoadCommand {
    First,
    Next,
    Prev,
    Finish,
}

struct CommandEnvelope {
    command: Command,
    reply: Option<oneshot::Sender<()>>,
}

struct OrchestratorShared {
    state: AtomicU8,
    protocol: Mutex<Option<ProtocolRequest>>,
    protocol_updated: AtomicBool,
    current_task: Mutex<CurrentTaskPayload>,
}

/// Cloneable surface for the control plane.
#[derive(Clone)]
pub struct ProtocolHandle {
    shared: Arc<OrchestratorShared>,
    graphics: Arc<GraphicsShared>,
    cmd_tx: Sender<CommandEnvelope>,
}

impl ProtocolHandle {
    /// Adopt a protocol. Task names are not resolved here; a task that does
    /// not exist fails its load and ends the session cleanly instead.
    pub fn set_protocol(&self, protocol: ProtocolRequest) -> GazeResult<()> {
        if self.orch_state() == OrchState::Running {
            return Err(GazeError::Busy(
                "protocol cannot be replaced while a session is running".into(),
            ));
        }
        info!("Set protocol to \"{}\"", protocol.name);
        *self.shared.protocol.lock() = Some(protocol);
        self.shared.protocol_updated.store(true, Ordering::Release);
        Ok(())
    }

    /// Queue a session command. The returned future resolves once the worker
    /// has handled (or ignored) it.
    pub fn enqueue_command(&self, command: Command) -> oneshot::Receiver<()> {
        let (reply, receiver) = oneshot::channel();
        let envelope = CommandEnvelope {
            command,
            reply: Some(reply),
        };
        if self.cmd_tx.send(envelope).is_err() {
            warn!("orchestrator is gone, dropping command {command:?}");
        }
        receiver
    }

    pub fn runtime_state(&self) -> RuntimeState {
        match self.orch_state() {
            OrchState::Idle => {
                if self.graphics.is_ready() {
                    RuntimeState::Standby
                } else {
                    RuntimeState::Default
                }
            }
            OrchState::Standby => RuntimeState::Standby,
            OrchState::Running => RuntimeState::Running,
            OrchState::Saving => RuntimeState::Saving,
        }
    }

    pub fn current_protocol(&self) -> Option<ProtocolRequest> {
        self.shared.protocol.lock().clone()
    }

    pub fn current_task(&self) -> CurrentTaskPayload {
        self.shared.current_task.lock().clone()
    }

    fn orch_state(&self) -> OrchState {
        OrchState::from_u8(self.shared.state.load(Ordering::Acquire))
    }
}

pub struct ProtocolOrchestrator {
    handle: ProtocolHandle,
    worker: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl ProtocolOrchestrator {
    pub fn spawn(
        registry: Arc<PluginRegistry>,
        pipeline: Arc<PipelineRuntime>,
        graphics: Arc<GraphicsShared>,
        broadcast: BroadcastHub,
        persistence: PersistenceSettings,
    ) -> Self {
        let shared = Arc::new(OrchestratorShared {
            state: AtomicU8::new(OrchState::Idle as u8),
            protocol: Mutex::new(None),
            protocol_updated: AtomicBool::new(false),
            current_task: Mutex::new(CurrentTaskPayload::default()),
        });
        let (cmd_tx, cmd_rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));

        let handle = ProtocolHandle {
            shared: shared.clone(),
            graphics: graphics.clone(),
            cmd_tx: cmd_tx.clone(),
        };

        let mut worker = Worker {
            shared,
            stop: stop.clone(),
            cmd_rx,
            cmd_tx,
            registry,
            pipeline,
            graphics,
            broadcast,
            persistence,
            session: None,
            group: None,
            writer: None,
            current_task: None,
            current_index: 0,
        };
        let join = std::thread::Builder::new()
            .name("protocol".into())
            .spawn(move || worker.run())
            .expect("failed to spawn protocol worker");

        Self {
            handle,
            worker: Some(join),
            stop,
        }
    }

    pub fn handle(&self) -> ProtocolHandle {
        self.handle.clone()
    }

    /// Stop the worker and join it. Any open session is closed on the way
    /// out.
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("protocol worker panicked");
            }
        }
    }
}

struct Worker {
    shared: Arc<OrchestratorShared>,
    stop: Arc<AtomicBool>,
    cmd_rx: Receiver<CommandEnvelope>,
    cmd_tx: Sender<CommandEnvelope>,
    registry: Arc<PluginRegistry>,
    pipeline: Arc<PipelineRuntime>,
    graphics: Arc<GraphicsShared>,
    broadcast: BroadcastHub,
    persistence: PersistenceSettings,
    session: Option<SessionFile>,
    group: Option<TaskGroup>,
    writer: Option<SampleWriter>,
    current_task: Option<Plugin>,
    current_index: usize,
}

impl Worker {
    fn run(&mut self) {
        info!("Protocol orchestrator started");
        while !self.stop.load(Ordering::Acquire) {
            let tick = if self.state() == OrchState::Running {
                RUNNING_TICK
            } else {
                IDLE_TICK
            };
            match self.cmd_rx.recv_timeout(tick) {
                Ok(envelope) => self.handle_command(envelope),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            match self.state() {
                OrchState::Idle => {
                    // Adoption of a protocol is gated on graphics init.
                    if self.protocol_pending() && self.graphics.is_ready() {
                        self.load_protocol();
                    }
                }
                OrchState::Standby => {
                    if self.protocol_pending() {
                        self.load_protocol();
                    }
                    if self.graphics.consume_start_request() {
                        self.enqueue_self(Command::Start);
                    }
                }
                OrchState::Running => {
                    if self.graphics.take_task_finished() {
                        self.enqueue_self(Command::Next);
                    }
                }
                OrchState::Saving => self.save_sequence(),
            }
        }

        // Leave nothing half-open behind us.
        if self.current_task.is_some() {
            self.cleanup_current_task();
        }
        self.close_session();
        info!("Protocol orchestrator stopped");
    }

    fn handle_command(&mut self, envelope: CommandEnvelope) {
        let state = self.state();
        debug!("command {:?} in state {state:?}", envelope.command);
        match envelope.command {
            Command::Start if state == OrchState::Standby => self.start_protocol(),
            Command::Stop if state == OrchState::Running => self.load_task(LoadCommand::Finish),
            Command::Next if state == OrchState::Running => self.load_task(LoadCommand::Next),
            Command::Previous if state == OrchState::Running => {
                if self.current_index > 0 {
                    self.load_task(LoadCommand::Prev);
                }
            }
            Command::Restart if state == OrchState::Running => self.load_task(LoadCommand::First),
            Command::Exit => {
                if self.state() == OrchState::Running {
                    self.load_task(LoadCommand::Finish);
                }
                if self.state() == OrchState::Saving {
                    self.save_sequence();
                }
                self.graphics.request_stop();
                self.stop.store(true, Ordering::Release);
            }
            other => debug!("ignoring command {other:?} in state {state:?}"),
        }
        if let Some(reply) = envelope.reply {
            let _ = reply.send(());
        }
    }

    /// Mint the run UUID, open the session file, announce the run and load
    /// the first task.
    fn start_protocol(&mut self) {
        let run_uuid = Uuid::new_v4().to_string();
        let protocol = {
            let mut guard = self.shared.protocol.lock();
            let Some(protocol) = guard.as_mut() else {
                return;
            };
            protocol.protocol_uuid = run_uuid.clone();
            protocol.clone()
        };
        info!("Starting protocol \"{}\" run {run_uuid}", protocol.name);

        let meta = SessionMetadata {
            protocol_name: protocol.name.clone(),
            participant_id: protocol.participant_id.clone(),
            notes: protocol.notes.clone(),
        };
        let session = match SessionFile::create(&self.persistence.data_dir, &run_uuid, &meta) {
            Ok(session) => session,
            Err(err) => {
                error!("failed to create session file: {err}");
                return;
            }
        };

        self.broadcast.protocol_event(ProtocolEventMessage {
            protocol_name: protocol.name.clone(),
            participant_id: protocol.participant_id.clone(),
            notes: protocol.notes.clone(),
            tasks: protocol.tasks.clone(),
            file_path: session.path().display().to_string(),
            ..ProtocolEventMessage::new(run_uuid, ProtocolEvent::ProtocolNew, 0)
        });
        self.session = Some(session);

        self.load_task(LoadCommand::First);
    }

    /// The task hand-off. Tears the previous task down, computes the next
    /// index, assembles persistence and sinks, and hands the plugin to the
    /// render thread.
    fn load_task(&mut self, command: LoadCommand) {
        let Some(protocol) = self.shared.protocol.lock().clone() else {
            return;
        };
        let run_uuid = protocol.protocol_uuid.clone();

        if self.current_task.is_some() {
            self.cleanup_current_task();
        }

        let next_index = match command {
            LoadCommand::First => 0,
            LoadCommand::Next => self.current_index + 1,
            LoadCommand::Prev => self.current_index.saturating_sub(1),
            LoadCommand::Finish => protocol.tasks.len(),
        };
        if next_index >= protocol.tasks.len() {
            self.set_state(OrchState::Saving);
            return;
        }

        let task = &protocol.tasks[next_index];
        info!("Loading task {next_index} \"{}\"", task.name);
        let plugin = match self.registry.get(&task.name) {
            Ok(plugin) => plugin,
            Err(err) => {
                error!("failed to load task \"{}\": {err}", task.name);
                self.set_state(OrchState::Saving);
                return;
            }
        };
        if plugin.as_render().is_none() {
            error!("task \"{}\" is not a render plugin", task.name);
            self.set_state(OrchState::Saving);
            return;
        }

        if !task.configuration.is_empty() {
            match plugin.as_configurable() {
                Some(configurable) => configurable.set_config(&task.configuration),
                None => warn!("task \"{}\" is not configurable, ignoring document", task.name),
            }
        }

        if let Some(session) = &self.session {
            match session.create_task_group(next_index) {
                Ok(group) => match SampleWriter::spawn(&group, self.persistence.writer_queue_capacity)
                {
                    Ok(writer) => {
                        self.group = Some(group);
                        self.writer = Some(writer);
                    }
                    Err(err) => error!("failed to start eye data writer: {err}"),
                },
                Err(err) => error!("failed to create task group: {err}"),
            }
        }

        // Sinks first, then the broadcast, then the mailbox: every sample the
        // task sees is also persisted, and TASK_START precedes the first
        // frame.
        self.pipeline.replace_sinks(std::slice::from_ref(&plugin));
        if let Some(writer) = &self.writer {
            self.pipeline.add_sink("eye_data_writer", writer.sink());
        }
        self.broadcast.protocol_event(ProtocolEventMessage::new(
            run_uuid,
            ProtocolEvent::TaskStart,
            next_index as u64,
        ));
        self.graphics.set_current_task(plugin.clone());

        self.current_task = Some(plugin);
        self.current_index = next_index;
        *self.shared.current_task.lock() = CurrentTaskPayload {
            index: Some(next_index),
            name: Some(task.name.clone()),
        };
        self.set_state(OrchState::Running);
    }

    /// Reverse of the install half of [`load_task`]: task sink out, writer
    /// drained, plugin reset and shut down on the render thread, TASK_END
    /// broadcast last.
    fn cleanup_current_task(&mut self) {
        self.pipeline.remove_sinks();
        if let Some(writer) = self.writer.take() {
            writer.stop();
        }
        self.group = None;

        if let Some(task) = self.current_task.take() {
            info!("Shutting down task \"{}\"", task.name());
            if self.graphics.stop_requested() {
                // The render loop is gone; the graphics shutdown path owns
                // the plugin teardown so it still happens under a valid GL
                // context.
                debug!("render loop stopped, deferring task shutdown to graphics");
            } else {
                self.graphics.retire_current_task();
            }

            let run_uuid = self
                .shared
                .protocol
                .lock()
                .as_ref()
                .map(|p| p.protocol_uuid.clone())
                .unwrap_or_default();
            self.broadcast.protocol_event(ProtocolEventMessage::new(
                run_uuid,
                ProtocolEvent::TaskEnd,
                self.current_index as u64,
            ));
        }
        *self.shared.current_task.lock() = CurrentTaskPayload::default();
    }

    fn save_sequence(&mut self) {
        info!("Saving session data");
        self.pipeline.remove_sinks();
        if let Some(writer) = self.writer.take() {
            writer.stop();
        }
        self.group = None;
        self.close_session();

        self.current_index = 0;
        *self.shared.current_task.lock() = CurrentTaskPayload::default();
        self.set_state(OrchState::Standby);
        self.broadcast.log("info", "saving complete");
        info!("Saving complete");
    }

    fn close_session(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Closed session file {}", session.path().display());
        }
    }

    /// Adopt the pending protocol: STANDBY, standby screen, PROTOCOL_LOADED.
    fn load_protocol(&mut self) {
        self.shared.protocol_updated.store(false, Ordering::Release);
        let Some(protocol) = self.shared.protocol.lock().clone() else {
            return;
        };

        self.set_state(OrchState::Standby);
        self.graphics.set_standby_info(&protocol.name);
        self.broadcast.protocol_event(ProtocolEventMessage {
            protocol_name: protocol.name.clone(),
            participant_id: protocol.participant_id.clone(),
            notes: protocol.notes.clone(),
            tasks: protocol.tasks.clone(),
            ..ProtocolEventMessage::new("", ProtocolEvent::ProtocolLoaded, 0)
        });
    }

    fn enqueue_self(&self, command: Command) {
        let _ = self.cmd_tx.send(CommandEnvelope {
            command,
            reply: None,
        });
    }

    fn protocol_pending(&self) -> bool {
        self.shared.protocol_updated.load(Ordering::Acquire)
    }

    fn state(&self) -> OrchState {
        OrchState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: OrchState) {
        debug!("state -> {state:?}");
        self.shared.state.store(state as u8, Ordering::Release);
    }
}
