//! Headless session tests for the protocol orchestrator.
//!
//! There is no window here: a mailbox-servicing thread stands in for the
//! render loop, and the graphics surface is marked ready by hand. Everything
//! else — pipeline, persistence, broadcast ordering — is the real thing.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use gaze_core::messages::{
    BroadcastMessage, BroadcastTopic, Command, ProtocolEvent, ProtocolEventMessage,
    ProtocolRequest, RuntimeState, Task,
};
use gaze_runtime::graphics::GraphicsShared;
use gaze_runtime::protocol::PersistenceSettings;
use gaze_runtime::{
    BroadcastHub, ChainConfig, PipelineRuntime, PluginRegistry, ProtocolOrchestrator,
};
use tokio::sync::mpsc;

use common::*;

struct Harness {
    registry: Arc<PluginRegistry>,
    pipeline: Arc<PipelineRuntime>,
    graphics: Arc<GraphicsShared>,
    orchestrator: Option<ProtocolOrchestrator>,
    broadcast_rx: mpsc::Receiver<BroadcastMessage>,
    render_stop: Arc<AtomicBool>,
    render_thread: Option<JoinHandle<()>>,
    _data_dir: tempfile::TempDir,
    data_path: std::path::PathBuf,
}

impl Harness {
    fn start() -> Self {
        let registry = Arc::new(PluginRegistry::new());
        let pipeline = Arc::new(PipelineRuntime::new());
        pipeline.init();

        let graphics = Arc::new(GraphicsShared::new());
        graphics.mark_ready();

        let (broadcast, broadcast_rx) = BroadcastHub::channel();
        let data_dir = tempfile::tempdir().unwrap();
        let data_path = data_dir.path().to_path_buf();
        let orchestrator = ProtocolOrchestrator::spawn(
            registry.clone(),
            pipeline.clone(),
            graphics.clone(),
            broadcast,
            PersistenceSettings {
                data_dir: data_path.clone(),
                writer_queue_capacity: 1024,
            },
        );

        // Stand-in for the render loop: service the task mailbox until told
        // to stop.
        let render_stop = Arc::new(AtomicBool::new(false));
        let render_thread = {
            let graphics = graphics.clone();
            let stop = render_stop.clone();
            std::thread::spawn(move || {
                let mut current = None;
                while !stop.load(Ordering::Acquire) {
                    graphics.service_mailbox(&mut current);
                    std::thread::sleep(Duration::from_millis(2));
                }
            })
        };

        Self {
            registry,
            pipeline,
            graphics,
            orchestrator: Some(orchestrator),
            broadcast_rx,
            render_stop,
            render_thread: Some(render_thread),
            _data_dir: data_dir,
            data_path,
        }
    }

    fn protocol(&self, tasks: &[&str]) -> ProtocolRequest {
        ProtocolRequest {
            name: "integration".into(),
            participant_id: "p01".into(),
            tasks: tasks
                .iter()
                .map(|name| Task {
                    name: name.to_string(),
                    configuration: String::new(),
                })
                .collect(),
            ..ProtocolRequest::default()
        }
    }

    fn send(&self, command: Command) {
        let handle = self.orchestrator.as_ref().unwrap().handle();
        let _ = handle.enqueue_command(command);
    }

    fn wait_for_state(&self, state: RuntimeState) -> bool {
        let handle = self.orchestrator.as_ref().unwrap().handle();
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if handle.runtime_state() == state {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    /// Next PROTOCOL-topic event, skipping LOG traffic.
    fn next_event(&mut self) -> Option<ProtocolEventMessage> {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            match self.broadcast_rx.try_recv() {
                Ok(BroadcastMessage {
                    topic: BroadcastTopic::Protocol,
                    payload,
                }) => return serde_json::from_str(&payload).ok(),
                Ok(_) => continue,
                Err(_) => std::thread::sleep(Duration::from_millis(5)),
            }
        }
        None
    }

    fn finish(mut self) -> Vec<ProtocolEventMessage> {
        let mut events = Vec::new();
        while let Ok(message) = self.broadcast_rx.try_recv() {
            if message.topic == BroadcastTopic::Protocol {
                if let Ok(event) = serde_json::from_str(&message.payload) {
                    events.push(event);
                }
            }
        }
        if let Some(orchestrator) = self.orchestrator.take() {
            orchestrator.shutdown();
        }
        self.render_stop.store(true, Ordering::Release);
        if let Some(thread) = self.render_thread.take() {
            let _ = thread.join();
        }
        self.pipeline.shutdown();
        events
    }
}

#[test]
fn protocol_then_start_then_stop_runs_one_task() {
    let mut harness = Harness::start();
    let (task, probe) = MockTask::plugin("dummy_task");
    harness.registry.register(task);

    // Feed the pipeline from a scripted source so the task and the writer
    // both see samples.
    let (source, queue) = ScriptedSource::plugin("scripted_source");
    harness.pipeline.configure(ChainConfig {
        source: Some(source),
        ..ChainConfig::default()
    });

    let handle = harness.orchestrator.as_ref().unwrap().handle();
    handle.set_protocol(harness.protocol(&["dummy_task"])).unwrap();
    assert!(harness.wait_for_state(RuntimeState::Standby));
    let loaded = harness.next_event().unwrap();
    assert_eq!(loaded.event, Some(ProtocolEvent::ProtocolLoaded));
    assert_eq!(loaded.protocol_name, "integration");

    harness.send(Command::Start);
    let new_run = harness.next_event().unwrap();
    assert_eq!(new_run.event, Some(ProtocolEvent::ProtocolNew));
    assert!(!new_run.protocol_uuid.is_empty());
    assert!(new_run.file_path.ends_with(".h5"));
    let run_uuid = new_run.protocol_uuid.clone();

    let started = harness.next_event().unwrap();
    assert_eq!(started.event, Some(ProtocolEvent::TaskStart));
    assert_eq!(started.data, 0);
    assert_eq!(started.protocol_uuid, run_uuid);
    assert!(harness.wait_for_state(RuntimeState::Running));

    // The plugin was initialized (on the mailbox-servicing thread) and is
    // registered as a sink: samples reach it and the persistence writer.
    let deadline = Instant::now() + Duration::from_secs(2);
    while !probe.inited.load(Ordering::SeqCst) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(probe.inited.load(Ordering::SeqCst));
    for t in 0..50 {
        queue.push(sample_at(t));
    }
    let deadline = Instant::now() + Duration::from_secs(2);
    while probe.samples.lock().len() < 50 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(probe.samples.lock().len(), 50);
    // Let the in-flight fan-out reach the writer before tearing it down.
    std::thread::sleep(Duration::from_millis(50));

    harness.send(Command::Stop);
    let ended = harness.next_event().unwrap();
    assert_eq!(ended.event, Some(ProtocolEvent::TaskEnd));
    assert_eq!(ended.data, 0);
    assert!(harness.wait_for_state(RuntimeState::Standby));
    assert!(probe.shutdown_called.load(Ordering::SeqCst));

    // One group, one non-empty dataset, samples in admission order. The
    // session file is closed by the save sequence, so it is readable here.
    let session_path = harness.data_path.join(format!("{run_uuid}.h5"));
    assert!(session_path.exists());
    let file = hdf5_open(&session_path);
    let timestamps = read_timestamps(&file, "task_000/eye_data");
    assert_eq!(timestamps.len(), 50);
    assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
    drop(file);

    harness.finish();
}

#[test]
fn finished_task_auto_advances_and_ends_exactly_once() {
    let mut harness = Harness::start();
    let (task, probe) = MockTask::plugin("self_ending");
    harness.registry.register(task);

    let handle = harness.orchestrator.as_ref().unwrap().handle();
    handle.set_protocol(harness.protocol(&["self_ending"])).unwrap();
    assert!(harness.wait_for_state(RuntimeState::Standby));

    harness.send(Command::Start);
    assert!(harness.wait_for_state(RuntimeState::Running));

    // Wait until the mailbox install ran; it clears the finished flag.
    let deadline = Instant::now() + Duration::from_secs(2);
    while !probe.inited.load(Ordering::SeqCst) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(probe.inited.load(Ordering::SeqCst));

    // The render loop would set this when render() reports end-of-task.
    harness.graphics.set_task_finished();

    // Only one task: the auto-issued NEXT finishes the session.
    assert!(harness.wait_for_state(RuntimeState::Standby));

    let events = harness.finish();
    let ends = events
        .iter()
        .filter(|e| e.event == Some(ProtocolEvent::TaskEnd))
        .count();
    let starts = events
        .iter()
        .filter(|e| e.event == Some(ProtocolEvent::TaskStart))
        .count();
    assert_eq!(starts, 1);
    assert_eq!(ends, 1);
}

#[test]
fn unknown_task_plugin_ends_the_session_without_task_start() {
    let mut harness = Harness::start();

    let handle = harness.orchestrator.as_ref().unwrap().handle();
    // The protocol is accepted even though the plugin does not exist.
    handle.set_protocol(harness.protocol(&["does_not_exist"])).unwrap();
    assert!(harness.wait_for_state(RuntimeState::Standby));
    let loaded = harness.next_event().unwrap();
    assert_eq!(loaded.event, Some(ProtocolEvent::ProtocolLoaded));

    harness.send(Command::Start);
    let new_run = harness.next_event().unwrap();
    assert_eq!(new_run.event, Some(ProtocolEvent::ProtocolNew));
    assert!(harness.wait_for_state(RuntimeState::Standby));

    let events = harness.finish();
    assert!(events
        .iter()
        .all(|e| e.event != Some(ProtocolEvent::TaskStart)));
}

#[test]
fn set_protocol_is_rejected_while_running() {
    let mut harness = Harness::start();
    let (task, _probe) = MockTask::plugin("long_task");
    harness.registry.register(task);

    let handle = harness.orchestrator.as_ref().unwrap().handle();
    handle.set_protocol(harness.protocol(&["long_task"])).unwrap();
    assert!(harness.wait_for_state(RuntimeState::Standby));
    harness.send(Command::Start);
    assert!(harness.wait_for_state(RuntimeState::Running));

    let result = handle.set_protocol(harness.protocol(&["long_task"]));
    assert!(matches!(result, Err(gaze_core::GazeError::Busy(_))));

    harness.send(Command::Exit);
    assert!(harness.wait_for_state(RuntimeState::Standby));
    let _ = harness.next_event();
    harness.finish();
}

#[test]
fn next_on_last_task_saves_and_previous_at_zero_stays() {
    let mut harness = Harness::start();
    let (first, first_probe) = MockTask::plugin("first_task");
    let (second, _second_probe) = MockTask::plugin("second_task");
    harness.registry.register(first);
    harness.registry.register(second);

    let handle = harness.orchestrator.as_ref().unwrap().handle();
    handle
        .set_protocol(harness.protocol(&["first_task", "second_task"]))
        .unwrap();
    assert!(harness.wait_for_state(RuntimeState::Standby));

    harness.send(Command::Start);
    assert!(harness.wait_for_state(RuntimeState::Running));
    assert_eq!(handle.current_task().index, Some(0));

    // PREVIOUS at index 0 leaves the task untouched.
    harness.send(Command::Previous);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(handle.current_task().index, Some(0));
    assert!(!first_probe.shutdown_called.load(Ordering::SeqCst));

    harness.send(Command::Next);
    let deadline = Instant::now() + Duration::from_secs(2);
    while handle.current_task().index != Some(1) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(handle.current_task().index, Some(1));

    // NEXT past the last task ends the session.
    harness.send(Command::Next);
    assert!(harness.wait_for_state(RuntimeState::Standby));

    let events = harness.finish();
    let starts: Vec<u64> = events
        .iter()
        .filter(|e| e.event == Some(ProtocolEvent::TaskStart))
        .map(|e| e.data)
        .collect();
    let ends: Vec<u64> = events
        .iter()
        .filter(|e| e.event == Some(ProtocolEvent::TaskEnd))
        .map(|e| e.data)
        .collect();
    assert_eq!(starts, vec![0, 1]);
    assert_eq!(ends, vec![0, 1]);
}

#[test]
fn start_from_standby_screen_key_press() {
    let mut harness = Harness::start();
    let (task, _probe) = MockTask::plugin("key_task");
    harness.registry.register(task);

    let handle = harness.orchestrator.as_ref().unwrap().handle();
    handle.set_protocol(harness.protocol(&["key_task"])).unwrap();
    assert!(harness.wait_for_state(RuntimeState::Standby));
    assert_eq!(harness.graphics.standby_info().as_deref(), Some("integration"));

    // The render loop raises this when S is pressed on the standby screen.
    harness.graphics.raise_start_request();
    assert!(harness.wait_for_state(RuntimeState::Running));

    harness.send(Command::Exit);
    harness.finish();
}

fn hdf5_open(path: &std::path::Path) -> hdf5::File {
    hdf5::File::open(path).expect("session file should be readable")
}

fn read_timestamps(file: &hdf5::File, dataset: &str) -> Vec<u64> {
    let records: Vec<gaze_storage::EyeSampleRecord> =
        file.dataset(dataset).unwrap().read_raw().unwrap();
    records.iter().map(|r| r.timestamp).collect()
}
