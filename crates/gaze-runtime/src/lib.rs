//! Orchestration core of gaze-rt.
//!
//! Four subsystems coordinate around the session lifecycle:
//!
//! - [`registry::PluginRegistry`] discovers plugin artifacts and hands out
//!   shared [`plugin::Plugin`] handles.
//! - [`pipeline::PipelineRuntime`] owns the source → calibration → filter →
//!   stages → sinks chain and the one worker pulling samples through it.
//! - [`graphics`] owns the display window and the render loop; everything
//!   other threads may touch lives in [`graphics::GraphicsShared`].
//! - [`protocol::ProtocolOrchestrator`] drives the session state machine,
//!   task hand-off and per-task persistence.
//!
//! [`broadcast::BroadcastHub`] feeds lifecycle events to the publish socket
//! without ever blocking the emitting subsystem.

pub mod broadcast;
pub mod graphics;
pub mod pipeline;
pub mod plugin;
pub mod protocol;
pub mod registry;

pub use broadcast::BroadcastHub;
pub use pipeline::{ChainConfig, PipelineRuntime};
pub use plugin::Plugin;
pub use protocol::{ProtocolHandle, ProtocolOrchestrator};
pub use registry::PluginRegistry;
