//! Wire message types for the control plane.
//!
//! One request/response envelope on the reply socket, one broadcast envelope
//! on the publish socket, both JSON. Requests are a tagged union keyed by
//! `type`; responses always carry `success`, `error_code`, `error_message`
//! and a request-specific JSON `payload` string. Runtime states and protocol
//! events travel as their numeric wire values.

use serde::{Deserialize, Serialize};

use crate::error::GazeError;

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    pub timestamp: u64,
}

/// Session commands accepted by the protocol orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Start,
    Stop,
    Next,
    Previous,
    Restart,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphicsSettings {
    pub monitor_index: i32,
    pub vsync: bool,
    pub full_screen: bool,
    pub anti_aliasing: bool,
    pub target_fps: u32,
    pub width: i32,
    pub height: i32,
}

impl Default for GraphicsSettings {
    fn default() -> Self {
        Self {
            monitor_index: 0,
            vsync: true,
            full_screen: false,
            anti_aliasing: false,
            target_fps: 60,
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphicsSettingsRequest {
    pub graphics_settings: GraphicsSettings,
    pub view_distance_mm: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorInfo {
    pub index: i32,
    pub width_px: i32,
    pub height_px: i32,
    pub width_mm: i32,
    pub height_mm: i32,
    pub refresh_rate: i32,
    pub name: String,
}

/// One unit of protocol progression: a render-capable plugin plus its opaque
/// JSON configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    #[serde(default)]
    pub configuration: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolRequest {
    pub name: String,
    #[serde(default)]
    pub participant_id: String,
    #[serde(default)]
    pub notes: String,
    pub tasks: Vec<Task>,
    /// Filled by the server when a run starts; a client-supplied value is
    /// replaced.
    #[serde(default)]
    pub protocol_uuid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfigRequest {
    pub source: String,
    #[serde(default)]
    pub calibration: Option<String>,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub stages: Vec<String>,
    #[serde(default)]
    pub sinks: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceCode {
    RuntimeState,
    AvailableMonitors,
    AvailableSources,
    AvailableStages,
    AvailableSinks,
    AvailableTasks,
    AvailableCalibrations,
    AvailableFilters,
    CurrentGraphicsSettings,
    CurrentProtocol,
    CurrentTask,
}

/// The tagged union arriving on the reply socket, one JSON document per
/// request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    Ping(Ping),
    GraphicsSettings(GraphicsSettingsRequest),
    Protocol(ProtocolRequest),
    PipelineConfig(PipelineConfigRequest),
    Command { command: Command },
    Resource { resource_code: ResourceCode },
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    pub error_code: i32,
    pub error_message: String,
    /// Request-specific JSON document; empty when there is nothing to return.
    pub payload: String,
}

impl Response {
    pub fn ok(payload: String) -> Self {
        Self {
            success: true,
            error_code: 0,
            error_message: String::new(),
            payload,
        }
    }

    pub fn empty_ok() -> Self {
        Self::ok(String::new())
    }

    pub fn from_error(err: &GazeError) -> Self {
        Self {
            success: false,
            error_code: err.wire_code(),
            error_message: err.to_string(),
            payload: String::new(),
        }
    }
}

/// Wire values for the runtime state resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RuntimeState {
    Default = 0,
    Standby = 1,
    Running = 2,
    Saving = 3,
}

impl From<RuntimeState> for u8 {
    fn from(state: RuntimeState) -> u8 {
        state as u8
    }
}

impl TryFrom<u8> for RuntimeState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RuntimeState::Default),
            1 => Ok(RuntimeState::Standby),
            2 => Ok(RuntimeState::Running),
            3 => Ok(RuntimeState::Saving),
            other => Err(format!("invalid runtime state: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeStatePayload {
    pub state: RuntimeState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentTaskPayload {
    pub index: Option<usize>,
    pub name: Option<String>,
}

/// Listing entry for `AVAILABLE_*` plugin resources. Schema and default are
/// only present for plugins exposing the Configurable capability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: u32,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub configuration_schema: String,
    #[serde(default)]
    pub default_configuration: String,
}

// =============================================================================
// Broadcasts
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BroadcastTopic {
    Log,
    Protocol,
}

/// Wire values for session lifecycle events on the `PROTOCOL` topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ProtocolEvent {
    GraphicsReady = 0,
    ProtocolNew = 1,
    TaskStart = 2,
    TaskEnd = 3,
    ProtocolLoaded = 4,
}

impl From<ProtocolEvent> for u8 {
    fn from(event: ProtocolEvent) -> u8 {
        event as u8
    }
}

impl TryFrom<u8> for ProtocolEvent {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ProtocolEvent::GraphicsReady),
            1 => Ok(ProtocolEvent::ProtocolNew),
            2 => Ok(ProtocolEvent::TaskStart),
            3 => Ok(ProtocolEvent::TaskEnd),
            4 => Ok(ProtocolEvent::ProtocolLoaded),
            other => Err(format!("invalid protocol event: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolEventMessage {
    pub protocol_uuid: String,
    pub event: Option<ProtocolEvent>,
    /// Event-specific datum; the task index for TASK_START and TASK_END.
    #[serde(default)]
    pub data: u64,
    #[serde(default)]
    pub protocol_name: String,
    #[serde(default)]
    pub participant_id: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub file_path: String,
}

impl ProtocolEventMessage {
    pub fn new(protocol_uuid: impl Into<String>, event: ProtocolEvent, data: u64) -> Self {
        Self {
            protocol_uuid: protocol_uuid.into(),
            event: Some(event),
            data,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub topic: BroadcastTopic,
    /// JSON document; a [`ProtocolEventMessage`] on the `PROTOCOL` topic.
    pub payload: String,
}
