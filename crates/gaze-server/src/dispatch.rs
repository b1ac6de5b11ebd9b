//! Request dispatch: one typed response for every external request.

use std::sync::Arc;

use gaze_core::messages::{
    CurrentTaskPayload, PipelineConfigRequest, Pong, Request, Response, ResourceCode,
    RuntimeStatePayload,
};
use gaze_core::{GazeError, GazeResult};
use gaze_plugin_api::Capability;
use gaze_runtime::graphics::GraphicsShared;
use gaze_runtime::{ChainConfig, PipelineRuntime, PluginRegistry, ProtocolHandle};
use serde::Serialize;
use tracing::warn;

pub struct Dispatcher {
    registry: Arc<PluginRegistry>,
    pipeline: Arc<PipelineRuntime>,
    graphics: Arc<GraphicsShared>,
    protocol: ProtocolHandle,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<PluginRegistry>,
        pipeline: Arc<PipelineRuntime>,
        graphics: Arc<GraphicsShared>,
        protocol: ProtocolHandle,
    ) -> Self {
        Self {
            registry,
            pipeline,
            graphics,
            protocol,
        }
    }

    /// Match the request tag and produce its response. Never panics, never
    /// drops a request silently.
    pub async fn dispatch(&self, request: Request) -> Response {
        match self.try_dispatch(request).await {
            Ok(response) => response,
            Err(err) => Response::from_error(&err),
        }
    }

    async fn try_dispatch(&self, request: Request) -> GazeResult<Response> {
        match request {
            Request::Ping(ping) => payload_response(&Pong {
                timestamp: ping.timestamp,
            }),

            Request::GraphicsSettings(settings) => {
                let receiver = self.graphics.apply_graphics_settings(settings);
                receiver
                    .await
                    .map_err(|_| GazeError::Busy("graphics runtime unavailable".into()))??;
                Ok(Response::empty_ok())
            }

            Request::Protocol(protocol) => {
                // Unresolvable task names are accepted with a warning; the
                // orchestrator ends the session cleanly if they are still
                // missing at load time.
                for task in &protocol.tasks {
                    if self.registry.get(&task.name).is_err() {
                        warn!("protocol references unknown task plugin \"{}\"", task.name);
                    }
                }
                self.protocol.set_protocol(protocol)?;
                Ok(Response::empty_ok())
            }

            Request::PipelineConfig(config) => {
                let chain = self.resolve_chain(config)?;
                self.pipeline.configure(chain);
                Ok(Response::empty_ok())
            }

            Request::Command { command } => {
                // The future resolves once the orchestrator has handled the
                // command; commands in the wrong state are ignored there.
                let _ = self.protocol.enqueue_command(command).await;
                Ok(Response::empty_ok())
            }

            Request::Resource { resource_code } => self.resource(resource_code),
        }
    }

    /// Every plugin named in a pipeline configuration must resolve at the
    /// instant of reconfiguration.
    fn resolve_chain(&self, config: PipelineConfigRequest) -> GazeResult<ChainConfig> {
        let mut chain = ChainConfig {
            source: Some(self.registry.get(&config.source)?),
            ..ChainConfig::default()
        };
        if let Some(name) = &config.calibration {
            chain.calibration = Some(self.registry.get(name)?);
        }
        if let Some(name) = &config.filter {
            chain.filter = Some(self.registry.get(name)?);
        }
        for name in &config.stages {
            chain.stages.push(self.registry.get(name)?);
        }
        for name in &config.sinks {
            chain.sinks.push(self.registry.get(name)?);
        }
        Ok(chain)
    }

    fn resource(&self, code: ResourceCode) -> GazeResult<Response> {
        match code {
            ResourceCode::RuntimeState => payload_response(&RuntimeStatePayload {
                state: self.protocol.runtime_state(),
            }),
            ResourceCode::AvailableMonitors => payload_response(&self.graphics.monitors()),
            ResourceCode::AvailableSources => {
                payload_response(&self.registry.plugin_infos(Capability::Source))
            }
            ResourceCode::AvailableStages => {
                payload_response(&self.registry.plugin_infos(Capability::Stage))
            }
            ResourceCode::AvailableSinks => {
                payload_response(&self.registry.plugin_infos(Capability::Sink))
            }
            ResourceCode::AvailableTasks => {
                payload_response(&self.registry.plugin_infos(Capability::Render))
            }
            ResourceCode::AvailableCalibrations => {
                payload_response(&self.registry.plugin_infos(Capability::Calibration))
            }
            ResourceCode::AvailableFilters => {
                payload_response(&self.registry.plugin_infos(Capability::Filter))
            }
            ResourceCode::CurrentGraphicsSettings => {
                payload_response(&self.graphics.current_settings())
            }
            ResourceCode::CurrentProtocol => payload_response(&self.protocol.current_protocol()),
            ResourceCode::CurrentTask => {
                let current: CurrentTaskPayload = self.protocol.current_task();
                payload_response(&current)
            }
        }
    }
}

fn payload_response<T: Serialize>(payload: &T) -> GazeResult<Response> {
    Ok(Response::ok(serde_json::to_string(payload)?))
}
