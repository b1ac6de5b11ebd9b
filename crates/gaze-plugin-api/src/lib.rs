//! Plugin API for gaze-rt.
//!
//! A plugin is a dynamically loaded artifact exporting the four C-linkage
//! entry points declared in [`entry`]; the created instance is a
//! [`EyePlugin`] trait object queried for the capabilities it fills:
//!
//! - [`EyeSource`] produces the sample stream via a blocking, cancellable wait
//! - [`Calibration`] rewrites gaze fields from learned coefficients
//! - [`EyeFilter`] / [`EyeStage`] rewrite a sample in place
//! - [`EyeSink`] consumes samples
//! - [`TaskRender`] draws one frame per v-sync on the render thread
//! - [`Configurable`] accepts an opaque JSON configuration document
//!
//! The [`export_plugin!`] macro emits the entry points for a plugin crate;
//! [`ConfigSlot`] and [`SourceQueue`] cover the two fiddly parts most plugins
//! share (config parsing with silent revert, cancellable blocking output).

pub mod capability;
pub mod config;
pub mod entry;
pub mod queue;

pub use capability::{
    Calibration, Capability, Configurable, EyeFilter, EyePlugin, EyeSink, EyeSource, EyeStage,
    TaskRender,
};
pub use config::ConfigSlot;
pub use entry::{make_version, PluginInstance};
pub use queue::SourceQueue;

/// Re-exported so plugin crates draw with the same handle type the runtime
/// passes to [`TaskRender::render`].
pub use raylib::prelude::RaylibDrawHandle;
