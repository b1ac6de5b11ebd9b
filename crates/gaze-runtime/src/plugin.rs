//! Shared plugin handles.
//!
//! A [`Plugin`] is a cheap-clone, reference-counted handle over a plugin
//! instance and, for dynamically loaded plugins, the library that created it.
//! Dropping the last handle destroys the instance through the library's own
//! `destroy` entry point and only then unmaps the library — the declaration
//! order of [`PluginShared`]'s fields carries that guarantee.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gaze_plugin_api::entry::{PluginDestroyFn, PluginInstance};
use gaze_plugin_api::{
    Calibration, Capability, Configurable, EyeFilter, EyePlugin, EyeSink, EyeSource, EyeStage,
    TaskRender,
};
use gaze_core::GazeResult;
use libloading::Library;

/// Identity read from the plugin's metadata symbols.
#[derive(Debug, Clone, Default)]
pub struct PluginIdentity {
    pub name: String,
    pub version: u32,
    pub author: String,
    pub description: String,
}

#[derive(Clone)]
pub struct Plugin {
    shared: Arc<PluginShared>,
}

struct PluginShared {
    // Field order matters: the instance must be destroyed before the library
    // that owns its code is unmapped.
    instance: InstanceHandle,
    _library: Option<Library>,
    identity: PluginIdentity,
    path: Option<PathBuf>,
}

/// Owns the raw instance pointer and knows how to destroy it.
struct InstanceHandle {
    raw: *mut PluginInstance,
    destroy: Option<PluginDestroyFn>,
}

// The raw pointer targets a heap box whose payload is `Box<dyn EyePlugin>`,
// and `EyePlugin` requires Send + Sync.
unsafe impl Send for InstanceHandle {}
unsafe impl Sync for InstanceHandle {}

impl InstanceHandle {
    fn plugin(&self) -> &dyn EyePlugin {
        unsafe { (*self.raw).plugin.as_ref() }
    }
}

impl Drop for InstanceHandle {
    fn drop(&mut self) {
        unsafe {
            match self.destroy {
                Some(destroy) => destroy(self.raw),
                None => drop(Box::from_raw(self.raw)),
            }
        }
    }
}

impl Plugin {
    /// Wrap an in-process plugin instance. Used for built-in plugins and
    /// tests; dynamically loaded plugins come from the registry loader.
    pub fn from_boxed(name: impl Into<String>, version: u32, plugin: Box<dyn EyePlugin>) -> Self {
        let raw = Box::into_raw(Box::new(PluginInstance { plugin }));
        Self {
            shared: Arc::new(PluginShared {
                instance: InstanceHandle { raw, destroy: None },
                _library: None,
                identity: PluginIdentity {
                    name: name.into(),
                    version,
                    ..PluginIdentity::default()
                },
                path: None,
            }),
        }
    }

    pub(crate) fn from_library(
        library: Library,
        raw: *mut PluginInstance,
        destroy: PluginDestroyFn,
        identity: PluginIdentity,
        path: PathBuf,
    ) -> Self {
        Self {
            shared: Arc::new(PluginShared {
                instance: InstanceHandle {
                    raw,
                    destroy: Some(destroy),
                },
                _library: Some(library),
                identity,
                path: Some(path),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.identity.name
    }

    pub fn version(&self) -> u32 {
        self.shared.identity.version
    }

    pub fn identity(&self) -> &PluginIdentity {
        &self.shared.identity
    }

    pub fn path(&self) -> Option<&Path> {
        self.shared.path.as_deref()
    }

    pub fn exposes(&self, capability: Capability) -> bool {
        capability.exposed_by(self.shared.instance.plugin())
    }

    // Lifecycle, delegated to the instance.

    pub fn init(&self) -> GazeResult<()> {
        self.shared.instance.plugin().init()
    }

    pub fn pause(&self) {
        self.shared.instance.plugin().pause()
    }

    pub fn resume(&self) {
        self.shared.instance.plugin().resume()
    }

    pub fn reset(&self) {
        self.shared.instance.plugin().reset()
    }

    pub fn shutdown(&self) -> GazeResult<()> {
        self.shared.instance.plugin().shutdown()
    }

    // Capability views. Each borrows from this handle.

    pub fn as_source(&self) -> Option<&dyn EyeSource> {
        self.shared.instance.plugin().as_source()
    }

    pub fn as_calibration(&self) -> Option<&dyn Calibration> {
        self.shared.instance.plugin().as_calibration()
    }

    pub fn as_filter(&self) -> Option<&dyn EyeFilter> {
        self.shared.instance.plugin().as_filter()
    }

    pub fn as_stage(&self) -> Option<&dyn EyeStage> {
        self.shared.instance.plugin().as_stage()
    }

    pub fn as_sink(&self) -> Option<&dyn EyeSink> {
        self.shared.instance.plugin().as_sink()
    }

    pub fn as_render(&self) -> Option<&dyn TaskRender> {
        self.shared.instance.plugin().as_render()
    }

    pub fn as_configurable(&self) -> Option<&dyn Configurable> {
        self.shared.instance.plugin().as_configurable()
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.shared.identity.name)
            .field("version", &self.shared.identity.version)
            .field("path", &self.shared.path)
            .finish_non_exhaustive()
    }
}
