//! Plugin discovery and typed lookup.

use std::collections::HashMap;
use std::ffi::CStr;
use std::path::{Path, PathBuf};

use gaze_core::messages::PluginInfo;
use gaze_core::{GazeError, GazeResult};
use gaze_plugin_api::entry::{
    self, PluginCreateFn, PluginDestroyFn, PluginNameFn, PluginTextFn, PluginVersionFn,
};
use gaze_plugin_api::Capability;
use libloading::Library;
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::plugin::{Plugin, PluginIdentity};

/// Name-keyed plugin map behind a readers-writer lock. Lookups run
/// concurrently; loads and unloads serialize.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, Plugin>>,
    load_errors: Mutex<Vec<(PathBuf, String)>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recursively scan `dir` for plugin artifacts and load each one. A
    /// failing artifact is recorded in [`load_errors`](Self::load_errors) and
    /// never aborts the scan. Returns the number of plugins loaded.
    pub fn load_directory(&self, dir: &Path) -> usize {
        if !dir.is_dir() {
            warn!("plugin directory does not exist: {}", dir.display());
            return 0;
        }

        let mut loaded = 0;
        for item in WalkDir::new(dir).follow_links(true) {
            let item = match item {
                Ok(item) => item,
                Err(err) => {
                    warn!("error scanning plugin directory: {err}");
                    continue;
                }
            };
            let path = item.path();
            if !item.file_type().is_file() || !is_plugin_library(path) {
                continue;
            }
            match self.load_plugin(path) {
                Ok(name) => {
                    info!("Loaded plugin \"{name}\" from {}", path.display());
                    loaded += 1;
                }
                Err(err) => {
                    warn!("Failed to load plugin {}: {err}", path.display());
                    self.load_errors
                        .lock()
                        .push((path.to_path_buf(), err.to_string()));
                }
            }
        }
        loaded
    }

    /// Load a single artifact: open the library, resolve the entry points,
    /// create the instance and insert it under its reported name. If the name
    /// is already taken the first plugin wins and the new instance is
    /// destroyed again.
    pub fn load_plugin(&self, path: &Path) -> GazeResult<String> {
        if !path.exists() {
            return Err(GazeError::NotFound(path.display().to_string()));
        }

        // SAFETY: loading a foreign library and calling its entry points is
        // inherently unsafe; the symbols are validated against the ABI
        // contract and the library outlives the instance inside the handle.
        unsafe {
            let library = Library::new(path)
                .map_err(|err| GazeError::BadFormat(format!("failed to load library: {err}")))?;

            let create = *library
                .get::<PluginCreateFn>(entry::CREATE_SYMBOL)
                .map_err(|err| GazeError::BadFormat(format!("missing `create`: {err}")))?;
            let destroy: PluginDestroyFn = *library
                .get::<PluginDestroyFn>(entry::DESTROY_SYMBOL)
                .map_err(|err| GazeError::BadFormat(format!("missing `destroy`: {err}")))?;
            let name_fn = *library
                .get::<PluginNameFn>(entry::NAME_SYMBOL)
                .map_err(|err| GazeError::BadFormat(format!("missing `name`: {err}")))?;
            let version_fn = *library
                .get::<PluginVersionFn>(entry::VERSION_SYMBOL)
                .map_err(|err| GazeError::BadFormat(format!("missing `version`: {err}")))?;

            let name = read_symbol_str(name_fn())
                .ok_or_else(|| GazeError::BadFormat("plugin name is not UTF-8".into()))?;
            let author = library
                .get::<PluginTextFn>(entry::AUTHOR_SYMBOL)
                .ok()
                .and_then(|f| read_symbol_str(f()))
                .unwrap_or_default();
            let description = library
                .get::<PluginTextFn>(entry::DESCRIPTION_SYMBOL)
                .ok()
                .and_then(|f| read_symbol_str(f()))
                .unwrap_or_default();

            let raw = create();
            if raw.is_null() {
                return Err(GazeError::BadFormat("`create` returned null".into()));
            }

            let identity = PluginIdentity {
                name: name.clone(),
                version: version_fn(),
                author,
                description,
            };
            let plugin = Plugin::from_library(library, raw, destroy, identity, path.to_path_buf());
            self.register(plugin);
            Ok(name)
        }
    }

    /// Insert an already-constructed plugin under the first-wins rule.
    /// Returns false when the name was already taken.
    pub fn register(&self, plugin: Plugin) -> bool {
        let mut plugins = self.plugins.write();
        if plugins.contains_key(plugin.name()) {
            warn!(
                "duplicate plugin name \"{}\", keeping the first",
                plugin.name()
            );
            return false;
        }
        plugins.insert(plugin.name().to_string(), plugin);
        true
    }

    pub fn get(&self, name: &str) -> GazeResult<Plugin> {
        self.plugins
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| GazeError::NotFound(format!("plugin \"{name}\"")))
    }

    /// Names of plugins exposing `capability`, sorted for stable listings.
    pub fn list_by_capability(&self, capability: Capability) -> Vec<String> {
        let mut names: Vec<String> = self
            .plugins
            .read()
            .values()
            .filter(|plugin| plugin.exposes(capability))
            .map(|plugin| plugin.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Listing entries for plugins exposing `capability`, including config
    /// schema and default for the Configurable ones.
    pub fn plugin_infos(&self, capability: Capability) -> Vec<PluginInfo> {
        let plugins = self.plugins.read();
        let mut infos: Vec<PluginInfo> = plugins
            .values()
            .filter(|plugin| plugin.exposes(capability))
            .map(|plugin| {
                let identity = plugin.identity();
                let mut info = PluginInfo {
                    name: identity.name.clone(),
                    version: identity.version,
                    author: identity.author.clone(),
                    description: identity.description.clone(),
                    ..PluginInfo::default()
                };
                if let Some(configurable) = plugin.as_configurable() {
                    info.configuration_schema = configurable.config_schema();
                    info.default_configuration = configurable.default_config();
                }
                info
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Artifacts that failed to load, as `(path, error)` pairs.
    pub fn load_errors(&self) -> Vec<(PathBuf, String)> {
        self.load_errors.lock().clone()
    }

    /// Drop the registry's strong reference. Outstanding handles keep the
    /// instance alive until they drop.
    pub fn unload(&self, name: &str) -> GazeResult<()> {
        self.plugins
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| GazeError::NotFound(format!("plugin \"{name}\"")))
    }
}

fn read_symbol_str(ptr: *const std::os::raw::c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .ok()
        .map(str::to_owned)
}

fn is_plugin_library(path: &Path) -> bool {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    #[cfg(target_os = "macos")]
    {
        extension.eq_ignore_ascii_case("dylib")
    }
    #[cfg(target_os = "linux")]
    {
        extension.eq_ignore_ascii_case("so")
    }
    #[cfg(target_os = "windows")]
    {
        extension.eq_ignore_ascii_case("dll")
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        let _ = extension;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaze_core::EyeSample;
    use gaze_plugin_api::{EyePlugin, EyeStage};

    struct NoopStage;

    impl EyePlugin for NoopStage {
        fn init(&self) -> GazeResult<()> {
            Ok(())
        }

        fn shutdown(&self) -> GazeResult<()> {
            Ok(())
        }

        fn as_stage(&self) -> Option<&dyn EyeStage> {
            Some(self)
        }
    }

    impl EyeStage for NoopStage {
        fn process(&self, _sample: &mut EyeSample) {}
    }

    fn stage_plugin(name: &str) -> Plugin {
        Plugin::from_boxed(name, 1, Box::new(NoopStage))
    }

    #[test]
    fn get_unknown_plugin_is_not_found() {
        let registry = PluginRegistry::new();
        assert!(matches!(
            registry.get("missing"),
            Err(GazeError::NotFound(_))
        ));
    }

    #[test]
    fn first_registration_wins() {
        let registry = PluginRegistry::new();
        assert!(registry.register(stage_plugin("dup")));
        assert!(!registry.register(stage_plugin("dup")));
        assert_eq!(registry.list_by_capability(Capability::Stage), vec!["dup"]);
    }

    #[test]
    fn capability_listing_filters_and_sorts() {
        let registry = PluginRegistry::new();
        registry.register(stage_plugin("zeta"));
        registry.register(stage_plugin("alpha"));
        assert_eq!(
            registry.list_by_capability(Capability::Stage),
            vec!["alpha", "zeta"]
        );
        assert!(registry.list_by_capability(Capability::Render).is_empty());
    }

    #[test]
    fn unload_drops_registry_reference_only() {
        let registry = PluginRegistry::new();
        registry.register(stage_plugin("stage"));
        let handle = registry.get("stage").unwrap();
        registry.unload("stage").unwrap();
        assert!(registry.get("stage").is_err());
        // The outstanding handle still works.
        assert!(handle.as_stage().is_some());
        assert!(registry.unload("stage").is_err());
    }

    #[test]
    fn scanning_a_missing_directory_loads_nothing() {
        let registry = PluginRegistry::new();
        assert_eq!(registry.load_directory(Path::new("/nonexistent/plugins")), 0);
        assert!(registry.load_errors().is_empty());
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn a_file_without_symbols_is_recorded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("libnot_a_plugin.so");
        std::fs::write(&bogus, b"definitely not an artifact").unwrap();

        let registry = PluginRegistry::new();
        assert_eq!(registry.load_directory(dir.path()), 0);
        let errors = registry.load_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, bogus);
    }
}
