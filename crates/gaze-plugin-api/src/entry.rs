//! C-ABI entry points exported by plugin artifacts.
//!
//! A plugin library exports four mandatory symbols — `create`, `destroy`,
//! `name`, `version` — plus optional `author` and `description`. The instance
//! crosses the boundary as an opaque pointer to a [`PluginInstance`]; only
//! the `create`/`destroy` pair from the same library may allocate and free
//! it, so the host keeps the library mapped until the instance is destroyed.

use std::os::raw::c_char;

use crate::capability::EyePlugin;

/// Opaque box carrying the plugin trait object across the C boundary.
pub struct PluginInstance {
    pub plugin: Box<dyn EyePlugin>,
}

pub type PluginCreateFn = unsafe extern "C" fn() -> *mut PluginInstance;
pub type PluginDestroyFn = unsafe extern "C" fn(*mut PluginInstance);
pub type PluginNameFn = unsafe extern "C" fn() -> *const c_char;
pub type PluginVersionFn = unsafe extern "C" fn() -> u32;
pub type PluginTextFn = unsafe extern "C" fn() -> *const c_char;

pub const CREATE_SYMBOL: &[u8] = b"create";
pub const DESTROY_SYMBOL: &[u8] = b"destroy";
pub const NAME_SYMBOL: &[u8] = b"name";
pub const VERSION_SYMBOL: &[u8] = b"version";
pub const AUTHOR_SYMBOL: &[u8] = b"author";
pub const DESCRIPTION_SYMBOL: &[u8] = b"description";

/// Encode major.minor.patch into the single u32 carried by the `version`
/// symbol: `0xMMmmpppp`.
pub const fn make_version(major: u8, minor: u8, patch: u16) -> u32 {
    ((major as u32) << 24) | ((minor as u32) << 16) | patch as u32
}

/// Emit the entry points for a plugin crate.
///
/// The plugin type must implement [`EyePlugin`](crate::EyePlugin) and
/// `Default`. Author and description are optional:
///
/// ```rust,ignore
/// gaze_plugin_api::export_plugin!(DotTask, "dot_task", make_version(1, 0, 0));
/// gaze_plugin_api::export_plugin!(
///     DotTask, "dot_task", make_version(1, 0, 0),
///     author = "lab", description = "fixation dot"
/// );
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($ty:ty, $name:expr, $version:expr) => {
        #[no_mangle]
        pub extern "C" fn create() -> *mut $crate::entry::PluginInstance {
            Box::into_raw(Box::new($crate::entry::PluginInstance {
                plugin: Box::new(<$ty as Default>::default()),
            }))
        }

        /// # Safety
        /// `instance` must have come from `create` in this library and must
        /// not be used afterwards.
        #[no_mangle]
        pub unsafe extern "C" fn destroy(instance: *mut $crate::entry::PluginInstance) {
            if !instance.is_null() {
                drop(Box::from_raw(instance));
            }
        }

        #[no_mangle]
        pub extern "C" fn name() -> *const std::os::raw::c_char {
            concat!($name, "\0").as_ptr() as *const std::os::raw::c_char
        }

        #[no_mangle]
        pub extern "C" fn version() -> u32 {
            $version
        }
    };
    ($ty:ty, $name:expr, $version:expr, author = $author:expr, description = $description:expr) => {
        $crate::export_plugin!($ty, $name, $version);

        #[no_mangle]
        pub extern "C" fn author() -> *const std::os::raw::c_char {
            concat!($author, "\0").as_ptr() as *const std::os::raw::c_char
        }

        #[no_mangle]
        pub extern "C" fn description() -> *const std::os::raw::c_char {
            concat!($description, "\0").as_ptr() as *const std::os::raw::c_char
        }
    };
}
