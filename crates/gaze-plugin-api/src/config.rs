//! Typed configuration slot with silent revert.

use parking_lot::RwLock;
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

/// Holds a plugin's typed configuration behind the opaque-JSON contract.
///
/// A document that fails to parse reverts the slot to `T::default()` rather
/// than keeping the previous value; the caller may be mid-session and a
/// half-applied document is worse than the default. The revert is logged at
/// WARN.
pub struct ConfigSlot<T> {
    value: RwLock<T>,
}

impl<T> ConfigSlot<T>
where
    T: DeserializeOwned + Serialize + JsonSchema + Default + Clone + Send + Sync,
{
    pub fn new() -> Self {
        Self {
            value: RwLock::new(T::default()),
        }
    }

    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    pub fn set_from_json(&self, config_json: &str) {
        match serde_json::from_str::<T>(config_json) {
            Ok(config) => *self.value.write() = config,
            Err(err) => {
                warn!("configuration failed to parse, reverting to default: {err}");
                *self.value.write() = T::default();
            }
        }
    }

    pub fn schema_json(&self) -> String {
        serde_json::to_string(&schema_for!(T)).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn default_json(&self) -> String {
        serde_json::to_string(&T::default()).unwrap_or_else(|_| "{}".to_string())
    }
}

impl<T> Default for ConfigSlot<T>
where
    T: DeserializeOwned + Serialize + JsonSchema + Default + Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}
