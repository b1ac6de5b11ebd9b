//! Graphics runtime: the one display window and the thread that owns it.
//!
//! Split in two: [`GraphicsShared`] is the cross-thread surface — atomics and
//! single-mutex slots the orchestrator and control plane may touch — and
//! [`GraphicsRuntime`] is the render loop that owns the window and is the
//! only code allowed to call into the graphics backend. Task plugins are
//! installed and retired through a single-slot mailbox so their `init`,
//! `render`, `reset` and `shutdown` all run on the render thread, where GL
//! resources are valid.

mod runtime;
mod shared;

pub use runtime::GraphicsRuntime;
pub use shared::{GraphicsShared, SettingsPromise, TaskCommand};
