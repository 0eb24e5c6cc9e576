//! Global configuration access.
//!
//! Call `config::init(Settings::load(None)?)` exactly once at startup, then
//! `config::get()` anywhere. A missing config is a fatal startup error, not
//! a recoverable condition — the same contract the teacher's well-config
//! module uses.

pub mod defaults;
mod settings;

pub use settings::{
    BatchConfig, CacheConfig, CadenceConfig, FlapConfig, ProbeConfig, RelationalConfig,
    RetentionConfig, Settings, TsdbConfig, WorkerPoolConfig,
};

use std::sync::OnceLock;

static SETTINGS: OnceLock<Settings> = OnceLock::new();

/// Initialize the global settings. Must be called exactly once before any
/// call to `get()`. A second call is ignored with a warning, not a panic —
/// useful for test harnesses that call `init` defensively.
pub fn init(settings: Settings) {
    if SETTINGS.set(settings).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Get a reference to the global settings.
///
/// Panics if `init()` has not been called. This is by design — a missing
/// config is a fatal startup error.
pub fn get() -> &'static Settings {
    SETTINGS
        .get()
        .expect("config::get() called before config::init() — this is a startup bug")
}

/// Check whether the config has been initialized. Useful for tests.
pub fn is_initialized() -> bool {
    SETTINGS.get().is_some()
}
