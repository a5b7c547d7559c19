//! Error types for the hook registry and plugin lifecycle.

use thiserror::Error;

use crate::hooks::HookId;

/// Errors from hook registry operations.
///
/// These are programmer errors on the caller's side (installing the same
/// hook twice, removing a hook that is gone). They abort the operation
/// that tripped them, never the process.
#[derive(Debug, Error)]
pub enum HookError {
    /// Identity is tracked per hook instance, so this fires even when the
    /// key or priority changed since the first install.
    #[error("hook {0} is already installed")]
    AlreadyInstalled(HookId),

    #[error("hook {0} is not installed")]
    NotInstalled(HookId),

    /// A `modify` mutator failed; the hook was left fully uninstalled.
    #[error("hook {id} mutation failed, hook removed")]
    MutateFailed {
        id: HookId,
        #[source]
        source: anyhow::Error,
    },
}

/// Errors from plugin lifecycle operations.
///
/// The display strings double as the replies the admin triggers send back
/// to whoever asked, so they stay short; causes ride along for the log.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("already loaded")]
    AlreadyLoaded,

    #[error("not loaded")]
    NotLoaded,

    #[error("unknown plugin")]
    Unknown,

    #[error("init error")]
    Init(#[source] anyhow::Error),

    #[error("hook error")]
    Hook(#[source] HookError),

    #[error("on_load error")]
    OnLoad(#[source] anyhow::Error),

    #[error("plugin prohibits unloading")]
    ProhibitsUnloading,

    #[error("plugin prohibits reloading")]
    ProhibitsReloading,
}
