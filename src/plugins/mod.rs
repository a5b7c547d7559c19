//! Plugins: loadable feature bundles and the built-in set.
//!
//! A plugin declares hooks, gets them installed under its own owner
//! tag, and can veto or observe its lifecycle transitions. Instances
//! are constructed from the table in [`constructor`]; each load gets a
//! fresh epoch so a reload's new hooks never collide with the old.

pub mod admin;
pub mod conn;
pub mod manager;
pub mod perms;
pub mod raw;

use std::sync::Arc;

use crate::bot::Bot;
use crate::hooks::{Hook, Owner};

pub trait Plugin: Send + Sync {
    /// The hooks this instance wants installed, collected once at load.
    fn hooks(&self) -> Vec<Hook>;

    /// Runs after the hooks are in place. An error rolls the whole
    /// load back.
    fn on_load(&self, _bot: &mut Bot, _reloading: bool) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs before this instance is dismantled. Returning true vetoes
    /// the unload, unless it is forced.
    fn on_unload(&self, _bot: &mut Bot, _reloading: bool) -> bool {
        false
    }

    /// Returning true vetoes a reload, unless it is forced.
    fn on_reload(&self) -> bool {
        false
    }
}

/// Builds a fresh plugin instance. The owner tag is the one the
/// manager will install the instance's hooks under; plugins keep it to
/// schedule timers that die with them.
pub type PluginCtor = fn(&Bot, Owner) -> anyhow::Result<Arc<dyn Plugin>>;

/// A live instance and the owner tag its hooks carry.
pub struct LoadedPlugin {
    pub(crate) plugin: Arc<dyn Plugin>,
    pub(crate) owner: Owner,
}

/// The built-in plugin table.
pub fn constructor(name: &str) -> Option<PluginCtor> {
    match name {
        "admin" => Some(admin::construct),
        "conn" => Some(conn::construct),
        "perms" => Some(perms::construct),
        "raw" => Some(raw::construct),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_resolve_and_strangers_do_not() {
        for name in ["admin", "conn", "perms", "raw"] {
            assert!(constructor(name).is_some(), "missing builtin {name}");
        }
        assert!(constructor("karaoke").is_none());
        assert!(constructor("").is_none());
    }
}
