//! Plugin lifecycle: load, unload, reload.
//!
//! Loads are transactional: if any hook fails to install or `on_load`
//! errors, everything already done for that attempt is undone and the
//! bot is back where it started. A reload builds the replacement
//! completely before dismantling the old instance; a replacement whose
//! `on_load` fails is itself torn down rather than left half-alive.

use std::sync::Arc;

use tracing::{error, info};

use crate::bot::Bot;
use crate::error::PluginError;
use crate::hooks::{dispatch, Owner};
use crate::plugins::{self, LoadedPlugin, Plugin, PluginCtor};

impl Bot {
    /// Loads a built-in plugin by name.
    pub fn load_plugin(&mut self, name: &str) -> Result<(), PluginError> {
        let ctor = plugins::constructor(name).ok_or(PluginError::Unknown)?;
        self.load_plugin_with(name, ctor)
    }

    pub(crate) fn load_plugin_with(
        &mut self,
        name: &str,
        ctor: PluginCtor,
    ) -> Result<(), PluginError> {
        if self.plugins.contains_key(name) {
            return Err(PluginError::AlreadyLoaded);
        }
        dispatch::call_event(self, "plugin loading", &[name]);
        let owner = self.fresh_owner(name);
        let plugin = ctor(self, owner.clone()).map_err(PluginError::Init)?;
        self.install_plugin_hooks(plugin.as_ref(), &owner)?;
        if let Err(err) = plugin.on_load(self, false) {
            self.registry.uninstall_owner(&owner);
            return Err(PluginError::OnLoad(err));
        }
        self.plugins
            .insert(name.to_string(), LoadedPlugin { plugin, owner });
        dispatch::call_event(self, "plugin loaded", &[name]);
        info!(plugin = name, "plugin loaded");
        Ok(())
    }

    /// Unloads a plugin, removing every hook it owns. The plugin can
    /// veto unless `force` is set.
    pub fn unload_plugin(&mut self, name: &str, force: bool) -> Result<(), PluginError> {
        if !self.plugins.contains_key(name) {
            return Err(PluginError::NotLoaded);
        }
        dispatch::call_event(self, "plugin unloading", &[name]);
        let plugin = Arc::clone(&self.plugins[name].plugin);
        if plugin.on_unload(self, false) && !force {
            return Err(PluginError::ProhibitsUnloading);
        }
        if let Some(entry) = self.plugins.remove(name) {
            self.registry.uninstall_owner(&entry.owner);
        }
        dispatch::call_event(self, "plugin unloaded", &[name]);
        info!(plugin = name, "plugin unloaded");
        Ok(())
    }

    /// Replaces a plugin with a freshly constructed instance. The old
    /// instance's hooks stay live until the new ones are all installed,
    /// so a failed reload leaves the original untouched.
    pub fn reload_plugin(&mut self, name: &str, force: bool) -> Result<(), PluginError> {
        if !self.plugins.contains_key(name) {
            return Err(PluginError::NotLoaded);
        }
        dispatch::call_event(self, "plugin reloading", &[name]);
        let old_plugin = Arc::clone(&self.plugins[name].plugin);
        if old_plugin.on_reload() && !force {
            return Err(PluginError::ProhibitsReloading);
        }
        let ctor = plugins::constructor(name).ok_or(PluginError::Unknown)?;
        let owner = self.fresh_owner(name);
        let plugin = ctor(self, owner.clone()).map_err(PluginError::Init)?;
        self.install_plugin_hooks(plugin.as_ref(), &owner)?;

        if let Some(old) = self.plugins.remove(name) {
            self.registry.uninstall_owner(&old.owner);
            old.plugin.on_unload(self, true);
        }
        if let Err(err) = plugin.on_load(self, true) {
            // Old gone, new broken: tear the replacement down entirely
            // rather than leave a half-initialized instance answering
            // hooks.
            self.registry.uninstall_owner(&owner);
            return Err(PluginError::OnLoad(err));
        }
        self.plugins
            .insert(name.to_string(), LoadedPlugin { plugin, owner });
        dispatch::call_event(self, "plugin reloaded", &[name]);
        info!(plugin = name, "plugin reloaded");
        Ok(())
    }

    /// Loads everything `bot.autoload` lists, reporting failures
    /// without giving up on the rest.
    pub fn autoload_plugins(&mut self) {
        for name in self.config.bot.autoload.clone() {
            if let Err(err) = self.load_plugin(&name) {
                error!(plugin = %name, error = %err, "autoload failed");
            }
        }
    }

    /// Loaded plugin names, sorted.
    pub fn plugin_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.keys().cloned().collect();
        names.sort();
        names
    }

    fn fresh_owner(&mut self, name: &str) -> Owner {
        let owner = Owner::new(name, self.next_epoch);
        self.next_epoch += 1;
        owner
    }

    /// Installs every hook the plugin declares under its owner tag,
    /// unwinding on the first failure.
    fn install_plugin_hooks(
        &mut self,
        plugin: &dyn Plugin,
        owner: &Owner,
    ) -> Result<(), PluginError> {
        for hook in plugin.hooks() {
            if let Err(err) = self.registry.install(hook.with_owner(owner.clone())) {
                self.registry.uninstall_owner(owner);
                return Err(PluginError::Hook(err));
            }
        }
        Ok(())
    }
}
