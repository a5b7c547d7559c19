//! Plugin management over chat: list, load, unload, reload.
//!
//! Every trigger here requires level 1000, so only the superuser (or
//! someone explicitly granted that much) can touch the plugin table.

use std::sync::Arc;

use crate::bot::Bot;
use crate::error::PluginError;
use crate::hooks::{Hook, Outcome, Owner};
use crate::message::Inbound;
use crate::plugins::Plugin;

struct Admin;

pub fn construct(_bot: &Bot, _owner: Owner) -> anyhow::Result<Arc<dyn Plugin>> {
    Ok(Arc::new(Admin))
}

impl Plugin for Admin {
    fn hooks(&self) -> Vec<Hook> {
        vec![
            Hook::trigger("list plugins", |bot, msg, _, _| {
                let names = bot.plugin_names();
                let listing = if names.is_empty() {
                    "none".to_string()
                } else {
                    names.join(", ")
                };
                bot.reply(msg, &listing);
                Ok(Outcome::Handled)
            })
            .level(1000),
            Hook::trigger("load", |bot, msg, args, _| {
                let Some(name) = args.get(1).cloned() else {
                    bot.reply(msg, "plugin name is required");
                    return Ok(Outcome::Handled);
                };
                let outcome = bot.load_plugin(&name);
                report(bot, msg, &name, "loaded", outcome);
                Ok(Outcome::Handled)
            })
            .level(1000),
            Hook::trigger("unload", |bot, msg, args, _| {
                let Some(name) = args.get(1).cloned() else {
                    bot.reply(msg, "plugin name is required");
                    return Ok(Outcome::Handled);
                };
                let outcome = bot.unload_plugin(&name, false);
                report(bot, msg, &name, "unloaded", outcome);
                Ok(Outcome::Handled)
            })
            .level(1000),
            Hook::trigger("reload", |bot, msg, args, _| {
                let Some(name) = args.get(1).cloned() else {
                    bot.reply(msg, "plugin name required");
                    return Ok(Outcome::Handled);
                };
                let outcome = bot.reload_plugin(&name, false);
                report(bot, msg, &name, "reloaded", outcome);
                Ok(Outcome::Handled)
            })
            .level(1000),
        ]
    }
}

/// Tells the requesting user how their plugin operation went, with the
/// error chain flattened into one line when it didn't.
fn report(bot: &mut Bot, msg: &Inbound, name: &str, verb: &str, outcome: Result<(), PluginError>) {
    match outcome {
        Ok(()) => bot.reply(msg, &format!("{name} plugin {verb}")),
        Err(err) => {
            let chain = anyhow::Error::from(err);
            bot.reply(msg, &format!("{name} plugin error: {chain:#}"));
        }
    }
}
