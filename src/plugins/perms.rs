//! Permission rule management over chat.
//!
//! `allow` and `deny` edit the two rule tables with the same syntax:
//!
//! ```text
//! !allow <mask> <plugin>=<level> ...   grant/set levels under a mask
//! !allow <mask> -<plugin>              drop one plugin's rule
//! !allow -<mask>                       drop the whole mask
//! ```
//!
//! Rules live in memory and take effect on the next message evaluated.

use std::sync::Arc;

use crate::bot::Bot;
use crate::hooks::{Hook, Outcome, Owner};
use crate::message::Inbound;
use crate::permissions::RuleMap;
use crate::plugins::Plugin;

struct Perms;

pub fn construct(_bot: &Bot, _owner: Owner) -> anyhow::Result<Arc<dyn Plugin>> {
    Ok(Arc::new(Perms))
}

/// Which table a trigger edits.
#[derive(Clone, Copy)]
enum Table {
    Allow,
    Deny,
}

impl Plugin for Perms {
    fn hooks(&self) -> Vec<Hook> {
        vec![
            Hook::trigger("list perms", |bot, msg, _, _| {
                let allow = render_rules(&bot.allow_rules);
                let deny = render_rules(&bot.deny_rules);
                bot.reply(msg, "Allow:");
                for line in allow {
                    bot.reply(msg, &line);
                }
                bot.reply(msg, "Deny:");
                for line in deny {
                    bot.reply(msg, &line);
                }
                Ok(Outcome::Handled)
            })
            .level(1000),
            Hook::trigger("allow", |bot, msg, args, _| {
                edit_rules(bot, msg, args, Table::Allow);
                Ok(Outcome::Handled)
            })
            .level(1000),
            Hook::trigger("deny", |bot, msg, args, _| {
                edit_rules(bot, msg, args, Table::Deny);
                Ok(Outcome::Handled)
            })
            .level(1000),
        ]
    }
}

fn render_rules(rules: &RuleMap) -> Vec<String> {
    rules
        .iter()
        .map(|(mask, grants)| {
            let rendered: Vec<String> = grants
                .iter()
                .map(|(plugin, level)| format!("{plugin}={level}"))
                .collect();
            format!("  {mask} {}", rendered.join(" "))
        })
        .collect()
}

fn edit_rules(bot: &mut Bot, msg: &Inbound, args: &[String], table: Table) {
    let Some(mask) = args.get(1) else {
        bot.reply(msg, "a prefix mask is required");
        return;
    };

    if let Some(mask) = mask.strip_prefix('-') {
        if args.len() > 2 {
            bot.reply(msg, "only one argument expected");
            return;
        }
        let mask = mask.to_string();
        rules_mut(bot, table).remove(&mask);
        bot.reply(msg, "done");
        return;
    }

    let mask = mask.clone();
    for arg in &args[2..] {
        if let Some(plugin) = arg.strip_prefix('-') {
            let plugin = plugin.to_string();
            let removed = rules_mut(bot, table)
                .get_mut(&mask)
                .map_or(false, |grants| grants.remove(&plugin).is_some());
            if !removed {
                bot.reply(msg, &format!("no rule exists for plugin \"{plugin}\""));
            }
            continue;
        }
        let parsed = arg
            .split_once('=')
            .and_then(|(plugin, level)| level.parse::<u32>().ok().map(|l| (plugin, l)));
        let Some((plugin, level)) = parsed else {
            bot.reply(msg, "invalid syntax, \"plugin=level\" format required");
            return;
        };
        let plugin = plugin.to_string();
        rules_mut(bot, table)
            .entry(mask.clone())
            .or_default()
            .insert(plugin, level);
    }
    bot.reply(msg, "done");
}

fn rules_mut(bot: &mut Bot, table: Table) -> &mut RuleMap {
    match table {
        Table::Allow => &mut bot.allow_rules,
        Table::Deny => &mut bot.deny_rules,
    }
}
