//! Hook chain dispatch.
//!
//! Chains run over a snapshot of the registry, so handlers are free to
//! install and uninstall hooks mid-chain without upsetting iteration.
//! A handler error never escapes: it is logged with the hook's kind and
//! key and the chain moves on. Event chains always run to the end;
//! command, trigger, and url chains stop at the first handler that
//! returns [`Outcome::Handled`].

use tracing::warn;

use crate::bot::Bot;
use crate::hooks::{Handler, Hook, HookKey, Outcome};
use crate::message::Inbound;
use crate::{permissions, urls};

/// Reply sent when a trigger exists but the caller's level is too low
/// everywhere it matched.
const PERMISSION_DENIED: &str = "You don't have permission to use that trigger";

/// Fans an event out to every hook under `name`. A `recv` event
/// additionally parses `args[0]` and feeds it through command dispatch.
pub fn call_event(bot: &mut Bot, name: &str, args: &[&str]) {
    for hook in bot.registry.events_for(name) {
        let Handler::Event(handler) = &hook.handler else {
            continue;
        };
        if let Err(err) = handler(bot, args) {
            report(&hook, &err);
        }
    }
    if name == "recv" {
        if let Some(line) = args.first() {
            let directed = bot.config.bot.directed_triggers;
            let nick = bot.nick.clone();
            let mut msg = Inbound::parse(line, &nick, directed);
            call_command(bot, &mut msg);
        }
    }
}

/// Runs one parsed message through permission annotation, trigger or
/// url dispatch, and finally the command chain for its verb.
pub fn call_command(bot: &mut Bot, msg: &mut Inbound) {
    if msg.msg.command == "PRIVMSG" || msg.msg.command == "NOTICE" {
        msg.permissions =
            permissions::evaluate(&bot.allow_rules, &bot.deny_rules, msg.msg.prefix.as_ref());
    }
    if msg.msg.command == "PRIVMSG" {
        if msg.trigger.is_some() {
            call_trigger(bot, msg);
        } else if msg.channel.is_some() {
            if let Some(text) = msg.msg.params.last() {
                for (domain, url) in urls::scan(text) {
                    call_url(bot, msg, &domain, &url);
                }
            }
        }
    }
    for hook in bot.registry.commands_for(&msg.msg.command) {
        let Handler::Command(handler) = &hook.handler else {
            continue;
        };
        match handler(bot, msg) {
            Ok(Outcome::Handled) => break,
            Ok(Outcome::Continue) => {}
            Err(err) => report(&hook, &err),
        }
    }
}

/// Resolves a detected trigger from the deepest registered word count
/// down to one word. The first depth with any hook the caller is
/// allowed to run wins; shallower depths are never consulted after
/// that. If permission filtering was the only reason nothing ran, the
/// caller is told so.
pub fn call_trigger(bot: &mut Bot, msg: &Inbound) {
    let text = msg.trigger.clone().unwrap_or_default();
    let all_words: Vec<&str> = text.split_whitespace().collect();
    if all_words.is_empty() {
        return;
    }
    let max_depth = bot.registry.max_trigger_depth().min(all_words.len());
    let mut filtered = false;
    let mut executed = false;

    for depth in (1..=max_depth).rev() {
        let name_words: Vec<String> = all_words[..depth].iter().map(|w| w.to_string()).collect();
        let candidates = bot.registry.triggers_matching(&name_words);
        if candidates.is_empty() {
            continue;
        }

        let mut authorized = Vec::new();
        for hook in candidates {
            let held = permissions::effective(&msg.permissions, &hook.owner.name);
            if held >= hook.level {
                authorized.push(hook);
            } else {
                filtered = true;
            }
        }
        if authorized.is_empty() {
            continue;
        }

        let (name_words, rest) = split_depth(&text, depth);
        let mut args: Vec<String> = vec![name_words.join(" ")];
        args.extend(rest.split_whitespace().map(str::to_string));

        executed = true;
        for hook in authorized {
            let Handler::Trigger(handler) = &hook.handler else {
                continue;
            };
            match handler(bot, msg, &args, rest) {
                Ok(Outcome::Handled) => break,
                Ok(Outcome::Continue) => {}
                Err(err) => report(&hook, &err),
            }
        }
        break;
    }

    if filtered && !executed {
        bot.reply(msg, PERMISSION_DENIED);
    }
}

/// Dispatches one discovered URL. The exact domain chain runs first,
/// then the dots-as-spaces alias, and the `any` sentinel only when
/// neither claimed it. Returns whether any hook handled the URL.
pub fn call_url(bot: &mut Bot, msg: &Inbound, domain: &str, url: &str) -> bool {
    let alias = domain.replace('.', " ");
    let mut keys = vec![domain.to_string()];
    if alias != domain {
        keys.push(alias);
    }
    for key in keys {
        if run_url_chain(bot, msg, &key, domain, url) {
            return true;
        }
    }
    run_url_chain(bot, msg, "any", domain, url)
}

fn run_url_chain(bot: &mut Bot, msg: &Inbound, key: &str, domain: &str, url: &str) -> bool {
    for hook in bot.registry.urls_for(key) {
        let Handler::Url(handler) = &hook.handler else {
            continue;
        };
        match handler(bot, msg, domain, url) {
            Ok(Outcome::Handled) => return true,
            Ok(Outcome::Continue) => {}
            Err(err) => report(&hook, &err),
        }
    }
    false
}

/// Fires every timer due at `now_ms`. Repeating timers are pushed
/// forward by their own interval (not from `now`, so lag never
/// accumulates into drift) and one-shots are removed, in both cases
/// before the handler runs. A handler that cancels a timer later in
/// the same tick wins: each due hook is re-checked against the live
/// registry right before it fires.
pub fn call_timestamp(bot: &mut Bot, now_ms: u64) {
    for hook in bot.registry.due_timers(now_ms) {
        if !bot.registry.contains(hook.id) {
            continue;
        }
        match hook.repeat {
            Some(interval) => {
                let rescheduled = bot.registry.modify(hook.id, |h| {
                    if let HookKey::Timestamp(deadline) = &mut h.key {
                        *deadline += interval;
                    }
                    Ok(())
                });
                if let Err(err) = rescheduled {
                    warn!(
                        kind = hook.kind(),
                        key = %hook.key,
                        error = %err,
                        "failed to reschedule timer"
                    );
                    continue;
                }
            }
            None => {
                let _ = bot.registry.uninstall(hook.id);
            }
        }
        let Handler::Timestamp(handler) = &hook.handler else {
            continue;
        };
        if let Err(err) = handler(bot, now_ms) {
            report(&hook, &err);
        }
    }
}

/// Splits off the first `depth` whitespace-separated words, leaving the
/// remainder's internal spacing intact.
fn split_depth(text: &str, depth: usize) -> (Vec<&str>, &str) {
    let mut rest = text.trim_start();
    let mut words = Vec::with_capacity(depth);
    for _ in 0..depth {
        match rest.find(char::is_whitespace) {
            Some(end) => {
                words.push(&rest[..end]);
                rest = rest[end..].trim_start();
            }
            None => {
                if !rest.is_empty() {
                    words.push(rest);
                }
                rest = "";
                break;
            }
        }
    }
    (words, rest)
}

fn report(hook: &Hook, err: &anyhow::Error) {
    warn!(
        kind = hook.kind(),
        key = %hook.key,
        owner = %hook.owner,
        error = %err,
        "hook handler failed"
    );
}
