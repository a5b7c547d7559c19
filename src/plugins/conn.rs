//! Connection management: registration, keepalive, and reconnects.
//!
//! The conn plugin owns the connection policy. It asks for the first
//! connection at load, registers with NICK/USER once a transport is
//! up, rejoins channels after the welcome, probes a quiet link with
//! PING, and schedules reconnects with a growing backoff when the link
//! drops. Unloading it leaves the bot deaf, so it vetoes casual
//! unloads.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::bot::Bot;
use crate::hooks::{Hook, HookId, Outcome, Owner};
use crate::plugins::Plugin;

/// Quiet time on the link before we probe it with a PING.
const PING_AFTER: Duration = Duration::from_secs(120);
/// Time the probe gets to come back before the link is declared dead.
const PONG_WITHIN: Duration = Duration::from_secs(60);
/// Backoff step between reconnect attempts, capped at five steps.
const BACKOFF_STEP: Duration = Duration::from_secs(60);

#[derive(Default)]
struct ConnState {
    /// Reconnect attempts since the last completed registration.
    attempt: u32,
    /// Channels to join after the next welcome, with keys.
    autojoin: Vec<(String, Option<String>)>,
    /// Live keepalive probe timer, if armed.
    send_ping: Option<HookId>,
    /// Live probe deadline timer, if a PING is in flight.
    ping_timeout: Option<HookId>,
}

pub struct Conn {
    state: Arc<Mutex<ConnState>>,
    owner: Owner,
}

pub fn construct(bot: &Bot, owner: Owner) -> anyhow::Result<Arc<dyn Plugin>> {
    let autojoin = bot
        .config()
        .plugin_str_list("conn", "channels")
        .iter()
        .map(|entry| match entry.split_once(' ') {
            Some((name, key)) => (name.to_string(), Some(key.to_string())),
            None => (entry.clone(), None),
        })
        .collect();
    Ok(Arc::new(Conn {
        state: Arc::new(Mutex::new(ConnState {
            autojoin,
            ..ConnState::default()
        })),
        owner,
    }))
}

impl Plugin for Conn {
    fn hooks(&self) -> Vec<Hook> {
        let mut hooks = Vec::new();

        hooks.push(Hook::event("connect", |bot, _| {
            let nick = bot.nick().to_string();
            let username = bot.config().bot.username().to_string();
            let realname = bot.config().bot.realname().to_string();
            bot.send(format!("NICK {nick}"));
            bot.send(format!("USER {username} 0 * :{realname}"));
            Ok(Outcome::Continue)
        }));

        let state = Arc::clone(&self.state);
        let owner = self.owner.clone();
        hooks.push(Hook::event("disconnect", move |bot, _| {
            disarm_keepalive(bot, &state);
            if bot.in_shutdown {
                return Ok(Outcome::Continue);
            }
            {
                let mut state = state.lock();
                if state.autojoin.is_empty() {
                    // Rejoin everything we knew about, with the keys we
                    // joined with.
                    state.autojoin = bot
                        .channels
                        .iter()
                        .map(|(name, chan)| (name.clone(), chan.key.clone()))
                        .collect();
                }
            }
            schedule_reconnect(bot, &state, &owner);
            Ok(Outcome::Continue)
        }));

        let state = Arc::clone(&self.state);
        let owner = self.owner.clone();
        hooks.push(Hook::event("connect failed", move |bot, _| {
            schedule_reconnect(bot, &state, &owner);
            Ok(Outcome::Continue)
        }));

        hooks.push(Hook::command("ERROR", |bot, msg| {
            let text = msg.msg.params.last().map(String::as_str).unwrap_or("");
            if text.to_lowercase().contains("ban") {
                bot.shutdown("Shutdown due to ban");
            }
            Ok(Outcome::Continue)
        }));

        let state = Arc::clone(&self.state);
        hooks.push(Hook::command("001", move |bot, _| {
            let autojoin = {
                let mut state = state.lock();
                state.attempt = 0;
                std::mem::take(&mut state.autojoin)
            };
            info!(channels = autojoin.len(), "registered, joining channels");
            bot.join(&autojoin);
            Ok(Outcome::Continue)
        }));

        // Any traffic proves the link; push the quiet-link probe out.
        let state = Arc::clone(&self.state);
        let owner = self.owner.clone();
        hooks.push(Hook::event("recv", move |bot, _| {
            disarm_keepalive(bot, &state);
            arm_send_ping(bot, &state, &owner);
            Ok(Outcome::Continue)
        }));

        hooks
    }

    fn on_load(&self, bot: &mut Bot, reloading: bool) -> anyhow::Result<()> {
        if !reloading {
            bot.connect();
        }
        Ok(())
    }

    fn on_unload(&self, _bot: &mut Bot, reloading: bool) -> bool {
        !reloading
    }
}

/// Cancels both keepalive timers if armed. Their cleanups clear the
/// state slots, so take the ids out first and call with the lock
/// released.
fn disarm_keepalive(bot: &mut Bot, state: &Arc<Mutex<ConnState>>) {
    let (send_ping, ping_timeout) = {
        let mut state = state.lock();
        (state.send_ping.take(), state.ping_timeout.take())
    };
    for id in [send_ping, ping_timeout].into_iter().flatten() {
        let _ = bot.cancel_timer(id);
    }
}

fn arm_send_ping(bot: &mut Bot, state: &Arc<Mutex<ConnState>>, owner: &Owner) {
    let deadline = bot.now_ms() + PING_AFTER.as_millis() as u64;
    let handler_state = Arc::clone(state);
    let handler_owner = owner.clone();
    let cleanup_state = Arc::clone(state);
    let hook = Hook::timestamp(deadline, move |bot, _| {
        send_probe(bot, &handler_state, &handler_owner);
        Ok(Outcome::Continue)
    })
    .with_owner(owner.clone())
    .cleanup(move |id| {
        let mut state = cleanup_state.lock();
        if state.send_ping == Some(id) {
            state.send_ping = None;
        }
    });
    let id = hook.id();
    match bot.install_hook(hook) {
        Ok(_) => state.lock().send_ping = Some(id),
        Err(err) => warn!(error = %err, "failed to arm keepalive"),
    }
}

fn send_probe(bot: &mut Bot, state: &Arc<Mutex<ConnState>>, owner: &Owner) {
    let target = bot
        .server
        .clone()
        .unwrap_or_else(|| bot.config().network.host.clone());
    bot.send(format!("PING :{target}"));

    let deadline = bot.now_ms() + PONG_WITHIN.as_millis() as u64;
    let cleanup_state = Arc::clone(state);
    let hook = Hook::timestamp(deadline, |bot, _| {
        warn!("no traffic since keepalive probe, dropping link");
        bot.disconnect();
        Ok(Outcome::Continue)
    })
    .with_owner(owner.clone())
    .cleanup(move |id| {
        let mut state = cleanup_state.lock();
        if state.ping_timeout == Some(id) {
            state.ping_timeout = None;
        }
    });
    let id = hook.id();
    match bot.install_hook(hook) {
        Ok(_) => state.lock().ping_timeout = Some(id),
        Err(err) => warn!(error = %err, "failed to arm probe deadline"),
    }
}

fn schedule_reconnect(bot: &mut Bot, state: &Arc<Mutex<ConnState>>, owner: &Owner) {
    if bot.in_shutdown {
        return;
    }
    let attempt = {
        let mut state = state.lock();
        let attempt = state.attempt;
        state.attempt = state.attempt.saturating_add(1);
        attempt
    };
    let delay = BACKOFF_STEP * attempt.min(5);
    info!(attempt, delay_secs = delay.as_secs(), "scheduling reconnect");
    let result = bot.set_timeout(delay, owner.clone(), |bot, _| {
        bot.connect();
        Ok(Outcome::Continue)
    });
    if let Err(err) = result {
        warn!(error = %err, "failed to schedule reconnect");
    }
}
