//! Bot state and the operations handlers drive it with.
//!
//! A [`Bot`] owns the hook registry, the channel and permission state,
//! and an outbound line queue the connection loop drains. All of it is
//! touched from a single task; handlers get `&mut Bot` and never race
//! each other.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use tracing::{debug, trace};

use corvid_proto::{wrap_text, wrap_width};

use crate::config::Config;
use crate::error::HookError;
use crate::hooks::{dispatch, Hook, HookId, HookResult, Outcome, Owner, Registry};
use crate::message::Inbound;
use crate::permissions::{RuleMap, ANY_PLUGIN};
use crate::plugins::LoadedPlugin;

/// What the bot knows about one channel it is in (or joining).
#[derive(Debug, Default)]
pub struct Channel {
    /// Join key, remembered so a reconnect can rejoin.
    pub key: Option<String>,
    /// Confirmed by the server, not just requested.
    pub joined: bool,
    /// Nicks currently present, tracked from NAMES and join/part traffic.
    pub nicks: HashSet<String>,
}

pub struct Bot {
    pub(crate) config: Config,
    /// Current nick, which the server may have truncated or mangled;
    /// authoritative once registration completes.
    pub(crate) nick: String,
    /// Server-reported name, learned from the 001 prefix.
    pub(crate) server: Option<String>,
    pub(crate) registry: Registry,
    /// Keyed by lowercased channel name.
    pub(crate) channels: HashMap<String, Channel>,
    pub(crate) allow_rules: RuleMap,
    pub(crate) deny_rules: RuleMap,
    /// Lines waiting for the connection loop to write out.
    pub(crate) out: VecDeque<String>,
    pub(crate) connected: bool,
    pub(crate) connect_requested: bool,
    pub(crate) disconnect_requested: bool,
    pub(crate) in_shutdown: bool,
    pub(crate) force_exit: bool,
    pub(crate) plugins: HashMap<String, LoadedPlugin>,
    pub(crate) next_epoch: u64,
}

impl Bot {
    /// Builds a bot with the state-tracking hooks installed and the
    /// baseline permission rules seeded: everyone holds level 1, the
    /// configured superuser holds 1000.
    pub fn new(config: Config) -> Result<Self, HookError> {
        let mut allow_rules = RuleMap::new();
        allow_rules
            .entry("*".to_string())
            .or_default()
            .insert(ANY_PLUGIN.to_string(), 1);
        allow_rules
            .entry(config.bot.superuser.clone())
            .or_default()
            .insert(ANY_PLUGIN.to_string(), 1000);

        let mut bot = Self {
            nick: config.bot.nick.clone(),
            config,
            server: None,
            registry: Registry::new(),
            channels: HashMap::new(),
            allow_rules,
            deny_rules: RuleMap::new(),
            out: VecDeque::new(),
            connected: false,
            connect_requested: false,
            disconnect_requested: false,
            in_shutdown: false,
            force_exit: false,
            plugins: HashMap::new(),
            next_epoch: 1,
        };
        for hook in core_hooks() {
            bot.registry.install(hook)?;
        }
        Ok(bot)
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Queues a raw line for the server. The `send` event fires first,
    /// so observers see the line before it is committed to the queue.
    pub fn send(&mut self, line: impl Into<String>) {
        let line = line.into();
        dispatch::call_event(self, "send", &[&line]);
        trace!(line = %line, "queueing outbound line");
        self.out.push_back(line);
    }

    pub fn privmsg(&mut self, target: &str, text: &str) {
        self.send_wrapped("PRIVMSG", target, text);
    }

    pub fn notice(&mut self, target: &str, text: &str) {
        self.send_wrapped("NOTICE", target, text);
    }

    /// Answers a message where it came from: its channel, or its sender
    /// when it arrived in private.
    pub fn reply(&mut self, msg: &Inbound, text: &str) {
        let target = msg
            .reply_to
            .clone()
            .or_else(|| msg.msg.source().map(str::to_string));
        if let Some(target) = target {
            self.privmsg(&target, text);
        }
    }

    fn send_wrapped(&mut self, command: &str, target: &str, text: &str) {
        let width = wrap_width(&self.nick, command, target);
        for chunk in wrap_text(text, width) {
            self.send(format!("{command} {target} :{chunk}"));
        }
    }

    /// Requests channels, keyed ones first so the key list lines up
    /// positionally, and records them as pending until the server
    /// confirms the join.
    pub fn join(&mut self, channels: &[(String, Option<String>)]) {
        if channels.is_empty() {
            return;
        }
        let mut names = Vec::with_capacity(channels.len());
        let mut keys = Vec::new();
        let keyed = channels.iter().filter(|(_, key)| key.is_some());
        let unkeyed = channels.iter().filter(|(_, key)| key.is_none());
        for (name, key) in keyed.chain(unkeyed) {
            names.push(name.as_str());
            if let Some(key) = key {
                keys.push(key.as_str());
            }
            let entry = self.channels.entry(name.to_lowercase()).or_default();
            entry.key = key.clone();
        }
        let line = if keys.is_empty() {
            format!("JOIN {}", names.join(","))
        } else {
            format!("JOIN {} {}", names.join(","), keys.join(","))
        };
        self.send(line);
    }

    pub fn part(&mut self, channel: &str, reason: Option<&str>) {
        match reason {
            Some(reason) => self.send(format!("PART {channel} :{reason}")),
            None => self.send(format!("PART {channel}")),
        }
    }

    /// Channel state by name, case-insensitively.
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&name.to_lowercase())
    }

    pub fn install_hook(&mut self, hook: Hook) -> Result<HookId, HookError> {
        self.registry.install(hook)
    }

    pub fn uninstall_hook(&mut self, id: HookId) -> Result<(), HookError> {
        self.registry.uninstall(id).map(|_| ())
    }

    /// Current wall-clock time in epoch milliseconds, the unit timer
    /// deadlines are kept in.
    pub fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }

    /// Runs `f` once at an absolute epoch-millisecond deadline.
    pub fn set_timer<F>(&mut self, at_ms: u64, owner: Owner, f: F) -> Result<HookId, HookError>
    where
        F: Fn(&mut Bot, u64) -> HookResult + Send + Sync + 'static,
    {
        self.registry
            .install(Hook::timestamp(at_ms, f).with_owner(owner))
    }

    /// Runs `f` once, `delay` from now.
    pub fn set_timeout<F>(&mut self, delay: Duration, owner: Owner, f: F) -> Result<HookId, HookError>
    where
        F: Fn(&mut Bot, u64) -> HookResult + Send + Sync + 'static,
    {
        let deadline = self.now_ms() + delay.as_millis() as u64;
        self.set_timer(deadline, owner, f)
    }

    /// Runs `f` every `every`, starting one interval from now.
    pub fn set_interval<F>(&mut self, every: Duration, owner: Owner, f: F) -> Result<HookId, HookError>
    where
        F: Fn(&mut Bot, u64) -> HookResult + Send + Sync + 'static,
    {
        let deadline = self.now_ms() + every.as_millis() as u64;
        self.registry
            .install(Hook::timestamp(deadline, f).repeat(every).with_owner(owner))
    }

    /// Cancels a pending timer. Its cleanup callback fires; cancelling
    /// one that already fired reports [`HookError::NotInstalled`].
    pub fn cancel_timer(&mut self, id: HookId) -> Result<(), HookError> {
        self.uninstall_hook(id)
    }

    /// Asks the connection loop to establish a connection.
    pub fn connect(&mut self) {
        self.connect_requested = true;
    }

    /// Asks the connection loop to drop the current connection. The
    /// `disconnect` event fires once it actually has.
    pub fn disconnect(&mut self) {
        self.disconnect_requested = true;
    }

    /// Begins an orderly exit: no more reconnects, and a QUIT goes out
    /// if a server is listening. Calling it a second time stops waiting
    /// for the server and forces the loop out.
    pub fn shutdown(&mut self, reason: &str) {
        if self.in_shutdown {
            debug!("second shutdown request, forcing exit");
            self.force_exit = true;
            return;
        }
        self.in_shutdown = true;
        self.connect_requested = false;
        if self.connected {
            dispatch::call_event(self, "shutdown", &[reason]);
        }
    }
}

/// The state-tracking hooks every bot carries. All run at priority 0 so
/// plugins observe channel state already updated.
fn core_hooks() -> Vec<Hook> {
    vec![
        // Channel presence is meaningless without a connection.
        Hook::event("disconnect", |bot, _| {
            for channel in bot.channels.values_mut() {
                channel.joined = false;
                channel.nicks.clear();
            }
            Ok(Outcome::Continue)
        })
        .priority(0),
        Hook::event("shutdown", |bot, args| {
            let reason = args.first().copied().unwrap_or("Shutting down");
            bot.send(format!("QUIT :{reason}"));
            let names: Vec<String> = bot.plugins.keys().cloned().collect();
            for name in names {
                if let Err(err) = bot.unload_plugin(&name, true) {
                    debug!(plugin = %name, error = %err, "unload during shutdown failed");
                }
            }
            Ok(Outcome::Continue)
        })
        .priority(0),
        // Registration: learn the server's name and whatever nick it
        // actually gave us.
        Hook::command("001", |bot, msg| {
            if let Some(source) = msg.msg.source() {
                bot.server = Some(source.to_string());
            }
            if let Some(me) = msg.msg.params.first() {
                bot.nick = me.clone();
            }
            Ok(Outcome::Continue)
        })
        .priority(0),
        // NAMES reply: seed the nick list of a channel we are in.
        Hook::command("353", |bot, msg| {
            let (Some(channel), Some(names)) = (msg.msg.params.get(2), msg.msg.params.get(3))
            else {
                return Ok(Outcome::Continue);
            };
            if let Some(state) = bot.channels.get_mut(&channel.to_lowercase()) {
                if state.joined {
                    for name in names.split_whitespace() {
                        let nick = name.strip_prefix(['~', '&', '@', '%', '+']).unwrap_or(name);
                        state.nicks.insert(nick.to_string());
                    }
                }
            }
            Ok(Outcome::Continue)
        })
        .priority(0),
        Hook::command("JOIN", |bot, msg| {
            let (Some(channel), Some(source)) = (msg.msg.params.first(), msg.msg.source()) else {
                return Ok(Outcome::Continue);
            };
            let lowered = channel.to_lowercase();
            if source == bot.nick {
                bot.channels.entry(lowered).or_default().joined = true;
            } else if let Some(state) = bot.channels.get_mut(&lowered) {
                state.nicks.insert(source.to_string());
            }
            Ok(Outcome::Continue)
        })
        .priority(0),
        Hook::command("KICK", |bot, msg| {
            let (Some(channel), Some(kicked)) = (msg.msg.params.first(), msg.msg.params.get(1))
            else {
                return Ok(Outcome::Continue);
            };
            if let Some(state) = bot.channels.get_mut(&channel.to_lowercase()) {
                if *kicked == bot.nick {
                    state.joined = false;
                    state.nicks.clear();
                } else {
                    state.nicks.remove(kicked);
                }
            }
            Ok(Outcome::Continue)
        })
        .priority(0),
        Hook::command("NICK", |bot, msg| {
            let (Some(new), Some(source)) = (msg.msg.params.first(), msg.msg.source()) else {
                return Ok(Outcome::Continue);
            };
            if source == bot.nick {
                bot.nick = new.clone();
            }
            for state in bot.channels.values_mut() {
                if state.nicks.remove(source) {
                    state.nicks.insert(new.clone());
                }
            }
            Ok(Outcome::Continue)
        })
        .priority(0),
        Hook::command("PART", |bot, msg| {
            let (Some(channel), Some(source)) = (msg.msg.params.first(), msg.msg.source()) else {
                return Ok(Outcome::Continue);
            };
            let lowered = channel.to_lowercase();
            if source == bot.nick {
                bot.channels.remove(&lowered);
            } else if let Some(state) = bot.channels.get_mut(&lowered) {
                state.nicks.remove(source);
            }
            Ok(Outcome::Continue)
        })
        .priority(0),
        Hook::command("PING", |bot, msg| {
            let token = msg.msg.params.last().cloned().unwrap_or_default();
            bot.send(format!("PONG :{token}"));
            Ok(Outcome::Continue)
        })
        .priority(0),
        Hook::command("QUIT", |bot, msg| {
            let Some(source) = msg.msg.source() else {
                return Ok(Outcome::Continue);
            };
            let source = source.to_string();
            for state in bot.channels.values_mut() {
                state.nicks.remove(&source);
            }
            Ok(Outcome::Continue)
        })
        .priority(0),
    ]
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    fn bot() -> Bot {
        let config: Config = toml::from_str(
            r#"
            [network]
            host = "irc.test.invalid"

            [bot]
            nick = "corvid"
            superuser = "boss!*@*"
            "#,
        )
        .unwrap();
        Bot::new(config).unwrap()
    }

    fn recv(bot: &mut Bot, line: &str) {
        dispatch::call_event(bot, "recv", &[line]);
    }

    #[test]
    fn new_seeds_baseline_permission_rules() {
        let bot = bot();
        assert_eq!(bot.allow_rules["*"]["ANY"], 1);
        assert_eq!(bot.allow_rules["boss!*@*"]["ANY"], 1000);
        assert!(bot.deny_rules.is_empty());
    }

    #[test]
    fn send_event_fires_before_the_line_is_queued() {
        let mut bot = bot();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        bot.registry
            .install(Hook::event("send", move |bot, args| {
                log.lock()
                    .push((args.first().copied().unwrap_or("").to_string(), bot.out.len()));
                Ok(Outcome::Continue)
            }))
            .unwrap();

        bot.send("PING :x");
        assert_eq!(*seen.lock(), vec![("PING :x".to_string(), 0)]);
        assert_eq!(bot.out.pop_front().as_deref(), Some("PING :x"));
    }

    #[test]
    fn privmsg_wraps_to_the_protocol_budget() {
        let mut bot = bot();
        let text = "word ".repeat(120);
        bot.privmsg("#chan", &text);
        assert!(bot.out.len() >= 2);
        let width = wrap_width("corvid", "PRIVMSG", "#chan");
        let mut rebuilt = Vec::new();
        for line in &bot.out {
            let payload = line
                .strip_prefix("PRIVMSG #chan :")
                .expect("wrapped lines keep the command and target");
            assert!(payload.len() <= width);
            rebuilt.push(payload.to_string());
        }
        assert_eq!(rebuilt.join(" "), text.trim());
    }

    #[test]
    fn reply_goes_to_the_channel_or_the_sender() {
        let mut bot = bot();
        let channel = Inbound::parse(":nick!u@h PRIVMSG #Chan :hi", "corvid", false);
        bot.reply(&channel, "hello");
        assert_eq!(bot.out.pop_front().as_deref(), Some("PRIVMSG #Chan :hello"));

        let private = Inbound::parse(":nick!u@h PRIVMSG corvid :hi", "corvid", false);
        bot.reply(&private, "hello");
        assert_eq!(bot.out.pop_front().as_deref(), Some("PRIVMSG nick :hello"));
    }

    #[test]
    fn registration_learns_server_and_nick() {
        let mut bot = bot();
        recv(&mut bot, ":irc.example.net 001 corvid2 :Welcome");
        assert_eq!(bot.server.as_deref(), Some("irc.example.net"));
        assert_eq!(bot.nick(), "corvid2");
    }

    #[test]
    fn join_requests_keyed_channels_first() {
        let mut bot = bot();
        bot.join(&[
            ("#open".to_string(), None),
            ("#Vault".to_string(), Some("hunter2".to_string())),
        ]);
        assert_eq!(
            bot.out.pop_front().as_deref(),
            Some("JOIN #Vault,#open hunter2")
        );
        let vault = bot.channel("#vault").unwrap();
        assert_eq!(vault.key.as_deref(), Some("hunter2"));
        assert!(!vault.joined);

        recv(&mut bot, ":corvid!u@h JOIN #Vault");
        assert!(bot.channel("#VAULT").unwrap().joined);
    }

    #[test]
    fn names_reply_fills_joined_channels_only() {
        let mut bot = bot();
        bot.join(&[("#chan".to_string(), None)]);
        // Not joined yet: the reply is ignored.
        recv(&mut bot, ":srv 353 corvid = #chan :@op corvid");
        assert!(bot.channel("#chan").unwrap().nicks.is_empty());

        recv(&mut bot, ":corvid!u@h JOIN #chan");
        recv(&mut bot, ":srv 353 corvid = #chan :@op +voice ~owner &admin %half plain");
        let nicks = &bot.channel("#chan").unwrap().nicks;
        for expected in ["op", "voice", "owner", "admin", "half", "plain"] {
            assert!(nicks.contains(expected), "missing {expected}");
        }
        // Unknown channels are ignored outright.
        recv(&mut bot, ":srv 353 corvid = #other :somebody");
        assert!(bot.channel("#other").is_none());
    }

    #[test]
    fn kick_removes_the_kicked_nick() {
        let mut bot = bot();
        bot.join(&[("#chan".to_string(), None)]);
        recv(&mut bot, ":corvid!u@h JOIN #chan");
        recv(&mut bot, ":alice!a@h JOIN #chan");
        recv(&mut bot, ":bob!b@h JOIN #chan");

        // Alice kicks Bob: Bob goes, Alice stays.
        recv(&mut bot, ":alice!a@h KICK #chan bob :bye");
        let nicks = &bot.channel("#chan").unwrap().nicks;
        assert!(nicks.contains("alice"));
        assert!(!nicks.contains("bob"));

        // The bot itself getting kicked empties the channel state.
        recv(&mut bot, ":alice!a@h KICK #chan corvid :and you");
        let state = bot.channel("#chan").unwrap();
        assert!(!state.joined);
        assert!(state.nicks.is_empty());
    }

    #[test]
    fn nick_changes_follow_everywhere() {
        let mut bot = bot();
        bot.join(&[("#a".to_string(), None), ("#b".to_string(), None)]);
        recv(&mut bot, ":corvid!u@h JOIN #a");
        recv(&mut bot, ":corvid!u@h JOIN #b");
        recv(&mut bot, ":alice!a@h JOIN #a");
        recv(&mut bot, ":alice!a@h JOIN #b");

        recv(&mut bot, ":alice!a@h NICK alicia");
        assert!(bot.channel("#a").unwrap().nicks.contains("alicia"));
        assert!(bot.channel("#b").unwrap().nicks.contains("alicia"));
        assert!(!bot.channel("#a").unwrap().nicks.contains("alice"));

        recv(&mut bot, ":corvid!u@h NICK corvid2");
        assert_eq!(bot.nick(), "corvid2");
    }

    #[test]
    fn part_and_quit_clean_up() {
        let mut bot = bot();
        bot.join(&[("#a".to_string(), None), ("#b".to_string(), None)]);
        recv(&mut bot, ":corvid!u@h JOIN #a");
        recv(&mut bot, ":corvid!u@h JOIN #b");
        recv(&mut bot, ":alice!a@h JOIN #a");
        recv(&mut bot, ":alice!a@h JOIN #b");

        recv(&mut bot, ":alice!a@h PART #a");
        assert!(!bot.channel("#a").unwrap().nicks.contains("alice"));
        assert!(bot.channel("#b").unwrap().nicks.contains("alice"));

        recv(&mut bot, ":alice!a@h QUIT :gone");
        assert!(!bot.channel("#b").unwrap().nicks.contains("alice"));

        recv(&mut bot, ":corvid!u@h PART #b");
        assert!(bot.channel("#b").is_none());
    }

    #[test]
    fn ping_gets_a_pong() {
        let mut bot = bot();
        recv(&mut bot, "PING :irc.example.net");
        assert_eq!(bot.out.pop_front().as_deref(), Some("PONG :irc.example.net"));
    }

    #[test]
    fn disconnect_event_clears_presence() {
        let mut bot = bot();
        bot.join(&[("#chan".to_string(), None)]);
        recv(&mut bot, ":corvid!u@h JOIN #chan");
        recv(&mut bot, ":alice!a@h JOIN #chan");

        dispatch::call_event(&mut bot, "disconnect", &[]);
        let state = bot.channel("#chan").unwrap();
        assert!(!state.joined);
        assert!(state.nicks.is_empty());
        // The key survives for the rejoin.
        assert!(bot.channel("#chan").is_some());
    }

    #[test]
    fn shutdown_latches_and_then_forces() {
        let mut bot = bot();
        bot.connect_requested = true;
        bot.shutdown("done");
        assert!(bot.in_shutdown);
        assert!(!bot.connect_requested);
        assert!(!bot.force_exit);
        // Not connected: no QUIT went anywhere.
        assert!(bot.out.is_empty());

        bot.shutdown("done");
        assert!(bot.force_exit);
    }

    #[test]
    fn shutdown_while_connected_says_goodbye() {
        let mut bot = bot();
        bot.connected = true;
        bot.shutdown("real life");
        assert!(bot.out.iter().any(|l| l == "QUIT :real life"));
    }

    #[test]
    fn timer_helpers_schedule_against_the_clock() {
        let mut bot = bot();
        let fired = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&fired);
        let id = bot
            .set_timeout(Duration::from_secs(60), Owner::core(), move |_, _| {
                *counter.lock() += 1;
                Ok(Outcome::Continue)
            })
            .unwrap();

        let now = bot.now_ms();
        dispatch::call_timestamp(&mut bot, now);
        assert_eq!(*fired.lock(), 0);
        dispatch::call_timestamp(&mut bot, now + 61_000);
        assert_eq!(*fired.lock(), 1);
        assert!(!bot.registry.contains(id));

        bot.uninstall_hook(id).unwrap_err();
    }

    #[test]
    fn cancelled_timer_runs_its_cleanup_and_never_fires() {
        let mut bot = bot();
        let cleaned = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&cleaned);
        let hook = Hook::timestamp(5_000, |_, _| Ok(Outcome::Continue))
            .cleanup(move |id| log.lock().push(id));
        let id = bot.install_hook(hook).unwrap();

        bot.cancel_timer(id).unwrap();
        assert_eq!(*cleaned.lock(), vec![id]);
        dispatch::call_timestamp(&mut bot, 10_000);
        assert!(!bot.registry.contains(id));
        bot.cancel_timer(id).unwrap_err();
    }

    #[test]
    fn absolute_timer_fires_at_its_deadline() {
        let mut bot = bot();
        let fired = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&fired);
        bot.set_timer(2_000, Owner::core(), move |_, now| {
            log.lock().push(now);
            Ok(Outcome::Continue)
        })
        .unwrap();

        dispatch::call_timestamp(&mut bot, 1_999);
        assert!(fired.lock().is_empty());
        dispatch::call_timestamp(&mut bot, 2_000);
        assert_eq!(*fired.lock(), vec![2_000]);
    }
}
