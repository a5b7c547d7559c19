//! Hook types, the priority-ordered registry, and dispatch.
//!
//! Everything the bot reacts to flows through hooks: lifecycle events,
//! IRC commands, chat triggers, scanned URLs, and timers. A [`Hook`] binds
//! a handler to a dispatch key with a priority; the [`Registry`] keeps
//! them ordered and the [`dispatch`] module walks the chains.

pub mod dispatch;
pub mod registry;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use registry::Registry;

use crate::bot::Bot;
use crate::message::Inbound;

/// Priority given to hooks that don't ask for one. Lower values run
/// earlier; the bot's own bookkeeping hooks use 0 to observe state
/// changes before plugins do.
pub const DEFAULT_PRIORITY: i32 = 500;

/// Level required of callers when a trigger hook doesn't set one.
pub const DEFAULT_LEVEL: u32 = 1;

/// Stable identity of a hook instance.
///
/// Identity survives cloning (snapshots taken during dispatch refer to
/// the installed original) and is what double-install and uninstall
/// checks compare — never key equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookId(u64);

impl HookId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tag identifying who installed a hook.
///
/// The name keys permission lookups; the epoch distinguishes plugin
/// instances so a reloading plugin's fresh hooks are never confused with
/// the outgoing instance's during the swap.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Owner {
    /// Plugin name, or `_bot` for the core.
    pub name: String,
    /// Instance counter assigned by the plugin manager.
    pub epoch: u64,
}

impl Owner {
    pub fn new(name: impl Into<String>, epoch: u64) -> Self {
        Self {
            name: name.into(),
            epoch,
        }
    }

    /// The bot core's own tag.
    pub fn core() -> Self {
        Self::new("_bot", 0)
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.epoch)
    }
}

/// What a handler tells the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Let the rest of the chain run.
    Continue,
    /// Consume the message; command, trigger, and url chains stop here.
    Handled,
}

/// Handlers return `Handled`/`Continue`, or an error that is logged and
/// isolated to this hook.
pub type HookResult = anyhow::Result<Outcome>;

/// Event handler: `(bot, args)`.
pub type EventFn = Arc<dyn Fn(&mut Bot, &[&str]) -> HookResult + Send + Sync>;
/// Command handler: `(bot, message)`.
pub type CommandFn = Arc<dyn Fn(&mut Bot, &Inbound) -> HookResult + Send + Sync>;
/// Trigger handler: `(bot, message, args, remainder)`. `args[0]` is the
/// matched trigger name, the rest are the remainder's words; the last
/// argument is the remainder with its spacing intact.
pub type TriggerFn =
    Arc<dyn Fn(&mut Bot, &Inbound, &[String], &str) -> HookResult + Send + Sync>;
/// Timestamp handler: `(bot, now_ms)`.
pub type TimestampFn = Arc<dyn Fn(&mut Bot, u64) -> HookResult + Send + Sync>;
/// Url handler: `(bot, message, domain, url)`.
pub type UrlFn = Arc<dyn Fn(&mut Bot, &Inbound, &str, &str) -> HookResult + Send + Sync>;

/// Called with the hook's id when it is removed outside a modify cycle,
/// so owners can drop their own bookkeeping references.
pub type CleanupFn = Arc<dyn Fn(HookId) + Send + Sync>;

/// Dispatch key, by hook kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookKey {
    /// Lifecycle event name (`recv`, `send`, `connect`, ...).
    Event(String),
    /// Uppercased IRC command or numeric.
    Command(String),
    /// Trigger words; the word count leads the ordering so lookups group
    /// by depth.
    Trigger(Vec<String>),
    /// Deadline in epoch milliseconds.
    Timestamp(u64),
    /// Lowercased domain, or the `any` fallback.
    Url(String),
}

impl fmt::Display for HookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Event(name) | Self::Command(name) | Self::Url(name) => f.write_str(name),
            Self::Trigger(words) => f.write_str(&words.join(" ")),
            Self::Timestamp(deadline) => write!(f, "{deadline}"),
        }
    }
}

/// The handler half of a hook; variants pair with [`HookKey`] by
/// construction.
#[derive(Clone)]
pub enum Handler {
    Event(EventFn),
    Command(CommandFn),
    Trigger(TriggerFn),
    Timestamp(TimestampFn),
    Url(UrlFn),
}

/// A handler bound to a dispatch key.
///
/// Built with the kind-specific constructors and the chained setters:
///
/// ```ignore
/// Hook::trigger("song add", |bot, msg, args, rest| { ... })
///     .priority(200)
///     .level(100)
/// ```
#[derive(Clone)]
pub struct Hook {
    pub(crate) id: HookId,
    pub(crate) owner: Owner,
    pub(crate) key: HookKey,
    pub(crate) priority: i32,
    pub(crate) level: u32,
    pub(crate) repeat: Option<u64>,
    pub(crate) handler: Handler,
    pub(crate) cleanup: Option<CleanupFn>,
}

impl Hook {
    fn with_key(key: HookKey, handler: Handler) -> Self {
        Self {
            id: HookId::next(),
            owner: Owner::core(),
            key,
            priority: DEFAULT_PRIORITY,
            level: DEFAULT_LEVEL,
            repeat: None,
            handler,
            cleanup: None,
        }
    }

    /// Hook an event by name.
    pub fn event<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Bot, &[&str]) -> HookResult + Send + Sync + 'static,
    {
        Self::with_key(HookKey::Event(name.into()), Handler::Event(Arc::new(f)))
    }

    /// Hook an IRC command or numeric; the name is uppercased.
    pub fn command<F>(name: impl AsRef<str>, f: F) -> Self
    where
        F: Fn(&mut Bot, &Inbound) -> HookResult + Send + Sync + 'static,
    {
        Self::with_key(
            HookKey::Command(name.as_ref().to_ascii_uppercase()),
            Handler::Command(Arc::new(f)),
        )
    }

    /// Hook a trigger; multi-word names match deeper than single words.
    pub fn trigger<F>(name: impl AsRef<str>, f: F) -> Self
    where
        F: Fn(&mut Bot, &Inbound, &[String], &str) -> HookResult + Send + Sync + 'static,
    {
        let words = name
            .as_ref()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        Self::with_key(HookKey::Trigger(words), Handler::Trigger(Arc::new(f)))
    }

    /// Hook a point in time (epoch milliseconds).
    pub fn timestamp<F>(deadline_ms: u64, f: F) -> Self
    where
        F: Fn(&mut Bot, u64) -> HookResult + Send + Sync + 'static,
    {
        Self::with_key(
            HookKey::Timestamp(deadline_ms),
            Handler::Timestamp(Arc::new(f)),
        )
    }

    /// Hook URLs under a domain; `any` catches what nothing else handled.
    pub fn url<F>(domain: impl AsRef<str>, f: F) -> Self
    where
        F: Fn(&mut Bot, &Inbound, &str, &str) -> HookResult + Send + Sync + 'static,
    {
        Self::with_key(
            HookKey::Url(domain.as_ref().to_lowercase()),
            Handler::Url(Arc::new(f)),
        )
    }

    /// Run earlier (lower) or later (higher) than the default 500.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Require this permission level of trigger callers.
    pub fn level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    /// Re-arm a timestamp hook every `every` after it fires.
    pub fn repeat(mut self, every: Duration) -> Self {
        self.repeat = Some(every.as_millis() as u64);
        self
    }

    /// Observe this hook's removal.
    pub fn cleanup<F>(mut self, f: F) -> Self
    where
        F: Fn(HookId) + Send + Sync + 'static,
    {
        self.cleanup = Some(Arc::new(f));
        self
    }

    /// Tag the hook with its owner; the plugin manager applies this to
    /// every hook a plugin declares.
    pub fn with_owner(mut self, owner: Owner) -> Self {
        self.owner = owner;
        self
    }

    pub fn id(&self) -> HookId {
        self.id
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn key(&self) -> &HookKey {
        &self.key
    }

    /// Kind name for log fields.
    pub fn kind(&self) -> &'static str {
        match self.key {
            HookKey::Event(_) => "event",
            HookKey::Command(_) => "command",
            HookKey::Trigger(_) => "trigger",
            HookKey::Timestamp(_) => "timestamp",
            HookKey::Url(_) => "url",
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("key", &self.key)
            .field("priority", &self.priority)
            .field("level", &self.level)
            .field("repeat", &self.repeat)
            .finish_non_exhaustive()
    }
}
