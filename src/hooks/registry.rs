//! Ordered hook storage.
//!
//! Each hook kind lives in its own `BTreeMap` keyed by a composite tuple
//! ending in `(priority, seq)`, so a range over the dispatch key yields
//! the chain already sorted: ascending priority, insertion order within
//! a priority. A side index by [`HookId`] makes removal by identity and
//! owner sweeps cheap without walking the maps.

use std::collections::{BTreeMap, HashMap};

use crate::error::HookError;

use super::{Hook, HookId, HookKey, Owner};

/// Where an installed hook lives, by identity.
struct Slot {
    key: HookKey,
    priority: i32,
    seq: u64,
    owner: Owner,
}

/// All installed hooks, one ordered map per kind.
#[derive(Default)]
pub struct Registry {
    events: BTreeMap<(String, i32, u64), Hook>,
    commands: BTreeMap<(String, i32, u64), Hook>,
    // Word count leads the trigger key so a single map groups hooks by
    // depth and the deepest registered depth is the last key.
    triggers: BTreeMap<(usize, Vec<String>, i32, u64), Hook>,
    timers: BTreeMap<(u64, i32, u64), Hook>,
    urls: BTreeMap<(String, i32, u64), Hook>,
    index: HashMap<HookId, Slot>,
    next_seq: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a hook. Installing the same hook twice (by identity, not
    /// key) is a caller bug and is rejected.
    pub fn install(&mut self, hook: Hook) -> Result<HookId, HookError> {
        if self.index.contains_key(&hook.id) {
            return Err(HookError::AlreadyInstalled(hook.id));
        }
        let id = hook.id;
        self.register(hook);
        Ok(id)
    }

    /// Removes a hook by identity and fires its cleanup callback.
    pub fn uninstall(&mut self, id: HookId) -> Result<Hook, HookError> {
        let hook = self.take(id).ok_or(HookError::NotInstalled(id))?;
        if let Some(cleanup) = &hook.cleanup {
            cleanup(id);
        }
        Ok(hook)
    }

    /// Removes every hook belonging to `owner`, firing cleanups, and
    /// returns how many were removed. Hooks of other owners keep their
    /// positions.
    pub fn uninstall_owner(&mut self, owner: &Owner) -> usize {
        let ids: Vec<HookId> = self
            .index
            .iter()
            .filter(|(_, slot)| &slot.owner == owner)
            .map(|(id, _)| *id)
            .collect();
        let count = ids.len();
        for id in ids {
            // Present by construction; ignore the hook itself.
            let _ = self.uninstall(id);
        }
        count
    }

    /// Takes a hook out, applies `mutator`, and reinstalls it. Cleanup
    /// callbacks do not fire; the hook never shows up half-registered.
    /// If the mutator fails the hook stays out entirely and the error
    /// is returned.
    pub fn modify<F>(&mut self, id: HookId, mutator: F) -> Result<(), HookError>
    where
        F: FnOnce(&mut Hook) -> anyhow::Result<()>,
    {
        let mut hook = self.take(id).ok_or(HookError::NotInstalled(id))?;
        match mutator(&mut hook) {
            Ok(()) => {
                self.register(hook);
                Ok(())
            }
            Err(source) => Err(HookError::MutateFailed { id, source }),
        }
    }

    pub fn contains(&self, id: HookId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Event chain for `name`, ready to invoke in order.
    pub fn events_for(&self, name: &str) -> Vec<Hook> {
        string_keyed_range(&self.events, name)
    }

    /// Command chain for an (already uppercased) command name.
    pub fn commands_for(&self, command: &str) -> Vec<Hook> {
        string_keyed_range(&self.commands, command)
    }

    /// Url chain for an exact domain key.
    pub fn urls_for(&self, domain: &str) -> Vec<Hook> {
        string_keyed_range(&self.urls, domain)
    }

    /// Trigger chain whose words exactly match `words`.
    pub fn triggers_matching(&self, words: &[String]) -> Vec<Hook> {
        let depth = words.len();
        let lo = (depth, words.to_vec(), i32::MIN, u64::MIN);
        let hi = (depth, words.to_vec(), i32::MAX, u64::MAX);
        self.triggers.range(lo..=hi).map(|(_, h)| h.clone()).collect()
    }

    /// Deepest word count any trigger hook is registered under.
    pub fn max_trigger_depth(&self) -> usize {
        self.triggers.keys().next_back().map_or(0, |(depth, ..)| *depth)
    }

    /// Every timer with a deadline at or before `now_ms`, sorted by
    /// ascending priority (insertion order within a priority), not by
    /// deadline.
    pub fn due_timers(&self, now_ms: u64) -> Vec<Hook> {
        let mut due: Vec<Hook> = self
            .timers
            .range(..=(now_ms, i32::MAX, u64::MAX))
            .map(|(_, h)| h.clone())
            .collect();
        due.sort_by_key(|hook| {
            self.index
                .get(&hook.id)
                .map_or((hook.priority, u64::MAX), |slot| (slot.priority, slot.seq))
        });
        due
    }

    /// Writes the hook into its kind map and the identity index under a
    /// fresh sequence number.
    fn register(&mut self, hook: Hook) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(
            hook.id,
            Slot {
                key: hook.key.clone(),
                priority: hook.priority,
                seq,
                owner: hook.owner.clone(),
            },
        );
        let priority = hook.priority;
        match hook.key.clone() {
            HookKey::Event(name) => {
                self.events.insert((name, priority, seq), hook);
            }
            HookKey::Command(name) => {
                self.commands.insert((name, priority, seq), hook);
            }
            HookKey::Trigger(words) => {
                self.triggers.insert((words.len(), words, priority, seq), hook);
            }
            HookKey::Timestamp(deadline) => {
                self.timers.insert((deadline, priority, seq), hook);
            }
            HookKey::Url(domain) => {
                self.urls.insert((domain, priority, seq), hook);
            }
        }
    }

    /// Removes by identity without firing cleanup.
    fn take(&mut self, id: HookId) -> Option<Hook> {
        let slot = self.index.remove(&id)?;
        match slot.key {
            HookKey::Event(name) => self.events.remove(&(name, slot.priority, slot.seq)),
            HookKey::Command(name) => self.commands.remove(&(name, slot.priority, slot.seq)),
            HookKey::Trigger(words) => {
                let depth = words.len();
                self.triggers.remove(&(depth, words, slot.priority, slot.seq))
            }
            HookKey::Timestamp(deadline) => {
                self.timers.remove(&(deadline, slot.priority, slot.seq))
            }
            HookKey::Url(domain) => self.urls.remove(&(domain, slot.priority, slot.seq)),
        }
    }
}

fn string_keyed_range(map: &BTreeMap<(String, i32, u64), Hook>, key: &str) -> Vec<Hook> {
    let lo = (key.to_string(), i32::MIN, u64::MIN);
    let hi = (key.to_string(), i32::MAX, u64::MAX);
    map.range(lo..=hi).map(|(_, h)| h.clone()).collect()
}
