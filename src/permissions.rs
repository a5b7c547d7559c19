//! Permission rules and evaluation.
//!
//! Rules map a wildcard mask over `nick!user@host` to per-plugin
//! levels, with `ANY` standing for every plugin. Evaluation runs all
//! matching allow rules first, keeping the highest level granted per
//! plugin, then all matching deny rules, clamping downward. A deny for
//! `ANY` caps every level already granted; a deny naming a plugin both
//! seeds and caps that plugin's entry.

use std::collections::{BTreeMap, HashMap};

use regex::Regex;

use corvid_proto::Prefix;

/// Sentinel plugin name matching every plugin.
pub const ANY_PLUGIN: &str = "ANY";

/// mask -> plugin -> level. Ordered so rule application is
/// deterministic across runs.
pub type RuleMap = BTreeMap<String, BTreeMap<String, u32>>;

/// Matches a `*`-wildcard mask against a rendered `nick!user@host`.
/// Anchored and case-sensitive; everything but `*` is literal.
pub fn mask_matches(mask: &str, rendered: &str) -> bool {
    let pattern = format!("^{}$", regex::escape(mask).replace(r"\*", ".*"));
    Regex::new(&pattern)
        .map(|re| re.is_match(rendered))
        .unwrap_or(false)
}

/// Computes the per-plugin levels a message source holds. A missing
/// prefix holds nothing.
pub fn evaluate(
    allow: &RuleMap,
    deny: &RuleMap,
    prefix: Option<&Prefix>,
) -> HashMap<String, u32> {
    let mut held = HashMap::new();
    let Some(prefix) = prefix else {
        return held;
    };
    let rendered = prefix.to_string();

    for (mask, rules) in allow {
        if !mask_matches(mask, &rendered) {
            continue;
        }
        for (plugin, level) in rules {
            held.entry(plugin.clone())
                .and_modify(|cur: &mut u32| *cur = (*cur).max(*level))
                .or_insert(*level);
        }
    }

    for (mask, rules) in deny {
        if !mask_matches(mask, &rendered) {
            continue;
        }
        for (plugin, level) in rules {
            if plugin == ANY_PLUGIN {
                for cur in held.values_mut() {
                    *cur = (*cur).min(*level);
                }
            } else {
                held.entry(plugin.clone())
                    .and_modify(|cur| *cur = (*cur).min(*level))
                    .or_insert(*level);
            }
        }
    }

    held
}

/// The level `held` grants for `plugin`: its own entry, else `ANY`,
/// else nothing.
pub fn effective(held: &HashMap<String, u32>, plugin: &str) -> u32 {
    held.get(plugin)
        .or_else(|| held.get(ANY_PLUGIN))
        .copied()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix(rendered: &str) -> Prefix {
        Prefix::parse(rendered).unwrap()
    }

    fn rules(entries: &[(&str, &[(&str, u32)])]) -> RuleMap {
        entries
            .iter()
            .map(|(mask, grants)| {
                (
                    mask.to_string(),
                    grants
                        .iter()
                        .map(|(plugin, level)| (plugin.to_string(), *level))
                        .collect(),
                )
            })
            .collect()
    }

    #[test]
    fn masks_glob_on_star_only() {
        assert!(mask_matches("boss!*@*", "boss!b@h"));
        assert!(mask_matches("*", "anyone!a@b"));
        assert!(mask_matches("*!*@host.example", "n!u@host.example"));
        // Dots are literal, not regex wildcards.
        assert!(!mask_matches("*!*@host.example", "n!u@hostXexample"));
        // Case matters.
        assert!(!mask_matches("Boss!*@*", "boss!b@h"));
        // Anchored at both ends.
        assert!(!mask_matches("boss", "boss!b@h"));
    }

    #[test]
    fn no_prefix_holds_nothing() {
        let allow = rules(&[("*", &[("ANY", 1)])]);
        let held = evaluate(&allow, &RuleMap::new(), None);
        assert!(held.is_empty());
        assert_eq!(effective(&held, "conn"), 0);
    }

    #[test]
    fn allow_keeps_the_highest_grant() {
        let allow = rules(&[
            ("*", &[("song", 5)]),
            ("nick!*@*", &[("song", 9)]),
            ("*!user@*", &[("song", 2)]),
        ]);
        let held = evaluate(&allow, &RuleMap::new(), Some(&prefix("nick!user@host")));
        assert_eq!(effective(&held, "song"), 9);
    }

    #[test]
    fn every_allow_applies_before_any_deny() {
        let allow = rules(&[("n*", &[("song", 10)]), ("nick!*", &[("song", 90)])]);
        // The deny mask sorts between the allow masks. It must clamp the
        // full allow result (90), not an intermediate one: interleaving
        // by mask order would min(10, 50) first and end at 90.
        let deny = rules(&[("nic*", &[("song", 50)])]);
        let held = evaluate(&allow, &deny, Some(&prefix("nick!user@host")));
        assert_eq!(effective(&held, "song"), 50);
    }

    #[test]
    fn deny_clamps_a_named_plugin() {
        let allow = rules(&[("*", &[("song", 100)])]);
        let deny = rules(&[("guest!*@*", &[("song", 10)])]);
        let held = evaluate(&allow, &deny, Some(&prefix("guest!g@h")));
        assert_eq!(effective(&held, "song"), 10);
        // Non-matching sources are untouched.
        let held = evaluate(&allow, &deny, Some(&prefix("boss!b@h")));
        assert_eq!(effective(&held, "song"), 100);
    }

    #[test]
    fn deny_any_clamps_every_grant_but_seeds_none() {
        let allow = rules(&[("*", &[("song", 50), ("ANY", 20)])]);
        let deny = rules(&[("guest!*@*", &[("ANY", 5)])]);
        let held = evaluate(&allow, &deny, Some(&prefix("guest!g@h")));
        assert_eq!(held.get("song"), Some(&5));
        assert_eq!(held.get("ANY"), Some(&5));
        // Plugins with no entry still fall through to the clamped ANY.
        assert_eq!(effective(&held, "conn"), 5);
        assert_eq!(held.len(), 2);
    }

    #[test]
    fn deny_for_an_unheld_plugin_seeds_its_entry() {
        let deny = rules(&[("*", &[("song", 3)])]);
        let held = evaluate(&RuleMap::new(), &deny, Some(&prefix("n!u@h")));
        assert_eq!(effective(&held, "song"), 3);
    }

    #[test]
    fn named_entry_beats_any_even_when_lower() {
        let allow = rules(&[("*", &[("ANY", 100), ("song", 1)])]);
        let held = evaluate(&allow, &RuleMap::new(), Some(&prefix("n!u@h")));
        assert_eq!(effective(&held, "song"), 1);
        assert_eq!(effective(&held, "conn"), 100);
    }

    #[test]
    fn allow_needs_two_passes_to_raise_after_deny() {
        // Denies always run last: an allow cannot out-rank a deny that
        // matches the same source.
        let allow = rules(&[("n*", &[("song", 80)])]);
        let deny = rules(&[("*", &[("song", 30)])]);
        let held = evaluate(&allow, &deny, Some(&prefix("n!u@h")));
        assert_eq!(effective(&held, "song"), 30);
    }
}
