//! Inbound message classification.
//!
//! Wraps a parsed wire [`Message`] with everything dispatch needs: the
//! channel it arrived on, where replies should go, the detected trigger
//! text, and the per-message permission map.

use std::collections::HashMap;

use corvid_proto::{ChannelExt, Message};

/// A parsed line plus dispatch context.
#[derive(Debug, Clone)]
pub struct Inbound {
    /// The wire message.
    pub msg: Message,
    /// Channel the message arrived on, lowercased; `None` for private
    /// messages and non-channel commands.
    pub channel: Option<String>,
    /// Where replies go: the channel as written, else the sender.
    pub reply_to: Option<String>,
    /// Detected trigger text (see [`Inbound::parse`]); present whenever
    /// the addressing form matched, even with an empty remainder.
    pub trigger: Option<String>,
    /// Plugin name → effective level, computed once per message before
    /// trigger and command dispatch.
    pub permissions: HashMap<String, u32>,
}

impl Inbound {
    /// Parse a raw line and classify it.
    ///
    /// For PRIVMSG and NOTICE, a first parameter with a channel sigil
    /// becomes the channel (stored lowercased; replies keep the original
    /// spelling) and otherwise replies target the sender. For PRIVMSG the
    /// trailing text is scanned for a trigger: with `directed` set, channel
    /// messages must open with our nick followed by `,` or `:` (one
    /// following space is swallowed) while private messages are triggers
    /// in their entirety; without it, a leading `!` marks the trigger.
    pub fn parse(line: &str, nick: &str, directed: bool) -> Self {
        Self::from_message(Message::parse(line), nick, directed)
    }

    /// Classify an already-parsed message.
    pub fn from_message(msg: Message, nick: &str, directed: bool) -> Self {
        let mut inbound = Self {
            msg,
            channel: None,
            reply_to: None,
            trigger: None,
            permissions: HashMap::new(),
        };

        if matches!(inbound.msg.command.as_str(), "PRIVMSG" | "NOTICE") {
            if let Some(target) = inbound.msg.params.first() {
                if target.is_channel_name() {
                    inbound.channel = Some(target.to_lowercase());
                    inbound.reply_to = Some(target.clone());
                } else {
                    inbound.reply_to = inbound.msg.source().map(str::to_string);
                }
            }
        }

        if inbound.msg.command == "PRIVMSG" {
            inbound.trigger = inbound.detect_trigger(nick, directed);
        }

        inbound
    }

    fn detect_trigger(&self, nick: &str, directed: bool) -> Option<String> {
        let text = self.msg.trailing()?;

        if directed {
            if self.channel.is_some() {
                strip_nick_address(text, nick).map(str::to_string)
            } else {
                Some(text.to_string())
            }
        } else {
            text.strip_prefix('!').map(str::to_string)
        }
    }
}

/// Strip a leading `nick,` or `nick:` address, case-insensitively, plus
/// one space after the separator when present.
fn strip_nick_address<'a>(text: &'a str, nick: &str) -> Option<&'a str> {
    if nick.is_empty() {
        return None;
    }
    let mut chars = text.char_indices();
    for expected in nick.chars() {
        let (_, found) = chars.next()?;
        if !found.eq_ignore_ascii_case(&expected) {
            return None;
        }
    }
    let (idx, sep) = chars.next()?;
    if sep != ',' && sep != ':' {
        return None;
    }
    let rest = &text[idx + sep.len_utf8()..];
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}
