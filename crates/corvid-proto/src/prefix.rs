//! Message source prefixes.

use std::fmt;

/// The source of an IRC message: `source[!user][@host]`.
///
/// Server-originated messages carry just the server name. Messages relayed
/// from another client carry the full `nick!user@host` form. A bare
/// `nick@host` (no user) is also accepted, matching the wire grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefix {
    /// Nick or server name.
    pub source: String,
    /// Username; only ever present together with a host.
    pub user: Option<String>,
    /// Hostname; present whenever the prefix names a client.
    pub host: Option<String>,
}

impl Prefix {
    /// Parse a prefix token, without the leading `:`.
    ///
    /// Returns `None` for shapes the grammar rejects: an empty source,
    /// user or host, or a `!user` part with no `@host` after it.
    ///
    /// # Examples
    ///
    /// ```
    /// use corvid_proto::Prefix;
    ///
    /// let p = Prefix::parse("nick!user@host.example").unwrap();
    /// assert_eq!(p.source, "nick");
    /// assert_eq!(p.user.as_deref(), Some("user"));
    /// assert_eq!(p.host.as_deref(), Some("host.example"));
    ///
    /// assert!(Prefix::parse("nick!user").is_none());
    /// ```
    pub fn parse(token: &str) -> Option<Self> {
        // The source runs up to the first '!' or '@'. Tokens arrive
        // pre-split on spaces, so no space handling is needed here.
        let end = token.find(['!', '@']).unwrap_or(token.len());
        let source = &token[..end];
        if source.is_empty() {
            return None;
        }
        let rest = &token[end..];

        if rest.is_empty() {
            return Some(Self {
                source: source.to_string(),
                user: None,
                host: None,
            });
        }

        if let Some(host) = rest.strip_prefix('@') {
            if host.is_empty() {
                return None;
            }
            return Some(Self {
                source: source.to_string(),
                user: None,
                host: Some(host.to_string()),
            });
        }

        // rest starts with '!'; a user part is only valid when a host follows
        let (user, host) = rest[1..].split_once('@')?;
        if user.is_empty() || host.is_empty() {
            return None;
        }
        Some(Self {
            source: source.to_string(),
            user: Some(user.to_string()),
            host: Some(host.to_string()),
        })
    }

    /// True when the prefix carries a user and host, i.e. names a client
    /// rather than a server.
    pub fn is_client(&self) -> bool {
        self.host.is_some()
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)?;
        if let Some(user) = &self.user {
            write!(f, "!{user}")?;
        }
        if let Some(host) = &self.host {
            write!(f, "@{host}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_prefix() {
        let p = Prefix::parse("irc.example.org").unwrap();
        assert_eq!(p.source, "irc.example.org");
        assert_eq!(p.user, None);
        assert_eq!(p.host, None);
        assert!(!p.is_client());
    }

    #[test]
    fn full_client_prefix() {
        let p = Prefix::parse("nick!user@host").unwrap();
        assert_eq!(p.source, "nick");
        assert_eq!(p.user.as_deref(), Some("user"));
        assert_eq!(p.host.as_deref(), Some("host"));
        assert!(p.is_client());
    }

    #[test]
    fn host_without_user() {
        let p = Prefix::parse("nick@host").unwrap();
        assert_eq!(p.source, "nick");
        assert_eq!(p.user, None);
        assert_eq!(p.host.as_deref(), Some("host"));
    }

    #[test]
    fn user_without_host_rejected() {
        assert!(Prefix::parse("nick!user").is_none());
    }

    #[test]
    fn empty_parts_rejected() {
        assert!(Prefix::parse("").is_none());
        assert!(Prefix::parse("!user@host").is_none());
        assert!(Prefix::parse("nick!@host").is_none());
        assert!(Prefix::parse("nick!user@").is_none());
        assert!(Prefix::parse("@host").is_none());
    }

    #[test]
    fn at_before_bang_binds_to_host() {
        // '!' after the '@' belongs to the host, not a user part
        let p = Prefix::parse("a@b!c").unwrap();
        assert_eq!(p.source, "a");
        assert_eq!(p.user, None);
        assert_eq!(p.host.as_deref(), Some("b!c"));
    }

    #[test]
    fn user_stops_at_first_at() {
        let p = Prefix::parse("nick!us@er@host").unwrap();
        assert_eq!(p.user.as_deref(), Some("us"));
        assert_eq!(p.host.as_deref(), Some("er@host"));
    }

    #[test]
    fn display_round_trips() {
        for raw in ["irc.example.org", "nick!user@host", "nick@host"] {
            assert_eq!(Prefix::parse(raw).unwrap().to_string(), raw);
        }
    }
}
