//! Channel name classification.

/// Extension trait for telling channel names apart from nicks.
pub trait ChannelExt {
    /// True when the name starts with a channel sigil.
    ///
    /// `#` and `&` are the RFC 1459 forms; `+` (modeless) and `!` (safe)
    /// were added in RFC 2811.
    fn is_channel_name(&self) -> bool;
}

impl ChannelExt for str {
    fn is_channel_name(&self) -> bool {
        matches!(self.chars().next(), Some('&' | '#' | '+' | '!'))
    }
}
