//! # corvid-proto
//!
//! IRC wire-protocol support for the corvid client: message parsing and
//! rendering, prefix decomposition, line framing, and async transport.
//!
//! ## Features
//!
//! - Never-failing message parsing; malformed lines decode to an empty
//!   command instead of an error
//! - RFC 1459 parameter handling, including the 14-middle-parameter cap
//! - Latin-1 fallback for inbound bytes that are not valid UTF-8
//! - Optional Tokio integration with TCP and TLS transports
//!
//! ## Quick Start
//!
//! ```rust
//! use corvid_proto::{ChannelExt, Message};
//!
//! let msg = Message::parse(":nick!user@host PRIVMSG #chan :hello world");
//! assert_eq!(msg.command, "PRIVMSG");
//! assert_eq!(msg.source(), Some("nick"));
//! assert!(msg.params[0].is_channel_name());
//! assert_eq!(msg.trailing(), Some("hello world"));
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod chan;
pub mod error;
#[cfg(feature = "tokio")]
pub mod line;
pub mod message;
pub mod prefix;
#[cfg(feature = "tokio")]
pub mod transport;
pub mod util;

pub use self::chan::ChannelExt;
pub use self::error::ProtocolError;
#[cfg(feature = "tokio")]
pub use self::line::{LineCodec, MAX_INBOUND_LINE};
pub use self::message::{Message, Params, MAX_MIDDLE_PARAMS};
pub use self::prefix::Prefix;
#[cfg(feature = "tokio")]
pub use self::transport::Transport;
pub use self::util::{truncate_utf8_safe, wrap_text, wrap_width};
