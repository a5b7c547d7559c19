//! IRC wire message parsing and rendering.
//!
//! Parsing never fails. A line that does not match the grammar decodes to a
//! message with an empty command and no parameters, which dispatch layers
//! skip naturally because no hook registers for the empty command. This
//! keeps the read loop free of error plumbing for hostile input.

use std::fmt;

use smallvec::SmallVec;

use crate::prefix::Prefix;

/// Middle parameters are capped at 14; the 15th slot swallows the rest of
/// the line verbatim, spaces included.
pub const MAX_MIDDLE_PARAMS: usize = 14;

/// Parameter storage. Most messages carry four or fewer parameters, so
/// they stay inline without a heap allocation for the vector itself.
pub type Params = SmallVec<[String; 4]>;

/// A single parsed IRC line.
///
/// The grammar is `[:prefix ]command[ params][ :trailing]`. The trailing
/// part, when present, is stored as the last entry of `params` with its
/// leading `:` stripped; rendering restores the `:` whenever the last
/// parameter is empty, contains a space, or itself starts with `:`.
///
/// # Examples
///
/// ```
/// use corvid_proto::Message;
///
/// let msg = Message::parse(":nick!user@host PRIVMSG #chan :hello world");
/// assert_eq!(msg.command, "PRIVMSG");
/// assert_eq!(msg.params.as_slice(), ["#chan", "hello world"]);
/// assert_eq!(msg.source(), Some("nick"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The line exactly as received, without the trailing CRLF.
    pub raw: String,
    /// Message source, when the line carried a `:prefix`.
    pub prefix: Option<Prefix>,
    /// Command or numeric, uppercased. Empty when the line was malformed.
    pub command: String,
    /// Positional parameters, trailing included as the last entry.
    pub params: Params,
}

impl Message {
    /// Parse a wire line.
    ///
    /// Lines the grammar rejects come back with an empty `command`; see
    /// [`Message::is_malformed`]. Rejected shapes include an empty line, a
    /// bad prefix (empty source, `!user` with no host), a command token
    /// containing `:`, and a trailing space with nothing after it.
    pub fn parse(line: &str) -> Self {
        match parse_line(line) {
            Some((prefix, command, params)) => Self {
                raw: line.to_string(),
                prefix,
                command,
                params,
            },
            None => Self {
                raw: line.to_string(),
                prefix: None,
                command: String::new(),
                params: Params::new(),
            },
        }
    }

    /// True when the line failed to parse and the message should be
    /// ignored.
    pub fn is_malformed(&self) -> bool {
        self.command.is_empty()
    }

    /// The nick or server name the message came from.
    pub fn source(&self) -> Option<&str> {
        self.prefix.as_ref().map(|p| p.source.as_str())
    }

    /// The last parameter, which for most commands is the trailing text.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }
}

fn parse_line(line: &str) -> Option<(Option<Prefix>, String, Params)> {
    let mut rest = line;

    let prefix = match rest.strip_prefix(':') {
        Some(tail) => {
            // A prefix must be followed by a space and a command.
            let (token, after) = tail.split_once(' ')?;
            rest = after;
            Some(Prefix::parse(token)?)
        }
        None => None,
    };

    let (command, after) = match rest.split_once(' ') {
        Some((cmd, after)) => (cmd, Some(after)),
        None => (rest, None),
    };
    if command.is_empty() || command.contains(':') {
        return None;
    }

    let params = match after {
        None => Params::new(),
        // A space after the command with nothing behind it is malformed.
        Some("") => return None,
        Some(text) => parse_params(text),
    };

    Some((prefix, command.to_ascii_uppercase(), params))
}

/// Split the parameter section on single spaces.
///
/// Consecutive spaces yield empty middle parameters rather than being
/// collapsed. A `:` opens the trailing parameter, and once
/// [`MAX_MIDDLE_PARAMS`] middles have been taken the rest of the text
/// becomes the final parameter verbatim, `:` or not.
fn parse_params(mut text: &str) -> Params {
    let mut params = Params::new();
    loop {
        if text.is_empty() {
            break;
        }
        if let Some(trailing) = text.strip_prefix(':') {
            params.push(trailing.to_string());
            break;
        }
        if params.len() == MAX_MIDDLE_PARAMS {
            params.push(text.to_string());
            break;
        }
        match text.split_once(' ') {
            Some((param, tail)) => {
                params.push(param.to_string());
                text = tail;
            }
            None => {
                params.push(text.to_string());
                break;
            }
        }
    }
    params
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&self.command)?;
        if let Some((last, middles)) = self.params.split_last() {
            for param in middles {
                write!(f, " {param}")?;
            }
            if last.is_empty() || last.starts_with(':') || last.contains(' ') {
                write!(f, " :{last}")?;
            } else {
                write!(f, " {last}")?;
            }
        }
        Ok(())
    }
}
