use crate::error::{MartechError, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumString, IntoStaticStr};

/// Talker for commands sent to the profiler.
pub const COMMAND_TALKER: &str = "PWETC";
/// Talker for replies and acknowledgements.
pub const RESPONSE_TALKER: &str = "PWETA";
/// Talker for bulk file data.
pub const BULK_TALKER: &str = "PWETB";

/// Which controller a sentence is addressed to.
#[derive(
    EnumString, IntoStaticStr, Display, Deserialize, Serialize, Copy, Clone, Debug, PartialEq, Eq,
)]
pub enum Listener {
    /// Profiler controller, the control can.
    PC,
    /// Winch controller.
    WC,
}

/// XOR of every byte of the sentence from the leading `$` up to, but not
/// including, the `*`.
pub fn checksum(body: &[u8]) -> u8 {
    body.iter().fold(0, |acc, byte| acc ^ byte)
}

/// A sentence to be written to the controller.
///
/// Encodes as `$<talker>,<listener>,,,,<MNEMONIC>[,<argc>,<args..>]*<CS>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    talker: &'static str,
    listener: Listener,
    mnemonic: String,
    args: Vec<String>,
}

impl Command {
    /// A `$PWETC` command for the given controller.
    ///
    /// * `listener`: controller the command is for.
    /// * `mnemonic`: command name, e.g. `DIR`.
    pub fn new<S: Into<String>>(listener: Listener, mnemonic: S) -> Self {
        Self {
            talker: COMMAND_TALKER,
            listener,
            mnemonic: mnemonic.into(),
            args: Vec::new(),
        }
    }

    /// A `$PWETA` sentence, the form the controller replies in.
    pub fn response<S: Into<String>>(listener: Listener, mnemonic: S) -> Self {
        Self {
            talker: RESPONSE_TALKER,
            ..Self::new(listener, mnemonic)
        }
    }

    /// Acknowledge a bulk block.
    pub fn ack() -> Self {
        Self::response(Listener::PC, "ACK")
    }

    /// Refuse a bulk block.
    pub fn nak() -> Self {
        Self::new(Listener::PC, "NAK")
    }

    /// Append an argument. The argument count is derived when encoding.
    pub fn arg<T: fmt::Display>(mut self, arg: T) -> Self {
        self.args.push(arg.to_string());
        self
    }

    /// Command name.
    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    /// Controller the command is for.
    pub fn listener(&self) -> Listener {
        self.listener
    }

    /// Full sentence including the checksum, without a line ending.
    pub fn encode(&self) -> String {
        let mut body = format!("${},{},,,,{}", self.talker, self.listener, self.mnemonic);
        if !self.args.is_empty() {
            body.push_str(&format!(",{},{}", self.args.len(), self.args.join(",")));
        }
        let cs = checksum(body.as_bytes());
        format!("{body}*{cs:02X}")
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// A `$PWETA` reply, or an echoed `$PWETC` command, split into its fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Sentence {
    /// Controller that replied, when recognised.
    pub listener: Option<Listener>,
    /// Command echo, or `NAK`.
    pub command: String,
    /// Arguments that followed the argument count.
    pub args: Vec<String>,
    /// False when a checksum was present and did not match.
    pub checksum_ok: bool,
}

impl Sentence {
    /// Parse the last complete `$PWETA` or `$PWETC` sentence found in
    /// `text`.
    ///
    /// * `text`: raw reply, possibly holding several lines.
    pub fn parse(text: &str) -> Result<Self> {
        let (start, end) = [RESPONSE_TALKER, COMMAND_TALKER]
            .iter()
            .filter_map(|talker| {
                let pattern = format!("${talker},");
                text.rmatch_indices(pattern.as_str())
                    .find_map(|(start, _)| text[start..].find('*').map(|end| (start, start + end)))
            })
            .max_by_key(|(start, _)| *start)
            .ok_or_else(|| {
                MartechError::no_match("reply", &format!("${RESPONSE_TALKER},|${COMMAND_TALKER},"), text)
            })?;

        let body = &text[start..end];
        let received = text.get(end + 1..end + 3);
        let checksum_ok = match received.map(|cs| u8::from_str_radix(cs, 16)) {
            Some(Ok(cs)) => cs == checksum(body.as_bytes()),
            _ => true,
        };
        if !checksum_ok {
            warn!("checksum mismatch on {:?}", &text[start..]);
        }

        let fields: Vec<&str> = body.split(',').collect();
        Ok(Self {
            listener: fields.get(1).and_then(|f| f.parse().ok()),
            command: fields.get(5).unwrap_or(&"").to_string(),
            args: fields.iter().skip(7).map(|f| f.to_string()).collect(),
            checksum_ok,
        })
    }

    /// Arguments joined back together with commas.
    pub fn value(&self) -> String {
        self.args.join(",")
    }

    /// First argument, or an empty string.
    pub fn first(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or("")
    }

    /// True when the controller refused the command.
    pub fn is_nak(&self) -> bool {
        self.command == "NAK"
    }

    /// Parse the first argument, reporting `field` on failure.
    pub fn parse_first<T: std::str::FromStr>(&self, field: &'static str) -> Result<T> {
        self.first()
            .trim()
            .parse()
            .map_err(|_| MartechError::parse(field, self.first()))
    }
}
