//! KATCP message types.

use serde::Serialize;
use std::fmt;

/// Message type, carried on the wire as the first character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// `?name ...`
    Request,
    /// `!name ...`
    Reply,
    /// `#name ...`
    Inform,
}

impl MessageKind {
    pub fn type_char(self) -> char {
        match self {
            Self::Request => '?',
            Self::Reply => '!',
            Self::Inform => '#',
        }
    }

    pub fn from_type_char(c: char) -> Option<Self> {
        match c {
            '?' => Some(Self::Request),
            '!' => Some(Self::Reply),
            '#' => Some(Self::Inform),
            _ => None,
        }
    }
}

/// An ordered word list with a type.
///
/// Word 0 is the message name (without the type character); the remaining
/// words are its arguments, so `arg(1)` is the first argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    kind: MessageKind,
    words: Vec<String>,
}

impl Message {
    /// Create an empty message of the given kind.
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            words: Vec::new(),
        }
    }

    /// Build a request from its name and arguments.
    pub fn request(name: &str, args: &[&str]) -> Self {
        Self::with_words(MessageKind::Request, name, args)
    }

    /// Build a message of any kind from its name and arguments.
    pub fn with_words(kind: MessageKind, name: &str, args: &[&str]) -> Self {
        let mut message = Self::new(kind);
        message.add_word(name);
        for arg in args {
            message.add_word(*arg);
        }
        message
    }

    /// `?sensor-sampling <sensor> auto`
    pub fn sensor_sampling(sensor: &str) -> Self {
        Self::request("sensor-sampling", &[sensor, "auto"])
    }

    /// Append a word.
    pub fn add_word(&mut self, word: impl Into<String>) -> &mut Self {
        self.words.push(word.into());
        self
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Message name (word 0).
    pub fn name(&self) -> Option<&str> {
        self.arg(0)
    }

    /// Word at positional index; 0 is the name.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.words.get(index).map(String::as_str)
    }

    /// Number of arguments after the name.
    pub fn arg_count(&self) -> usize {
        self.words.len().saturating_sub(1)
    }

    /// True for a reply whose status word is `ok`.
    pub fn is_ok_reply(&self) -> bool {
        self.kind == MessageKind::Reply && self.arg(1) == Some("ok")
    }

    /// Human-readable rendering for logs: `{type}{word0} word1 word2 ...`.
    ///
    /// Not escaped; wire encoding is done by [`crate::KatcpCodec`].
    pub fn compose(&self) -> String {
        let mut out = String::new();
        out.push(self.kind.type_char());
        out.push_str(&self.words.join(" "));
        out
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.compose())
    }
}
