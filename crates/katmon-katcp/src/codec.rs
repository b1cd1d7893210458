//! KATCP line framing.
//!
//! One message per `\n`-terminated line, words separated by spaces or tabs.
//! Escapes inside words: `\\ \_ \0 \n \r \e \t`, and a lone `\@` for an
//! empty word.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::error::{KatcpError, KatcpResult};
use crate::message::{Message, MessageKind};

/// Default upper bound on a single line.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Codec for KATCP messages.
///
/// Lines that are not valid messages are logged and skipped so that one bad
/// line does not end the stream.
#[derive(Debug, Clone)]
pub struct KatcpCodec {
    max_line_length: usize,
    next_index: usize,
}

impl KatcpCodec {
    pub fn new(max_line_length: usize) -> Self {
        Self {
            max_line_length,
            next_index: 0,
        }
    }
}

impl Default for KatcpCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LENGTH)
    }
}

impl Decoder for KatcpCodec {
    type Item = Message;
    type Error = KatcpError;

    fn decode(&mut self, src: &mut BytesMut) -> KatcpResult<Option<Message>> {
        loop {
            let newline = src[self.next_index..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| self.next_index + offset);

            let Some(end) = newline else {
                if src.len() > self.max_line_length {
                    return Err(KatcpError::LineTooLong {
                        max: self.max_line_length,
                    });
                }
                self.next_index = src.len();
                return Ok(None);
            };

            self.next_index = 0;
            let line = src.split_to(end + 1);
            if end > self.max_line_length {
                return Err(KatcpError::LineTooLong {
                    max: self.max_line_length,
                });
            }
            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end_matches(['\n', '\r']);
            if text.trim().is_empty() {
                continue;
            }

            match parse_line(text) {
                Ok(message) => return Ok(Some(message)),
                Err(e) => warn!(error = %e, line = %text, "Discarding unparseable KATCP line"),
            }
        }
    }
}

impl Encoder<Message> for KatcpCodec {
    type Error = KatcpError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> KatcpResult<()> {
        let Some(name) = message.name() else {
            return Err(KatcpError::EmptyMessage);
        };

        let mut line = String::with_capacity(64);
        line.push(message.kind().type_char());
        line.push_str(name);
        for word in &message.words()[1..] {
            line.push(' ');
            escape_into(word, &mut line);
        }
        line.push('\n');

        dst.reserve(line.len());
        dst.put_slice(line.as_bytes());
        Ok(())
    }
}

/// Parse a single line (without terminator) into a message.
pub fn parse_line(line: &str) -> KatcpResult<Message> {
    let mut words = line.split([' ', '\t']).filter(|w| !w.is_empty());

    let head = words
        .next()
        .ok_or_else(|| KatcpError::Parse("empty line".to_string()))?;
    let mut chars = head.chars();
    let kind = chars
        .next()
        .and_then(MessageKind::from_type_char)
        .ok_or_else(|| KatcpError::Parse(format!("bad message type in {head:?}")))?;
    let name = chars.as_str();
    if name.is_empty() {
        return Err(KatcpError::Parse("missing message name".to_string()));
    }

    let mut message = Message::new(kind);
    message.add_word(name);
    for word in words {
        message.add_word(unescape(word));
    }
    Ok(message)
}

fn unescape(word: &str) -> String {
    if word == "\\@" {
        return String::new();
    }
    let mut out = String::with_capacity(word.len());
    let mut chars = word.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('_') => out.push(' '),
            Some('0') => out.push('\0'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('e') => out.push('\x1b'),
            Some('t') => out.push('\t'),
            Some('@') => {}
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn escape_into(word: &str, out: &mut String) {
    if word.is_empty() {
        out.push_str("\\@");
        return;
    }
    for c in word.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ' ' => out.push_str("\\_"),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x1b' => out.push_str("\\e"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
}
