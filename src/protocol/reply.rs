//! Server reply lines.
//!
//! Every command reply is a run of tagged lines terminated by `ok` or by a
//! line starting with `error`. `E ` lines are diagnostics and never end a
//! reply.

use crate::error::{CvsError, Result};
use crate::transport::stream::decode_text;
use crate::transport::CvsStream;
use bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyLine {
    /// `ok`, end of a successful reply.
    Ok,
    /// `M <text>`, payload of a textual reply.
    Message(String),
    /// `E <text>`, operator diagnostic.
    Diagnostic(String),
    /// Any other response (`Created`, `Mode`, `Checked-in`, bare lines of a
    /// multi-line response, ...).
    Other(String),
}

impl ReplyLine {
    /// Classify a raw line. `error` lines become [`CvsError::ServerError`].
    pub fn classify(line: String) -> Result<Self> {
        if line == "ok" {
            return Ok(ReplyLine::Ok);
        }
        if line.starts_with("error") {
            return Err(CvsError::ServerError(line));
        }
        if line == "M" {
            return Ok(ReplyLine::Message(String::new()));
        }
        if let Some(text) = line.strip_prefix("M ") {
            return Ok(ReplyLine::Message(text.to_string()));
        }
        if let Some(text) = line.strip_prefix("E ") {
            return Ok(ReplyLine::Diagnostic(text.to_string()));
        }
        Ok(ReplyLine::Other(line))
    }
}

/// Read and classify the next reply line. Diagnostics are logged here so
/// no command can forget to surface them.
pub async fn next_reply(stream: &mut CvsStream) -> Result<ReplyLine> {
    let line = ReplyLine::classify(stream.read_line().await?)?;
    if let ReplyLine::Diagnostic(text) = &line {
        tracing::warn!("CVS E: {}", text);
    }
    Ok(line)
}

/// Read up to `ok`, returning the text after the last line that starts
/// with `prefix`.
pub async fn get_reply(stream: &mut CvsStream, prefix: &str) -> Result<Option<String>> {
    let mut found = None;
    loop {
        let raw = stream.read_line().await?;
        if let Some(rest) = raw.strip_prefix(prefix) {
            found = Some(rest.to_string());
        }
        match ReplyLine::classify(raw)? {
            ReplyLine::Ok => return Ok(found),
            ReplyLine::Diagnostic(text) => tracing::warn!("CVS E: {}", text),
            _ => {}
        }
    }
}

/// Read until the first line that starts with `prefix` and return the text
/// after it, or `None` when the reply ends first.
pub async fn first_match(stream: &mut CvsStream, prefix: &str) -> Result<Option<String>> {
    loop {
        let raw = stream.read_line().await?;
        if raw.starts_with("E ") {
            tracing::warn!("CVS E: {}", &raw[2..]);
        }
        if let Some(rest) = raw.strip_prefix(prefix) {
            return Ok(Some(rest.to_string()));
        }
        if prefix == "M " && raw == "M" {
            return Ok(Some(String::new()));
        }
        if let ReplyLine::Ok = ReplyLine::classify(raw)? {
            return Ok(None);
        }
    }
}

/// Next `M ` payload, or `None` at `ok`.
pub async fn next_message(stream: &mut CvsStream) -> Result<Option<String>> {
    first_match(stream, "M ").await
}

/// Next `M ` payload as raw bytes, or `None` at `ok`. Other lines are
/// skipped like [`next_message`] does.
pub async fn next_message_bytes(stream: &mut CvsStream) -> Result<Option<Bytes>> {
    loop {
        let raw = stream.read_line_bytes().await?;
        if raw.starts_with(b"M ") {
            return Ok(Some(raw.slice(2..)));
        }
        if &raw[..] == b"M" {
            return Ok(Some(Bytes::new()));
        }
        match ReplyLine::classify(decode_text(&raw))? {
            ReplyLine::Ok => return Ok(None),
            ReplyLine::Diagnostic(text) => tracing::warn!("CVS E: {}", text),
            _ => {}
        }
    }
}
