//! `rlist`: list the files of a module at a branch or date.
//!
//! ```text
//! mod/src/docs:
//! /Makefile.am/1.1/Sat Apr 27 18:27:51 2013/-kk/
//! D/images////
//!
//! ```

use crate::date::{format_rfc2822, parse_entry_date};
use crate::error::{CvsError, Result};
use crate::commands::transcript::{self, Recorder};
use crate::protocol::{arguments, next_message_bytes, request::sticky_tag};
use crate::transport::stream::decode_text;
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RlistEntry {
    pub path: String,
    pub revision: String,
    /// Zero when the date column cannot be parsed.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RlistState {
    NeedDirectory,
    NeedFiles,
}

pub struct RlistParser {
    module: String,
    state: RlistState,
    /// Current directory relative to the module, with a trailing `/`.
    dir: String,
}

impl RlistParser {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            state: RlistState::NeedDirectory,
            dir: String::new(),
        }
    }

    pub fn feed(&mut self, line: &str) -> Result<Option<RlistEntry>> {
        match self.state {
            RlistState::NeedDirectory => {
                if line.is_empty() {
                    return Ok(None);
                }
                if line.starts_with('/') || !line.ends_with(':') {
                    return Err(CvsError::unexpected(self.state, line));
                }
                let rest = line
                    .strip_prefix(self.module.as_str())
                    .filter(|r| !r.is_empty())
                    .ok_or_else(|| CvsError::unexpected(self.state, line))?;
                let rest = &rest[..rest.len() - 1];
                if !rest.is_empty() && !rest.starts_with('/') {
                    return Err(CvsError::unexpected(self.state, line));
                }
                self.dir = match rest.strip_prefix('/') {
                    Some(sub) if !sub.is_empty() => format!("{}/", sub),
                    _ => String::new(),
                };
                self.state = RlistState::NeedFiles;
                Ok(None)
            }
            RlistState::NeedFiles => {
                if line.is_empty() {
                    self.state = RlistState::NeedDirectory;
                    return Ok(None);
                }
                // Directories (`D/...`) and anything else not a file entry
                let Some(entry) = line.strip_prefix('/') else {
                    return Ok(None);
                };
                let mut fields = entry.splitn(4, '/');
                let (Some(name), Some(revision), Some(date), Some(_)) =
                    (fields.next(), fields.next(), fields.next(), fields.next())
                else {
                    return Err(CvsError::unexpected(self.state, line));
                };
                Ok(Some(RlistEntry {
                    path: format!("{}{}", self.dir, name),
                    revision: revision.to_string(),
                    timestamp: parse_entry_date(date).unwrap_or(0),
                }))
            }
        }
    }
}

impl Session {
    /// List `branch` (optionally as of `date`), including dead files when
    /// `show_dead` is set.
    pub async fn rlist<F>(
        &mut self,
        branch: &str,
        show_dead: bool,
        date: Option<i64>,
        mut on_entry: F,
    ) -> Result<()>
    where
        F: FnMut(RlistEntry) -> Result<()>,
    {
        let module = self.module().to_string();
        let cache = self.config().rlist_cache.clone();
        let mut parser = RlistParser::new(module.clone());

        if let Some(lines) = transcript::replay(cache.as_deref()).await? {
            for raw in lines {
                if let Some(entry) = parser.feed(&decode_text(&raw))? {
                    on_entry(entry)?;
                }
            }
            return Ok(());
        }

        let stream = self.stream();
        arguments(stream, &["-e", "-R"]);
        if show_dead {
            arguments(stream, &["-d"]);
        }
        if let Some(tag) = sticky_tag(branch) {
            arguments(stream, &["-r", tag]);
        }
        if let Some(ts) = date {
            arguments(stream, &["-D", &format_rfc2822(ts)]);
        }
        arguments(stream, &["--", &module]);
        stream.write_line("rlist");
        stream.flush().await?;

        let mut recorder = Recorder::new(cache.as_deref());
        while let Some(raw) = next_message_bytes(stream).await? {
            recorder.push(&raw);
            if let Some(entry) = parser.feed(&decode_text(&raw))? {
                on_entry(entry)?;
            }
        }
        recorder.save().await
    }

    /// List the files of `branch`, through `rlist` when the server has it
    /// and a full checkout otherwise.
    pub async fn list_files(&mut self, branch: &str, date: Option<i64>) -> Result<Vec<RlistEntry>> {
        let mut entries = Vec::new();
        if self.capabilities().rlist {
            self.rlist(branch, false, date, |entry| {
                entries.push(entry);
                Ok(())
            })
            .await?;
        } else {
            self.checkout_branch(branch, date, |file| {
                entries.push(RlistEntry {
                    path: file.path,
                    revision: file.revision,
                    timestamp: file.timestamp,
                });
                Ok(())
            })
            .await?;
        }
        Ok(entries)
    }
}
