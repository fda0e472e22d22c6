//! `ci`: commit modified, added and removed files.
//!
//! Each file is confirmed by a run of `M` lines followed by a
//! `Checked-in` (or `Remove-entry` for removals) response:
//!
//! ```text
//! M /cvsroot/mod/src/lib.c,v  <--  lib.c
//! M new revision: 1.6; previous revision: 1.5
//! Mode u=rw,g=rw,o=r
//! Checked-in src/
//! mod/src/lib.c
//! /lib.c/1.6//-kk/
//! ```

use super::{mode_string, strip_attic, CvsFile};
use crate::error::{CvsError, Result};
use crate::protocol::request::{message_argument, sticky_tag};
use crate::protocol::{argument, entry_line, split_path, DirectoryWalker, ReplyLine};
use crate::revision::increment;
use crate::session::Session;

const RCS_ARROW: &str = ",v  <--  ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckinState {
    NeedCheckIn,
    NeedNewRevision,
    NeedDone,
}

/// Revisions the server assigned to one committed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckinConfirmation {
    pub path: String,
    pub new_revision: String,
    /// Empty for an initial revision.
    pub old_revision: String,
}

pub struct CheckinParser {
    repo_module_path: String,
    state: CheckinState,
    path: String,
}

impl CheckinParser {
    pub fn new(repo_module_path: &str) -> Self {
        Self {
            repo_module_path: repo_module_path.to_string(),
            state: CheckinState::NeedCheckIn,
            path: String::new(),
        }
    }

    /// `Checked-in` or `Remove-entry` closes the current file.
    pub fn end_of_file(&mut self, line: &str) -> Result<()> {
        if self.state != CheckinState::NeedDone {
            return Err(CvsError::unexpected(self.state, line));
        }
        self.state = CheckinState::NeedCheckIn;
        Ok(())
    }

    pub fn feed(&mut self, text: &str) -> Result<Option<CheckinConfirmation>> {
        match self.state {
            CheckinState::NeedCheckIn => {
                if let Some(rest) = text.strip_prefix(self.repo_module_path.as_str()) {
                    let (path, _) = rest
                        .split_once(RCS_ARROW)
                        .ok_or_else(|| CvsError::unexpected(self.state, text))?;
                    self.path = strip_attic(path);
                    self.state = CheckinState::NeedNewRevision;
                }
                Ok(None)
            }
            CheckinState::NeedNewRevision => {
                let (new_revision, old_revision) = if let Some(rest) = text.strip_prefix("new revision: ") {
                    let (new, old) = rest
                        .split_once("; previous revision: ")
                        .ok_or_else(|| CvsError::unexpected(self.state, text))?;
                    let old = old.trim();
                    let new = if new == "delete" {
                        increment(old).ok_or_else(|| CvsError::unexpected(self.state, text))?
                    } else {
                        new.to_string()
                    };
                    (new, old.to_string())
                } else if let Some(rev) = text.strip_prefix("initial revision: ") {
                    (rev.trim().to_string(), String::new())
                } else {
                    return Ok(None);
                };
                self.state = CheckinState::NeedDone;
                Ok(Some(CheckinConfirmation {
                    path: std::mem::take(&mut self.path),
                    new_revision,
                    old_revision,
                }))
            }
            CheckinState::NeedDone => Ok(None),
        }
    }
}

impl Session {
    /// Commit `files` to `branch`. Live files are sent with their content,
    /// dead files as removals. On success every file carries the revision
    /// the server assigned.
    pub async fn checkin(&mut self, branch: &str, message: &str, files: &mut [CvsFile]) -> Result<()> {
        let sticky = sticky_tag(branch);
        let repo = self.repo_path().to_string();
        let module = self.module().to_string();
        let mut walker = DirectoryWalker::new(&repo, &module, sticky);
        let tag = walker.entry_tag();

        let stream = self.stream();
        message_argument(stream, message);
        argument(stream, "--");
        for file in files.iter() {
            let (dir, base) = split_path(&file.path);
            walker.enter(stream, dir);
            if file.is_dead {
                let removed = format!("-{}", file.revision);
                stream.write_line(&format!("Entry {}", entry_line(base, &removed, "-kk", &tag)));
                continue;
            }
            let revision = if file.revision.is_empty() { "0" } else { file.revision.as_str() };
            stream.write_line(&format!("Entry {}", entry_line(base, revision, "-kk", &tag)));
            stream.write_line(&format!("Modified {}", base));
            stream.write_line(mode_string(file.is_exec));
            stream.write_line(&file.content.len().to_string());
            stream.write_raw(&file.content);
        }
        walker.finish(stream);
        for file in files.iter() {
            argument(stream, &file.path);
        }
        stream.write_line("ci");
        stream.flush().await?;

        let mut parser = CheckinParser::new(&format!("{}/{}/", repo, module));
        loop {
            let stream = self.stream();
            let raw = stream.read_line().await?;
            let trailing = if raw.starts_with("Checked-in ") {
                2
            } else if raw.starts_with("Remove-entry ") {
                1
            } else {
                0
            };
            if trailing > 0 {
                parser.end_of_file(&raw)?;
                for _ in 0..trailing {
                    stream.read_line().await?;
                }
                continue;
            }

            let text = match ReplyLine::classify(raw)? {
                ReplyLine::Ok => break,
                ReplyLine::Message(text) => text,
                ReplyLine::Diagnostic(text) => {
                    tracing::warn!("CVS E: {}", text);
                    continue;
                }
                ReplyLine::Other(_) => continue,
            };
            tracing::debug!("CVS M: {}", text);

            let Some(confirmed) = parser.feed(&text)? else {
                continue;
            };
            let file = files
                .iter_mut()
                .find(|f| f.path == confirmed.path)
                .ok_or_else(|| CvsError::consistency(&confirmed.path, "checkin reported for file not sent"))?;
            if file.handled {
                return Err(CvsError::consistency(&confirmed.path, "duplicate checkin confirmation"));
            }
            if file.revision != confirmed.old_revision && !file.is_new {
                return Err(CvsError::consistency(
                    &confirmed.path,
                    format!(
                        "old revision {}, but {} is reported",
                        file.revision, confirmed.old_revision
                    ),
                ));
            }
            file.revision = confirmed.new_revision;
            file.handled = true;
        }

        if let Some(file) = files.iter().find(|f| !f.handled) {
            return Err(CvsError::consistency(&file.path, "no checkin confirmation"));
        }
        Ok(())
    }
}
