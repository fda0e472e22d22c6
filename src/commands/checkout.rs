//! `co`: fetch file content, one revision at a time or a whole branch.
//!
//! Each file in the reply is announced by `Created` or `Updated`,
//! followed by the repository path, the entry line, the mode, the size
//! and the raw bytes:
//!
//! ```text
//! Created mod/src/
//! /cvsroot/mod/src/main.c
//! /main.c/1.2//-kk/
//! u=rw,g=rw,o=r
//! 6
//! hello
//! ```
//!
//! `Removed`/`Remove-entry` plus a path line means the file is dead at the
//! requested revision. A `Mod-time` line applies to the next file.

use super::{parse_mode, strip_attic, CvsFile};
use crate::cache::RevisionCache;
use crate::date::{format_rfc2822, parse_rfc2822};
use crate::error::{CvsError, Result};
use crate::protocol::{arguments, entry_revision, next_reply, request::sticky_tag, ReplyLine};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckoutState {
    NeedUpdate,
    NeedPath,
    NeedRemovedPath,
    NeedEntry,
    NeedMode,
    NeedSize,
}

/// What the caller must do after feeding a line.
#[derive(Debug)]
pub enum CheckoutStep {
    Continue,
    /// The file's content follows on the wire, this many bytes of it.
    Body(CvsFile, u64),
    Removed(CvsFile),
}

pub struct CheckoutParser {
    full_module_path: String,
    module_prefix: String,
    max_file_size: u64,
    state: CheckoutState,
    file: CvsFile,
    mod_time: Option<i64>,
}

impl CheckoutParser {
    pub fn new(full_module_path: &str, module: &str, max_file_size: u64) -> Self {
        Self {
            full_module_path: full_module_path.to_string(),
            module_prefix: format!("{}/", module),
            max_file_size,
            state: CheckoutState::NeedUpdate,
            file: CvsFile::default(),
            mod_time: None,
        }
    }

    /// Inside a file announcement, where lines are data and must not be
    /// classified as replies.
    pub fn in_file(&self) -> bool {
        self.state != CheckoutState::NeedUpdate
    }

    fn module_path(&self, line: &str) -> Result<String> {
        line.strip_prefix(self.full_module_path.as_str())
            .or_else(|| line.strip_prefix(self.module_prefix.as_str()))
            .filter(|p| !p.is_empty())
            .map(strip_attic)
            .ok_or_else(|| CvsError::unexpected(self.state, line))
    }

    pub fn feed(&mut self, line: &str) -> Result<CheckoutStep> {
        match self.state {
            CheckoutState::NeedUpdate => {
                if let Some(date) = line.strip_prefix("Mod-time ") {
                    self.mod_time = parse_rfc2822(date);
                    if self.mod_time.is_none() {
                        tracing::warn!("Unparsable Mod-time: {}", date);
                    }
                } else if line.starts_with("Created ") || line.starts_with("Updated ") {
                    self.state = CheckoutState::NeedPath;
                } else if line.starts_with("Removed ") || line.starts_with("Remove-entry ") {
                    self.state = CheckoutState::NeedRemovedPath;
                }
                Ok(CheckoutStep::Continue)
            }
            CheckoutState::NeedPath => {
                let path = self.module_path(line)?;
                self.file = CvsFile::new(path, "");
                self.file.timestamp = self.mod_time.take().unwrap_or(0);
                self.state = CheckoutState::NeedEntry;
                Ok(CheckoutStep::Continue)
            }
            CheckoutState::NeedRemovedPath => {
                let path = self.module_path(line)?;
                self.mod_time = None;
                self.state = CheckoutState::NeedUpdate;
                Ok(CheckoutStep::Removed(CvsFile::removed(path, "")))
            }
            CheckoutState::NeedEntry => {
                let revision =
                    entry_revision(line).ok_or_else(|| CvsError::unexpected(self.state, line))?;
                self.file.revision = revision.to_string();
                self.state = CheckoutState::NeedMode;
                Ok(CheckoutStep::Continue)
            }
            CheckoutState::NeedMode => {
                let mode = parse_mode(line).ok_or_else(|| CvsError::unexpected(self.state, line))?;
                self.file.mode = mode;
                self.file.is_exec = mode & 0o111 != 0;
                self.state = CheckoutState::NeedSize;
                Ok(CheckoutStep::Continue)
            }
            CheckoutState::NeedSize => {
                let size: u64 = line
                    .trim()
                    .parse()
                    .map_err(|_| CvsError::unexpected(self.state, line))?;
                if size > self.max_file_size {
                    return Err(CvsError::FileTooLarge {
                        path: self.file.path.clone(),
                        revision: self.file.revision.clone(),
                        size,
                        limit: self.max_file_size,
                    });
                }
                self.state = CheckoutState::NeedUpdate;
                Ok(CheckoutStep::Body(std::mem::take(&mut self.file), size))
            }
        }
    }

    pub fn finish(&self) -> Result<()> {
        if self.in_file() {
            return Err(CvsError::unexpected(self.state, "end of checkout reply"));
        }
        Ok(())
    }
}

impl Session {
    /// Content of `path` at `revision`. The cache, when given, is consulted
    /// first and filled after a download.
    pub async fn checkout_revision(
        &mut self,
        path: &str,
        revision: &str,
        cache: Option<&dyn RevisionCache>,
    ) -> Result<CvsFile> {
        if let Some((content, is_exec)) = cache.and_then(|c| c.get(path, revision)) {
            tracing::debug!("Cache hit for {} rev {}", path, revision);
            return Ok(CvsFile {
                is_exec,
                mode: if is_exec { 0o775 } else { 0o664 },
                content,
                from_cache: true,
                ..CvsFile::new(path, revision)
            });
        }

        let target = format!("{}/{}", self.module(), path);
        let repo = self.repo_path().to_string();
        let stream = self.stream();
        arguments(stream, &["-N", "-P", "-kk", "-r", revision, "--", &target]);
        stream.write_line("Directory .");
        stream.write_line(&repo);
        stream.write_line("co");
        stream.flush().await?;

        let mut received: Option<CvsFile> = None;
        self.read_checkout(|file| {
            if file.path != path {
                return Err(CvsError::consistency(
                    &file.path,
                    format!("server sent a file while checking out {}", path),
                ));
            }
            received = Some(file);
            Ok(())
        })
        .await?;

        let mut file =
            received.ok_or_else(|| CvsError::consistency(path, "server sent no file"))?;
        if file.is_dead {
            file.revision = revision.to_string();
            return Ok(file);
        }
        if file.revision != revision {
            return Err(CvsError::consistency(
                path,
                format!("asked for revision {}, got {}", revision, file.revision),
            ));
        }

        if let Some(cache) = cache {
            if let Err(e) = cache.put(path, revision, &file.content, file.is_exec) {
                tracing::warn!("Failed to cache {} rev {}: {}", path, revision, e);
            }
        }
        Ok(file)
    }

    /// Check out every live file of `branch`, optionally as of `date`.
    /// Files carry their `Mod-time` as timestamp.
    pub async fn checkout_branch<F>(&mut self, branch: &str, date: Option<i64>, mut on_file: F) -> Result<()>
    where
        F: FnMut(CvsFile) -> Result<()>,
    {
        let module = self.module().to_string();
        let repo = self.repo_path().to_string();
        let stream = self.stream();
        if let Some(ts) = date {
            arguments(stream, &["-D", &format_rfc2822(ts)]);
        }
        arguments(stream, &["-N", "-P", "-kk"]);
        if let Some(tag) = sticky_tag(branch) {
            arguments(stream, &["-r", tag]);
        }
        arguments(stream, &["--", &module]);
        stream.write_line("Directory .");
        stream.write_line(&repo);
        stream.write_line("co");
        stream.flush().await?;

        let mut files = 0usize;
        self.read_checkout(|file| {
            if file.is_dead {
                return Ok(());
            }
            files += 1;
            on_file(file)
        })
        .await?;
        tracing::debug!("Checked out {} files of {}", files, branch);
        Ok(())
    }

    async fn read_checkout<F>(&mut self, mut on_file: F) -> Result<()>
    where
        F: FnMut(CvsFile) -> Result<()>,
    {
        let mut parser = CheckoutParser::new(
            self.full_module_path(),
            self.module(),
            self.config().max_memory_file_size,
        );
        let stream = self.stream();
        loop {
            let line = if parser.in_file() {
                stream.read_line().await?
            } else {
                match next_reply(stream).await? {
                    ReplyLine::Ok => break,
                    ReplyLine::Other(line) => line,
                    ReplyLine::Message(_) | ReplyLine::Diagnostic(_) => continue,
                }
            };
            match parser.feed(&line)? {
                CheckoutStep::Continue => {}
                CheckoutStep::Body(mut file, size) => {
                    file.content = stream.read_exact(size as usize).await?;
                    on_file(file)?;
                }
                CheckoutStep::Removed(file) => on_file(file)?,
            }
        }
        parser.finish()
    }
}
