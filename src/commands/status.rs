//! `status`: ask the server whether a set of files may be committed.
//!
//! A reply block per file:
//!
//! ```text
//! M ===================================================================
//! M File: file             	Status: Locally Added
//! M
//! M    Working revision:	New file!
//! M    Repository revision:	1.2	/cvsroot/mod/src/Attic/file,v
//! ```
//!
//! Without a server path on the repository line, the file's directory is
//! taken from the last `E cvs status: Examining <dir>` diagnostic.

use super::{rcs_to_module_path, CvsFile};
use crate::error::{CvsError, Result};
use crate::protocol::{argument, entry_line, request::sticky_tag, split_path, DirectoryWalker, ReplyLine};
use crate::session::Session;
use std::fmt;

const STATUS_BOUNDARY: &str =
    "===================================================================";
const EXAMINING: &str = "cvs status: Examining ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    UpToDate,
    LocallyAdded,
    ClassifyError,
    NeedsCheckout,
    NeedsPatch,
    UnresolvedConflict,
    LocallyRemoved,
    HadConflictsOnMerge,
    LocallyModified,
    NeedsMerge,
    Unknown,
}

impl FileStatus {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "Up-to-date" => FileStatus::UpToDate,
            "Locally Added" => FileStatus::LocallyAdded,
            "Classify Error" => FileStatus::ClassifyError,
            "Needs Checkout" => FileStatus::NeedsCheckout,
            "Needs Patch" => FileStatus::NeedsPatch,
            "Unresolved Conflict" => FileStatus::UnresolvedConflict,
            "Locally Removed" => FileStatus::LocallyRemoved,
            "File had conflicts on merge" => FileStatus::HadConflictsOnMerge,
            "Locally Modified" => FileStatus::LocallyModified,
            "Needs Merge" => FileStatus::NeedsMerge,
            other => {
                tracing::warn!("Unknown cvs status reply: {:?}", other);
                FileStatus::Unknown
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::UpToDate => "Up-to-date",
            FileStatus::LocallyAdded => "Locally Added",
            FileStatus::ClassifyError => "Classify Error",
            FileStatus::NeedsCheckout => "Needs Checkout",
            FileStatus::NeedsPatch => "Needs Patch",
            FileStatus::UnresolvedConflict => "Unresolved Conflict",
            FileStatus::LocallyRemoved => "Locally Removed",
            FileStatus::HadConflictsOnMerge => "File had conflicts on merge",
            FileStatus::LocallyModified => "Locally Modified",
            FileStatus::NeedsMerge => "Needs Merge",
            FileStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed status block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub path: String,
    pub status: FileStatus,
    pub working_revision: String,
    pub repository_revision: String,
}

/// Outcome of a status request.
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    pub entries: Vec<StatusEntry>,
    /// Paths whose status blocks a commit.
    pub conflicts: Vec<String>,
}

impl StatusReport {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusState {
    NeedStartStatus,
    NeedFileStatus,
    NeedWorkingRevision,
    NeedRepositoryRevision,
}

pub struct StatusParser {
    full_module_path: String,
    state: StatusState,
    current_dir: Option<String>,
    basename: String,
    status: FileStatus,
    working_revision: String,
}

impl StatusParser {
    pub fn new(full_module_path: &str) -> Self {
        Self {
            full_module_path: full_module_path.to_string(),
            state: StatusState::NeedStartStatus,
            current_dir: None,
            basename: String::new(),
            status: FileStatus::Unknown,
            working_revision: String::new(),
        }
    }

    /// Track `E cvs status: Examining <dir>`. Returns false for other
    /// diagnostics.
    pub fn diagnostic(&mut self, text: &str) -> bool {
        match text.strip_prefix(EXAMINING) {
            Some(dir) => {
                self.current_dir = Some(dir.trim().to_string());
                true
            }
            None => false,
        }
    }

    pub fn feed(&mut self, line: &str) -> Result<Option<StatusEntry>> {
        match self.state {
            StatusState::NeedStartStatus => {
                if line.starts_with(STATUS_BOUNDARY) {
                    self.state = StatusState::NeedFileStatus;
                }
            }
            StatusState::NeedFileStatus => {
                if let Some(rest) = line.strip_prefix("File: ") {
                    let (name, status) = rest
                        .split_once('\t')
                        .ok_or_else(|| CvsError::unexpected(self.state, line))?;
                    let status = status
                        .trim()
                        .strip_prefix("Status: ")
                        .ok_or_else(|| CvsError::unexpected(self.state, line))?;
                    self.basename = name.trim().to_string();
                    self.status = FileStatus::parse(status);
                    self.state = StatusState::NeedWorkingRevision;
                }
            }
            StatusState::NeedWorkingRevision => {
                if let Some(rev) = line.trim().strip_prefix("Working revision:") {
                    self.working_revision = before_tab(rev.trim()).to_string();
                    self.state = StatusState::NeedRepositoryRevision;
                }
            }
            StatusState::NeedRepositoryRevision => {
                if let Some(rev) = line.trim().strip_prefix("Repository revision:") {
                    let rev = rev.trim();
                    let (repository_revision, path) = match rev.split_once('\t') {
                        Some((rev, server_path)) => {
                            let path = rcs_to_module_path(server_path.trim(), &self.full_module_path)
                                .ok_or_else(|| CvsError::unexpected(self.state, line))?;
                            (rev, path)
                        }
                        None => (rev, self.reconstruct_path()),
                    };
                    self.state = StatusState::NeedStartStatus;
                    return Ok(Some(StatusEntry {
                        path,
                        status: self.status,
                        working_revision: std::mem::take(&mut self.working_revision),
                        repository_revision: repository_revision.to_string(),
                    }));
                }
            }
        }
        Ok(None)
    }

    fn reconstruct_path(&self) -> String {
        match self.current_dir.as_deref() {
            None | Some(".") => self.basename.clone(),
            Some(dir) => format!("{}/{}", dir, self.basename),
        }
    }
}

fn before_tab(s: &str) -> &str {
    s.split('\t').next().unwrap_or(s)
}

/// Whether `entry` allows committing `file`.
pub fn status_accepts(file: &CvsFile, entry: &StatusEntry) -> bool {
    match entry.status {
        FileStatus::UpToDate => true,
        FileStatus::LocallyAdded if file.is_dead => {
            if file.revision != entry.repository_revision {
                tracing::warn!(
                    "{} was removed in CVS and is being added again: repository revision {}, expected {}",
                    file.path,
                    entry.repository_revision,
                    file.revision
                );
                return false;
            }
            true
        }
        FileStatus::LocallyAdded => file.is_new,
        _ => false,
    }
}

impl Session {
    /// Ask for the status of `files` on `branch`. Files must be grouped by
    /// directory. Each file is marked handled as the server reports it.
    pub async fn status(&mut self, branch: &str, files: &mut [CvsFile]) -> Result<StatusReport> {
        let sticky = sticky_tag(branch);
        let repo = self.repo_path().to_string();
        let module = self.module().to_string();
        let mut walker = DirectoryWalker::new(&repo, &module, sticky);
        let tag = walker.entry_tag();

        let stream = self.stream();
        argument(stream, "--");
        for file in files.iter() {
            let (dir, base) = split_path(&file.path);
            walker.enter(stream, dir);
            let revision = if !file.is_dead && !file.revision.is_empty() {
                file.revision.as_str()
            } else {
                "0"
            };
            stream.write_line(&format!("Entry {}", entry_line(base, revision, "-kk", &tag)));
            stream.write_line(&format!("Unchanged {}", base));
        }
        walker.finish(stream);
        stream.write_line("status");
        stream.flush().await?;

        let mut parser = StatusParser::new(self.full_module_path());
        let mut report = StatusReport::default();
        let stream = self.stream();
        loop {
            let text = match ReplyLine::classify(stream.read_line().await?)? {
                ReplyLine::Ok => break,
                ReplyLine::Message(text) => text,
                ReplyLine::Diagnostic(text) => {
                    if !parser.diagnostic(&text) {
                        tracing::warn!("CVS E: {}", text);
                    }
                    continue;
                }
                ReplyLine::Other(_) => continue,
            };
            let Some(entry) = parser.feed(&text)? else {
                continue;
            };
            tracing::debug!(
                "status {}: {} (local {}, remote {})",
                entry.path,
                entry.status,
                entry.working_revision,
                entry.repository_revision
            );

            let Some(file) = files.iter_mut().find(|f| f.path == entry.path) else {
                tracing::warn!("Status for file not requested: {}", entry.path);
                continue;
            };
            if !status_accepts(file, &entry) {
                report.conflicts.push(entry.path.clone());
            }
            file.handled = true;
            report.entries.push(entry);
        }

        if let Some(file) = files.iter().find(|f| !f.handled) {
            return Err(CvsError::consistency(&file.path, "no status reported"));
        }
        Ok(report)
    }
}
