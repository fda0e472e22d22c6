//! `rlog`: per-file revision history of a module.
//!
//! Reply layout, one block per RCS file:
//!
//! ```text
//! RCS file: /cvsroot/mod/src/Attic/old.c,v
//! head: 1.3
//! symbolic names:
//!         stable: 1.2.0.2
//! keyword substitution: kv
//! ----------------------------
//! revision 1.3
//! date: 2013/01/18 13:28:28;  author: joe;  state: dead;  lines: +0 -0
//! remove old.c
//! ----------------------------
//! ...
//! =============================================================================
//! ```

use crate::commands::rcs_to_module_path;
use crate::date::{format_rfc2822, parse_rlog_date, RLOG_DATE_CEILING};
use crate::error::{CvsError, Result};
use crate::commands::transcript::{self, Recorder};
use crate::protocol::{arguments, next_message, next_message_bytes};
use crate::transport::stream::decode_text;
use bytes::Bytes;
use crate::revision::{classify_symbol, split_last, trim_revision, SymbolKind, HEAD_BRANCH, UNKNOWN_BRANCH};
use crate::session::Session;
use std::collections::{BTreeSet, HashMap};

pub const LOG_BOUNDARY: &str = "----------------------------";
pub const FILE_BOUNDARY: &str =
    "=============================================================================";

/// One accepted revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RlogEvent {
    pub branch: String,
    pub path: String,
    pub revision: String,
    pub author: String,
    pub message: String,
    pub timestamp: i64,
    pub is_dead: bool,
    /// Author and message exactly as the server sent them. Commits are
    /// matched on these, `author` and `message` are for display.
    pub raw_author: Bytes,
    pub raw_message: Bytes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RlogSummary {
    pub files: usize,
    pub revisions: usize,
    pub events: usize,
    pub branches: BTreeSet<String>,
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RlogState {
    NeedRcsFile,
    NeedWorkingFile,
    NeedSymbols,
    NeedEndOfSymbols,
    NeedStartLog,
    NeedRevision,
    NeedDateAuthorState,
    NeedEndOfMessage,
}

#[derive(Debug, Default)]
struct PendingRevision {
    revision: String,
    branch: String,
    author: String,
    message: String,
    raw_author: Vec<u8>,
    raw_message: Vec<u8>,
    timestamp: i64,
    is_dead: bool,
    skip: bool,
}

/// Push parser for `rlog` output with the `M ` prefix removed.
pub struct RlogParser {
    module_prefix: String,
    state: RlogState,
    path: String,
    /// Normalized branch number -> branch name, per file.
    branch_names: HashMap<String, String>,
    pending: PendingRevision,
    have_log: bool,
    summary: RlogSummary,
}

impl RlogParser {
    /// `module_prefix` is `<repo>/<module>/`.
    pub fn new(module_prefix: impl Into<String>) -> Self {
        Self {
            module_prefix: module_prefix.into(),
            state: RlogState::NeedRcsFile,
            path: String::new(),
            branch_names: HashMap::new(),
            pending: PendingRevision::default(),
            have_log: false,
            summary: RlogSummary::default(),
        }
    }

    pub fn feed(&mut self, line: &str) -> Result<Option<RlogEvent>> {
        self.feed_line(line, line.as_bytes())
    }

    /// Feed a line as received. Text that is not UTF-8 is kept byte for
    /// byte in the event's raw fields.
    pub fn feed_bytes(&mut self, raw: &[u8]) -> Result<Option<RlogEvent>> {
        let line = decode_text(raw);
        self.feed_line(&line, raw)
    }

    fn feed_line(&mut self, line: &str, raw: &[u8]) -> Result<Option<RlogEvent>> {
        match self.state {
            RlogState::NeedRcsFile => {
                if let Some(rcs) = line.strip_prefix("RCS file: ") {
                    self.start_file(rcs, line)?;
                }
            }
            RlogState::NeedWorkingFile => {
                if line.starts_with("Working file: ") {
                    return Err(CvsError::unexpected(self.state, line));
                }
                self.state = RlogState::NeedRcsFile;
            }
            RlogState::NeedSymbols => {
                if line.starts_with("symbolic names:") {
                    self.state = RlogState::NeedEndOfSymbols;
                }
            }
            RlogState::NeedEndOfSymbols => {
                if line.starts_with(|c: char| c.is_whitespace()) {
                    self.add_symbol(line.trim_start());
                } else {
                    self.state = RlogState::NeedStartLog;
                }
            }
            RlogState::NeedStartLog => {
                if line == LOG_BOUNDARY {
                    self.state = RlogState::NeedRevision;
                } else if line == FILE_BOUNDARY {
                    self.state = RlogState::NeedRcsFile;
                }
            }
            RlogState::NeedRevision => {
                if let Some(rev) = line.strip_prefix("revision ") {
                    self.start_revision(rev, line)?;
                }
            }
            RlogState::NeedDateAuthorState => {
                if line.starts_with("date: ") {
                    self.parse_date_line(line, raw)?;
                    self.have_log = false;
                    self.state = RlogState::NeedEndOfMessage;
                }
            }
            RlogState::NeedEndOfMessage => {
                if line == LOG_BOUNDARY {
                    self.state = RlogState::NeedRevision;
                    return Ok(self.finish_revision());
                }
                if line == FILE_BOUNDARY {
                    self.state = RlogState::NeedRcsFile;
                    return Ok(self.finish_revision());
                }
                if self.have_log || !is_revision_metadata(line) {
                    self.have_log = true;
                    self.pending.message.push_str(line);
                    self.pending.message.push('\n');
                    self.pending.raw_message.extend_from_slice(raw);
                    self.pending.raw_message.push(b'\n');
                }
            }
        }
        Ok(None)
    }

    /// The reply must end between files.
    pub fn finish(self) -> Result<RlogSummary> {
        if self.state != RlogState::NeedRcsFile {
            return Err(CvsError::unexpected(self.state, "end of rlog reply"));
        }
        Ok(self.summary)
    }

    fn start_file(&mut self, rcs: &str, line: &str) -> Result<()> {
        self.branch_names.clear();
        self.summary.files += 1;

        if !rcs.starts_with(&self.module_prefix) {
            self.state = RlogState::NeedWorkingFile;
            return Ok(());
        }
        if !rcs.ends_with(",v") {
            return Err(CvsError::unexpected(self.state, line));
        }
        self.path = rcs_to_module_path(rcs, &self.module_prefix).unwrap_or_default();
        self.state = RlogState::NeedSymbols;
        Ok(())
    }

    fn add_symbol(&mut self, entry: &str) {
        let Some((name, rev)) = entry.split_once(':') else {
            return;
        };
        match classify_symbol(rev.trim()) {
            Some((SymbolKind::Branch, number)) => {
                self.summary.branches.insert(name.to_string());
                self.branch_names
                    .entry(number)
                    .or_insert_with(|| name.to_string());
            }
            Some((SymbolKind::Tag, _)) => {
                self.summary.tags.insert(name.to_string());
            }
            None => tracing::debug!("Ignoring symbol without revision: {}", entry),
        }
    }

    fn start_revision(&mut self, rev: &str, line: &str) -> Result<()> {
        self.summary.revisions += 1;
        let revision = trim_revision(rev).to_string();

        let (prefix, _) =
            split_last(&revision).ok_or_else(|| CvsError::unexpected(self.state, line))?;

        let mut skip = false;
        let branch = if !prefix.contains('.') {
            HEAD_BRANCH.to_string()
        } else if let Some(name) = self.branch_names.get(prefix) {
            name.clone()
        } else {
            tracing::warn!(
                "Cannot find branch for: {} rev: {} branch: {}",
                self.path,
                revision,
                prefix
            );
            skip = true;
            UNKNOWN_BRANCH.to_string()
        };

        self.pending = PendingRevision {
            revision,
            branch,
            skip,
            ..Default::default()
        };
        self.state = RlogState::NeedDateAuthorState;
        Ok(())
    }

    /// `date: <d>;  author: <a>;  state: <s>;  lines: ...`
    fn parse_date_line(&mut self, line: &str, raw: &[u8]) -> Result<()> {
        let mut fields = line.splitn(4, ';').map(str::trim);
        let bad = || CvsError::unexpected(RlogState::NeedDateAuthorState, line);

        let date = fields
            .next()
            .and_then(|f| f.strip_prefix("date: "))
            .ok_or_else(bad)?;
        self.pending.timestamp = parse_rlog_date(date).ok_or_else(bad)?;

        let author = fields
            .next()
            .and_then(|f| f.strip_prefix("author: "))
            .ok_or_else(bad)?;
        self.pending.author = author.to_string();
        self.pending.raw_author = raw_field(raw, b"author: ").to_vec();

        let state = fields
            .next()
            .and_then(|f| f.strip_prefix("state: "))
            .ok_or_else(bad)?;
        self.pending.is_dead = state == "dead";
        Ok(())
    }

    fn finish_revision(&mut self) -> Option<RlogEvent> {
        let pending = std::mem::take(&mut self.pending);
        if pending.is_dead && is_added_on_branch_marker(&pending.message) {
            tracing::debug!(
                "Skipping branch-add placeholder {} rev {}",
                self.path,
                pending.revision
            );
            return None;
        }
        if pending.skip {
            return None;
        }
        self.summary.events += 1;
        Some(RlogEvent {
            branch: pending.branch,
            path: self.path.clone(),
            revision: pending.revision,
            author: pending.author,
            message: pending.message,
            timestamp: pending.timestamp,
            is_dead: pending.is_dead,
            raw_author: Bytes::from(pending.raw_author),
            raw_message: Bytes::from(pending.raw_message),
        })
    }
}

/// Value of `key` in a `key: value;` list, trimmed, as raw bytes.
fn raw_field<'a>(raw: &'a [u8], key: &[u8]) -> &'a [u8] {
    let Some(start) = raw.windows(key.len()).position(|w| w == key) else {
        return &[];
    };
    let value = &raw[start + key.len()..];
    let end = value.iter().position(|b| *b == b';').unwrap_or(value.len());
    let value = &value[..end];
    let first = value.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(value.len());
    let last = value.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(first, |i| i + 1);
    &value[first..last]
}

/// A `key: value;` line such as `branches:  1.2.2;` that precedes the log
/// message.
pub fn is_revision_metadata(line: &str) -> bool {
    let Some(colon) = line.find(':') else {
        return false;
    };
    if line.find(' ').is_some_and(|space| space < colon) {
        return false;
    }
    line.ends_with(';')
}

/// CVS records a dead 1.1 on trunk when a file is first added on a branch.
/// Detected by the English log text CVS writes, so localized servers slip
/// through.
fn is_added_on_branch_marker(message: &str) -> bool {
    message.starts_with("file ")
        && (message.contains("was initially added on branch")
            || message.contains("was added on branch"))
}

// =============================================================================
// Revision -> branch lookup (`rlog -h`)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LookupState {
    NeedRcsFile,
    NeedSymbols,
    NeedEndOfSymbols,
    SkipLines,
}

struct BranchLookup {
    branch_number: String,
    state: LookupState,
    found: Option<String>,
}

impl BranchLookup {
    fn new(revision: &str) -> Self {
        let branch_number = split_last(revision)
            .map(|(prefix, _)| prefix.to_string())
            .unwrap_or_else(|| revision.to_string());
        Self {
            branch_number,
            state: LookupState::NeedRcsFile,
            found: None,
        }
    }

    fn feed(&mut self, line: &str) {
        match self.state {
            LookupState::NeedRcsFile => {
                if line.starts_with("RCS file: ") {
                    self.state = LookupState::NeedSymbols;
                }
            }
            LookupState::NeedSymbols => {
                if line.starts_with("symbolic names:") {
                    self.state = LookupState::NeedEndOfSymbols;
                }
            }
            LookupState::NeedEndOfSymbols => {
                if !line.starts_with(|c: char| c.is_whitespace()) {
                    self.state = LookupState::SkipLines;
                    return;
                }
                let Some((name, rev)) = line.trim_start().split_once(':') else {
                    return;
                };
                if let Some((SymbolKind::Branch, number)) = classify_symbol(rev.trim()) {
                    if number == self.branch_number {
                        self.found = Some(name.to_string());
                        self.state = LookupState::SkipLines;
                    }
                }
            }
            LookupState::SkipLines => {}
        }
    }

    fn finish(self) -> Result<Option<String>> {
        if self.state != LookupState::SkipLines {
            return Err(CvsError::unexpected(self.state, "end of rlog -h reply"));
        }
        Ok(self.found)
    }
}

// =============================================================================
// Session commands
// =============================================================================

impl Session {
    /// Stream every revision of the module, optionally only those after
    /// `since`. Events arrive in server order; `on_event` errors abort the
    /// command.
    pub async fn rlog<F>(&mut self, since: Option<i64>, mut on_event: F) -> Result<RlogSummary>
    where
        F: FnMut(RlogEvent) -> Result<()>,
    {
        let module = self.module().to_string();
        let no_empty = self.capabilities().rlog_no_empty;
        let cache = self.config().rlog_cache.clone();
        let mut parser = RlogParser::new(self.full_module_path());

        if let Some(lines) = transcript::replay(cache.as_deref()).await? {
            if since.is_some() {
                tracing::warn!("Replayed rlog ignores the since time");
            }
            for raw in lines {
                if let Some(event) = parser.feed_bytes(&raw)? {
                    on_event(event)?;
                }
            }
            return parser.finish();
        }

        let stream = self.stream();
        if let Some(ts) = since {
            let range = format!("{}<{}", format_rfc2822(ts), RLOG_DATE_CEILING);
            arguments(stream, &["-d", &range]);
        }
        if no_empty {
            arguments(stream, &["-S"]);
        }
        arguments(stream, &["--", &module]);
        stream.write_line("rlog");
        stream.flush().await?;

        let mut recorder = Recorder::new(cache.as_deref());
        while let Some(raw) = next_message_bytes(stream).await? {
            recorder.push(&raw);
            if let Some(event) = parser.feed_bytes(&raw)? {
                on_event(event)?;
            }
        }

        let summary = parser.finish()?;
        recorder.save().await?;
        tracing::info!(
            "rlog: {} revisions in {} files, {} branches, {} tags",
            summary.revisions,
            summary.files,
            summary.branches.len(),
            summary.tags.len()
        );
        Ok(summary)
    }

    /// Collect the whole rlog into a vector.
    pub async fn rlog_events(&mut self, since: Option<i64>) -> Result<(Vec<RlogEvent>, RlogSummary)> {
        let mut events = Vec::new();
        let summary = self
            .rlog(since, |event| {
                events.push(event);
                Ok(())
            })
            .await?;
        Ok((events, summary))
    }

    /// Name of the branch `revision` of `path` lives on, if the file has a
    /// symbol for it.
    pub async fn revision_branch(&mut self, path: &str, revision: &str) -> Result<Option<String>> {
        let target = format!("{}/{}", self.module(), path);
        let mut lookup = BranchLookup::new(revision);

        let stream = self.stream();
        arguments(stream, &["-h", "--", &target]);
        stream.write_line("rlog");
        stream.flush().await?;

        while let Some(line) = next_message(stream).await? {
            lookup.feed(&line);
        }
        lookup.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::session::test_support::{finish, scripted_session, scripted_session_with};

    const PREFIX: &str = "/cvsroot/mod/";

    /// Two files, three revisions each, across HEAD and `stable`.
    const TRANSCRIPT: &str = "\

RCS file: /cvsroot/mod/src/main.c,v
head: 1.2
branch:
locks: strict
access list:
symbolic names:
\tREL_1: 1.1
\tstable: 1.1.0.2
keyword substitution: kv
total revisions: 3;\tselected revisions: 3
description:
----------------------------
revision 1.2
date: 2013/01/18 13:28:28;  author: joe;  state: Exp;  lines: +2 -1
fix crash
----------------------------
revision 1.1
date: 2013/01/17 10:00:00;  author: joe;  state: Exp;
branches:  1.1.2;
initial import
----------------------------
revision 1.1.2.1
date: 2013/01/18 09:00:00;  author: ann;  state: Exp;  lines: +1 -0
backport
second line
=============================================================================

RCS file: /cvsroot/mod/doc/Attic/notes.txt,v
head: 1.2
symbolic names:
\tstable: 1.1.0.2
keyword substitution: kv
----------------------------
revision 1.2
date: 2013-01-18 13:28:30 +0000;  author: joe;  state: dead;  lines: +0 -0
fix crash
----------------------------
revision 1.1
date: 2013/01/17 10:00:00;  author: joe;  state: Exp;
initial import
----------------------------
revision 1.1.2.1
date: 2013/01/18 09:00:01;  author: ann;  state: Exp;  lines: +1 -0
backport
second line
=============================================================================
";

    fn parse_all(text: &str) -> Result<(Vec<RlogEvent>, RlogSummary)> {
        let mut parser = RlogParser::new(PREFIX);
        let mut events = Vec::new();
        for line in text.lines() {
            if let Some(event) = parser.feed(line)? {
                events.push(event);
            }
        }
        Ok((events, parser.finish()?))
    }

    fn tuple(e: &RlogEvent) -> (&str, &str, &str, &str, &str, i64, bool) {
        (
            &e.branch,
            &e.path,
            &e.revision,
            &e.author,
            &e.message,
            e.timestamp,
            e.is_dead,
        )
    }

    #[test]
    fn test_transcript_events() {
        let (events, summary) = parse_all(TRANSCRIPT).unwrap();
        let got: Vec<_> = events.iter().map(tuple).collect();
        assert_eq!(
            got,
            vec![
                ("HEAD", "src/main.c", "1.2", "joe", "fix crash\n", 1358515708, false),
                ("HEAD", "src/main.c", "1.1", "joe", "initial import\n", 1358416800, false),
                ("stable", "src/main.c", "1.1.2.1", "ann", "backport\nsecond line\n", 1358499600, false),
                ("HEAD", "doc/notes.txt", "1.2", "joe", "fix crash\n", 1358515710, true),
                ("HEAD", "doc/notes.txt", "1.1", "joe", "initial import\n", 1358416800, false),
                ("stable", "doc/notes.txt", "1.1.2.1", "ann", "backport\nsecond line\n", 1358499601, false),
            ]
        );
        assert_eq!(summary.files, 2);
        assert_eq!(summary.revisions, 6);
        assert_eq!(summary.events, 6);
        assert_eq!(summary.branches.iter().collect::<Vec<_>>(), vec!["stable"]);
        assert_eq!(summary.tags.iter().collect::<Vec<_>>(), vec!["REL_1"]);
    }

    #[test]
    fn test_metadata_line_inside_message_is_kept() {
        let text = "RCS file: /cvsroot/mod/a,v\nsymbolic names:\nkeyword substitution: kv\n\
            ----------------------------\nrevision 1.1\n\
            date: 2013/01/17 10:00:00;  author: joe;  state: Exp;\n\
            summary\nnote: keep;\n\
            =============================================================================\n";
        let (events, _) = parse_all(text).unwrap();
        assert_eq!(events[0].message, "summary\nnote: keep;\n");
    }

    #[test]
    fn test_added_on_branch_placeholder_skipped() {
        let text = "RCS file: /cvsroot/mod/Attic/new.c,v\nsymbolic names:\n\tdev: 1.1.0.2\n\
            keyword substitution: kv\n----------------------------\nrevision 1.1\n\
            date: 2013/01/17 10:00:00;  author: joe;  state: dead;\n\
            file new.c was initially added on branch dev.\n\
            ----------------------------\nrevision 1.1.2.1\n\
            date: 2013/01/17 10:00:00;  author: joe;  state: Exp;\nadd new.c\n\
            =============================================================================\n";
        let (events, _) = parse_all(text).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].branch, "dev");
        assert_eq!(events[0].path, "new.c");
    }

    #[test]
    fn test_unknown_branch_skipped() {
        let text = "RCS file: /cvsroot/mod/a,v\nsymbolic names:\nkeyword substitution: kv\n\
            ----------------------------\nrevision 1.1.4.1\tlocked by: joe;\n\
            date: 2013/01/17 10:00:00;  author: joe;  state: Exp;\nlost\n\
            =============================================================================\n";
        let (events, summary) = parse_all(text).unwrap();
        assert!(events.is_empty());
        assert_eq!(summary.revisions, 1);
    }

    #[test]
    fn test_file_outside_module_ignored() {
        let text = "RCS file: /cvsroot/other/a,v\nhead: 1.1\n";
        let (events, summary) = parse_all(text).unwrap();
        assert!(events.is_empty());
        assert_eq!(summary.files, 1);
    }

    #[test]
    fn test_working_file_is_unexpected() {
        let mut parser = RlogParser::new(PREFIX);
        parser.feed("RCS file: /elsewhere/a,v").unwrap();
        assert!(matches!(
            parser.feed("Working file: a"),
            Err(CvsError::UnexpectedReply { .. })
        ));
    }

    #[test]
    fn test_truncated_reply_fails_finish() {
        let mut parser = RlogParser::new(PREFIX);
        parser.feed("RCS file: /cvsroot/mod/a,v").unwrap();
        parser.feed("symbolic names:").unwrap();
        match parser.finish() {
            Err(CvsError::UnexpectedReply { state, .. }) => assert_eq!(state, "NeedEndOfSymbols"),
            other => panic!("Expected UnexpectedReply, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_date_is_unexpected() {
        let mut parser = RlogParser::new(PREFIX);
        for line in [
            "RCS file: /cvsroot/mod/a,v",
            "symbolic names:",
            "keyword substitution: kv",
            LOG_BOUNDARY,
            "revision 1.1",
        ] {
            parser.feed(line).unwrap();
        }
        assert!(parser.feed("date: someday;  author: joe;  state: Exp;").is_err());
    }

    #[test]
    fn test_is_revision_metadata() {
        assert!(is_revision_metadata("branches:  1.1.2;"));
        assert!(!is_revision_metadata("fix: the thing"));
        assert!(!is_revision_metadata("see foo: bar;"));
        assert!(!is_revision_metadata("no colon;"));
    }

    #[tokio::test]
    async fn test_rlog_request_and_events() {
        let reply: String = TRANSCRIPT
            .lines()
            .map(|l| format!("M {}\n", l))
            .chain(std::iter::once("ok\n".to_string()))
            .collect();
        let (mut session, handle) = scripted_session(&reply).await;

        let (events, summary) = session.rlog_events(Some(1363535858)).await.unwrap();
        assert_eq!(events.len(), 6);
        assert_eq!(summary.files, 2);

        let sent = finish(session, handle).await;
        assert_eq!(
            sent,
            "Argument -d\n\
             Argument Sun, 17 Mar 2013 15:57:38 +0000<1 Jan 2038 05:00:00 -0000\n\
             Argument -S\n\
             Argument --\n\
             Argument mod\n\
             rlog\n"
        );
    }

    #[tokio::test]
    async fn test_rlog_callback_error_aborts() {
        let reply = "M RCS file: /cvsroot/mod/a,v\nM symbolic names:\nM keyword substitution: kv\n\
            M ----------------------------\nM revision 1.1\n\
            M date: 2013/01/17 10:00:00;  author: joe;  state: Exp;\nM msg\n\
            M =============================================================================\nok\n";
        let (mut session, _handle) = scripted_session(reply).await;
        let result = session
            .rlog(None, |_| Err(CvsError::consistency("a", "duplicate")))
            .await;
        assert!(matches!(result, Err(CvsError::ConsistencyFault { .. })));
    }

    #[test]
    fn test_latin1_messages_keep_raw_bytes() {
        let mut parser = RlogParser::new(PREFIX);
        let lines: [&[u8]; 12] = [
            b"RCS file: /cvsroot/mod/a.c,v",
            b"symbolic names:",
            b"keyword substitution: kv",
            b"----------------------------",
            b"revision 1.2",
            b"date: 2013/01/18 13:00:00;  author: j\xf6rg;  state: Exp;",
            b"caf\xe9",
            b"----------------------------",
            b"revision 1.1",
            b"date: 2013/01/18 12:59:00;  author: j\xf6rg;  state: Exp;",
            b"caf\xe8",
            b"=============================================================================",
        ];
        let mut events = Vec::new();
        for line in lines {
            events.extend(parser.feed_bytes(line).unwrap());
        }
        parser.finish().unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(&events[0].raw_message[..], b"caf\xe9\n");
        assert_eq!(&events[1].raw_message[..], b"caf\xe8\n");
        assert_eq!(&events[0].raw_author[..], b"j\xf6rg");
        assert_eq!(events[0].author, "j\u{f6}rg");
        assert_ne!(events[0].message, events[1].message);
    }

    #[tokio::test]
    async fn test_rlog_recorded_then_replayed() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ClientConfig {
            rlog_cache: Some(dir.path().join("mod.rlog")),
            ..Default::default()
        };
        let reply: String = TRANSCRIPT
            .lines()
            .map(|l| format!("M {}\n", l))
            .chain(std::iter::once("ok\n".to_string()))
            .collect();

        let (mut session, handle) = scripted_session_with(config.clone(), &reply).await;
        let (live, _) = session.rlog_events(None).await.unwrap();
        assert!(finish(session, handle).await.ends_with("rlog\n"));
        assert!(dir.path().join("mod.rlog").exists());

        // No server reply scripted: everything comes from the file.
        let (mut session, handle) = scripted_session_with(config, "").await;
        let (replayed, summary) = session.rlog_events(None).await.unwrap();
        assert_eq!(replayed, live);
        assert_eq!(summary.files, 2);
        assert_eq!(finish(session, handle).await, "");
    }

    #[tokio::test]
    async fn test_revision_branch_lookup() {
        let reply = "M \nM RCS file: /cvsroot/mod/src/main.c,v\nM head: 1.2\nM symbolic names:\n\
            M \tREL_1: 1.1\nM \tstable: 1.1.0.2\nM keyword substitution: kv\n\
            M =============================================================================\nok\n";
        let (mut session, handle) = scripted_session(reply).await;
        let branch = session.revision_branch("src/main.c", "1.1.2.3").await.unwrap();
        assert_eq!(branch.as_deref(), Some("stable"));

        let sent = finish(session, handle).await;
        assert_eq!(sent, "Argument -h\nArgument --\nArgument mod/src/main.c\nrlog\n");
    }
}
