// Branch baseline persistence
//
// Remembers, per branch, the last revision of every file already synced so
// the next run only fetches newer history and can tell when revisions were
// skipped or seen twice. One text file per branch under the state
// directory, named by an xxh3 hash of the branch name:
//
//   # cvs-sync baseline v1
//   # branch: stable
//   # last_revision: 1363535858
//   revision=1.1.2.3,isexec=y,mark=12:src/run.sh
//   revision=1.4,isdead=y:old/gone.c

use crate::error::{CvsError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::xxh3_64;

/// Last synced state of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineEntry {
    pub revision: String,
    pub is_dead: bool,
    pub is_exec: bool,
    /// Opaque id assigned by the consumer of the commit list.
    pub mark: u32,
}

impl BaselineEntry {
    pub fn new(revision: impl Into<String>) -> Self {
        Self {
            revision: revision.into(),
            is_dead: false,
            is_exec: false,
            mark: 0,
        }
    }
}

/// Everything a branch had synced at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaselineSnapshot {
    /// Timestamp of the newest synced commit, 0 when nothing was synced.
    pub last_revision_timestamp: i64,
    pub entries: BTreeMap<String, BaselineEntry>,
}

impl BaselineSnapshot {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&BaselineEntry> {
        self.entries.get(path)
    }

    pub fn insert(&mut self, path: impl Into<String>, entry: BaselineEntry) {
        self.entries.insert(path.into(), entry);
    }

    /// Parse the text form. Malformed lines are skipped with a warning.
    pub fn parse(text: &str) -> Self {
        let mut snapshot = BaselineSnapshot::default();
        for line in text.lines() {
            let line = line.trim_end();
            if let Some(ts) = line.strip_prefix("# last_revision: ") {
                snapshot.last_revision_timestamp = ts.trim().parse().unwrap_or(0);
                continue;
            }
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_entry_line(line) {
                Some((path, entry)) => {
                    snapshot.entries.insert(path, entry);
                }
                None => tracing::warn!("Skipping malformed baseline line: {}", line),
            }
        }
        snapshot
    }

    pub fn write_to<W: Write>(&self, branch: &str, out: &mut W) -> std::io::Result<()> {
        writeln!(out, "# cvs-sync baseline {}", FileBaselineStore::FORMAT_VERSION)?;
        writeln!(out, "# branch: {}", branch)?;
        writeln!(out, "# last_revision: {}", self.last_revision_timestamp)?;
        for (path, entry) in &self.entries {
            writeln!(out, "{}", format_entry_line(path, entry))?;
        }
        Ok(())
    }
}

/// `revision=<r>[,isdead=y][,isexec=y][,mark=<n>]:<path>`
pub fn format_entry_line(path: &str, entry: &BaselineEntry) -> String {
    let mut line = format!("revision={}", entry.revision);
    if entry.is_dead {
        line.push_str(",isdead=y");
    }
    if entry.is_exec {
        line.push_str(",isexec=y");
    }
    if entry.mark != 0 {
        line.push_str(&format!(",mark={}", entry.mark));
    }
    line.push(':');
    line.push_str(path);
    line
}

fn parse_entry_line(line: &str) -> Option<(String, BaselineEntry)> {
    let (attrs, path) = line.split_once(':')?;
    if path.is_empty() {
        return None;
    }
    let mut entry = BaselineEntry::new("");
    for attr in attrs.split(',') {
        let (key, value) = attr.split_once('=')?;
        match key {
            "revision" => entry.revision = value.to_string(),
            "isdead" => entry.is_dead = value == "y",
            "isexec" => entry.is_exec = value == "y",
            "mark" => entry.mark = value.parse().ok()?,
            // Older notes also carried ispushed, which the next run recomputes
            _ => {}
        }
    }
    if entry.revision.is_empty() {
        return None;
    }
    Some((path.to_string(), entry))
}

/// Loads and saves baselines by branch name.
pub trait BaselineStore {
    /// Baseline of `branch`, empty if it was never saved.
    fn load(&self, branch: &str) -> Result<BaselineSnapshot>;

    fn save(&self, branch: &str, snapshot: &BaselineSnapshot) -> Result<()>;
}

/// Text file store, one file per branch.
pub struct FileBaselineStore {
    dir: PathBuf,
}

impl FileBaselineStore {
    const FORMAT_VERSION: &'static str = "v1";

    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Store under the configured state directory, else `~/.local/state`.
    pub fn open_default(state_dir: Option<&Path>) -> Result<Self> {
        match state_dir {
            Some(dir) => Self::open(dir),
            None => {
                let dir = crate::config::ClientConfig::default_state_dir().ok_or_else(|| {
                    CvsError::Config("Cannot determine state directory".to_string())
                })?;
                Self::open(&dir)
            }
        }
    }

    pub fn state_file(&self, branch: &str) -> PathBuf {
        self.dir
            .join(format!("{:016x}.lst", xxh3_64(branch.as_bytes())))
    }
}

impl BaselineStore for FileBaselineStore {
    fn load(&self, branch: &str) -> Result<BaselineSnapshot> {
        let path = self.state_file(branch);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BaselineSnapshot::default());
            }
            Err(e) => return Err(e.into()),
        };
        let mut text = String::new();
        for line in BufReader::new(file).lines() {
            text.push_str(&line?);
            text.push('\n');
        }
        let snapshot = BaselineSnapshot::parse(&text);
        tracing::debug!(
            "Loaded baseline for {}: {} files, last revision at {}",
            branch,
            snapshot.entries.len(),
            snapshot.last_revision_timestamp
        );
        Ok(snapshot)
    }

    fn save(&self, branch: &str, snapshot: &BaselineSnapshot) -> Result<()> {
        let target = self.state_file(branch);
        let temp = target.with_extension("tmp");
        {
            let mut file = fs::File::create(&temp)?;
            snapshot.write_to(branch, &mut file)?;
            file.sync_all()?;
        }
        // Atomic rename
        fs::rename(&temp, &target)?;
        Ok(())
    }
}
