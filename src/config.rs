//! Client configuration.
//!
//! Loaded from a TOML file (`~/.config/cvs-sync/config.toml` unless a path
//! is given), then overridden by environment variables:
//!
//! - `GZIP`: stream compression level, `0` disables
//! - `CVS_RSH`: program used for `:ext:` roots
//! - `CVS_SYNC_DUMB_RLOG`: never send `rlog -S`
//! - `CVS_SYNC_RLOG_CACHE`, `CVS_SYNC_RLIST_CACHE`: transcript files, see
//!   [`ClientConfig::rlog_cache`]

use crate::error::{CvsError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_COMPRESSION_LEVEL: u32 = 1;
pub const DEFAULT_FUZZ_TIME: i64 = 300;
pub const DEFAULT_MAX_MEMORY_FILE_SIZE: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Program used for `:ext:` roots. Falls back to `CVS_RSH`, then `ssh`.
    pub ssh_program: Option<String>,

    /// Command run for `:local:` roots.
    pub server_command: String,

    /// zlib level for `Gzip-stream` (0 = off).
    pub compression_level: u32,

    /// Skip `rlog -S` even when the server would accept it.
    pub dumb_rlog: bool,

    /// Revisions larger than this are refused instead of buffered.
    pub max_memory_file_size: u64,

    /// Seconds two revisions may be apart and still share a commit.
    pub fuzz_time: i64,

    /// Revision content cache. `None` keeps content in memory only.
    pub cache_dir: Option<PathBuf>,

    /// Where per-branch baselines are persisted.
    pub state_dir: Option<PathBuf>,

    /// Raw `rlog` transcript. Replayed instead of asking the server when
    /// the file exists, otherwise written after a successful rlog.
    pub rlog_cache: Option<PathBuf>,

    /// Same as `rlog_cache`, for `rlist`.
    pub rlist_cache: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ssh_program: None,
            server_command: "cvs server".to_string(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            dumb_rlog: false,
            max_memory_file_size: DEFAULT_MAX_MEMORY_FILE_SIZE,
            fuzz_time: DEFAULT_FUZZ_TIME,
            cache_dir: None,
            state_dir: None,
            rlog_cache: None,
            rlist_cache: None,
        }
    }
}

impl ClientConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("cvs-sync").join("config.toml"))
    }

    pub fn default_cache_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|d| d.join("cvs-sync"))
    }

    pub fn default_state_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map(|d| d.join("cvs-sync"))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| CvsError::Config(e.to_string()))
    }

    /// Read `path`, or the default location if `None`. A missing default
    /// file yields the built-in defaults; a missing explicit file is an
    /// error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p).map_err(|e| {
                    CvsError::Config(format!("cannot read {}: {}", p.display(), e))
                })?;
                Self::from_toml(&text)?
            }
            None => match Self::default_path() {
                Some(p) if p.exists() => {
                    tracing::debug!("Loading config from {}", p.display());
                    let text = std::fs::read_to_string(&p)?;
                    Self::from_toml(&text)?
                }
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup` so tests need not
    /// touch the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("GZIP") {
            let level = level.trim().trim_start_matches('-');
            self.compression_level = level
                .parse::<u32>()
                .ok()
                .filter(|l| *l <= 9)
                .ok_or_else(|| CvsError::Config(format!("GZIP level '{}' not in 0-9", level)))?;
        }
        if let Some(rsh) = lookup("CVS_RSH") {
            if self.ssh_program.is_none() && !rsh.is_empty() {
                self.ssh_program = Some(rsh);
            }
        }
        if let Some(flag) = lookup("CVS_SYNC_DUMB_RLOG") {
            self.dumb_rlog = !matches!(flag.as_str(), "" | "0" | "false" | "no");
        }
        if let Some(path) = lookup("CVS_SYNC_RLOG_CACHE").filter(|p| !p.is_empty()) {
            self.rlog_cache = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("CVS_SYNC_RLIST_CACHE").filter(|p| !p.is_empty()) {
            self.rlist_cache = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn ssh_program(&self) -> &str {
        self.ssh_program.as_deref().unwrap_or("ssh")
    }
}
