//! CVS commands and their reply parsers.
//!
//! Each command is an `impl Session` block next to a parser that can be
//! fed reply lines without a connection.

pub mod add;
pub mod checkin;
pub mod checkout;
pub mod rlist;
pub mod rlog;
pub mod status;
pub mod tag;
pub(crate) mod transcript;

pub use rlist::RlistEntry;
pub use rlog::{RlogEvent, RlogSummary};
pub use status::{FileStatus, StatusReport};

use bytes::Bytes;

/// A file as exchanged with the server by checkout, status, commit and
/// tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CvsFile {
    /// Path relative to the module.
    pub path: String,
    /// Known revision; empty for a file the server has never seen.
    pub revision: String,
    pub is_dead: bool,
    pub is_exec: bool,
    /// Not yet in the repository on this branch.
    pub is_new: bool,
    pub mode: u32,
    pub timestamp: i64,
    pub content: Bytes,
    /// Content came from the revision cache.
    pub from_cache: bool,
    /// Set once the server has accounted for the file.
    pub handled: bool,
}

impl CvsFile {
    pub fn new(path: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            revision: revision.into(),
            ..Default::default()
        }
    }

    /// A file about to be committed.
    pub fn with_content(path: impl Into<String>, revision: impl Into<String>, content: Bytes) -> Self {
        Self {
            content,
            ..Self::new(path, revision)
        }
    }

    /// A file about to be removed.
    pub fn removed(path: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            is_dead: true,
            ..Self::new(path, revision)
        }
    }
}

/// Mode string sent with a modified file.
pub fn mode_string(is_exec: bool) -> &'static str {
    if is_exec {
        "u=rwx,g=rwx,o=rx"
    } else {
        "u=rw,g=rw,o=r"
    }
}

/// Parse a protocol mode string such as `u=rwx,g=rx,o=rx` into permission
/// bits.
pub fn parse_mode(s: &str) -> Option<u32> {
    let mut mode = 0u32;
    for clause in s.split(',') {
        let (who, perms) = clause.split_once('=').unwrap_or((clause, ""));
        let mut who_mask = 0u32;
        for c in who.chars() {
            who_mask |= match c {
                'u' => 0o700,
                'g' => 0o070,
                'o' => 0o007,
                _ => return None,
            };
        }
        let mut perm_mask = 0u32;
        for c in perms.chars() {
            perm_mask |= match c {
                'r' => 0o444,
                'w' => 0o222,
                'x' => 0o111,
                _ => return None,
            };
        }
        mode |= who_mask & perm_mask;
    }
    Some(mode)
}

/// Strip `,v` and `Attic/` from a server side RCS path and make it
/// relative to `prefix`.
pub(crate) fn rcs_to_module_path(rcs_path: &str, prefix: &str) -> Option<String> {
    let relative = rcs_path.strip_prefix(prefix)?;
    let relative = relative.strip_suffix(",v").unwrap_or(relative);
    Some(strip_attic(relative))
}

pub(crate) fn strip_attic(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("Attic/") {
        return rest.to_string();
    }
    match path.find("/Attic/") {
        Some(idx) => format!("{}{}", &path[..idx], &path[idx + "/Attic".len()..]),
        None => path.to_string(),
    }
}
