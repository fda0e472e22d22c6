//! Request building blocks shared by the commands.

use crate::revision::HEAD_BRANCH;
use crate::transport::CvsStream;

/// The `Valid-responses` list sent during negotiation.
pub const VALID_RESPONSES: &str = "ok error Valid-requests Checked-in New-entry Checksum \
Copy-file Updated Created Merged Patched Rcs-diff Mode Mod-time Removed Remove-entry \
Set-static-directory Clear-static-directory Set-sticky Clear-sticky Template Notified \
Module-expansion Wrapper-rcsOption M E";

pub fn argument(stream: &mut CvsStream, arg: &str) {
    stream.write_line(&format!("Argument {}", arg));
}

pub fn arguments(stream: &mut CvsStream, args: &[&str]) {
    for arg in args {
        argument(stream, arg);
    }
}

/// `-m <message>`, continuation lines sent as `Argumentx`.
pub fn message_argument(stream: &mut CvsStream, message: &str) {
    argument(stream, "-m");
    for (i, line) in message.split('\n').enumerate() {
        let line = line.trim_end();
        if i == 0 {
            stream.write_line(&format!("Argument {}", line));
        } else {
            stream.write_line(&format!("Argumentx {}", line));
        }
    }
}

/// Build an entry line `/<name>/<revision>//<options>/<tag>`.
pub fn entry_line(name: &str, revision: &str, options: &str, tag: &str) -> String {
    format!("/{}/{}//{}/{}", name, revision, options, tag)
}

/// Revision field of an entry line.
pub fn entry_revision(entry: &str) -> Option<&str> {
    let rest = entry.strip_prefix('/')?;
    let (_, rest) = rest.split_once('/')?;
    let (revision, _) = rest.split_once('/')?;
    Some(revision)
}

/// Split a module relative path into its directory (`.` at the top) and
/// file name.
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => (".", path),
    }
}

/// Sticky tag for a branch, `None` on trunk.
pub fn sticky_tag(branch: &str) -> Option<&str> {
    if branch == HEAD_BRANCH {
        None
    } else {
        Some(branch)
    }
}

/// Emits `Directory` blocks as a file list moves between directories.
///
/// Files must be grouped by directory for the server to see each
/// directory once.
pub struct DirectoryWalker<'a> {
    module_root: String,
    sticky: Option<&'a str>,
    current: Option<String>,
}

impl<'a> DirectoryWalker<'a> {
    pub fn new(repo_path: &str, module: &str, sticky: Option<&'a str>) -> Self {
        Self {
            module_root: format!("{}/{}", repo_path, module),
            sticky,
            current: None,
        }
    }

    /// Send a `Directory` block for `dir` unless it is already current.
    pub fn enter(&mut self, stream: &mut CvsStream, dir: &str) {
        if self.current.as_deref() == Some(dir) {
            return;
        }
        self.write_block(stream, dir);
        self.current = Some(dir.to_string());
    }

    /// Send a `Directory` block for `dir` unconditionally.
    pub fn write_block(&self, stream: &mut CvsStream, dir: &str) {
        stream.write_line(&format!("Directory {}", dir));
        if dir == "." {
            stream.write_line(&self.module_root);
        } else {
            stream.write_line(&format!("{}/{}", self.module_root, dir));
        }
        if let Some(tag) = self.sticky {
            stream.write_line(&format!("Sticky T{}", tag));
        }
    }

    /// Closing `Directory .` block every command ends with.
    pub fn finish(&mut self, stream: &mut CvsStream) {
        self.write_block(stream, ".");
        self.current = Some(".".to_string());
    }

    /// Tag field for entry lines: `T<branch>` when sticky.
    pub fn entry_tag(&self) -> String {
        self.sticky.map(|t| format!("T{}", t)).unwrap_or_default()
    }
}
