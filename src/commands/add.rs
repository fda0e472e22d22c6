//! `add` for directories.
//!
//! The server only accepts a new directory after the client has walked
//! into each of its parents, so the request lists every ancestor in
//! order, returning to `.` whenever the walk leaves a subtree.

use crate::error::Result;
use crate::protocol::{argument, next_message, request::sticky_tag, DirectoryWalker};
use crate::session::Session;
use std::collections::BTreeSet;

/// Every directory in `dirs` plus all of its parents, sorted.
pub fn directory_traversal(dirs: &[String]) -> Vec<String> {
    let mut all = BTreeSet::new();
    for dir in dirs {
        let mut current = dir.trim_end_matches('/');
        while !current.is_empty() && current != "." {
            all.insert(current.to_string());
            current = match current.rfind('/') {
                Some(idx) => &current[..idx],
                None => break,
            };
        }
    }
    all.into_iter().collect()
}

fn within(dir: &str, top: &str) -> bool {
    dir == top || dir.strip_prefix(top).is_some_and(|rest| rest.starts_with('/'))
}

impl Session {
    /// Create `dirs` on `branch`.
    pub async fn create_directories(&mut self, branch: &str, dirs: &[String]) -> Result<()> {
        let repo = self.repo_path().to_string();
        let module = self.module().to_string();
        let walker = DirectoryWalker::new(&repo, &module, sticky_tag(branch));

        let stream = self.stream();
        argument(stream, "--");
        let mut top = ".".to_string();
        for dir in directory_traversal(dirs) {
            if !within(&dir, &top) {
                walker.write_block(stream, ".");
                top = dir.clone();
            }
            walker.write_block(stream, &dir);
        }
        walker.write_block(stream, ".");
        for dir in dirs {
            argument(stream, dir);
        }
        stream.write_line("add");
        stream.flush().await?;

        while let Some(text) = next_message(stream).await? {
            tracing::debug!("CVS M: {}", text);
        }
        tracing::info!("Added {} directories on {}", dirs.len(), branch);
        Ok(())
    }
}
