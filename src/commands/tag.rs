//! `tag`: put a tag or a branch on a set of file revisions.

use super::CvsFile;
use crate::error::Result;
use crate::protocol::{argument, entry_line, next_message, split_path, DirectoryWalker};
use crate::session::Session;

impl Session {
    /// Tag `files` at their revisions with `name`, as a branch when
    /// `is_branch` is set.
    pub async fn tag(&mut self, name: &str, is_branch: bool, files: &[CvsFile]) -> Result<()> {
        let repo = self.repo_path().to_string();
        let module = self.module().to_string();
        let mut walker = DirectoryWalker::new(&repo, &module, None);

        let stream = self.stream();
        if is_branch {
            argument(stream, "-b");
        }
        argument(stream, "--");
        argument(stream, name);
        for file in files {
            let (dir, base) = split_path(&file.path);
            walker.enter(stream, dir);
            stream.write_line(&format!("Entry {}", entry_line(base, &file.revision, "", "")));
            stream.write_line(&format!("Unchanged {}", base));
        }
        walker.finish(stream);
        stream.write_line("tag");
        stream.flush().await?;

        while let Some(text) = next_message(stream).await? {
            tracing::info!("CVS M: {}", text);
        }
        tracing::debug!("Tagged {} files with {}", files.len(), name);
        Ok(())
    }
}
