// Revision content cache
//
// Checked out revisions never change, so content fetched once can be reused
// by later runs. The disk cache keeps one file per (path, revision) in a
// flat directory named by an xxh3 hash of both.

use crate::error::Result;
use bytes::Bytes;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use xxhash_rust::xxh3::xxh3_64;

/// Storage for revision content keyed by module path and revision.
pub trait RevisionCache: Send + Sync {
    /// Content and exec flag of `path` at `revision`, if cached.
    fn get(&self, path: &str, revision: &str) -> Option<(Bytes, bool)>;

    fn put(&self, path: &str, revision: &str, content: &[u8], is_exec: bool) -> Result<()>;
}

/// In-process cache, mostly for tests and short runs.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<(String, String), (Bytes, bool)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RevisionCache for MemoryCache {
    fn get(&self, path: &str, revision: &str) -> Option<(Bytes, bool)> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(&(path.to_string(), revision.to_string()))
            .cloned()
    }

    fn put(&self, path: &str, revision: &str, content: &[u8], is_exec: bool) -> Result<()> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                (path.to_string(), revision.to_string()),
                (Bytes::copy_from_slice(content), is_exec),
            );
        }
        Ok(())
    }
}

/// Cache directory with one file per revision.
///
/// The first byte of each file is `1` for executable content, `0`
/// otherwise; the rest is the content.
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn entry_path(&self, path: &str, revision: &str) -> PathBuf {
        let key = format!("{}\0{}", path, revision);
        self.dir.join(format!("{:016x}", xxh3_64(key.as_bytes())))
    }
}

impl RevisionCache for DiskCache {
    fn get(&self, path: &str, revision: &str) -> Option<(Bytes, bool)> {
        let data = match fs::read(self.entry_path(path, revision)) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read cached {} rev {}: {}", path, revision, e);
                return None;
            }
        };
        let (flag, content) = data.split_first()?;
        Some((Bytes::copy_from_slice(content), *flag == 1))
    }

    fn put(&self, path: &str, revision: &str, content: &[u8], is_exec: bool) -> Result<()> {
        let target = self.entry_path(path, revision);
        let temp = target.with_extension("tmp");
        {
            let mut file = fs::File::create(&temp)?;
            file.write_all(&[u8::from(is_exec)])?;
            file.write_all(content)?;
        }
        fs::rename(&temp, &target)?;
        Ok(())
    }
}
