// Recorded command transcripts
//
// Large modules take minutes to rlog. A transcript file holds the raw `M `
// payload lines of one reply, one per line, so a later run can parse it
// without a server. Files are only written after the whole reply parsed.

use crate::error::Result;
use bytes::Bytes;
use std::path::{Path, PathBuf};

/// Lines of the transcript at `path`, or `None` when there is none.
pub(crate) async fn replay(path: Option<&Path>) -> Result<Option<Vec<Bytes>>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let data = match tokio::fs::read(path).await {
        Ok(data) => Bytes::from(data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    tracing::info!("Replaying {} bytes of transcript from {}", data.len(), path.display());

    let mut lines = Vec::new();
    let mut start = 0;
    while start < data.len() {
        let end = data[start..]
            .iter()
            .position(|b| *b == b'\n')
            .map_or(data.len(), |pos| start + pos);
        lines.push(data.slice(start..end));
        start = end + 1;
    }
    Ok(Some(lines))
}

/// Collects reply lines and writes them out once the reply is complete.
pub(crate) struct Recorder {
    path: Option<PathBuf>,
    data: Vec<u8>,
}

impl Recorder {
    pub(crate) fn new(path: Option<&Path>) -> Self {
        Self {
            path: path.map(Path::to_path_buf),
            data: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, line: &[u8]) {
        if self.path.is_some() {
            self.data.extend_from_slice(line);
            self.data.push(b'\n');
        }
    }

    pub(crate) async fn save(self) -> Result<()> {
        let Some(path) = self.path else {
            return Ok(());
        };
        let temp = path.with_extension("tmp");
        tokio::fs::write(&temp, &self.data).await?;
        tokio::fs::rename(&temp, &path).await?;
        tracing::info!("Recorded {} bytes of transcript to {}", self.data.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_record_then_replay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mod.rlog");
        assert!(replay(Some(&path)).await.unwrap().is_none());

        let mut recorder = Recorder::new(Some(&path));
        recorder.push(b"RCS file: /cvsroot/mod/a.c,v");
        recorder.push(b"");
        recorder.push(b"caf\xe9");
        recorder.save().await.unwrap();

        let lines = replay(Some(&path)).await.unwrap().unwrap();
        let lines: Vec<&[u8]> = lines.iter().map(|l| &l[..]).collect();
        assert_eq!(lines, vec![&b"RCS file: /cvsroot/mod/a.c,v"[..], b"", b"caf\xe9"]);
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_without_path_nothing_happens() {
        assert!(replay(None).await.unwrap().is_none());
        let mut recorder = Recorder::new(None);
        recorder.push(b"line");
        recorder.save().await.unwrap();
    }
}
