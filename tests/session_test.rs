#[cfg(test)]
mod tests {
    use cvs_sync::cache::{DiskCache, RevisionCache};
    use cvs_sync::state::{BaselineStore, FileBaselineStore};
    use cvs_sync::transport::{CvsStream, ServerConnection};
    use cvs_sync::{collect_history, ClientConfig, CvsError, CvsRoot, Session};
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::task::JoinHandle;

    const NEGOTIATION: &str =
        "Valid-requests Root Valid-responses valid-requests add ci co rlog rlist status tag UseUnchanged\nok\n";

    /// Session against an in-memory server that plays `script` and returns
    /// everything the client wrote.
    async fn scripted(script: &str) -> anyhow::Result<(Session, JoinHandle<String>)> {
        scripted_bytes(script.as_bytes()).await
    }

    async fn scripted_bytes(script: &[u8]) -> anyhow::Result<(Session, JoinHandle<String>)> {
        let (client, mut server) = tokio::io::duplex(1024 * 1024);
        let mut bytes = NEGOTIATION.as_bytes().to_vec();
        bytes.extend_from_slice(script);
        let script = bytes;
        let handle = tokio::spawn(async move {
            server.write_all(&script).await.unwrap();
            let mut received = Vec::new();
            server.read_to_end(&mut received).await.unwrap();
            String::from_utf8_lossy(&received).into_owned()
        });
        let (r, w) = tokio::io::split(client);
        let conn = ServerConnection::from_stream(CvsStream::from_io(r, w), "scripted");
        let session = Session::establish(
            conn,
            CvsRoot::parse(":local:/cvsroot")?,
            "proj",
            ClientConfig::default(),
        )
        .await?;
        Ok((session, handle))
    }

    fn rlog_file(path: &str, revisions: &[(&str, &str, &str, &str)]) -> String {
        let mut out = format!(
            "M RCS file: /cvsroot/proj/{},v\nM head: {}\nM symbolic names:\nM keyword substitution: kv\n",
            path, revisions[0].0
        );
        for (rev, date, author, message) in revisions {
            out.push_str("M ----------------------------\n");
            out.push_str(&format!("M revision {}\n", rev));
            out.push_str(&format!(
                "M date: {};  author: {};  state: Exp;  lines: +1 -0\n",
                date, author
            ));
            out.push_str(&format!("M {}\n", message));
        }
        out.push_str("M =============================================================================\n");
        out
    }

    #[tokio::test]
    async fn test_incremental_history_across_runs() -> anyhow::Result<()> {
        let state = TempDir::new()?;
        let store = FileBaselineStore::open(state.path())?;
        let only = vec!["HEAD".to_string()];

        // First run sees everything.
        let first = format!(
            "{}{}ok\n",
            rlog_file(
                "Makefile",
                &[
                    ("1.2", "2013/03/17 16:00:00", "joe", "add install target"),
                    ("1.1", "2013/03/17 15:00:00", "joe", "import"),
                ]
            ),
            rlog_file("main.c", &[("1.1", "2013/03/17 15:00:05", "joe", "import")]),
        );
        let (mut session, handle) = scripted(&first).await?;
        let mut history = collect_history(&mut session, Some(&store as &dyn BaselineStore), &only).await?;
        session.terminate().await?;
        let sent = handle.await?;
        assert!(!sent.contains("Argument -d\n"));

        let head = history.branches.get_mut("HEAD").unwrap();
        let summary: Vec<(String, usize)> = head
            .commits()
            .map(|(_, c)| (c.message.trim_end().to_string(), c.len()))
            .collect();
        assert_eq!(
            summary,
            vec![("import".to_string(), 2), ("add install target".to_string(), 1)]
        );
        let ids: Vec<_> = head.commits().map(|(id, _)| id).collect();
        for id in ids {
            head.mark_synced(id);
        }
        history.save_baselines(&store)?;

        // Second run only gets what is new since the last synced commit.
        let second = format!(
            "{}ok\n",
            rlog_file("main.c", &[("1.2", "2013/03/18 09:00:00", "ann", "fix warning")])
        );
        let (mut session, handle) = scripted(&second).await?;
        let history = collect_history(&mut session, Some(&store as &dyn BaselineStore), &only).await?;
        session.terminate().await?;
        let sent = handle.await?;
        assert!(sent.contains("Argument -d\nArgument Sun, 17 Mar 2013 16:00:00 +0000<"));

        let head = history.branch("HEAD").unwrap();
        assert_eq!(head.commit_count(), 1);
        assert_eq!(head.head("main.c").unwrap().revision, "1.2");
        Ok(())
    }

    #[tokio::test]
    async fn test_latin1_messages_are_separate_commits() -> anyhow::Result<()> {
        let mut reply = Vec::new();
        for (path, message) in [("a.c", &b"caf\xe9"[..]), ("b.c", &b"caf\xe8"[..])] {
            reply.extend_from_slice(
                format!(
                    "M RCS file: /cvsroot/proj/{},v\nM head: 1.1\nM symbolic names:\nM keyword substitution: kv\n\
                     M ----------------------------\nM revision 1.1\n\
                     M date: 2013/03/17 15:00:00;  author: joe;  state: Exp;\nM ",
                    path
                )
                .as_bytes(),
            );
            reply.extend_from_slice(message);
            reply.extend_from_slice(
                b"\nM =============================================================================\n",
            );
        }
        reply.extend_from_slice(b"ok\n");

        let (mut session, _handle) = scripted_bytes(&reply).await?;
        let history = collect_history(&mut session, None, &[]).await?;
        let head = history.branch("HEAD").unwrap();
        assert_eq!(head.commit_count(), 2);
        let mut messages: Vec<&str> = head.commits().map(|(_, c)| c.message.as_str()).collect();
        messages.sort();
        assert_eq!(messages, vec!["caf\u{e8}\n", "caf\u{e9}\n"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_skipped_revision_is_a_consistency_fault() -> anyhow::Result<()> {
        let state = TempDir::new()?;
        let store = FileBaselineStore::open(state.path())?;
        let mut snapshot = store.load("HEAD")?;
        snapshot.last_revision_timestamp = 1363532400;
        snapshot.insert("main.c", cvs_sync::state::BaselineEntry::new("1.1"));
        store.save("HEAD", &snapshot)?;

        // 1.2 never arrives
        let reply = format!(
            "{}ok\n",
            rlog_file("main.c", &[("1.3", "2013/03/18 09:00:00", "ann", "fix warning")])
        );
        let (mut session, _handle) = scripted(&reply).await?;
        let only = vec!["HEAD".to_string()];
        match collect_history(&mut session, Some(&store as &dyn BaselineStore), &only).await {
            Err(CvsError::ConsistencyFault { path, .. }) => assert_eq!(path, "main.c"),
            Err(other) => panic!("Expected ConsistencyFault, got {:?}", other),
            Ok(_) => panic!("Expected ConsistencyFault"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_checkout_fills_disk_cache() -> anyhow::Result<()> {
        let cache_dir = TempDir::new()?;
        let cache = DiskCache::open(cache_dir.path())?;
        let reply = "Created proj/\n/cvsroot/proj/run.sh\n/run.sh/1.4//-kk/\nu=rwx,g=rx,o=rx\n10\n#!/bin/sh\nok\n";

        let (mut session, handle) = scripted(reply).await?;
        let file = session
            .checkout_revision("run.sh", "1.4", Some(&cache as &dyn RevisionCache))
            .await?;
        session.terminate().await?;
        handle.await?;
        assert_eq!(&file.content[..], b"#!/bin/sh\n");
        assert!(file.is_exec);

        // A fresh cache over the same directory serves the revision.
        let reopened = DiskCache::open(cache_dir.path())?;
        let (content, is_exec) = reopened.get("run.sh", "1.4").unwrap();
        assert_eq!(&content[..], b"#!/bin/sh\n");
        assert!(is_exec);
        Ok(())
    }

    #[tokio::test]
    async fn test_server_error_surfaces() -> anyhow::Result<()> {
        let (mut session, _handle) =
            scripted("E cvs rlist: cannot find module `proj'\nerror  \n").await?;
        match session.list_files("HEAD", None).await {
            Err(CvsError::ServerError(line)) => assert!(line.starts_with("error")),
            other => panic!("Expected ServerError, got {:?}", other),
        }
        Ok(())
    }
}
