//! Per-branch aggregation context.
//!
//! Events are collected with [`Branch::add_revision`] in any order and
//! grouped by [`Branch::finalize`], which processes them by ascending
//! timestamp (ties by path, then revision number):
//!
//! 1. The candidate is the newest commit with the event's signature.
//! 2. The event joins it when it lies within `fuzz_time` of the
//!    candidate's `timestamp_last`, the path is not in it yet, and the
//!    path's previous revision sits in a commit ordered before it.
//! 3. Otherwise a new commit is inserted at its sorted position.
//!
//! A branch seeded with a baseline also checks that the new history picks
//! up exactly where the last run stopped.

use super::{Commit, CommitId, Revision, RevisionFlags, RevisionId, Signature};
use crate::commands::RlogEvent;
use crate::error::{CvsError, Result};
use crate::revision::RevisionNumber;
use crate::state::{BaselineEntry, BaselineSnapshot};
use std::collections::HashMap;

#[derive(Debug)]
struct PendingEvent {
    path: String,
    revision: String,
    number: RevisionNumber,
    signature: Signature,
    author: String,
    message: String,
    timestamp: i64,
    is_dead: bool,
}

#[derive(Debug)]
struct BaselineRecord {
    entry: BaselineEntry,
    number: Option<RevisionNumber>,
    /// The direct successor of this revision has been seen.
    consumed: bool,
}

pub struct Branch {
    name: String,
    fuzz_time: i64,
    revisions: Vec<Revision>,
    commits: Vec<Commit>,
    /// Commit ids sorted by `(timestamp, seq)`.
    order: Vec<CommitId>,
    by_signature: HashMap<Signature, CommitId>,
    heads: HashMap<String, RevisionId>,
    baseline: HashMap<String, BaselineRecord>,
    last_revision_timestamp: i64,
    pending: Vec<PendingEvent>,
    next_seq: u32,
    finalized: bool,
}

impl Branch {
    pub fn new(name: impl Into<String>, fuzz_time: i64) -> Self {
        Self {
            name: name.into(),
            fuzz_time,
            revisions: Vec::new(),
            commits: Vec::new(),
            order: Vec::new(),
            by_signature: HashMap::new(),
            heads: HashMap::new(),
            baseline: HashMap::new(),
            last_revision_timestamp: 0,
            pending: Vec::new(),
            next_seq: 0,
            finalized: false,
        }
    }

    /// A branch continuing from a previous run's baseline.
    pub fn with_baseline(name: impl Into<String>, fuzz_time: i64, snapshot: BaselineSnapshot) -> Self {
        let mut branch = Self::new(name, fuzz_time);
        branch.last_revision_timestamp = snapshot.last_revision_timestamp;
        for (path, entry) in snapshot.entries {
            let number = entry.revision.parse().ok();
            if number.is_none() {
                tracing::warn!("Baseline revision {} of {} is not a revision number", entry.revision, path);
            }
            branch.baseline.insert(
                path,
                BaselineRecord {
                    entry,
                    number,
                    consumed: false,
                },
            );
        }
        branch
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fuzz_time(&self) -> i64 {
        self.fuzz_time
    }

    /// Time to ask `rlog` for revisions after, if a previous run synced
    /// anything.
    pub fn sync_since(&self) -> Option<i64> {
        (self.last_revision_timestamp > 0).then_some(self.last_revision_timestamp)
    }

    // =========================================================================
    // Collecting
    // =========================================================================

    /// Record one revision event. Fails if the baseline already covers it.
    pub fn add_revision(
        &mut self,
        path: &str,
        revision: &str,
        author: &str,
        message: &str,
        timestamp: i64,
        is_dead: bool,
    ) -> Result<()> {
        let signature = Signature::new(author, message);
        self.push_event(path, revision, signature, author, message, timestamp, is_dead)
    }

    /// Record an rlog event, matching commits on its raw author and
    /// message.
    pub fn add_event(&mut self, event: &RlogEvent) -> Result<()> {
        let signature = if event.raw_author.is_empty() && event.raw_message.is_empty() {
            Signature::new(&event.author, &event.message)
        } else {
            Signature::new(&event.raw_author, &event.raw_message)
        };
        self.push_event(
            &event.path,
            &event.revision,
            signature,
            &event.author,
            &event.message,
            event.timestamp,
            event.is_dead,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn push_event(
        &mut self,
        path: &str,
        revision: &str,
        signature: Signature,
        author: &str,
        message: &str,
        timestamp: i64,
        is_dead: bool,
    ) -> Result<()> {
        if self.finalized {
            return Err(CvsError::consistency(path, "revision added after aggregation"));
        }
        let number: RevisionNumber = revision
            .parse()
            .map_err(|_| CvsError::consistency(path, format!("invalid revision {:?}", revision)))?;

        if let Some(record) = self.baseline.get_mut(path) {
            if let Some(base) = &record.number {
                if number.is_ancestor_or_equal(base) {
                    return Err(CvsError::consistency(
                        path,
                        format!(
                            "revision {} is already synced (baseline {})",
                            revision, record.entry.revision
                        ),
                    ));
                }
                if base.is_direct_successor(&number) {
                    record.consumed = true;
                }
            }
        }

        self.pending.push(PendingEvent {
            path: path.to_string(),
            revision: revision.to_string(),
            number,
            signature,
            author: author.to_string(),
            message: message.to_string(),
            timestamp,
            is_dead,
        });
        Ok(())
    }

    /// Group the collected events into commits and verify the baseline was
    /// continued without gaps.
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        let mut pending = std::mem::take(&mut self.pending);
        pending.sort_by(|a, b| {
            (a.timestamp, &a.path, &a.number).cmp(&(b.timestamp, &b.path, &b.number))
        });
        for event in pending {
            self.aggregate(event)?;
        }

        let mut vanished: Vec<(&String, &BaselineRecord)> = self
            .baseline
            .iter()
            .filter(|(path, record)| !record.consumed && self.heads.contains_key(*path))
            .collect();
        vanished.sort_by(|a, b| a.0.cmp(b.0));
        if let Some((path, record)) = vanished.first() {
            let first_new = self
                .first_revision_of(path)
                .map(|r| r.revision.clone())
                .unwrap_or_default();
            return Err(CvsError::consistency(
                path.as_str(),
                format!(
                    "history after synced revision {} starts at {}, a revision is missing",
                    record.entry.revision, first_new
                ),
            ));
        }

        self.finalized = true;
        tracing::info!(
            "Branch {}: {} revisions in {} commits",
            self.name,
            self.revisions.len(),
            self.commits.len()
        );
        Ok(())
    }

    fn aggregate(&mut self, event: PendingEvent) -> Result<()> {
        let prev = self.heads.get(&event.path).copied();
        if let Some(prev_id) = prev {
            if self.revisions[prev_id.0].revision == event.revision {
                return Err(CvsError::consistency(
                    &event.path,
                    format!("revision {} reported twice", event.revision),
                ));
            }
        }

        let signature = event.signature;
        let candidate = self
            .by_signature
            .get(&signature)
            .copied()
            .filter(|id| self.can_join(*id, &event.path, event.timestamp, prev));

        let commit_id = match candidate {
            Some(id) => {
                let commit = &mut self.commits[id.0];
                commit.timestamp_last = commit.timestamp_last.max(event.timestamp);
                id
            }
            None => {
                let id = self.open_commit(event.author, event.message, event.timestamp);
                self.by_signature.insert(signature, id);
                id
            }
        };

        let rev_id = RevisionId(self.revisions.len());
        let mut flags = RevisionFlags::empty();
        flags.set(RevisionFlags::DEAD, event.is_dead);
        self.revisions.push(Revision {
            path: event.path.clone(),
            revision: event.revision,
            timestamp: event.timestamp,
            flags,
            mark: 0,
            prev,
            commit: Some(commit_id),
        });
        self.commits[commit_id.0]
            .revisions
            .insert(event.path.clone(), rev_id);
        self.heads.insert(event.path, rev_id);
        Ok(())
    }

    fn can_join(&self, id: CommitId, path: &str, timestamp: i64, prev: Option<RevisionId>) -> bool {
        let commit = &self.commits[id.0];
        if (timestamp - commit.timestamp_last).abs() > self.fuzz_time || commit.contains(path) {
            return false;
        }
        match prev.and_then(|p| self.revisions[p.0].commit) {
            Some(prev_commit) => self.commits[prev_commit.0].order_key() < commit.order_key(),
            None => true,
        }
    }

    fn open_commit(&mut self, author: String, message: String, timestamp: i64) -> CommitId {
        let id = CommitId(self.commits.len());
        self.commits.push(Commit {
            timestamp,
            timestamp_last: timestamp,
            author,
            message,
            revisions: Default::default(),
            seq: self.next_seq,
            cancellation_point: None,
        });
        self.next_seq += 1;

        let key = self.commits[id.0].order_key();
        let pos = self
            .order
            .partition_point(|c| self.commits[c.0].order_key() <= key);
        self.order.insert(pos, id);
        id
    }

    fn first_revision_of(&self, path: &str) -> Option<&Revision> {
        let mut current = self.heads.get(path).map(|id| &self.revisions[id.0])?;
        while let Some(prev) = current.prev {
            current = &self.revisions[prev.0];
        }
        Some(current)
    }

    // =========================================================================
    // Results
    // =========================================================================

    /// Commits in ascending order.
    pub fn commits(&self) -> impl Iterator<Item = (CommitId, &Commit)> + '_ {
        self.order.iter().map(move |id| (*id, &self.commits[id.0]))
    }

    pub fn commit(&self, id: CommitId) -> &Commit {
        &self.commits[id.0]
    }

    pub fn revision(&self, id: RevisionId) -> &Revision {
        &self.revisions[id.0]
    }

    /// Revisions of a commit, by path.
    pub fn commit_revisions(&self, id: CommitId) -> impl Iterator<Item = &Revision> + '_ {
        self.commits[id.0]
            .revisions
            .values()
            .map(move |rev| &self.revisions[rev.0])
    }

    /// Newest revision of `path` in this run.
    pub fn head(&self, path: &str) -> Option<&Revision> {
        self.heads.get(path).map(|id| &self.revisions[id.0])
    }

    pub fn first_commit_time(&self) -> Option<i64> {
        self.order.first().map(|id| self.commits[id.0].timestamp)
    }

    pub fn commit_count(&self) -> usize {
        self.commits.len()
    }

    pub fn revision_count(&self) -> usize {
        self.revisions.len()
    }

    // =========================================================================
    // Sync progress
    // =========================================================================

    /// Record what checkout learned about a revision.
    pub fn set_exec(&mut self, id: RevisionId, is_exec: bool) {
        self.revisions[id.0].flags.set(RevisionFlags::EXEC, is_exec);
    }

    pub fn set_mark(&mut self, id: RevisionId, mark: u32) {
        self.revisions[id.0].mark = mark;
    }

    /// Mark one revision synced; its commit becomes a cancellation point
    /// once all of its revisions are.
    pub fn mark_revision_synced(&mut self, id: RevisionId) {
        self.revisions[id.0].flags.insert(RevisionFlags::PUSHED);
        if let Some(commit_id) = self.revisions[id.0].commit {
            let all_synced = self.commits[commit_id.0]
                .revisions
                .values()
                .all(|r| self.revisions[r.0].is_pushed());
            if all_synced {
                let commit = &mut self.commits[commit_id.0];
                commit.cancellation_point = Some(commit.timestamp_last);
            }
        }
    }

    /// Mark every revision of a commit synced.
    pub fn mark_synced(&mut self, id: CommitId) {
        let revisions: Vec<RevisionId> = self.commits[id.0].revisions.values().copied().collect();
        for rev in revisions {
            self.mark_revision_synced(rev);
        }
    }

    /// Cancellation point of the newest commit with only synced commits
    /// before it.
    pub fn resume_point(&self) -> Option<i64> {
        let mut point = None;
        for id in &self.order {
            match self.commits[id.0].cancellation_point {
                Some(ts) => point = Some(ts),
                None => break,
            }
        }
        point
    }

    /// The prior baseline updated with every commit up to the resume point,
    /// ready to be saved for the next run.
    pub fn baseline_snapshot(&self) -> BaselineSnapshot {
        let mut snapshot = BaselineSnapshot {
            last_revision_timestamp: self.last_revision_timestamp,
            entries: self
                .baseline
                .iter()
                .map(|(path, record)| (path.clone(), record.entry.clone()))
                .collect(),
        };

        for id in &self.order {
            let commit = &self.commits[id.0];
            let Some(point) = commit.cancellation_point else {
                break;
            };
            for rev in commit.revisions.values() {
                let revision = &self.revisions[rev.0];
                snapshot.insert(
                    revision.path.clone(),
                    BaselineEntry {
                        revision: revision.revision.clone(),
                        is_dead: revision.is_dead(),
                        is_exec: revision.is_exec(),
                        mark: revision.mark,
                    },
                );
            }
            snapshot.last_revision_timestamp = snapshot.last_revision_timestamp.max(point);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use proptest::prelude::*;

    fn add(branch: &mut Branch, path: &str, rev: &str, author: &str, msg: &str, ts: i64) {
        branch.add_revision(path, rev, author, msg, ts, false).unwrap();
    }

    fn commit_paths(branch: &Branch) -> Vec<Vec<String>> {
        branch
            .commits()
            .map(|(_, c)| c.revisions.keys().cloned().collect())
            .collect()
    }

    #[test]
    fn test_fuzz_joins_close_revisions() {
        let mut branch = Branch::new("HEAD", 5);
        add(&mut branch, "a.c", "1.2", "joe", "fix", 1000);
        add(&mut branch, "b.c", "1.5", "joe", "fix", 1002);
        branch.finalize().unwrap();

        assert_eq!(branch.commit_count(), 1);
        let (_, commit) = branch.commits().next().unwrap();
        assert_eq!(commit.timestamp, 1000);
        assert_eq!(commit.timestamp_last, 1002);
        assert_eq!(commit.len(), 2);
    }

    #[test]
    fn test_zero_fuzz_splits() {
        let mut branch = Branch::new("HEAD", 0);
        add(&mut branch, "b.c", "1.5", "joe", "fix", 1002);
        add(&mut branch, "a.c", "1.2", "joe", "fix", 1000);
        branch.finalize().unwrap();

        assert_eq!(commit_paths(&branch), vec![vec!["a.c"], vec!["b.c"]]);
        assert_eq!(branch.first_commit_time(), Some(1000));
    }

    #[test]
    fn test_window_extends_with_stragglers() {
        let mut branch = Branch::new("HEAD", 5);
        for (i, path) in ["a", "b", "c", "d"].iter().enumerate() {
            add(&mut branch, path, "1.1", "joe", "import", 100 + 4 * i as i64);
        }
        branch.finalize().unwrap();
        assert_eq!(branch.commit_count(), 1);
        assert_eq!(branch.commits().next().unwrap().1.timestamp_last, 112);
    }

    #[test]
    fn test_same_path_twice_opens_new_commit() {
        let mut branch = Branch::new("HEAD", 300);
        add(&mut branch, "a.c", "1.1", "joe", "wip", 100);
        add(&mut branch, "a.c", "1.2", "joe", "wip", 110);
        branch.finalize().unwrap();

        assert_eq!(branch.commit_count(), 2);
        let head = branch.head("a.c").unwrap();
        assert_eq!(head.revision, "1.2");
        let prev = branch.revision(head.prev.unwrap());
        assert_eq!(prev.revision, "1.1");
    }

    #[test]
    fn test_previous_revision_must_precede() {
        // y 1.1 lands in a commit after the "fix" commit, so y 1.2 cannot
        // join "fix" even though it is within the window.
        let mut branch = Branch::new("HEAD", 300);
        add(&mut branch, "x", "1.1", "joe", "fix", 100);
        add(&mut branch, "y", "1.1", "ann", "other", 101);
        add(&mut branch, "y", "1.2", "joe", "fix", 102);
        branch.finalize().unwrap();

        assert_eq!(commit_paths(&branch), vec![vec!["x"], vec!["y"], vec!["y"]]);
        let authors: Vec<&str> = branch.commits().map(|(_, c)| c.author.as_str()).collect();
        assert_eq!(authors, vec!["joe", "ann", "joe"]);
    }

    #[test]
    fn test_different_signatures_stay_apart() {
        let mut branch = Branch::new("HEAD", 300);
        add(&mut branch, "a", "1.1", "joe", "one", 100);
        add(&mut branch, "b", "1.1", "joe", "two", 100);
        add(&mut branch, "c", "1.1", "ann", "one", 100);
        branch.finalize().unwrap();
        assert_eq!(branch.commit_count(), 3);
    }

    fn latin1_event(path: &str, message: &[u8], ts: i64) -> RlogEvent {
        RlogEvent {
            branch: "HEAD".into(),
            path: path.into(),
            revision: "1.1".into(),
            author: "joe".into(),
            message: crate::transport::stream::decode_text(message),
            timestamp: ts,
            is_dead: false,
            raw_author: Bytes::from_static(b"joe"),
            raw_message: Bytes::copy_from_slice(message),
        }
    }

    #[test]
    fn test_messages_differing_in_one_byte_stay_apart() {
        let mut branch = Branch::new("HEAD", 300);
        branch.add_event(&latin1_event("a", b"caf\xe9\n", 100)).unwrap();
        branch.add_event(&latin1_event("b", b"caf\xe8\n", 101)).unwrap();
        branch.add_event(&latin1_event("c", b"caf\xe9\n", 102)).unwrap();
        branch.finalize().unwrap();

        assert_eq!(commit_paths(&branch), vec![vec!["a", "c"], vec!["b"]]);
        let messages: Vec<&str> = branch.commits().map(|(_, c)| c.message.as_str()).collect();
        assert_eq!(messages, vec!["caf\u{e9}\n", "caf\u{e8}\n"]);
    }

    #[test]
    fn test_duplicate_revision_in_run() {
        let mut branch = Branch::new("HEAD", 300);
        add(&mut branch, "a", "1.1", "joe", "one", 100);
        add(&mut branch, "a", "1.1", "joe", "one", 100);
        assert!(matches!(
            branch.finalize(),
            Err(CvsError::ConsistencyFault { .. })
        ));
    }

    fn baseline(entries: &[(&str, &str)]) -> BaselineSnapshot {
        let mut snapshot = BaselineSnapshot {
            last_revision_timestamp: 50,
            ..Default::default()
        };
        for (path, rev) in entries {
            snapshot.insert(*path, BaselineEntry::new(*rev));
        }
        snapshot
    }

    #[test]
    fn test_baseline_already_synced() {
        let mut branch = Branch::with_baseline("HEAD", 300, baseline(&[("a", "1.3")]));
        assert_eq!(branch.sync_since(), Some(50));
        for rev in ["1.3", "1.2"] {
            let err = branch.add_revision("a", rev, "joe", "m", 100, false).unwrap_err();
            assert!(matches!(err, CvsError::ConsistencyFault { .. }));
        }
    }

    #[test]
    fn test_baseline_consumed_by_successor() {
        let mut branch = Branch::with_baseline("stable", 300, baseline(&[("a", "1.3"), ("b", "1.1")]));
        add(&mut branch, "a", "1.4", "joe", "m", 100);
        add(&mut branch, "a", "1.5", "joe", "n", 200);
        add(&mut branch, "b", "1.1.2.1", "joe", "m", 100);
        add(&mut branch, "c", "1.1", "joe", "m", 100);
        branch.finalize().unwrap();
        assert_eq!(branch.commit_count(), 2);
    }

    #[test]
    fn test_unconsumed_baseline_is_fault() {
        let mut branch = Branch::with_baseline("HEAD", 300, baseline(&[("a", "1.3"), ("z", "1.1")]));
        add(&mut branch, "a", "1.5", "joe", "m", 100);
        match branch.finalize() {
            Err(CvsError::ConsistencyFault { path, detail }) => {
                assert_eq!(path, "a");
                assert!(detail.contains("1.3"));
                assert!(detail.contains("1.5"));
            }
            other => panic!("Expected ConsistencyFault, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_resume_point_and_snapshot() {
        let mut branch = Branch::with_baseline("HEAD", 0, baseline(&[("a", "1.1"), ("keep", "1.7")]));
        add(&mut branch, "a", "1.2", "joe", "one", 100);
        add(&mut branch, "b", "1.1", "joe", "one", 100);
        add(&mut branch, "a", "1.3", "joe", "two", 200);
        add(&mut branch, "c", "1.1", "joe", "three", 300);
        branch.finalize().unwrap();
        assert_eq!(branch.resume_point(), None);

        let ids: Vec<CommitId> = branch.commits().map(|(id, _)| id).collect();
        branch.mark_synced(ids[0]);
        branch.mark_synced(ids[2]);
        assert_eq!(branch.resume_point(), Some(100));
        assert!(branch.commit(ids[2]).cancellation_point.is_some());

        let snapshot = branch.baseline_snapshot();
        assert_eq!(snapshot.last_revision_timestamp, 100);
        assert_eq!(snapshot.get("a").unwrap().revision, "1.2");
        assert_eq!(snapshot.get("b").unwrap().revision, "1.1");
        assert_eq!(snapshot.get("keep").unwrap().revision, "1.7");
        assert!(snapshot.get("c").is_none());

        // Syncing one revision at a time closes the commit only at the end.
        let rev = *branch.commit(ids[1]).revisions.get("a").unwrap();
        branch.set_exec(rev, true);
        branch.set_mark(rev, 9);
        branch.mark_revision_synced(rev);
        assert_eq!(branch.resume_point(), Some(300));
        let snapshot = branch.baseline_snapshot();
        let a = snapshot.get("a").unwrap();
        assert_eq!((a.revision.as_str(), a.is_exec, a.mark), ("1.3", true, 9));
        assert_eq!(snapshot.get("c").unwrap().revision, "1.1");
        assert_eq!(snapshot.last_revision_timestamp, 300);
    }

    #[test]
    fn test_add_after_finalize() {
        let mut branch = Branch::new("HEAD", 300);
        branch.finalize().unwrap();
        assert!(branch.add_revision("a", "1.1", "joe", "m", 1, false).is_err());
        assert_eq!(branch.first_commit_time(), None);
    }

    proptest! {
        #[test]
        fn test_aggregation_invariants(
            events in prop::collection::vec((0usize..4, 0usize..3, 0i64..50), 1..40),
            fuzz in 0i64..10,
        ) {
            let paths = ["a", "b", "c", "d"];
            let authors = ["joe", "ann", "bob"];
            let mut next_rev = [1u32; 4];
            let mut last_ts = [0i64; 4];
            let mut branch = Branch::new("HEAD", fuzz);
            for (p, a, dt) in events {
                // Later revisions of a file are never older.
                last_ts[p] += dt;
                let rev = format!("1.{}", next_rev[p]);
                next_rev[p] += 1;
                branch.add_revision(paths[p], &rev, authors[a], "msg", last_ts[p], false).unwrap();
            }
            branch.finalize().unwrap();

            let mut seen = 0;
            let mut last_key = None;
            for (id, commit) in branch.commits() {
                let key = commit.order_key();
                prop_assert!(last_key.map_or(true, |k| k <= key));
                last_key = Some(key);
                prop_assert!(commit.timestamp_last >= commit.timestamp);
                for rev in branch.commit_revisions(id) {
                    seen += 1;
                    prop_assert_eq!(rev.commit, Some(id));
                    if let Some(prev) = rev.prev {
                        let prev_commit = branch.revision(prev).commit.unwrap();
                        prop_assert!(branch.commit(prev_commit).order_key() < key);
                    }
                }
            }
            prop_assert_eq!(seen, branch.revision_count());
        }
    }
}
