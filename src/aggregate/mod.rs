//! Commit aggregation.
//!
//! CVS records history per file. This module groups per-file revisions
//! that share an author and log message and were committed close together
//! into synthetic multi-file commits.
//!
//! Revisions and commits live in arenas owned by a [`Branch`] and refer to
//! each other by [`RevisionId`] and [`CommitId`].

pub mod branch;

pub use branch::Branch;

use bitflags::bitflags;
use bytes::Bytes;
use std::collections::BTreeMap;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RevisionFlags: u8 {
        const DEAD = 0b0000_0001;
        const EXEC = 0b0000_0010;
        /// Confirmed present in the sync target.
        const PUSHED = 0b0000_0100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RevisionId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitId(pub(crate) usize);

/// One revision of one file.
#[derive(Debug, Clone)]
pub struct Revision {
    pub path: String,
    pub revision: String,
    pub timestamp: i64,
    pub flags: RevisionFlags,
    pub mark: u32,
    /// The same file's previous revision in this run.
    pub prev: Option<RevisionId>,
    pub commit: Option<CommitId>,
}

impl Revision {
    pub fn is_dead(&self) -> bool {
        self.flags.contains(RevisionFlags::DEAD)
    }

    pub fn is_exec(&self) -> bool {
        self.flags.contains(RevisionFlags::EXEC)
    }

    pub fn is_pushed(&self) -> bool {
        self.flags.contains(RevisionFlags::PUSHED)
    }
}

/// Author and message shared by the revisions of one commit, byte for
/// byte as the server sent them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub author: Bytes,
    pub message: Bytes,
}

impl Signature {
    pub fn new(author: impl AsRef<[u8]>, message: impl AsRef<[u8]>) -> Self {
        Self {
            author: Bytes::copy_from_slice(author.as_ref()),
            message: Bytes::copy_from_slice(message.as_ref()),
        }
    }
}

/// A synthetic commit.
#[derive(Debug, Clone)]
pub struct Commit {
    /// Time of the first revision assigned.
    pub timestamp: i64,
    /// Time of the latest revision assigned; only ever grows.
    pub timestamp_last: i64,
    /// Display forms; revisions were matched on [`Signature`].
    pub author: String,
    pub message: String,
    pub revisions: BTreeMap<String, RevisionId>,
    pub seq: u32,
    /// Set once every revision is synced; a later run may resume after it.
    pub cancellation_point: Option<i64>,
}

impl Commit {
    pub fn contains(&self, path: &str) -> bool {
        self.revisions.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    /// Position key in the commit list.
    pub fn order_key(&self) -> (i64, u32) {
        (self.timestamp, self.seq)
    }
}
