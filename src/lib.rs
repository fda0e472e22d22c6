//! CVS client protocol and commit reconstruction.
//!
//! A [`Session`] speaks the CVS client/server protocol over ssh, a local
//! `cvs server` subprocess or pserver. Commands (`rlog`, `rlist`, `co`,
//! `status`, `ci`, `tag`, `add`) live in [`commands`]. The [`aggregate`]
//! module turns per-file rlog history into ordered multi-file commits,
//! and [`state`] keeps the per-branch baseline between runs.

pub mod aggregate;
pub mod cache;
pub mod commands;
pub mod config;
pub mod date;
pub mod error;
pub mod protocol;
pub mod revision;
pub mod root;
pub mod session;
pub mod state;
pub mod sync;
pub mod transport;

pub use aggregate::{Branch, Commit, CommitId, Revision, RevisionId};
pub use cache::{DiskCache, MemoryCache, RevisionCache};
pub use commands::{CvsFile, RlistEntry, RlogEvent, RlogSummary, StatusReport};
pub use config::ClientConfig;
pub use error::{CvsError, Result};
pub use root::CvsRoot;
pub use session::Session;
pub use state::{BaselineSnapshot, BaselineStore, FileBaselineStore};
pub use sync::{collect_history, History};
