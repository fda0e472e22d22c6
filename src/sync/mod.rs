//! One sync run: rlog the module, aggregate per branch, persist baselines.

use crate::aggregate::Branch;
use crate::commands::RlogSummary;
use crate::error::Result;
use crate::session::Session;
use crate::state::BaselineStore;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Aggregated history of every branch seen in a run.
pub struct History {
    pub branches: BTreeMap<String, Branch>,
    pub summary: RlogSummary,
}

impl History {
    pub fn branch(&self, name: &str) -> Option<&Branch> {
        self.branches.get(name)
    }

    /// Save the baseline of every branch.
    pub fn save_baselines(&self, store: &dyn BaselineStore) -> Result<()> {
        for (name, branch) in &self.branches {
            store.save(name, &branch.baseline_snapshot())?;
        }
        Ok(())
    }
}

fn open_branch(name: &str, fuzz_time: i64, store: Option<&dyn BaselineStore>) -> Result<Branch> {
    match store {
        Some(store) => Ok(Branch::with_baseline(name, fuzz_time, store.load(name)?)),
        None => Ok(Branch::new(name, fuzz_time)),
    }
}

/// Fetch the module history and aggregate it into commits.
///
/// With `only` empty every branch is collected. Branches seeded from
/// `store` only receive revisions newer than their last sync.
pub async fn collect_history(
    session: &mut Session,
    store: Option<&dyn BaselineStore>,
    only: &[String],
) -> Result<History> {
    let fuzz_time = session.config().fuzz_time;
    let mut branches = BTreeMap::new();
    for name in only {
        branches.insert(name.clone(), open_branch(name, fuzz_time, store)?);
    }

    // One rlog serves all branches, so ask from the oldest sync point.
    let since = if only.is_empty() {
        None
    } else {
        branches
            .values()
            .map(Branch::sync_since)
            .collect::<Option<Vec<i64>>>()
            .and_then(|points| points.into_iter().min())
    };
    let query_since = since.unwrap_or(0);
    tracing::info!(
        "Fetching rlog of {}{}",
        session.module(),
        since.map(|ts| format!(" since {}", ts)).unwrap_or_default()
    );

    let summary = session
        .rlog(since, |event| {
            if !only.is_empty() && !only.contains(&event.branch) {
                return Ok(());
            }
            let branch = match branches.entry(event.branch.clone()) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(e) => e.insert(open_branch(&event.branch, fuzz_time, store)?),
            };
            // Shared query window reaching before this branch's own sync point
            if let Some(synced) = branch.sync_since() {
                if synced > query_since && event.timestamp <= synced {
                    return Ok(());
                }
            }
            branch.add_event(&event)
        })
        .await?;

    for branch in branches.values_mut() {
        branch.finalize()?;
    }
    Ok(History { branches, summary })
}
