//! engine::status
//!
//! Read-only overview of every tracked stack.
//!
//! Review statuses are the only network reads, and the only place gflow
//! issues host calls concurrently. At most `concurrency` requests are in
//! flight; nothing here mutates the repository or the host.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::core::stack::{ReviewRef, Stack};
use crate::core::types::BranchName;
use crate::forge::{Forge, ReviewStatus};

/// One branch in the overview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchStatus {
    pub name: BranchName,
    pub stale: bool,
    pub review: Option<ReviewRef>,
    /// Host status, an error message, or `None` when not looked up
    pub review_status: Option<Result<ReviewStatus, String>>,
}

/// One stack in the overview, root first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackStatus {
    pub branches: Vec<BranchStatus>,
}

/// Build the overview for `stacks`, looking up review statuses when a
/// forge is available.
pub async fn collect(
    stacks: &[Stack],
    forge: Option<Arc<dyn Forge>>,
    concurrency: usize,
) -> Vec<StackStatus> {
    let mut statuses: BTreeMap<u64, Result<ReviewStatus, String>> = BTreeMap::new();

    if let Some(forge) = forge {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut set = JoinSet::new();

        let numbers: Vec<u64> = stacks
            .iter()
            .flat_map(|s| s.topological_order())
            .filter_map(|b| b.review.as_ref().map(|r| r.number))
            .collect();
        for number in numbers {
            let forge = Arc::clone(&forge);
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => forge.status(number).await.map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                (number, result)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((number, result)) => {
                    statuses.insert(number, result);
                }
                Err(e) => tracing::warn!(error = %e, "status task panicked"),
            }
        }
    }

    stacks
        .iter()
        .map(|stack| StackStatus {
            branches: stack
                .topological_order()
                .iter()
                .map(|b| BranchStatus {
                    name: b.name.clone(),
                    stale: stack.is_stale(&b.name),
                    review: b.review.clone(),
                    review_status: b
                        .review
                        .as_ref()
                        .and_then(|r| statuses.get(&r.number).cloned()),
                })
                .collect(),
        })
        .collect()
}

impl std::fmt::Display for BranchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if self.stale {
            write!(f, " (needs up)")?;
        }
        match (&self.review, &self.review_status) {
            (None, _) => write!(f, " - no review"),
            (Some(r), Some(Ok(status))) => write!(f, " - #{} {}", r.number, status),
            (Some(r), Some(Err(e))) => write!(f, " - #{} unknown ({})", r.number, e),
            (Some(r), None) => write!(f, " - #{}", r.number),
        }
    }
}
