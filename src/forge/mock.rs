//! forge::mock
//!
//! Mock forge implementation for deterministic testing.
//!
//! # Design
//!
//! Review requests live in memory. Tests set their status directly, inject
//! failures per operation (always, or a fixed number of times), and inspect
//! the recorded operations afterwards.
//!
//! # Example
//!
//! ```
//! use gflow::forge::mock::MockForge;
//! use gflow::forge::{Forge, ReviewStatus, ReviewTarget};
//!
//! # tokio_test::block_on(async {
//! let forge = MockForge::new();
//!
//! let review = forge
//!     .create_or_update(ReviewTarget::new("feature", "main", "Add feature"))
//!     .await
//!     .unwrap();
//! assert_eq!(review.number, 1);
//!
//! forge.set_status(1, ReviewStatus::Approved);
//! assert_eq!(forge.status(1).await.unwrap(), ReviewStatus::Approved);
//! # });
//! ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::traits::{Forge, ForgeError, MergeMethod, ReviewRequest, ReviewStatus, ReviewTarget};

/// Mock forge for testing.
///
/// Clones share state, so a test can keep a handle while the engine owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct MockForge {
    inner: Arc<Mutex<MockForgeInner>>,
}

#[derive(Debug, Default)]
struct MockForgeInner {
    reviews: BTreeMap<u64, MockReview>,
    last_number: u64,
    failures: Vec<Failure>,
    operations: Vec<MockOperation>,
}

#[derive(Debug)]
struct Failure {
    on: FailOn,
    /// Remaining failures; `None` fails forever.
    remaining: Option<u32>,
}

/// A stored review request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockReview {
    pub number: u64,
    pub head: String,
    pub base: String,
    pub title: String,
    pub draft: bool,
    pub status: ReviewStatus,
}

/// Which operation should fail, and with what.
#[derive(Debug, Clone)]
pub enum FailOn {
    CreateOrUpdate(ForgeError),
    Status(ForgeError),
    /// Fail merges of any review.
    Merge(ForgeError),
    /// Fail merges of one review only.
    MergeOf(u64, ForgeError),
    Close(ForgeError),
}

impl FailOn {
    fn matches(&self, op: &MockOperation) -> Option<ForgeError> {
        match (self, op) {
            (FailOn::CreateOrUpdate(e), MockOperation::CreateOrUpdate { .. })
            | (FailOn::Status(e), MockOperation::Status { .. })
            | (FailOn::Merge(e), MockOperation::Merge { .. })
            | (FailOn::Close(e), MockOperation::Close { .. }) => Some(e.clone()),
            (FailOn::MergeOf(n, e), MockOperation::Merge { number, .. }) if n == number => {
                Some(e.clone())
            }
            _ => None,
        }
    }
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    CreateOrUpdate {
        head: String,
        base: String,
        existing: Option<u64>,
    },
    Status {
        number: u64,
    },
    Merge {
        number: u64,
        method: MergeMethod,
    },
    Close {
        number: u64,
    },
}

impl MockForge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an existing review and return its number.
    pub fn with_review(&self, head: &str, base: &str, status: ReviewStatus) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        inner.last_number += 1;
        let number = inner.last_number;
        inner.reviews.insert(
            number,
            MockReview {
                number,
                head: head.to_string(),
                base: base.to_string(),
                title: head.to_string(),
                draft: false,
                status,
            },
        );
        number
    }

    /// Fail every call of an operation.
    pub fn fail_on(self, on: FailOn) -> Self {
        self.inner.lock().unwrap().failures.push(Failure {
            on,
            remaining: None,
        });
        self
    }

    /// Fail the next `times` calls of an operation, then succeed.
    pub fn fail_times(self, on: FailOn, times: u32) -> Self {
        self.inner.lock().unwrap().failures.push(Failure {
            on,
            remaining: Some(times),
        });
        self
    }

    pub fn clear_failures(&self) {
        self.inner.lock().unwrap().failures.clear();
    }

    pub fn set_status(&self, number: u64, status: ReviewStatus) {
        if let Some(review) = self.inner.lock().unwrap().reviews.get_mut(&number) {
            review.status = status;
        }
    }

    pub fn review(&self, number: u64) -> Option<MockReview> {
        self.inner.lock().unwrap().reviews.get(&number).cloned()
    }

    /// The most recent review opened for `head`.
    pub fn review_for_head(&self, head: &str) -> Option<MockReview> {
        self.inner
            .lock()
            .unwrap()
            .reviews
            .values()
            .rev()
            .find(|r| r.head == head)
            .cloned()
    }

    pub fn operations(&self) -> Vec<MockOperation> {
        self.inner.lock().unwrap().operations.clone()
    }

    pub fn clear_operations(&self) {
        self.inner.lock().unwrap().operations.clear();
    }

    /// Review numbers merge was called for, in call order.
    pub fn merge_calls(&self) -> Vec<u64> {
        self.operations()
            .into_iter()
            .filter_map(|op| match op {
                MockOperation::Merge { number, .. } => Some(number),
                _ => None,
            })
            .collect()
    }

    /// Record an operation and return the injected failure, if any.
    fn record(&self, op: MockOperation) -> Result<(), ForgeError> {
        let mut inner = self.inner.lock().unwrap();
        inner.operations.push(op.clone());

        for failure in inner.failures.iter_mut() {
            let Some(err) = failure.on.matches(&op) else {
                continue;
            };
            match failure.remaining.as_mut() {
                None => return Err(err),
                Some(0) => continue,
                Some(n) => {
                    *n -= 1;
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Forge for MockForge {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_or_update(&self, target: ReviewTarget) -> Result<ReviewRequest, ForgeError> {
        self.record(MockOperation::CreateOrUpdate {
            head: target.head.clone(),
            base: target.base.clone(),
            existing: target.existing,
        })?;

        let mut inner = self.inner.lock().unwrap();
        let existing = target.existing.or_else(|| {
            inner
                .reviews
                .values()
                .find(|r| {
                    r.head == target.head
                        && matches!(r.status, ReviewStatus::Open | ReviewStatus::Approved)
                })
                .map(|r| r.number)
        });

        let review = match existing {
            Some(number) => {
                let review = inner
                    .reviews
                    .get_mut(&number)
                    .ok_or_else(|| ForgeError::NotFound(format!("review #{number}")))?;
                review.base = target.base.clone();
                review.clone()
            }
            None => {
                inner.last_number += 1;
                let number = inner.last_number;
                let review = MockReview {
                    number,
                    head: target.head.clone(),
                    base: target.base.clone(),
                    title: target.title.clone(),
                    draft: target.draft,
                    status: ReviewStatus::Open,
                };
                inner.reviews.insert(number, review.clone());
                review
            }
        };

        Ok(ReviewRequest {
            number: review.number,
            url: format!("https://example.test/pull/{}", review.number),
            head: review.head,
            base: review.base,
        })
    }

    async fn status(&self, number: u64) -> Result<ReviewStatus, ForgeError> {
        self.record(MockOperation::Status { number })?;
        self.inner
            .lock()
            .unwrap()
            .reviews
            .get(&number)
            .map(|r| r.status)
            .ok_or_else(|| ForgeError::NotFound(format!("review #{number}")))
    }

    async fn merge(&self, number: u64, method: MergeMethod) -> Result<(), ForgeError> {
        self.record(MockOperation::Merge { number, method })?;
        let mut inner = self.inner.lock().unwrap();
        let review = inner
            .reviews
            .get_mut(&number)
            .ok_or_else(|| ForgeError::NotFound(format!("review #{number}")))?;
        match review.status {
            ReviewStatus::Merged | ReviewStatus::Closed => Err(ForgeError::MergeRejected(
                format!("review #{number} is {}", review.status),
            )),
            _ => {
                review.status = ReviewStatus::Merged;
                Ok(())
            }
        }
    }

    async fn close(&self, number: u64) -> Result<(), ForgeError> {
        self.record(MockOperation::Close { number })?;
        let mut inner = self.inner.lock().unwrap();
        let review = inner
            .reviews
            .get_mut(&number)
            .ok_or_else(|| ForgeError::NotFound(format!("review #{number}")))?;
        review.status = ReviewStatus::Closed;
        Ok(())
    }
}
