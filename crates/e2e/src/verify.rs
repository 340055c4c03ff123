//! Eventual-consistency checks
//!
//! After a filter, search or sort the dashboard re-renders asynchronously. The
//! verifier keeps re-reading until the predicate holds or the wait budget is
//! spent. Transient read failures and momentarily empty tables count as "not
//! yet", never as a verdict.

use std::future::Future;

use ezyscribe_common::{ActionResult, VerificationOutcome, WaitSpec};

use crate::wait::{Observation, WaitPolicy};

/// Polls a read until its value satisfies a predicate
#[derive(Debug, Clone, Copy, Default)]
pub struct EventualConsistencyVerifier {
    policy: WaitPolicy,
}

impl EventualConsistencyVerifier {
    pub fn new(spec: WaitSpec) -> Self {
        Self {
            policy: WaitPolicy::new(spec),
        }
    }

    pub fn policy(&self) -> WaitPolicy {
        self.policy
    }

    pub async fn verify<T, R, Fut, P>(
        &self,
        description: &str,
        mut read: R,
        predicate: P,
    ) -> ActionResult<VerificationOutcome<T>>
    where
        R: FnMut() -> Fut,
        Fut: Future<Output = ActionResult<T>>,
        P: Fn(&T) -> bool,
    {
        let predicate = &predicate;
        self.policy
            .wait_until(description, || {
                let observed = read();
                async move {
                    observed.await.map(|value| {
                        if predicate(&value) {
                            Observation::Ready(value)
                        } else {
                            Observation::Pending(Some(value))
                        }
                    })
                }
            })
            .await
    }
}

/// Predicates over values read from the dashboard
pub mod predicates {
    /// At least one item
    pub fn non_empty<T>(items: &[T]) -> bool {
        !items.is_empty()
    }

    /// Nothing matched, e.g. a hidden column header
    pub fn absent<T>(items: &[T]) -> bool {
        items.is_empty()
    }

    /// At least `min` items in non-decreasing order
    pub fn sorted_ascending<T: Ord>(items: &[T], min: usize) -> bool {
        items.len() >= min && items.windows(2).all(|w| w[0] <= w[1])
    }

    /// Non-empty and every cell equals `expected`, ignoring case and padding
    pub fn all_equal(items: &[String], expected: &str) -> bool {
        !items.is_empty()
            && items
                .iter()
                .all(|item| item.trim().eq_ignore_ascii_case(expected.trim()))
    }

    /// First item equals `expected`, ignoring padding
    pub fn first_equals(items: &[String], expected: &str) -> bool {
        items
            .first()
            .map(|first| first.trim() == expected.trim())
            .unwrap_or(false)
    }

    /// `haystack` contains `needle`, ignoring case
    pub fn contains_text(haystack: &str, needle: &str) -> bool {
        haystack.to_lowercase().contains(&needle.to_lowercase())
    }

    /// `haystack` contains any of `needles`
    pub fn contains_any(haystack: &str, needles: &[&str]) -> bool {
        needles.iter().any(|needle| haystack.contains(needle))
    }
}
