//! # Compensating Rollback Ledger
//!
//! Multi-step writes across the keystore, the translation store and the
//! metadata service have no shared transaction. Each forward step that must be
//! undone on a later failure registers a [`RollbackOperation`] with the
//! request's [`RollbackLedger`]; the caller either marks the ledger complete on
//! success or runs [`RollbackLedger::clean`] on failure.
//!
//! Compensations run in reverse registration order. The first failing
//! compensation halts the rollback and its error is returned; anything left is
//! never attempted.

use crate::errors::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use tracing::{debug, warn};

/// A compensating action that undoes one forward step.
///
/// Implementations capture whatever the forward step needs to be reversed
/// (identifiers, tenant scope, a client handle).
#[async_trait]
pub trait RollbackOperation: Send + Sync {
    /// Short human-readable label used in logs
    fn description(&self) -> &str;

    /// Undo the forward step
    async fn rollback(&self) -> Result<()>;
}

/// A [`RollbackOperation`] backed by an async closure.
pub struct Compensation<F> {
    description: String,
    action: F,
}

impl<F, Fut> Compensation<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    pub fn new(description: impl Into<String>, action: F) -> Self {
        Self { description: description.into(), action }
    }
}

#[async_trait]
impl<F, Fut> RollbackOperation for Compensation<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    fn description(&self) -> &str {
        &self.description
    }

    async fn rollback(&self) -> Result<()> {
        (self.action)().await
    }
}

/// Ordered list of compensations for one request.
#[derive(Default)]
pub struct RollbackLedger {
    // Front is the most recent registration, i.e. the next to run
    operations: VecDeque<Box<dyn RollbackOperation>>,
    completed: bool,
}

impl RollbackLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compensation; it will run before every earlier registration.
    pub fn add<O>(&mut self, operation: O)
    where
        O: RollbackOperation + 'static,
    {
        debug!(operation = operation.description(), "Registered compensation");
        self.operations.push_front(Box::new(operation));
    }

    /// Register a closure compensation.
    pub fn add_fn<F, Fut>(&mut self, description: impl Into<String>, action: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.add(Compensation::new(description, action));
    }

    /// Mark the request successful and drop every pending compensation.
    pub fn complete(&mut self) {
        self.completed = true;
        self.operations.clear();
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Number of compensations still pending
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Run pending compensations, most recent first.
    ///
    /// Returns the first compensation error; compensations after it are not
    /// attempted and remain pending.
    ///
    /// # Panics
    ///
    /// Panics when called on a completed ledger. Rolling back a request that
    /// already reported success is a programming error.
    pub async fn clean(&mut self) -> Result<()> {
        if self.completed {
            panic!("rollback requested on a completed ledger");
        }

        while let Some(operation) = self.operations.pop_front() {
            debug!(operation = operation.description(), "Running compensation");
            if let Err(e) = operation.rollback().await {
                warn!(
                    operation = operation.description(),
                    remaining = self.operations.len(),
                    error = %e,
                    "Compensation failed; rollback halted"
                );
                return Err(e);
            }
        }

        Ok(())
    }
}

impl fmt::Debug for RollbackLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending: Vec<&str> = self.operations.iter().map(|op| op.description()).collect();
        f.debug_struct("RollbackLedger")
            .field("pending", &pending)
            .field("completed", &self.completed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::KeywardError;
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};

    type Ready = futures::future::Ready<Result<()>>;

    fn recording(
        log: &Arc<Mutex<Vec<String>>>,
        label: &str,
    ) -> Compensation<impl Fn() -> Ready + Send + Sync> {
        let log = log.clone();
        let label = label.to_string();
        Compensation::new(label.clone(), move || {
            log.lock().unwrap().push(label.clone());
            futures::future::ready(Ok(()))
        })
    }

    #[tokio::test]
    async fn test_clean_runs_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ledger = RollbackLedger::new();
        ledger.add(recording(&log, "A"));
        ledger.add(recording(&log, "B"));
        ledger.add(recording(&log, "C"));

        ledger.clean().await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["C", "B", "A"]);
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_clean_halts_on_first_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ledger = RollbackLedger::new();
        ledger.add(recording(&log, "A"));
        ledger.add_fn("B", || async { Err(KeywardError::transport("backend unreachable")) });
        ledger.add(recording(&log, "C"));

        let err = ledger.clean().await.unwrap_err();

        assert!(err.to_string().contains("backend unreachable"));
        assert_eq!(*log.lock().unwrap(), vec!["C"]);
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_complete_discards_operations() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ledger = RollbackLedger::new();
        ledger.add(recording(&log, "A"));
        ledger.complete();

        assert!(ledger.is_completed());
        assert!(ledger.is_empty());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    #[should_panic(expected = "completed ledger")]
    async fn test_clean_after_complete_panics() {
        let mut ledger = RollbackLedger::new();
        ledger.complete();
        let _ = ledger.clean().await;
    }

    #[tokio::test]
    async fn test_empty_ledger_cleans_ok() {
        let mut ledger = RollbackLedger::new();
        assert!(ledger.clean().await.is_ok());
    }

    proptest! {
        #[test]
        fn prop_clean_is_reverse_of_registration(labels in prop::collection::vec("[a-z]{1,8}", 0..20)) {
            let log = Arc::new(Mutex::new(Vec::new()));
            let mut ledger = RollbackLedger::new();
            for label in &labels {
                ledger.add(recording(&log, label));
            }

            tokio_test::block_on(ledger.clean()).unwrap();

            let mut expected = labels.clone();
            expected.reverse();
            prop_assert_eq!(log.lock().unwrap().clone(), expected);
        }
    }
}
