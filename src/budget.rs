//! Budget collaborator (§6): a process-external guard consulted before any
//! attempt is made, so an over-budget operation never even reaches the
//! upstream API.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Raised when a budget check refuses a call.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("budget check failed for {label}: {reason}")]
pub struct BudgetError {
    pub label: String,
    pub reason: String,
}

/// Consulted before every attempt, not just the first (§4.3 step 2): a
/// ceiling crossed by a concurrent caller mid-retry must stop the next
/// attempt, not merely the call's initial one.
#[async_trait]
pub trait BudgetTracker: Send + Sync {
    async fn check_budget(&self, label: &str) -> Result<(), BudgetError>;
}

/// A tracker with no limits: every check succeeds. Useful as a default when
/// the surrounding system has no budget policy configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnlimitedBudget;

#[async_trait]
impl BudgetTracker for UnlimitedBudget {
    async fn check_budget(&self, _label: &str) -> Result<(), BudgetError> {
        Ok(())
    }
}

/// An in-memory per-label call counter, for tests and simple deployments.
/// Refuses once a label's call count reaches its configured ceiling.
#[derive(Debug, Default)]
pub struct InMemoryBudget {
    ceilings: HashMap<String, usize>,
    counts: Mutex<HashMap<String, usize>>,
}

impl InMemoryBudget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ceiling(mut self, label: impl Into<String>, ceiling: usize) -> Self {
        self.ceilings.insert(label.into(), ceiling);
        self
    }

    pub fn calls_for(&self, label: &str) -> usize {
        self.counts.lock().unwrap_or_else(|p| p.into_inner()).get(label).copied().unwrap_or(0)
    }
}

#[async_trait]
impl BudgetTracker for InMemoryBudget {
    async fn check_budget(&self, label: &str) -> Result<(), BudgetError> {
        let Some(&ceiling) = self.ceilings.get(label) else {
            return Ok(());
        };
        let mut counts = self.counts.lock().unwrap_or_else(|p| p.into_inner());
        let count = counts.entry(label.to_string()).or_insert(0);
        if *count >= ceiling {
            return Err(BudgetError {
                label: label.to_string(),
                reason: format!("call count {count} reached ceiling {ceiling}"),
            });
        }
        *count += 1;
        Ok(())
    }
}
