//! Storage collaborator (§6): the issue descriptor the supervisor fetches
//! before a call, and the usage-accounting comment it writes afterward.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueType {
    Bug,
    Task,
    Enhancement,
    Chore,
}

/// The fields of the surrounding issue tracker's issue record that this
/// crate actually consumes (§3 "Issue descriptor"). Out-of-scope fields
/// (assignees, labels, comments history, ...) are the surrounding system's
/// concern, not this crate's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub id: String,
    pub title: String,
    pub description: String,
    pub priority: u8,
    pub issue_type: IssueType,
    pub acceptance_criteria: String,
}

impl Issue {
    /// `priority` must be in `0..=3`; out-of-range values are a caller bug,
    /// not a runtime error path the supervisor needs to classify.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        priority: u8,
        issue_type: IssueType,
        acceptance_criteria: impl Into<String>,
    ) -> Self {
        assert!(priority <= 3, "priority must be 0..=3, got {priority}");
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            priority,
            issue_type,
            acceptance_criteria: acceptance_criteria.into(),
        }
    }
}

/// One completed call's cost, recorded as a best-effort comment (§4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub issue_id: String,
    pub activity_label: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub duration: Duration,
    pub model: String,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("storage error for issue {issue_id}: {message}")]
pub struct StorageError {
    pub issue_id: String,
    pub message: String,
}

/// The subset of the issue tracker's API the supervisor needs (§6).
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn get_issue(&self, id: &str) -> Option<Issue>;
    async fn add_comment(&self, id: &str, author: &str, text: &str) -> Result<(), StorageError>;
}

/// An in-memory fake for tests: a fixed set of issues and a log of every
/// comment added, so tests can assert on usage-logging behavior without a
/// real tracker.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    issues: HashMap<String, Issue>,
    comments: Mutex<Vec<(String, String, String)>>,
    fail_comments: bool,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_issue(mut self, issue: Issue) -> Self {
        self.issues.insert(issue.id.clone(), issue);
        self
    }

    /// Make every `add_comment` call fail, to exercise best-effort logging.
    pub fn failing_comments(mut self) -> Self {
        self.fail_comments = true;
        self
    }

    pub fn comments(&self) -> Vec<(String, String, String)> {
        self.comments.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl StorageClient for InMemoryStorage {
    async fn get_issue(&self, id: &str) -> Option<Issue> {
        self.issues.get(id).cloned()
    }

    async fn add_comment(&self, id: &str, author: &str, text: &str) -> Result<(), StorageError> {
        if self.fail_comments {
            return Err(StorageError { issue_id: id.to_string(), message: "simulated failure".into() });
        }
        self.comments
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((id.to_string(), author.to_string(), text.to_string()));
        Ok(())
    }
}
