//! Linear issue aggregation for release notes.
//!
//! Pulls completed issues from Linear's GraphQL API, filters them down to the
//! requested release window, buckets them into release-note sections, and
//! turns the result into the system/user prompt pair for text generation.

pub mod client;
pub mod prompt;
pub mod release;
pub mod retry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use client::{IssueConnection, IssueQueryOptions, LinearClient, LinearError, LinearIssue};

pub use prompt::{AiContext, BuildPromptArgs, Organization, OrganizationSettings, ReleasePrompt};
pub use release::LinearReleaseService;

/// Reference to a team or project on an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: String,
    pub name: String,
}

/// Normalized projection of a Linear issue used throughout aggregation and
/// prompt building.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearIssueLite {
    pub id: String,
    /// Human-readable key, e.g. `ENG-123`.
    pub identifier: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// 0-5 scale; `None` means untriaged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<NamedRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<NamedRef>,
}

impl From<LinearIssue> for LinearIssueLite {
    fn from(issue: LinearIssue) -> Self {
        let (state, state_type) = match issue.state {
            Some(s) => (s.name, s.state_type),
            None => (None, None),
        };
        Self {
            id: issue.id,
            identifier: issue.identifier,
            title: issue.title,
            description: issue.description,
            priority: issue.priority,
            labels: issue
                .labels
                .map(|l| l.nodes.into_iter().map(|n| n.name).collect())
                .unwrap_or_default(),
            url: issue.url,
            completed_at: issue.completed_at,
            state,
            state_type,
            team: issue.team,
            project: issue.project,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueFilters {
    #[serde(default)]
    pub state_types: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_priority: Option<i32>,
}

/// What to aggregate. Only the first team is sent to Linear; the full list is
/// applied client-side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationInput {
    pub teams: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_filters: Option<IssueFilters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationResult {
    pub issues: Vec<LinearIssueLite>,
    /// Always `issues.len()`.
    pub total_issues: usize,
}

impl AggregationResult {
    pub fn new(issues: Vec<LinearIssueLite>) -> Self {
        let total_issues = issues.len();
        Self {
            issues,
            total_issues,
        }
    }
}

/// Release-note buckets. Every aggregated issue lands in exactly one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sections {
    pub features: Vec<LinearIssueLite>,
    pub improvements: Vec<LinearIssueLite>,
    pub bugfixes: Vec<LinearIssueLite>,
    pub breaking: Vec<LinearIssueLite>,
}

impl Sections {
    pub fn total(&self) -> usize {
        self.features.len() + self.improvements.len() + self.bugfixes.len() + self.breaking.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Source of paginated issue data. `LinearClient` is the production
/// implementation; tests substitute in-memory fakes.
#[async_trait]
pub trait IssueSource: Send + Sync {
    async fn fetch_issues(
        &self,
        token: &str,
        options: &IssueQueryOptions,
    ) -> Result<Option<IssueConnection>, LinearError>;
}

#[async_trait]
impl IssueSource for LinearClient {
    async fn fetch_issues(
        &self,
        token: &str,
        options: &IssueQueryOptions,
    ) -> Result<Option<IssueConnection>, LinearError> {
        self.get_issues(token, options).await
    }
}

#[async_trait]
impl<T: IssueSource + ?Sized> IssueSource for std::sync::Arc<T> {
    async fn fetch_issues(
        &self,
        token: &str,
        options: &IssueQueryOptions,
    ) -> Result<Option<IssueConnection>, LinearError> {
        (**self).fetch_issues(token, options).await
    }
}
