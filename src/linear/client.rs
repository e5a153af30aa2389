//! GraphQL client for the Linear API.
//!
//! Uses reqwest with Bearer token auth. All queries target
//! `https://api.linear.app/graphql` unless an endpoint override is supplied.
//! The client holds no credentials; every call takes the caller's token so one
//! instance can serve many workspaces.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::retry::{send_with_retry, RetryPolicy};
use super::NamedRef;

pub const LINEAR_API_URL: &str = "https://api.linear.app/graphql";

const ISSUE_FIELDS: &str = "id identifier title description priority url completedAt updatedAt \
     state { name type } labels { nodes { name } } team { id name } project { id name }";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LinearError {
    #[error("Linear API request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message} (HTTP {status}): {body}")]
    Api {
        status: u16,
        message: String,
        body: String,
    },
    #[error("Linear API rate limit exceeded after retry (Retry-After {retry_after_secs}s): {body}")]
    RateLimited { retry_after_secs: u64, body: String },
    #[error("Linear GraphQL errors: {0}")]
    GraphQl(String),
    #[error("Failed to parse Linear response: {0}")]
    Json(#[from] serde_json::Error),
}

impl LinearError {
    /// HTTP status associated with the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            LinearError::Http(e) => e.status().map(|s| s.as_u16()),
            LinearError::Api { status, .. } => Some(*status),
            LinearError::RateLimited { .. } => Some(429),
            LinearError::GraphQl(_) | LinearError::Json(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearOrganization {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub url_key: Option<String>,
}

/// The authenticated user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearViewer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub organization: Option<LinearOrganization>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearTeam {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearProject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueStateRef {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub state_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelNode {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelConnection {
    #[serde(default)]
    pub nodes: Vec<LabelNode>,
}

/// Issue node as returned by GraphQL, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearIssue {
    pub id: String,
    pub identifier: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub state: Option<IssueStateRef>,
    #[serde(default)]
    pub labels: Option<LabelConnection>,
    #[serde(default)]
    pub team: Option<NamedRef>,
    #[serde(default)]
    pub project: Option<NamedRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueConnection {
    #[serde(default)]
    pub nodes: Vec<LinearIssue>,
    #[serde(default)]
    pub page_info: PageInfo,
}

#[derive(Deserialize)]
struct Nodes<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<T>,
}

/// Server-side filters for `get_issues`. Linear only takes one team per call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueQueryOptions {
    pub team_id: Option<String>,
    pub assignee_id: Option<String>,
    pub state_type: Option<String>,
    pub updated_since: Option<String>,
    pub first: u32,
    pub after: Option<String>,
}

/// Result of `test_connection`. Never an error: failures land in `error`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<LinearViewer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<LinearOrganization>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Deserialize)]
struct GraphQlEnvelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphQlErrorEntry>>,
}

#[derive(Deserialize)]
struct GraphQlErrorEntry {
    #[serde(default)]
    message: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct LinearClient {
    client: reqwest::Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl Default for LinearClient {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: LINEAR_API_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST a GraphQL document and return its `data` object.
    ///
    /// 429 is retried once after `Retry-After` (capped at 10s). Other non-2xx
    /// statuses and GraphQL `errors` arrays become typed errors.
    pub async fn request(
        &self,
        query: &str,
        variables: Value,
        token: &str,
    ) -> Result<Value, LinearError> {
        let body = json!({ "query": query, "variables": variables });
        let request = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", token))
            .header("Content-Type", "application/json")
            .json(&body);

        let resp = send_with_retry(request, &self.retry).await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(LinearError::Api {
                status: status.as_u16(),
                message: format!("Linear API error {}", status),
                body: text,
            });
        }

        let text = resp.text().await?;
        let envelope: GraphQlEnvelope = serde_json::from_str(&text)?;

        if let Some(errors) = envelope.errors.filter(|e| !e.is_empty()) {
            let joined = errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(LinearError::GraphQl(joined));
        }

        Ok(envelope.data.unwrap_or(Value::Null))
    }

    /// The authenticated user, with their organization.
    pub async fn get_viewer(&self, token: &str) -> Result<Option<LinearViewer>, LinearError> {
        let data = self
            .request(
                "query Viewer { viewer { id name email organization { id name urlKey } } }",
                json!({}),
                token,
            )
            .await?;
        take_key(data, "viewer")
    }

    pub async fn get_organization(
        &self,
        token: &str,
    ) -> Result<Option<LinearOrganization>, LinearError> {
        let data = self
            .request(
                "query Organization { organization { id name urlKey } }",
                json!({}),
                token,
            )
            .await?;
        take_key(data, "organization")
    }

    pub async fn get_teams(&self, token: &str) -> Result<Option<Vec<LinearTeam>>, LinearError> {
        let data = self
            .request(
                "query Teams($first: Int!) { teams(first: $first) { nodes { id name key } } }",
                json!({ "first": 100 }),
                token,
            )
            .await?;
        Ok(take_key::<Nodes<LinearTeam>>(data, "teams")?.map(|n| n.nodes))
    }

    pub async fn get_projects(
        &self,
        token: &str,
        first: u32,
    ) -> Result<Option<Vec<LinearProject>>, LinearError> {
        let data = self
            .request(
                "query Projects($first: Int!) { projects(first: $first) { nodes { id name state url } } }",
                json!({ "first": first }),
                token,
            )
            .await?;
        Ok(take_key::<Nodes<LinearProject>>(data, "projects")?.map(|n| n.nodes))
    }

    /// One page of issues. Ordering is left to Linear's default.
    pub async fn get_issues(
        &self,
        token: &str,
        options: &IssueQueryOptions,
    ) -> Result<Option<IssueConnection>, LinearError> {
        let (query, variables) = build_issues_query(options);
        let data = self.request(&query, variables, token).await?;
        take_key(data, "issues")
    }

    pub async fn get_issue(&self, token: &str, id: &str) -> Result<Option<LinearIssue>, LinearError> {
        let query = format!(
            "query Issue($id: String!) {{ issue(id: $id) {{ {} }} }}",
            ISSUE_FIELDS
        );
        let data = self.request(&query, json!({ "id": id }), token).await?;
        take_key(data, "issue")
    }

    /// Full-text issue search.
    pub async fn search_issues(
        &self,
        token: &str,
        term: &str,
        first: u32,
    ) -> Result<Option<IssueConnection>, LinearError> {
        let query = format!(
            "query SearchIssues($term: String!, $first: Int!) {{ \
             searchIssues(term: $term, first: $first) {{ \
             nodes {{ {} }} pageInfo {{ hasNextPage endCursor }} }} }}",
            ISSUE_FIELDS
        );
        let data = self
            .request(&query, json!({ "term": term, "first": first }), token)
            .await?;
        take_key(data, "searchIssues")
    }

    /// Check a token by fetching the viewer. Success iff a viewer came back.
    pub async fn test_connection(&self, token: &str) -> ConnectionStatus {
        match self.get_viewer(token).await {
            Ok(Some(mut viewer)) => {
                let organization = viewer.organization.take();
                ConnectionStatus {
                    success: true,
                    user: Some(viewer),
                    organization,
                    error: None,
                }
            }
            Ok(None) => ConnectionStatus {
                success: false,
                error: Some("Linear returned no viewer for this token".to_string()),
                ..Default::default()
            },
            Err(e) => {
                log::warn!("Linear connection test failed: {}", e);
                ConnectionStatus {
                    success: false,
                    error: Some(e.to_string()),
                    ..Default::default()
                }
            }
        }
    }
}

/// Pull one top-level key out of a GraphQL `data` object. Absent or null
/// keys yield `None`.
fn take_key<T: DeserializeOwned>(mut data: Value, key: &str) -> Result<Option<T>, LinearError> {
    match data.get_mut(key).map(Value::take) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => Ok(Some(serde_json::from_value(v)?)),
    }
}

/// Build the `issues` query. The `filter` argument is only emitted when at
/// least one condition is present.
pub(crate) fn build_issues_query(options: &IssueQueryOptions) -> (String, Value) {
    let mut params = vec!["$first: Int!", "$after: String"];
    let mut conditions: Vec<&str> = Vec::new();
    let mut variables = json!({
        "first": options.first,
        "after": options.after,
    });

    if let Some(ref team_id) = options.team_id {
        params.push("$teamId: ID");
        conditions.push("team: { id: { eq: $teamId } }");
        variables["teamId"] = json!(team_id);
    }
    if let Some(ref assignee_id) = options.assignee_id {
        params.push("$assigneeId: ID");
        conditions.push("assignee: { id: { eq: $assigneeId } }");
        variables["assigneeId"] = json!(assignee_id);
    }
    if let Some(ref state_type) = options.state_type {
        params.push("$stateType: String");
        conditions.push("state: { type: { eq: $stateType } }");
        variables["stateType"] = json!(state_type);
    }
    if let Some(ref updated_since) = options.updated_since {
        params.push("$updatedSince: DateTimeOrDuration");
        conditions.push("updatedAt: { gte: $updatedSince }");
        variables["updatedSince"] = json!(updated_since);
    }

    let filter = if conditions.is_empty() {
        String::new()
    } else {
        format!("filter: {{ {} }}, ", conditions.join(", "))
    };

    let query = format!(
        "query Issues({params}) {{ issues({filter}first: $first, after: $after) {{ \
         nodes {{ {fields} }} pageInfo {{ hasNextPage endCursor }} }} }}",
        params = params.join(", "),
        filter = filter,
        fields = ISSUE_FIELDS,
    );

    (query, variables)
}
