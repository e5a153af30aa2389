//! Aggregation and categorization of completed Linear work.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use super::client::{IssueQueryOptions, LinearError};
use super::{AggregationInput, AggregationResult, IssueSource, LinearIssueLite, Sections};
use crate::validation::{
    parse_date, parse_date_end_of_day, ValidationCode, ValidationError, ValidationResult,
};

/// Hard stop for pagination against a misbehaving API.
pub const MAX_PAGES: usize = 5;
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Release notes only ever summarize finished work.
const COMPLETED_STATE_TYPE: &str = "completed";

fn re_breaking_label() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)breaking|deprecation").unwrap())
}

fn re_breaking_title() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)breaking").unwrap())
}

fn re_bug_label() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)bug|fix").unwrap())
}

fn re_bug_title() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)fix|bug").unwrap())
}

fn re_feature_label() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)feature|enhancement|feat").unwrap())
}

fn re_feature_title() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)feat|feature").unwrap())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Breaking,
    Bugfix,
    Feature,
    Improvement,
}

/// Classify one issue. First match wins: breaking, bug, feature, then the
/// improvement catch-all.
pub fn classify(issue: &LinearIssueLite) -> Category {
    let labels: Vec<String> = issue.labels.iter().map(|l| l.to_lowercase()).collect();
    let title = issue.title.to_lowercase();
    let any_label = |re: &Regex| labels.iter().any(|l| re.is_match(l));

    if any_label(re_breaking_label()) || re_breaking_title().is_match(&title) {
        Category::Breaking
    } else if any_label(re_bug_label()) || re_bug_title().is_match(&title) {
        Category::Bugfix
    } else if any_label(re_feature_label()) || re_feature_title().is_match(&title) {
        Category::Feature
    } else {
        Category::Improvement
    }
}

/// Orchestrates an `IssueSource` into a filtered, categorized release.
pub struct LinearReleaseService<S> {
    source: S,
}

impl<S: IssueSource> LinearReleaseService<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch every completed issue matching `input`.
    ///
    /// Linear filters by the first team, `updatedSince` and the completed
    /// state; everything else is applied here. A filter stage that empties the
    /// set is logged, not raised.
    pub async fn aggregate(
        &self,
        token: &str,
        input: &AggregationInput,
    ) -> Result<AggregationResult, LinearError> {
        if input.teams.is_empty() {
            log::warn!("aggregate: no teams supplied, fetching completed issues across all teams");
        }

        let mut options = IssueQueryOptions {
            team_id: input.teams.first().cloned(),
            assignee_id: None,
            state_type: Some(COMPLETED_STATE_TYPE.to_string()),
            updated_since: input.date_range.as_ref().and_then(|r| r.from.clone()),
            first: input.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            after: None,
        };

        let mut issues: Vec<LinearIssueLite> = Vec::new();
        let mut pages = 0;
        loop {
            let Some(page) = self.source.fetch_issues(token, &options).await? else {
                log::warn!("aggregate: Linear response had no issues connection");
                break;
            };
            pages += 1;
            log::info!(
                "aggregate: page {} returned {} issues",
                pages,
                page.nodes.len()
            );
            issues.extend(page.nodes.into_iter().map(LinearIssueLite::from));

            if !page.page_info.has_next_page {
                break;
            }
            if pages >= MAX_PAGES {
                log::warn!(
                    "aggregate: stopping after {} pages with more results pending",
                    MAX_PAGES
                );
                break;
            }
            match page.page_info.end_cursor {
                Some(cursor) if options.after.as_deref() != Some(cursor.as_str()) => {
                    options.after = Some(cursor);
                }
                _ => {
                    log::warn!(
                        "aggregate: page {} reported more results without a new cursor, stopping",
                        pages
                    );
                    break;
                }
            }
        }

        let issues = apply_client_filters(issues, input);
        log::info!(
            "aggregate: {} issues after filtering ({} pages)",
            issues.len(),
            pages
        );
        Ok(AggregationResult::new(issues))
    }

    /// Bucket issues into release-note sections, preserving input order.
    pub fn categorize(&self, issues: &[LinearIssueLite]) -> Sections {
        categorize(issues)
    }
}

pub fn categorize(issues: &[LinearIssueLite]) -> Sections {
    let mut sections = Sections::default();
    for issue in issues {
        let bucket = match classify(issue) {
            Category::Breaking => &mut sections.breaking,
            Category::Bugfix => &mut sections.bugfixes,
            Category::Feature => &mut sections.features,
            Category::Improvement => &mut sections.improvements,
        };
        bucket.push(issue.clone());
    }
    sections
}

fn apply_client_filters(
    mut issues: Vec<LinearIssueLite>,
    input: &AggregationInput,
) -> Vec<LinearIssueLite> {
    // Server only filtered by the first team.
    if input.teams.len() > 1 {
        issues = filter_stage(issues, "teams", |i| {
            i.team
                .as_ref()
                .is_some_and(|t| input.teams.iter().any(|id| *id == t.id))
        });
    }

    if let Some(projects) = input.projects.as_ref().filter(|p| !p.is_empty()) {
        issues = filter_stage(issues, "projects", |i| {
            i.project
                .as_ref()
                .is_some_and(|p| projects.iter().any(|id| *id == p.id))
        });
    }

    if let Some(filters) = input.issue_filters.as_ref() {
        if !filters.state_types.is_empty() {
            issues = filter_stage(issues, "stateTypes", |i| {
                i.state_type
                    .as_ref()
                    .is_some_and(|s| filters.state_types.contains(s))
            });
        }
        if !filters.labels.is_empty() {
            issues = filter_stage(issues, "labels", |i| {
                i.labels.iter().any(|l| filters.labels.contains(l))
            });
        }
        if let Some(min) = filters.min_priority {
            issues = filter_stage(issues, "minPriority", |i| i.priority.unwrap_or(0) >= min);
        }
    }

    if let Some(raw) = input
        .date_range
        .as_ref()
        .and_then(|r| r.to.as_deref())
        .filter(|s| !s.trim().is_empty())
    {
        match parse_date_end_of_day(raw) {
            Some(to) => {
                issues = filter_stage(issues, "dateRange.to", |i| completed_on_or_before(i, &to));
            }
            None => log::warn!(
                "aggregate: ignoring unparseable dateRange.to '{}'",
                raw
            ),
        }
    }

    issues
}

/// Issues without a parseable `completedAt` are kept; they cannot be shown to
/// fall outside the window.
fn completed_on_or_before(issue: &LinearIssueLite, to: &DateTime<Utc>) -> bool {
    match issue.completed_at.as_deref().and_then(parse_date) {
        Some(completed) => completed <= *to,
        None => true,
    }
}

fn filter_stage(
    issues: Vec<LinearIssueLite>,
    stage: &str,
    keep: impl Fn(&LinearIssueLite) -> bool,
) -> Vec<LinearIssueLite> {
    let before = issues.len();
    let kept: Vec<LinearIssueLite> = issues.into_iter().filter(|i| keep(i)).collect();
    if before > 0 && kept.is_empty() {
        log::warn!(
            "aggregate: {} filter removed all {} issues",
            stage,
            before
        );
    }
    kept
}

/// Gate for `aggregate` input.
pub fn validate_linear_aggregation_input(input: &AggregationInput) -> ValidationResult {
    let mut errors = Vec::new();

    if input.teams.is_empty() {
        errors.push(ValidationError::new(
            "teams",
            "At least one team must be selected",
            ValidationCode::Required,
        ));
    }

    if let Some(range) = input.date_range.as_ref() {
        let from = range_bound(&mut errors, "dateRange.from", range.from.as_deref());
        let to = range_bound(&mut errors, "dateRange.to", range.to.as_deref());
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                errors.push(ValidationError::new(
                    "dateRange",
                    "Start date must be before end date",
                    ValidationCode::InvalidDateRange,
                ));
            }
        }
    }

    if let Some(min) = input.issue_filters.as_ref().and_then(|f| f.min_priority) {
        if !(0..=5).contains(&min) {
            errors.push(ValidationError::new(
                "issueFilters.minPriority",
                "Minimum priority must be between 0 and 5",
                ValidationCode::OutOfRange,
            ));
        }
    }

    ValidationResult::new(errors, Vec::new())
}

/// Parse an optional range bound, recording an error when it is present but
/// not a date.
fn range_bound(
    errors: &mut Vec<ValidationError>,
    field: &str,
    raw: Option<&str>,
) -> Option<DateTime<Utc>> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    let parsed = parse_date(raw);
    if parsed.is_none() {
        errors.push(ValidationError::new(
            field,
            format!("'{}' is not a valid date", raw),
            ValidationCode::InvalidDate,
        ));
    }
    parsed
}

impl<S> LinearReleaseService<S> {
    pub fn validate_linear_aggregation_input(&self, input: &AggregationInput) -> ValidationResult {
        validate_linear_aggregation_input(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear::client::{IssueConnection, LabelConnection, LabelNode, LinearIssue, PageInfo};
    use crate::linear::{DateRange, IssueFilters, NamedRef};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn issue(identifier: &str, title: &str, labels: &[&str]) -> LinearIssueLite {
        LinearIssueLite {
            id: identifier.to_lowercase(),
            identifier: identifier.to_string(),
            title: title.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            ..Default::default()
        }
    }

    fn node(identifier: &str, team: &str) -> LinearIssue {
        LinearIssue {
            id: identifier.to_lowercase(),
            identifier: identifier.to_string(),
            title: format!("Issue {}", identifier),
            description: None,
            priority: None,
            url: None,
            completed_at: None,
            updated_at: None,
            state: None,
            labels: Some(LabelConnection { nodes: vec![] }),
            team: Some(NamedRef {
                id: team.to_string(),
                name: team.to_uppercase(),
            }),
            project: None,
        }
    }

    /// Serves pre-baked pages in order; repeats the last one forever.
    struct FakeSource {
        pages: Vec<IssueConnection>,
        calls: AtomicUsize,
        seen: Mutex<Vec<IssueQueryOptions>>,
    }

    impl FakeSource {
        fn new(pages: Vec<IssueConnection>) -> Self {
            Self {
                pages,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl IssueSource for FakeSource {
        async fn fetch_issues(
            &self,
            _token: &str,
            options: &IssueQueryOptions,
        ) -> Result<Option<IssueConnection>, LinearError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(options.clone());
            let idx = n.min(self.pages.len() - 1);
            Ok(Some(self.pages[idx].clone()))
        }
    }

    fn page(nodes: Vec<LinearIssue>, next: Option<&str>) -> IssueConnection {
        IssueConnection {
            nodes,
            page_info: PageInfo {
                has_next_page: next.is_some(),
                end_cursor: next.map(str::to_string),
            },
        }
    }

    #[test]
    fn test_categorize_worked_example() {
        let issues = vec![
            issue("ENG-1", "Breaking: Update API auth", &["security"]),
            issue("ENG-2", "Crash on save", &["bug"]),
            issue("ENG-3", "Dark mode", &["feature"]),
            issue("ENG-4", "Faster search", &["enhancement"]),
        ];
        let sections = categorize(&issues);
        assert_eq!(sections.features.len(), 2);
        assert_eq!(sections.bugfixes.len(), 1);
        assert_eq!(sections.breaking.len(), 1);
        assert_eq!(sections.improvements.len(), 0);
        assert_eq!(sections.breaking[0].identifier, "ENG-1");
    }

    #[test]
    fn test_categorize_breaking_beats_bug() {
        let sections = categorize(&[issue("ENG-9", "Remove v1 endpoints", &["breaking", "bug"])]);
        assert_eq!(sections.breaking.len(), 1);
        assert!(sections.bugfixes.is_empty());
    }

    #[test]
    fn test_categorize_partitions_every_issue_once() {
        let issues = vec![
            issue("A-1", "Fix login redirect", &[]),
            issue("A-2", "feat: export to CSV", &[]),
            issue("A-3", "Tidy settings page", &["ui"]),
            issue("A-4", "Drop legacy importer", &["Deprecation"]),
            issue("A-5", "Polish onboarding", &["Enhancement", "Bug"]),
            issue("A-6", "Cache avatars", &[]),
        ];
        let sections = categorize(&issues);
        assert_eq!(sections.total(), issues.len());

        let mut ids: Vec<&str> = sections
            .features
            .iter()
            .chain(&sections.improvements)
            .chain(&sections.bugfixes)
            .chain(&sections.breaking)
            .map(|i| i.identifier.as_str())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["A-1", "A-2", "A-3", "A-4", "A-5", "A-6"]);
        assert_eq!(classify(&issues[0]), Category::Bugfix);
        assert_eq!(classify(&issues[1]), Category::Feature);
        assert_eq!(classify(&issues[2]), Category::Improvement);
        assert_eq!(classify(&issues[3]), Category::Breaking);
        assert_eq!(classify(&issues[4]), Category::Bugfix);
    }

    #[tokio::test]
    async fn test_aggregate_stops_at_page_cap() {
        let pages = (0..=MAX_PAGES)
            .map(|n| {
                let cursor = format!("c{}", n);
                page(vec![node(&format!("ENG-{}", n), "t1")], Some(cursor.as_str()))
            })
            .collect();
        let service = LinearReleaseService::new(FakeSource::new(pages));
        let input = AggregationInput {
            teams: vec!["t1".to_string()],
            ..Default::default()
        };

        let result = service.aggregate("tok", &input).await.unwrap();
        assert_eq!(service.source().calls.load(Ordering::SeqCst), MAX_PAGES);
        assert_eq!(result.total_issues, MAX_PAGES);
    }

    #[tokio::test]
    async fn test_aggregate_follows_cursor_and_sets_server_filters() {
        let source = FakeSource::new(vec![
            page(vec![node("ENG-1", "t1")], Some("c1")),
            page(vec![node("ENG-2", "t1")], None),
        ]);
        let service = LinearReleaseService::new(source);
        let input = AggregationInput {
            teams: vec!["t1".to_string()],
            date_range: Some(DateRange {
                from: Some("2025-01-01".to_string()),
                to: None,
            }),
            page_size: Some(25),
            ..Default::default()
        };

        let result = service.aggregate("tok", &input).await.unwrap();
        assert_eq!(result.total_issues, 2);

        let seen = service.source().seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].team_id.as_deref(), Some("t1"));
        assert_eq!(seen[0].state_type.as_deref(), Some("completed"));
        assert_eq!(seen[0].updated_since.as_deref(), Some("2025-01-01"));
        assert_eq!(seen[0].first, 25);
        assert_eq!(seen[0].after, None);
        assert_eq!(seen[1].after.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_aggregate_without_teams_still_fetches() {
        let source = FakeSource::new(vec![page(vec![node("ENG-1", "t1")], None)]);
        let service = LinearReleaseService::new(source);

        let result = service
            .aggregate("tok", &AggregationInput::default())
            .await
            .unwrap();
        assert_eq!(result.total_issues, 1);
        let seen = service.source().seen.lock().unwrap();
        assert_eq!(seen[0].team_id, None);
        assert_eq!(seen[0].first, DEFAULT_PAGE_SIZE);
    }

    #[tokio::test]
    async fn test_aggregate_filters_extra_teams_client_side() {
        let source = FakeSource::new(vec![page(
            vec![node("A-1", "t1"), node("B-1", "t2"), node("C-1", "t3")],
            None,
        )]);
        let service = LinearReleaseService::new(source);
        let input = AggregationInput {
            teams: vec!["t1".to_string(), "t2".to_string()],
            ..Default::default()
        };

        let result = service.aggregate("tok", &input).await.unwrap();
        let ids: Vec<&str> = result.issues.iter().map(|i| i.identifier.as_str()).collect();
        assert_eq!(ids, vec!["A-1", "B-1"]);
    }

    #[tokio::test]
    async fn test_aggregate_stops_when_cursor_does_not_advance() {
        let stuck = IssueConnection {
            nodes: vec![node("ENG-1", "t1")],
            page_info: PageInfo {
                has_next_page: true,
                end_cursor: None,
            },
        };
        let service = LinearReleaseService::new(FakeSource::new(vec![stuck]));
        let input = AggregationInput {
            teams: vec!["t1".to_string()],
            ..Default::default()
        };

        let result = service.aggregate("tok", &input).await.unwrap();
        assert_eq!(service.source().calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.total_issues, 1);
    }

    #[tokio::test]
    async fn test_aggregate_stops_on_repeated_cursor() {
        let source = FakeSource::new(vec![
            page(vec![node("ENG-1", "t1")], Some("c1")),
            page(vec![node("ENG-2", "t1")], Some("c1")),
        ]);
        let service = LinearReleaseService::new(source);
        let input = AggregationInput {
            teams: vec!["t1".to_string()],
            ..Default::default()
        };

        let result = service.aggregate("tok", &input).await.unwrap();
        assert_eq!(service.source().calls.load(Ordering::SeqCst), 2);
        let ids: Vec<&str> = result.issues.iter().map(|i| i.identifier.as_str()).collect();
        assert_eq!(ids, vec!["ENG-1", "ENG-2"]);
    }

    #[test]
    fn test_client_filters_unparseable_to_keeps_issues() {
        let mut a = issue("A-1", "One", &[]);
        a.completed_at = Some("2025-06-01T00:00:00.000Z".to_string());
        let input = AggregationInput {
            teams: vec!["t1".to_string()],
            date_range: Some(DateRange {
                from: Some("2025-01-01".to_string()),
                to: Some("2025/01/31".to_string()),
            }),
            ..Default::default()
        };
        // Filtering tolerates it; validation is what rejects it.
        assert_eq!(apply_client_filters(vec![a], &input).len(), 1);
        assert!(!validate_linear_aggregation_input(&input).is_valid);
    }

    #[test]
    fn test_validate_aggregation_rejects_unparseable_bounds() {
        let input = AggregationInput {
            teams: vec!["t1".to_string()],
            date_range: Some(DateRange {
                from: Some("yesterday".to_string()),
                to: Some("2025/01/31".to_string()),
            }),
            ..Default::default()
        };
        let result = validate_linear_aggregation_input(&input);
        assert!(!result.is_valid);
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["dateRange.from", "dateRange.to"]);
        assert!(result
            .errors
            .iter()
            .all(|e| e.code == ValidationCode::InvalidDate));

        let open_ended = AggregationInput {
            teams: vec!["t1".to_string()],
            date_range: Some(DateRange {
                from: Some("2025-01-01".to_string()),
                to: None,
            }),
            ..Default::default()
        };
        assert!(validate_linear_aggregation_input(&open_ended).is_valid);
    }

    #[test]
    fn test_client_filters_labels_priority_and_date() {
        let mut a = issue("A-1", "One", &["api", "feature"]);
        a.priority = Some(3);
        a.completed_at = Some("2025-01-31T18:00:00.000Z".to_string());
        let mut b = issue("A-2", "Two", &["docs"]);
        b.priority = Some(4);
        let mut c = issue("A-3", "Three", &["api"]);
        c.priority = None;
        let mut d = issue("A-4", "Four", &["api"]);
        d.priority = Some(2);
        d.completed_at = Some("2025-02-02T09:00:00.000Z".to_string());

        let input = AggregationInput {
            teams: vec!["t1".to_string()],
            date_range: Some(DateRange {
                from: None,
                to: Some("2025-01-31".to_string()),
            }),
            issue_filters: Some(IssueFilters {
                state_types: vec![],
                labels: vec!["api".to_string(), "ui".to_string()],
                min_priority: Some(1),
            }),
            ..Default::default()
        };

        let kept = apply_client_filters(vec![a, b, c, d], &input);
        let ids: Vec<&str> = kept.iter().map(|i| i.identifier.as_str()).collect();
        // b: no matching label, c: untriaged counts as 0, d: completed after window
        assert_eq!(ids, vec!["A-1"]);
    }

    #[test]
    fn test_client_filters_empty_result_is_not_an_error() {
        let mut a = issue("A-1", "One", &[]);
        a.state_type = Some("completed".to_string());
        a.project = Some(NamedRef {
            id: "p1".to_string(),
            name: "Alpha".to_string(),
        });

        let input = AggregationInput {
            teams: vec!["t1".to_string()],
            projects: Some(vec!["p2".to_string()]),
            ..Default::default()
        };
        assert!(apply_client_filters(vec![a.clone()], &input).is_empty());

        let input = AggregationInput {
            teams: vec!["t1".to_string()],
            issue_filters: Some(IssueFilters {
                state_types: vec!["canceled".to_string()],
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(apply_client_filters(vec![a], &input).is_empty());
    }

    #[test]
    fn test_validate_aggregation_input() {
        let ok = AggregationInput {
            teams: vec!["t1".to_string()],
            ..Default::default()
        };
        assert!(validate_linear_aggregation_input(&ok).is_valid);

        let bad = AggregationInput {
            teams: vec![],
            date_range: Some(DateRange {
                from: Some("2025-02-01".to_string()),
                to: Some("2025-01-01".to_string()),
            }),
            issue_filters: Some(IssueFilters {
                min_priority: Some(7),
                ..Default::default()
            }),
            ..Default::default()
        };
        let result = validate_linear_aggregation_input(&bad);
        assert!(!result.is_valid);
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["teams", "dateRange", "issueFilters.minPriority"]);
    }
}
