//! Input validation for each step of the release-notes wizard.
//!
//! Validators never fail: problems come back as data in a
//! [`ValidationResult`]. Errors block generation, warnings are advisory.
//! Checks that depend on the current time have an `_at` variant taking `now`
//! so they stay deterministic under test.

use std::sync::OnceLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::linear::DateRange;

pub const AI_DECIDE_TEMPLATE: &str = "ai-decide";

const SUPPORTED_PROVIDERS: &[&str] = &["github", "gitlab", "bitbucket"];
const TEMPLATE_CATEGORIES: &[&str] = &[
    "traditional",
    "modern",
    "technical",
    "marketing",
    "changelog",
    "minimal",
    "custom",
];
const TEMPLATE_TONES: &[&str] = &["professional", "casual", "technical", "enthusiastic", "formal"];
const TEMPLATE_AUDIENCES: &[&str] = &["developers", "business", "users", "mixed", "executives"];

const MAX_BRANCH_LEN: usize = 100;
const MAX_VERSION_LEN: usize = 50;
const MAX_INSTRUCTIONS_LEN: usize = 1000;
const MIN_INSTRUCTIONS_LEN: usize = 10;
const MAX_RANGE_DAYS: i64 = 365;

fn re_version() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^v?\d+(\.\d+)*(-[A-Za-z0-9]+)?$").unwrap())
}

// =============================================================================
// Result types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    Required,
    InvalidProvider,
    NoDataSource,
    InvalidDate,
    InvalidDateRange,
    FutureDate,
    LargeDateRange,
    SmallDateRange,
    InvalidType,
    TooLong,
    TooShort,
    InvalidFormat,
    InvalidValue,
    OutOfRange,
    MissingDescription,
    PrivateRepository,
    NoOrgContext,
    DateFarPast,
    DateFarFuture,
    UnsupportedCombination,
}

/// One finding, used for both errors and warnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    pub code: ValidationCode,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>, code: ValidationCode) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code,
        }
    }
}

pub type ValidationError = ValidationIssue;
pub type ValidationWarning = ValidationIssue;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// Always `errors.is_empty()`.
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn new(errors: Vec<ValidationError>, warnings: Vec<ValidationWarning>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn valid() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// Concatenate findings from several validators, in order.
    pub fn merge(results: impl IntoIterator<Item = ValidationResult>) -> Self {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        for r in results {
            errors.extend(r.errors);
            warnings.extend(r.warnings);
        }
        Self::new(errors, warnings)
    }

    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Default)]
struct Findings {
    errors: Vec<ValidationError>,
    warnings: Vec<ValidationWarning>,
}

impl Findings {
    fn error(&mut self, field: &str, message: impl Into<String>, code: ValidationCode) {
        self.errors.push(ValidationIssue::new(field, message, code));
    }

    fn warn(&mut self, field: &str, message: impl Into<String>, code: ValidationCode) {
        self.warnings.push(ValidationIssue::new(field, message, code));
    }

    fn finish(self) -> ValidationResult {
        ValidationResult::new(self.errors, self.warnings)
    }
}

// =============================================================================
// Inputs
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    /// Numeric on GitHub, string elsewhere.
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub private: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceOptions {
    #[serde(default)]
    pub commits: bool,
    #[serde(default)]
    pub issues: bool,
    #[serde(default)]
    pub include_pull_requests: Option<bool>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    /// Kept as raw JSON: the wizard has been known to send non-strings here.
    #[serde(default)]
    pub branch: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseTemplate {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub user_prompt_template: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub target_audience: Option<String>,
    #[serde(default)]
    pub uses_org_ai_context: Option<bool>,
}

/// Either the `"ai-decide"` sentinel (any bare string deserializes here) or
/// a concrete template record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateChoice {
    Named(String),
    Template(ReleaseTemplate),
}

impl TemplateChoice {
    pub fn ai_decide() -> Self {
        TemplateChoice::Named(AI_DECIDE_TEMPLATE.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalInstructions {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
}

/// Everything the wizard collected, step by step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardData {
    #[serde(default)]
    pub repository: Option<Repository>,
    #[serde(default)]
    pub data_sources: DataSourceOptions,
    #[serde(default)]
    pub template: Option<TemplateChoice>,
    #[serde(default)]
    pub additional: AdditionalInstructions,
}

/// Flat request body accepted by the generation endpoint. A missing template
/// means `"ai-decide"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    #[serde(default)]
    pub repository: Option<Repository>,
    #[serde(default)]
    pub options: DataSourceOptions,
    #[serde(default)]
    pub template: Option<TemplateChoice>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
}

// =============================================================================
// Date helpers
// =============================================================================

/// Parse RFC 3339, `YYYY-MM-DDTHH:MM:SS[.f]` (UTC) or `YYYY-MM-DD` (midnight UTC).
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Like [`parse_date`], but a bare date covers the whole day.
pub fn parse_date_end_of_day(s: &str) -> Option<DateTime<Utc>> {
    match NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
        Ok(d) => d.and_hms_milli_opt(23, 59, 59, 999).map(|dt| dt.and_utc()),
        Err(_) => parse_date(s),
    }
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn value_present(v: &Option<Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

// =============================================================================
// Validators
// =============================================================================

pub fn validate_repository_selection(repository: Option<&Repository>) -> ValidationResult {
    let mut f = Findings::default();

    let Some(repo) = repository else {
        f.error("repository", "Please select a repository", ValidationCode::Required);
        return f.finish();
    };

    if !value_present(&repo.id) {
        f.error("repository.id", "Repository ID is required", ValidationCode::Required);
    }
    if non_empty(&repo.full_name).is_none() {
        f.error(
            "repository.full_name",
            "Repository name is required",
            ValidationCode::Required,
        );
    }
    match non_empty(&repo.provider) {
        None => f.error(
            "repository.provider",
            "Repository provider is required",
            ValidationCode::Required,
        ),
        Some(p) if !SUPPORTED_PROVIDERS.contains(&p) => f.error(
            "repository.provider",
            format!(
                "Unsupported provider '{}'. Expected one of: {}",
                p,
                SUPPORTED_PROVIDERS.join(", ")
            ),
            ValidationCode::InvalidProvider,
        ),
        Some(_) => {}
    }

    if non_empty(&repo.description).is_none() {
        f.warn(
            "repository.description",
            "Repository has no description; release notes will have less context",
            ValidationCode::MissingDescription,
        );
    }
    if repo.private == Some(true) {
        f.warn(
            "repository.private",
            "Repository is private; review generated notes before publishing",
            ValidationCode::PrivateRepository,
        );
    }

    f.finish()
}

pub fn validate_data_source_options(options: &DataSourceOptions) -> ValidationResult {
    validate_data_source_options_at(options, Utc::now())
}

pub fn validate_data_source_options_at(
    options: &DataSourceOptions,
    now: DateTime<Utc>,
) -> ValidationResult {
    let mut f = Findings::default();

    if !options.commits && !options.issues {
        f.error(
            "dataSources",
            "Select at least one data source (commits or issues)",
            ValidationCode::NoDataSource,
        );
    }

    let range = options.date_range.clone().unwrap_or_default();
    let from = parse_range_end(&mut f, "dateRange.from", "Start date", &range.from);
    let to = parse_range_end(&mut f, "dateRange.to", "End date", &range.to);

    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            f.error(
                "dateRange",
                "Start date must be before end date",
                ValidationCode::InvalidDateRange,
            );
        } else {
            if to > now {
                f.warn(
                    "dateRange.to",
                    "End date is in the future",
                    ValidationCode::FutureDate,
                );
            }
            let span = to - from;
            if span > Duration::days(MAX_RANGE_DAYS) {
                f.warn(
                    "dateRange",
                    "Date range exceeds one year; generation may be slow and unfocused",
                    ValidationCode::LargeDateRange,
                );
            } else if span < Duration::days(1) {
                f.warn(
                    "dateRange",
                    "Date range is shorter than one day",
                    ValidationCode::SmallDateRange,
                );
            }
        }
    }

    match &options.branch {
        None | Some(Value::Null) => {}
        Some(Value::String(branch)) => {
            if branch.chars().count() > MAX_BRANCH_LEN {
                f.error(
                    "branch",
                    format!("Branch name must be at most {} characters", MAX_BRANCH_LEN),
                    ValidationCode::TooLong,
                );
            }
        }
        Some(_) => f.error("branch", "Branch must be a string", ValidationCode::InvalidType),
    }

    f.finish()
}

fn parse_range_end(
    f: &mut Findings,
    field: &str,
    label: &str,
    value: &Option<String>,
) -> Option<DateTime<Utc>> {
    let Some(raw) = non_empty(value) else {
        f.error(field, format!("{} is required", label), ValidationCode::Required);
        return None;
    };
    let parsed = parse_date(raw);
    if parsed.is_none() {
        f.error(
            field,
            format!("{} is not a valid date", label),
            ValidationCode::InvalidDate,
        );
    }
    parsed
}

pub fn validate_template_selection(template: Option<&TemplateChoice>) -> ValidationResult {
    let mut f = Findings::default();

    let template = match template {
        None => {
            f.error("template", "Please select a template", ValidationCode::Required);
            return f.finish();
        }
        Some(TemplateChoice::Named(name)) if name == AI_DECIDE_TEMPLATE => return f.finish(),
        Some(TemplateChoice::Named(name)) => {
            f.error(
                "template",
                format!("Unknown template selection '{}'", name),
                ValidationCode::InvalidValue,
            );
            return f.finish();
        }
        Some(TemplateChoice::Template(t)) => t,
    };

    let required = [
        ("template.id", "Template ID", &template.id),
        ("template.name", "Template name", &template.name),
        ("template.system_prompt", "System prompt", &template.system_prompt),
        (
            "template.user_prompt_template",
            "User prompt template",
            &template.user_prompt_template,
        ),
    ];
    for (field, label, value) in required {
        if non_empty(value).is_none() {
            f.error(field, format!("{} is required", label), ValidationCode::Required);
        }
    }

    let enumerated = [
        ("template.category", "category", &template.category, TEMPLATE_CATEGORIES),
        ("template.tone", "tone", &template.tone, TEMPLATE_TONES),
        (
            "template.target_audience",
            "target audience",
            &template.target_audience,
            TEMPLATE_AUDIENCES,
        ),
    ];
    for (field, label, value, allowed) in enumerated {
        if let Some(v) = value.as_deref() {
            if !allowed.contains(&v) {
                f.error(
                    field,
                    format!(
                        "Invalid {} '{}'. Expected one of: {}",
                        label,
                        v,
                        allowed.join(", ")
                    ),
                    ValidationCode::InvalidValue,
                );
            }
        }
    }

    if !template.uses_org_ai_context.unwrap_or(false) {
        f.warn(
            "template.uses_org_ai_context",
            "Template ignores your organization's AI context",
            ValidationCode::NoOrgContext,
        );
    }

    f.finish()
}

pub fn validate_additional_instructions(additional: &AdditionalInstructions) -> ValidationResult {
    validate_additional_instructions_at(additional, Utc::now())
}

pub fn validate_additional_instructions_at(
    additional: &AdditionalInstructions,
    now: DateTime<Utc>,
) -> ValidationResult {
    let mut f = Findings::default();

    if let Some(version) = non_empty(&additional.version) {
        if version.chars().count() > MAX_VERSION_LEN {
            f.error(
                "version",
                format!("Version must be at most {} characters", MAX_VERSION_LEN),
                ValidationCode::TooLong,
            );
        } else if !re_version().is_match(version) {
            f.warn(
                "version",
                "Version doesn't look like semantic versioning (e.g. v1.2.0)",
                ValidationCode::InvalidFormat,
            );
        }
    }

    if let Some(raw) = non_empty(&additional.release_date) {
        match parse_date(raw) {
            None => f.error(
                "releaseDate",
                "Release date is not a valid date",
                ValidationCode::InvalidDate,
            ),
            Some(date) => {
                if date < now - Duration::days(MAX_RANGE_DAYS) {
                    f.warn(
                        "releaseDate",
                        "Release date is more than a year in the past",
                        ValidationCode::DateFarPast,
                    );
                } else if date > now + Duration::days(MAX_RANGE_DAYS) {
                    f.warn(
                        "releaseDate",
                        "Release date is more than a year in the future",
                        ValidationCode::DateFarFuture,
                    );
                }
            }
        }
    }

    if let Some(instructions) = additional.instructions.as_deref() {
        let len = instructions.trim().chars().count();
        if len > MAX_INSTRUCTIONS_LEN {
            f.error(
                "instructions",
                format!(
                    "Instructions must be at most {} characters",
                    MAX_INSTRUCTIONS_LEN
                ),
                ValidationCode::TooLong,
            );
        } else if len > 0 && len < MIN_INSTRUCTIONS_LEN {
            f.warn(
                "instructions",
                "Instructions are very short; add more detail for better results",
                ValidationCode::TooShort,
            );
        }
    }

    f.finish()
}

fn pull_request_provider_warning(
    repository: Option<&Repository>,
    options: &DataSourceOptions,
) -> ValidationResult {
    let mut f = Findings::default();
    let is_gitlab = repository
        .and_then(|r| non_empty(&r.provider))
        .is_some_and(|p| p == "gitlab");
    if is_gitlab && options.include_pull_requests == Some(true) {
        f.warn(
            "dataSources.includePullRequests",
            "Pull requests are not imported from GitLab; merge request data will be skipped",
            ValidationCode::UnsupportedCombination,
        );
    }
    f.finish()
}

pub fn validate_complete_wizard_data(data: &WizardData) -> ValidationResult {
    validate_complete_wizard_data_at(data, Utc::now())
}

pub fn validate_complete_wizard_data_at(data: &WizardData, now: DateTime<Utc>) -> ValidationResult {
    ValidationResult::merge([
        validate_repository_selection(data.repository.as_ref()),
        validate_data_source_options_at(&data.data_sources, now),
        validate_template_selection(data.template.as_ref()),
        validate_additional_instructions_at(&data.additional, now),
        pull_request_provider_warning(data.repository.as_ref(), &data.data_sources),
    ])
}

pub fn validate_generation_request(request: &GenerationRequest) -> ValidationResult {
    validate_generation_request_at(request, Utc::now())
}

pub fn validate_generation_request_at(
    request: &GenerationRequest,
    now: DateTime<Utc>,
) -> ValidationResult {
    let template = request
        .template
        .clone()
        .unwrap_or_else(TemplateChoice::ai_decide);
    let additional = AdditionalInstructions {
        version: request.version.clone(),
        release_date: request.release_date.clone(),
        instructions: request.instructions.clone(),
    };
    ValidationResult::merge([
        validate_repository_selection(request.repository.as_ref()),
        validate_data_source_options_at(&request.options, now),
        validate_template_selection(Some(&template)),
        validate_additional_instructions_at(&additional, now),
        pull_request_provider_warning(request.repository.as_ref(), &request.options),
    ])
}
