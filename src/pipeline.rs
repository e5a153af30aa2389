//! End-to-end release-notes run: validate, aggregate, categorize, build the
//! prompt, generate.
//!
//! The generator is injected once and never retried here; a failed call is
//! surfaced as-is so no fallback text ever stands in for real output.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::generation::{GenerateOptions, GenerationError, TextGenerator};
use crate::linear::{
    AggregationInput, AiContext, BuildPromptArgs, IssueSource, LinearReleaseService, Organization,
    ReleasePrompt, Sections,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRequest {
    pub aggregation: AggregationInput,
    #[serde(default)]
    pub organization: Option<Organization>,
    #[serde(default)]
    pub ai_context: Option<AiContext>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    /// Display names shown in the prompt header.
    #[serde(default)]
    pub team_names: Vec<String>,
    #[serde(default)]
    pub project_names: Vec<String>,
    #[serde(default = "default_true")]
    pub include_identifiers: bool,
    /// Stop after prompt building.
    #[serde(default)]
    pub prompt_only: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ReleaseRequest {
    fn default() -> Self {
        Self {
            aggregation: AggregationInput::default(),
            organization: None,
            ai_context: None,
            version: None,
            release_date: None,
            instructions: None,
            template: None,
            team_names: Vec::new(),
            project_names: Vec::new(),
            include_identifiers: true,
            prompt_only: false,
        }
    }
}

impl ReleaseRequest {
    fn prompt_args(&self, sections: Sections) -> BuildPromptArgs {
        BuildPromptArgs {
            sections,
            organization: self.organization.clone(),
            ai_context: self.ai_context.clone(),
            version: self.version.clone(),
            release_date: self.release_date.clone(),
            instructions: self.instructions.clone(),
            template: self.template.clone(),
            date_range: self.aggregation.date_range.clone(),
            teams: self.team_names.clone(),
            projects: self.project_names.clone(),
            include_identifiers: self.include_identifiers,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionCounts {
    pub features: usize,
    pub improvements: usize,
    pub bugfixes: usize,
    pub breaking: usize,
}

impl From<&Sections> for SectionCounts {
    fn from(s: &Sections) -> Self {
        Self {
            features: s.features.len(),
            improvements: s.improvements.len(),
            bugfixes: s.bugfixes.len(),
            breaking: s.breaking.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseDraft {
    pub title: String,
    pub content: String,
    pub total_issues: usize,
    pub section_counts: SectionCounts,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Nothing matched the filters. A normal result, not a failure.
    NoIssues,
    Drafted(ReleaseDraft),
    PromptOnly {
        prompt: ReleasePrompt,
        total_issues: usize,
        section_counts: SectionCounts,
    },
}

/// First `# ` heading, else "Release Notes" plus the version.
pub fn extract_title(content: &str, version: Option<&str>) -> String {
    content
        .lines()
        .map(str::trim)
        .find_map(|l| l.strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| match version.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => format!("Release Notes {}", v),
            None => "Release Notes".to_string(),
        })
}

pub struct ReleaseNotesPipeline<S> {
    service: LinearReleaseService<S>,
    generator: Option<Box<dyn TextGenerator>>,
    options: GenerateOptions,
}

impl<S: IssueSource> ReleaseNotesPipeline<S> {
    pub fn new(service: LinearReleaseService<S>, generator: Option<Box<dyn TextGenerator>>) -> Self {
        Self {
            service,
            generator,
            options: GenerateOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn service(&self) -> &LinearReleaseService<S> {
        &self.service
    }

    pub async fn run(
        &self,
        token: &str,
        request: &ReleaseRequest,
    ) -> Result<PipelineOutcome, PipelineError> {
        if token.trim().is_empty() {
            return Err(PipelineError::MissingLinearToken);
        }

        let validation = self
            .service
            .validate_linear_aggregation_input(&request.aggregation);
        if !validation.is_valid {
            return Err(PipelineError::Validation(validation));
        }
        for w in &validation.warnings {
            log::warn!("{}: {}", w.field, w.message);
        }

        let result = self.service.aggregate(token, &request.aggregation).await?;
        if result.total_issues == 0 {
            log::info!("No completed issues matched; nothing to draft");
            return Ok(PipelineOutcome::NoIssues);
        }

        let sections = self.service.categorize(&result.issues);
        let section_counts = SectionCounts::from(&sections);
        let prompt = self.service.build_prompt(&request.prompt_args(sections));

        if request.prompt_only {
            return Ok(PipelineOutcome::PromptOnly {
                prompt,
                total_issues: result.total_issues,
                section_counts,
            });
        }

        let generator = self.generator.as_deref().ok_or_else(|| {
            GenerationError::NotConfigured("no text generator available".to_string())
        })?;

        log::info!(
            "Generating release notes with {} (system {} chars, user {} chars)",
            generator.name(),
            prompt.system_prompt.len(),
            prompt.user_prompt.len()
        );
        let content = generator
            .generate(&prompt.system_prompt, &prompt.user_prompt, &self.options)
            .await
            .map_err(|e| {
                log::warn!("{} generation failed: {}", generator.name(), e);
                e
            })?;

        Ok(PipelineOutcome::Drafted(ReleaseDraft {
            title: extract_title(&content, request.version.as_deref()),
            content,
            total_issues: result.total_issues,
            section_counts,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear::client::{
        IssueConnection, IssueQueryOptions, LabelConnection, LabelNode, LinearError, LinearIssue,
        PageInfo,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct OnePage {
        nodes: Vec<LinearIssue>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IssueSource for OnePage {
        async fn fetch_issues(
            &self,
            _token: &str,
            _options: &IssueQueryOptions,
        ) -> Result<Option<IssueConnection>, LinearError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(IssueConnection {
                nodes: self.nodes.clone(),
                page_info: PageInfo {
                    has_next_page: false,
                    end_cursor: None,
                },
            }))
        }
    }

    #[derive(Default)]
    struct Recorder {
        reply: Option<String>,
        prompts: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl TextGenerator for Arc<Recorder> {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn generate(
            &self,
            system_prompt: &str,
            user_prompt: &str,
            _options: &GenerateOptions,
        ) -> Result<String, GenerationError> {
            self.prompts
                .lock()
                .unwrap()
                .push((system_prompt.to_string(), user_prompt.to_string()));
            match self.reply {
                Some(ref r) => Ok(r.clone()),
                None => Err(GenerationError::Api {
                    status: 500,
                    body: "boom".to_string(),
                }),
            }
        }
    }

    fn node(identifier: &str, title: &str, label: &str) -> LinearIssue {
        LinearIssue {
            id: format!("id-{identifier}"),
            identifier: identifier.to_string(),
            title: title.to_string(),
            description: None,
            priority: Some(2),
            url: None,
            completed_at: Some("2025-03-10T10:00:00.000Z".to_string()),
            updated_at: None,
            state: None,
            labels: Some(LabelConnection {
                nodes: vec![LabelNode {
                    name: label.to_string(),
                }],
            }),
            team: None,
            project: None,
        }
    }

    fn request() -> ReleaseRequest {
        ReleaseRequest {
            aggregation: AggregationInput {
                teams: vec!["team-1".to_string()],
                ..Default::default()
            },
            version: Some("1.2.0".to_string()),
            ..Default::default()
        }
    }

    fn pipeline(
        nodes: Vec<LinearIssue>,
        recorder: &Arc<Recorder>,
    ) -> ReleaseNotesPipeline<OnePage> {
        let source = OnePage {
            nodes,
            calls: AtomicUsize::new(0),
        };
        ReleaseNotesPipeline::new(
            LinearReleaseService::new(source),
            Some(Box::new(Arc::clone(recorder))),
        )
    }

    #[tokio::test]
    async fn test_run_drafts_release_notes() {
        let recorder = Arc::new(Recorder {
            reply: Some("# Acme 1.2.0\n\n## New Features\n- Dark mode".to_string()),
            ..Default::default()
        });
        let p = pipeline(
            vec![node("ENG-1", "Dark mode", "feature"), node("ENG-2", "Crash on save", "bug")],
            &recorder,
        );

        let outcome = p.run("lin_api_x", &request()).await.unwrap();
        let PipelineOutcome::Drafted(draft) = outcome else {
            panic!("expected a draft");
        };
        assert_eq!(draft.title, "Acme 1.2.0");
        assert_eq!(draft.total_issues, 2);
        assert_eq!(draft.section_counts.features, 1);
        assert_eq!(draft.section_counts.bugfixes, 1);

        let prompts = recorder.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].1.contains("- Dark mode (ENG-1)"));
        assert!(prompts[0].1.contains("includes version 1.2.0"));
    }

    #[tokio::test]
    async fn test_invalid_input_never_fetches() {
        let recorder = Arc::new(Recorder::default());
        let p = pipeline(vec![node("ENG-1", "Dark mode", "feature")], &recorder);

        let err = p.run("tok", &ReleaseRequest::default()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(p.service().source().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blank_token_rejected() {
        let recorder = Arc::new(Recorder::default());
        let p = pipeline(vec![], &recorder);
        let err = p.run("  ", &request()).await.unwrap_err();
        assert!(matches!(err, PipelineError::MissingLinearToken));
    }

    #[tokio::test]
    async fn test_no_issues_skips_generation() {
        let recorder = Arc::new(Recorder::default());
        let p = pipeline(vec![], &recorder);
        let outcome = p.run("tok", &request()).await.unwrap();
        assert_eq!(outcome, PipelineOutcome::NoIssues);
        assert!(recorder.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prompt_only_skips_generation() {
        let recorder = Arc::new(Recorder::default());
        let p = pipeline(vec![node("ENG-7", "Remove v1 API", "breaking")], &recorder);
        let mut req = request();
        req.prompt_only = true;
        req.include_identifiers = false;

        match p.run("tok", &req).await.unwrap() {
            PipelineOutcome::PromptOnly {
                prompt,
                total_issues,
                section_counts,
            } => {
                assert_eq!(total_issues, 1);
                assert_eq!(section_counts.breaking, 1);
                assert!(prompt.user_prompt.contains("- Remove v1 API"));
                assert!(!prompt.user_prompt.contains("ENG-7"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(recorder.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let recorder = Arc::new(Recorder::default());
        let p = pipeline(vec![node("ENG-1", "Dark mode", "feature")], &recorder);
        let err = p.run("tok", &request()).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Generation(GenerationError::Api { status: 500, .. })
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_generator_is_not_configured() {
        let source = OnePage {
            nodes: vec![node("ENG-1", "Dark mode", "feature")],
            calls: AtomicUsize::new(0),
        };
        let p = ReleaseNotesPipeline::new(LinearReleaseService::new(source), None);
        let err = p.run("tok", &request()).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Generation(GenerationError::NotConfigured(_))
        ));
        assert!(err.requires_user_action());
    }

    #[test]
    fn test_extract_title_fallbacks() {
        assert_eq!(extract_title("intro\n#  Big Release \nbody", None), "Big Release");
        assert_eq!(extract_title("## Features\n- x", Some("2.0.0")), "Release Notes 2.0.0");
        assert_eq!(extract_title("", None), "Release Notes");
    }
}
