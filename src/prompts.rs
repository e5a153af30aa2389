//! Professional prompt engine.
//!
//! Renders a [`PromptContext`] (organization profile + writing preferences)
//! into a system prompt made of named sections, and provides the static
//! per-content-type user prompt templates. Everything here is a pure function
//! of its input: the same context always yields the same bytes.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

// =============================================================================
// Loosely-typed inputs from the organization / AI-context provider
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationSettings {
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub company_size: Option<String>,
    #[serde(default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub target_market: Option<String>,
}

/// Organization record as stored by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub settings: Option<OrganizationSettings>,
}

/// Per-organization AI writing preferences. Every field is optional; defaults
/// are resolved in [`build_prompt_context`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiContext {
    /// House-style text injected verbatim into Linear prompts.
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub output_format: Option<String>,
    #[serde(default)]
    pub example_output: Option<String>,
    #[serde(default)]
    pub include_emojis: Option<bool>,
    #[serde(default)]
    pub include_metrics: Option<bool>,
    #[serde(default)]
    pub brevity_level: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

// =============================================================================
// Style enums
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    ReleaseNotes,
    FeatureAnnouncement,
    BugFix,
    SecurityUpdate,
    General,
}

impl ContentType {
    /// Unknown values map to `General`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "release_notes" => ContentType::ReleaseNotes,
            "feature_announcement" => ContentType::FeatureAnnouncement,
            "bug_fix" => ContentType::BugFix,
            "security_update" => ContentType::SecurityUpdate,
            _ => ContentType::General,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Professional,
    Casual,
    Technical,
    Enthusiastic,
    Formal,
}

impl Tone {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "professional" => Some(Tone::Professional),
            "casual" => Some(Tone::Casual),
            "technical" => Some(Tone::Technical),
            "enthusiastic" => Some(Tone::Enthusiastic),
            "formal" => Some(Tone::Formal),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tone::Professional => "professional",
            Tone::Casual => "casual",
            Tone::Technical => "technical",
            Tone::Enthusiastic => "enthusiastic",
            Tone::Formal => "formal",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Developers,
    /// Alias some organizations use for developer-facing notes.
    Technical,
    Business,
    Users,
    #[default]
    Mixed,
    Executives,
}

impl Audience {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "developers" => Some(Audience::Developers),
            "technical" => Some(Audience::Technical),
            "business" => Some(Audience::Business),
            "users" => Some(Audience::Users),
            "mixed" => Some(Audience::Mixed),
            "executives" => Some(Audience::Executives),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Audience::Developers => "developers",
            Audience::Technical => "technical",
            Audience::Business => "business",
            Audience::Users => "users",
            Audience::Mixed => "mixed",
            Audience::Executives => "executives",
        }
    }

    pub fn is_technical(self) -> bool {
        matches!(self, Audience::Developers | Audience::Technical)
    }

    fn label(self) -> &'static str {
        match self {
            Audience::Developers => "developers",
            Audience::Technical => "technical readers",
            Audience::Business => "business stakeholders",
            Audience::Users => "end users",
            Audience::Mixed => "a mixed audience of technical and non-technical readers",
            Audience::Executives => "executives",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Markdown,
    Html,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "markdown" | "md" => Some(OutputFormat::Markdown),
            "html" => Some(OutputFormat::Html),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Html => "html",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            OutputFormat::Markdown => "Markdown",
            OutputFormat::Html => "HTML",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrevityLevel {
    Concise,
    #[default]
    Detailed,
    Comprehensive,
}

impl BrevityLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "concise" => Some(BrevityLevel::Concise),
            "detailed" => Some(BrevityLevel::Detailed),
            "comprehensive" => Some(BrevityLevel::Comprehensive),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BrevityLevel::Concise => "concise",
            BrevityLevel::Detailed => "detailed",
            BrevityLevel::Comprehensive => "comprehensive",
        }
    }
}

// =============================================================================
// Prompt context
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationProfile {
    pub name: String,
    pub description: Option<String>,
    pub industry: Option<String>,
    pub size: Option<String>,
    pub product_type: Option<String>,
    pub target_market: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WritingPreferences {
    pub tone: Tone,
    pub audience: Audience,
    pub output_format: OutputFormat,
    pub language: String,
    pub include_emojis: bool,
    pub include_metrics: bool,
    pub brevity_level: BrevityLevel,
}

impl Default for WritingPreferences {
    fn default() -> Self {
        Self {
            tone: Tone::Professional,
            audience: Audience::Mixed,
            output_format: OutputFormat::Markdown,
            language: "English".to_string(),
            include_emojis: false,
            include_metrics: true,
            brevity_level: BrevityLevel::Detailed,
        }
    }
}

/// Sole input to system-prompt generation. Built fresh per request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptContext {
    pub organization: OrganizationProfile,
    pub preferences: WritingPreferences,
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_style: Option<String>,
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Map caller records onto a strict [`PromptContext`], resolving every default
/// in one place.
pub fn build_prompt_context(
    organization: Option<&Organization>,
    ai_context: Option<&AiContext>,
    content_type: ContentType,
) -> PromptContext {
    let org = organization.cloned().unwrap_or_default();
    let settings = org.settings.clone().unwrap_or_default();
    let ai = ai_context.cloned().unwrap_or_default();
    let defaults = WritingPreferences::default();

    PromptContext {
        organization: OrganizationProfile {
            name: clean(&org.name).unwrap_or_default(),
            description: clean(&org.meta_description),
            industry: clean(&settings.industry),
            size: clean(&settings.company_size),
            product_type: clean(&settings.product_type),
            target_market: clean(&settings.target_market),
        },
        preferences: WritingPreferences {
            tone: ai.tone.as_deref().and_then(Tone::parse).unwrap_or(defaults.tone),
            audience: ai
                .audience
                .as_deref()
                .and_then(Audience::parse)
                .unwrap_or(defaults.audience),
            output_format: ai
                .output_format
                .as_deref()
                .and_then(OutputFormat::parse)
                .unwrap_or(defaults.output_format),
            language: clean(&ai.language).unwrap_or(defaults.language),
            include_emojis: ai.include_emojis.unwrap_or(defaults.include_emojis),
            include_metrics: ai.include_metrics.unwrap_or(defaults.include_metrics),
            brevity_level: ai
                .brevity_level
                .as_deref()
                .and_then(BrevityLevel::parse)
                .unwrap_or(defaults.brevity_level),
        },
        content_type,
        template_style: None,
    }
}

// =============================================================================
// System prompt sections
// =============================================================================

pub fn role_definition(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::ReleaseNotes => {
            "You are an expert technical writer who specializes in software release notes. \
             You turn raw change data into clear, accurate notes that help readers understand \
             what changed and why it matters to them."
        }
        ContentType::FeatureAnnouncement => {
            "You are a product marketing writer who announces new features. You explain what \
             a feature does, who it is for, and how to start using it, without exaggeration."
        }
        ContentType::BugFix => {
            "You are a support-minded technical writer who summarizes bug fixes. You describe \
             the problem users experienced and confirm how it has been resolved."
        }
        ContentType::SecurityUpdate => {
            "You are a security communications specialist who writes security update notices. \
             You are precise about impact and required actions, and you never disclose \
             exploit details."
        }
        ContentType::General => {
            "You are a skilled technical writer who produces clear, accurate product \
             communication."
        }
    }
}

/// Empty when the organization carries no usable fields.
pub fn company_context(org: &OrganizationProfile) -> String {
    let mut lines = Vec::new();
    if !org.name.is_empty() {
        lines.push(format!("- Company: {}", org.name));
    }
    if let Some(ref d) = org.description {
        lines.push(format!("- About: {}", d));
    }
    if let Some(ref i) = org.industry {
        lines.push(format!("- Industry: {}", i));
    }
    if let Some(ref s) = org.size {
        lines.push(format!("- Company size: {}", s));
    }
    if let Some(ref p) = org.product_type {
        lines.push(format!("- Product: {}", p));
    }
    if let Some(ref m) = org.target_market {
        lines.push(format!("- Target market: {}", m));
    }

    if lines.is_empty() {
        return String::new();
    }
    format!("COMPANY CONTEXT:\n{}", lines.join("\n"))
}

struct AudienceGuide {
    focus: &'static str,
    language: &'static str,
    priorities: &'static str,
    avoid: &'static str,
}

fn audience_guide(audience: Audience) -> AudienceGuide {
    match audience {
        Audience::Developers | Audience::Technical => AudienceGuide {
            focus: "API changes, integration impact, configuration, and behavioural changes",
            language: "Precise technical terminology; reference endpoints, flags, and versions by name",
            priorities: "Breaking changes and migrations first, then new capabilities, then fixes",
            avoid: "Marketing language and vague claims without technical substance",
        },
        Audience::Business => AudienceGuide {
            focus: "Business value, customer impact, and operational efficiency",
            language: "Plain business language; translate technical work into outcomes",
            priorities: "Revenue- and customer-facing improvements first, then efficiency gains",
            avoid: "Implementation details, code references, and internal jargon",
        },
        Audience::Users => AudienceGuide {
            focus: "What users can now do and what problems have been solved",
            language: "Friendly, everyday language written in the second person",
            priorities: "Visible new features first, then improvements, then fixes users noticed",
            avoid: "Technical jargon, internal identifiers, and infrastructure work",
        },
        Audience::Mixed => AudienceGuide {
            focus: "Clear value for every reader, with technical depth where it matters",
            language: "Accessible language with brief technical clarifications where needed",
            priorities: "Headline changes first, followed by detail grouped by section",
            avoid: "Unexplained acronyms and walls of technical detail",
        },
        Audience::Executives => AudienceGuide {
            focus: "Strategic impact, risk, and progress against goals",
            language: "Concise, outcome-oriented summary language",
            priorities: "Top-line outcomes first; summarize rather than enumerate",
            avoid: "Granular task lists and technical minutiae",
        },
    }
}

pub fn audience_guidelines(audience: Audience) -> String {
    let guide = audience_guide(audience);
    format!(
        "AUDIENCE GUIDELINES ({}):\n- Focus: {}\n- Language: {}\n- Priorities: {}\n- Avoid: {}",
        audience.as_str(),
        guide.focus,
        guide.language,
        guide.priorities,
        guide.avoid
    )
}

pub fn tone_instructions(tone: Tone) -> String {
    let body = match tone {
        Tone::Professional => {
            "Clear, confident, and courteous. Use complete sentences and neutral wording. \
             Be informative without being stiff."
        }
        Tone::Casual => {
            "Relaxed and conversational, as if explaining changes to a colleague. Contractions \
             are fine; slang is not."
        }
        Tone::Technical => {
            "Exact and matter-of-fact. Prefer specific terms over general ones and state \
             behaviour changes explicitly."
        }
        Tone::Enthusiastic => {
            "Energetic and positive about what shipped, while staying factual. Celebrate \
             real improvements without hype."
        }
        Tone::Formal => {
            "Formal and precise. Avoid contractions and colloquialisms; use an impersonal \
             voice."
        }
    };
    format!("TONE ({}):\n{}", tone.as_str(), body)
}

pub fn format_specifications(prefs: &WritingPreferences, template_style: Option<&str>) -> String {
    let mut lines: Vec<String> = Vec::new();
    match prefs.output_format {
        OutputFormat::Markdown => {
            lines.push("- Output valid Markdown.".to_string());
            lines.push("- Use '##' headings for sections and '-' for bullet points.".to_string());
            lines.push(
                "- Use **bold** sparingly for key terms and `code` for commands, settings, and API names."
                    .to_string(),
            );
        }
        OutputFormat::Html => {
            lines.push(
                "- Output clean semantic HTML: <h2> for sections, <ul>/<li> for lists, <strong> and <code> for emphasis."
                    .to_string(),
            );
            lines.push(
                "- Do not include <html>, <head>, or <body> tags, inline styles, or scripts."
                    .to_string(),
            );
        }
    }

    if prefs.include_emojis {
        lines.push("- Use emojis sparingly to mark section headings and highlight key items.".to_string());
    } else {
        lines.push("- Do not use emojis.".to_string());
    }

    if prefs.include_metrics {
        lines.push(
            "- Include concrete metrics (performance gains, counts, percentages) when the source data provides them. Never estimate or invent numbers."
                .to_string(),
        );
    }

    lines.push(
        match prefs.brevity_level {
            BrevityLevel::Concise => {
                "- Brevity: concise. One short line per change; skip background."
            }
            BrevityLevel::Detailed => {
                "- Brevity: detailed. One to two sentences per change explaining what changed and why it matters."
            }
            BrevityLevel::Comprehensive => {
                "- Brevity: comprehensive. Cover each change fully, including context, impact, and any required action."
            }
        }
        .to_string(),
    );

    if let Some(style) = template_style.map(str::trim).filter(|s| !s.is_empty()) {
        lines.push(format!("- Follow the \"{}\" template style.", style));
    }

    format!("FORMAT SPECIFICATIONS:\n{}", lines.join("\n"))
}

pub fn quality_standards() -> &'static str {
    "QUALITY STANDARDS:\n\
     - Accuracy: every statement must be traceable to the provided changes.\n\
     - Clarity: prefer plain words and short sentences.\n\
     - Relevance: lead with the changes that matter most to the audience.\n\
     - Consistency: use the same terminology and tense throughout.\n\
     - Completeness: cover every significant change provided and do not pad with filler."
}

pub fn output_constraints(language: &str, format: OutputFormat) -> String {
    format!(
        "OUTPUT CONSTRAINTS:\n\
         - Write entirely in {language}.\n\
         - Return only the {format} content, with no preamble or commentary.\n\
         - Do not invent features, fixes, dates, version numbers, or metrics.\n\
         - Do not include links or ticket references that were not provided.",
        language = language,
        format = format.display_name(),
    )
}

pub fn closing_reminder(org: &OrganizationProfile, audience: Audience) -> String {
    let writer = if org.name.is_empty() {
        "this organization"
    } else {
        org.name.as_str()
    };
    format!(
        "Remember: you are writing on behalf of {} for {}. Only describe changes that appear in the provided data.",
        writer,
        audience.label()
    )
}

/// Render the full system prompt. Sections are separated by a blank line;
/// empty sections are dropped.
pub fn generate_system_prompt(context: &PromptContext) -> String {
    let prefs = &context.preferences;
    let sections = [
        role_definition(context.content_type).to_string(),
        company_context(&context.organization),
        audience_guidelines(prefs.audience),
        tone_instructions(prefs.tone),
        format_specifications(prefs, context.template_style.as_deref()),
        quality_standards().to_string(),
        output_constraints(&prefs.language, prefs.output_format),
        closing_reminder(&context.organization, prefs.audience),
    ];

    sections
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

// =============================================================================
// User prompt templates
// =============================================================================

/// Static user prompt template for a content type. Placeholders:
/// `{changes}` and `{additional_context}`.
pub fn user_prompt_template(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::ReleaseNotes => {
            "Create release notes from the following changes.\n\n\
             Changes:\n{changes}\n\n\
             Additional context:\n{additional_context}\n\n\
             Group the changes into sections, lead with the most important ones, and only \
             describe what is listed above."
        }
        ContentType::FeatureAnnouncement => {
            "Write a feature announcement based on the following changes.\n\n\
             Changes:\n{changes}\n\n\
             Additional context:\n{additional_context}\n\n\
             Explain what the feature does, who benefits, and how to get started."
        }
        ContentType::BugFix => {
            "Summarize the following bug fixes.\n\n\
             Fixes:\n{changes}\n\n\
             Additional context:\n{additional_context}\n\n\
             For each fix, state the problem users saw and that it is now resolved."
        }
        ContentType::SecurityUpdate => {
            "Write a security update notice for the following changes.\n\n\
             Changes:\n{changes}\n\n\
             Additional context:\n{additional_context}\n\n\
             State who is affected and what action, if any, readers must take. Do not describe \
             how vulnerabilities could be exploited."
        }
        ContentType::General => {
            "Write a clear update describing the following changes.\n\n\
             Changes:\n{changes}\n\n\
             Additional context:\n{additional_context}"
        }
    }
}

fn re_placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(changes|additional_context)\}").unwrap())
}

/// Substitute the template placeholders in one pass, so substituted text is
/// never rescanned. An empty context becomes "None".
pub fn fill_user_prompt(template: &str, changes: &str, additional_context: &str) -> String {
    let context = if additional_context.trim().is_empty() {
        "None"
    } else {
        additional_context
    };
    re_placeholder()
        .replace_all(template, |caps: &Captures| match &caps[1] {
            "changes" => changes.to_string(),
            _ => context.to_string(),
        })
        .into_owned()
}

/// Facade over the engine's entry points.
pub struct ProfessionalPromptEngine;

impl ProfessionalPromptEngine {
    pub fn generate_system_prompt(context: &PromptContext) -> String {
        generate_system_prompt(context)
    }

    pub fn user_prompt_template(content_type: ContentType) -> &'static str {
        user_prompt_template(content_type)
    }
}
