//! Release-notes prompt assembly for Linear issues.
//!
//! The only issue-derived text placed in a prompt is each issue's own title,
//! description, identifier and team name. Everything else is fixed phrasing
//! or metadata supplied by the caller.

use serde::{Deserialize, Serialize};

use super::release::LinearReleaseService;
use super::{DateRange, LinearIssueLite, Sections};
use crate::prompts::{
    build_prompt_context, company_context, Audience, BrevityLevel, ContentType, OutputFormat,
    PromptContext,
};

pub use crate::prompts::{AiContext, Organization, OrganizationSettings};

pub const FEATURES_HEADING: &str = "🚀 New Features";
pub const IMPROVEMENTS_HEADING: &str = "✨ Improvements";
pub const BUGFIXES_HEADING: &str = "🐛 Bug Fixes";
pub const BREAKING_HEADING: &str = "⚠️ Breaking Changes";

fn default_true() -> bool {
    true
}

/// Everything `build_prompt` needs. All fields but `sections` are optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildPromptArgs {
    pub sections: Sections,
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
    /// Free-text structural hint.
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    /// Display names.
    #[serde(default)]
    pub teams: Vec<String>,
    #[serde(default)]
    pub projects: Vec<String>,
    /// When false, identifiers and team names are left out of issue bullets.
    #[serde(default = "default_true")]
    pub include_identifiers: bool,
}

impl Default for BuildPromptArgs {
    fn default() -> Self {
        Self {
            sections: Sections::default(),
            organization: None,
            ai_context: None,
            version: None,
            release_date: None,
            instructions: None,
            template: None,
            date_range: None,
            teams: Vec::new(),
            projects: Vec::new(),
            include_identifiers: true,
        }
    }
}

impl BuildPromptArgs {
    pub fn new(sections: Sections) -> Self {
        Self {
            sections,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleasePrompt {
    pub system_prompt: String,
    pub user_prompt: String,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Collapse each run of line breaks into a single space. Other whitespace is
/// kept as written.
fn flatten(text: &str) -> String {
    text.split(['\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn issue_bullet(issue: &LinearIssueLite, include_identifiers: bool) -> String {
    let mut line = format!("- {}", flatten(&issue.title));

    if let Some(desc) = issue.description.as_deref() {
        let desc = flatten(desc);
        if !desc.trim().is_empty() {
            line.push_str(": ");
            line.push_str(&desc);
        }
    }

    if include_identifiers {
        if !issue.identifier.is_empty() {
            line.push_str(&format!(" ({})", issue.identifier));
        }
        if let Some(ref team) = issue.team {
            if !team.name.is_empty() {
                line.push_str(&format!(" — {}", team.name));
            }
        }
    }

    line
}

/// Render one section as a heading plus bullets. Empty lists render nothing.
pub fn build_section(name: &str, issues: &[LinearIssueLite], include_identifiers: bool) -> String {
    if issues.is_empty() {
        return String::new();
    }
    let bullets: Vec<String> = issues
        .iter()
        .map(|i| issue_bullet(i, include_identifiers))
        .collect();
    format!("## {}\n{}", name, bullets.join("\n"))
}

// -----------------------------------------------------------------------------
// System prompt parts
// -----------------------------------------------------------------------------

fn header(ctx: &PromptContext, args: &BuildPromptArgs) -> Vec<String> {
    let prefs = &ctx.preferences;
    let mut parts = vec![format!(
        "You are an expert release notes writer. Write in {} for a {} audience, in a {} tone. \
         Output format: {}. Style: {}.",
        prefs.language,
        prefs.audience.as_str(),
        prefs.tone.as_str(),
        prefs.output_format.display_name(),
        prefs.brevity_level.as_str()
    )];

    let org_block = company_context(&ctx.organization);
    if !org_block.is_empty() {
        parts.push(org_block);
    }

    let mut details = Vec::new();
    if let Some(v) = present(&args.version) {
        details.push(format!("- Version: {}", v));
    }
    if let Some(d) = present(&args.release_date) {
        details.push(format!("- Release date: {}", d));
    }
    if let Some(ref range) = args.date_range {
        match (present(&range.from), present(&range.to)) {
            (Some(from), Some(to)) => {
                details.push(format!("- Changes completed between {} and {}", from, to))
            }
            (Some(from), None) => details.push(format!("- Changes completed since {}", from)),
            (None, Some(to)) => details.push(format!("- Changes completed up to {}", to)),
            (None, None) => {}
        }
    }
    if !args.teams.is_empty() {
        details.push(format!("- Teams: {}", args.teams.join(", ")));
    }
    if !args.projects.is_empty() {
        details.push(format!("- Projects: {}", args.projects.join(", ")));
    }
    if !details.is_empty() {
        parts.push(format!("RELEASE DETAILS:\n{}", details.join("\n")));
    }

    if let Some(house) = args
        .ai_context
        .as_ref()
        .and_then(|ai| present(&ai.system_prompt))
    {
        parts.push(format!(
            "House style (mandatory, follow exactly):\n{}",
            house
        ));
    }

    parts
}

const STATIC_RULES: &str = "\
- Use only the issues listed in the user message. Do not invent features, fixes, numbers, or dates.
- Keep every issue in the section it is listed under.
- Rewrite issue titles into clear, reader-friendly sentences without changing their meaning.
- Merge duplicate or closely related issues into a single bullet.
- Leave out any section that has no issues.";

fn content_rules(audience: Audience) -> &'static str {
    if audience.is_technical() {
        "\
- Keep relevant implementation detail: APIs, configuration keys, migrations, and behavioural changes.
- Keep issue identifiers and contributor credit where they are provided."
    } else {
        "\
- Leave out internal implementation detail, contributor names, vendor names, and issue tracker jargon.
- Describe each change in terms of what readers can now do or which problem is solved."
    }
}

fn brevity_rules(level: BrevityLevel) -> &'static str {
    match level {
        BrevityLevel::Concise => {
            "\
Brevity (concise):
- One line per change, at most 15 words.
- Skip background and rationale.
- Keep the summary to a single sentence."
        }
        BrevityLevel::Detailed => {
            "\
Brevity (detailed):
- One or two sentences per change covering what changed and why it matters.
- Group related changes where that helps the reader.
- Keep the summary to a short paragraph."
        }
        BrevityLevel::Comprehensive => {
            "\
Brevity (comprehensive):
- Explain each change fully: context, impact, and any action readers must take.
- Use sub-bullets for multi-part changes.
- Open with a summary of two or three paragraphs."
        }
    }
}

fn formatting_rules(ctx: &PromptContext) -> Vec<&'static str> {
    let prefs = &ctx.preferences;
    let mut rules = Vec::new();
    if prefs.include_emojis {
        rules.push("- Use emojis in section headings and sparingly inside bullets.");
    } else {
        rules.push("- Do not use emojis anywhere; drop the emoji prefixes from section headings.");
    }
    if prefs.include_metrics {
        rules.push(
            "- Include metrics only when an issue states them; repeat them exactly as written.",
        );
    }
    rules
}

fn rules(ctx: &PromptContext) -> String {
    let prefs = &ctx.preferences;
    let mut text = format!(
        "Rules:\n{}\n{}",
        STATIC_RULES,
        content_rules(prefs.audience)
    );
    for rule in formatting_rules(ctx) {
        text.push('\n');
        text.push_str(rule);
    }
    text.push_str("\n\n");
    text.push_str(brevity_rules(prefs.brevity_level));
    text
}

// -----------------------------------------------------------------------------
// User prompt body
// -----------------------------------------------------------------------------

fn sections_block(sections: &Sections, include_identifiers: bool) -> Vec<String> {
    [
        (FEATURES_HEADING, &sections.features),
        (IMPROVEMENTS_HEADING, &sections.improvements),
        (BUGFIXES_HEADING, &sections.bugfixes),
        (BREAKING_HEADING, &sections.breaking),
    ]
    .into_iter()
    .map(|(name, issues)| build_section(name, issues, include_identifiers))
    .filter(|s| !s.is_empty())
    .collect()
}

fn extra_sections(level: BrevityLevel, audience: Audience) -> Option<String> {
    let items: Vec<&str> = match level {
        BrevityLevel::Concise => return None,
        BrevityLevel::Detailed => {
            let mut items = vec![
                "- Notable Changes: the two or three changes above with the most impact on readers.",
                "- Upgrade Notes: actions readers must take after upgrading, based only on the changes above.",
            ];
            if audience.is_technical() {
                items.push(
                    "- Technical Details: API, configuration, or migration details drawn from the changes above.",
                );
            }
            items
        }
        BrevityLevel::Comprehensive => vec![
            "- Notable Changes: the changes above with the widest impact, explained in depth.",
            "- Technical Implementation: how the most significant changes work, based on their descriptions.",
            "- Upgrade Guide: step-by-step actions readers must take after upgrading.",
            "- Performance: performance-related changes from the list above.",
            "- Security: security-related changes from the list above.",
        ],
    };
    Some(format!(
        "After the sections above, add the following, leaving out any that the listed issues do not support:\n{}",
        items.join("\n")
    ))
}

fn body(ctx: &PromptContext, args: &BuildPromptArgs) -> String {
    let prefs = &ctx.preferences;
    let summary = match prefs.brevity_level {
        BrevityLevel::Concise => "Start with a one-sentence summary of this release.",
        BrevityLevel::Detailed => {
            "Start with a short executive summary paragraph highlighting the most important changes."
        }
        BrevityLevel::Comprehensive => {
            "Start with an executive summary of two to three paragraphs covering the main themes of this release and their impact on readers."
        }
    };

    let mut parts = vec![summary.to_string()];
    parts.extend(sections_block(&args.sections, args.include_identifiers));
    if let Some(extra) = extra_sections(prefs.brevity_level, prefs.audience) {
        parts.push(extra);
    }
    if let Some(instructions) = present(&args.instructions) {
        parts.push(format!("Additional instructions:\n{}", instructions));
    }
    parts.join("\n\n")
}

fn heading_instruction(format: OutputFormat, version: Option<&str>) -> String {
    let marker = match format {
        OutputFormat::Markdown => "a single H1 heading (\"# \")",
        OutputFormat::Html => "a single <h1> heading",
    };
    match version {
        Some(v) => format!(
            "Begin with {} containing a concise release title that includes version {}.",
            marker, v
        ),
        None => format!("Begin with {} containing a concise release title.", marker),
    }
}

const USER_PREAMBLE: &str = "Write release notes using only the completed issues listed below. \
Each bullet gives an issue title, optionally followed by its description, identifier, and team.";

/// Build the system/user prompt pair. Pure: identical args yield identical
/// output.
pub fn build_prompt(args: &BuildPromptArgs) -> ReleasePrompt {
    let ctx = build_prompt_context(
        args.organization.as_ref(),
        args.ai_context.as_ref(),
        ContentType::ReleaseNotes,
    );

    let mut system_parts = header(&ctx, args);
    system_parts.push(rules(&ctx));
    if let Some(template) = present(&args.template) {
        system_parts.push(format!("Structure hint (follow this layout):\n{}", template));
    }
    if let Some(example) = args
        .ai_context
        .as_ref()
        .and_then(|ai| present(&ai.example_output))
    {
        system_parts.push(format!(
            "Example of the desired output (match its style, not its content):\n{}",
            example
        ));
    }

    let user_prompt = [
        USER_PREAMBLE.to_string(),
        heading_instruction(ctx.preferences.output_format, present(&args.version)),
        body(&ctx, args),
    ]
    .join("\n\n");

    ReleasePrompt {
        system_prompt: system_parts.join("\n\n"),
        user_prompt,
    }
}

impl<S> LinearReleaseService<S> {
    pub fn build_prompt(&self, args: &BuildPromptArgs) -> ReleasePrompt {
        build_prompt(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear::NamedRef;

    fn issue(identifier: &str, title: &str, desc: Option<&str>, team: &str) -> LinearIssueLite {
        LinearIssueLite {
            id: format!("id-{identifier}"),
            identifier: identifier.to_string(),
            title: title.to_string(),
            description: desc.map(str::to_string),
            team: Some(NamedRef {
                id: "team-1".to_string(),
                name: team.to_string(),
            }),
            ..Default::default()
        }
    }

    fn sample_sections() -> Sections {
        Sections {
            features: vec![issue(
                "ENG-1",
                "Add SAML single sign-on",
                Some("Okta and Azure AD are supported"),
                "Identity Squad",
            )],
            improvements: vec![issue("ENG-2", "Faster invoice search", None, "Billing Squad")],
            bugfixes: vec![issue(
                "ENG-3",
                "Fix CSV export encoding",
                Some("Exports now use UTF-8"),
                "Billing Squad",
            )],
            breaking: vec![],
        }
    }

    #[test]
    fn test_build_section_bullet_format() {
        let issues = vec![issue(
            "ENG-9",
            "Dark mode",
            Some("Follows the\n  system theme\n"),
            "Web Squad",
        )];
        assert_eq!(
            build_section("🚀 New Features", &issues, true),
            "## 🚀 New Features\n- Dark mode: Follows the   system theme (ENG-9) — Web Squad"
        );
        assert_eq!(
            build_section("🚀 New Features", &issues, false),
            "## 🚀 New Features\n- Dark mode: Follows the   system theme"
        );
        assert_eq!(build_section(BREAKING_HEADING, &[], true), "");
    }

    #[test]
    fn test_build_section_keeps_whitespace_inside_lines() {
        let issues = vec![
            issue(
                "ENG-10",
                " Retry  uploads",
                Some("Step one:\r\n\r\n    `upload --retry`"),
                "Web Squad",
            ),
            issue("ENG-11", "Blank description", Some("\n  \n"), "Web Squad"),
        ];
        assert_eq!(
            build_section("✨ Improvements", &issues, false),
            "## ✨ Improvements\n-  Retry  uploads: Step one:     `upload --retry`\n- Blank description"
        );
    }

    #[test]
    fn test_build_prompt_is_deterministic() {
        let mut args = BuildPromptArgs::new(sample_sections());
        args.version = Some("2.4.0".to_string());
        args.teams = vec!["Billing".to_string()];
        let a = build_prompt(&args);
        let b = build_prompt(&args);
        assert_eq!(a, b);
    }

    #[test]
    fn test_user_prompt_contains_every_issue_verbatim() {
        let sections = sample_sections();
        let prompt = build_prompt(&BuildPromptArgs::new(sections.clone()));
        for issue in sections
            .features
            .iter()
            .chain(&sections.improvements)
            .chain(&sections.bugfixes)
        {
            assert!(prompt.user_prompt.contains(&issue.title));
            if let Some(ref d) = issue.description {
                assert!(prompt.user_prompt.contains(d.as_str()));
            }
            assert!(prompt.user_prompt.contains(&issue.identifier));
        }
    }

    #[test]
    fn test_identifiers_and_teams_can_be_hidden() {
        let sections = sample_sections();
        let mut args = BuildPromptArgs::new(sections.clone());
        args.include_identifiers = false;
        let prompt = build_prompt(&args);

        for issue in sections
            .features
            .iter()
            .chain(&sections.improvements)
            .chain(&sections.bugfixes)
        {
            assert!(prompt.user_prompt.contains(&issue.title));
            assert!(!prompt.user_prompt.contains(&issue.identifier));
            let team = issue.team.as_ref().map(|t| t.name.as_str()).unwrap_or("");
            assert!(!prompt.user_prompt.contains(team));
        }
    }

    #[test]
    fn test_empty_sections_are_omitted() {
        let prompt = build_prompt(&BuildPromptArgs::new(sample_sections()));
        assert!(!prompt.user_prompt.contains("Breaking Changes"));
        assert!(prompt.user_prompt.contains("## 🚀 New Features"));

        let order = [FEATURES_HEADING, IMPROVEMENTS_HEADING, BUGFIXES_HEADING];
        let positions: Vec<usize> = order
            .iter()
            .map(|h| prompt.user_prompt.find(h).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_breaking_section_rendered_last() {
        let mut sections = sample_sections();
        sections.breaking = vec![issue("ENG-4", "Remove v1 API", None, "API Squad")];
        let prompt = build_prompt(&BuildPromptArgs::new(sections));
        let breaking = prompt.user_prompt.find(BREAKING_HEADING).unwrap();
        let bugs = prompt.user_prompt.find(BUGFIXES_HEADING).unwrap();
        assert!(bugs < breaking);
    }

    #[test]
    fn test_defaults_resolve_like_prompt_context() {
        let prompt = build_prompt(&BuildPromptArgs::new(sample_sections()));
        assert!(prompt.system_prompt.starts_with(
            "You are an expert release notes writer. Write in English for a mixed audience, in a professional tone. Output format: Markdown. Style: detailed."
        ));
        assert!(prompt.system_prompt.contains("Brevity (detailed):"));
        assert!(prompt.system_prompt.contains("Do not use emojis"));
        assert!(prompt.system_prompt.contains("Include metrics only when"));
        assert!(prompt.system_prompt.contains("Leave out internal implementation detail"));
        assert!(!prompt.system_prompt.contains("COMPANY CONTEXT"));
        assert!(!prompt.system_prompt.contains("RELEASE DETAILS"));
        assert!(!prompt.system_prompt.contains("House style"));
    }

    #[test]
    fn test_header_includes_org_and_release_details() {
        let mut args = BuildPromptArgs::new(sample_sections());
        args.organization = Some(Organization {
            name: Some("Acme".to_string()),
            meta_description: Some("Invoicing for small teams".to_string()),
            settings: None,
        });
        args.ai_context = Some(AiContext {
            system_prompt: Some("Always say 'customers', never 'users'.".to_string()),
            example_output: Some("# Acme 1.0\n- Thing".to_string()),
            ..Default::default()
        });
        args.version = Some("3.0.0".to_string());
        args.release_date = Some("2025-06-01".to_string());
        args.date_range = Some(DateRange {
            from: Some("2025-05-01".to_string()),
            to: None,
        });
        args.projects = vec!["Payments".to_string()];
        args.template = Some("Summary, then sections".to_string());

        let prompt = build_prompt(&args);
        let sys = &prompt.system_prompt;
        assert!(sys.contains("- Company: Acme"));
        assert!(sys.contains("- Version: 3.0.0"));
        assert!(sys.contains("- Release date: 2025-06-01"));
        assert!(sys.contains("- Changes completed since 2025-05-01"));
        assert!(sys.contains("- Projects: Payments"));
        assert!(!sys.contains("- Teams:"));
        assert!(sys.contains("House style (mandatory, follow exactly):\nAlways say 'customers'"));
        assert!(sys.contains("Structure hint (follow this layout):\nSummary, then sections"));
        assert!(sys.ends_with("# Acme 1.0\n- Thing"));
        assert!(prompt.user_prompt.contains("includes version 3.0.0"));
    }

    #[test]
    fn test_technical_audience_rules_and_extras() {
        let mut args = BuildPromptArgs::new(sample_sections());
        args.ai_context = Some(AiContext {
            audience: Some("developers".to_string()),
            include_emojis: Some(true),
            include_metrics: Some(false),
            ..Default::default()
        });
        let prompt = build_prompt(&args);
        assert!(prompt.system_prompt.contains("Keep relevant implementation detail"));
        assert!(!prompt.system_prompt.contains("Leave out internal implementation detail"));
        assert!(prompt.system_prompt.contains("Use emojis in section headings"));
        assert!(!prompt.system_prompt.contains("Include metrics only when"));
        assert!(prompt.user_prompt.contains("- Technical Details:"));
        assert!(prompt.user_prompt.contains("- Upgrade Notes:"));
    }

    #[test]
    fn test_brevity_selects_body_template() {
        let mut args = BuildPromptArgs::new(sample_sections());
        args.ai_context = Some(AiContext {
            brevity_level: Some("concise".to_string()),
            ..Default::default()
        });
        args.instructions = Some("Mention the new pricing page.".to_string());
        let concise = build_prompt(&args);
        assert!(concise.user_prompt.contains("one-sentence summary"));
        assert!(!concise.user_prompt.contains("Notable Changes"));
        assert!(concise.system_prompt.contains("Brevity (concise):"));
        assert!(concise
            .user_prompt
            .ends_with("Additional instructions:\nMention the new pricing page."));

        args.ai_context = Some(AiContext {
            brevity_level: Some("comprehensive".to_string()),
            ..Default::default()
        });
        let full = build_prompt(&args);
        for extra in [
            "- Notable Changes:",
            "- Technical Implementation:",
            "- Upgrade Guide:",
            "- Performance:",
            "- Security:",
        ] {
            assert!(full.user_prompt.contains(extra), "missing {extra}");
        }
        assert!(!full.user_prompt.contains("Breaking Changes"));
        assert!(full.system_prompt.contains("Brevity (comprehensive):"));
        assert!(!full.system_prompt.contains("Brevity (detailed):"));
    }
}
