//! `shipnotes`: draft release notes from completed Linear issues.
//!
//! One `LinearClient` and one text generator are built per process and
//! injected into the pipeline.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;

use shipnotes_lib::config::{config_path, load_config, load_config_with, Config};
use shipnotes_lib::generation::{create_generator, GenerateOptions};
use shipnotes_lib::linear::client::LinearClient;
use shipnotes_lib::linear::{AggregationInput, DateRange, IssueFilters, LinearReleaseService};
use shipnotes_lib::{
    PipelineError, PipelineFailure, PipelineOutcome, ReleaseNotesPipeline, ReleaseRequest,
};

#[derive(Debug, Parser)]
#[command(
    name = "shipnotes",
    about = "Draft release notes from the Linear issues your team completed"
)]
struct Cli {
    /// Config file (defaults to ~/.shipnotes/config.json)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Linear team ID. The first is queried server-side; all are filtered locally.
    #[arg(
        long = "team",
        value_name = "TEAM_ID",
        required_unless_present_any = ["check_connection", "list_teams"]
    )]
    teams: Vec<String>,

    /// Team display name for the prompt header. Looked up when omitted.
    #[arg(long = "team-name", value_name = "NAME")]
    team_names: Vec<String>,

    #[arg(long = "project", value_name = "PROJECT_ID")]
    projects: Vec<String>,

    #[arg(long = "project-name", value_name = "NAME")]
    project_names: Vec<String>,

    /// Start of the window (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    from: Option<String>,

    /// End of the window, inclusive
    #[arg(long)]
    to: Option<String>,

    /// Keep only issues in these state types (e.g. completed)
    #[arg(long = "state-type", value_name = "TYPE")]
    state_types: Vec<String>,

    /// Keep only issues carrying at least one of these labels
    #[arg(long = "label", value_name = "LABEL")]
    labels: Vec<String>,

    /// Minimum priority, 0-5
    #[arg(long)]
    min_priority: Option<i32>,

    #[arg(long)]
    page_size: Option<u32>,

    /// Release version, e.g. 2.4.0
    #[arg(long)]
    version: Option<String>,

    #[arg(long)]
    release_date: Option<String>,

    /// Extra guidance passed through to the writer
    #[arg(long)]
    instructions: Option<String>,

    /// Free-text layout hint
    #[arg(long)]
    template: Option<String>,

    /// Hide issue identifiers and team names
    #[arg(long)]
    no_identifiers: bool,

    /// Print the prompt pair instead of calling the AI provider
    #[arg(long)]
    dry_run: bool,

    /// Verify the Linear API key and exit
    #[arg(long)]
    check_connection: bool,

    /// List the teams visible to the API key and exit
    #[arg(long)]
    list_teams: bool,
}

fn load(cli: &Cli) -> Result<Config> {
    match cli.config {
        Some(ref path) => load_config_with(path, |key| std::env::var(key).ok())
            .with_context(|| format!("loading {}", path.display())),
        None => load_config().with_context(|| match config_path() {
            Ok(path) => format!("loading {}", path.display()),
            Err(_) => "loading config".to_string(),
        }),
    }
}

fn build_request(cli: &Cli, config: &Config, team_names: Vec<String>) -> ReleaseRequest {
    let date_range = (cli.from.is_some() || cli.to.is_some()).then(|| DateRange {
        from: cli.from.clone(),
        to: cli.to.clone(),
    });

    let has_filters =
        !cli.state_types.is_empty() || !cli.labels.is_empty() || cli.min_priority.is_some();
    let issue_filters = has_filters.then(|| IssueFilters {
        state_types: cli.state_types.clone(),
        labels: cli.labels.clone(),
        min_priority: cli.min_priority,
    });

    ReleaseRequest {
        aggregation: AggregationInput {
            teams: cli.teams.clone(),
            projects: (!cli.projects.is_empty()).then(|| cli.projects.clone()),
            date_range,
            issue_filters,
            page_size: Some(cli.page_size.unwrap_or(config.linear.page_size)),
        },
        organization: config.organization.clone(),
        ai_context: config.ai_context.clone(),
        version: cli.version.clone(),
        release_date: cli.release_date.clone(),
        instructions: cli.instructions.clone(),
        template: cli.template.clone(),
        team_names,
        project_names: cli.project_names.clone(),
        include_identifiers: !cli.no_identifiers,
        prompt_only: cli.dry_run,
    }
}

/// Map team IDs to names. Lookup failures only cost the header line.
async fn resolve_team_names(client: &LinearClient, token: &str, ids: &[String]) -> Vec<String> {
    match client.get_teams(token).await {
        Ok(Some(teams)) => {
            let by_id: HashMap<&str, &str> = teams
                .iter()
                .map(|t| (t.id.as_str(), t.name.as_str()))
                .collect();
            ids.iter()
                .filter_map(|id| by_id.get(id.as_str()).map(|n| n.to_string()))
                .collect()
        }
        Ok(None) => Vec::new(),
        Err(e) => {
            log::warn!("Could not look up team names: {}", e);
            Vec::new()
        }
    }
}

fn require_token(config: &Config) -> Result<String> {
    match config.linear.api_key.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => Ok(t.to_string()),
        _ => bail!("Linear API key not configured: set LINEAR_API_KEY or linear.apiKey in ~/.shipnotes/config.json"),
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load(&cli)?;
    let client = Arc::new(LinearClient::new().with_endpoint(config.linear.endpoint.clone()));

    if cli.check_connection {
        let token = require_token(&config)?;
        let status = client.test_connection(&token).await;
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(if status.success {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    if cli.list_teams {
        let token = require_token(&config)?;
        for team in client.get_teams(&token).await?.unwrap_or_default() {
            println!(
                "{}\t{}\t{}",
                team.id,
                team.key.as_deref().unwrap_or("-"),
                team.name
            );
        }
        return Ok(ExitCode::SUCCESS);
    }

    let token = config.linear.api_key.clone().unwrap_or_default();
    let team_names = if cli.team_names.is_empty() && !token.trim().is_empty() {
        resolve_team_names(&client, &token, &cli.teams).await
    } else {
        cli.team_names.clone()
    };

    let generator = if cli.dry_run {
        None
    } else {
        Some(create_generator(&config.ai)?)
    };

    let pipeline =
        ReleaseNotesPipeline::new(LinearReleaseService::new(Arc::clone(&client)), generator)
            .with_options(GenerateOptions::from_config(&config.ai));
    let request = build_request(&cli, &config, team_names);

    match pipeline.run(&token, &request).await {
        Ok(PipelineOutcome::NoIssues) => {
            eprintln!("No completed issues matched the filters; nothing to draft.");
            Ok(ExitCode::SUCCESS)
        }
        Ok(PipelineOutcome::Drafted(draft)) => {
            log::info!(
                "Drafted \"{}\" from {} issues",
                draft.title,
                draft.total_issues
            );
            println!("{}", draft.content);
            Ok(ExitCode::SUCCESS)
        }
        Ok(PipelineOutcome::PromptOnly {
            prompt,
            total_issues,
            ..
        }) => {
            log::info!("Built prompt from {} issues", total_issues);
            println!("=== SYSTEM PROMPT ===\n{}\n", prompt.system_prompt);
            println!("=== USER PROMPT ===\n{}", prompt.user_prompt);
            Ok(ExitCode::SUCCESS)
        }
        Err(PipelineError::Validation(result)) => {
            eprintln!("Invalid request:");
            for e in &result.errors {
                eprintln!("  {}: {}", e.field, e.message);
            }
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            let failure = PipelineFailure::from(&e);
            eprintln!("error: {}", failure.message);
            eprintln!("{}", failure.recovery_suggestion);
            Ok(ExitCode::FAILURE)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
