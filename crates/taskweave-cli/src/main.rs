//! CLI entry point for Taskweave.
//!
//! This binary provides the `taskweave` command with operator-facing
//! subcommands: the routing debug surface, the model catalog listing, token
//! estimation, and offline plan validation.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use taskweave_agent::{
    ConversationMode, ModelCatalog, RouteRequest, Settings, TaskPlan, analyze,
    estimate_tokens, validate_plan,
};
use taskweave_agent::llm::Attachment;
use taskweave_tools::{
    ActionKind, Tool, ToolCategory, ToolContext, ToolMetadata, ToolOutcome, ToolRegistry,
};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// Taskweave — goal decomposition and model routing for agentic workflows.
#[derive(Parser)]
#[command(
    name = "taskweave",
    version,
    about = "Taskweave — goal decomposition and model routing",
    long_about = "Operator tooling for the Taskweave agent core: inspect routing \
                  decisions, list the model catalog, estimate token budgets, and \
                  validate plans offline."
)]
struct Cli {
    /// Path to a settings TOML file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how a message would be routed and why.
    Route {
        /// The message text to analyze.
        text: String,

        /// Treat the turn as agentic (tool execution required).
        #[arg(long)]
        agentic: bool,

        /// Number of image attachments carried by the message.
        #[arg(long, default_value_t = 0)]
        images: u32,

        /// Tokens already accumulated in the conversation.
        #[arg(long, default_value_t = 0)]
        context_tokens: u32,

        /// Force a specific model by catalog key.
        #[arg(long)]
        model: Option<String>,
    },

    /// List the model catalog.
    Models,

    /// Estimate the token count of a file (or stdin).
    Estimate {
        /// File to estimate; reads stdin when omitted.
        file: Option<PathBuf>,
    },

    /// Validate a plan JSON file against a list of tool names.
    CheckPlan {
        /// The plan JSON file.
        file: PathBuf,

        /// Comma-separated tool names considered registered.
        #[arg(long, value_delimiter = ',')]
        tools: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let settings =
        Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    tracing::debug!(provider = %settings.provider, "settings resolved");

    match cli.command {
        Commands::Route {
            text,
            agentic,
            images,
            context_tokens,
            model,
        } => cmd_route(&text, agentic, images, context_tokens, model.as_deref()),
        Commands::Models => cmd_models(),
        Commands::Estimate { file } => cmd_estimate(file),
        Commands::CheckPlan { file, tools } => cmd_check_plan(&file, &tools),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

// ---------------------------------------------------------------------------
// Subcommand: route
// ---------------------------------------------------------------------------

fn cmd_route(
    text: &str,
    agentic: bool,
    images: u32,
    context_tokens: u32,
    model_override: Option<&str>,
) -> Result<()> {
    let catalog = ModelCatalog::builtin();
    let attachments: Vec<Attachment> = (0..images)
        .map(|i| Attachment::image(format!("image_{i}.png")))
        .collect();

    let result = analyze(
        &RouteRequest {
            text,
            attachments: &attachments,
            mode: if agentic {
                ConversationMode::Agentic
            } else {
                ConversationMode::Chat
            },
            context_tokens,
            override_key: model_override,
        },
        &catalog,
    );

    println!("model:            {} ({})", result.model.key, result.model.display_name);
    println!("reason:           {}", result.reason);
    println!("estimated tokens: {}", result.estimated_tokens);
    println!("complexity:       {:?}", result.complexity);
    println!(
        "flags:            images={} tools={} reasoning={} multi_step={}",
        result.flags.has_images,
        result.flags.needs_tools,
        result.flags.deep_reasoning,
        result.flags.multi_step,
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: models
// ---------------------------------------------------------------------------

fn cmd_models() -> Result<()> {
    let catalog = ModelCatalog::builtin();

    for model in catalog.all() {
        let capabilities: Vec<String> =
            model.capabilities.iter().map(|c| c.to_string()).collect();
        println!("{} — {}", model.key, model.display_name);
        println!("  backend:      {}", model.model_id);
        println!("  capabilities: {}", capabilities.join(", "));
        println!(
            "  context:      {} tokens (compaction at {})",
            model.context_limit, model.compaction_threshold
        );
        println!(
            "  cost:         ${:.2}/M in, ${:.2}/M out",
            model.input_cost_per_mtok, model.output_cost_per_mtok
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: estimate
// ---------------------------------------------------------------------------

fn cmd_estimate(file: Option<PathBuf>) -> Result<()> {
    let text = match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };

    let tokens = estimate_tokens(&text);
    println!("characters:       {}", text.chars().count());
    println!("estimated tokens: {tokens}");

    let catalog = ModelCatalog::builtin();
    for model in catalog.all() {
        let share = f64::from(tokens) / f64::from(model.context_limit) * 100.0;
        println!("  {:<16} {:>6.2}% of context", model.key, share);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: check-plan
// ---------------------------------------------------------------------------

/// A name-only stand-in so offline validation can resolve tool references.
struct DeclaredTool {
    name: String,
}

#[async_trait]
impl Tool for DeclaredTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            display_name: self.name.replace('_', " "),
            category: ToolCategory::Analysis,
            action: ActionKind::Read,
            requires_approval: false,
            is_reversible: true,
            entity: String::new(),
            keywords: vec![],
            examples: vec![],
        }
    }

    async fn execute(
        &self,
        _params: Value,
        _ctx: &ToolContext,
    ) -> taskweave_tools::Result<ToolOutcome> {
        Ok(ToolOutcome::Completed(Value::Null))
    }
}

fn cmd_check_plan(file: &PathBuf, tools: &[String]) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let plan: TaskPlan = serde_json::from_str(&content).context("failed to parse plan JSON")?;

    let registry = ToolRegistry::new();
    for name in tools {
        registry.register(Arc::new(DeclaredTool { name: name.clone() }));
    }

    let errors = validate_plan(&plan, &registry);
    if errors.is_empty() {
        println!(
            "plan {} is valid ({} steps, {:?})",
            plan.id,
            plan.steps.len(),
            plan.estimated_duration
        );
        Ok(())
    } else {
        for error in &errors {
            eprintln!("error: {error}");
        }
        anyhow::bail!("plan failed validation with {} error(s)", errors.len());
    }
}
