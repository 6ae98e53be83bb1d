use anyhow::{bail, Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use context_bundler::bundles::{BundleUpdate, NewBundle};
use context_bundler::context::{OptimizationRequest, OptimizationStrategy};
use context_bundler::selection::{CodebaseContext, SelectionContext};
use context_bundler::tools::analysis::{ConfigScannerTool, DuplicateFinderTool, ProjectTreeTool};
use context_bundler::tools::search::CodeSearchTool;
use context_bundler::{logging, Assistant, Config};
use regex::RegexBuilder;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "context-bundler")]
#[command(about = "LLM assistant with tool/bundle selection and context optimization", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Print prometheus metrics after the command
    #[arg(long, global = true)]
    print_metrics: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question about the project
    Ask(AskArgs),

    /// Show which strategy, bundles and tools a task would use
    Select(SelectArgs),

    /// Rank project files for a query within a token budget
    #[command(name = "optimize-context")]
    OptimizeContext(OptimizeArgs),

    /// Find duplicated code blocks
    #[command(name = "find-duplicates")]
    FindDuplicates(DuplicateArgs),

    /// Print the project directory tree
    Tree(TreeArgs),

    /// Search project files
    Search(SearchArgs),

    /// Find scattered configuration and suggest centralizing it
    #[command(name = "centralize-config")]
    CentralizeConfig,

    /// Manage bundles
    #[command(subcommand)]
    Bundles(BundleCommands),
}

/// Codebase characteristics forwarded to selection
#[derive(Args, Clone, Default)]
struct CodebaseArgs {
    /// Approximate codebase size in lines
    #[arg(long)]
    size: Option<u64>,

    /// Primary languages, comma separated
    #[arg(long, value_delimiter = ',')]
    languages: Vec<String>,

    /// Frameworks, comma separated
    #[arg(long, value_delimiter = ',')]
    frameworks: Vec<String>,

    /// low, medium or high
    #[arg(long)]
    complexity: Option<String>,
}

impl CodebaseArgs {
    fn into_context(self) -> Option<CodebaseContext> {
        if self.size.is_none() && self.languages.is_empty() && self.frameworks.is_empty() && self.complexity.is_none() {
            return None;
        }
        Some(CodebaseContext {
            size: self.size.unwrap_or(0),
            primary_languages: self.languages,
            frameworks: self.frameworks,
            complexity: self.complexity.unwrap_or_default(),
        })
    }
}

#[derive(Args)]
struct AskArgs {
    question: String,

    #[command(flatten)]
    codebase: CodebaseArgs,
}

#[derive(Args)]
struct SelectArgs {
    task: String,

    #[command(flatten)]
    codebase: CodebaseArgs,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Minimal,
    Smart,
    Full,
}

impl From<StrategyArg> for OptimizationStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Minimal => OptimizationStrategy::Minimal,
            StrategyArg::Smart => OptimizationStrategy::Smart,
            StrategyArg::Full => OptimizationStrategy::Full,
        }
    }
}

#[derive(Args)]
struct OptimizeArgs {
    query: String,

    /// Directory or path fragment to favor
    #[arg(long)]
    focus: Option<String>,

    /// Token budget; defaults to the configured budget
    #[arg(long)]
    budget: Option<usize>,

    #[arg(long, value_enum, default_value = "smart")]
    strategy: StrategyArg,
}

#[derive(Args)]
struct DuplicateArgs {
    /// Lines per compared window
    #[arg(long)]
    window: Option<usize>,
}

#[derive(Args)]
struct TreeArgs {
    #[arg(long)]
    depth: Option<usize>,
}

#[derive(Args)]
struct SearchArgs {
    query: String,

    /// Treat the query as a regular expression
    #[arg(long)]
    regex: bool,
}

#[derive(Subcommand)]
enum BundleCommands {
    /// List bundles
    List {
        /// Include inactive bundles
        #[arg(long)]
        all: bool,
    },

    /// Show one bundle
    Show { id: String },

    /// Create a bundle from a JSON file or flags
    Create(CreateArgs),

    /// Activate or deactivate a bundle
    SetActive {
        id: String,
        #[arg(action = clap::ArgAction::Set)]
        active: bool,
    },

    /// Delete a bundle
    Delete { id: String },

    /// Print the bundle configuration document
    Export,
}

#[derive(Args)]
struct CreateArgs {
    /// JSON file holding the bundle
    #[arg(long, conflicts_with_all = ["name", "tools"])]
    file: Option<PathBuf>,

    #[arg(long)]
    name: Option<String>,

    #[arg(long, default_value = "")]
    description: String,

    /// Tool names, comma separated
    #[arg(long, value_delimiter = ',')]
    tools: Vec<String>,

    /// Trigger phrases, comma separated
    #[arg(long, value_delimiter = ',')]
    triggers: Vec<String>,

    #[arg(long, default_value_t = 1.0)]
    priority: f64,
}

impl CreateArgs {
    fn into_new_bundle(self) -> Result<NewBundle> {
        if let Some(path) = self.file {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            return serde_json::from_str(&raw).with_context(|| format!("Invalid bundle JSON in {}", path.display()));
        }

        let Some(name) = self.name else {
            bail!("either --file or --name is required");
        };
        Ok(NewBundle {
            name,
            description: self.description,
            tools: self.tools,
            auto_trigger: self.triggers,
            priority: self.priority,
            ..NewBundle::default()
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    logging::init(&config.logging, cli.verbose);

    let project = cli
        .project
        .canonicalize()
        .with_context(|| format!("Project path {} does not exist", cli.project.display()))?;
    let assistant = Assistant::build(config, &project)
        .await
        .context("Failed to initialize")?;
    let json = cli.json;

    match cli.command {
        Commands::Ask(args) => {
            let report = assistant
                .ask(&args.question, &project, args.codebase.into_context())
                .await
                .context("Failed to answer question")?;
            if json {
                print_json(&report)?;
            } else {
                println!("{}\n", report.answer);
                println!(
                    "strategy: {} (confidence {:.2})",
                    report.strategy, report.confidence
                );
                if !report.tools_used.is_empty() {
                    println!("tools: {} (~{} tokens)", report.tools_used.join(", "), report.tool_tokens);
                }
                println!(
                    "context: {} files, ~{} tokens, {}ms",
                    report.files_included.len(),
                    report.context_tokens,
                    report.elapsed_ms
                );
                for rec in &report.recommendations {
                    println!("  - {rec}");
                }
            }
        }

        Commands::Select(args) => {
            let mut context = SelectionContext::new(&args.task, &project);
            context.codebase_context = args.codebase.into_context();
            let result = assistant.select(&context).await;
            if json {
                print_json(&*result)?;
            } else {
                println!(
                    "strategy: {} (confidence {:.2})",
                    result.selection_strategy, result.confidence
                );
                println!("bundles: {}", result.selection.bundle_ids().join(", "));
                println!("tools: {}", result.selection.tool_names().join(", "));
                println!(
                    "cost: {}, estimated time: {}s",
                    result.selection.total_token_cost, result.selection.estimated_time
                );
                println!("plan:");
                for step in &result.selection.execution_plan {
                    let mode = if step.can_run_in_parallel { "parallel" } else { "sequential" };
                    println!("  {}. {} [{:?}, {}]", step.order + 1, step.name, step.kind, mode);
                }
                println!("reasoning: {}", result.selection.reasoning);
                for rec in &result.recommendations {
                    println!("  - {rec}");
                }
            }
        }

        Commands::OptimizeContext(args) => {
            let budget = args.budget.unwrap_or(assistant.config().context.default_token_budget);
            let request = OptimizationRequest::new(&project, &args.query, budget)
                .with_focus(args.focus)
                .with_strategy(args.strategy.into());
            let optimized = assistant.optimizer().optimize(&request).await;
            if json {
                print_json(&*optimized)?;
            } else {
                println!(
                    "{} of {} files, ~{} tokens ({} strategy, budget {})",
                    optimized.files.len(),
                    optimized.files_scanned,
                    optimized.estimated_tokens,
                    optimized.strategy,
                    optimized.token_budget
                );
                for file in &optimized.files {
                    println!(
                        "  {:>3}  {:<8}  {}",
                        file.score,
                        file.importance.as_str(),
                        file.path.display()
                    );
                }
            }
        }

        Commands::FindDuplicates(args) => {
            let window = args
                .window
                .unwrap_or(assistant.config().execution.duplicate_window_lines);
            let root = project.clone();
            let groups = tokio::task::spawn_blocking(move || DuplicateFinderTool::find(&root, window)).await?;
            if json {
                print_json(&groups)?;
            } else if groups.is_empty() {
                println!("No duplicated blocks found");
            } else {
                for group in &groups {
                    println!("{} lines duplicated {} times:", group.lines, group.occurrences.len());
                    for location in &group.occurrences {
                        println!("  {}:{}", location.file, location.line);
                    }
                }
            }
        }

        Commands::Tree(args) => {
            let depth = args.depth.unwrap_or(assistant.config().execution.tree_max_depth);
            let root = project.clone();
            let tree = tokio::task::spawn_blocking(move || ProjectTreeTool::render(&root, depth)).await?;
            if json {
                print_json(&tree)?;
            } else {
                println!("{}", tree.tree);
                println!("{} directories, {} files", tree.directories, tree.files);
            }
        }

        Commands::Search(args) => {
            let pattern = if args.regex {
                RegexBuilder::new(&args.query)
                    .case_insensitive(true)
                    .build()
                    .context("Invalid search pattern")?
            } else {
                CodeSearchTool::keyword_pattern(&args.query)?
            };
            let tool = CodeSearchTool::new(assistant.config().execution.search_max_results);
            let matches = tool.search(&project, pattern).await?;
            if json {
                print_json(&matches)?;
            } else {
                for m in &matches {
                    println!("{}:{}: {}", m.file, m.line, m.text);
                }
                println!("{} matches", matches.len());
            }
        }

        Commands::CentralizeConfig => {
            let root = project.clone();
            let report = tokio::task::spawn_blocking(move || ConfigScannerTool::scan(&root)).await?;
            if json {
                print_json(&report)?;
            } else {
                println!("config files: {}", report.config_files.join(", "));
                println!("environment variables: {}", report.env_vars.len());
                for (name, locations) in &report.env_vars {
                    println!("  {name} ({} uses)", locations.len());
                }
                println!("hard-coded URLs: {}", report.hardcoded_urls.len());
                for suggestion in &report.suggestions {
                    println!("  - {suggestion}");
                }
            }
        }

        Commands::Bundles(command) => run_bundles(&assistant, command, json).await?,
    }

    if cli.print_metrics {
        eprintln!("{}", assistant.metrics().render());
    }
    Ok(())
}

async fn run_bundles(assistant: &Assistant, command: BundleCommands, json: bool) -> Result<()> {
    let registry = assistant.registry();

    match command {
        BundleCommands::List { all } => {
            let bundles = if all {
                registry.list_bundles()
            } else {
                registry.active_bundles()
            };
            if json {
                print_json(&bundles)?;
            } else {
                for bundle in &bundles {
                    let marker = if bundle.is_default { "default" } else { "custom" };
                    println!(
                        "{:<22} {:<26} priority {:>4}  [{}] {}",
                        bundle.id,
                        bundle.name,
                        bundle.priority,
                        marker,
                        bundle.tools.join(", ")
                    );
                }
            }
        }

        BundleCommands::Show { id } => {
            let bundle = registry
                .get_bundle(&id)
                .with_context(|| format!("Bundle not found: {id}"))?;
            print_json(&bundle)?;
        }

        BundleCommands::Create(args) => {
            let bundle = registry.create_bundle(args.into_new_bundle()?).await?;
            if json {
                print_json(&bundle)?;
            } else {
                println!("Created bundle {}", bundle.id);
            }
        }

        BundleCommands::SetActive { id, active } => {
            let update = BundleUpdate {
                is_active: Some(active),
                ..BundleUpdate::default()
            };
            let bundle = registry.update_bundle(&id, update).await?;
            println!("Bundle {} is now {}", bundle.id, if bundle.is_active { "active" } else { "inactive" });
        }

        BundleCommands::Delete { id } => {
            registry.delete_bundle(&id).await?;
            println!("Deleted bundle {id}");
        }

        BundleCommands::Export => print_json(&registry.export())?,
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
