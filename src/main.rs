//! CLI entry point: loads a project's action documents, resolves them
//! into a dependency-ordered graph, and optionally runs the Solver
//! against that graph.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use garden_core::cache::ResultCache;
use garden_core::config::{
    convert_module, load_project, render_template, ActionConfig, ConfigTemplate, DocumentKind, ModuleConfig,
    RenderTemplate, Validator,
};
use garden_core::context::StaticContext;
use garden_core::error::{ConfigurationError, ExitCode, FixSuggestion, GardenError};
use garden_core::graph::build_graph;
use garden_core::limits::ResourceLimits;
use garden_core::plugin::Registry;
use garden_core::solver::{CancelHandle, Solver};

#[derive(Parser)]
#[command(name = "garden")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Resolve and run a project's build/deploy/run/test actions", long_about = None)]
struct Cli {
    /// Project root to scan for `*.garden.yml` documents.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Glob patterns (relative to `root`) to restrict the scan to.
    #[arg(long = "scan-include", global = true)]
    scan_include: Vec<String>,

    /// Glob patterns (relative to `root`) to exclude from the scan.
    #[arg(long = "scan-exclude", global = true)]
    scan_exclude: Vec<String>,

    /// Override a template variable, `key=value`; may be repeated.
    #[arg(long = "var", global = true)]
    vars: Vec<String>,

    /// Load additional environment variables from a `.env`-style file.
    #[arg(long = "env", global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate every action document, without building a graph.
    Validate,
    /// Build the action graph and print its dependency-ordered actions.
    Resolve,
    /// Build the action graph and run it through the Solver.
    Run {
        /// Maximum number of tasks to execute concurrently.
        #[arg(long)]
        concurrency: Option<usize>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("GARDEN_LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    if let Some(env_file) = &cli.env_file {
        if let Err(e) = dotenvy::from_path(env_file) {
            tracing::warn!("failed to load env file {}: {e}", env_file.display());
        }
    } else {
        let _ = dotenvy::dotenv();
    }

    if let Err(e) = run(cli).await {
        eprintln!("{} {e}", "error:".red().bold());
        if let Some(hint) = e.fix_suggestion() {
            eprintln!("{} {hint}", "hint:".yellow().bold());
        }
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), GardenError> {
    let documents = load_project(&cli.root, &cli.scan_include, &cli.scan_exclude)?;
    let validator = Validator::new();

    let mut by_file: std::collections::BTreeMap<PathBuf, Vec<garden_core::config::RawDocument>> = std::collections::BTreeMap::new();
    for doc in &documents {
        by_file.entry(doc.path.clone()).or_default().push(doc.clone());
    }
    for (path, docs) in &by_file {
        let result = validator.validate_documents(path.clone(), docs);
        if let Some(first) = result.errors.into_iter().next() {
            return Err(first.into());
        }
        for warning in result.warnings {
            println!("{} {warning}", "warning:".yellow().bold());
        }
    }

    let mut actions = Vec::new();
    for doc in &documents {
        let Some(_kind) = doc.kind.and_then(|k| k.as_action_kind()) else { continue };
        let mut action: ActionConfig = serde_yaml::from_value(doc.raw.clone())?;
        action.internal.config_file_path = doc.path.clone();
        action.internal.base_path = doc.path.parent().unwrap_or(&cli.root).to_path_buf();
        actions.push(action);
    }

    let registry = Arc::new(Registry::new());

    for doc in &documents {
        if doc.kind == Some(DocumentKind::Module) {
            let module: ModuleConfig = serde_yaml::from_value(doc.raw.clone())?;
            if !module.disabled {
                actions.extend(convert_module(&module, &registry)?);
            }
        }
    }

    let templates: std::collections::HashMap<String, ConfigTemplate> = documents
        .iter()
        .filter(|d| d.kind == Some(DocumentKind::ConfigTemplate))
        .map(|d| serde_yaml::from_value::<ConfigTemplate>(d.raw.clone()).map(|t| (t.name.clone(), t)))
        .collect::<Result<_, serde_yaml::Error>>()?;

    for doc in &documents {
        if doc.kind != Some(DocumentKind::RenderTemplate) {
            continue;
        }
        let instance: RenderTemplate = serde_yaml::from_value(doc.raw.clone())?;
        let template = templates.get(&instance.template).ok_or_else(|| {
            GardenError::from(ConfigurationError::MissingField {
                kind: "RenderTemplate".into(),
                name: instance.name.clone(),
                field: "template".into(),
            })
        })?;
        let enclosing = StaticContext::new();
        for fragment in render_template(template, &instance, &enclosing)? {
            let fragment_kind = fragment.get("kind").and_then(|k| k.as_str()).unwrap_or_default();
            if fragment_kind == "Module" {
                let module: ModuleConfig = serde_yaml::from_value(fragment)?;
                if !module.disabled {
                    actions.extend(convert_module(&module, &registry)?);
                }
            } else {
                let mut action: ActionConfig = serde_yaml::from_value(fragment)?;
                action.internal.config_file_path = doc.path.clone();
                action.internal.base_path = doc.path.parent().unwrap_or(&cli.root).to_path_buf();
                actions.push(action);
            }
        }
    }

    let mut validation_errors = Vec::new();
    for action in &actions {
        validation_errors.extend(validator.validate_action_config(action));
    }
    validation_errors.extend(validator.detect_duplicate_actions(&actions));

    if let Some(first) = validation_errors.into_iter().next() {
        return Err(first.into());
    }

    apply_var_overrides(&mut actions, &cli.vars);

    match cli.command {
        Commands::Validate => {
            println!("{} {} action(s) across {} document(s)", "ok:".green().bold(), actions.len(), documents.len());
            Ok(())
        }
        Commands::Resolve => {
            let report = build_graph(actions, &registry).await?;
            for warning in &report.warnings {
                println!("{} {warning}", "warning:".yellow().bold());
            }
            for action_ref in report.graph.topological_order() {
                let action = report.graph.get(action_ref).expect("ordered ref present in graph");
                println!("{:<24} {}", action_ref.to_string(), action.version.as_str());
            }
            Ok(())
        }
        Commands::Run { concurrency } => {
            let report = build_graph(actions, &registry).await?;
            for warning in &report.warnings {
                println!("{} {warning}", "warning:".yellow().bold());
            }
            let graph = Arc::new(report.graph);

            let cache_root = cli.root.join(".garden").join("cache");
            let cache = Arc::new(ResultCache::new(cache_root, Duration::from_secs(24 * 3600)));
            let mut limits = ResourceLimits::default();
            if let Some(n) = concurrency {
                limits.max_concurrency = n.max(1);
            }

            let solver = Solver::new(graph, registry, cache, limits);
            let cancel = CancelHandle::new();
            let cancel_for_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel_for_signal.cancel();
                }
            });

            let solver_report = solver.run(cancel).await?;
            for (task_id, outcome) in &solver_report.outcomes {
                println!("{task_id}: {outcome:?}");
            }
            if solver_report.succeeded() {
                println!("{}", "run complete".green().bold());
                Ok(())
            } else {
                eprintln!("{}", "run failed: one or more tasks did not complete".red().bold());
                std::process::exit(1);
            }
        }
    }
}

fn apply_var_overrides(actions: &mut [ActionConfig], vars: &[String]) {
    for raw in vars {
        let Some((key, value)) = raw.split_once('=') else { continue };
        for action in actions.iter_mut() {
            action.variables.insert(key.to_string(), serde_yaml::Value::String(value.to_string()));
        }
    }
}
