use std::collections::HashMap;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use log::debug;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use astra_core::differ::{create_plan, destroy_plan};
use astra_core::effect::Effect;
use astra_core::interpreter::{EffectOutcome, Interpreter};
use astra_core::plan::Plan;
use astra_core::provider::Provider;
use astra_core::resource::{Resource, ResourceId, State, Value};
use astra_core::schema::ResourceSchema;
use astra_provider::config::{MAX_DURATION_SECS, WaitSettings};
use astra_provider::models::DatabaseStatus;
use astra_provider::provider::Budget;
use astra_provider::resources::database;
use astra_provider::{AstraProvider, ProviderConfig};

#[derive(Parser)]
#[command(name = "astra")]
#[command(about = "Manage DataStax Astra resources", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show execution plan without applying changes
    Plan {
        /// Path to resource file
        #[arg(default_value = "astra.json")]
        file: PathBuf,
    },
    /// Apply changes to reach the desired state
    Apply {
        /// Path to resource file
        #[arg(default_value = "astra.json")]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Destroy all resources defined in the resource file
    Destroy {
        /// Path to resource file
        #[arg(default_value = "astra.json")]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Read a single resource by its identifier
    Read {
        /// Resource type (e.g. database, keyspace, cdc)
        resource_type: String,
        /// Remote identifier (e.g. database UUID, database_id/keyspace)
        identifier: String,
    },
    /// Wait until a database reaches a status
    Wait {
        /// Database UUID
        database_id: String,

        #[arg(long, default_value = "ACTIVE")]
        status: String,

        /// Give up after this many seconds
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..=MAX_DURATION_SECS as u64))]
        timeout: Option<u64>,

        /// Seconds between status checks
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..=MAX_DURATION_SECS as u64))]
        interval: Option<u64>,
    },
    /// Generate shell completions
    Completions {
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        on_signal.cancel();
    });

    let result = match cli.command {
        Commands::Plan { file } => run_plan(&file).await,
        Commands::Apply { file, auto_approve } => run_apply(&file, auto_approve, cancel).await,
        Commands::Destroy { file, auto_approve } => {
            run_destroy(&file, auto_approve, cancel).await
        }
        Commands::Read {
            resource_type,
            identifier,
        } => run_read(&resource_type, &identifier).await,
        Commands::Wait {
            database_id,
            status,
            timeout,
            interval,
        } => run_wait(&database_id, &status, timeout, interval, cancel).await,
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "astra", &mut io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

// =============================================================================
// Resource file
// =============================================================================

/// Desired resources plus the identifiers of objects already created
#[derive(Debug, Default, Serialize, Deserialize)]
struct ResourceFile {
    /// Provider block: credentials, endpoints and wait overrides
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    provider: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    resources: Vec<ResourceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResourceEntry {
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
    /// Remote identifier, recorded after creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    identifier: Option<String>,
    /// Data sources are only read
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    data: bool,
}

impl ResourceEntry {
    fn id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }

    fn to_resource(&self) -> Result<Resource, String> {
        let mut resource = Resource::new(&self.resource_type, &self.name).with_read_only(self.data);
        for (key, value) in &self.attributes {
            let value = Value::from_json(value).ok_or_else(|| {
                format!(
                    "{}.{}: unsupported value for '{}'",
                    self.resource_type, self.name, key
                )
            })?;
            resource.attributes.insert(key.clone(), value);
        }
        // Data sources are looked up by identifier
        if self.data
            && let Some(identifier) = &self.identifier
        {
            resource
                .attributes
                .insert("id".to_string(), Value::from(identifier.as_str()));
        }
        Ok(resource)
    }
}

fn load_resource_file(file: &Path) -> Result<ResourceFile, String> {
    let content = fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;
    let parsed: ResourceFile = serde_json::from_str(&content)
        .map_err(|e| format!("Parse error in {}: {}", file.display(), e))?;

    let mut seen = std::collections::HashSet::new();
    for entry in &parsed.resources {
        if !seen.insert(entry.id()) {
            return Err(format!(
                "Duplicate resource {}.{}",
                entry.resource_type, entry.name
            ));
        }
    }
    debug!("Loaded {} resources from {}", parsed.resources.len(), file.display());
    Ok(parsed)
}

fn save_resource_file(file: &Path, contents: &ResourceFile) -> Result<(), String> {
    let json = serde_json::to_string_pretty(contents)
        .map_err(|e| format!("Failed to serialize resources: {}", e))?;
    fs::write(file, json + "\n").map_err(|e| format!("Failed to write {}: {}", file.display(), e))
}

/// Environment first, then the file's provider block on top
fn provider_config(file: &ResourceFile) -> Result<ProviderConfig, String> {
    let attributes: HashMap<String, Value> = file
        .provider
        .iter()
        .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
        .collect();
    ProviderConfig::from_attributes(&attributes).map_err(|e| e.to_string())
}

fn build_provider(config: ProviderConfig, cancel: CancellationToken) -> Result<AstraProvider, String> {
    AstraProvider::new(config)
        .map(|p| p.with_cancellation(cancel))
        .map_err(|e| format!("Failed to initialize provider: {}", e))
}

/// Resolve the desired resources: unknown types and invalid attributes fail here
fn desired_resources(
    file: &ResourceFile,
    schemas: &HashMap<String, ResourceSchema>,
) -> Result<Vec<Resource>, String> {
    let mut resources = Vec::new();
    let mut all_errors = Vec::new();

    for entry in &file.resources {
        let mut resource = entry.to_resource()?;
        let Some(schema) = schemas.get(&entry.resource_type) else {
            all_errors.push(format!(
                "{}.{}: unknown resource type",
                entry.resource_type, entry.name
            ));
            continue;
        };
        if resource.is_data_source() {
            resources.push(resource);
            continue;
        }
        schema.apply_defaults(&mut resource.attributes);
        if let Err(errors) = schema.validate(&resource.attributes) {
            for error in errors {
                all_errors.push(format!(
                    "{}.{}: {}",
                    entry.resource_type, entry.name, error
                ));
            }
        }
        resources.push(resource);
    }

    if all_errors.is_empty() {
        Ok(resources)
    } else {
        Err(all_errors.join("\n"))
    }
}

async fn read_states(
    provider: &AstraProvider,
    file: &ResourceFile,
) -> Result<HashMap<ResourceId, State>, String> {
    let mut states = HashMap::new();
    for entry in file.resources.iter().filter(|e| !e.data) {
        let id = entry.id();
        let state = provider
            .read(&id, entry.identifier.as_deref())
            .await
            .map_err(|e| format!("Failed to read state: {}", e))?;
        states.insert(id, state);
    }
    Ok(states)
}

async fn build_plan(file: &ResourceFile, provider: &AstraProvider) -> Result<Plan, String> {
    let desired = desired_resources(file, provider.schemas())?;
    let states = read_states(provider, file).await?;
    Ok(create_plan(&desired, &states, provider.schemas()))
}

fn confirm(prompt: &str) -> Result<bool, String> {
    print!("{} ", prompt.yellow().bold());
    io::stdout().flush().map_err(|e| e.to_string())?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(|e| e.to_string())?;
    Ok(answer.trim() == "yes")
}

// =============================================================================
// Commands
// =============================================================================

async fn run_plan(file: &Path) -> Result<(), String> {
    let parsed = load_resource_file(file)?;
    let provider = build_provider(provider_config(&parsed)?, CancellationToken::new())?;
    let plan = build_plan(&parsed, &provider).await?;
    print_plan(&plan);
    Ok(())
}

async fn run_apply(file: &Path, auto_approve: bool, cancel: CancellationToken) -> Result<(), String> {
    let mut parsed = load_resource_file(file)?;
    let provider = build_provider(provider_config(&parsed)?, cancel)?;
    let plan = build_plan(&parsed, &provider).await?;

    if plan.mutation_count() == 0 {
        println!("{}", "No changes needed.".green());
        return Ok(());
    }

    print_plan(&plan);
    println!();
    if !auto_approve && !confirm("Apply these changes? Only 'yes' will be accepted:")? {
        println!("{}", "Apply cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let result = Interpreter::new(provider).apply(&plan).await;
    let recorded = report_outcomes(&plan, &result.outcomes);
    record_identifiers(&mut parsed, &recorded);
    save_resource_file(file, &parsed)?;

    println!();
    if result.is_success() {
        println!(
            "{}",
            format!("Apply complete! {} changes applied.", result.success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Apply failed. {} succeeded, {} failed.",
            result.success_count, result.failure_count
        ))
    }
}

async fn run_destroy(
    file: &Path,
    auto_approve: bool,
    cancel: CancellationToken,
) -> Result<(), String> {
    let mut parsed = load_resource_file(file)?;
    if parsed.resources.is_empty() {
        println!("{}", "No resources defined in configuration.".yellow());
        return Ok(());
    }

    let provider = build_provider(provider_config(&parsed)?, cancel)?;
    let desired = desired_resources(&parsed, provider.schemas())?;
    let states = read_states(&provider, &parsed).await?;
    let plan = destroy_plan(&desired, &states);

    if plan.is_empty() {
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    }

    print_plan(&plan);
    println!();
    if !auto_approve && !confirm("Destroy these resources? Only 'yes' will be accepted:")? {
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    let result = Interpreter::new(provider).apply(&plan).await;
    let recorded = report_outcomes(&plan, &result.outcomes);
    record_identifiers(&mut parsed, &recorded);
    save_resource_file(file, &parsed)?;

    println!();
    if result.is_success() {
        println!(
            "{}",
            format!("Destroy complete! {} resources destroyed.", result.success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Destroy failed. {} succeeded, {} failed.",
            result.success_count, result.failure_count
        ))
    }
}

async fn run_read(resource_type: &str, identifier: &str) -> Result<(), String> {
    let config = ProviderConfig::from_env().map_err(|e| e.to_string())?;
    let provider = build_provider(config, CancellationToken::new())?;

    let state = provider
        .read(&ResourceId::new(resource_type, "cli"), Some(identifier))
        .await
        .map_err(|e| e.to_string())?;
    if !state.exists {
        return Err(format!("{} {} not found", resource_type, identifier));
    }

    let schema = provider.schemas().get(resource_type);
    let mut keys: Vec<&String> = state.attributes.keys().collect();
    keys.sort();
    for key in keys {
        let shown = if schema.is_some_and(|s| s.is_sensitive(key)) {
            "(sensitive)".dimmed().to_string()
        } else {
            format_value(&state.attributes[key])
        };
        println!("{} = {}", key.bold(), shown);
    }
    Ok(())
}

async fn run_wait(
    database_id: &str,
    status: &str,
    timeout: Option<u64>,
    interval: Option<u64>,
    cancel: CancellationToken,
) -> Result<(), String> {
    let status = parse_database_status(status)?;
    let config = ProviderConfig::from_env().map_err(|e| e.to_string())?;
    let defaults = config.waits.database_create;
    let settings = WaitSettings {
        interval: interval.map(Duration::from_secs).unwrap_or(defaults.interval),
        timeout: timeout.map(Duration::from_secs).unwrap_or(defaults.timeout),
    };
    let provider = build_provider(config, cancel)?;

    let db = database::wait_for_status(&provider, database_id, status, Budget::start(settings))
        .await
        .map_err(|e| e.to_string())?;
    println!(
        "{} database {} is {}",
        "✓".green(),
        db.id,
        db.status.to_string().bold()
    );
    Ok(())
}

fn parse_database_status(status: &str) -> Result<DatabaseStatus, String> {
    let parsed: DatabaseStatus =
        serde_json::from_value(serde_json::Value::String(status.to_uppercase()))
            .map_err(|e| format!("Invalid status '{}': {}", status, e))?;
    if parsed == DatabaseStatus::Unknown {
        return Err(format!("Unknown database status '{}'", status));
    }
    Ok(parsed)
}

// =============================================================================
// Output
// =============================================================================

/// Print each effect's result and return the identifier each resource ends with
fn report_outcomes(
    plan: &Plan,
    outcomes: &[Result<EffectOutcome, astra_core::provider::ProviderError>],
) -> Vec<(ResourceId, Option<String>)> {
    let mut recorded = Vec::new();
    for (effect, outcome) in plan.effects().iter().zip(outcomes) {
        match outcome {
            Ok(outcome) => {
                println!("  {} {}", "✓".green(), format_effect(effect));
                match (effect, outcome) {
                    (Effect::Delete { id, .. }, EffectOutcome::Deleted) => {
                        recorded.push((id.clone(), None));
                    }
                    (_, outcome) => {
                        if let Some(state) = outcome.state() {
                            recorded.push((effect.resource_id().clone(), state.identifier.clone()));
                        }
                    }
                }
            }
            Err(e) => {
                println!("  {} {} - {}", "✗".red(), format_effect(effect), e);
                // The remote object exists; keep its id so the next run reads it
                if let Some(identifier) = &e.identifier {
                    println!("    left behind as {}", identifier.yellow());
                    recorded.push((effect.resource_id().clone(), Some(identifier.clone())));
                }
            }
        }
    }
    recorded
}

fn record_identifiers(file: &mut ResourceFile, recorded: &[(ResourceId, Option<String>)]) {
    for (id, identifier) in recorded {
        if let Some(entry) = file
            .resources
            .iter_mut()
            .find(|e| !e.data && e.id() == *id)
        {
            entry.identifier = identifier.clone();
        }
    }
}

fn print_plan(plan: &Plan) {
    if plan.is_empty() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for effect in plan.effects() {
        let symbol = match effect {
            Effect::Create(_) => "+".green().bold(),
            Effect::Update { .. } => "~".yellow().bold(),
            Effect::Replace { .. } => "-/+".magenta().bold(),
            Effect::Delete { .. } => "-".red().bold(),
            Effect::Read(_) => "<=".cyan().bold(),
        };
        println!("  {} {}", symbol, format_effect(effect));

        match effect {
            Effect::Create(r) => {
                let mut keys: Vec<&String> = r.attributes.keys().collect();
                keys.sort();
                for key in keys {
                    println!("      {}: {}", key, format_value(&r.attributes[key]));
                }
            }
            Effect::Update {
                from,
                to,
                changed_attributes,
                ..
            }
            | Effect::Replace {
                from,
                to,
                changed_attributes,
                ..
            } => {
                for key in changed_attributes {
                    let old = from
                        .attributes
                        .get(key)
                        .map(format_value)
                        .unwrap_or_else(|| "(none)".to_string());
                    let new = to
                        .attributes
                        .get(key)
                        .map(format_value)
                        .unwrap_or_else(|| "(none)".to_string());
                    println!("      {}: {} → {}", key, old.red(), new.green());
                }
            }
            Effect::Delete { identifier, .. } => {
                println!("      {}", identifier.dimmed());
            }
            Effect::Read(_) => {}
        }
    }

    println!();
    println!("{}", plan.summary().to_string().bold());
}

fn format_effect(effect: &Effect) -> String {
    match effect {
        Effect::Create(r) => format!("Create {}.{}", r.id.resource_type, r.id.name),
        Effect::Update { id, .. } => format!("Update {}.{}", id.resource_type, id.name),
        Effect::Replace { id, .. } => format!("Replace {}.{}", id.resource_type, id.name),
        Effect::Delete { id, .. } => format!("Delete {}.{}", id.resource_type, id.name),
        Effect::Read(r) => format!("Read {}.{}", r.id.resource_type, r.id.name),
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let mut strs: Vec<_> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            strs.sort();
            format!("{{{}}}", strs.join(", "))
        }
    }
}
