//! Wardgate CLI - authorization-filtered search over clinical records

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use wardgate_core::audit::FileAuditSink;
use wardgate_core::config::Config;
use wardgate_core::identity::Requester;
use wardgate_core::pipeline::SecureSearchPipeline;
use wardgate_core::policy::HttpPolicyClient;
use wardgate_core::record::ResourceType;
use wardgate_core::search::{HttpSearchBackend, SearchRequest};

#[derive(Parser)]
#[command(name = "wardgate")]
#[command(author, version, about = "Authorization-filtered search over clinical records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Append audit events to this JSONL file
    #[arg(long, global = true, value_name = "PATH")]
    audit_log: Option<PathBuf>,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Search clinical records as a given requester
    Search {
        /// Query string
        query: String,

        /// Requester profile (JSON file of verified credential claims)
        #[arg(long = "as", value_name = "PROFILE")]
        profile: PathBuf,

        #[command(flatten)]
        options: SearchOptions,
    },

    /// Fetch a single record as a given requester
    Record {
        /// Record identifier
        id: String,

        /// Requester profile (JSON file of verified credential claims)
        #[arg(long = "as", value_name = "PROFILE")]
        profile: PathBuf,
    },

    /// Fetch typeahead suggestions as a given requester
    Suggest {
        /// Query prefix
        prefix: String,

        /// Requester profile (JSON file of verified credential claims)
        #[arg(long = "as", value_name = "PROFILE")]
        profile: PathBuf,

        /// Restrict to one resource type
        #[arg(short, long, value_name = "TYPE")]
        resource_type: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(clap::Args)]
struct SearchOptions {
    /// Restrict to one department
    #[arg(short, long)]
    department: Option<String>,

    /// Restrict to one resource type
    #[arg(short, long, value_name = "TYPE")]
    resource_type: Option<String>,

    /// Priority tier filter (e.g. stat, routine)
    #[arg(long)]
    priority: Option<String>,

    /// Relative date bucket filter (e.g. last_7_days)
    #[arg(long)]
    date_bucket: Option<String>,

    /// 1-based result page
    #[arg(long, default_value_t = 1)]
    page: u32,

    /// Hits per page
    #[arg(long)]
    page_size: Option<u32>,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wardgate=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Search {
            query,
            profile,
            options,
        } => {
            cmd_search(
                &query,
                &profile,
                options,
                cli.audit_log.as_deref(),
                cli.format,
                cli.quiet,
            )
            .await
        }

        Commands::Record { id, profile } => {
            cmd_record(&id, &profile, cli.audit_log.as_deref(), cli.format).await
        }

        Commands::Suggest {
            prefix,
            profile,
            resource_type,
        } => {
            cmd_suggest(
                &prefix,
                &profile,
                resource_type.as_deref(),
                cli.audit_log.as_deref(),
                cli.format,
                cli.quiet,
            )
            .await
        }

        Commands::Config { action } => cmd_config(action, cli.quiet),

        Commands::Doctor => cmd_doctor(cli.quiet).await,
    }
}

/// Load a requester profile from a JSON file of verified credential claims
fn load_requester(path: &Path) -> anyhow::Result<Requester> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read requester profile: {}", path.display()))?;
    let requester: Requester = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse requester profile: {}", path.display()))?;
    Ok(requester)
}

fn parse_resource_type(value: &str) -> anyhow::Result<ResourceType> {
    ResourceType::from_str(value).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown resource type: {}. Valid types: {}",
            value,
            ResourceType::all()
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    })
}

fn build_pipeline(config: &Config, audit_log: Option<&Path>) -> anyhow::Result<SecureSearchPipeline> {
    let mut builder = SecureSearchPipeline::builder_from_config(config)?;
    if let Some(path) = audit_log {
        builder = builder.audit(Arc::new(FileAuditSink::new(path)));
    }
    Ok(builder.build()?)
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_search(
    query: &str,
    profile: &Path,
    options: SearchOptions,
    audit_log: Option<&Path>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let requester = load_requester(profile)?;
    let config = Config::load()?;
    let pipeline = build_pipeline(&config, audit_log)?;

    let mut request = SearchRequest::new(query).with_page(options.page);
    if let Some(department) = options.department {
        request = request.with_department(department);
    }
    if let Some(value) = options.resource_type {
        request = request.with_resource_type(parse_resource_type(&value)?);
    }
    if let Some(priority) = options.priority {
        request = request.with_priority(priority);
    }
    if let Some(bucket) = options.date_bucket {
        request = request.with_date_bucket(bucket);
    }
    if let Some(size) = options.page_size {
        request = request.with_page_size(size);
    }

    let results = pipeline.secure_search(&requester, request).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        OutputFormat::Text => {
            if results.results.is_empty() {
                if !quiet {
                    println!("No accessible records matched.");
                }
            } else {
                if !quiet {
                    println!(
                        "Results ({} shown, {} total matches, {} removed by security):",
                        results.results.len(),
                        results.total_hits,
                        results.security.filtered_count
                    );
                }
                for record in &results.results {
                    println!(
                        "  {}  [{}]  {}",
                        record.id, record.resource_type, record.title
                    );
                    if let Some(snippet) = &record.snippet {
                        println!("      {}", snippet);
                    }
                }
            }
        }
    }

    Ok(())
}

async fn cmd_record(
    id: &str,
    profile: &Path,
    audit_log: Option<&Path>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let requester = load_requester(profile)?;
    let config = Config::load()?;
    let pipeline = build_pipeline(&config, audit_log)?;

    let record = pipeline.get_authorized_record(&requester, id).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        OutputFormat::Text => {
            println!("Record: {}", record.title);
            println!("  ID: {}", record.id);
            println!("  Type: {}", record.resource_type);
            if let Some(snippet) = &record.snippet {
                println!("  Snippet: {}", snippet);
            }
            if let Some(updated) = record.updated_at {
                println!("  Updated: {}", updated.format("%Y-%m-%d %H:%M:%S"));
            }
        }
    }

    Ok(())
}

async fn cmd_suggest(
    prefix: &str,
    profile: &Path,
    resource_type: Option<&str>,
    audit_log: Option<&Path>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let requester = load_requester(profile)?;
    let config = Config::load()?;
    let pipeline = build_pipeline(&config, audit_log)?;

    let resource_type = resource_type.map(parse_resource_type).transpose()?;
    let suggestions = pipeline
        .get_authorized_suggestions(&requester, prefix, resource_type)
        .await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&suggestions)?);
        }
        OutputFormat::Text => {
            if suggestions.is_empty() {
                if !quiet {
                    println!("No suggestions.");
                }
            } else {
                for suggestion in &suggestions {
                    println!("  {}  [{}]", suggestion.text, suggestion.resource_type);
                }
            }
        }
    }

    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        println!("Wardgate Health Check");
        println!("=====================");
        println!();
    }

    let mut all_ok = true;

    // Check configuration
    let config = match Config::load() {
        Ok(config) => {
            if !quiet {
                println!("[OK] Configuration: Valid");
            }
            Some(config)
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Configuration: Error - {}", e);
            }
            None
        }
    };

    if let Some(config) = &config {
        // Check endpoint URLs
        for (name, url) in [
            ("Search URL", &config.search.base_url),
            ("Policy URL", &config.policy.base_url),
        ] {
            if url.starts_with("http://") || url.starts_with("https://") {
                if !quiet {
                    println!("[OK] {}: {}", name, url);
                }
            } else {
                all_ok = false;
                if !quiet {
                    println!("[!!] {}: Not an http(s) URL - {}", name, url);
                }
            }
        }

        // Check service tokens
        match config.search.resolved_auth_token() {
            Ok(Some(_)) => {
                if !quiet {
                    println!("[OK] Search token: Configured");
                }
            }
            Ok(None) => {
                if !quiet {
                    println!("[--] Search token: Not set (set WARDGATE_SEARCH_TOKEN if required)");
                }
            }
            Err(e) => {
                all_ok = false;
                if !quiet {
                    println!("[!!] Search token: Error - {}", e);
                }
            }
        }
        match config.policy.resolved_auth_token() {
            Ok(Some(_)) => {
                if !quiet {
                    println!("[OK] Policy token: Configured");
                }
            }
            Ok(None) => {
                if !quiet {
                    println!("[--] Policy token: Not set (set WARDGATE_POLICY_TOKEN if required)");
                }
            }
            Err(e) => {
                all_ok = false;
                if !quiet {
                    println!("[!!] Policy token: Error - {}", e);
                }
            }
        }

        // Check both collaborators live; a down service is reported, not fatal
        match HttpSearchBackend::builder()
            .base_url(&config.search.base_url)
            .timeout_secs(config.search.timeout_secs)
            .build()
        {
            Ok(backend) => match backend.health_check().await {
                Ok(()) => {
                    if !quiet {
                        println!("[OK] Search backend: Reachable");
                    }
                }
                Err(e) => {
                    all_ok = false;
                    warn!(error = %e, "Search backend health check failed");
                    if !quiet {
                        println!("[!!] Search backend: Unreachable - {}", e);
                    }
                }
            },
            Err(e) => {
                all_ok = false;
                if !quiet {
                    println!("[!!] Search backend: {}", e);
                }
            }
        }
        match HttpPolicyClient::builder()
            .base_url(&config.policy.base_url)
            .timeout_secs(config.policy.timeout_secs)
            .build()
        {
            Ok(client) => match client.health_check().await {
                Ok(()) => {
                    if !quiet {
                        println!("[OK] Policy service: Reachable");
                    }
                }
                Err(e) => {
                    all_ok = false;
                    warn!(error = %e, "Policy service health check failed");
                    if !quiet {
                        println!("[!!] Policy service: Unreachable - {}", e);
                    }
                }
            },
            Err(e) => {
                all_ok = false;
                if !quiet {
                    println!("[!!] Policy service: {}", e);
                }
            }
        }
    }

    // Check config file location
    if !quiet {
        match Config::config_path() {
            Ok(path) => {
                if path.exists() {
                    println!("[OK] Config file: {}", path.display());
                } else {
                    println!("[--] Config file: {} (using defaults)", path.display());
                }
            }
            Err(e) => {
                println!("[!!] Config file: Error - {}", e);
            }
        }
    }

    // Summary
    if !quiet {
        println!();
        if all_ok {
            println!("All checks passed!");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }

    Ok(())
}
