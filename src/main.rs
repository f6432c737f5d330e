/// Version injected at compile time via HWC_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("HWC_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hwc_provider::cloud::client::CloudClient;
use hwc_provider::cloud::http::format_api_error;
use hwc_provider::config::Config;
use hwc_provider::provider::{Operation, Provider};
use hwc_provider::resource::{
    fetch_data_source, Diagnostic, Diagnostics, ResourceData, Severity,
};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Huawei Cloud CBR and SWR Enterprise resources from the command line
#[derive(Parser, Debug)]
#[command(name = "hwc", version = VERSION, about, long_about = None)]
struct Args {
    /// Region to use
    #[arg(short, long, global = true)]
    region: Option<String>,

    /// Project ID to use
    #[arg(short, long, global = true)]
    project_id: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json", global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the data sources and resources
    List,
    /// Read a data source
    Read {
        /// Data source name, e.g. cbr_backups
        name: String,
        /// Arguments as key=value; values are parsed as JSON when possible
        #[arg(short = 's', long = "set", value_parser = parse_key_value)]
        set: Vec<(String, Value)>,
    },
    /// Create a resource or run an action
    Create(ResourceArgs),
    /// Refresh a resource from the remote state
    ReadResource(ResourceArgs),
    /// Update a resource
    Update(ResourceArgs),
    /// Delete a resource
    Delete(ResourceArgs),
    /// Save the default region and project
    Configure {
        #[arg(long)]
        default_region: Option<String>,
        #[arg(long)]
        default_project_id: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
struct ResourceArgs {
    /// Resource name, e.g. cbr_checkpoint
    name: String,
    /// ID of an existing resource
    #[arg(long)]
    id: Option<String>,
    /// Attributes as key=value; values are parsed as JSON when possible
    #[arg(short = 's', long = "set", value_parser = parse_key_value)]
    set: Vec<(String, Value)>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

fn parse_key_value(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file {:?}: {}", log_path, e);
            return None;
        },
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("hwc {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("hwc").join("hwc.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".hwc").join("hwc.log");
    }
    PathBuf::from("hwc.log")
}

fn print_value(value: &Value, format: OutputFormat) -> Result<()> {
    let text = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    };
    println!("{}", text);
    Ok(())
}

fn resource_data(id: Option<String>, set: Vec<(String, Value)>) -> ResourceData {
    let mut attributes: Map<String, Value> = set.into_iter().collect();
    if let Some(id) = id {
        attributes.insert("id".to_string(), Value::String(id));
    }
    ResourceData::from_value(Value::Object(attributes))
}

fn render_diagnostics(diagnostics: &Diagnostics) {
    for diag in diagnostics {
        let prefix = match diag.severity {
            Severity::Warning => "Warning",
            Severity::Error => "Error",
        };
        eprintln!("{}: {}", prefix, diag.summary);
        if let Some(detail) = &diag.detail {
            eprintln!("  {}", detail);
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let provider = Provider::new();
    let mut config = Config::load();

    let (name, operation, resource_args) = match args.command {
        Command::List => {
            let listing = serde_json::json!({
                "data_sources": provider.data_source_names(),
                "resources": provider.resource_names(),
            });
            return print_value(&listing, args.output);
        },
        Command::Configure {
            default_region,
            default_project_id,
        } => {
            if let Some(region) = default_region {
                config.set_region(&region)?;
            }
            if let Some(project_id) = default_project_id {
                config.set_project(&project_id)?;
            }
            println!("region: {}", config.effective_region());
            println!("project_id: {}", config.effective_project_id().unwrap_or_default());
            return Ok(());
        },
        Command::Read { name, set } => {
            let client = CloudClient::from_config(
                &config,
                args.region.as_deref(),
                args.project_id.as_deref(),
            )?;
            let data = resource_data(None, set);
            let result = fetch_data_source(&client, &name, &data).await?;
            return print_value(&result.into_value(), args.output);
        },
        Command::Create(r) => (r.name.clone(), Operation::Create, r),
        Command::ReadResource(r) => (r.name.clone(), Operation::Read, r),
        Command::Update(r) => (r.name.clone(), Operation::Update, r),
        Command::Delete(r) => (r.name.clone(), Operation::Delete, r),
    };

    let client =
        CloudClient::from_config(&config, args.region.as_deref(), args.project_id.as_deref())?;
    let mut data = resource_data(resource_args.id, resource_args.set);
    if operation != Operation::Create && data.id().is_none() {
        anyhow::bail!("--id is required to {} {}", operation, name);
    }

    let diagnostics = provider
        .apply(&client, &name, operation, &mut data)
        .await
        .with_context(|| format!("{} {} failed", operation, name))?;
    render_diagnostics(&diagnostics);

    if data.id().is_none() {
        eprintln!("{} is no longer tracked", name);
        return Ok(());
    }
    print_value(&data.into_value(), args.output)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let _log_guard = setup_logging(args.log_level);

    if let Err(err) = run(args).await {
        tracing::error!("{:#}", err);
        let detail = err.chain().nth(1).map(|_| format!("{:#}", err));
        render_diagnostics(&vec![Diagnostic::error(format_api_error(&err), detail)]);
        std::process::exit(1);
    }
}
