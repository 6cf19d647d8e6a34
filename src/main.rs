use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{Attribute, Cell, Table};
use futures_util::stream;
use research_corpus::config::{
    default_config_path, find_config_file, load_config, save_config, Config, LogFormat,
};
use research_corpus::models::RawRecord;
use research_corpus::utils::CitationCache;
use research_corpus::{Orchestrator, PipelineOutput, PipelineReport, SourceRegistry};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Research Corpus - Merge, filter and rank bibliographic records from multiple sources
#[derive(Parser, Debug)]
#[command(name = "research-corpus")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Merge, filter and rank bibliographic records from multiple sources", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pipeline over a file of raw records
    Run {
        /// Input file (JSON array or JSON Lines); "-" reads stdin
        input: PathBuf,

        /// Write results here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, short, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },

    /// Manage the citation cache
    Cache {
        /// Subcommand
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// List source names with a dedicated normalization adapter
    Sources,

    /// Manage configuration files
    Config {
        /// Subcommand
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum CacheCommands {
    /// Show cache status and statistics
    Stats,

    /// Remove entries past their TTL
    Prune,

    /// Clear all cached data
    Clear,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Write a configuration file with default values
    Init {
        /// Destination (defaults to the per-user config path)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },

    /// Print the effective configuration as TOML
    Show,
}

/// Output format for results
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Records and run report as one JSON document
    Json,
    /// One record per line, report omitted
    Jsonl,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // `config init` must work even when the existing file is broken
    if let Commands::Config {
        command: ConfigCommands::Init { path, force },
    } = &cli.command
    {
        return init_config(path.as_deref(), *force, cli.quiet);
    }

    let config_path = cli.config.clone().or_else(find_config_file);
    let config = load_config(config_path.as_deref()).with_context(|| match &config_path {
        Some(path) => format!("Failed to load config from {}", path.display()),
        None => "Invalid configuration in environment".to_string(),
    })?;

    init_logging(&config, cli.verbose, cli.quiet);
    if let Some(path) = &config_path {
        tracing::info!("Using config file: {}", path.display());
    }

    match cli.command {
        Commands::Run {
            input,
            output,
            format,
        } => {
            let records = read_records(&input)?;
            tracing::info!("Read {} raw records from {}", records.len(), input.display());

            let orchestrator = Orchestrator::from_config(&config)?;
            let cancel = orchestrator.cancel_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });

            let result = orchestrator.run_stream(stream::iter(records)).await;
            write_output(&result, output.as_deref(), format)?;

            if !cli.quiet {
                print_summary(&result.report);
            }
            if result.report.cancelled {
                bail!("Run cancelled; output covers only the admitted batches");
            }
        }

        Commands::Cache { command } => {
            let cache = CitationCache::from_config(&config.cache)?;

            match command {
                CacheCommands::Stats => {
                    let stats = cache.stats();
                    let mut table = Table::new();
                    table.load_preset(comfy_table::presets::UTF8_FULL);
                    table.set_header(vec!["Setting", "Value"]);
                    let directory = stats
                        .cache_dir
                        .as_ref()
                        .map(|d| d.display().to_string())
                        .unwrap_or_else(|| "(memory only)".to_string());
                    table.add_row(vec![Cell::new("Directory"), Cell::new(directory)]);
                    table.add_row(vec![Cell::new("Entries"), Cell::new(stats.disk_entries)]);
                    table.add_row(vec![Cell::new("Expired"), Cell::new(stats.expired_entries)]);
                    table.add_row(vec![Cell::new("Size (KB)"), Cell::new(stats.size_kb)]);
                    table.add_row(vec![
                        Cell::new("TTL (days)"),
                        Cell::new(stats.ttl.as_secs() / 86_400),
                    ]);
                    println!("{table}");
                }
                CacheCommands::Prune => {
                    let removed = cache.purge_expired()?;
                    if !cli.quiet {
                        eprintln!("Removed {} expired entries.", removed);
                    }
                }
                CacheCommands::Clear => {
                    if !cli.quiet {
                        eprintln!("Clearing citation cache...");
                    }
                    cache.clear()?;
                    if !cli.quiet {
                        eprintln!("Cache cleared successfully.");
                    }
                }
            }
        }

        Commands::Sources => {
            let registry = SourceRegistry::global();
            let mut by_adapter: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
            for name in registry.ids() {
                by_adapter.entry(registry.resolve(name).name()).or_default().push(name);
            }

            let mut table = Table::new();
            table.load_preset(comfy_table::presets::UTF8_FULL);
            table.set_header(vec!["Adapter", "Source names"]);
            for (adapter, mut names) in by_adapter {
                names.sort_unstable();
                table.add_row(vec![
                    Cell::new(adapter).add_attribute(Attribute::Bold),
                    Cell::new(names.join(", ")),
                ]);
            }
            println!("{table}");
        }

        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                print!("{}", toml::to_string_pretty(&config)?);
            }
            ConfigCommands::Init { path, force } => init_config(path.as_deref(), force, cli.quiet)?,
        },
    }

    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` wins over `-v` and the config level.
fn init_logging(config: &Config, verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => config.logging.level.as_str(),
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("research_corpus={}", level)),
    );

    let json = config.logging.format == LogFormat::Json;
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .init();
}

fn init_config(path: Option<&Path>, force: bool, quiet: bool) -> Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path().context("Could not determine the user config directory")?,
    };
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    save_config(&Config::default(), &path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    if !quiet {
        eprintln!("Wrote default configuration to {}", path.display());
    }
    Ok(())
}

/// Parse raw records from a JSON array or JSON Lines
fn read_records(input: &Path) -> Result<Vec<RawRecord>> {
    let mut content = String::new();
    if input.as_os_str() == "-" {
        std::io::stdin()
            .read_to_string(&mut content)
            .context("Failed to read stdin")?;
    } else {
        content = std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read {}", input.display()))?;
    }

    if content.trim_start().starts_with('[') {
        return serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON array in {}", input.display()));
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Invalid record on line {} of {}", n + 1, input.display()))
        })
        .collect()
}

fn write_output(result: &PipelineOutput, path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let mut writer: Box<dyn Write> = match path {
        Some(path) => Box::new(std::io::BufWriter::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };

    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, result)?;
            writeln!(writer)?;
        }
        OutputFormat::Jsonl => {
            for record in &result.records {
                serde_json::to_writer(&mut writer, record)?;
                writeln!(writer)?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

fn print_summary(report: &PipelineReport) {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Phase", "In", "Out", "Dropped"]);

    table.add_row(vec![
        Cell::new("dedup"),
        Cell::new(report.dedup.input),
        Cell::new(report.dedup.output),
        Cell::new(report.dedup.merged_away),
    ]);
    for phase in &report.phases {
        let name = Cell::new(phase.phase.to_string());
        if phase.enabled {
            table.add_row(vec![
                name,
                Cell::new(phase.input),
                Cell::new(phase.output),
                Cell::new(phase.dropped()),
            ]);
        } else {
            table.add_row(vec![name, Cell::new("off"), Cell::new(""), Cell::new("")]);
        }
    }

    eprintln!("{table}");
    eprintln!(
        "{} records in {} batches -> {} records in {} ms",
        report.input, report.batches, report.output, report.elapsed_ms
    );
    if report.failed_batches > 0 {
        eprintln!("Warning: {} batches failed", report.failed_batches);
    }
    for endpoint in &report.endpoints {
        eprintln!(
            "Endpoint {}: {:?} ({} consecutive failures)",
            endpoint.endpoint, endpoint.state, endpoint.consecutive_failures
        );
    }
}
