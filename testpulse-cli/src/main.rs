//! Testpulse CLI - test progress and defect dashboards from Bitable payloads

#![deny(warnings)]

// Global invariants enforced:
// - Deterministic output ordering
// - Identical input yields byte-for-byte identical output
// - Results go to stdout, diagnostics to stderr

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use testpulse_core::dashboard::{build_defect_view, Tab, ViewState};
use testpulse_core::defect::{decode_defect_report, parse_defect_report};
use testpulse_core::record::{decode_test_records, RecordEntry};
use testpulse_core::report::{render_defects_text, render_json, render_text};
use testpulse_core::schema::{
    find_flow_field, find_progress_field, flow_field_options, flow_node_options,
    parse_field_schema,
};
use testpulse_core::{build_dashboard_with_config, config, decode_cell_input, ResolvedConfig};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "testpulse")]
#[command(about = "Test progress rollups and defect matrices from Bitable cell payloads")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show per-type progress and the sorted record table
    Progress {
        /// Path to the progress payload ("-" for stdin)
        path: PathBuf,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        /// Input is a raw cell value (rich-text segments are flattened)
        #[arg(long)]
        cell: bool,

        /// Path to config file (default: auto-discover)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Show the priority x status matrix and the per-owner breakdown
    Defects {
        /// Path to the defect payload ("-" for stdin)
        path: PathBuf,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        /// Input is a raw cell value (rich-text segments are flattened)
        #[arg(long)]
        cell: bool,

        /// Path to config file (default: auto-discover)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Render the full dashboard
    Dashboard {
        /// Path to the progress payload ("-" for stdin)
        #[arg(long)]
        progress: PathBuf,

        /// Path to the defect payload
        #[arg(long)]
        defects: Option<PathBuf>,

        /// Tab to render in text mode
        #[arg(long, default_value = "progress")]
        tab: TabArg,

        /// Output format (JSON always contains both tabs)
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        /// Inputs are raw cell values (rich-text segments are flattened)
        #[arg(long)]
        cell: bool,

        /// Path to config file (default: auto-discover)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Strictly validate a payload and list every problem found
    Check {
        /// Path to the payload ("-" for stdin)
        path: PathBuf,

        /// Which payload the file holds
        #[arg(long, default_value = "progress")]
        kind: PayloadKind,

        /// Input is a raw cell value (rich-text segments are flattened)
        #[arg(long)]
        cell: bool,
    },
    /// Locate the progress field and list flow field picker options
    Fields {
        /// Path to the table field list ("-" for stdin)
        path: PathBuf,

        /// List the node options of this flow field instead
        #[arg(long)]
        flow_field: Option<String>,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        /// Path to config file (default: auto-discover)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Validate or show configuration
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a config file
    Validate {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the resolved configuration (merged defaults + config file)
    Show {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum TabArg {
    Progress,
    Defects,
}

impl From<TabArg> for Tab {
    fn from(tab: TabArg) -> Self {
        match tab {
            TabArg::Progress => Tab::Progress,
            TabArg::Defects => Tab::Defects,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum PayloadKind {
    Progress,
    Defects,
}

fn main() -> anyhow::Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Progress {
            path,
            format,
            cell,
            config: config_path,
        } => {
            let resolved = load_config(config_path.as_deref())?;
            let text = read_payload(&path, cell)?;
            let dashboard = build_dashboard_with_config(&text, None, &resolved);

            match format {
                OutputFormat::Text => {
                    print!("{}", render_text(&dashboard, &ViewState::new(Tab::Progress)));
                }
                OutputFormat::Json => {
                    println!("{}", render_json(&dashboard.progress));
                }
            }
        }
        Commands::Defects {
            path,
            format,
            cell,
            config: config_path,
        } => {
            let resolved = load_config(config_path.as_deref())?;
            let text = read_payload(&path, cell)?;
            let report = parse_defect_report(&text);
            let view = build_defect_view(report.as_ref(), &resolved.defect_ordering);

            match format {
                OutputFormat::Text => print!("{}", render_defects_text(&view)),
                OutputFormat::Json => println!("{}", render_json(&view)),
            }
        }
        Commands::Dashboard {
            progress,
            defects,
            tab,
            format,
            cell,
            config: config_path,
        } => {
            let resolved = load_config(config_path.as_deref())?;
            let progress_text = read_payload(&progress, cell)?;
            let defect_text = defects
                .as_deref()
                .map(|p| read_payload(p, cell))
                .transpose()?;

            let dashboard =
                build_dashboard_with_config(&progress_text, defect_text.as_deref(), &resolved);

            match format {
                OutputFormat::Text => {
                    print!("{}", render_text(&dashboard, &ViewState::new(tab.into())));
                }
                OutputFormat::Json => println!("{}", render_json(&dashboard)),
            }
        }
        Commands::Check { path, kind, cell } => {
            let text = read_payload(&path, cell)?;
            let ok = match kind {
                PayloadKind::Progress => check_progress(&text),
                PayloadKind::Defects => check_defects(&text),
            };
            if !ok {
                std::process::exit(1);
            }
        }
        Commands::Fields {
            path,
            flow_field,
            format,
            config: config_path,
        } => {
            let resolved = load_config(config_path.as_deref())?;
            let text = read_payload(&path, false)?;
            let fields = parse_field_schema(&text)
                .with_context(|| format!("failed to parse field list: {}", path.display()))?;

            if let Some(field_id) = flow_field {
                let field = find_flow_field(&fields, &field_id)
                    .with_context(|| format!("no flow field with id {:?}", field_id))?;
                let options = flow_node_options(field);
                if options.is_empty() {
                    eprintln!("Warning: flow field {:?} has no nodes", field.name);
                }
                match format {
                    OutputFormat::Text => {
                        for option in &options {
                            println!("{}\t{}", option.value, option.label);
                        }
                    }
                    OutputFormat::Json => println!("{}", render_json(&options)),
                }
                return Ok(());
            }

            let progress_field = find_progress_field(&fields, &resolved.progress_field);
            let options = flow_field_options(&fields);
            match format {
                OutputFormat::Text => {
                    match progress_field {
                        Some(field) => println!("Progress field: {} ({})", field.name, field.id),
                        None => println!(
                            "Progress field: not found (no field name contains {:?})",
                            resolved.progress_field
                        ),
                    }
                    println!();
                    if options.is_empty() {
                        println!("Flow fields: none");
                    } else {
                        println!("Flow fields:");
                        for option in &options {
                            println!("  {}\t{}", option.value, option.label);
                        }
                    }
                }
                OutputFormat::Json => {
                    let output = serde_json::json!({
                        "progressField": progress_field,
                        "flowFields": options,
                    });
                    println!("{}", render_json(&output));
                }
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Validate { path } => {
                let project_root = std::env::current_dir()?;
                let resolved = config::load_and_resolve(&project_root, path.as_deref());

                match resolved {
                    Ok(config) => {
                        if let Some(ref p) = config.config_path {
                            println!("Config valid: {}", p.display());
                        } else {
                            println!("No config file found. Using defaults.");
                        }
                    }
                    Err(e) => {
                        eprintln!("Config validation failed: {:#}", e);
                        std::process::exit(1);
                    }
                }
            }
            ConfigAction::Show { path } => {
                let project_root = std::env::current_dir()?;
                let resolved = config::load_and_resolve(&project_root, path.as_deref())
                    .context("failed to load configuration")?;
                print_config(&resolved);
            }
        },
    }

    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;
    Ok(())
}

fn load_config(config_path: Option<&Path>) -> anyhow::Result<ResolvedConfig> {
    let project_root = std::env::current_dir()?;
    let resolved = config::load_and_resolve(&project_root, config_path)
        .context("failed to load configuration")?;
    if let Some(path) = &resolved.config_path {
        eprintln!("Using config: {}", path.display());
    }
    Ok(resolved)
}

/// Read a payload from a file or stdin, flattening cell segments if asked
fn read_payload(path: &Path, cell: bool) -> anyhow::Result<String> {
    let raw = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?
    };

    Ok(if cell { decode_cell_input(&raw) } else { raw })
}

/// Strict progress check. Returns false only when the payload is unusable.
fn check_progress(text: &str) -> bool {
    let entries = match decode_test_records(text) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("Invalid progress payload: {}", e);
            return false;
        }
    };

    let mut valid = 0;
    let mut invalid = 0;
    let mut issue_count = 0;
    for (index, entry) in entries.iter().enumerate() {
        match entry {
            RecordEntry::Valid(record) => {
                valid += 1;
                for issue in record.issues() {
                    issue_count += 1;
                    println!("entry {} ({}): {}", index, record.plan_name, issue);
                }
            }
            RecordEntry::Invalid { index, reason } => {
                invalid += 1;
                println!("entry {}: skipped: {}", index, reason);
            }
        }
    }

    println!(
        "{} valid, {} invalid, {} issue(s)",
        valid, invalid, issue_count
    );
    true
}

fn check_defects(text: &str) -> bool {
    match decode_defect_report(text) {
        Ok(report) => {
            println!(
                "{} priority row(s), {} owner(s), {} defect(s)",
                report.priority.len(),
                report.dev_leader.len(),
                report
                    .priority
                    .iter()
                    .fold(0i64, |acc, (_, t)| acc.saturating_add(t.total()))
            );
            true
        }
        Err(e) => {
            eprintln!("Invalid defect payload: {}", e);
            false
        }
    }
}

fn print_config(resolved: &ResolvedConfig) {
    println!("Configuration:");
    if let Some(ref p) = resolved.config_path {
        println!("  Source: {}", p.display());
    } else {
        println!("  Source: defaults (no config file found)");
    }
    println!();
    println!("Test type order:");
    for (label, rank) in resolved.test_type_order.entries() {
        println!("  {}: {}", label, rank);
    }
    println!(
        "  collation_locale: {}",
        resolved.test_type_order.locale()
    );
    println!();
    println!("Defects:");
    println!(
        "  status_order: {}",
        resolved.defect_ordering.status_order.join(", ")
    );
    println!(
        "  defect_type_order: {}",
        resolved.defect_ordering.defect_type_order.join(", ")
    );
    println!(
        "  unnumbered_priority_rank: {}",
        resolved.defect_ordering.unnumbered_priority_rank
    );
    println!();
    println!("Fields:");
    println!("  progress_field: {}", resolved.progress_field);
}
