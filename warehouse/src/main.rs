//! Carsales CLI - stage, profile and load car-sales tables
//!
//! # Main Commands
//!
//! ```bash
//! carsales stage                    # Copy raw source tables into staging
//! carsales warehouse                # Profile, clean, join and load the fact table
//! ```
//!
//! # Inspection Commands
//!
//! ```bash
//! carsales profile car_sales        # Profile a staged table with every diagnostic
//! carsales plan                     # Print the warehouse plan as JSON
//! ```
//!
//! Paths and policies come from the environment (see `carsales::config`);
//! flags override them.

use clap::{Parser, Subcommand};
use carsales::profiling::{ALL_COLUMNS, PROFILING_COMPONENT};
use carsales::{
    run_staging, run_warehouse, Config, CsvDirectorySource, CsvWarehouseWriter, FactValidator,
    JoinCardinality, JsonlLogSink, LogRecord, LogSink, OnError, PipelineContext,
    ProfileSelection, Profiler, ReportStore, SourceAdapter, Stage,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "carsales")]
#[command(about = "Stage, profile and load car-sales records into a warehouse", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy raw source tables into the staging store
    Stage {
        /// Tables to copy (default: every table of the plan)
        tables: Vec<String>,

        /// Raw source directory
        #[arg(long)]
        source_dir: Option<PathBuf>,

        /// Staging directory
        #[arg(long)]
        staging_dir: Option<PathBuf>,

        /// Outcome log file
        #[arg(long)]
        log_path: Option<PathBuf>,
    },

    /// Run the warehouse pipeline on the staged tables
    Warehouse {
        /// Staging directory
        #[arg(long)]
        staging_dir: Option<PathBuf>,

        /// Warehouse directory
        #[arg(long)]
        warehouse_dir: Option<PathBuf>,

        /// Profiling artifact directory
        #[arg(long)]
        profile_dir: Option<PathBuf>,

        /// Outcome log file
        #[arg(long)]
        log_path: Option<PathBuf>,

        /// Plan file to run instead of the built-in plan
        #[arg(short, long)]
        plan: Option<PathBuf>,

        /// What to do after a failed step: continue | abort
        #[arg(long)]
        on_error: Option<OnError>,

        /// Lookup rows per key: enforce | allow
        #[arg(long)]
        join_cardinality: Option<JoinCardinality>,

        /// Skip fact schema validation
        #[arg(long)]
        no_validate: bool,

        /// Write the run report as JSON
        #[arg(short, long)]
        report: Option<PathBuf>,
    },

    /// Profile a staged table with every diagnostic
    Profile {
        /// Staged table name
        table: String,

        /// Staging directory
        #[arg(long)]
        staging_dir: Option<PathBuf>,

        /// Profiling artifact directory
        #[arg(long)]
        profile_dir: Option<PathBuf>,
    },

    /// Print the warehouse plan as JSON
    Plan {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match Config::from_env() {
        Ok(config) => run(cli.command, config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands, mut config: Config) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Stage {
            tables,
            source_dir,
            staging_dir,
            log_path,
        } => {
            override_path(&mut config.source_dir, source_dir);
            override_path(&mut config.staging_dir, staging_dir);
            override_path(&mut config.log_path, log_path);
            cmd_stage(&config, tables).await
        }

        Commands::Warehouse {
            staging_dir,
            warehouse_dir,
            profile_dir,
            log_path,
            plan,
            on_error,
            join_cardinality,
            no_validate,
            report,
        } => {
            override_path(&mut config.staging_dir, staging_dir);
            override_path(&mut config.warehouse_dir, warehouse_dir);
            override_path(&mut config.profile_dir, profile_dir);
            override_path(&mut config.log_path, log_path);
            if plan.is_some() {
                config.plan_path = plan;
            }
            if let Some(on_error) = on_error {
                config.on_error = on_error;
            }
            if let Some(cardinality) = join_cardinality {
                config.join_cardinality = cardinality;
            }
            cmd_warehouse(&config, no_validate, report.as_deref()).await
        }

        Commands::Profile {
            table,
            staging_dir,
            profile_dir,
        } => {
            override_path(&mut config.staging_dir, staging_dir);
            override_path(&mut config.profile_dir, profile_dir);
            cmd_profile(&config, &table)
        }

        Commands::Plan { output } => cmd_plan(&config, output.as_deref()),
    }
}

fn override_path(target: &mut PathBuf, flag: Option<PathBuf>) {
    if let Some(path) = flag {
        *target = path;
    }
}

async fn cmd_stage(config: &Config, tables: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let tables = if tables.is_empty() {
        config.load_plan()?.source_tables()
    } else {
        tables
    };
    eprintln!(
        "Staging {} tables: {} -> {}",
        tables.len(),
        config.source_dir.display(),
        config.staging_dir.display()
    );

    let source = Arc::new(CsvDirectorySource::new(&config.source_dir));
    let writer = CsvWarehouseWriter::new(&config.staging_dir);
    let sink = JsonlLogSink::new(&config.log_path);

    let report = run_staging(source, &writer, &tables, &sink).await?;

    for (table, rows) in &report.loaded {
        eprintln!("   {}: {} rows", table, rows);
    }
    for (table, error) in &report.failed {
        eprintln!("   {}: FAILED ({})", table, error);
    }

    if !report.is_success() {
        return Err(format!("{} of {} tables failed", report.failed.len(), tables.len()).into());
    }
    eprintln!("Done (run {})", report.run_id);
    Ok(())
}

async fn cmd_warehouse(
    config: &Config,
    no_validate: bool,
    report_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let plan = config.load_plan()?;
    eprintln!(
        "Warehouse run: {} -> {}/{}.csv",
        config.staging_dir.display(),
        config.warehouse_dir.display(),
        plan.target_table
    );

    let writer = CsvWarehouseWriter::new(&config.warehouse_dir);
    let sink = JsonlLogSink::new(&config.log_path);
    let mut ctx = PipelineContext::new(
        Arc::new(CsvDirectorySource::new(&config.staging_dir)),
        &writer,
        &sink,
        ReportStore::with_dir(&config.profile_dir),
    )
    .with_config(config);
    if !no_validate {
        ctx = ctx.with_validator(FactValidator::car_sales()?);
    }

    let report = run_warehouse(&ctx, &plan).await?;

    for (table, rows) in &report.rows_extracted {
        eprintln!("   Extracted {}: {} rows", table, rows);
    }
    if let Some(path) = &report.profile_path {
        eprintln!("   Profile: {}", path.display());
    }
    for (table, outcomes) in &report.steps {
        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        eprintln!("   {}: {} steps, {} failed", table, outcomes.len(), failed);
    }
    if let Some(validation) = &report.validation {
        eprintln!(
            "   Validation: {} valid, {} invalid",
            validation.valid, validation.invalid
        );
        for (row, errors) in &validation.errors {
            eprintln!("     Row {}:", row);
            for err in errors.iter().take(3) {
                eprintln!("       - {}", err);
            }
        }
    }
    for warning in &report.warnings {
        eprintln!("   Warning: {}", warning);
    }

    if let Some(path) = report_path {
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
        eprintln!("   Report written to: {}", path.display());
    }

    eprintln!(
        "Loaded {} rows into {} in {} ms",
        report.rows_loaded, report.target_table, report.duration_ms
    );
    Ok(())
}

fn cmd_profile(config: &Config, table_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let sink = JsonlLogSink::new(&config.log_path);
    let table = CsvDirectorySource::new(&config.staging_dir).fetch(table_name)?;
    eprintln!(
        "Profiling {}: {} rows, {} columns",
        table_name,
        table.row_count(),
        table.column_count()
    );

    let report = Profiler::new(&table, table_name)
        .with_selection(ProfileSelection::all(&[ALL_COLUMNS]))
        .report();
    let persisted = ReportStore::with_dir(&config.profile_dir).persist(&report);
    sink.record(&LogRecord::from_result(
        Uuid::new_v4(),
        Stage::Warehouse,
        PROFILING_COMPONENT,
        table_name,
        &persisted,
    ));

    println!("{}", serde_json::to_string_pretty(&report)?);
    let path = persisted?;
    eprintln!("Saved to: {}", path.display());
    Ok(())
}

fn cmd_plan(config: &Config, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let json = config.load_plan()?.to_json()?;
    match output {
        Some(p) => {
            fs::write(p, &json)?;
            eprintln!("Plan written to: {}", p.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
