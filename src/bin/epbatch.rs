use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use epbatch::config::RunConfig;
use epbatch::dispatch::worker::{run_batch, run_single};
use epbatch::dispatch::{Dispatcher, EnergyPlusCli};
use epbatch::jobs::dimensions::{climate_zone_name, ScenarioYear, Vintage};
use epbatch::plan::{build_plan, PlanFile};
use epbatch::report::{PlanReport, Report, ReportFormat, RunReport};
use epbatch::transition::{plan_conversions, run_conversions, steps, UpdaterCli};
use epbatch::weather::{epw, WeatherResolver};
use std::path::PathBuf;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "epbatch")]
#[command(about = "Batch EnergyPlus simulations across climate scenarios", long_about = None)]
struct Cli {
    /// TOML run configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the configured project root
    #[arg(long, global = true)]
    project_root: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Explicit log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<Level>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct WorkerArgs {
    /// Number of workers (default: available cores minus one)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Skip every archetype except the forced ones
    #[arg(long)]
    essentials_only: bool,
}

#[derive(Args)]
struct OutputArgs {
    /// Output format: markdown, csv or json
    #[arg(short, long, default_value = "markdown")]
    format: ReportFormat,

    /// Output file path
    #[arg(short, long)]
    output_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Enumerates jobs, checks completion and shows the partitions
    Plan {
        #[command(flatten)]
        workers: WorkerArgs,

        /// Save the partitions as JSON for `run --plan`
        #[arg(long)]
        save_plan: Option<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Runs every pending job, or one partition of them
    Run {
        #[command(flatten)]
        workers: WorkerArgs,

        /// Run the partitions saved by `plan --save-plan` instead of planning
        #[arg(long)]
        plan: Option<PathBuf>,

        /// Run only this partition of the saved plan (one process per worker)
        #[arg(long, requires = "plan")]
        worker_index: Option<usize>,

        /// Build invocations without running the engine
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Upgrades input files through the version-transition tools
    Transition {
        /// Restrict to one vintage
        #[arg(long)]
        vintage: Option<Vintage>,

        /// Restrict to one climate zone
        #[arg(long)]
        climate_zone: Option<String>,

        #[arg(short, long)]
        workers: Option<usize>,

        /// List the files without converting them
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Encodes or decodes job codes
    Code {
        #[command(subcommand)]
        action: CodeAction,
    },
    /// Lists the historical weather site of each climate zone
    Locations,
}

#[derive(Subcommand)]
enum CodeAction {
    /// Prints the ordinal code of a job
    Encode {
        vintage: Vintage,
        climate_zone: String,
        /// e.g. "ssp245_2050"
        scenario_year: ScenarioYear,
        building_type: String,
    },
    /// Prints the full label of a job code
    Decode { code: String },
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1).max(1))
        .unwrap_or(1)
}

fn load_config(cli: &Cli) -> anyhow::Result<RunConfig> {
    let mut config = match &cli.config {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::default(),
    };
    if let Some(root) = &cli.project_root {
        config.project_root = root.clone();
    }
    config.validate()?;
    Ok(config)
}

fn emit<R: Report>(report: &R, output: &OutputArgs) -> anyhow::Result<()> {
    let text = report.render(output.format)?;
    if let Some(path) = &output.output_file {
        std::fs::write(path, text)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        println!("Report saved to {:?}", path);
    } else {
        println!("{}", text);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = cli.log_level.unwrap_or(match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    });
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Plan {
            workers,
            save_plan,
            output,
        } => {
            let n = workers.workers.unwrap_or_else(default_workers);
            let plan = build_plan(&config, n, workers.essentials_only)?;
            if let Some(path) = save_plan {
                PlanFile::from_plan(&plan).save(path)?;
                info!(path = %path.display(), workers = n, "plan saved");
            }
            let report = PlanReport::from_plan(&plan);
            report.print_summary();
            emit(&report, output)?;
        }
        Commands::Run {
            workers,
            plan,
            worker_index,
            dry_run,
            output,
        } => {
            let dispatcher = Dispatcher::from_config(&config);
            let engine = EnergyPlusCli;

            let records = match (plan, worker_index) {
                (Some(path), Some(index)) => {
                    let saved = PlanFile::load(path)?;
                    let jobs = saved.partition(&config.codec(), *index)?;
                    info!(worker = index, jobs = jobs.len(), "running single partition");
                    run_single(*index, &jobs, &dispatcher, &engine, *dry_run)
                }
                (Some(path), None) => {
                    let batch = PlanFile::load(path)?.batch(&config.codec())?;
                    run_batch(&batch, &dispatcher, &engine, *dry_run)?
                }
                (None, _) => {
                    let n = workers.workers.unwrap_or_else(default_workers);
                    let plan = build_plan(&config, n, workers.essentials_only)?;
                    run_batch(&plan.batch, &dispatcher, &engine, *dry_run)?
                }
            };

            let report = RunReport::from_jobs(&records);
            report.print_summary();
            emit(&report, output)?;
            if report.failed > 0 {
                anyhow::bail!("{} of {} jobs failed", report.failed, report.rows.len());
            }
        }
        Commands::Transition {
            vintage,
            climate_zone,
            workers,
            dry_run,
            output,
        } => {
            let vintages = match vintage {
                Some(v) => vec![*v],
                None => config.vintages.clone(),
            };
            let zones = match climate_zone {
                Some(cz) => vec![cz.to_lowercase()],
                None => config.climate_zones.clone(),
            };
            let chain = steps(
                &config.transition.source_version,
                &config.transition.target_version,
            )?;
            let tasks = plan_conversions(&config.project_root, &config.transition, &vintages, &zones)?;
            info!(files = tasks.len(), steps = chain.len(), "conversion plan ready");

            let tool = UpdaterCli::from_config(&config.transition);
            let n = workers.unwrap_or_else(default_workers);
            let records = run_conversions(&tasks, n, &chain, &tool, *dry_run)?;

            let report = RunReport::from_conversions(&records);
            report.print_summary();
            emit(&report, output)?;
            if report.failed > 0 {
                anyhow::bail!("{} of {} conversions failed", report.failed, report.rows.len());
            }
        }
        Commands::Code { action } => {
            let codec = config.codec();
            match action {
                CodeAction::Encode {
                    vintage,
                    climate_zone,
                    scenario_year,
                    building_type,
                } => {
                    let key = codec.tables().key(
                        *vintage,
                        &climate_zone.to_lowercase(),
                        *scenario_year,
                        building_type,
                    )?;
                    println!("{}", codec.encode(&key)?);
                }
                CodeAction::Decode { code } => {
                    println!("{}", codec.expand(code)?);
                }
            }
        }
        Commands::Locations => {
            let resolver = WeatherResolver::new(
                &config.project_root,
                config.weather_percentile,
                config.year_band_half_width,
            );
            println!("| Zone | Name | Site | Latitude | Longitude |");
            println!("|------|------|------|----------|-----------|");
            for cz in &config.climate_zones {
                let location = resolver
                    .baseline_path(cz)
                    .and_then(|path| epw::read_location(&path));
                match location {
                    Ok(loc) => println!(
                        "| {} | {} | {}, {} | {:.2} | {:.2} |",
                        cz,
                        climate_zone_name(cz).unwrap_or("-"),
                        loc.city,
                        loc.state,
                        loc.latitude,
                        loc.longitude
                    ),
                    Err(e) => warn!(climate_zone = %cz, error = %e, "no location"),
                }
            }
        }
    }

    Ok(())
}
