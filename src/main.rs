//! `scan_daq` command-line entry point.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueHint};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::{error, info, warn};

use scan_daq::action::{Action, ExecutionResult};
use scan_daq::config::{AppConfig, DEFAULT_CONFIG_PATH};
use scan_daq::engine::{ExecutionLoop, FailurePolicy};
use scan_daq::instrument::SystemAdapter;
use scan_daq::logging::{self, LogFormat};
use scan_daq::recorder::{JsonLinesRecorder, LogRecorder, Recorder};
use scan_daq::registry::DispatchRegistry;
use scan_daq::scan::{compile, grid_points};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Compile and run motorized-stage measurement sweeps"
)]
struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the compiled action sequence
    Plan(PlanArgs),

    /// Check a configuration and summarize the sweep it describes
    Validate(ConfigArgs),

    /// Execute the sweep against the configured (simulated) instruments
    Run(RunArgs),
}

#[derive(Args)]
struct ConfigArgs {
    /// Scan configuration file (TOML)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH, value_hint = ValueHint::FilePath)]
    config: PathBuf,
}

#[derive(Args)]
struct PlanArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Emit the plan as JSON instead of one action per line
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Override the configured failure policy
    #[arg(long, value_enum)]
    policy: Option<FailurePolicy>,

    /// Also write every step as a JSON line to this file
    #[arg(long, value_hint = ValueHint::FilePath)]
    record: Option<PathBuf>,
}

fn load(args: &ConfigArgs) -> Result<AppConfig> {
    AppConfig::load_from(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))
}

fn plan(args: &PlanArgs) -> Result<()> {
    let config = load(&args.config)?;
    let plan = compile(&config.scan)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{plan}");
    }
    eprintln!(
        "{} actions, {} read blocks",
        plan.len(),
        plan.read_block_count()
    );
    Ok(())
}

async fn validate(args: &ConfigArgs) -> Result<()> {
    let config = load(args)?;
    let plan = compile(&config.scan)?;
    let points = grid_points(&config.scan)?;
    let registry = DispatchRegistry::from_config(&config.instruments, SystemAdapter::new()).await?;
    registry.validate_plan(&plan)?;
    println!("Configuration OK: {}", config.application.name);
    println!("  axes:        {:?}", config.scan.axes);
    println!("  grid points: {}", points.len());
    println!("  actions:     {}", plan.len());
    println!("  policy:      {:?}", config.run.failure_policy);
    Ok(())
}

/// Fans each step out to the log and, optionally, a JSON-lines file.
struct RunRecorder {
    log: LogRecorder,
    file: Option<JsonLinesRecorder<BufWriter<File>>>,
}

impl Recorder for RunRecorder {
    fn record(&mut self, step: usize, action: &Action, result: &ExecutionResult) {
        self.log.record(step, action, result);
        if let Some(file) = &mut self.file {
            file.record(step, action, result);
        }
    }
}

async fn run(args: &RunArgs, config: AppConfig) -> Result<()> {
    let plan = compile(&config.scan)?;
    let policy = args.policy.unwrap_or(config.run.failure_policy);

    let (system, interrupt) = SystemAdapter::interruptible();
    let registry = DispatchRegistry::from_config(&config.instruments, system).await?;

    let execution = ExecutionLoop::new(policy).with_interrupt(&interrupt);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Ctrl-C received, stopping after the current step (press again to exit now)");
        interrupt.interrupt();
        if tokio::signal::ctrl_c().await.is_ok() {
            error!("Second Ctrl-C, exiting without finishing the step");
            std::process::exit(130);
        }
    });

    let file = match &args.record {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Some(JsonLinesRecorder::new(BufWriter::new(file)))
        }
        None => None,
    };
    let mut recorder = RunRecorder {
        log: LogRecorder,
        file,
    };

    info!(
        experiment = %config.application.name,
        instruments = ?registry.names(),
        "Registry ready"
    );
    let summary = execution.run(&plan, &registry, &mut recorder).await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    if let Some(step) = summary.aborted_at {
        bail!("run aborted at step {step}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Command::Run(args) => {
            let config = load(&args.config)?;
            logging::init_from_config(&config, cli.log_format)?;
            run(args, config).await
        }
        Command::Plan(args) => {
            logging::init("warn", cli.log_format)?;
            plan(args)
        }
        Command::Validate(args) => {
            logging::init("info", cli.log_format)?;
            validate(args).await
        }
    }
}
