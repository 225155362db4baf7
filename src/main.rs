use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;

use fedflow::config::Config;
use fedflow::core::{AssetKind, PlanKey, TaskKey, TaskStatus};
use fedflow::events::EventFilter;
use fedflow::orchestration::TaskFilter;
use fedflow::pagination::Pagination;
use fedflow::store::file::FileStore;
use fedflow::{flog, flog_error, Orchestrator, Result, Transaction};

/// fedflow - federated compute plan orchestration engine
#[derive(Parser, Debug)]
#[command(name = "fedflow")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    FEDFLOW_DEBUG=1     Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.fedflow/fedflow.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Store file to operate on (defaults to the configured store_path)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Apply a JSON list of transactions in order, stopping at the first failure
    Submit {
        /// Path to the transaction file
        file: PathBuf,
    },

    /// Show a compute plan with its derived status
    Plan {
        key: PlanKey,
    },

    /// List compute tasks
    Tasks {
        #[arg(long)]
        plan: Option<PlanKey>,

        #[arg(long)]
        status: Option<TaskStatus>,

        #[arg(long)]
        worker: Option<String>,

        #[arg(long, default_value_t = 0)]
        page_size: usize,

        #[arg(long, default_value = "")]
        page_token: String,
    },

    /// List events in ordering-key order
    Events {
        #[arg(long)]
        asset_key: Option<String>,

        #[arg(long)]
        asset_kind: Option<AssetKind>,

        #[arg(long, default_value_t = 0)]
        page_size: usize,

        #[arg(long, default_value = "")]
        page_token: String,
    },

    /// Resolve the input assets of a task
    Inputs {
        task: TaskKey,
    },

    /// Print a fresh random key for use in transaction files
    Keygen,

    /// Write the default configuration to ~/.fedflow/fedflow.toml
    InitConfig {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    fedflow::log::init(cli.debug);
    let config = Config::load()?;
    if !cli.debug {
        if let Some(level) = config.log_level.as_deref().and_then(|l| l.parse().ok()) {
            fedflow::log::set_level(level);
        }
    }

    match cli.command {
        Command::InitConfig { force } => run_init_config(&config, force),
        Command::Keygen => {
            println!("{}", uuid::Uuid::new_v4());
            Ok(())
        }
        command => {
            let path = match &cli.store {
                Some(path) => path.clone(),
                None => config.effective_store_path()?,
            };
            let store = FileStore::open(&path)?;
            let mut orchestrator = Orchestrator::with_config(store, &config);
            run_store_command(&mut orchestrator, command)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_store_command(orchestrator: &mut Orchestrator<FileStore>, command: Command) -> Result<()> {
    match command {
        Command::Submit { file } => run_submit(orchestrator, &file),
        Command::Plan { key } => {
            let plan = orchestrator.get_compute_plan(&key)?;
            let running = orchestrator.is_plan_running(&key)?;
            print_json(&serde_json::json!({ "plan": plan, "running": running }))
        }
        Command::Tasks {
            plan,
            status,
            worker,
            page_size,
            page_token,
        } => {
            let filter = TaskFilter {
                plan_key: plan,
                status,
                worker,
            };
            let page = orchestrator
                .query_compute_tasks(&filter, &Pagination::after(page_size, &page_token))?;
            print_json(&page)
        }
        Command::Events {
            asset_key,
            asset_kind,
            page_size,
            page_token,
        } => {
            let filter = EventFilter {
                asset_kind,
                asset_key,
                event_kind: None,
            };
            let page =
                orchestrator.query_events(&filter, &Pagination::after(page_size, &page_token))?;
            print_json(&page)
        }
        Command::Inputs { task } => print_json(&orchestrator.get_task_input_assets(&task)?),
        Command::Keygen | Command::InitConfig { .. } => Ok(()),
    }
}

/// Apply transactions one by one. Each success is flushed before the next
/// transaction runs, so a failure keeps everything accepted before it.
fn run_submit(orchestrator: &mut Orchestrator<FileStore>, file: &Path) -> Result<()> {
    let raw = fs::read_to_string(file)?;
    let transactions: Vec<Transaction> = serde_json::from_str(&raw)?;
    flog!(
        "submitting {} transactions from {}",
        transactions.len(),
        file.display()
    );

    for tx in &transactions {
        match orchestrator.submit(tx) {
            Ok(result) => {
                orchestrator.store_mut().flush()?;
                print_json(&serde_json::json!({
                    "tx_id": tx.tx_id,
                    "request": tx.request.name(),
                    "result": result,
                }))?;
            }
            Err(e) => {
                flog_error!("transaction {} failed: {}", tx.tx_id, e);
                eprintln!(
                    "transaction {} ({}) failed: {} [kind={} key={}]",
                    tx.tx_id,
                    tx.request.name(),
                    e,
                    e.kind(),
                    e.key().unwrap_or("-")
                );
                return Err(e);
            }
        }
    }
    Ok(())
}

fn run_init_config(config: &Config, force: bool) -> Result<()> {
    let path = Config::config_path()?;
    if path.exists() && !force {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    config.save()?;
    println!("Wrote {}", path.display());
    Ok(())
}
