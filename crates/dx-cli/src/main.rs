//! Operator entrypoint for the deal extraction service.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dx_database::delete::delete_tasks;
use dx_database::export::{ExportOptions, ExportTable, export_csv};
use dx_database::init::pool_from_env;
use dx_database::schema::ensure_schema;
use dx_database::tasks::{count_deals_for_task, count_tasks, create_task, list_tasks};
use dx_engine::{ProcessConfig, process_tasks};
use dx_manager::{BridgeConfig, BridgeManagerClient};
use dx_types::NewTask;

#[derive(Parser)]
#[command(name = "dx", about = "Deal extraction: tasks, ingestion runs, exports")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database schema (idempotent).
    Init,
    /// Create an ingestion task for one time window.
    Create {
        /// Task date, YYYY-MM-DD.
        #[arg(long)]
        date: NaiveDate,
        /// Window start, HH:MM or HH:MM:SS.
        #[arg(long)]
        start: String,
        /// Window end, HH:MM or HH:MM:SS.
        #[arg(long)]
        end: String,
    },
    /// List all tasks, newest window first.
    List,
    /// Run ingestion passes for the given task ids.
    Process {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Delete tasks and their deal rows.
    Delete {
        #[arg(required = true)]
        ids: Vec<i64>,
        #[arg(long, default_value_t = dx_database::delete::DEFAULT_DELETE_BATCH)]
        batch: u64,
    },
    /// Export a table as CSV to a file or stdout.
    Export {
        #[arg(long, value_enum, default_value_t = TableArg::Deals)]
        table: TableArg,
        /// Restrict a deals export to one task.
        #[arg(long)]
        task_id: Option<i64>,
        /// Restrict a tasks export to one date.
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Output file; stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TableArg {
    Deals,
    Tasks,
}

fn parse_time(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .with_context(|| format!("invalid time '{raw}', expected HH:MM or HH:MM:SS"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let pool = pool_from_env()?;

    match cli.cmd {
        Command::Init => {
            ensure_schema(&pool).await?;
            info!("schema ready");
        }
        Command::Create { date, start, end } => {
            let task =
                create_task(&pool, NewTask::new(date, parse_time(&start)?, parse_time(&end)?))
                    .await?;
            println!(
                "created task {} for {} {}..{}",
                task.id, task.date, task.start_time, task.end_time
            );
        }
        Command::List => {
            let total = count_tasks(&pool).await?;
            for task in list_tasks(&pool).await? {
                let deals = count_deals_for_task(&pool, task.id).await?;
                println!(
                    "{:>6}  {}  {}..{}  {:<10}  {} deals",
                    task.id,
                    task.date,
                    task.start_time,
                    task.end_time,
                    task.status.as_str(),
                    deals
                );
            }
            println!("{total} task(s)");
        }
        Command::Process { ids } => {
            let cfg = ProcessConfig::from_env();
            let manager = Arc::new(BridgeManagerClient::new(BridgeConfig::from_env()?));
            let outcome = process_tasks(&pool, manager, &ids, &cfg).await?;
            println!("succeeded: {:?}", outcome.succeeded);
            println!("failed:    {:?}", outcome.failed);
            if !outcome.failed.is_empty() {
                bail!("{} task(s) failed", outcome.failed.len());
            }
        }
        Command::Delete { ids, batch } => {
            let outcome = delete_tasks(&pool, &ids, batch).await;
            println!("deleted:   {:?}", outcome.succeeded);
            println!("failed:    {:?}", outcome.failed);
            if !outcome.failed.is_empty() {
                bail!("{} task(s) not deleted", outcome.failed.len());
            }
        }
        Command::Export { table, task_id, date, out } => {
            let table = match table {
                TableArg::Deals => ExportTable::Deals,
                TableArg::Tasks => ExportTable::Tasks,
            };
            let opts = ExportOptions { task_id, date, ..ExportOptions::default() };
            let rows = match out {
                Some(path) => {
                    let mut file = std::fs::File::create(&path)
                        .with_context(|| format!("cannot create {}", path.display()))?;
                    let rows = export_csv(&pool, table, &opts, &mut file).await?;
                    file.flush()?;
                    println!("wrote {} rows to {}", rows, path.display());
                    rows
                }
                None => {
                    let mut stdout = std::io::stdout().lock();
                    export_csv(&pool, table, &opts, &mut stdout).await?
                }
            };
            info!(rows, "export finished");
        }
    }
    Ok(())
}
