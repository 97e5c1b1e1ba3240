use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use meet_ledger::{
    audit, export_meets_csv, import_archive, logging, open_database, queue, registry_counts,
    ArchiveIngestor, IngestConfig, Scheduler,
};

#[derive(Parser)]
#[command(name = "meet-ledger", version, about = "Ingest meet result archives into a SQLite registry")]
struct Cli {
    /// TOML configuration file
    #[arg(long, short, env = "MEET_LEDGER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// SQLite database (overrides config)
    #[arg(long, env = "MEET_LEDGER_DB", global = true)]
    db: Option<PathBuf>,

    /// Managed archive directory (overrides config)
    #[arg(long, env = "MEET_LEDGER_RESULTS_DIR", global = true)]
    results_dir: Option<PathBuf>,

    /// Region codes JSON (overrides config)
    #[arg(long, env = "MEET_LEDGER_REGION_CODES", global = true)]
    region_codes: Option<PathBuf>,

    /// trace, debug, info, warn or error (overrides config)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse every pending queue item
    Run,
    /// Copy archives into the results directory and queue them
    Import {
        /// Region label, also the sub-directory name
        #[arg(long, default_value = "Manual")]
        region: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Queue downloaded meets: all unparsed ones, or a region / meet name (parsed ones too)
    Enqueue {
        /// Region label given at download or import
        #[arg(long, conflicts_with = "meet")]
        region: Option<String>,
        /// Exact meet display name
        #[arg(long)]
        meet: Option<String>,
    },
    /// Write all meets to a CSV file
    Export { output: PathBuf },
    /// Show registry and queue counts
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = IngestConfig::load_or_default(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    if let Some(dir) = cli.results_dir {
        config.results_dir = dir;
    }
    if let Some(path) = cli.region_codes {
        config.region_codes_path = Some(path);
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    logging::init_logging(&config.log_level, config.log_json)?;

    let conn = open_database(&config.database_path, config.busy_timeout())
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?;

    match cli.command {
        Command::Run => run(&conn, &config),
        Command::Import { region, files } => import(&conn, &config, &region, &files),
        Command::Enqueue { region, meet } => {
            let count = match (region, meet) {
                (Some(region), _) => queue::enqueue_region(&conn, &region)?,
                (None, Some(meet)) => queue::enqueue_meet_named(&conn, &meet)?,
                (None, None) => queue::enqueue_unparsed(&conn)?,
            };
            println!("✓ Queued {} meet(s)", count);
            Ok(())
        }
        Command::Export { output } => {
            let rows = export_meets_csv(&conn, &output)?;
            println!("✓ Exported {} meet(s) to {}", rows, output.display());
            Ok(())
        }
        Command::Status => status(&conn),
    }
}

fn run(conn: &rusqlite::Connection, config: &IngestConfig) -> Result<()> {
    println!("🏊 Parsing queued meets");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let regions = config.region_directory()?;
    let scheduler = Scheduler::new(conn, ArchiveIngestor::new(regions), config.retry_policy());
    let summary = scheduler.run().context("Parse run aborted")?;

    if summary.recovered > 0 {
        println!("↺ Recovered {} interrupted item(s)", summary.recovered);
    }
    println!("✅ Done:   {}", summary.done);
    println!("❌ Failed: {}", summary.failed);
    Ok(())
}

fn import(
    conn: &rusqlite::Connection,
    config: &IngestConfig,
    region: &str,
    files: &[PathBuf],
) -> Result<()> {
    println!("📥 Importing {} archive(s) into {}", files.len(), region);

    let mut failed = 0;
    for file in files {
        match import_archive(conn, file, &config.results_dir, region) {
            Ok(imported) => println!("✓ {} → meet {}", file.display(), imported.meet_id),
            Err(err) => {
                failed += 1;
                eprintln!("❌ {}: {}", file.display(), err);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} archive(s) failed to import", failed, files.len());
    }
    Ok(())
}

fn status(conn: &rusqlite::Connection) -> Result<()> {
    let counts = registry_counts(conn)?;
    let queued = queue::status_counts(conn)?;
    let duplicates = audit::entries_by_kind(conn, meet_ledger::AuditKind::DuplicateMeet)?;

    println!("📊 Registry");
    println!("   Meets:        {}", counts.meets);
    println!("   Teams:        {}", counts.teams);
    println!("   Participants: {}", counts.participants);
    println!("   Links:        {}", counts.meet_teams + counts.meet_participants + counts.meet_team_participants);
    println!("📋 Queue");
    println!("   Pending:    {}", queued.pending);
    println!("   Processing: {}", queued.processing);
    println!("   Done:       {}", queued.done);
    println!("   Error:      {}", queued.error);
    if !duplicates.is_empty() {
        println!("⚠️  {} duplicate meet(s) flagged", duplicates.len());
    }
    Ok(())
}
