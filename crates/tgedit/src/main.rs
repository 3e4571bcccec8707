use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use tgedit_core::{
    batch::{batch_replace, BatchAction, BatchRequest},
    config::Config,
    markup,
    store::MessageArchive,
    utils::iso_timestamp_utc,
};

/// Search and replace across an archived channel without losing formatting.
#[derive(Debug, Parser)]
#[command(name = "tgedit", version)]
struct Cli {
    /// Message archive (defaults to TGEDIT_DB_PATH, then messages.json).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Channel id in the archive (defaults to TGEDIT_CHANNEL, then the
    /// archive's active channel, then its only channel).
    #[arg(long, global = true, allow_hyphen_values = true)]
    channel: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replace a literal string in every archived message.
    Replace {
        #[arg(long, allow_hyphen_values = true)]
        search: String,
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        replace: String,
        #[arg(long)]
        ignore_case: bool,
        /// Report what would change without writing the archive.
        #[arg(long)]
        dry_run: bool,
        /// Also apply edits whose match cuts through a formatting span.
        #[arg(long)]
        allow_boundary_crossing: bool,
    },
    /// Print one message as plain text, markup and spans.
    Show {
        #[arg(long)]
        id: i64,
    },
}

fn main() -> Result<()> {
    tgedit_core::logging::init("tgedit")?;

    let cli = Cli::parse();
    let cfg = Config::load()?;
    let db_path = cli.db.unwrap_or_else(|| cfg.db_path.clone());
    let channel = cli.channel.or_else(|| cfg.channel.clone());

    match cli.command {
        Command::Replace {
            search,
            replace,
            ignore_case,
            dry_run,
            allow_boundary_crossing,
        } => {
            let mut archive = load_archive(&db_path)?;
            let request = BatchRequest {
                channel: archive.resolve_channel(channel.as_deref())?,
                search,
                replace,
                case_sensitive: cfg.case_sensitive && !ignore_case,
                dry_run: cfg.dry_run || dry_run,
                allow_boundary_crossing: cfg.allow_boundary_crossing || allow_boundary_crossing,
            };
            run_replace(&db_path, &mut archive, &request)
        }
        Command::Show { id } => {
            let archive = load_archive(&db_path)?;
            let channel = archive.resolve_channel(channel.as_deref())?;
            run_show(&archive, &channel, id)
        }
    }
}

fn load_archive(db_path: &Path) -> Result<MessageArchive> {
    MessageArchive::load(db_path).with_context(|| format!("loading {}", db_path.display()))
}

fn run_replace(
    db_path: &Path,
    archive: &mut MessageArchive,
    request: &BatchRequest,
) -> Result<()> {
    let report = batch_replace(archive, request, &iso_timestamp_utc())?;

    for item in &report.items {
        let label = match &item.action {
            BatchAction::Applied => "applied".to_string(),
            BatchAction::WouldApply => "would apply".to_string(),
            BatchAction::SkippedBoundaryCrossing => "skipped (crosses formatting)".to_string(),
            BatchAction::Failed(reason) => format!("failed: {reason}"),
        };
        println!("#{} {label}, {} match(es)", item.message_id, item.matches);
        if !matches!(item.action, BatchAction::Failed(_)) {
            println!("  - {}", item.before);
            println!("  + {}", item.after);
        }
    }

    println!(
        "{} message(s) changed, {} skipped, {} failed, {} replacement(s)",
        report.applied(),
        report.skipped(),
        report.failed(),
        report.total_matches()
    );

    if request.dry_run || report.applied() == 0 {
        return Ok(());
    }

    archive
        .save(db_path)
        .with_context(|| format!("saving {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "archive saved");
    Ok(())
}

fn run_show(archive: &MessageArchive, channel: &str, id: i64) -> Result<()> {
    let record = archive.require(channel, id)?;
    let rich = record.rich_text()?;

    println!("text:   {}", rich.text());
    println!("markup: {}", markup::unparse(&rich));
    for span in rich.spans() {
        println!("  [{}, {}) {}", span.offset, span.end(), span.kind.tag());
    }
    if !record.edit_history.is_empty() {
        println!("edits:  {}", record.edit_history.len());
    }
    Ok(())
}
