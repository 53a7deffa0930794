//! Command line front end for the notebooks store.
//!
//! # Responsibility
//! - Import a document into a store, asking conflict questions on stdin.
//! - Export a store as a canonical import document.
//!
//! The import runs on a worker thread; this thread only serves prompts and
//! prints progress to stderr.

use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};
use notebooks_core::db::open_db;
use notebooks_core::{
    default_log_level, export_store, init_logging, prompt_channel, spawn_import, write_tree,
    ConflictChoice, ConflictDecision, ConflictPrompt, DecisionProvider, FixedDecision,
    ImportError, ImportHandle, ImportJob, ImportOptions, ImportReport, ProgressSink,
    ReadOnlyMode, SqliteRecordRepository,
};
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "notebooks", about = "Import and export notebook stores", version)]
struct Cli {
    /// SQLite store path
    #[arg(long, global = true, default_value = "notebooks.db")]
    db: PathBuf,

    /// Directory for rolling log files (logging is off when omitted)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// trace|debug|info|warn|error
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Merge an import document into the store
    Import {
        /// Import document path
        file: PathBuf,
        /// Where `<file stem>.assets` is copied
        #[arg(long)]
        assets_dir: Option<PathBuf>,
        /// How title conflicts are resolved
        #[arg(long, value_enum, default_value = "ask")]
        policy: Policy,
    },

    /// Write the whole store as an import document (`-` for stdout)
    Export {
        file: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Policy {
    Overwrite,
    Skip,
    Update,
    Rename,
    /// Prompt for every conflict
    Ask,
}

impl Policy {
    fn fixed_choice(self) -> Option<ConflictChoice> {
        match self {
            Self::Overwrite => Some(ConflictChoice::Overwrite),
            Self::Skip => Some(ConflictChoice::Skip),
            Self::Update => Some(ConflictChoice::Update),
            Self::Rename => Some(ConflictChoice::Rename),
            Self::Ask => None,
        }
    }
}

/// Prints progress to stderr.
struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn set_text(&self, text: &str) {
        eprintln!("{text}");
    }

    fn set_fraction(&self, fraction: f64) {
        eprintln!("  {:>3.0}%", fraction * 100.0);
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(message) = setup_logging(&cli) {
        eprintln!("warning: logging disabled: {message}");
    }

    let outcome = match cli.command {
        Command::Import {
            file,
            assets_dir,
            policy,
        } => run_import(cli.db, file, assets_dir, policy),
        Command::Export { file } => run_export(&cli.db, &file),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(cli: &Cli) -> Result<(), String> {
    let Some(log_dir) = cli.log_dir.as_ref() else {
        return Ok(());
    };
    let log_dir = if log_dir.is_absolute() {
        log_dir.clone()
    } else {
        std::env::current_dir()
            .map_err(|err| format!("cannot resolve current directory: {err}"))?
            .join(log_dir)
    };
    let level = cli.log_level.as_deref().unwrap_or(default_log_level());
    let log_dir = log_dir
        .to_str()
        .ok_or_else(|| format!("log_dir is not valid UTF-8: {}", log_dir.display()))?;
    init_logging(level, log_dir)
}

fn run_import(
    db_path: PathBuf,
    import_path: PathBuf,
    asset_target_dir: Option<PathBuf>,
    policy: Policy,
) -> Result<(), String> {
    let job = ImportJob {
        db_path,
        import_path,
        options: ImportOptions {
            asset_target_dir,
            ..ImportOptions::default()
        },
    };
    let read_only = ReadOnlyMode::new();

    let result = match policy.fixed_choice() {
        Some(choice) => spawn(job, read_only, FixedDecision(choice))?.join(),
        None => {
            let (decisions, responder) = prompt_channel();
            let handle = spawn(job, read_only, decisions)?;
            let stdin = io::stdin();
            let mut input = stdin.lock();
            responder.serve(|prompt| ask(prompt, &mut input));
            handle.join()
        }
    };

    match result {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(err) => {
            if let ImportError::Unexpected { committed, .. } = &err {
                eprintln!("{committed} notebook(s) were imported before the failure");
            }
            Err(err.to_string())
        }
    }
}

fn spawn(
    job: ImportJob,
    read_only: ReadOnlyMode,
    decisions: impl DecisionProvider + Send + 'static,
) -> Result<ImportHandle, String> {
    spawn_import(job, read_only, decisions, StderrProgress)
        .map_err(|err| format!("cannot start import worker: {err}"))
}

/// Reads one answer. A trailing `!` (e.g. `s!`) applies it to all remaining
/// conflicts. End of input cancels.
fn ask(prompt: &ConflictPrompt, input: &mut impl BufRead) -> ConflictDecision {
    loop {
        eprint!(
            "Notebook `{}` already exists. [o]verwrite [s]kip [u]pdate [r]ename [c]ancel (add ! for all): ",
            prompt.title
        );
        let _ = io::stderr().flush();

        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) | Err(_) => return ConflictDecision::cancel(),
            Ok(_) => {}
        }
        if let Some(decision) = parse_answer(&line) {
            return decision;
        }
        eprintln!("unrecognized answer `{}`", line.trim());
    }
}

fn parse_answer(line: &str) -> Option<ConflictDecision> {
    let trimmed = line.trim();
    let (word, remember) = match trimmed.strip_suffix('!') {
        Some(word) => (word.trim(), true),
        None => (trimmed, false),
    };
    let choice = match word.to_ascii_lowercase().as_str() {
        "o" => ConflictChoice::Overwrite,
        "s" => ConflictChoice::Skip,
        "u" => ConflictChoice::Update,
        "r" => ConflictChoice::Rename,
        "c" => ConflictChoice::CancelAll,
        other => other.parse().ok()?,
    };
    Some(if remember {
        ConflictDecision::always(choice)
    } else {
        ConflictDecision::once(choice)
    })
}

fn print_report(report: &ImportReport) {
    println!(
        "import {} ({}/{} notebooks)",
        report.status.as_str(),
        report.processed,
        report.total
    );
    for outcome in &report.outcomes {
        println!(
            "  {:<9} {}  +{} chapters, +{} notes, ~{} notes",
            outcome.action.as_str(),
            outcome.title,
            outcome.stats.chapters_inserted,
            outcome.stats.notes_inserted,
            outcome.stats.notes_updated
        );
    }
}

fn run_export(db_path: &Path, target: &Path) -> Result<(), String> {
    let conn = open_db(db_path).map_err(|err| err.to_string())?;
    let repo = SqliteRecordRepository::try_new(&conn).map_err(|err| err.to_string())?;
    let tree = export_store(&repo).map_err(|err| err.to_string())?;

    let written = if target == Path::new("-") {
        write_tree(&tree, io::stdout().lock())
    } else {
        let file = File::create(target)
            .map_err(|err| format!("cannot create `{}`: {err}", target.display()))?;
        write_tree(&tree, BufWriter::new(file))
    };

    match written {
        Ok(()) => {
            info!(
                "event=export_store module=cli status=ok notebooks={} notes={}",
                tree.len(),
                tree.note_count()
            );
            Ok(())
        }
        Err(err) => {
            error!("event=export_store module=cli status=error error={err}");
            Err(err.to_string())
        }
    }
}
