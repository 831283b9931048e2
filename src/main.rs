use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;

use drive_audit::auth;
use drive_audit::drive::{download, RemoteLister};
use drive_audit::index::DatabaseIndex;
use drive_audit::models::Verdict;
use drive_audit::progress::{create_progress_bar, create_spinner};
use drive_audit::reader::ExifToolReader;
use drive_audit::reconcile::run_check;

#[derive(Parser)]
#[command(name = "drive-audit")]
#[command(about = "Reconcile local media files against a Drive metadata listing")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Authorize and stream the remote metadata listing as JSON to stdout
    Download,

    /// Check local files against a previously downloaded database
    Check {
        /// Database file produced by `download`
        database: PathBuf,

        /// File paths to check; read newline-delimited from stdin when omitted
        paths: Vec<PathBuf>,

        /// Print a verdict summary to stderr when done
        #[arg(long, short)]
        verbose: bool,
    },
}

fn run_download() -> Result<()> {
    let client = reqwest::blocking::Client::new();
    let secret = auth::load_client_secret("client_secret.json")?;
    let token = auth::authorize(&client, &secret.installed)?;

    let lister = RemoteLister::new(&client, token);
    let stdout = std::io::stdout();
    download(&lister, &mut stdout.lock())
}

fn paths_from_stdin() -> Result<Vec<PathBuf>> {
    let stdin = std::io::stdin();
    let mut paths = Vec::new();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read file list from stdin")?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            paths.push(PathBuf::from(trimmed));
        }
    }
    Ok(paths)
}

fn run_checks(database: &PathBuf, paths: Vec<PathBuf>, verbose: bool) -> Result<()> {
    let spinner = create_spinner("Loading database");
    let index = DatabaseIndex::load(database)?;
    spinner.finish_with_message(format!("Loaded {} database records", index.len()));

    // Opening the session is the only per-run fatal step; everything after
    // this point is isolated per file.
    let mut reader = ExifToolReader::open()?;

    let paths = if paths.is_empty() {
        paths_from_stdin()?
    } else {
        paths
    };

    let pb = create_progress_bar(paths.len() as u64, "Checking files");
    let reports = run_check(&index, &mut reader, &paths, |report| {
        println!("{}: {}", report.path.display(), report.verdict);
        pb.inc(1);
    });
    pb.finish_with_message(format!("Checked {} files", reports.len()));

    if verbose {
        let mut ok = 0usize;
        let mut read_errors = 0usize;
        let mut no_key = 0usize;
        let mut no_name = 0usize;
        let mut ambiguous = 0usize;
        for report in &reports {
            match report.verdict {
                Verdict::Ok => ok += 1,
                Verdict::ReadError(_) => read_errors += 1,
                Verdict::NoMatchingKey => no_key += 1,
                Verdict::NoMatchingName => no_name += 1,
                Verdict::TooManyMatches => ambiguous += 1,
            }
        }
        eprintln!("ok: {}", ok);
        eprintln!("read errors: {}", read_errors);
        eprintln!("no matching key: {}", no_key);
        eprintln!("no matching name: {}", no_name);
        eprintln!("too many matches: {}", ambiguous);
    }

    // Per-file verdicts never fail the run; this is an audit tool.
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Download => run_download(),
        Command::Check {
            database,
            paths,
            verbose,
        } => run_checks(&database, paths, verbose),
    }
}
