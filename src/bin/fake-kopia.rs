//! A fake kopia binary for testing and development.
//!
//! This binary mimics the `--json` output of the real kopia CLI tool for
//! `snapshot list` and `snapshot create`. Used primarily for testing
//! kopia-metrics without requiring a real kopia installation.
//!
//! Environment variables:
//! - `FAKE_KOPIA_LOG`: append each invocation's arguments to this file
//! - `FAKE_KOPIA_SLEEP_FOR_SECS`: sleep before answering (`forever` if not a number)
//! - `FAKE_KOPIA_FAIL`: exit with an error instead of answering

use clap::{Parser, Subcommand};
use eyre::Result;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fake-kopia")]
#[command(about = "A stand-in for kopia during development")]
struct Cli {
    /// Repository config file (accepted and ignored)
    #[arg(long, global = true)]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot operations
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// List snapshots
    List {
        /// Maximum number of snapshots per source
        #[arg(short = 'n', long = "max-results")]
        max_results: Option<u32>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Create a snapshot
    Create {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
        /// Source to record instead of the local `user@host:path`
        #[arg(long)]
        override_source: Option<String>,
        /// Directory to snapshot
        path: PathBuf,
    },
}

#[derive(Clone, Copy, Debug)]
enum Sleep {
    ForSecs(f64),
    Forever,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let sleep = std::env::var("FAKE_KOPIA_SLEEP_FOR_SECS")
        .ok()
        .map(|secs| secs.parse().map_or(Sleep::Forever, Sleep::ForSecs));

    // Log each invocation to a file for testing purposes
    log_invocation(sleep)?;

    if let Some(sleep) = sleep {
        match sleep {
            Sleep::ForSecs(secs) => {
                std::thread::sleep(std::time::Duration::from_secs_f64(secs));
            }
            Sleep::Forever => loop {
                std::thread::sleep(std::time::Duration::from_secs(1));
            },
        }
    }

    if std::env::var("FAKE_KOPIA_FAIL").is_ok() {
        eyre::bail!("fake-kopia: simulated failure");
    }

    match cli.command {
        Commands::Snapshot { action } => handle_snapshot_command(action),
    }
}

fn log_invocation(sleep: Option<Sleep>) -> Result<()> {
    if let Ok(log_path) = std::env::var("FAKE_KOPIA_LOG") {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;
        let args = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
        writeln!(file, "{args}, {sleep:?}")?;
    }
    Ok(())
}

fn handle_snapshot_command(action: SnapshotAction) -> Result<()> {
    match action {
        SnapshotAction::List { json, .. } => {
            if !json {
                eyre::bail!("fake-kopia only supports --json output for snapshot list");
            }
            print!("{}", include_str!("../sample_kopia-snapshot-list.json"));
            Ok(())
        }
        SnapshotAction::Create {
            json,
            override_source,
            path,
        } => {
            if !json {
                eyre::bail!("fake-kopia only supports --json output for snapshot create");
            }
            print_created_snapshot(override_source.as_deref(), &path)
        }
    }
}

/// Prints the sample created snapshot, with its source replaced by the requested one
fn print_created_snapshot(override_source: Option<&str>, path: &std::path::Path) -> Result<()> {
    let mut snapshot: serde_json::Value =
        serde_json::from_str(include_str!("../sample_kopia-snapshot-create.json"))?;

    let (user_name, host, path) = match override_source {
        Some(source) => {
            let Some((user_name, rest)) = source.split_once('@') else {
                eyre::bail!("invalid --override-source {source:?}, expected user@host:path");
            };
            let Some((host, path)) = rest.split_once(':') else {
                eyre::bail!("invalid --override-source {source:?}, expected user@host:path");
            };
            (user_name.to_string(), host.to_string(), path.to_string())
        }
        None => (
            "fake-user".to_string(),
            "fake-host".to_string(),
            path.display().to_string(),
        ),
    };

    let Some(source) = snapshot.get_mut("source") else {
        eyre::bail!("Sample JSON snapshot must have a source field");
    };
    *source = serde_json::json!({
        "host": host,
        "userName": user_name,
        "path": path,
    });

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
