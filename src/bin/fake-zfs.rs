//! A fake zfs binary for testing.
//!
//! Accepts `snapshot <name>` and `destroy <name>`, appending each invocation to
//! the file named by `FAKE_ZFS_LOG`. Set `FAKE_ZFS_FAIL` to the subcommand
//! name (e.g. `destroy`) to make that subcommand fail.

use clap::{Parser, Subcommand};
use eyre::Result;
use std::fs::OpenOptions;
use std::io::Write;

#[derive(Parser)]
#[command(name = "fake-zfs")]
#[command(about = "A stand-in for zfs during development")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a snapshot
    Snapshot {
        /// Snapshot name, `dataset@name`
        name: String,
    },
    /// Destroy a snapshot
    Destroy {
        /// Snapshot name, `dataset@name`
        name: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (subcommand, name) = match &cli.command {
        Commands::Snapshot { name } => ("snapshot", name),
        Commands::Destroy { name } => ("destroy", name),
    };

    if let Ok(log_path) = std::env::var("FAKE_ZFS_LOG") {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;
        writeln!(file, "{subcommand} {name}")?;
    }

    if std::env::var("FAKE_ZFS_FAIL").is_ok_and(|fail| fail == subcommand) {
        eyre::bail!("fake-zfs: simulated {subcommand} failure for {name:?}");
    }
    Ok(())
}
