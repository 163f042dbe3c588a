//! Kopia Metrics - Prometheus gauges for Kopia backup snapshots.
//!
//! `serve` polls the repository and exposes the gauges for scraping;
//! `snapshot` creates one snapshot and pushes its gauges to a Pushgateway.

use clap::{Parser, Subcommand};
use kopia_metrics::exporter::{self, SnapshotJob};
use kopia_metrics::metrics::Gateway;
use kopia_metrics::{KopiaCommand, LabelSchema, Metrics, MetricsConfig, MetricsRegistry, ZfsCommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Kopia binary path
    #[arg(short, long, global = true, default_value = "kopia")]
    kopia_bin: String,

    /// Kopia config file, passed through as `--config-file`
    #[arg(long, global = true)]
    config_file: Option<PathBuf>,

    /// Timeout for each external command, in seconds
    #[arg(long, global = true, default_value = "60", value_parser = parse_seconds)]
    timeout: Duration,

    /// Labels identifying each time series
    #[arg(long, global = true, value_enum, default_value_t = LabelSchema::Source)]
    label_schema: LabelSchema,

    /// Prefix for every metric name, e.g. `backup` for `backup_total_size_bytes`
    #[arg(long, global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll `kopia snapshot list` and serve the gauges for scraping
    Serve {
        /// Port for the metrics endpoint
        #[arg(short, long, default_value_t = 8123)]
        port: u16,

        /// Seconds between polls
        #[arg(long, default_value_t = 600)]
        interval_seconds: u64,
    },
    /// Create a snapshot and push its gauges to a Pushgateway
    Snapshot {
        /// Directory to snapshot
        path: PathBuf,

        /// ZFS snapshot to create before and destroy after the kopia snapshot
        #[arg(long)]
        zfs: Option<String>,

        /// ZFS binary path
        #[arg(long, default_value = "zfs")]
        zfs_bin: String,

        /// Passed through to `kopia snapshot create --override-source`
        #[arg(long)]
        override_source: Option<String>,

        /// Pushgateway address, `host:port` with optional `http://` or `https://`
        #[arg(long, default_value = "localhost:9091")]
        gateway_address: String,

        /// Pushgateway job name
        #[arg(long, default_value = "kopia-gw")]
        job_name: String,

        /// Timeout for the push, in seconds
        #[arg(long, default_value = "10", value_parser = parse_seconds)]
        push_timeout: Duration,
    },
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value.parse().map_err(|e| format!("{e}"))?;
    Duration::try_from_secs_f64(seconds).map_err(|e| format!("{e}"))
}

impl Args {
    fn kopia(&self) -> KopiaCommand {
        KopiaCommand::new(self.kopia_bin.clone())
            .with_config_file(self.config_file.clone())
            .with_timeout(self.timeout)
    }

    fn metrics_config(&self) -> MetricsConfig {
        MetricsConfig {
            schema: self.label_schema,
            namespace: self.namespace.clone(),
        }
    }
}

fn serve(args: &Args, port: u16, interval: Duration) -> eyre::Result<()> {
    let metrics = Metrics::new(MetricsRegistry::process_wide(), &args.metrics_config())?;
    let handle = metrics.serve(port)?;
    tracing::info!("Listening on port {}", handle.local_addr().port());

    let kopia = args.kopia();
    loop {
        match exporter::poll_cycle(&metrics, &kopia) {
            Ok(count) => tracing::info!(count, "Finished refreshing data"),
            Err(e) => tracing::error!("Failed to refresh data: {e:?}"),
        }
        std::thread::sleep(interval);
    }
}

fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match &args.command {
        Command::Serve {
            port,
            interval_seconds,
        } => serve(&args, *port, Duration::from_secs(*interval_seconds)),
        Command::Snapshot {
            path,
            zfs,
            zfs_bin,
            override_source,
            gateway_address,
            job_name,
            push_timeout,
        } => {
            let zfs_command = ZfsCommand::new(zfs_bin.clone()).with_timeout(args.timeout);
            let gateway = Gateway::new(gateway_address).with_timeout(*push_timeout);
            let key = exporter::snapshot_and_push(
                &args.kopia(),
                &SnapshotJob {
                    path,
                    override_source: override_source.as_deref(),
                    zfs: zfs.as_deref().map(|name| (&zfs_command, name)),
                    gateway: &gateway,
                    job_name,
                    config: &args.metrics_config(),
                },
            )?;
            println!("Pushed metrics for {key}");
            Ok(())
        }
    }
}
