use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use tdpctl::common::arch::{CpuVendor, CPU_VENDOR};
use tdpctl::daemon::config::DaemonConfig;
use tdpctl::daemon::{http, Daemon};
use tdpctl::limits::types::{Pl1Update, Pl2Update, PowerLimitUpdate};
use tdpctl::render::{render, PrintFormat};
use tdpctl::{Platform, RegisterSpace, SpaceSelection};

#[derive(Parser, Debug)]
#[command(name = "tdpctl")]
#[command(about = "Read and rewrite the CPU package power limit (TDP)")]
struct Args {
    #[arg(long, help = "Set the PL1 (sustained) power limit in watts")]
    pl1: Option<u32>,

    #[arg(long, help = "Set the PL2 (burst) power limit in watts")]
    pl2: Option<u32>,

    #[arg(long, help = "Set the PL1 clamping bit")]
    clamping1: Option<bool>,

    #[arg(long, help = "Set the PL2 clamping bit")]
    clamping2: Option<bool>,

    #[arg(long, help = "Set the PL1 time window in seconds")]
    time1: Option<u32>,

    #[arg(long, help = "Set the PL2 enable bit")]
    enable2: Option<bool>,

    #[arg(long, conflicts_with = "force_amd", help = "Treat the CPU as Intel")]
    force_intel: bool,

    #[arg(long, conflicts_with = "force_intel", help = "Treat the CPU as AMD")]
    force_amd: bool,

    #[arg(
        long,
        conflicts_with = "mmio",
        help = "Only touch the MSR copy of the register (Intel only)"
    )]
    msr: bool,

    #[arg(
        long,
        conflicts_with = "msr",
        help = "Only touch the MMIO copy of the register (Intel only)"
    )]
    mmio: bool,

    #[arg(long, help = "Run the reconciliation daemon with its HTTP API")]
    daemon: bool,

    #[arg(
        long,
        default_value = "127.0.0.1:14514",
        help = "Daemon listen address"
    )]
    listen: SocketAddr,

    #[arg(long, help = "Daemon config file (JSON)")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "table", help = "Output format")]
    print_format: PrintFormat,

    #[arg(
        short,
        long,
        help = "Enable verbose logging (shows every helper invocation)"
    )]
    verbose: bool,
}

impl Args {
    fn update(&self) -> PowerLimitUpdate {
        PowerLimitUpdate {
            pl1: Pl1Update {
                power: self.pl1,
                clamping: self.clamping1,
                time: self.time1,
            },
            pl2: Pl2Update {
                power: self.pl2,
                clamping: self.clamping2,
                enabled: self.enable2,
            },
        }
    }

    fn space(&self) -> Option<RegisterSpace> {
        if self.msr {
            Some(RegisterSpace::Msr)
        } else if self.mmio {
            Some(RegisterSpace::Mmio)
        } else {
            None
        }
    }
}

/// Resolve the vendor from CPUID, honoring the force flags
///
/// A force flag that contradicts a confident detection is refused; forcing is
/// meant for machines where CPUID reports an unknown vendor string.
fn resolve_vendor(args: &Args) -> anyhow::Result<CpuVendor> {
    let detected = *CPU_VENDOR;

    let forced = if args.force_intel {
        Some(CpuVendor::Intel)
    } else if args.force_amd {
        Some(CpuVendor::Amd)
    } else {
        None
    };

    match forced {
        None => Ok(detected),
        Some(forced) => {
            if detected != CpuVendor::Unknown && detected != forced {
                bail!(
                    "refusing to force {}: cpuid reports {}",
                    forced.name(),
                    detected.name()
                );
            }
            Ok(forced)
        }
    }
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Ctrl+C received"),
        _ = terminate => tracing::info!("SIGTERM received"),
    }

    tracing::info!("Shutdown signal received, initiating graceful shutdown...");
    cancel_token.cancel();
}

async fn run_daemon(args: &Args, platform: Platform) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => DaemonConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => DaemonConfig::default(),
    };
    tracing::info!("reconciliation interval: {}s", config.interval);

    let daemon = Daemon::new(platform, config);

    // Modify flags on the command line become the initial target
    let seed = args.update();
    if !seed.is_empty() {
        daemon.submit_target(seed).await?;
    }

    let cancel_token = CancellationToken::new();
    let loop_handle = {
        let daemon = Arc::clone(&daemon);
        let cancel = cancel_token.clone();
        tokio::spawn(async move { daemon.run(cancel).await })
    };

    let app = http::router(daemon);
    tracing::info!("Starting HTTP server on {}", args.listen);
    let listener = tokio::net::TcpListener::bind(args.listen).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel_token))
        .await?;

    tracing::info!("Server shutdown complete, waiting for reconciliation loop...");
    let _ = loop_handle.await;
    tracing::info!("All tasks completed, exiting");

    Ok(())
}

fn run_once(args: &Args, platform: Platform) -> anyhow::Result<()> {
    let update = args.update();

    if update.is_empty() {
        let limit = match args.space() {
            Some(space) => platform.power_limit_via(space)?,
            None => platform.power_limit()?,
        };
        print!("{}", render(&limit, args.print_format));
        return Ok(());
    }

    let selection = match args.space() {
        Some(RegisterSpace::Msr) => SpaceSelection::Msr,
        Some(RegisterSpace::Mmio) => SpaceSelection::Mmio,
        None => SpaceSelection::Both,
    };
    platform.update_power_limit_via(&update, selection)?;
    tracing::info!("power limit updated: {}", update.summary());

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(log_level).init();

    let vendor = resolve_vendor(&args)?;
    tracing::info!("Detected CPU vendor: {}", vendor.name());

    if (args.msr || args.mmio) && vendor != CpuVendor::Intel {
        bail!("--msr/--mmio only apply to the intel platform");
    }
    if (args.msr || args.mmio) && args.daemon {
        bail!("--msr/--mmio cannot be combined with --daemon; use the API's mode query instead");
    }

    let platform = Platform::from_environment(vendor)?;

    if args.daemon {
        run_daemon(&args, platform).await
    } else {
        run_once(&args, platform)
    }
}
