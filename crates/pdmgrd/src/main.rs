//! pdmgrd - IPv6 prefix delegation manager daemon
//!
//! Reads router lifecycle events as JSON lines on stdin and writes learned
//! prefix updates as JSON lines on stdout. SIGHUP (sent by the lease-event
//! hook) triggers an immediate PD client run.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sonic_pdmgrd::config::DEFAULT_CONFIG_PATH;
use sonic_pdmgrd::{
    run_event_feed, run_process_monitor, ChannelNotifier, DibblerClient, DibblerSettings,
    ExternalProcessManager, IpCommandDriver, PdDriver, PdMgr, PdWaker, PdmgrdConfig, PrefixUpdate,
};
use tokio::io::BufReader;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// SONiC IPv6 prefix delegation manager
#[derive(Parser, Debug)]
#[command(name = "pdmgrd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Override the PD working area from the configuration file
    #[arg(long)]
    pd_confs: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("--- Starting pdmgrd ---");

    match run(args).await {
        Ok(()) => {
            info!("pdmgrd: Graceful shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("pdmgrd: Fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> anyhow::Result<()> {
    // Recovered clients may signal before startup completes
    let mut hangup = signal(SignalKind::hangup()).context("installing SIGHUP handler")?;
    let mut terminate = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;

    let mut config = PdmgrdConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(pd_confs) = args.pd_confs {
        config.pd.pd_confs = pd_confs;
    }
    config.validate()?;

    std::fs::create_dir_all(&config.pd.pd_confs)
        .with_context(|| format!("creating {}", config.pd.pd_confs.display()))?;
    info!(
        pd_confs = %config.pd.pd_confs.display(),
        run_interval_secs = config.driver.run_interval_secs,
        "pdmgrd: Configuration loaded"
    );

    let supervisor = Arc::new(ExternalProcessManager::new());
    let client = Arc::new(DibblerClient::new(
        DibblerSettings::from_config(&config.pd, std::process::id()),
        supervisor.clone(),
    ));
    let (notifier, updates) = ChannelNotifier::new();
    let waker = PdWaker::new();

    let mgr = Arc::new(PdMgr::new(
        Arc::new(IpCommandDriver::new()),
        client,
        Arc::new(notifier),
        waker.clone(),
        config.prober_config(),
    ));

    let shutdown = CancellationToken::new();
    let mut tasks = Vec::new();

    let driver = PdDriver::new(mgr.clone(), waker, config.run_interval());
    tasks.push(tokio::spawn(driver.run(shutdown.clone())));

    if config.process_monitor.enabled {
        tasks.push(tokio::spawn(run_process_monitor(
            supervisor,
            config.monitor_interval(),
            shutdown.clone(),
        )));
    }

    tasks.push(tokio::spawn(run_event_feed(
        mgr.clone(),
        BufReader::new(tokio::io::stdin()),
        shutdown.clone(),
    )));
    tasks.push(tokio::spawn(publish_updates(updates, shutdown.clone())));

    info!("pdmgrd: Listening for router events...");
    loop {
        tokio::select! {
            _ = hangup.recv() => mgr.on_restart_signal(),
            _ = terminate.recv() => {
                info!("pdmgrd: Received SIGTERM");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("pdmgrd: Received SIGINT");
                break;
            }
        }
    }

    shutdown.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "pdmgrd: Task ended abnormally");
        }
    }
    Ok(())
}

/// Emits each prefix update as a JSON line on stdout.
async fn publish_updates(mut updates: UnboundedReceiver<PrefixUpdate>, shutdown: CancellationToken) {
    loop {
        let update = tokio::select! {
            _ = shutdown.cancelled() => break,
            update = updates.recv() => match update {
                Some(update) => update,
                None => break,
            },
        };
        info!(?update, "Prefix update");
        match serde_json::to_string(&update) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!(error = %e, "Failed to encode prefix update"),
        }
    }
}
