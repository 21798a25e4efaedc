use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use droid_journey::config;
use droid_journey::context::RunContext;
use droid_journey::device::{AdbGateway, Device, LiveTail};
use droid_journey::profile::{AppProfile, builtin_journeys};
use droid_journey::runner::SmartRunner;
use droid_journey::session::Session;
use droid_journey::store::TestResultStore;
use droid_journey::wait::CancelToken;

/// Droid Journey - Android UI journey testing over adb
#[derive(Parser, Debug)]
#[command(
    name = "droid-journey",
    about = "Android UI journey testing with accessibility-tree capture and failure-prioritized runs",
    after_help = "ENVIRONMENT VARIABLES:\n\
        DROID_JOURNEY_ADB            Path to the adb binary\n\
        DROID_JOURNEY_SERIAL         Device serial for adb -s\n\
        DROID_JOURNEY_ARTIFACTS_DIR  Base directory for artifact sessions\n\
        DROID_JOURNEY_HISTORY_FILE   Test-result history file\n\
        DROID_JOURNEY_PACKAGE        Application package under test\n\
        DROID_JOURNEY_POLL_INTERVAL  Poll interval for waits (ms)\n\
        DROID_JOURNEY_WAIT_TIMEOUT   Default wait deadline (ms)\n\
        DROID_JOURNEY_STEP_BACKOFF   Backoff before step rechecks (ms)"
)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the journey suite against a device
    Run {
        /// Target URL delivered to the app through the share journey
        #[arg(short, long)]
        url: String,

        /// Bypass the resume-from-failed strategy and run everything
        #[arg(long)]
        force_full: bool,

        /// Re-validate only previously failed journeys
        #[arg(long, conflicts_with = "force_full")]
        failed_only: bool,

        /// Application package under test
        #[arg(short, long, env = "DROID_JOURNEY_PACKAGE")]
        package: Option<String>,

        /// Artifact directory (default: from config)
        #[arg(short, long)]
        artifacts: Option<PathBuf>,

        /// Print the final report as JSON
        #[arg(long)]
        json: bool,

        /// Tail the device log to the artifact directory during the run
        #[arg(long)]
        live_log: bool,
    },

    /// Dump the current accessibility tree and print the typed inventory
    Inventory {
        /// Maximum nodes to print (0 = all)
        #[arg(short, long, default_value = "40")]
        limit: usize,
    },

    /// Show or clear the persisted test-result history
    History {
        /// Delete the history file
        #[arg(long)]
        clear: bool,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let cfg = config::get();

    match args.command {
        Some(Commands::Run {
            url,
            force_full,
            failed_only,
            package,
            artifacts,
            json,
            live_log,
        }) => {
            let package = package.unwrap_or_else(|| cfg.device.package.clone());
            let profile = AppProfile::demo(&package);
            let journeys = builtin_journeys(&profile, &url);

            let artifacts_dir =
                artifacts.unwrap_or_else(|| PathBuf::from(cfg.artifacts.base_dir.clone()));
            let session = Session::in_dir(&artifacts_dir);
            session.init()?;

            let tail = if live_log {
                match LiveTail::start(
                    &cfg.device.adb_path,
                    Some(profile.log_context()),
                    &session.logs_dir().join("live.log"),
                ) {
                    Ok(tail) => Some(tail),
                    Err(err) => {
                        eprintln!("Warning: live log tail unavailable: {}", err);
                        None
                    }
                }
            } else {
                None
            };

            let mut ctx = RunContext::new(session);
            let gateway = build_gateway(cfg);
            let store = TestResultStore::new(&cfg.artifacts.history_file, ctx.run_id.clone());

            let report = SmartRunner::new(&gateway, &profile, store)
                .force_full(force_full)
                .failed_only(failed_only)
                .run(&mut ctx, &journeys)?;

            if let Some(tail) = tail {
                tail.stop();
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Run {}: {} ({} strategy, {} tests, {}ms)",
                    report.run_id,
                    if report.success { "PASSED" } else { "FAILED" },
                    report.strategy.kind,
                    report.results.len(),
                    report.duration_ms
                );
                for record in &report.results {
                    let status = if record.success { "ok " } else { "FAIL" };
                    println!(
                        "  [{}] {} ({}ms){}",
                        status,
                        record.test_name,
                        record.duration_ms,
                        record
                            .error
                            .as_ref()
                            .map(|e| format!(" - {}", e))
                            .unwrap_or_default()
                    );
                }
            }

            if !report.success {
                std::process::exit(1);
            }
        }

        Some(Commands::Inventory { limit }) => {
            let gateway = build_gateway(cfg);
            let device = Device::new(&gateway);
            let snapshot = device.snapshot("inventory", &CancelToken::new())?;

            if snapshot.is_empty() {
                eprintln!("No accessibility data available (is a device connected?)");
                std::process::exit(1);
            }
            let shown = if limit == 0 {
                snapshot.len()
            } else {
                limit.min(snapshot.len())
            };
            println!("Inventory: showing {} of {} nodes", shown, snapshot.len());
            for line in snapshot.inventory(limit) {
                println!("  {}", line);
            }
        }

        Some(Commands::History { clear }) => {
            let mut store = TestResultStore::new(&cfg.artifacts.history_file, "history-cli");
            if clear {
                store.clear()?;
                println!("History cleared: {}", cfg.artifacts.history_file);
            } else {
                let summary = store.load_history();
                if !summary.has_previous {
                    println!("No test-result history at {}", cfg.artifacts.history_file);
                } else {
                    println!(
                        "History: {} failed, {} passed (last run: {})",
                        summary.failed_count,
                        summary.passed_count,
                        summary
                            .last_run_time
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| "unknown".to_string())
                    );
                    for name in store.failed_from_previous() {
                        println!("  failed: {}", name);
                    }
                }
            }
        }

        None => {
            println!("Droid Journey - Android UI journey testing over adb");
            println!();
            println!("Usage: droid-journey <COMMAND>");
            println!();
            println!("Commands:");
            println!("  run        Run the journey suite against a device");
            println!("  inventory  Dump and print the current accessibility tree");
            println!("  history    Show or clear the persisted result history");
            println!();
            println!("Run with --help for more information.");
        }
    }

    Ok(())
}

fn build_gateway(cfg: &config::Config) -> AdbGateway {
    let mut gateway = AdbGateway::new(&cfg.device.adb_path);
    if let Some(serial) = &cfg.device.serial {
        gateway = gateway.serial(serial);
    }
    gateway
}
