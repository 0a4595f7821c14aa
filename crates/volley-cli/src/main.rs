//! Entry point: loads a YAML benchmark definition, wires up a console
//! reporter, and runs the phase scheduler to completion.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use eyre::{Context, Report, eyre};
use figment::Figment;
use figment::providers::{Format, Serialized, Yaml};
use tracing_subscriber::fmt::format::FmtSpan;
use uuid::Uuid;

use volley_scheduler::{BenchmarkOutcome, PhaseScheduler};

mod args;
mod loader;
mod reporter;
mod steps;
mod transport;

use args::Args;
use reporter::ConsoleReporter;

/// How long a requested shutdown is given to drain running sessions before
/// the process exits anyway, rather than hang forever on a stuck phase.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let cli_args = Args::parse();
    let config_file = cli_args.config_file.clone();
    let mut args_figment = Figment::new().merge(Serialized::defaults(cli_args));
    if let Some(config_file) = config_file {
        args_figment = args_figment.merge(Yaml::file(config_file));
    }
    let args: Args = args_figment.extract()?;

    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_ansi(true)
        .with_file(true)
        .with_target(false)
        .with_line_number(true)
        .with_thread_names(true)
        .with_span_events(FmtSpan::NONE)
        .with_max_level(if args.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| eyre!("unable to configure logging: {}", e))?;

    let run_id = Uuid::new_v4();
    tracing::info!(%run_id, scenario = %args.scenario.display(), executors = args.executors, "starting run");

    let benchmark = loader::load_benchmark(&args.scenario)
        .with_context(|| format!("loading benchmark definition from {}", args.scenario.display()))?;

    let reporter = Arc::new(ConsoleReporter::new());
    let mut scheduler = PhaseScheduler::new(&benchmark, args.executors, reporter.clone());

    let kill_switch = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, kill_switch.clone())?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, kill_switch.clone())?;

    let outcome = run_to_completion(&mut scheduler, &kill_switch);

    tracing::info!(%run_id, summary = %reporter.summary(), "run finished");

    match outcome {
        BenchmarkOutcome::Completed => Ok(()),
        BenchmarkOutcome::Failed(errors) => {
            for (phase, err) in &errors {
                tracing::error!(phase, %err, "phase failed");
            }
            eyre::bail!("{} phase(s) failed", errors.len());
        }
    }
}

/// Drives the scheduler's own tick/wait loop (mirroring `PhaseScheduler::run`)
/// but interleaves a check of `kill_switch` between ticks so a signal can
/// trigger `request_shutdown()` exactly once. If the benchmark hasn't
/// drained within `SHUTDOWN_GRACE` of that request, gives up waiting and
/// returns whatever outcome is available rather than hanging forever.
fn run_to_completion(scheduler: &mut PhaseScheduler, kill_switch: &AtomicBool) -> BenchmarkOutcome {
    let mut shutdown_requested_at: Option<Instant> = None;
    loop {
        let now = Instant::now();
        let next_deadline = scheduler.tick(now);
        if scheduler.all_terminated() {
            break;
        }

        if shutdown_requested_at.is_none() && kill_switch.load(Ordering::Relaxed) {
            tracing::warn!("shutdown signal received, draining running sessions");
            scheduler.request_shutdown();
            shutdown_requested_at = Some(now);
        }

        if let Some(requested_at) = shutdown_requested_at {
            if now.duration_since(requested_at) >= SHUTDOWN_GRACE {
                tracing::warn!("shutdown grace period elapsed, exiting without a full drain");
                break;
            }
        }

        sleep_until_next_deadline(next_deadline);
    }
    scheduler.outcome()
}

/// `PhaseScheduler` keeps its wake condvar private (ticking is driven
/// externally so tests can supply controlled timestamps), so the CLI's own
/// drive loop just sleeps up to the next deadline, capped at 50ms so the
/// `kill_switch` check above stays responsive.
fn sleep_until_next_deadline(next_deadline: Option<Instant>) {
    let deadline = next_deadline.unwrap_or_else(|| Instant::now() + Duration::from_millis(50));
    let now = Instant::now();
    if deadline > now {
        std::thread::sleep((deadline - now).min(Duration::from_millis(50)));
    }
}
