use std::process::ExitCode;

use anyhow::Context;
use tracing::{info, warn};
use vidtier_core::probe::{FfprobeProber, Prober};
use vidtier_core::tier::TIER_TABLE;
use vidtier_core::{BatchResult, Orchestrator, RunState, SortError, Tier};

use crate::cli::{CheckArgs, Cli, Command, SortArgs};
use crate::progress::ProgressReporter;

pub const EXIT_OK: u8 = 0;
/// Some files failed, or the run was aborted.
pub const EXIT_FAILURES: u8 = 1;
/// The run never started: bad root, overlapping run or unusable config.
pub const EXIT_REJECTED: u8 = 2;

pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Sort(args) => sort(args).await,
        Command::Tiers => {
            print!("{}", tier_table());
            Ok(ExitCode::from(EXIT_OK))
        }
        Command::Check(args) => check(args).await,
    }
}

pub fn exit_code_for(result: &BatchResult) -> ExitCode {
    match result.status {
        RunState::Completed if result.failed == 0 => ExitCode::from(EXIT_OK),
        _ => ExitCode::from(EXIT_FAILURES),
    }
}

async fn sort(args: SortArgs) -> anyhow::Result<ExitCode> {
    let (mut config, source) = match vidtier_config::load(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("error: {err:#}");
            return Ok(ExitCode::from(EXIT_REJECTED));
        }
    };
    args.apply(&mut config);
    if let Err(err) = vidtier_config::validate(&config) {
        eprintln!("error: {err}");
        return Ok(ExitCode::from(EXIT_REJECTED));
    }
    info!(%source, workers = config.worker_count(), ffprobe = %config.ffprobe_path.display(), "configuration");

    let orchestrator = Orchestrator::with_ffprobe(config);
    let mut handle = match orchestrator.start_run(&args.root).await {
        Ok(handle) => handle,
        Err(err @ (SortError::InvalidRoot { .. } | SortError::RunInProgress(_))) => {
            eprintln!("error: {err}");
            return Ok(ExitCode::from(EXIT_REJECTED));
        }
        Err(err) => return Err(err).context("failed to start run"),
    };

    let canceller = handle.canceller();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after in-flight files");
            canceller.cancel();
        }
    });

    let progress = ProgressReporter::new(!args.json);
    while let Some(event) = handle.next_event().await {
        progress.observe(&event);
    }
    let result = handle.wait().await.context("run did not finish cleanly")?;
    interrupt.abort();
    progress.finish(&result.status);

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("failed to encode result")?
        );
    } else {
        print!("{}", result.summary(args.failures));
    }
    Ok(exit_code_for(&result))
}

async fn check(args: CheckArgs) -> anyhow::Result<ExitCode> {
    let (mut config, _) = match vidtier_config::load(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("error: {err:#}");
            return Ok(ExitCode::from(EXIT_REJECTED));
        }
    };
    if let Some(ffprobe) = args.ffprobe {
        config.ffprobe_path = ffprobe;
    }

    let prober = FfprobeProber::from_config(&config);
    match prober.preflight().await {
        Ok(()) => {
            println!("ffprobe OK: {}", prober.program().display());
            Ok(ExitCode::from(EXIT_OK))
        }
        Err(err) => {
            println!("ffprobe unavailable: {err}");
            println!("Install FFmpeg or point --ffprobe / VIDTIER_FFPROBE at the ffprobe binary.");
            Ok(ExitCode::from(EXIT_FAILURES))
        }
    }
}

pub fn tier_table() -> String {
    let mut out = format!("{:<6}{:>8}  {}\n", "TIER", "FROM", "BELOW");
    for band in TIER_TABLE {
        let below = band
            .max
            .map(|max| format!("{max}p"))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<6}{:>8}  {}\n",
            band.tier.folder_name(),
            format!("{}p", band.min),
            below
        ));
    }
    out.push_str(&Tier::legend());
    out.push('\n');
    out
}
