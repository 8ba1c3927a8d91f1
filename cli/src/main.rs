//! `movetrack` CLI: scenario runs, replay import/export, threshold presets.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use movement_core::{Classifier, ClassifierConfig, Preset, ThresholdOverrides, ThresholdSet};
use sim::replay::{load_replay, run_replay, save_replay, PlayerReport, ReplayLog};
use sim::scenarios::{Scenario, ScenarioKind};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "movetrack", about = "Player movement-state classifier CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Classifier settings shared by every subcommand that classifies.
#[derive(clap::Args, Clone)]
struct ClassifierArgs {
    /// Threshold preset: default, aggressive or conservative
    #[arg(long, default_value = "default")]
    preset: Preset,
    /// Threshold override JSON file, applied on top of its own `preset` key
    /// or `--preset`
    #[arg(long)]
    thresholds: Option<PathBuf>,
    /// Allow `running -> idle` without passing through walking
    #[arg(long)]
    relaxed: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a named scenario in batch mode and output metrics.
    RunScenario {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// Random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[command(flatten)]
        classifier: ClassifierArgs,
        /// Output metrics to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also save the full replay log
        #[arg(long)]
        save_replay: Option<PathBuf>,
    },
    /// Load and replay a previously recorded scenario log.
    Replay {
        /// Path to replay JSON file
        input: PathBuf,
        #[command(flatten)]
        classifier: ClassifierArgs,
        /// Output metrics to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the active configuration and transition table as JSON.
    Thresholds {
        #[command(flatten)]
        classifier: ClassifierArgs,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::RunScenario {
            scenario,
            seed,
            classifier,
            output,
            save_replay: save_path,
        } => {
            run_scenario(scenario, seed, &classifier, output.as_deref(), save_path.as_deref())?;
        }
        Commands::Replay {
            input,
            classifier,
            output,
        } => {
            replay_file(&input, &classifier, output.as_deref())?;
        }
        Commands::Thresholds { classifier } => {
            let classifier = build_classifier(&classifier)?;
            println!("{}", serde_json::to_string_pretty(&classifier.export_config())?);
        }
    }

    Ok(())
}

fn build_classifier(args: &ClassifierArgs) -> Result<Classifier> {
    let thresholds = match &args.thresholds {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading thresholds from {}", path.display()))?;
            serde_json::from_str::<ThresholdOverrides>(&text)
                .with_context(|| format!("parsing thresholds in {}", path.display()))?
                .resolve(args.preset)
        }
        None => ThresholdSet::preset(args.preset),
    };
    let config = ClassifierConfig {
        thresholds,
        strict_mode: !args.relaxed,
        ..Default::default()
    };
    Ok(Classifier::new(config)?)
}

fn run_scenario(
    kind: ScenarioKind,
    seed: u64,
    args: &ClassifierArgs,
    output_path: Option<&Path>,
    replay_path: Option<&Path>,
) -> Result<()> {
    let classifier = build_classifier(args)?;
    let scenario = Scenario::build(kind, seed);
    println!(
        "Running scenario '{}' (seed={}, players={})...",
        scenario.name,
        seed,
        scenario.players.len()
    );

    let log = scenario.simulate(classifier.thresholds().silhouette_window);
    let start = std::time::Instant::now();
    let reports = run_replay(&log, &classifier);
    let elapsed = start.elapsed();
    print_reports(&reports, elapsed.as_secs_f64());

    // Save replay if requested
    if let Some(rpath) = replay_path {
        save_replay(&log, rpath)?;
        println!("Replay saved to {}", rpath.display());
    }

    if let Some(opath) = output_path {
        write_summary(&log, &classifier, &reports, elapsed.as_secs_f64(), opath)?;
    }

    Ok(())
}

fn replay_file(input: &Path, args: &ClassifierArgs, output_path: Option<&Path>) -> Result<()> {
    let log = load_replay(input)?;
    let classifier = build_classifier(args)?;
    println!(
        "Replaying '{}' ({} players, {} frames)...",
        log.scenario_name,
        log.players.len(),
        log.players.iter().map(|p| p.frames.len()).sum::<usize>()
    );

    let start = std::time::Instant::now();
    let reports = run_replay(&log, &classifier);
    let elapsed = start.elapsed();
    print_reports(&reports, elapsed.as_secs_f64());

    if let Some(opath) = output_path {
        write_summary(&log, &classifier, &reports, elapsed.as_secs_f64(), opath)?;
    }

    Ok(())
}

fn print_reports(reports: &[PlayerReport], elapsed_s: f64) {
    for r in reports {
        let invalid = r.statistics.as_ref().map_or(0, |s| s.invalid_input_frames);
        println!(
            "  player {:>3}: accuracy={:.3} transitions={} flicker={} invalid_frames={} distance={:.1}m top_speed={:.2}",
            r.entity.0,
            r.accuracy,
            r.metrics.transitions,
            r.metrics.flicker_count,
            invalid,
            r.distance_m,
            r.top_speed.unwrap_or(0.0)
        );
    }
    println!("Done: {} players, elapsed={:.3}s", reports.len(), elapsed_s);
}

fn write_summary(
    log: &ReplayLog,
    classifier: &Classifier,
    reports: &[PlayerReport],
    elapsed_s: f64,
    path: &Path,
) -> Result<()> {
    let json = serde_json::json!({
        "scenario": log.scenario_name,
        "seed": log.seed,
        "elapsed_s": elapsed_s,
        "config": classifier.export_config(),
        "players": reports,
    });
    std::fs::write(path, serde_json::to_string_pretty(&json)?)?;
    info!(path = %path.display(), "metrics written");
    println!("Metrics saved to {}", path.display());
    Ok(())
}
