//! signcoach CLI: manage recorded signs and run recognition or quizzes
//! against a recorded hand-landmark capture.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

use signcoach_lib::announce::{Announcer, ConsoleAnnouncer, SpeechCommandAnnouncer};
use signcoach_lib::engine::{
    EngineConfig, EngineController, EngineEvent, SignEngine, TestOutcome,
};
use signcoach_lib::export::export_png;
use signcoach_lib::tracking::{load_replay, replay, TrackerUpdate};
use signcoach_lib::utils::logging;
use signcoach_lib::{AppState, DEFAULT_DATA_DIR};

#[derive(Parser)]
#[command(name = "signcoach")]
#[command(about = "Record hand signs and practise recognizing them")]
#[command(version)]
struct Cli {
    /// Directory holding the sign database and settings.
    #[arg(long, global = true, env = "SIGNCOACH_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage recorded signs.
    #[command(subcommand)]
    Signs(SignsCommand),

    /// Show or reset quiz results.
    #[command(subcommand)]
    Results(ResultsCommand),

    /// Show or change persisted settings.
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// Recognize signs in a capture.
    Recognize(ReplayArgs),

    /// Record a new sign from a capture.
    Record {
        /// Name to save the sign under. Re-using a name replaces that sign.
        name: String,

        #[command(flatten)]
        replay: ReplayArgs,
    },

    /// Quiz yourself on one sign using a capture.
    Quiz {
        /// Sign to test; defaults to a random least-tested sign.
        #[arg(long)]
        sign: Option<String>,

        #[command(flatten)]
        replay: ReplayArgs,
    },
}

#[derive(Subcommand)]
enum SignsCommand {
    List,
    Delete {
        name: String,
    },
    /// Delete every sign.
    Clear,
    /// Render a sign to `<name>_sign.png`.
    Export {
        name: String,

        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum ResultsCommand {
    Show,
    Reset,
}

#[derive(Subcommand)]
enum SettingsCommand {
    Show,
    /// Maximum score still counted as a match (0.05 to 0.5).
    Threshold { value: f32 },
    Announcements { state: Toggle },
    Mode { mode: ModeArg },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Test,
    Practice,
}

#[derive(Debug, Clone, Args)]
struct ReplayArgs {
    /// JSON-lines capture of tracker output.
    #[arg(long)]
    frames: PathBuf,

    /// Playback rate in frames per second.
    #[arg(long, default_value = "30.0")]
    fps: f64,

    /// Speak announcements with this text-to-speech program (e.g. `say`,
    /// `espeak`) instead of printing them.
    #[arg(long)]
    speak: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let (state, engine) = AppState::start(cli.data_dir.clone(), EngineConfig::default()).await?;

    let result = match cli.command {
        Commands::Signs(command) => run_signs(engine, command),
        Commands::Results(command) => run_results(engine, command),
        Commands::Settings(command) => {
            drop(engine);
            run_settings(&state, command)
        }
        Commands::Recognize(args) => run_recognize(engine, &args).await,
        Commands::Record { name, replay } => run_record(engine, &name, &replay).await,
        Commands::Quiz { sign, replay } => run_quiz(engine, sign, &replay).await,
    };

    state.close().await?;
    result
}

fn run_signs(mut engine: SignEngine, command: SignsCommand) -> Result<()> {
    match command {
        SignsCommand::List => {
            if engine.templates().is_empty() {
                println!("No signs recorded yet.");
            }
            for template in engine.templates().iter() {
                println!(
                    "{:<24} {} hand(s)  recorded {}",
                    template.name,
                    template.landmarks.len(),
                    template.created_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        SignsCommand::Delete { name } => {
            engine.delete_template(&name)?;
            println!("Deleted \"{name}\".");
        }
        SignsCommand::Clear => {
            let removed = engine.templates().len();
            engine.clear_templates();
            println!("Deleted {removed} sign(s).");
        }
        SignsCommand::Export { name, out } => {
            let template = engine
                .templates()
                .get(&name)
                .with_context(|| format!("No sign named \"{name}\""))?;
            std::fs::create_dir_all(&out)
                .with_context(|| format!("Failed to create {}", out.display()))?;
            let path = export_png(template, &out)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

fn run_results(mut engine: SignEngine, command: ResultsCommand) -> Result<()> {
    if let ResultsCommand::Reset = command {
        engine.reset_results();
        println!("Results reset.");
        return Ok(());
    }

    if engine.ledger().records().is_empty() {
        println!("No signs recorded yet.");
    }
    for record in engine.ledger().records() {
        let last = record
            .last_tested
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".into());
        println!(
            "{:<24} {:>3}/{:<3} {:>5.1}%  last tested {}",
            record.name, record.correct, record.tested, record.accuracy, last
        );
    }
    Ok(())
}

fn run_settings(state: &AppState, command: SettingsCommand) -> Result<()> {
    let settings = match command {
        SettingsCommand::Show => state.settings.current(),
        SettingsCommand::Threshold { value } => state.settings.set_confidence_threshold(value)?,
        SettingsCommand::Announcements { state: toggle } => state
            .settings
            .set_announcements_enabled(matches!(toggle, Toggle::On))?,
        SettingsCommand::Mode { mode } => state
            .settings
            .set_test_mode(matches!(mode, ModeArg::Test))?,
    };
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

async fn run_recognize(engine: SignEngine, args: &ReplayArgs) -> Result<()> {
    let updates = load_replay(&args.frames)?;
    let controller = spawn_controller(engine, args);
    let printer = tokio::spawn(print_matches(controller.subscribe()));

    let delivered = replay(updates, args.fps, &controller, CancellationToken::new()).await?;
    let engine = controller.shutdown().await?;
    // Closing the channel lets the printer drain and exit.
    drop(controller);
    let _ = printer.await;

    println!(
        "Replayed {delivered} update(s) against {} sign(s).",
        engine.templates().len()
    );
    Ok(())
}

async fn run_record(engine: SignEngine, name: &str, args: &ReplayArgs) -> Result<()> {
    let mut updates = load_replay(&args.frames)?;
    let Some(first_hand) = updates
        .iter()
        .position(|update| matches!(update, TrackerUpdate::Hands(hands) if !hands.is_empty()))
    else {
        bail!("No hand detected in {}", args.frames.display());
    };
    let rest = updates.split_off(first_hand + 1);

    let config = engine.config().clone();
    let patience = config.capture_window + config.settle_delay + Duration::from_secs(1);
    let controller = spawn_controller(engine, args);
    let mut events = controller.subscribe();

    replay(updates, args.fps, &controller, CancellationToken::new()).await?;
    controller.begin_recording(name.to_string()).await?;
    println!(
        "Recording \"{}\": hold the pose for {:?}...",
        name.trim(),
        config.capture_window
    );

    let cancel_token = CancellationToken::new();
    let feeder = spawn_feeder(&controller, rest, args.fps, cancel_token.clone());
    let outcome = wait_for(&mut events, patience, |event| match event {
        EngineEvent::TemplateSaved { .. } => Some(Ok(())),
        EngineEvent::RecordingFailed { reason, .. } => Some(Err(reason.clone())),
        _ => None,
    })
    .await;
    cancel_token.cancel();
    let _ = feeder.await;
    controller.shutdown().await?;

    match outcome {
        Some(Ok(())) => Ok(()),
        Some(Err(reason)) => bail!(reason),
        None => bail!("Recording did not finish"),
    }
}

async fn run_quiz(engine: SignEngine, sign: Option<String>, args: &ReplayArgs) -> Result<()> {
    let updates = load_replay(&args.frames)?;
    let patience = engine.config().test_timeout + Duration::from_secs(1);
    let controller = spawn_controller(engine, args);
    let mut events = controller.subscribe();

    match sign {
        Some(name) => controller.start_test(name).await?,
        None => controller.start_quiz().await?,
    }

    let cancel_token = CancellationToken::new();
    let feeder = spawn_feeder(&controller, updates, args.fps, cancel_token.clone());

    let outcome = wait_for(&mut events, patience, |event| match event {
        EngineEvent::TestResolved {
            target,
            outcome,
            record,
            ..
        } => Some((target.clone(), *outcome, record.clone())),
        _ => None,
    })
    .await;
    cancel_token.cancel();
    let _ = feeder.await;
    controller.shutdown().await?;

    let Some((target, outcome, record)) = outcome else {
        bail!("Quiz did not finish");
    };
    let verdict = match outcome {
        TestOutcome::Correct => "correct",
        TestOutcome::TimedOut => "timed out",
    };
    println!(
        "\"{target}\": {verdict}. {}/{} correct ({:.0}%).",
        record.correct, record.tested, record.accuracy
    );
    Ok(())
}

fn spawn_feeder(
    controller: &EngineController,
    updates: Vec<TrackerUpdate>,
    fps: f64,
    cancel_token: CancellationToken,
) -> JoinHandle<Result<usize>> {
    let controller = controller.clone();
    tokio::spawn(async move { replay(updates, fps, &controller, cancel_token).await })
}

fn spawn_controller(engine: SignEngine, args: &ReplayArgs) -> EngineController {
    let announcer: Arc<dyn Announcer> = match &args.speak {
        Some(program) => Arc::new(SpeechCommandAnnouncer::new(program.clone(), Vec::new())),
        None => Arc::new(ConsoleAnnouncer),
    };
    EngineController::spawn(engine, announcer)
}

async fn print_matches(mut events: broadcast::Receiver<EngineEvent>) {
    let mut last: Option<String> = None;
    loop {
        match events.recv().await {
            Ok(EngineEvent::MatchFound { name, score }) => {
                if last.as_deref() != Some(name.as_str()) {
                    println!("match: {name} (score {score:.3})");
                    last = Some(name);
                }
            }
            Ok(EngineEvent::NoMatch | EngineEvent::HandLost) => last = None,
            Ok(EngineEvent::TrackerFailed { message }) => eprintln!("tracker error: {message}"),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => log::warn!("dropped {skipped} engine events"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Waits up to `limit` for the first event `pick` accepts.
async fn wait_for<T, F>(
    events: &mut broadcast::Receiver<EngineEvent>,
    limit: Duration,
    mut pick: F,
) -> Option<T>
where
    F: FnMut(&EngineEvent) -> Option<T>,
{
    let search = async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(found) = pick(&event) {
                        return Some(found);
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    };
    timeout(limit, search).await.ok().flatten()
}
