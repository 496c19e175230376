use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use salmon_study::{
    DisplaySink, EngineSession, EngineSettings, EvaluationPoller, EvaluationReport, Mode, Position,
    SearchLimit, TransitionTable,
};

/// Analyse a chess position with a UCI engine and print its candidate lines.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Settings file (toml, yaml or json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Engine executable, overrides the settings file
    #[arg(short, long)]
    engine: Option<PathBuf>,

    /// Number of ranked lines to request
    #[arg(long)]
    multipv: Option<u32>,

    /// Thinking time in milliseconds
    #[arg(long)]
    movetime: Option<u64>,

    /// Search to a fixed depth instead of a fixed time
    #[arg(long, conflicts_with = "movetime")]
    depth: Option<u32>,

    /// Starting position, defaults to the standard one
    #[arg(long)]
    fen: Option<String>,

    /// Moves in engine notation played from the starting position
    #[arg(long, num_args = 1.., value_delimiter = ' ')]
    moves: Vec<String>,
}

struct Stdout;

impl DisplaySink for Stdout {
    fn publish(&self, report: &EvaluationReport) {
        if !report.text.is_empty() {
            println!("{}\n", report.text);
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => EngineSettings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => EngineSettings::default(),
    };
    if let Some(engine) = args.engine {
        settings.engine_path = engine;
    }
    if let Some(multipv) = args.multipv {
        settings.multipv = multipv;
    }
    if let Some(movetime) = args.movetime {
        settings.default_movetime_ms = movetime;
    }

    let position = match &args.fen {
        Some(fen) => Position::from_fen(fen).context("invalid --fen")?,
        None => Position::startpos(),
    };
    let position = position.with_moves(&args.moves).context("invalid --moves")?;

    let session = Arc::new(
        EngineSession::launch(settings, TransitionTable::default())
            .context("failed to start the engine")?,
    );
    let settings = session.settings().clone();
    info!(
        "analysing with {} by {}",
        session.engine_name().as_deref().unwrap_or("an unnamed engine"),
        session.engine_author().as_deref().unwrap_or("unknown authors")
    );

    session.set_mode(Mode::ManualEvaluation, position)?;
    let limit = match args.depth {
        Some(depth) => SearchLimit::Depth(depth),
        None => SearchLimit::MoveTime(settings.default_movetime()),
    };
    session.start_search(limit)?;

    let mut poller =
        EvaluationPoller::spawn(session.clone(), Arc::new(Stdout), settings.poll_interval())
            .context("failed to start the evaluation poller")?;

    let patience = match args.depth {
        Some(_) => Duration::from_secs(600),
        None => settings.default_movetime() + settings.handshake_timeout(),
    };
    let best = session.wait_for_best_move(patience);
    poller.stop();

    let report = EvaluationReport::from(&session.evaluation_snapshot());
    println!("{}", report.text);
    match best {
        Ok(best) => {
            let ponder = best.ponder.map(|p| format!(" ponder {p}")).unwrap_or_default();
            println!("bestmove {}{}", best.best.as_deref().unwrap_or("(none)"), ponder);
        }
        Err(err) => {
            session.stop_search()?;
            return Err(err).context("search did not finish");
        }
    }

    info!("shutting down");
    session.shutdown();
    Ok(())
}
