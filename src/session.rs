use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::bridge::{render_evaluation, SnapshotSource};
use crate::candidates::{MoveEvaluation, MAX_MULTIPV};
use crate::channel::EngineProcess;
use crate::config::EngineSettings;
use crate::error::{EngineError, EngineResult};
use crate::processor::{BestMove, MessageProcessor, SearchTicket};
use crate::state::{EvaluationState, Mode, Position, TransitionTable};
use crate::uci::{EngineCommand, SearchLimit};

/// What the application may show right now.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationSnapshot {
    pub mode: Mode,
    pub position: Position,
    /// Ranked lines, empty whenever the mode hides engine output.
    pub lines: Vec<MoveEvaluation>,
    pub text: String,
    /// Candidate lines exist but the mode does not allow showing them.
    pub suppressed: bool,
    pub timed_out: Option<Duration>,
}

/// A running engine together with the evaluation state it serves.
pub struct EngineSession {
    settings: EngineSettings,
    processor: Arc<MessageProcessor>,
    state: Arc<EvaluationState>,
    /// Position the current candidate lines belong to.
    searched: Mutex<Option<Position>>,
    process: EngineProcess,
}

impl EngineSession {
    /// Starts the engine, completes the UCI handshake and configures multiPV.
    pub fn launch(settings: EngineSettings, table: TransitionTable) -> EngineResult<Self> {
        let settings = settings.normalized();
        let processor = Arc::new(MessageProcessor::new(settings.multipv));
        let process = EngineProcess::start(
            &settings.engine_path,
            &settings.engine_args,
            processor.clone(),
            settings.shutdown_grace(),
        )?;

        let session = Self {
            state: Arc::new(EvaluationState::new(table)),
            processor,
            searched: Mutex::new(None),
            process,
            settings,
        };

        session.send(&EngineCommand::Uci)?;
        session.processor.wait_for_handshake(session.settings.handshake_timeout())?;
        session.send(&EngineCommand::multipv(session.settings.multipv))?;
        session.sync_ready()?;

        info!(
            "engine {} ready with multipv {}",
            session.engine_name().as_deref().unwrap_or("(unnamed)"),
            session.settings.multipv
        );
        Ok(session)
    }

    fn send(&self, command: &EngineCommand) -> EngineResult<()> {
        if !self.processor.is_available() {
            return Err(EngineError::Unavailable);
        }
        self.process.send(command).map_err(|err| {
            if err.is_transport() {
                self.processor.mark_unavailable(&err.to_string());
            }
            err
        })
    }

    /// Sends `isready` and waits for `readyok`.
    pub fn sync_ready(&self) -> EngineResult<()> {
        self.processor.request_ready();
        self.send(&EngineCommand::IsReady)?;
        self.processor.wait_until_ready(self.settings.handshake_timeout())
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn engine_name(&self) -> Option<String> {
        self.processor.engine_name()
    }

    pub fn engine_author(&self) -> Option<String> {
        self.processor.engine_author()
    }

    pub fn multipv(&self) -> u32 {
        self.processor.multipv()
    }

    /// Changes how many ranked lines the engine reports. A running search is
    /// stopped first; the candidate list is resized once the engine has
    /// acknowledged the option.
    pub fn set_multipv(&self, lines: u32) -> EngineResult<()> {
        let lines = lines.clamp(1, MAX_MULTIPV);
        self.stop_search()?;
        self.send(&EngineCommand::multipv(lines))?;
        self.sync_ready()?;
        self.processor.set_multipv(lines);
        info!("multipv set to {}", lines);
        Ok(())
    }

    pub fn is_available(&self) -> bool {
        self.processor.is_available()
    }

    pub fn processor(&self) -> &Arc<MessageProcessor> {
        &self.processor
    }

    pub fn state(&self) -> &Arc<EvaluationState> {
        &self.state
    }

    /// Changes what the session is doing. Any running search is stopped,
    /// since it was for the old position. Starting a game or switching to a
    /// different start position tells the engine a new game begins.
    pub fn set_mode(&self, mode: Mode, position: Position) -> EngineResult<()> {
        let new_start = self.state.position().start() != position.start();
        let previous = self.state.transition(mode, position)?;
        self.stop_search()?;
        if new_start || (mode == Mode::InGamePlay && previous != Mode::InGamePlay) {
            self.send(&EngineCommand::UciNewGame)?;
            self.sync_ready()?;
        }
        Ok(())
    }

    /// Starts analysing the current position. A search still in flight is
    /// stopped first and its remaining output discarded.
    pub fn start_search(&self, limit: SearchLimit) -> EngineResult<SearchTicket> {
        let position = self.state.position();
        self.state.clear_timeout();
        let ticket = self.processor.begin_search()?;
        *self.searched.lock() = Some(position.clone());
        if ticket.supersedes {
            debug!("search {} supersedes a running search", ticket.id);
            self.send(&EngineCommand::Stop)?;
        }
        self.send(&position.to_command())?;
        self.send(&EngineCommand::Go(limit))?;
        Ok(ticket)
    }

    /// Asks the engine to end the current search. Completion is observed
    /// through `bestmove`, see [`EngineSession::wait_for_best_move`].
    pub fn stop_search(&self) -> EngineResult<()> {
        if self.processor.request_stop() {
            self.send(&EngineCommand::Stop)?;
        }
        Ok(())
    }

    /// Waits for the current search's best move, recording a timeout in the
    /// evaluation state when none arrives in time.
    pub fn wait_for_best_move(&self, timeout: Duration) -> EngineResult<BestMove> {
        match self.processor.wait_for_best_move(timeout) {
            Err(EngineError::Timeout { waited }) => {
                warn!("engine gave no best move within {:?}", waited);
                self.state.record_timeout(waited);
                Err(EngineError::Timeout { waited })
            }
            other => other,
        }
    }

    /// Copies the current state and candidate lines out for display.
    /// Nothing is written back; see [`EngineSession::refresh_evaluation`].
    pub fn evaluation_snapshot(&self) -> EvaluationSnapshot {
        let state = self.state.snapshot();
        let mut lines = self.processor.snapshot();
        if self.searched.lock().as_ref() != Some(&state.position) {
            // Left over from a search on another position
            lines.clear();
        }

        let (lines, text, suppressed) = if state.mode.shows_candidates() {
            let text = render_evaluation(&lines, state.position.board());
            (lines, text, false)
        } else {
            let suppressed = !lines.is_empty();
            (Vec::new(), String::new(), suppressed)
        };

        EvaluationSnapshot {
            mode: state.mode,
            position: state.position,
            lines,
            text,
            suppressed,
            timed_out: state.timed_out,
        }
    }

    /// Takes a snapshot and stores its text as the position's evaluation
    /// text in the evaluation state. This is what the poller calls.
    pub fn refresh_evaluation(&self) -> EvaluationSnapshot {
        let snapshot = self.evaluation_snapshot();
        self.state.publish_text(&snapshot.position, snapshot.text.clone());
        snapshot
    }

    /// Stops any search and terminates the engine. Safe to call repeatedly.
    pub fn shutdown(&self) {
        if self.processor.is_available() {
            if let Err(err) = self.stop_search() {
                debug!("could not stop search during shutdown: {}", err);
            }
        }
        self.process.shutdown();
        self.processor.mark_unavailable("engine shut down");
    }
}

impl SnapshotSource for EngineSession {
    fn refresh_evaluation(&self) -> EvaluationSnapshot {
        EngineSession::refresh_evaluation(self)
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
