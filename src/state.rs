use std::collections::HashSet;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;

use crate::board::{Board, START_FEN};
use crate::error::{EngineError, EngineResult};
use crate::notation::parse_coordinate_move;
use crate::uci::{EngineCommand, StartPosition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Idle,
    InGamePlay,
    ManualEvaluation,
    TrainingEvaluation,
}

impl Mode {
    pub const ALL: [Mode; 4] = [
        Mode::Idle,
        Mode::InGamePlay,
        Mode::ManualEvaluation,
        Mode::TrainingEvaluation,
    ];

    /// Whether candidate lines may be shown to the user in this mode.
    pub fn shows_candidates(self) -> bool {
        matches!(self, Mode::ManualEvaluation | Mode::TrainingEvaluation)
    }
}

/// A position as the engine sees it: a start plus the moves played from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    start: StartPosition,
    moves: Vec<String>,
    board: Board,
}

impl Default for Position {
    fn default() -> Self {
        Self::startpos()
    }
}

impl Position {
    pub fn startpos() -> Self {
        Self {
            start: StartPosition::StartPos,
            moves: Vec::new(),
            board: Board::new(),
        }
    }

    pub fn from_fen(fen: &str) -> EngineResult<Self> {
        let board = Board::from_fen(fen)?;
        let start = if board.to_fen() == START_FEN {
            StartPosition::StartPos
        } else {
            StartPosition::Fen(board.to_fen())
        };
        Ok(Self {
            start,
            moves: Vec::new(),
            board,
        })
    }

    /// Plays a move given in engine notation.
    pub fn push_move(&mut self, engine_move: &str) -> EngineResult<()> {
        let mv = parse_coordinate_move(&self.board, engine_move)?;
        self.board.make_move(mv);
        self.moves.push(engine_move.to_string());
        Ok(())
    }

    pub fn with_moves<S: AsRef<str>>(mut self, moves: &[S]) -> EngineResult<Self> {
        for mv in moves {
            self.push_move(mv.as_ref())?;
        }
        Ok(self)
    }

    /// The board after all moves; the starting point for rendering lines.
    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn start(&self) -> &StartPosition {
        &self.start
    }

    pub fn moves(&self) -> &[String] {
        &self.moves
    }

    pub fn to_command(&self) -> EngineCommand {
        EngineCommand::Position {
            start: self.start.clone(),
            moves: self.moves.clone(),
        }
    }
}

/// The set of mode changes a session accepts.
///
/// Staying in the same mode is always allowed; it just replaces the position.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    allowed: HashSet<(Mode, Mode)>,
}

impl Default for TransitionTable {
    /// Training is entered only from a manual review; a finished game can be
    /// reviewed directly.
    fn default() -> Self {
        use Mode::*;
        Self::empty()
            .allow(Idle, InGamePlay)
            .allow(Idle, ManualEvaluation)
            .allow(InGamePlay, Idle)
            .allow(InGamePlay, ManualEvaluation)
            .allow(ManualEvaluation, Idle)
            .allow(ManualEvaluation, InGamePlay)
            .allow(ManualEvaluation, TrainingEvaluation)
            .allow(TrainingEvaluation, ManualEvaluation)
            .allow(TrainingEvaluation, Idle)
    }
}

impl TransitionTable {
    pub fn empty() -> Self {
        Self {
            allowed: HashSet::new(),
        }
    }

    pub fn permissive() -> Self {
        let mut table = Self::empty();
        for from in Mode::ALL {
            for to in Mode::ALL {
                table = table.allow(from, to);
            }
        }
        table
    }

    pub fn allow(mut self, from: Mode, to: Mode) -> Self {
        self.allowed.insert((from, to));
        self
    }

    pub fn permits(&self, from: Mode, to: Mode) -> bool {
        from == to || self.allowed.contains(&(from, to))
    }
}

/// Value copy of the live evaluation state.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub mode: Mode,
    pub position: Position,
    pub text: String,
    /// Set when the last search did not report a best move in time.
    pub timed_out: Option<Duration>,
}

struct Live {
    mode: Mode,
    position: Position,
    text: String,
    timed_out: Option<Duration>,
}

/// What the engine subsystem is doing right now, and on which position.
pub struct EvaluationState {
    table: TransitionTable,
    live: Mutex<Live>,
}

impl EvaluationState {
    pub fn new(table: TransitionTable) -> Self {
        Self {
            table,
            live: Mutex::new(Live {
                mode: Mode::Idle,
                position: Position::startpos(),
                text: String::new(),
                timed_out: None,
            }),
        }
    }

    /// Switches mode and position together; readers never see one without the other.
    pub fn transition(&self, mode: Mode, position: Position) -> EngineResult<Mode> {
        let mut live = self.live.lock();
        let from = live.mode;
        if !self.table.permits(from, mode) {
            return Err(EngineError::IllegalModeTransition { from, to: mode });
        }
        if from != mode {
            info!("evaluation mode {:?} -> {:?}", from, mode);
        }
        live.mode = mode;
        live.position = position;
        live.text.clear();
        live.timed_out = None;
        Ok(from)
    }

    pub fn mode(&self) -> Mode {
        self.live.lock().mode
    }

    pub fn position(&self) -> Position {
        self.live.lock().position.clone()
    }

    /// Stores display text derived from `position`, unless the position has
    /// been replaced in the meantime.
    pub fn publish_text(&self, position: &Position, text: String) {
        let mut live = self.live.lock();
        if live.position == *position {
            live.text = text;
        }
    }

    pub fn record_timeout(&self, waited: Duration) {
        self.live.lock().timed_out = Some(waited);
    }

    pub fn clear_timeout(&self) {
        self.live.lock().timed_out = None;
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let live = self.live.lock();
        StateSnapshot {
            mode: live.mode,
            position: live.position.clone(),
            text: live.text.clone(),
            timed_out: live.timed_out,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Color;

    #[test]
    fn test_idle_cannot_jump_to_training() {
        let state = EvaluationState::new(TransitionTable::default());
        let result = state.transition(Mode::TrainingEvaluation, Position::startpos());
        assert!(matches!(
            result,
            Err(EngineError::IllegalModeTransition {
                from: Mode::Idle,
                to: Mode::TrainingEvaluation
            })
        ));
        assert_eq!(state.mode(), Mode::Idle);
    }

    #[test]
    fn test_review_then_training() {
        let state = EvaluationState::new(TransitionTable::default());
        let position = Position::startpos().with_moves(&["e2e4"]).unwrap();
        assert_eq!(state.transition(Mode::ManualEvaluation, position.clone()).unwrap(), Mode::Idle);
        state.transition(Mode::TrainingEvaluation, position).unwrap();

        let snapshot = state.snapshot();
        assert_eq!(snapshot.mode, Mode::TrainingEvaluation);
        assert_eq!(snapshot.position.moves(), ["e2e4".to_string()]);
        assert_eq!(snapshot.position.board().side_to_move, Color::Black);
    }

    #[test]
    fn test_same_mode_updates_position() {
        let state = EvaluationState::new(TransitionTable::empty());
        let position = Position::startpos().with_moves(&["d2d4", "d7d5"]).unwrap();
        state.transition(Mode::Idle, position.clone()).unwrap();
        assert_eq!(state.position(), position);
        assert!(state.transition(Mode::ManualEvaluation, position).is_err());
    }

    #[test]
    fn test_text_for_replaced_position_is_dropped() {
        let state = EvaluationState::new(TransitionTable::default());
        let stale = Position::startpos();
        let current = Position::startpos().with_moves(&["g1f3"]).unwrap();
        state.transition(Mode::ManualEvaluation, current.clone()).unwrap();
        state.publish_text(&stale, "1. +0.20 (d12) 1.e4".to_string());
        assert!(state.snapshot().text.is_empty());
        state.publish_text(&current, "1. +0.10 (d12) 1...d5".to_string());
        assert_eq!(state.snapshot().text, "1. +0.10 (d12) 1...d5");
    }

    #[test]
    fn test_permissive_table_allows_everything() {
        let table = TransitionTable::permissive();
        for from in Mode::ALL {
            for to in Mode::ALL {
                assert!(table.permits(from, to));
            }
        }
    }

    #[test]
    fn test_transition_clears_text_and_timeout() {
        let state = EvaluationState::new(TransitionTable::default());
        state.publish_text(&Position::startpos(), "old".to_string());
        assert_eq!(state.snapshot().text, "old");
        state.record_timeout(Duration::from_secs(1));
        state.transition(Mode::ManualEvaluation, Position::startpos()).unwrap();
        let snapshot = state.snapshot();
        assert!(snapshot.text.is_empty());
        assert_eq!(snapshot.timed_out, None);
    }

    #[test]
    fn test_position_command() {
        let position = Position::startpos().with_moves(&["e2e4", "c7c5"]).unwrap();
        assert_eq!(position.to_command().to_string(), "position startpos moves e2e4 c7c5");

        let fen = "4k3/8/8/8/8/8/8/4K2R w K - 0 1";
        let position = Position::from_fen(fen).unwrap().with_moves(&["e1g1"]).unwrap();
        assert_eq!(position.to_command().to_string(), format!("position fen {fen} moves e1g1"));
        assert!(Position::startpos().with_moves(&["e2e5x"]).is_err());
    }
}
