//! Boundary towards the display layer.
//!
//! A poller thread wakes on a fixed period, copies the evaluation out of the
//! session and hands a rendered report to whatever shows it. The engine reader
//! and the poller share nothing but the guarded candidate list.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender};
use tracing::{debug, error};

use crate::board::{Board, Color};
use crate::candidates::MoveEvaluation;
use crate::notation::format_line;
use crate::session::EvaluationSnapshot;
use crate::state::Mode;
use crate::uci::{Score, ScoreBound};

/// Anything that can produce an evaluation snapshot on demand, recording
/// the rendered text as the current evaluation text as it does so.
pub trait SnapshotSource: Send + Sync {
    fn refresh_evaluation(&self) -> EvaluationSnapshot;
}

/// The display surface.
pub trait DisplaySink: Send + Sync {
    fn publish(&self, report: &EvaluationReport);
}

/// Score as shown to the user: from White's point of view.
pub fn white_score(score: Score, side_to_move: Color) -> Score {
    match side_to_move {
        Color::White => score,
        Color::Black => score.negate(),
    }
}

/// One report row, e.g. `1. +0.35 (d18) 1.e4 e5 2.Nf3`.
pub fn render_line(evaluation: &MoveEvaluation, board: &Board) -> String {
    let score = white_score(evaluation.score, board.side_to_move);
    let bound = match evaluation.bound {
        Some(ScoreBound::Lower) => "+",
        Some(ScoreBound::Upper) => "-",
        None => "",
    };
    format!(
        "{}. {}{} (d{}) {}",
        evaluation.rank,
        score,
        bound,
        evaluation.depth,
        format_line(&evaluation.line, board)
    )
}

pub fn render_evaluation(lines: &[MoveEvaluation], board: &Board) -> String {
    lines
        .iter()
        .map(|evaluation| render_line(evaluation, board))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub mode: Mode,
    pub text: String,
}

impl From<&EvaluationSnapshot> for EvaluationReport {
    fn from(snapshot: &EvaluationSnapshot) -> Self {
        let mut text = snapshot.text.clone();
        if let Some(waited) = snapshot.timed_out {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&format!("engine did not answer within {:.1}s", waited.as_secs_f64()));
        }
        Self {
            mode: snapshot.mode,
            text,
        }
    }
}

/// Publishes evaluation reports on a fixed period until stopped.
pub struct EvaluationPoller {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl EvaluationPoller {
    pub fn spawn(
        source: Arc<dyn SnapshotSource>,
        sink: Arc<dyn DisplaySink>,
        period: Duration,
    ) -> io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let ticker = tick(period);

        let handle = thread::Builder::new()
            .name("evaluation-poller".to_string())
            .spawn(move || {
                let mut last: Option<EvaluationReport> = None;
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            let snapshot = source.refresh_evaluation();
                            let report = EvaluationReport::from(&snapshot);
                            // Unchanged reports are not pushed again
                            if last.as_ref() != Some(&report) {
                                sink.publish(&report);
                                last = Some(report);
                            }
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
                debug!("evaluation poller stopped");
            })?;

        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stops the timer and waits for the poller thread to finish.
    pub fn stop(&mut self) {
        // Dropping the sender wakes the poller
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("evaluation poller panicked");
            }
        }
    }
}

impl Drop for EvaluationPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Position;
    use parking_lot::Mutex;
    use std::time::Instant;

    fn evaluation(rank: u32, score: Score, depth: u32, line: &[&str]) -> MoveEvaluation {
        MoveEvaluation {
            rank,
            score,
            bound: None,
            depth,
            line: line.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn test_render_from_white_perspective() {
        let board = Board::new();
        let opening = evaluation(1, Score::Centipawns(35), 18, &["e2e4", "e7e5", "g1f3"]);
        let row = render_line(&opening, &board);
        assert_eq!(row, "1. +0.35 (d18) 1.e4 e5 2.Nf3");

        let position = Position::startpos().with_moves(&["e2e4"]).unwrap();
        let sicilian = evaluation(2, Score::Centipawns(35), 12, &["c7c5"]);
        let row = render_line(&sicilian, position.board());
        assert_eq!(row, "2. -0.35 (d12) 1...c5");

        let row = render_line(&evaluation(1, Score::Mate(2), 30, &["d8h4"]), position.board());
        assert!(row.starts_with("1. #-2 (d30)"));
    }

    #[test]
    fn test_render_several_lines() {
        let board = Board::new();
        let lines = vec![
            evaluation(1, Score::Centipawns(30), 10, &["e2e4"]),
            evaluation(2, Score::Centipawns(25), 10, &["d2d4"]),
        ];
        assert_eq!(
            render_evaluation(&lines, &board),
            "1. +0.30 (d10) 1.e4\n2. +0.25 (d10) 1.d4"
        );
    }

    #[test]
    fn test_report_mentions_timeout() {
        let snapshot = EvaluationSnapshot {
            mode: Mode::ManualEvaluation,
            position: Position::startpos(),
            lines: Vec::new(),
            text: String::new(),
            suppressed: false,
            timed_out: Some(Duration::from_millis(1500)),
        };
        let report = EvaluationReport::from(&snapshot);
        assert_eq!(report.text, "engine did not answer within 1.5s");
    }

    struct Counter {
        calls: Mutex<u32>,
    }

    impl SnapshotSource for Counter {
        fn refresh_evaluation(&self) -> EvaluationSnapshot {
            let mut calls = self.calls.lock();
            *calls += 1;
            EvaluationSnapshot {
                mode: Mode::ManualEvaluation,
                position: Position::startpos(),
                lines: Vec::new(),
                text: format!("poll {}", *calls),
                suppressed: false,
                timed_out: None,
            }
        }
    }

    #[derive(Default)]
    struct Screen {
        reports: Mutex<Vec<EvaluationReport>>,
    }

    impl DisplaySink for Screen {
        fn publish(&self, report: &EvaluationReport) {
            self.reports.lock().push(report.clone());
        }
    }

    #[test]
    fn test_poller_publishes_until_stopped() {
        let source = Arc::new(Counter { calls: Mutex::new(0) });
        let screen = Arc::new(Screen::default());
        let period = Duration::from_millis(5);
        let mut poller = EvaluationPoller::spawn(source.clone(), screen.clone(), period).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while screen.reports.lock().len() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        poller.stop();

        let published = screen.reports.lock().len();
        assert!(published >= 3);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(screen.reports.lock().len(), published);
        assert_eq!(screen.reports.lock()[0].text, "poll 1");
    }
}
