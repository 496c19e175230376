//! Chess engine integration for a study application.
//!
//! An [`EngineSession`] owns a UCI engine subprocess, keeps the ranked
//! candidate lines it reports, and hands out display snapshots gated by the
//! current [`Mode`]. [`EvaluationPoller`] republishes those snapshots on a
//! fixed period.

pub mod attacks;
pub mod board;
pub mod bridge;
pub mod candidates;
pub mod channel;
pub mod config;
pub mod error;
pub mod notation;
pub mod processor;
pub mod session;
pub mod state;
pub mod uci;

pub use bridge::{DisplaySink, EvaluationPoller, EvaluationReport, SnapshotSource};
pub use candidates::MoveEvaluation;
pub use config::EngineSettings;
pub use error::{EngineError, EngineResult};
pub use session::{EngineSession, EvaluationSnapshot};
pub use state::{Mode, Position, TransitionTable};
pub use uci::{Score, SearchLimit};
