use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::state::Mode;

/// Failures of the engine integration layer.
///
/// Transport failures (`Launch`, `Write`, `Read`, `Unavailable`) end the engine
/// connection but never the application. `Protocol` is recovered locally by the
/// message processor, which drops the offending line.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to launch engine {path}: {source}")]
    Launch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write to engine: {0}")]
    Write(#[source] io::Error),

    #[error("failed to read from engine: {0}")]
    Read(#[source] io::Error),

    #[error("engine is not available")]
    Unavailable,

    #[error("malformed engine line {line:?}: {reason}")]
    Protocol { line: String, reason: String },

    #[error("no search has been started")]
    NoSearch,

    #[error("no response from engine within {waited:?}")]
    Timeout { waited: Duration },

    #[error("illegal mode transition from {from:?} to {to:?}")]
    IllegalModeTransition { from: Mode, to: Mode },

    #[error("invalid position: {0}")]
    InvalidPosition(String),

    #[error("invalid move: {0}")]
    InvalidMove(String),

    #[error("unable to read the configuration: {0}")]
    Config(#[from] ::config::ConfigError),
}

impl EngineError {
    pub(crate) fn protocol(line: &str, reason: impl Into<String>) -> Self {
        EngineError::Protocol {
            line: line.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors after which the engine process can no longer be used.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            EngineError::Launch { .. }
                | EngineError::Write(_)
                | EngineError::Read(_)
                | EngineError::Unavailable
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
