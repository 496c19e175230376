//! Protocol state machine fed by the engine reader thread.
//!
//! Engine output only ever updates the candidate lines and the per-search
//! state kept here; it never changes the evaluation mode.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::candidates::{MoveCandidates, MoveEvaluation};
use crate::error::{EngineError, EngineResult};
use crate::uci::{parse_response, EngineResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    AwaitingHandshake,
    Ready,
    Searching,
    /// `stop` was sent; the search ends with the engine's `bestmove`.
    Stopping,
}

impl ProcessorState {
    fn in_search(self) -> bool {
        matches!(self, ProcessorState::Searching | ProcessorState::Stopping)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestMove {
    /// `None` when the engine had no move to play.
    pub best: Option<String>,
    pub ponder: Option<String>,
}

/// Returned by [`MessageProcessor::begin_search`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchTicket {
    pub id: u64,
    /// A search was still running; the caller must send `stop` before `go`.
    pub supersedes: bool,
}

struct Inner {
    state: ProcessorState,
    available: bool,
    engine_name: Option<String>,
    engine_author: Option<String>,
    awaiting_ready: bool,
    search_id: u64,
    /// `bestmove` lines still owed by searches that were superseded.
    stale_searches: u32,
    best_move: Option<BestMove>,
}

pub struct MessageProcessor {
    inner: Mutex<Inner>,
    changed: Condvar,
    candidates: MoveCandidates,
}

impl MessageProcessor {
    pub fn new(multipv: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: ProcessorState::AwaitingHandshake,
                available: true,
                engine_name: None,
                engine_author: None,
                awaiting_ready: false,
                search_id: 0,
                stale_searches: 0,
                best_move: None,
            }),
            changed: Condvar::new(),
            candidates: MoveCandidates::new(multipv),
        }
    }

    pub fn state(&self) -> ProcessorState {
        self.inner.lock().state
    }

    pub fn is_available(&self) -> bool {
        self.inner.lock().available
    }

    pub fn engine_name(&self) -> Option<String> {
        self.inner.lock().engine_name.clone()
    }

    pub fn engine_author(&self) -> Option<String> {
        self.inner.lock().engine_author.clone()
    }

    pub fn multipv(&self) -> u32 {
        self.candidates.capacity()
    }

    /// Resizes the candidate list only; the engine must be told separately.
    pub(crate) fn set_multipv(&self, lines: u32) {
        self.candidates.set_capacity(lines);
    }

    /// Best move of the most recent finished search.
    pub fn last_best_move(&self) -> Option<BestMove> {
        self.inner.lock().best_move.clone()
    }

    /// Copy of the current candidate lines, ordered by rank.
    pub fn snapshot(&self) -> Vec<MoveEvaluation> {
        self.candidates.snapshot()
    }

    /// Entry point for every line the engine writes.
    pub fn ingest(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match parse_response(line) {
            Ok(response) => self.handle(response),
            Err(err) => debug!("dropping engine line: {}", err),
        }
    }

    fn handle(&self, response: EngineResponse) {
        let mut inner = self.inner.lock();
        match response {
            EngineResponse::IdName(name) => inner.engine_name = Some(name),
            EngineResponse::IdAuthor(author) => inner.engine_author = Some(author),
            EngineResponse::UciOk => {
                if inner.state == ProcessorState::AwaitingHandshake {
                    inner.state = ProcessorState::Ready;
                    info!(
                        "engine handshake complete: {}",
                        inner.engine_name.as_deref().unwrap_or("unnamed engine")
                    );
                    self.changed.notify_all();
                }
            }
            EngineResponse::ReadyOk => {
                inner.awaiting_ready = false;
                self.changed.notify_all();
            }
            EngineResponse::Info(info) => {
                if !inner.state.in_search() || inner.stale_searches > 0 {
                    debug!("ignoring info line outside the current search");
                    return;
                }
                let rank = info.multipv;
                // State lock stays held so begin_search cannot clear in between
                if !self.candidates.replace(info.into()) {
                    debug!("ignoring line for multipv rank {}", rank);
                }
            }
            EngineResponse::BestMove { best, ponder } => {
                if inner.stale_searches > 0 {
                    inner.stale_searches -= 1;
                    debug!("discarded bestmove of a superseded search");
                    return;
                }
                if !inner.state.in_search() {
                    debug!("ignoring bestmove with no search in flight");
                    return;
                }
                debug!("search {} finished with {:?}", inner.search_id, best);
                inner.best_move = Some(BestMove { best, ponder });
                inner.state = ProcessorState::Ready;
                self.changed.notify_all();
            }
            EngineResponse::Other => {}
        }
    }

    /// Moves to `Searching` and clears the candidates. Must be called before
    /// `go` is written so no line of an earlier search lands in the new one.
    pub fn begin_search(&self) -> EngineResult<SearchTicket> {
        let mut inner = self.inner.lock();
        if !inner.available {
            return Err(EngineError::Unavailable);
        }
        let supersedes = match inner.state {
            ProcessorState::AwaitingHandshake => return Err(EngineError::Unavailable),
            ProcessorState::Ready => false,
            ProcessorState::Searching | ProcessorState::Stopping => {
                inner.stale_searches += 1;
                true
            }
        };
        self.candidates.clear();
        inner.search_id += 1;
        inner.best_move = None;
        inner.state = ProcessorState::Searching;
        Ok(SearchTicket {
            id: inner.search_id,
            supersedes,
        })
    }

    /// Marks the running search as stopping. Returns false when there is
    /// nothing to stop, in which case no `stop` needs to be sent.
    pub fn request_stop(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == ProcessorState::Searching {
            inner.state = ProcessorState::Stopping;
            true
        } else {
            false
        }
    }

    /// Records that `isready` is about to be sent.
    pub fn request_ready(&self) {
        self.inner.lock().awaiting_ready = true;
    }

    /// Called by the reader when the pipe closes or fails.
    pub fn mark_unavailable(&self, reason: &str) {
        let mut inner = self.inner.lock();
        if inner.available {
            warn!("engine became unavailable: {}", reason);
        }
        inner.available = false;
        self.changed.notify_all();
    }

    fn wait_while<F>(
        &self,
        timeout: Duration,
        mut pending: F,
    ) -> EngineResult<MutexGuard<'_, Inner>>
    where
        F: FnMut(&Inner) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while pending(&*inner) {
            if !inner.available {
                return Err(EngineError::Unavailable);
            }
            if self.changed.wait_until(&mut inner, deadline).timed_out() && pending(&*inner) {
                return Err(EngineError::Timeout { waited: timeout });
            }
        }
        Ok(inner)
    }

    pub fn wait_for_handshake(&self, timeout: Duration) -> EngineResult<()> {
        self.wait_while(timeout, |inner| inner.state == ProcessorState::AwaitingHandshake)
            .map(|_| ())
    }

    pub fn wait_until_ready(&self, timeout: Duration) -> EngineResult<()> {
        self.wait_while(timeout, |inner| inner.awaiting_ready).map(|_| ())
    }

    /// Blocks until the current search reports `bestmove`. Once it has, the
    /// same move is returned until the next search begins.
    ///
    /// A timeout leaves the search running; the caller decides whether to
    /// stop it or start a new one.
    pub fn wait_for_best_move(&self, timeout: Duration) -> EngineResult<BestMove> {
        let inner = self.wait_while(timeout, |inner| {
            inner.best_move.is_none() && inner.state.in_search()
        })?;
        match &inner.best_move {
            Some(best) => Ok(best.clone()),
            None if !inner.available => Err(EngineError::Unavailable),
            None => Err(EngineError::NoSearch),
        }
    }
}
