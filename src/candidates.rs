use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::uci::{InfoLine, Score, ScoreBound};

pub const MAX_MULTIPV: u32 = 64;

/// One ranked line reported by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveEvaluation {
    /// 1-based multiPV slot.
    pub rank: u32,
    /// From the side to move's point of view.
    pub score: Score,
    pub bound: Option<ScoreBound>,
    pub depth: u32,
    /// Principal line in engine notation.
    pub line: Vec<String>,
}

impl From<InfoLine> for MoveEvaluation {
    fn from(info: InfoLine) -> Self {
        Self {
            rank: info.multipv,
            score: info.score,
            bound: info.bound,
            depth: info.depth,
            line: info.pv,
        }
    }
}

impl MoveEvaluation {
    pub fn first_move(&self) -> Option<&str> {
        self.line.first().map(String::as_str)
    }
}

struct Slots {
    capacity: u32,
    by_rank: BTreeMap<u32, MoveEvaluation>,
}

/// Ranked candidate lines shared between the engine reader and pollers.
///
/// The container hands out only owned copies; nothing outside it ever holds a
/// reference into the map, and the lock is never held across caller code.
pub struct MoveCandidates {
    slots: Mutex<Slots>,
}

impl MoveCandidates {
    pub fn new(capacity: u32) -> Self {
        Self {
            slots: Mutex::new(Slots {
                capacity: capacity.clamp(1, MAX_MULTIPV),
                by_rank: BTreeMap::new(),
            }),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.slots.lock().capacity
    }

    /// Changes the number of ranks kept, dropping any entries above it.
    pub fn set_capacity(&self, capacity: u32) {
        let mut slots = self.slots.lock();
        slots.capacity = capacity.clamp(1, MAX_MULTIPV);
        let limit = slots.capacity;
        slots.by_rank.retain(|&rank, _| rank <= limit);
    }

    /// Stores `evaluation` as the current entry for its rank, replacing any
    /// previous one. Ranks above the capacity are refused.
    pub fn replace(&self, evaluation: MoveEvaluation) -> bool {
        let mut slots = self.slots.lock();
        if evaluation.rank == 0 || evaluation.rank > slots.capacity {
            return false;
        }
        slots.by_rank.insert(evaluation.rank, evaluation);
        true
    }

    pub fn clear(&self) {
        self.slots.lock().by_rank.clear();
    }

    /// Copy of all entries ordered by rank.
    pub fn snapshot(&self) -> Vec<MoveEvaluation> {
        let slots = self.slots.lock();
        slots.by_rank.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluation(rank: u32, cp: i32, depth: u32) -> MoveEvaluation {
        MoveEvaluation {
            rank,
            score: Score::Centipawns(cp),
            bound: None,
            depth,
            line: vec!["e2e4".to_string()],
        }
    }

    #[test]
    fn test_replace_keeps_latest_per_rank() {
        let candidates = MoveCandidates::new(3);
        assert!(candidates.replace(evaluation(2, 10, 5)));
        assert!(candidates.replace(evaluation(1, 20, 5)));
        assert!(candidates.replace(evaluation(1, 25, 6)));

        let snapshot = candidates.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0], evaluation(1, 25, 6));
        assert_eq!(snapshot[1], evaluation(2, 10, 5));
    }

    #[test]
    fn test_ranks_above_capacity_are_refused() {
        let candidates = MoveCandidates::new(2);
        assert!(!candidates.replace(evaluation(3, 0, 1)));
        assert!(!candidates.replace(evaluation(0, 0, 1)));
        assert!(candidates.snapshot().is_empty());
    }

    #[test]
    fn test_shrinking_capacity_drops_entries() {
        let candidates = MoveCandidates::new(3);
        for rank in 1..=3 {
            candidates.replace(evaluation(rank, 0, 1));
        }
        candidates.set_capacity(1);
        assert_eq!(candidates.snapshot().len(), 1);
        assert_eq!(candidates.capacity(), 1);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let candidates = MoveCandidates::new(1);
        candidates.replace(evaluation(1, 10, 1));
        let before = candidates.snapshot();
        candidates.replace(evaluation(1, 99, 2));
        assert_eq!(before[0].score, Score::Centipawns(10));
        candidates.clear();
        assert!(candidates.snapshot().is_empty());
        assert_eq!(before.len(), 1);
    }
}
