use std::fmt;
use std::str::SplitWhitespace;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};

/// How long a `go` command lets the engine think.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchLimit {
    MoveTime(Duration),
    Depth(u32),
    Infinite,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartPosition {
    StartPos,
    Fen(String),
}

/// A line sent to the engine. `Display` yields the exact wire text without the terminator.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    Uci,
    IsReady,
    UciNewGame,
    SetOption { name: String, value: String },
    Position { start: StartPosition, moves: Vec<String> },
    Go(SearchLimit),
    Stop,
    Quit,
}

impl EngineCommand {
    pub fn multipv(lines: u32) -> Self {
        EngineCommand::SetOption {
            name: "multipv".to_string(),
            value: lines.to_string(),
        }
    }
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EngineCommand::Uci => write!(f, "uci"),
            EngineCommand::IsReady => write!(f, "isready"),
            EngineCommand::UciNewGame => write!(f, "ucinewgame"),
            EngineCommand::SetOption { name, value } => {
                write!(f, "setoption name {name} value {value}")
            }
            EngineCommand::Position { start, moves } => {
                match start {
                    StartPosition::StartPos => write!(f, "position startpos")?,
                    StartPosition::Fen(fen) => write!(f, "position fen {fen}")?,
                }
                if !moves.is_empty() {
                    write!(f, " moves {}", moves.join(" "))?;
                }
                Ok(())
            }
            EngineCommand::Go(SearchLimit::MoveTime(time)) => {
                write!(f, "go movetime {}", time.as_millis())
            }
            EngineCommand::Go(SearchLimit::Depth(depth)) => write!(f, "go depth {depth}"),
            EngineCommand::Go(SearchLimit::Infinite) => write!(f, "go infinite"),
            EngineCommand::Stop => write!(f, "stop"),
            EngineCommand::Quit => write!(f, "quit"),
        }
    }
}

/// Score of a line, from the point of view of the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Centipawns(i32),
    /// Mate in N moves; negative when the side to move gets mated.
    Mate(i32),
}

impl Score {
    pub fn negate(self) -> Score {
        match self {
            Score::Centipawns(cp) => Score::Centipawns(-cp),
            Score::Mate(m) => Score::Mate(-m),
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Score::Centipawns(cp) => write!(f, "{:+.2}", *cp as f64 / 100.0),
            Score::Mate(m) => write!(f, "#{m}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBound {
    Lower,
    Upper,
}

/// The evaluation-bearing part of an `info` line.
#[derive(Debug, Clone, PartialEq)]
pub struct InfoLine {
    pub multipv: u32,
    pub depth: u32,
    pub score: Score,
    pub bound: Option<ScoreBound>,
    pub nodes: Option<u64>,
    pub pv: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineResponse {
    UciOk,
    ReadyOk,
    IdName(String),
    IdAuthor(String),
    Info(InfoLine),
    BestMove {
        best: Option<String>,
        ponder: Option<String>,
    },
    /// Anything without meaning for evaluation: option lists, `info string`,
    /// `info` lines without a score or line, banner text.
    Other,
}

fn next_number<T: std::str::FromStr>(
    line: &str,
    tokens: &mut SplitWhitespace,
    keyword: &str,
) -> EngineResult<T> {
    tokens
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| {
            EngineError::protocol(line, format!("missing or invalid value after {keyword}"))
        })
}

fn parse_info(line: &str, mut tokens: SplitWhitespace) -> EngineResult<EngineResponse> {
    let mut multipv = 1;
    let mut depth = None;
    let mut score = None;
    let mut bound = None;
    let mut nodes = None;
    let mut pv: Option<Vec<String>> = None;

    while let Some(token) = tokens.next() {
        match token {
            "depth" => depth = Some(next_number(line, &mut tokens, token)?),
            "multipv" => multipv = next_number(line, &mut tokens, token)?,
            "nodes" => nodes = Some(next_number(line, &mut tokens, token)?),
            "score" => {
                score = Some(match tokens.next() {
                    Some("cp") => Score::Centipawns(next_number(line, &mut tokens, "cp")?),
                    Some("mate") => Score::Mate(next_number(line, &mut tokens, "mate")?),
                    _ => return Err(EngineError::protocol(line, "score must be cp or mate")),
                });
            }
            "lowerbound" => bound = Some(ScoreBound::Lower),
            "upperbound" => bound = Some(ScoreBound::Upper),
            "pv" => {
                pv = Some(tokens.by_ref().map(str::to_string).collect());
            }
            "string" => return Ok(EngineResponse::Other),
            // The rest of the line belongs to these
            "refutation" | "currline" => break,
            "seldepth" | "time" | "nps" | "hashfull" | "tbhits" | "sbhits" | "cpuload"
            | "currmove" | "currmovenumber" => {
                tokens.next();
            }
            _ => {}
        }
    }

    let (Some(score), Some(pv)) = (score, pv) else {
        return Ok(EngineResponse::Other);
    };
    if pv.is_empty() {
        return Err(EngineError::protocol(line, "empty principal line"));
    }
    if multipv == 0 {
        return Err(EngineError::protocol(line, "multipv rank must be at least 1"));
    }
    let depth = depth.ok_or_else(|| EngineError::protocol(line, "evaluation without depth"))?;

    Ok(EngineResponse::Info(InfoLine {
        multipv,
        depth,
        score,
        bound,
        nodes,
        pv,
    }))
}

/// Classifies one line of engine output.
pub fn parse_response(line: &str) -> EngineResult<EngineResponse> {
    let mut tokens = line.split_whitespace();
    match tokens.next() {
        Some("uciok") => Ok(EngineResponse::UciOk),
        Some("readyok") => Ok(EngineResponse::ReadyOk),
        Some("id") => {
            let field = tokens.next();
            let value = tokens.collect::<Vec<_>>().join(" ");
            match field {
                Some("name") => Ok(EngineResponse::IdName(value)),
                Some("author") => Ok(EngineResponse::IdAuthor(value)),
                _ => Ok(EngineResponse::Other),
            }
        }
        Some("info") => parse_info(line, tokens),
        Some("bestmove") => {
            let best = match tokens.next() {
                Some("(none)") | Some("0000") => None,
                Some(mv) => Some(mv.to_string()),
                None => return Err(EngineError::protocol(line, "bestmove without a move")),
            };
            let ponder = match (tokens.next(), tokens.next()) {
                (Some("ponder"), Some(mv)) => Some(mv.to_string()),
                _ => None,
            };
            Ok(EngineResponse::BestMove { best, ponder })
        }
        _ => Ok(EngineResponse::Other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_format() {
        assert_eq!(EngineCommand::Uci.to_string(), "uci");
        assert_eq!(EngineCommand::multipv(3).to_string(), "setoption name multipv value 3");
        assert_eq!(
            EngineCommand::Go(SearchLimit::MoveTime(Duration::from_secs(2))).to_string(),
            "go movetime 2000"
        );
        assert_eq!(EngineCommand::Go(SearchLimit::Infinite).to_string(), "go infinite");
        assert_eq!(EngineCommand::Go(SearchLimit::Depth(12)).to_string(), "go depth 12");

        let position = EngineCommand::Position {
            start: StartPosition::StartPos,
            moves: vec!["e2e4".to_string(), "e7e5".to_string()],
        };
        assert_eq!(position.to_string(), "position startpos moves e2e4 e7e5");

        let position = EngineCommand::Position {
            start: StartPosition::Fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1".to_string()),
            moves: vec![],
        };
        assert_eq!(position.to_string(), "position fen 4k3/8/8/8/8/8/8/4K3 w - - 0 1");
    }

    #[test]
    fn test_parse_handshake_lines() {
        assert_eq!(parse_response("uciok").unwrap(), EngineResponse::UciOk);
        assert_eq!(parse_response("readyok").unwrap(), EngineResponse::ReadyOk);
        assert_eq!(
            parse_response("id name Stockfish 16.1").unwrap(),
            EngineResponse::IdName("Stockfish 16.1".to_string())
        );
        assert_eq!(
            parse_response("option name Hash type spin default 16 min 1 max 33554432").unwrap(),
            EngineResponse::Other
        );
    }

    #[test]
    fn test_parse_info_line() {
        let line = "info depth 18 seldepth 24 multipv 2 score cp -35 nodes 123456 nps 900000 \
                    time 137 pv e7e5 g1f3 b8c6";
        let EngineResponse::Info(info) = parse_response(line).unwrap() else {
            panic!("expected an evaluation line");
        };
        assert_eq!(info.multipv, 2);
        assert_eq!(info.depth, 18);
        assert_eq!(info.score, Score::Centipawns(-35));
        assert_eq!(info.nodes, Some(123456));
        assert_eq!(info.pv, vec!["e7e5", "g1f3", "b8c6"]);
        assert_eq!(info.bound, None);
    }

    #[test]
    fn test_parse_mate_and_bound() {
        let line = "info depth 30 score mate -3 upperbound pv h7h8";
        let EngineResponse::Info(info) = parse_response(line).unwrap() else {
            panic!("expected an evaluation line");
        };
        assert_eq!(info.multipv, 1);
        assert_eq!(info.score, Score::Mate(-3));
        assert_eq!(info.bound, Some(ScoreBound::Upper));
    }

    #[test]
    fn test_non_evaluation_info_is_other() {
        let lines = [
            "info depth 5 currmove e2e4 currmovenumber 1",
            "info string NNUE evaluation enabled",
        ];
        for line in lines {
            assert_eq!(parse_response(line).unwrap(), EngineResponse::Other);
        }
    }

    #[test]
    fn test_malformed_info_is_protocol_error() {
        assert!(matches!(
            parse_response("info depth 10 score cp abc pv e2e4"),
            Err(EngineError::Protocol { .. })
        ));
        assert!(matches!(
            parse_response("info depth 10 score centipawns 10 pv e2e4"),
            Err(EngineError::Protocol { .. })
        ));
        assert!(matches!(
            parse_response("info depth 10 score cp 10 pv"),
            Err(EngineError::Protocol { .. })
        ));
    }

    #[test]
    fn test_parse_bestmove() {
        assert_eq!(
            parse_response("bestmove e2e4 ponder e7e5").unwrap(),
            EngineResponse::BestMove {
                best: Some("e2e4".to_string()),
                ponder: Some("e7e5".to_string())
            }
        );
        assert_eq!(
            parse_response("bestmove (none)").unwrap(),
            EngineResponse::BestMove { best: None, ponder: None }
        );
        assert!(parse_response("bestmove").is_err());
    }

    #[test]
    fn test_score_display() {
        assert_eq!(Score::Centipawns(35).to_string(), "+0.35");
        assert_eq!(Score::Centipawns(-120).to_string(), "-1.20");
        assert_eq!(Score::Mate(3).to_string(), "#3");
        assert_eq!(Score::Mate(-2).to_string(), "#-2");
    }
}
